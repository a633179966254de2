//! LXD to BGP route synchronization daemon
//!
//! This crate keeps the routes a BGP speaker advertises in step with the
//! topology of an LXD host: networks and instances come and go, and the set
//! of externally routable prefixes follows them with minimal churn.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//!
//! | Control | Description | Implementation |
//! |---------|-------------|----------------|
//! | AU-3 | Content of Audit Records | Structured logging with prefix and next-hop |
//! | AU-12 | Audit Record Generation | Every announce and withdrawal logged |
//! | CM-6 | Configuration Settings | TOML config file with validation |
//! | CP-10 | System Recovery | Event stream reconnects, full resync on connect |
//! | SC-7 | Boundary Protection | NATed subnets are never exported |
//! | SI-10 | Input Validation | Prefixes and next-hops parsed before use |
//! | SI-11 | Error Handling | Structured error types with handling classes |
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  trigger   ┌───────────────┐   run   ┌──────────────┐
//! │ EventStream  │───────────▶│ PassScheduler │────────▶│  Reconciler  │
//! │ (LXD events) │  (mpsc)    │ (one consumer)│         │  RouteStore  │
//! └──────────────┘            └───────────────┘         └──────┬───────┘
//!                                                               │
//!              ┌────────────────────────┬──────────────────────┤
//!              ▼                        ▼                      ▼
//!     ┌─────────────────┐     ┌──────────────────┐    ┌────────────────┐
//!     │TopologyCollector│────▶│  PlatformQuery   │    │ RoutePublisher │
//!     │managed/unmanaged│     │   (LxdClient)    │    │(GobgpPublisher)│
//!     └─────────────────┘     └──────────────────┘    └────────────────┘
//! ```

pub mod cli;
pub mod collector;
pub mod config;
pub mod desired;
pub mod error;
pub mod gobgp;
pub mod lxd;
pub mod platform;
pub mod publisher;
pub mod reconciler;
pub mod scheduler;
pub mod store;
pub mod topology;
pub mod used_by;

pub use cli::Cli;
pub use collector::{
    CandidateSource, CollectContext, ManagedStrategy, RouteCandidate, TopologyCollector,
    TraversalStrategy, UnmanagedStrategy,
};
pub use config::DaemonConfig;
pub use desired::DesiredSet;
pub use error::{ErrorKind, Result, SyncError};
pub use platform::PlatformQuery;
pub use publisher::{RouteHandle, RoutePublisher};
pub use reconciler::{PassReport, Reconciler, ReconcilerConfig};
pub use scheduler::{pass_queue, PassScheduler, PassTrigger, TriggerSender};
pub use store::{Advertisement, RouteStore};
pub use topology::{Device, Instance, Network};

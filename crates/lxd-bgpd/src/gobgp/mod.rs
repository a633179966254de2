//! GoBGP route publisher adapter
//!
//! Talks to a co-located GoBGP daemon over its gRPC API. The protobuf
//! messages are declared by hand in [`api`] for the handful of calls used.

pub mod api;
mod client;
mod session;

pub use client::{GobgpClient, GobgpPublisher, DEFAULT_ENDPOINT};
pub use session::{BgpPeer, BgpSession, SpeakerControl, NO_LISTEN_PORT};

//! LXD platform adapter
//!
//! - [`LxdClient`]: REST queries over the local unix socket
//! - [`EventStream`]: lifecycle events feeding the pass scheduler

mod client;
mod events;

pub use client::{LxdClient, DEFAULT_SOCKET_PATH};
pub use events::{
    is_relevant_action, parse_trigger, EventStream, DEFAULT_RECONNECT_INTERVAL, RELEVANT_ACTIONS,
};

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Waits until the LXD API answers, probing every `interval`.
///
/// Returns false if cancelled first. An unreachable platform at startup is
/// retried, never fatal.
pub async fn wait_until_reachable(
    client: &LxdClient,
    interval: Duration,
    cancel: &CancellationToken,
) -> bool {
    loop {
        match client.probe().await {
            Ok(()) => {
                info!(socket = %client.socket_path().display(), "LXD is reachable");
                return true;
            }
            Err(e) => warn!(
                error = %e,
                retry_secs = interval.as_secs(),
                "LXD is not reachable yet"
            ),
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

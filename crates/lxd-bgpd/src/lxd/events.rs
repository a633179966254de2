//! LXD lifecycle event stream with auto-reconnect.
//!
//! Subscribes to `/1.0/events` over the unix socket and turns relevant
//! lifecycle events into [`PassTrigger`]s. After every successful connect a
//! [`PassTrigger::Connected`] is queued, since anything that changed while
//! disconnected was not observed. Connection loss is never fatal: the stream
//! reconnects on a fixed interval until shut down.

use crate::error::{Result, SyncError};
use crate::scheduler::{PassTrigger, TriggerSender};
use futures_util::StreamExt;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::UnixStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Default delay between reconnect attempts.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(10);

const EVENTS_URL: &str = "ws://lxd/1.0/events?type=lifecycle&all-projects=true";

/// Lifecycle actions that can change the advertised routes.
pub const RELEVANT_ACTIONS: &[&str] = &[
    "instance-created",
    "instance-updated",
    "instance-deleted",
    "instance-restored",
    "instance-started",
    "instance-stopped",
    "instance-shutdown",
    "network-created",
    "network-updated",
    "network-deleted",
];

/// Returns true if `action` may affect routes.
pub fn is_relevant_action(action: &str) -> bool {
    RELEVANT_ACTIONS.contains(&action)
}

#[derive(Debug, Deserialize)]
struct LxdEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    project: String,
    #[serde(default)]
    metadata: Option<LifecycleMetadata>,
}

#[derive(Debug, Deserialize)]
struct LifecycleMetadata {
    action: String,
    #[serde(default)]
    source: String,
}

/// Parses an event frame into a trigger if it is a relevant lifecycle event.
pub fn parse_trigger(text: &str) -> Option<PassTrigger> {
    let event: LxdEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            debug!(error = %e, "Failed to parse LXD event");
            return None;
        }
    };

    if event.kind != "lifecycle" {
        return None;
    }
    let metadata = event.metadata?;
    if !is_relevant_action(&metadata.action) {
        trace!(action = %metadata.action, "Ignoring lifecycle event");
        return None;
    }

    debug!(
        action = %metadata.action,
        source = %metadata.source,
        project = %event.project,
        "Lifecycle event"
    );
    Some(PassTrigger::Lifecycle {
        action: metadata.action,
        source: metadata.source,
    })
}

/// Reconnecting subscriber to the LXD event stream.
#[derive(Debug, Clone)]
pub struct EventStream {
    socket_path: PathBuf,
    reconnect_interval: Duration,
}

impl EventStream {
    pub fn new(socket_path: impl Into<PathBuf>, reconnect_interval: Duration) -> Self {
        Self {
            socket_path: socket_path.into(),
            reconnect_interval,
        }
    }

    /// Main loop: connect, read, on loss wait and reconnect.
    pub async fn run(self, triggers: TriggerSender, cancel: CancellationToken) {
        let mut connections: u64 = 0;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.connect_and_read(&triggers, &mut connections) => match result {
                    Ok(()) => info!("LXD event stream closed"),
                    Err(e) => warn!(error = %e, "Lost connection with LXD"),
                },
            }

            info!(
                delay_secs = self.reconnect_interval.as_secs(),
                "Waiting before reconnecting to LXD"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_interval) => {}
            }
        }

        debug!("LXD event stream stopped");
    }

    async fn connect_and_read(&self, triggers: &TriggerSender, connections: &mut u64) -> Result<()> {
        debug!(socket = %self.socket_path.display(), "Connecting to LXD event stream");

        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| SyncError::transport("connect events", e.to_string()))?;
        let (mut ws, _response) = tokio_tungstenite::client_async(EVENTS_URL, stream)
            .await
            .map_err(|e| SyncError::transport("subscribe events", e.to_string()))?;

        *connections += 1;
        info!(connection = *connections, "Connected to LXD");
        triggers.notify(PassTrigger::Connected {
            attempt: *connections,
        });

        while let Some(frame) = ws.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if let Some(trigger) = parse_trigger(&text) {
                        triggers.notify(trigger);
                    }
                }
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "LXD closed the event stream");
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => return Err(SyncError::transport("read events", e.to_string())),
            }
        }

        Ok(())
    }
}

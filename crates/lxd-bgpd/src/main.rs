//! LXD BGP Daemon
//!
//! Main entry point for the lxd-bgp daemon.
//! Starts the BGP speaker, then reconciles advertised routes with the LXD
//! topology on every relevant lifecycle event.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - AU-12: Audit Record Generation - Log daemon lifecycle
//! - CM-6: Configuration Settings - Validated before any side effect
//! - CP-10: System Recovery - Platform unreachable at startup is retried

use anyhow::{anyhow, Context};
use clap::Parser;
use lxd_bgpd::collector::TopologyCollector;
use lxd_bgpd::gobgp::{GobgpClient, GobgpPublisher};
use lxd_bgpd::lxd::{self, EventStream, LxdClient};
use lxd_bgpd::{pass_queue, Cli, DaemonConfig, Reconciler, RouteStore};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level) {
        eprintln!("Error: {e:#}");
        return ExitCode::FAILURE;
    }

    info!(version = env!("CARGO_PKG_VERSION"), "lxd-bgp: Starting route synchronization daemon");

    match run_daemon(cli).await {
        Ok(()) => {
            info!("lxd-bgp: Daemon exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "lxd-bgp: Daemon exiting with error");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize structured logging. `RUST_LOG` takes precedence over `--log-level`.
fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).with_context(|| format!("invalid log level '{level}'"))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .try_init()
        .map_err(|e| anyhow!("failed to set logger: {e}"))
}

/// Host identifier matched against instance locations.
fn resolve_server_name(config: &DaemonConfig) -> anyhow::Result<String> {
    if let Some(name) = config.sync.server_name.as_deref().filter(|n| !n.is_empty()) {
        return Ok(name.to_string());
    }
    let hostname = nix::unistd::gethostname().context("cannot determine hostname")?;
    hostname
        .into_string()
        .map_err(|raw| anyhow!("hostname is not valid UTF-8: {raw:?}"))
}

async fn run_daemon(cli: Cli) -> anyhow::Result<()> {
    let mut config = DaemonConfig::load_or_default(&cli.config)?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    let uplinks = cli.uplinks()?;
    let mut session = cli.bgp_session()?;
    config.bgp.apply_to(&mut session);
    let server_name = resolve_server_name(&config)?;
    info!(
        uplinks = ?uplinks,
        server_name = %server_name,
        peers = session.peers.len(),
        "lxd-bgp: Configuration loaded"
    );

    let gobgp = GobgpClient::connect(
        &config.gobgp.endpoint,
        config.connect_timeout(),
        config.call_timeout(),
    )
    .await?;
    session.start(&gobgp).await?;
    info!(endpoint = gobgp.endpoint(), "lxd-bgp: BGP speaker configured");

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let lxd_client = LxdClient::new(&config.lxd.socket_path, config.request_timeout());
    if !lxd::wait_until_reachable(&lxd_client, config.reconnect_interval(), &cancel).await {
        warn!("lxd-bgp: Shutdown before LXD became reachable");
        return Ok(());
    }

    let collector = TopologyCollector::new(Arc::new(lxd_client), uplinks, server_name)
        .with_annotation_key(config.sync.route_annotation_key.clone());
    let reconciler = Arc::new(Reconciler::new(
        collector,
        Arc::new(GobgpPublisher::new(gobgp)),
        RouteStore::new(),
        config.reconciler(),
    ));

    let (triggers, scheduler) = pass_queue(config.sync.queue_depth, reconciler);
    let events = EventStream::new(&config.lxd.socket_path, config.reconnect_interval());

    let event_task = tokio::spawn(events.run(triggers, cancel.clone()));
    let scheduler_task = tokio::spawn(scheduler.run(cancel.clone()));
    info!("lxd-bgp: Listening for LXD lifecycle events");

    cancel.cancelled().await;
    info!("lxd-bgp: Shutting down");

    event_task.await.context("event stream task failed")?;
    let passes = scheduler_task.await.context("pass scheduler task failed")?;

    info!(passes, "lxd-bgp: Graceful shutdown complete");
    Ok(())
}

/// Cancels `cancel` on SIGINT or SIGTERM.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "lxd-bgp: Cannot install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = signal::ctrl_c() => info!("lxd-bgp: Received SIGINT"),
            _ = terminate => info!("lxd-bgp: Received SIGTERM"),
        }
        cancel.cancel();
    });
}

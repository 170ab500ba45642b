//! The `relay` command
//!
//! Pass-through mode with no buffering and no journal: every inbound
//! connection is spliced byte-for-byte to the wildcard destination of
//! the active routing table. Hot swap still applies, but only to
//! connections accepted after the swap.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use shunt_config::Settings;
use shunt_ingest::{RelayConfig, RelayServer};
use shunt_lifecycle::{
    ConfigPublisher, LogSink, control_channel, raise_open_file_limit, run_dispatch,
    spawn_signal_listener,
};
use shunt_routing::{ConfigSource, RouteConsumer};
use tokio_util::sync::CancellationToken;

use crate::status::StatusServer;

pub async fn run(settings: Settings, log: Arc<LogSink>) -> Result<()> {
    let started = Instant::now();
    let build = crate::build_info();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = crate::commit_id(),
        platform = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        pid = std::process::id(),
        "shunt relay starting"
    );

    let cancel = CancellationToken::new();

    let relay = Arc::new(
        RelayServer::bind(RelayConfig::new(settings.listen_addr()))
            .await
            .context("failed to bind relay listener")?,
    );

    let consumers: Vec<Arc<dyn RouteConsumer>> = vec![Arc::clone(&relay) as _];
    let publisher = Arc::new(ConfigPublisher::new(consumers));
    let source = match &settings.config_path {
        Some(path) => ConfigSource::file(path),
        None => ConfigSource::host_list(settings.destinations.clone()),
    };
    if let Err(e) = publisher.load(&source) {
        tracing::error!(
            source = %source.describe(),
            error = %e,
            "initial configuration load failed, relaying nothing until reload"
        );
    }

    match raise_open_file_limit(settings.max_open_files) {
        Ok(Some(change)) => tracing::info!(
            previous = change.previous_soft,
            target = change.target,
            "open file limit raised"
        ),
        Ok(None) => tracing::debug!("open file limit already sufficient"),
        Err(e) => tracing::warn!(error = %e, "could not raise open file limit"),
    }

    let (control_tx, control_rx) = control_channel();
    let signal_task =
        spawn_signal_listener(control_tx).context("failed to install signal handlers")?;

    let relay_task = tokio::spawn(Arc::clone(&relay).run(cancel.clone()));

    let status_task = match &settings.debug_addr {
        Some(addr) => {
            let status = StatusServer::bind(addr, Arc::clone(&publisher), build)
                .await
                .context("failed to bind status endpoint")?;
            Some(tokio::spawn(status.run(cancel.clone())))
        }
        None => None,
    };

    tracing::info!(listen = %settings.listen_addr(), "shunt relay running");

    run_dispatch(control_rx, &publisher, &source, &log).await;

    // Nothing durable to flush in relay mode; cancel directly.
    cancel.cancel();

    match tokio::time::timeout(super::TASK_DRAIN_TIMEOUT, relay_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "relay task panicked during shutdown"),
        Err(_) => tracing::warn!("relay task did not finish within timeout"),
    }
    if let Some(task) = status_task {
        task.abort();
    }
    signal_task.abort();

    let stats = relay.metrics().snapshot();
    tracing::info!(
        connections = stats.connections_total,
        bytes_upstream = stats.bytes_upstream,
        bytes_downstream = stats.bytes_downstream,
        uptime_secs = started.elapsed().as_secs(),
        "shunt relay shutdown complete"
    );
    Ok(())
}

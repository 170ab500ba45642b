//! The default `serve` command
//!
//! Wires the full pipeline together: the TCP and UDP listeners feed
//! the buffer, the journal records what the buffer accepts, the sender
//! drains both toward the active routing table, and the control loop
//! hot-swaps that table on SIGHUP.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use shunt_config::Settings;
use shunt_delivery::{
    BufferLayer, DEFAULT_INGEST_CHANNEL_SIZE, JournalConfig, JournalLayer, SenderConfig,
    SenderLayer,
};
use shunt_ingest::{TcpIngest, TcpIngestConfig, UdpIngest, UdpIngestConfig};
use shunt_lifecycle::{
    ConfigPublisher, DurableState, HeartbeatReporter, LogSink, ShutdownCoordinator,
    control_channel, raise_open_file_limit, run_dispatch, spawn_signal_listener,
};
use shunt_routing::{ConfigSource, RouteConsumer};
use shunt_telemetry::TelemetrySink;
use tokio::sync::mpsc;
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
        "shunt starting"
    );

    let cancel = CancellationToken::new();

    // Delivery pipeline.
    let buffer = Arc::new(BufferLayer::new());
    let journal_config = JournalConfig::default()
        .with_dir(&settings.journal_dir)
        .with_max_file_bytes(settings.max_file_bytes)
        .with_rotate_interval(settings.rotate_interval)
        .with_events(settings.journal_events);
    let journal = Arc::new(JournalLayer::open(journal_config).context("failed to open journal")?);
    let sender_config = SenderConfig::default().with_max_send_bytes(settings.max_send_bytes);
    let sender = Arc::new(SenderLayer::with_config(
        Arc::clone(&buffer),
        Arc::clone(&journal),
        sender_config,
    ));
    journal.log_event("start", &format!("version={}", env!("CARGO_PKG_VERSION")));

    // Every consumer adopts a new table before it is published as active.
    let consumers: Vec<Arc<dyn RouteConsumer>> = vec![
        Arc::clone(&buffer) as _,
        Arc::clone(&journal) as _,
        Arc::clone(&sender) as _,
    ];
    let publisher = Arc::new(ConfigPublisher::new(consumers));
    let source = match &settings.config_path {
        Some(path) => ConfigSource::file(path),
        None => ConfigSource::host_list(settings.destinations.clone()),
    };
    if let Err(e) = publisher.load(&source) {
        tracing::error!(
            source = %source.describe(),
            error = %e,
            "initial configuration load failed, running without routes until reload"
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

    // Control plane.
    let (control_tx, control_rx) = control_channel();
    let signal_task =
        spawn_signal_listener(control_tx).context("failed to install signal handlers")?;

    // Ingest.
    let (records_tx, records_rx) = mpsc::channel(DEFAULT_INGEST_CHANNEL_SIZE);
    let pump_task = tokio::spawn(Arc::clone(&buffer).pump(records_rx, cancel.clone()));

    let tcp = TcpIngest::bind(TcpIngestConfig::new(settings.listen_addr()), records_tx.clone())
        .await
        .context("failed to bind tcp listener")?;
    let udp = UdpIngest::bind(UdpIngestConfig::new(settings.listen_addr()), records_tx)
        .await
        .context("failed to bind udp listener")?;
    let tcp_task = tokio::spawn(tcp.run(cancel.clone()));
    let udp_task = tokio::spawn(udp.run(cancel.clone()));

    let sender_task = tokio::spawn(Arc::clone(&sender).run(cancel.clone()));

    let heartbeat = HeartbeatReporter::new(
        Arc::clone(&publisher),
        Arc::clone(&journal) as Arc<dyn TelemetrySink>,
        build.clone(),
    )
    .with_interval(settings.heartbeat_interval);
    let heartbeat_task = tokio::spawn(heartbeat.run(cancel.clone()));

    let status_task = match &settings.debug_addr {
        Some(addr) => {
            let status = StatusServer::bind(addr, Arc::clone(&publisher), build)
                .await
                .context("failed to bind status endpoint")?;
            Some(tokio::spawn(status.run(cancel.clone())))
        }
        None => None,
    };

    tracing::info!(
        listen = %settings.listen_addr(),
        journal_dir = %settings.journal_dir.display(),
        destinations = settings.destinations.len(),
        "shunt running"
    );

    // Blocks until a shutdown signal arrives; reloads are handled inline.
    run_dispatch(control_rx, &publisher, &source, &log).await;

    // The coordinator cancels the token itself, then flushes the journal
    // state within its bounded window.
    ShutdownCoordinator::new(cancel, Arc::clone(&journal) as Arc<dyn DurableState>)
        .run()
        .await;
    journal.log_event("stop", &format!("uptime_secs={}", started.elapsed().as_secs()));

    for (name, task) in [
        ("tcp ingest", tcp_task),
        ("udp ingest", udp_task),
        ("sender", sender_task),
        ("buffer pump", pump_task),
        ("heartbeat", heartbeat_task),
    ] {
        match tokio::time::timeout(super::TASK_DRAIN_TIMEOUT, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(task = name, error = %e, "task panicked during shutdown");
            }
            Err(_) => tracing::warn!(task = name, "task did not finish within timeout"),
        }
    }
    if let Some(task) = status_task {
        task.abort();
    }
    signal_task.abort();

    tracing::info!(
        uptime_secs = started.elapsed().as_secs(),
        "shunt shutdown complete"
    );
    Ok(())
}

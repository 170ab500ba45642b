//! Shunt - buffering proxy for keyed payload streams
//!
//! # Usage
//!
//! ```bash
//! # Run the proxy (default)
//! shunt
//! SHUNT_CONFIG_PATH=/etc/shunt/routes.conf shunt
//!
//! # Splice connections straight to the wildcard destination
//! shunt --relay
//! ```
//!
//! All settings come from `SHUNT_*` environment variables; see the
//! `shunt-config` crate for the full list.

mod cmd;
mod status;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use shunt_config::Settings;
use shunt_lifecycle::{BuildInfo, LogSink};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Shunt - buffering proxy for keyed payload streams
#[derive(Parser, Debug)]
#[command(name = "shunt")]
#[command(version = build_version(), about, long_about = None)]
struct Cli {
    /// Relay connections byte-for-byte to the wildcard destination
    /// instead of running the buffering proxy
    #[arg(long)]
    relay: bool,

    /// Log filter (trace, debug, info, warn, error). Overrides SHUNT_LOG.
    #[arg(short, long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::from_env().context("invalid environment")?;
    settings.validate().context("invalid settings")?;

    let log = init_logging(cli.log_level.as_deref(), &settings)?;

    if settings.system_user.is_some() || settings.system_group.is_some() {
        tracing::warn!(
            user = settings.system_user.as_deref().unwrap_or_default(),
            group = settings.system_group.as_deref().unwrap_or_default(),
            "privilege drop is not performed; start the process under the target account"
        );
    }

    // SHUNT_CORES picks the worker count, so the runtime is built by hand.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(settings.worker_threads())
        .enable_all()
        .build()
        .context("failed to build runtime")?;

    if cli.relay {
        runtime.block_on(cmd::relay::run(settings, log))
    } else {
        runtime.block_on(cmd::serve::run(settings, log))
    }
}

/// Initialize the tracing subscriber over the process log sink
///
/// The sink honors `SHUNT_LOG_FILE`; a file that cannot be opened falls
/// back to stderr rather than aborting startup.
fn init_logging(cli_level: Option<&str>, settings: &Settings) -> Result<Arc<LogSink>> {
    let sink = match &settings.log_file {
        Some(path) => match LogSink::open(path) {
            Ok(sink) => sink,
            Err(e) => {
                eprintln!(
                    "shunt: cannot open log file {}: {e}, logging to stderr",
                    path.display()
                );
                LogSink::stderr()
            }
        },
        None => LogSink::stderr(),
    };
    let sink = Arc::new(sink);

    let level = match cli_level {
        Some(level) => level.to_string(),
        None => std::env::var("SHUNT_LOG").unwrap_or_else(|_| "info".to_string()),
    };
    let filter = EnvFilter::try_new(&level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {e}"))?;

    let writer_sink = Arc::clone(&sink);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_ansi(settings.log_file.is_none())
                .with_writer(move || writer_sink.writer()),
        )
        .with(filter)
        .init();

    Ok(sink)
}

/// Commit id baked in at build time, if the build system provided one
pub(crate) fn commit_id() -> &'static str {
    option_env!("SHUNT_BUILD_COMMIT").unwrap_or("unknown")
}

/// Build identity stamped into heartbeats and the status document
pub(crate) fn build_info() -> BuildInfo {
    BuildInfo::new(
        format!(
            "shunt {} ({}/{})",
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS,
            std::env::consts::ARCH
        ),
        commit_id(),
    )
}

/// Version line shown by `--version`
fn build_version() -> String {
    format!(
        "{} ({}/{}) commit {}",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH,
        commit_id()
    )
}

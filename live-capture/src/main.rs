use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use live_capture::bus::StatusBus;
use live_capture::capture::SystemProcessRunner;
use live_capture::config::RecorderConfig;
use live_capture::logging::init_logging;
use live_capture::registry::SessionRegistry;
use live_capture::resolver::DirectResolver;
use live_capture::store::SessionStore;
use live_capture::supervisor::{Dispatcher, LogSink, SessionController};
use live_capture::telemetry::TelemetryAggregator;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Media playlist URLs to record
    urls: Vec<String>,

    /// Display name for the recordings started from the command line
    #[arg(short, long)]
    name: Option<String>,

    /// Stop each recording after this many seconds
    #[arg(short = 't', long, env = "LIVE_CAPTURE_MAX_DURATION")]
    max_duration: Option<u64>,

    /// ffmpeg binary
    #[arg(long, env = "LIVE_CAPTURE_FFMPEG", default_value = "ffmpeg")]
    ffmpeg: String,

    /// Root directory for recordings
    #[arg(short, long, env = "LIVE_CAPTURE_OUTPUT_DIR", default_value = "recordings")]
    output_dir: PathBuf,

    /// Directory holding the session list and statistics
    #[arg(long, env = "LIVE_CAPTURE_DATA_DIR", default_value = ".")]
    data_dir: PathBuf,

    /// Directory for log files
    #[arg(long, env = "LIVE_CAPTURE_LOG_DIR", default_value = "logs")]
    log_dir: PathBuf,

    /// Log filter directive, overridden by RUST_LOG
    #[arg(long, env = "LIVE_CAPTURE_LOG")]
    log_filter: Option<String>,

    /// Attempts per recording before giving up
    #[arg(long, env = "LIVE_CAPTURE_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Delay between a failed attempt and the next one, in milliseconds
    #[arg(long, env = "LIVE_CAPTURE_RETRY_BACKOFF_MS", default_value_t = 5_000)]
    retry_backoff_ms: u64,

    /// Do not resume the sessions saved by the previous run
    #[arg(long, env = "LIVE_CAPTURE_NO_RESTORE")]
    no_restore: bool,

    /// Exit once every session has finished
    #[arg(long, env = "LIVE_CAPTURE_EXIT_WHEN_IDLE")]
    exit_when_idle: bool,
}

impl Args {
    fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            ffmpeg_path: self.ffmpeg.clone(),
            output_root: self.output_dir.clone(),
            data_dir: self.data_dir.clone(),
            log_dir: self.log_dir.clone(),
            max_retries: self.max_retries,
            retry_backoff_ms: self.retry_backoff_ms,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = args.recorder_config();
    config.validate()?;

    let (logging, _guard) = init_logging(&config.log_dir, args.log_filter.as_deref())
        .context("Failed to initialize logging")?;

    let shutdown = CancellationToken::new();
    logging.start_retention_cleanup(shutdown.child_token());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        filter = %logging.filter(),
        "live-capture starting"
    );

    let bus = StatusBus::new();
    let registry = Arc::new(SessionRegistry::new());
    let store = SessionStore::new(config.sessions_file());
    let telemetry = TelemetryAggregator::load(config.stats_file()).await;

    let controller = SessionController::new(
        config.clone(),
        Arc::new(DirectResolver::new(&config.output_root)),
        Arc::new(SystemProcessRunner::new()),
        registry.clone(),
        bus.publisher(),
    );

    if !args.no_restore {
        controller.restore(store.load().await).await;
    }

    for url in &args.urls {
        if let Err(e) = controller
            .start_session(url, args.name.as_deref(), args.max_duration)
            .await
        {
            error!(url = %url, kind = e.kind(), error = %e, "Failed to start recording");
        }
    }

    let dispatcher = Dispatcher::new(bus, registry.clone(), telemetry, store, Box::new(LogSink));
    let dispatcher_task = tokio::spawn(dispatcher.run(
        config.dispatch_interval(),
        shutdown.clone(),
        config.shutdown_timeout(),
    ));

    wait_for_shutdown(&registry, args.exit_when_idle).await;
    shutdown.cancel();

    let snapshot = dispatcher_task
        .await
        .context("Dispatcher task failed")?;
    info!(
        total_recordings = snapshot.total_recordings,
        "live-capture stopped"
    );

    Ok(())
}

/// Resolve on Ctrl-C, or once no session is left when `exit_when_idle` is set.
async fn wait_for_shutdown(registry: &SessionRegistry, exit_when_idle: bool) {
    let mut idle_check = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("Received Ctrl-C, shutting down"),
                    Err(e) => error!(error = %e, "Failed to listen for Ctrl-C, shutting down"),
                }
                return;
            }
            _ = idle_check.tick(), if exit_when_idle => {
                if registry.is_empty() {
                    info!("No active sessions left, shutting down");
                    return;
                }
            }
        }
    }
}

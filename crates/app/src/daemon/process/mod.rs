pub mod utils;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::daemon::app_state::AppState;
use crate::daemon::driver::RcloneDriver;
use crate::daemon::{ServiceConfig, State};

const FINAL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
const LOG_FILE_NAME: &str = "rmount.log";

/// Initialize logging, panic handler, and build info reporting.
/// Returns guards that must be kept alive for the duration of the program.
pub fn init_logging(
    service_config: &ServiceConfig,
) -> Vec<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::fmt::format::FmtSpan;

    let mut guards = Vec::new();

    // Stdout layer
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    guards.push(stdout_guard);

    let stdout_env_filter = EnvFilter::builder()
        .with_default_directive(service_config.log_level.into())
        .from_env_lossy();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_filter(stdout_env_filter);

    if let Some(log_dir) = &service_config.log_dir {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!(
                "Warning: Failed to create log directory {:?}: {}",
                log_dir, e
            );
        }

        let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
        let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        guards.push(file_guard);

        let file_env_filter = EnvFilter::builder()
            .with_default_directive(service_config.log_level.into())
            .from_env_lossy();

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(file_env_filter);

        tracing_subscriber::registry()
            .with(stdout_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry().with(stdout_layer).init();
    }

    utils::register_panic_logger();
    utils::report_build_info();

    guards
}

/// Open the application context, exiting on error.
async fn create_state(service_config: &ServiceConfig, passphrase: Option<&str>) -> State {
    let app = AppState::at(service_config.rmount_dir.clone());
    match State::open(&app, passphrase, service_config, true).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("error opening rmount state: {}", e);
            std::process::exit(3);
        }
    }
}

/// Runs the mount service in the foreground until SIGINT/SIGTERM.
///
/// - Takes the instance lock of the rmount directory
/// - Mounts every requested data source (failures are logged, not fatal)
/// - Reconciles the registry with live mount processes on an interval
/// - Unmounts everything it mounted on the way out
pub async fn spawn_service(service_config: &ServiceConfig, passphrase: Option<&str>) {
    let _guards = init_logging(service_config);

    let (graceful_waiter, _shutdown_tx, shutdown_rx) = match utils::graceful_shutdown_blocker() {
        Ok(blocker) => blocker,
        Err(e) => {
            tracing::error!("failed to install signal handlers: {}", e);
            std::process::exit(2);
        }
    };
    let state = create_state(service_config, passphrase).await;

    if !RcloneDriver::new(&service_config.rmount_dir)
        .is_available()
        .await
    {
        tracing::warn!("rclone was not found on PATH; mounts will fail until it is installed");
    }

    for request in &service_config.mounts {
        if let Err(e) = state.mount(&request.name, &request.remote).await {
            tracing::error!(name = %request.name, "mount failed: {}", e);
        }
    }

    let reconciler = Arc::new(state.reconciler(service_config.reconcile_interval));
    let reconciler_handle = reconciler.spawn(shutdown_rx);

    let mount_count = state.mounts().await.len();
    tracing::info!(
        mounts = mount_count,
        interval_secs = service_config.reconcile_interval.as_secs(),
        "rmount running"
    );

    let _ = graceful_waiter.await;

    if timeout(FINAL_SHUTDOWN_TIMEOUT, reconciler_handle)
        .await
        .is_err()
    {
        tracing::error!(
            "Failed to shut down within {} seconds",
            FINAL_SHUTDOWN_TIMEOUT.as_secs()
        );
        std::process::exit(4);
    }

    state.shutdown().await;
}

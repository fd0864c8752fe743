use crate::monitor::MonitorReport;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Start logging. `RUST_LOG` overrides the default `info` level.
pub fn start_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// Cancel `cancel` on Ctrl-C so the monitor loop can stop between samples.
pub fn handle_shutdown(cancel: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to handle termination signal: {:?}", e);
            return;
        }
        info!("Monitor is shutting down...");
        cancel.cancel();
    });
}

/// Emit the final run report as a single JSON line.
pub fn log_report(report: &MonitorReport) {
    match serde_json::to_string(report) {
        Ok(json) => info!(report = %json, "Run summary"),
        Err(e) => error!("Failed to serialize run summary: {:?}", e),
    }
}

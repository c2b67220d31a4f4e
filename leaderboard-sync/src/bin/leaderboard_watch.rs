/// Headless leaderboard watcher
///
/// Runs the sync engine against the API configured through `LEADERBOARD_*`
/// environment variables and logs what a dashboard would show: connection
/// status, poll failures and a one line summary per accepted snapshot.
///
/// Set `LEADERBOARD_EXPORT_ON_EXIT=1` to write the current view as CSV into the
/// working directory on Ctrl-C.
use leaderboard_sync::{
    export_file_name, format_currency, format_wallet, LeaderboardView, SortKey, SortOrder,
    SyncConfig, SyncEngine,
};
use rust_decimal::Decimal;
use rustls::crypto::ring::default_provider;
use std::error::Error;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _ = default_provider().install_default();

    // Initialize logging
    init_logging();

    let config = SyncConfig::from_env()?;
    let export_on_exit = std::env::var("LEADERBOARD_EXPORT_ON_EXIT")
        .map(|value| value == "1")
        .unwrap_or(false);

    let mut engine = SyncEngine::with_http(config);
    let mut view_rx = engine.subscribe_view();
    let mut connection_rx = engine.watch_connection();
    let mut failure_rx = engine.subscribe_failures();

    engine.start();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            changed = view_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = view_rx.borrow_and_update().clone();
                log_summary(&view);
            }
            changed = connection_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *connection_rx.borrow_and_update();
                info!(%state, "connection status");
            }
            failure = failure_rx.recv() => match failure {
                Ok(failure) => warn!(
                    timeframe = %failure.timeframe,
                    transient = failure.error.is_transient(),
                    "poll failed: {}",
                    failure.error
                ),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "missed poll failures"),
                Err(RecvError::Closed) => break,
            },
            _ = &mut shutdown => {
                info!("Ctrl-C received, shutting down");
                break;
            }
        }
    }

    engine.stop();

    if export_on_exit {
        let view = engine.current();
        let path = export_file_name(engine.timeframe(), chrono::Utc::now().date_naive());
        let csv = view.export_csv(SortKey::Roi, SortOrder::Desc, "");
        match tokio::fs::write(&path, csv).await {
            Ok(()) => info!(path = %path, entries = view.entries.len(), "exported leaderboard"),
            Err(e) => error!(path = %path, "failed to export leaderboard: {}", e),
        }
    }

    Ok(())
}

fn log_summary(view: &LeaderboardView) {
    let top = view
        .stats
        .top_performer
        .as_deref()
        .map(format_wallet)
        .unwrap_or_else(|| "N/A".to_string());

    info!(
        revision = ?view.revision,
        source = ?view.source,
        rejected = view.rejected_snapshots,
        "{} traders | volume {} | pnl {} | avg roi {} | top {}",
        view.stats.total_traders,
        metric(view.stats.total_volume, format_currency),
        metric(view.stats.total_pnl, format_currency),
        metric(view.stats.average_roi, |roi| format!("{:.2}%", roi)),
        top,
    );
}

/// Withheld metrics exceeded decimal precision
fn metric(value: Option<Decimal>, format: impl Fn(Decimal) -> String) -> String {
    value.map(format).unwrap_or_else(|| "N/A".to_string())
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use bookd::engine::Engine;
use bookd::notify::NotifyHub;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("BOOKD_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    bookd::observability::init(metrics_port);

    let data_dir = std::env::var("BOOKD_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let compact_threshold: u64 = std::env::var("BOOKD_COMPACT_THRESHOLD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);

    std::fs::create_dir_all(&data_dir)?;
    let wal_path = PathBuf::from(&data_dir).join("bookd.wal");

    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::new(wal_path, notify)?);

    info!("bookd engine up");
    info!("  data_dir: {data_dir}");
    info!("  restaurants: {}", engine.state.len());
    info!("  compact_threshold: {compact_threshold}");
    info!(
        "  metrics: {}",
        metrics_port.map_or("disabled".to_string(), |p| format!(
            "http://0.0.0.0:{p}/metrics"
        ))
    );

    tokio::spawn(bookd::compactor::run_compactor(
        engine.clone(),
        compact_threshold,
    ));

    // The API front-end embeds this crate and drives the engine directly;
    // running standalone just keeps the WAL compacted and metrics served.
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("received ctrl-c"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
        info!("received ctrl-c");
    }

    // One final compaction so the next start replays a minimal log
    if let Err(e) = engine.compact_wal().await {
        tracing::warn!("final compaction failed: {e}");
    }
    info!("bookd shut down");
    Ok(())
}

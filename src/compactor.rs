use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that rewrites the WAL once enough appends have
/// accumulated since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        maybe_compact(&engine, threshold).await;
    }
}

/// One compaction decision: compact if the append count reached the threshold.
pub async fn maybe_compact(engine: &Engine, threshold: u64) {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return;
    }
    match engine.compact_wal().await {
        Ok(()) => info!("compacted WAL after {appends} appends"),
        Err(e) => tracing::warn!("WAL compaction failed: {e}"),
    }
}

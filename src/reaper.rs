use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;

const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that rewrites the WAL once enough appends have piled up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_due(&engine, threshold).await;
    }
}

async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            info!("compacted WAL after {appends} appends");
            true
        }
        Err(e) => {
            tracing::warn!("WAL compaction failed: {e}");
            false
        }
    }
}

/// Background task that marks confirmed tours completed once their block is over.
pub async fn run_tour_sweeper(engine: Arc<Engine>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        sweep_tours(&engine).await;
    }
}

async fn sweep_tours(engine: &Engine) -> usize {
    let finished = engine.collect_finished_tours(engine.now_ms()).await;
    let mut completed = 0;
    for id in finished {
        match engine.complete_tour(id).await {
            Ok(_) => {
                info!("swept tour {id} to completed");
                completed += 1;
            }
            // Cancelled or completed by an admin in the meantime.
            Err(e) => tracing::debug!("sweeper skip {id}: {e}"),
        }
    }
    completed
}

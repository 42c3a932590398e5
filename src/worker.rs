use std::sync::Arc;
use tokio::time::{Duration, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::content::ContentService;
use crate::rate_limit::FileStore;

// Background sweeper - drops expired content cache entries until shutdown
pub async fn cache_sweeper(
    content: Arc<ContentService>,
    every: Duration,
    shutdown: CancellationToken,
) {
    let mut interval = interval(every);

    info!(interval = ?every, "Content cache sweeper started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Content cache sweeper stopped");
                return;
            }
            _ = interval.tick() => {
                let removed = content.evict_expired();
                if removed > 0 {
                    debug!(removed, remaining = content.cached_entries(), "Evicted expired content");
                }
            }
        }
    }
}

// Background flusher - writes pending rate limit state to disk, and once more on shutdown
pub async fn store_flusher(store: Arc<FileStore>, every: Duration, shutdown: CancellationToken) {
    let mut interval = interval(every);

    info!(interval = ?every, "Rate limit store flusher started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                flush(&store).await;
                info!("Rate limit store flusher stopped");
                return;
            }
            _ = interval.tick() => flush(&store).await,
        }
    }
}

// file io stays off the async workers
async fn flush(store: &Arc<FileStore>) {
    if !store.is_dirty() {
        return;
    }
    let store = Arc::clone(store);
    match tokio::task::spawn_blocking(move || store.flush()).await {
        Ok(Ok(_)) => debug!("Rate limit store flushed"),
        Ok(Err(e)) => warn!(error = %e, "Failed to flush rate limit store"),
        Err(e) => warn!(error = %e, "Rate limit store flush task failed"),
    }
}

//! Background sweep of expired documents.
//!
//! Complements the lazy expiry check in `DocumentStorage::load`: reads never
//! serve an expired document, and the reaper reclaims the space of documents
//! nobody reads again. Backends with native expiry make each sweep a no-op.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::storage::DocumentStorage;

/// Start the reaper on the current tokio runtime.
///
/// The first sweep runs immediately. Cancel the returned token to stop it.
pub fn spawn_reaper(storage: Arc<DocumentStorage>, every: Duration) -> CancellationToken {
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    tokio::spawn(async move {
        run_reaper_loop(storage, every, cancel_clone).await;
    });

    cancel
}

async fn run_reaper_loop(storage: Arc<DocumentStorage>, every: Duration, cancel: CancellationToken) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        interval_secs = every.as_secs(),
        kind = %storage.kind(),
        "Expiry reaper started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Expiry reaper shutting down");
                break;
            }
            _ = ticker.tick() => {
                sweep_once(&storage).await;
            }
        }
    }
}

async fn sweep_once(storage: &DocumentStorage) {
    match storage.sweep_expired().await {
        Ok(0) => debug!("Expiry sweep: nothing to remove"),
        Ok(removed) => debug!(removed, "Expiry sweep completed"),
        Err(e) => warn!(error = %e, "Expiry sweep failed"),
    }
}

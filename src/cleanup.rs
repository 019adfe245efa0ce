use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::repository::{RepoResult, RepositoryState};

/// Settings for the unverified-account sweep.
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Seconds between sweeps.
    pub interval_secs: u64,
    /// Unverified accounts older than this are deleted.
    pub unverified_ttl_hours: i64,
}

/// Deletes every unverified user created more than `ttl_hours` ago. Returns the count.
pub async fn sweep_unverified_users(repo: &RepositoryState, ttl_hours: i64) -> RepoResult<u64> {
    let cutoff = Utc::now() - ChronoDuration::hours(ttl_hours);
    repo.delete_unverified_before(cutoff).await
}

/// Start the background sweep loop.
///
/// The first sweep runs immediately, so accounts that expired while the server was
/// down are removed at boot. Returns a CancellationToken that stops the loop.
pub fn start(repo: RepositoryState, config: CleanupConfig) -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let interval = Duration::from_secs(config.interval_secs.max(1));
    let ttl_hours = config.unverified_ttl_hours;

    tokio::spawn(async move {
        info!("unverified user cleanup started (interval={interval:?}, ttl={ttl_hours}h)");
        let mut delay = Duration::ZERO;
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("unverified user cleanup stopped");
                    break;
                }
                _ = tokio::time::sleep(delay) => {
                    debug!("unverified user sweep");
                    match sweep_unverified_users(&repo, ttl_hours).await {
                        Ok(0) => {}
                        Ok(n) => info!(deleted = n, "removed unverified users"),
                        Err(e) => error!("unverified user sweep failed: {e}"),
                    }
                    delay = interval;
                }
            }
        }
    });

    cancel
}

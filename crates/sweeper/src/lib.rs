//! Periodic cleanup of expired credential rows.
//!
//! Each pass deletes refresh tokens past their expiry and OAuth state entries
//! past their TTL. Revoked refresh tokens that have not yet expired are kept
//! so that reuse of a rotated token is still reported as revoked.

use std::time::Duration;

use chrono::Utc;
use idforge_db::{DbResult, Repositories};
use tokio_util::sync::CancellationToken;

/// Default time between passes.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3600); // 1 hour

/// Rows removed by one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub refresh_tokens: u64,
    pub oauth_states: u64,
}

/// Run a single cleanup pass.
pub async fn sweep_once(repos: &Repositories) -> DbResult<SweepReport> {
    let now = Utc::now();
    let refresh_tokens = repos.refresh_tokens.delete_expired(now).await?;
    let oauth_states = repos.oauth_states.purge_expired(now).await?;
    Ok(SweepReport {
        refresh_tokens,
        oauth_states,
    })
}

/// Run the cleanup loop until `cancel` is triggered.
///
/// The first pass runs immediately. A failed pass is logged and retried on
/// the next tick.
pub async fn run(repos: Repositories, interval: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = interval.as_secs(), "Credential sweeper started");

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Credential sweeper stopping");
                break;
            }
            _ = ticker.tick() => {
                match sweep_once(&repos).await {
                    Ok(report) if report == SweepReport::default() => {
                        tracing::debug!("Credential sweep: nothing to purge");
                    }
                    Ok(report) => {
                        tracing::info!(
                            refresh_tokens = report.refresh_tokens,
                            oauth_states = report.oauth_states,
                            "Credential sweep: purged expired rows"
                        );
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Credential sweep failed");
                    }
                }
            }
        }
    }
}

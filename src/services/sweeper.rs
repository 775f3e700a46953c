//! Expired session sweeper
//!
//! Background task deleting every expired session on a fixed interval. The
//! first sweep runs immediately at startup. A failed sweep is logged and the
//! next tick tries again.
//!
//! The shutdown signal is only observed between sweeps, so a delete that has
//! started always runs to completion.

use crate::db::repositories::SessionRepository;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Deletes expired sessions store-wide
#[derive(Clone)]
pub struct SessionSweeper {
    session_repo: Arc<dyn SessionRepository>,
}

impl SessionSweeper {
    pub fn new(session_repo: Arc<dyn SessionRepository>) -> Self {
        Self { session_repo }
    }

    /// Delete every session that expired before `now`.
    ///
    /// Returns the number of sessions removed.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<u64> {
        let deleted = self.session_repo.delete_expired(now).await?;
        if deleted > 0 {
            tracing::info!(deleted, "Expired sessions cleaned up");
        } else {
            tracing::debug!("No expired sessions to clean up");
        }
        Ok(deleted)
    }
}

/// Spawn the sweeper loop.
///
/// The task exits once `shutdown` becomes `true` or its sender is dropped.
pub fn spawn_session_sweeper(
    session_repo: Arc<dyn SessionRepository>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let sweeper = SessionSweeper::new(session_repo);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("Session sweeper started (interval: {:?})", interval);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = sweeper.run_once(Utc::now()).await {
                        tracing::error!("Session sweep failed: {:#}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Session sweeper stopped");
    })
}

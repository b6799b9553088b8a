//! In-process periodic loops for refresh, reconcile, and expire.
//!
//! Each loop awaits its own cycle before waiting for the next tick, so a
//! slow cycle delays its successor instead of overlapping it. Missed ticks
//! are skipped. The first tick fires immediately, which populates the repo
//! directory at startup.

use std::sync::Arc;
use std::time::Duration;

use lifecycle_core::config::ScheduleConfig;
use lifecycle_core::expire::Expirer;
use lifecycle_core::reconcile::Reconciler;
use lifecycle_core::refresh::{RefreshOutcome, RepoMapRefresher};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub refresh: Duration,
    pub reconcile: Duration,
    pub expire: Duration,
}

impl Cadence {
    pub fn from_config(cfg: &ScheduleConfig) -> Self {
        // interval() rejects a zero period
        let secs = |s: u64| Duration::from_secs(s.max(1));
        Self {
            refresh: secs(cfg.refresh_secs),
            reconcile: secs(cfg.reconcile_secs),
            expire: secs(cfg.expire_secs),
        }
    }
}

pub struct Scheduler {
    refresher: Arc<RepoMapRefresher>,
    reconciler: Arc<Reconciler>,
    expirer: Arc<Expirer>,
    cadence: Cadence,
}

impl Scheduler {
    pub fn new(
        refresher: Arc<RepoMapRefresher>,
        reconciler: Arc<Reconciler>,
        expirer: Arc<Expirer>,
        cadence: Cadence,
    ) -> Self {
        Self {
            refresher,
            reconciler,
            expirer,
            cadence,
        }
    }

    /// Spawn the three loops onto the current runtime.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        let Scheduler {
            refresher,
            reconciler,
            expirer,
            cadence,
        } = self;

        let refresh = tokio::spawn(async move {
            let mut ticker = interval(cadence.refresh);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match refresher.refresh().await {
                    Ok(RefreshOutcome::NotModified) => debug!("repo directory unchanged"),
                    Ok(RefreshOutcome::Replaced { repos, .. }) => {
                        info!(repos, "repo directory refreshed")
                    }
                    Err(e) => error!("repo directory refresh failed: {e}"),
                }
            }
        });

        let reconcile = tokio::spawn(async move {
            let mut ticker = interval(cadence.reconcile);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = reconciler.reconcile().await {
                    error!("reconcile cycle aborted: {e}");
                }
            }
        });

        let expire = tokio::spawn(async move {
            let mut ticker = interval(cadence.expire);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                expirer.sweep().await;
            }
        });

        info!(
            refresh_secs = cadence.refresh.as_secs(),
            reconcile_secs = cadence.reconcile.as_secs(),
            expire_secs = cadence.expire.as_secs(),
            "periodic loops started"
        );
        vec![refresh, reconcile, expire]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_cadence_is_clamped() {
        let cfg = ScheduleConfig {
            refresh_secs: 0,
            reconcile_secs: 300,
            expire_secs: 86_400,
            reconcile_concurrency: 1,
        };
        let c = Cadence::from_config(&cfg);
        assert_eq!(c.refresh, Duration::from_secs(1));
        assert_eq!(c.reconcile, Duration::from_secs(300));
    }
}

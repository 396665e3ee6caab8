//! CoordinatorService processor.
//!
//! The CoordinatorService is responsible for:
//! - Owning the [`Coordinator`] and feeding it `CoordinatorEvent`s one at a
//!   time, which serializes every state mutation
//! - Running the expiry sweep on a fixed interval
//! - Sleeping until the next completed-match eviction is due
//! - Reacting to matchmaking config changes by rebuilding the sweep interval

use crate::config::{ConfigStore, ConfigWatcher, MatchmakingConfig};
use crate::coordinator::Coordinator;
use crate::events::CoordinatorEventReceiver;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

pub struct CoordinatorService {
    coordinator: Coordinator,
}

impl CoordinatorService {
    pub fn new(coordinator: Coordinator) -> Self {
        Self { coordinator }
    }

    /// Run until shutdown is signaled or every event sender is dropped.
    pub async fn run(
        mut self,
        mut shutdown_rx: watch::Receiver<bool>,
        mut event_rx: CoordinatorEventReceiver,
        config_store: ConfigStore<MatchmakingConfig>,
        mut config_watcher: ConfigWatcher,
    ) {
        let config = config_store.snapshot().await;
        self.coordinator.update_config(config);
        let mut sweep = sweep_interval(&config);
        info!(
            ttl_secs = config.pre_commitment_ttl.whole_seconds(),
            sweep_secs = config.sweep_interval.whole_seconds(),
            "CoordinatorService started"
        );

        loop {
            let next_eviction = self.coordinator.next_eviction();

            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("CoordinatorService received shutdown signal");
                        break;
                    }
                }

                Ok(()) = config_watcher.changed() => {
                    let config = config_store.snapshot().await;
                    self.coordinator.update_config(config);
                    sweep = sweep_interval(&config);
                    info!(
                        ttl_secs = config.pre_commitment_ttl.whole_seconds(),
                        sweep_secs = config.sweep_interval.whole_seconds(),
                        "CoordinatorService applied new matchmaking config"
                    );
                }

                event = event_rx.recv() => {
                    let Some(event) = event else {
                        info!("CoordinatorEvent channel closed");
                        break;
                    };
                    self.coordinator.handle_event(event, OffsetDateTime::now_utc());
                }

                _ = sweep.tick() => {
                    debug!("Running expiry sweep");
                    self.coordinator.sweep(OffsetDateTime::now_utc());
                }

                _ = sleep_until(next_eviction) => {
                    self.coordinator.evict_due(OffsetDateTime::now_utc());
                }
            }
        }

        info!("CoordinatorService shutdown complete");
    }
}

fn sweep_interval(config: &MatchmakingConfig) -> Interval {
    let period = config.sweep_period();
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Sleep until `deadline`, or forever when there is none.
async fn sleep_until(deadline: Option<OffsetDateTime>) {
    match deadline {
        Some(at) => {
            let wait = at - OffsetDateTime::now_utc();
            let wait = std::time::Duration::try_from(wait).unwrap_or_default();
            tokio::time::sleep(wait).await;
        }
        None => std::future::pending().await,
    }
}

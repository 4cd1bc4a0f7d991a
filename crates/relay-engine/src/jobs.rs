//! Background maintenance tasks.
//!
//! Each job is an independent tokio task: the batch scheduler loop, the
//! cache sweep, the history prune, and periodic persistence of decision
//! state. All of them stop when the shared `watch` shutdown flag flips.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use relay_decision::{DecisionEngine, PersistencePort};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::context::RelayContext;

/// Handles to the running background jobs.
pub struct BackgroundJobs {
    ctx: RelayContext,
    shutdown: watch::Sender<bool>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl BackgroundJobs {
    /// Spawn every job the configuration enables.
    pub fn start(ctx: &RelayContext) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let mut handles = Vec::new();
        let config = &ctx.config;

        handles.push(("batch", ctx.batch.start()));

        let cache = Arc::clone(&ctx.cache);
        handles.push((
            "cache_sweep",
            spawn_periodic(
                "cache_sweep",
                Duration::from_secs(config.cache.sweep_interval_secs.max(1)),
                rx.clone(),
                move || {
                    let removed = cache.sweep_expired();
                    if removed > 0 {
                        debug!(removed, "Swept expired cache entries");
                    }
                },
            ),
        ));

        let decisions = Arc::clone(&ctx.decisions);
        handles.push((
            "history_prune",
            spawn_periodic(
                "history_prune",
                Duration::from_secs(config.decision.prune_interval_secs.max(1)),
                rx.clone(),
                move || {
                    let removed = decisions.prune_history(Utc::now());
                    if removed > 0 {
                        info!(removed, "Pruned decision history");
                    }
                },
            ),
        ));

        if config.persistence.enabled {
            if let Some(port) = ctx.persistence.clone() {
                handles.push((
                    "persistence",
                    spawn_persistence(
                        Arc::clone(&ctx.decisions),
                        port,
                        Duration::from_secs(config.persistence.interval_secs.max(1)),
                        rx.clone(),
                    ),
                ));
            }
        }

        info!(jobs = handles.len(), "Background jobs started");
        Self {
            ctx: ctx.clone(),
            shutdown,
            handles,
        }
    }

    /// Stop every job, flush pending batches, and save decision state once
    /// more.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        self.ctx.batch.shutdown();

        for (name, handle) in self.handles {
            if let Err(e) = handle.await {
                warn!(job = name, error = %e, "Background job ended abnormally");
            }
        }

        if self.ctx.config.persistence.enabled {
            if let Some(port) = &self.ctx.persistence {
                save_state(&self.ctx.decisions, port.as_ref()).await;
            }
        }
        info!("Background jobs stopped");
    }
}

async fn save_state(decisions: &DecisionEngine, port: &dyn PersistencePort) {
    if let Err(e) = decisions.save_to(port).await {
        warn!(error = %e, "Failed to persist decision state");
    }
}

/// Run `job` every `period` until shutdown. The first run happens one
/// period after start.
fn spawn_periodic<F>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    job: F,
) -> JoinHandle<()>
where
    F: Fn() + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => job(),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!(job = name, "Background job stopped");
    })
}

fn spawn_persistence(
    decisions: Arc<DecisionEngine>,
    port: Arc<dyn PersistencePort>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => save_state(&decisions, port.as_ref()).await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!(job = "persistence", "Background job stopped");
    })
}

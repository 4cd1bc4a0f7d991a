//! Time-windowed batch scheduler.
//!
//! Batchable tasks are sent over a channel to a background loop that owns
//! the pending buffer. The loop flushes on every tick of the batch window and
//! as soon as the buffer reaches `max_batch_size`. Each flush issues one
//! collective remote call per task type; if that call fails, every item is
//! retried on its own so that siblings fail independently. Flushes still in
//! flight when the loop stops are awaited before it returns.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use relay_core::config::BatchConfig;
use relay_core::events::ActivityEvent;
use relay_core::types::Task;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::error::{RemoteError, RouteError};
use crate::metrics::RoutingMetrics;
use crate::remote::RemoteExecutor;

/// A task waiting for the next flush.
pub struct BatchItem {
    pub task: Task,
    pub cache_key: String,
    pub enqueued_at: Instant,
    completion: oneshot::Sender<Result<Value, RemoteError>>,
}

impl BatchItem {
    /// Resolve the caller's handle. A caller that stopped waiting is ignored.
    fn complete(self, result: Result<Value, RemoteError>) {
        let _ = self.completion.send(result);
    }
}

/// Pending result of a submitted batch item.
pub struct BatchHandle {
    rx: oneshot::Receiver<Result<Value, RemoteError>>,
}

impl BatchHandle {
    /// Wait for the item's batch (or fallback) result.
    pub async fn wait(self) -> Result<Value, RouteError> {
        match self.rx.await {
            Ok(result) => result.map_err(RouteError::from),
            Err(_) => Err(RouteError::BatchClosed),
        }
    }
}

/// Executes flushed groups against the remote collaborator.
struct BatchFlusher {
    remote: Arc<dyn RemoteExecutor>,
    cache: Arc<CacheStore>,
    metrics: Arc<RoutingMetrics>,
    events: broadcast::Sender<ActivityEvent>,
}

impl BatchFlusher {
    async fn flush(&self, items: Vec<BatchItem>) {
        // Group by task type, keeping first-appearance order across groups
        // and submission order within each group.
        let mut groups: Vec<(String, Vec<BatchItem>)> = Vec::new();
        for item in items {
            match groups.iter_mut().find(|(t, _)| *t == item.task.task_type) {
                Some((_, group)) => group.push(item),
                None => groups.push((item.task.task_type.clone(), vec![item])),
            }
        }

        for (task_type, group) in groups {
            self.flush_group(&task_type, group).await;
        }
    }

    async fn flush_group(&self, task_type: &str, items: Vec<BatchItem>) {
        let started = Instant::now();
        let size = items.len();
        let oldest_wait_ms = items
            .iter()
            .map(|i| started.duration_since(i.enqueued_at).as_millis())
            .max()
            .unwrap_or(0);
        let tasks: Vec<Task> = items.iter().map(|i| i.task.clone()).collect();

        let outcome = self.remote.execute_batch(task_type, &tasks).await;
        if !matches!(outcome, Err(RemoteError::BatchUnsupported)) {
            self.metrics.record_remote_call();
        }

        let succeeded = match outcome {
            Ok(results) if results.len() == size => {
                let calls_saved = size as u64 - 1;
                self.metrics.record_batch_flush(size, calls_saved);
                for (item, value) in items.into_iter().zip(results) {
                    self.cache.put(&item.cache_key, &value);
                    item.complete(Ok(value));
                }
                true
            }
            Ok(results) => {
                warn!(
                    task_type,
                    expected = size,
                    received = results.len(),
                    "Batch result count mismatch; falling back to per-item execution"
                );
                self.metrics.record_batch_flush(size, 0);
                self.fallback(items).await;
                false
            }
            Err(e) => {
                warn!(task_type, size, error = %e, "Batch call failed; falling back to per-item execution");
                self.metrics.record_batch_flush(size, 0);
                self.fallback(items).await;
                false
            }
        };

        let elapsed = started.elapsed();
        debug!(
            task_type,
            size,
            succeeded,
            oldest_wait_ms = oldest_wait_ms as u64,
            elapsed_ms = elapsed.as_millis() as u64,
            "Batch group flushed"
        );

        let _ = self.events.send(ActivityEvent::BatchFlushed {
            task_type: task_type.to_string(),
            size,
            succeeded,
            processing_duration_ms: elapsed.as_millis() as u64,
            calls_saved: if succeeded { size as u64 - 1 } else { 0 },
            timestamp: Utc::now(),
        });
    }

    /// Execute each item on its own. One item's failure never affects another.
    async fn fallback(&self, items: Vec<BatchItem>) {
        let mut set = JoinSet::new();
        for item in items {
            let remote = Arc::clone(&self.remote);
            let cache = Arc::clone(&self.cache);
            let metrics = Arc::clone(&self.metrics);
            set.spawn(async move {
                metrics.record_remote_call();
                let result = remote.execute(&item.task).await;
                match &result {
                    Ok(value) => cache.put(&item.cache_key, value),
                    Err(e) => debug!(task_type = %item.task.task_type, error = %e, "Fallback item failed"),
                }
                item.complete(result);
            });
        }
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Fallback execution task panicked");
            }
        }
    }
}

/// Background scheduler that coalesces batchable tasks.
pub struct BatchScheduler {
    batchable: HashSet<String>,
    interval: Duration,
    max_batch_size: usize,
    sender: mpsc::UnboundedSender<BatchItem>,
    receiver: Mutex<mpsc::UnboundedReceiver<BatchItem>>,
    flusher: Arc<BatchFlusher>,
    shutdown: Arc<Notify>,
    running: AtomicBool,
}

impl BatchScheduler {
    /// Create a scheduler for the given batchable task types.
    ///
    /// Nothing is flushed until [`BatchScheduler::run`] is driven.
    pub fn new(
        config: &BatchConfig,
        batchable: impl IntoIterator<Item = String>,
        remote: Arc<dyn RemoteExecutor>,
        cache: Arc<CacheStore>,
        metrics: Arc<RoutingMetrics>,
        events: broadcast::Sender<ActivityEvent>,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            batchable: batchable.into_iter().collect(),
            interval: Duration::from_millis(config.interval_ms.max(1)),
            max_batch_size: config.max_batch_size.max(1),
            sender,
            receiver: Mutex::new(receiver),
            flusher: Arc::new(BatchFlusher {
                remote,
                cache,
                metrics,
                events,
            }),
            shutdown: Arc::new(Notify::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Whether tasks of this type are coalesced.
    pub fn is_batchable(&self, task_type: &str) -> bool {
        self.batchable.contains(task_type)
    }

    /// Whether the flush loop has been started.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Queue a task for the next flush. Never blocks.
    ///
    /// Fails with [`RouteError::SchedulerNotRunning`] until the flush loop
    /// has been started, and with [`RouteError::BatchClosed`] after shutdown.
    pub fn submit(&self, task: Task, cache_key: String) -> Result<BatchHandle, RouteError> {
        if !self.is_running() {
            return Err(RouteError::SchedulerNotRunning);
        }
        let (completion, rx) = oneshot::channel();
        let item = BatchItem {
            task,
            cache_key,
            enqueued_at: Instant::now(),
            completion,
        };
        self.sender
            .send(item)
            .map_err(|_| RouteError::BatchClosed)?;
        Ok(BatchHandle { rx })
    }

    /// Spawn the flush loop on the current runtime.
    ///
    /// Submissions are accepted from the moment this returns.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        self.running.store(true, Ordering::Release);
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.run().await })
    }

    /// Run the flush loop until [`BatchScheduler::shutdown`] is called.
    ///
    /// On shutdown the queue is closed to new submissions, everything still
    /// pending is flushed, and flushes already in flight are awaited before
    /// this returns.
    pub async fn run(&self) {
        self.running.store(true, Ordering::Release);
        let mut rx = self.receiver.lock().await;
        let mut pending: Vec<BatchItem> = Vec::new();
        let mut in_flight: JoinSet<()> = JoinSet::new();
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_ms = self.interval.as_millis() as u64,
            max_batch_size = self.max_batch_size,
            "Batch scheduler started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                _ = tick.tick() => {
                    if !pending.is_empty() {
                        self.spawn_flush(&mut in_flight, std::mem::take(&mut pending));
                    }
                }
                received = rx.recv() => match received {
                    Some(item) => {
                        pending.push(item);
                        if pending.len() >= self.max_batch_size {
                            self.spawn_flush(&mut in_flight, std::mem::take(&mut pending));
                        }
                    }
                    None => break,
                },
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    log_flush_join(joined);
                }
            }
        }

        rx.close();
        while let Ok(item) = rx.try_recv() {
            pending.push(item);
        }
        while !pending.is_empty() {
            let rest = pending.split_off(pending.len().min(self.max_batch_size));
            self.flusher.flush(pending).await;
            pending = rest;
        }
        while let Some(joined) = in_flight.join_next().await {
            log_flush_join(joined);
        }

        info!("Batch scheduler stopped");
    }

    fn spawn_flush(&self, in_flight: &mut JoinSet<()>, items: Vec<BatchItem>) {
        let flusher = Arc::clone(&self.flusher);
        in_flight.spawn(async move {
            flusher.flush(items).await;
        });
    }

    /// Signal the scheduler loop to flush what is pending and stop.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

fn log_flush_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        warn!(error = %e, "Batch flush task panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockRemote;
    use serde_json::json;

    struct Harness {
        scheduler: Arc<BatchScheduler>,
        remote: Arc<MockRemote>,
        cache: Arc<CacheStore>,
        metrics: Arc<RoutingMetrics>,
        join: JoinHandle<()>,
    }

    fn harness(remote: MockRemote, interval_ms: u64, max_batch_size: usize) -> Harness {
        let remote = Arc::new(remote);
        let cache = Arc::new(CacheStore::new(Duration::from_secs(60), 100));
        let metrics = Arc::new(RoutingMetrics::new());
        let (events, _) = broadcast::channel(16);
        let config = BatchConfig {
            interval_ms,
            max_batch_size,
        };
        let scheduler = Arc::new(BatchScheduler::new(
            &config,
            ["notification".to_string(), "inventory_check".to_string()],
            remote.clone(),
            Arc::clone(&cache),
            Arc::clone(&metrics),
            events,
        ));
        let join = scheduler.start();
        Harness {
            scheduler,
            remote,
            cache,
            metrics,
            join,
        }
    }

    fn submit(h: &Harness, task_type: &str, payload: Value) -> BatchHandle {
        let task = Task::new(task_type, payload);
        let key = task.cache_key();
        h.scheduler.submit(task, key).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_resolves_items_in_order_and_credits_savings() {
        let h = harness(MockRemote::new(), 100, 10);
        let handles: Vec<BatchHandle> = (0..4)
            .map(|i| submit(&h, "notification", json!({"n": i})))
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let value = handle.wait().await.unwrap();
            assert_eq!(value["echo"]["n"], json!(i));
            assert_eq!(value["via"], "batch");
        }

        assert_eq!(h.remote.batch_calls(), vec![("notification".to_string(), 4)]);
        assert_eq!(h.remote.single_calls(), 0);
        let c = h.metrics.counters();
        assert_eq!(c.batched_requests, 4);
        assert_eq!(c.api_calls_saved, 3);
        assert_eq!(h.cache.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collective_failure_falls_back_per_item() {
        let h = harness(MockRemote::new().failing_batches(), 100, 10);
        let ok = submit(&h, "notification", json!({"n": 1}));
        let bad = submit(&h, "notification", json!({"n": 2, "fail": true}));
        let ok2 = submit(&h, "notification", json!({"n": 3}));

        assert_eq!(ok.wait().await.unwrap()["via"], "single");
        assert!(matches!(bad.wait().await, Err(RouteError::Remote(RemoteError::Failed(_)))));
        assert_eq!(ok2.wait().await.unwrap()["echo"]["n"], 3);

        assert_eq!(h.remote.single_calls(), 3);
        let c = h.metrics.counters();
        assert_eq!(c.batched_requests, 3);
        assert_eq!(c.api_calls_saved, 0);
        // Only the successful items are cached.
        assert_eq!(h.cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_count_mismatch_falls_back() {
        let h = harness(MockRemote::new().short_batches(), 100, 10);
        let a = submit(&h, "notification", json!({"n": 1}));
        let b = submit(&h, "notification", json!({"n": 2}));
        assert_eq!(a.wait().await.unwrap()["via"], "single");
        assert_eq!(b.wait().await.unwrap()["via"], "single");
        assert_eq!(h.metrics.counters().api_calls_saved, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_threshold_flushes_before_window() {
        let h = harness(MockRemote::new(), 3_600_000, 3);
        let handles: Vec<BatchHandle> = (0..3)
            .map(|i| submit(&h, "inventory_check", json!({"sku": i})))
            .collect();
        for handle in handles {
            let result = tokio::time::timeout(Duration::from_secs(1), handle.wait())
                .await
                .expect("size threshold should flush before the window elapses");
            assert!(result.is_ok());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_types_flush_as_separate_groups() {
        let h = harness(MockRemote::new(), 100, 10);
        let a1 = submit(&h, "notification", json!({"n": 1}));
        let b1 = submit(&h, "inventory_check", json!({"sku": 1}));
        let a2 = submit(&h, "notification", json!({"n": 2}));

        a1.wait().await.unwrap();
        b1.wait().await.unwrap();
        a2.wait().await.unwrap();

        assert_eq!(
            h.remote.batch_calls(),
            vec![
                ("notification".to_string(), 2),
                ("inventory_check".to_string(), 1)
            ]
        );
        let c = h.metrics.counters();
        assert_eq!(c.batched_requests, 3);
        assert_eq!(c.api_calls_saved, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_item_is_still_executed() {
        let h = harness(MockRemote::new(), 100, 10);
        let kept = submit(&h, "notification", json!({"n": 1}));
        let task = Task::new("notification", json!({"n": 2}));
        let dropped_key = task.cache_key();
        drop(h.scheduler.submit(task, dropped_key.clone()).unwrap());

        kept.wait().await.unwrap();
        assert_eq!(h.remote.batch_calls(), vec![("notification".to_string(), 2)]);
        assert!(h.cache.contains(&dropped_key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_pending_and_closes_queue() {
        let remote = Arc::new(MockRemote::new());
        let cache = Arc::new(CacheStore::new(Duration::from_secs(60), 100));
        let metrics = Arc::new(RoutingMetrics::new());
        let (events, mut events_rx) = broadcast::channel(16);
        let scheduler = Arc::new(BatchScheduler::new(
            &BatchConfig {
                interval_ms: 3_600_000,
                max_batch_size: 10,
            },
            ["notification".to_string()],
            remote.clone(),
            cache,
            metrics,
            events,
        ));

        let join = scheduler.start();
        let task = Task::new("notification", json!({"n": 1}));
        let key = task.cache_key();
        let handle = scheduler.submit(task, key).unwrap();
        scheduler.shutdown();
        tokio::time::timeout(Duration::from_secs(2), join)
            .await
            .expect("scheduler should stop within timeout")
            .unwrap();

        assert!(handle.wait().await.is_ok());
        let late = Task::new("notification", json!({"n": 2}));
        let late_key = late.cache_key();
        assert!(matches!(
            scheduler.submit(late, late_key),
            Err(RouteError::BatchClosed)
        ));

        match events_rx.recv().await.unwrap() {
            ActivityEvent::BatchFlushed { size, succeeded, .. } => {
                assert_eq!(size, 1);
                assert!(succeeded);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_flush_in_flight() {
        let h = harness(
            MockRemote::new().with_delay(Duration::from_millis(200)),
            50,
            10,
        );
        let task = Task::new("notification", json!({"n": 1}));
        let key = task.cache_key();
        drop(h.scheduler.submit(task, key.clone()).unwrap());

        // A tick has started the flush; the remote call is still running.
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(h.remote.batch_calls().len(), 1);
        assert!(!h.cache.contains(&key));

        h.scheduler.shutdown();
        h.join.await.unwrap();

        assert!(h.cache.contains(&key));
        let c = h.metrics.counters();
        assert_eq!(c.batched_requests, 1);
    }

    #[tokio::test]
    async fn test_submit_requires_started_loop() {
        let (events, _) = broadcast::channel(4);
        let scheduler = Arc::new(BatchScheduler::new(
            &BatchConfig::default(),
            ["notification".to_string()],
            Arc::new(MockRemote::new()),
            Arc::new(CacheStore::new(Duration::from_secs(60), 10)),
            Arc::new(RoutingMetrics::new()),
            events,
        ));
        let task = Task::new("notification", json!({"n": 1}));
        assert!(!scheduler.is_running());
        assert!(matches!(
            scheduler.submit(task.clone(), task.cache_key()),
            Err(RouteError::SchedulerNotRunning)
        ));

        let join = scheduler.start();
        assert!(scheduler.is_running());
        let handle = scheduler.submit(task.clone(), task.cache_key()).unwrap();
        assert_eq!(handle.wait().await.unwrap()["via"], "batch");

        scheduler.shutdown();
        join.await.unwrap();
    }

    #[test]
    fn test_is_batchable() {
        let (events, _) = broadcast::channel(1);
        let scheduler = BatchScheduler::new(
            &BatchConfig::default(),
            ["notification".to_string()],
            Arc::new(MockRemote::new()),
            Arc::new(CacheStore::new(Duration::from_secs(1), 1)),
            Arc::new(RoutingMetrics::new()),
            events,
        );
        assert!(scheduler.is_batchable("notification"));
        assert!(!scheduler.is_batchable("payment_processing"));
    }
}

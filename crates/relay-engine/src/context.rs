//! Explicit wiring of every shared component.
//!
//! A [`RelayContext`] is built once at startup and handed to the
//! orchestrator and background jobs. There is no process-wide state.

use std::sync::Arc;

use relay_core::config::RelayConfig;
use relay_core::events::ActivityEvent;
use relay_decision::{DecisionEngine, PersistencePort};
use relay_router::{
    BatchScheduler, CacheStore, Classifier, ProcessorRegistry, RemoteExecutor, RoutingMetrics,
    TaskRouter,
};
use tokio::sync::broadcast;

const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Shared handles to the routing and decision components.
///
/// Building a context does not spawn anything. Batchable tasks fail with
/// `RouteError::SchedulerNotRunning` until [`BackgroundJobs::start`] has
/// started the batch scheduler.
///
/// [`BackgroundJobs::start`]: crate::jobs::BackgroundJobs::start
#[derive(Clone)]
pub struct RelayContext {
    pub config: Arc<RelayConfig>,
    pub classifier: Arc<Classifier>,
    pub cache: Arc<CacheStore>,
    pub metrics: Arc<RoutingMetrics>,
    pub batch: Arc<BatchScheduler>,
    pub router: Arc<TaskRouter>,
    pub decisions: Arc<DecisionEngine>,
    pub persistence: Option<Arc<dyn PersistencePort>>,
    pub events: broadcast::Sender<ActivityEvent>,
}

impl RelayContext {
    /// Context with the built-in local processors and no persistence.
    pub fn new(config: RelayConfig, remote: Arc<dyn RemoteExecutor>) -> Self {
        RelayContextBuilder::new(config, remote).build()
    }

    pub fn builder(config: RelayConfig, remote: Arc<dyn RemoteExecutor>) -> RelayContextBuilder {
        RelayContextBuilder::new(config, remote)
    }

    /// Subscribe to activity events.
    pub fn subscribe(&self) -> broadcast::Receiver<ActivityEvent> {
        self.events.subscribe()
    }
}

pub struct RelayContextBuilder {
    config: RelayConfig,
    remote: Arc<dyn RemoteExecutor>,
    processors: ProcessorRegistry,
    persistence: Option<Arc<dyn PersistencePort>>,
    event_capacity: usize,
}

impl RelayContextBuilder {
    pub fn new(config: RelayConfig, remote: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            config,
            remote,
            processors: ProcessorRegistry::with_defaults(),
            persistence: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Replace the processor registry (the defaults are used otherwise).
    pub fn processors(mut self, processors: ProcessorRegistry) -> Self {
        self.processors = processors;
        self
    }

    pub fn persistence(mut self, port: Arc<dyn PersistencePort>) -> Self {
        self.persistence = Some(port);
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> RelayContext {
        let config = Arc::new(self.config);
        let (events, _) = broadcast::channel(self.event_capacity);

        let classifier = Arc::new(Classifier::new(&config.policy));
        let cache = Arc::new(CacheStore::from_config(&config.cache));
        let metrics = Arc::new(RoutingMetrics::new());
        let batch = Arc::new(BatchScheduler::new(
            &config.batch,
            config.policy.batchable_tasks.iter().cloned(),
            Arc::clone(&self.remote),
            Arc::clone(&cache),
            Arc::clone(&metrics),
            events.clone(),
        ));
        let router = Arc::new(TaskRouter::new(
            self.processors,
            Arc::clone(&cache),
            Arc::clone(&batch),
            self.remote,
            Arc::clone(&metrics),
        ));
        let decisions = Arc::new(DecisionEngine::new(config.decision.clone()));

        RelayContext {
            config,
            classifier,
            cache,
            metrics,
            batch,
            router,
            decisions,
            persistence: self.persistence,
            events,
        }
    }
}

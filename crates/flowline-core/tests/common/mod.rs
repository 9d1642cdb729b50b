#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowline_core::collaborators::memory::{InstantClock, MemoryRecordStore, RecordingNotifier};
use flowline_core::domain::repository::memory::{MemoryExecutionStore, MemoryWorkflowRepository};
use flowline_core::domain::workflow::UserId;
use flowline_core::{
    Clock, Collaborators, EngineConfig, EngineError, ExecutionEngine, ExecutionEvent, ExecutionEventHandler,
    HttpClient, HttpRequest, HttpResponse, Notification, Notifier, OrganizationId, StepDefinition, TriggerType,
    WorkflowDefinition, WorkflowService,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Clock backed by tokio timers, so paused-time tests can drive it
pub struct TokioSleepClock;

#[async_trait]
impl Clock for TokioSleepClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// HTTP client answering every request with the same response after `hold`,
/// tracking how many requests are in flight at once
pub struct ProbeHttp {
    status: u16,
    hold: Duration,
    failures_before_success: usize,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ProbeHttp {
    pub fn ok() -> Self {
        Self::new(200, Duration::ZERO)
    }

    pub fn new(status: u16, hold: Duration) -> Self {
        Self {
            status,
            hold,
            failures_before_success: 0,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Transport errors for the first `n` calls
    pub fn flaky(n: usize) -> Self {
        Self {
            failures_before_success: n,
            ..Self::ok()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpClient for ProbeHttp {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, EngineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures_before_success {
            return Err(EngineError::Collaborator(format!("connection reset by {}", request.url)));
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.hold.is_zero() {
            tokio::time::sleep(self.hold).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(HttpResponse {
            status: self.status,
            body: serde_json::json!({ "url": request.url }),
        })
    }
}

/// Notifier whose provider is down
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send(&self, notification: Notification) -> Result<String, EngineError> {
        Err(EngineError::Collaborator(format!("mailbox {} unavailable", notification.recipient)))
    }
}

/// Keeps every event the engine emits
#[derive(Default)]
pub struct EventCollector {
    events: Mutex<Vec<ExecutionEvent>>,
}

impl EventCollector {
    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl ExecutionEventHandler for EventCollector {
    fn handle(&self, event: &ExecutionEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// An engine wired to in-memory collaborators
pub struct Harness {
    pub records: Arc<MemoryRecordStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<InstantClock>,
    pub store: Arc<MemoryExecutionStore>,
    pub events: Arc<EventCollector>,
    pub engine: Arc<ExecutionEngine>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(Arc::new(ProbeHttp::ok()), None, None, EngineConfig::default())
    }

    pub fn with_http(http: Arc<dyn HttpClient>) -> Self {
        Self::build(http, None, None, EngineConfig::default())
    }

    pub fn build(
        http: Arc<dyn HttpClient>,
        notifier: Option<Arc<dyn Notifier>>,
        clock: Option<Arc<dyn Clock>>,
        config: EngineConfig,
    ) -> Self {
        let records = Arc::new(MemoryRecordStore::new());
        let recording = Arc::new(RecordingNotifier::new());
        let instant = Arc::new(InstantClock::new());
        let store = Arc::new(MemoryExecutionStore::new());
        let events = Arc::new(EventCollector::default());

        let collaborators = Collaborators::new(
            records.clone(),
            notifier.unwrap_or_else(|| recording.clone() as Arc<dyn Notifier>),
            http,
            clock.unwrap_or_else(|| instant.clone() as Arc<dyn Clock>),
        );
        let engine = ExecutionEngine::new(collaborators, store.clone(), config).with_event_handler(events.clone());

        Self {
            records,
            notifier: recording,
            clock: instant,
            store,
            events,
            engine: Arc::new(engine),
        }
    }

    pub fn service(&self) -> WorkflowService {
        WorkflowService::new(
            Arc::new(MemoryWorkflowRepository::new()),
            self.store.clone(),
            self.engine.clone(),
        )
    }
}

pub fn org() -> OrganizationId {
    OrganizationId("acme".to_string())
}

/// A valid, manually triggered workflow with one viewer
pub fn workflow(name: &str, steps: Vec<StepDefinition>) -> WorkflowDefinition {
    let mut definition = WorkflowDefinition::new(org(), name).with_trigger(TriggerType::Manual);
    definition.steps = steps;
    definition.permissions.viewers.push(UserId("ops".to_string()));
    definition
}

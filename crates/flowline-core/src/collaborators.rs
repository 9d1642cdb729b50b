//! Interfaces to the world outside the engine.
//!
//! The engine never performs I/O itself. Record storage, notification
//! delivery, HTTP and timekeeping are injected through these traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::EngineError;

/// CRUD over arbitrary entities
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create a record and return it as stored (including its ID)
    async fn create(&self, entity: &str, data: Value) -> Result<Value, EngineError>;

    /// Apply a partial update and return the updated record
    async fn update(&self, entity: &str, id: &str, patch: Value) -> Result<Value, EngineError>;

    /// Delete a record
    async fn delete(&self, entity: &str, id: &str) -> Result<(), EngineError>;

    /// Fetch a record
    async fn find(&self, entity: &str, id: &str) -> Result<Option<Value>, EngineError>;
}

/// Delivery channel of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    Sms,
    Push,
}

/// A message for one recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub channel: NotificationChannel,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
}

/// Email, SMS and push delivery
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a notification, returning the provider's message ID
    async fn send(&self, notification: Notification) -> Result<String, EngineError>;
}

/// Outbound HTTP request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
}

/// HTTP response with the body decoded as JSON when possible, text otherwise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

impl HttpResponse {
    /// 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Webhook and API calls
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform a request. Transport failures are errors; HTTP error statuses
    /// are returned as responses.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, EngineError>;
}

/// Time source and scheduler for delay steps and retry pauses
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;

    /// Suspend the calling task without blocking a worker thread
    async fn sleep(&self, duration: Duration);
}

/// Runs `run_script` actions
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Run a script against a snapshot of the context and return its result
    async fn run(&self, script: &str, context: &Value) -> Result<Value, EngineError>;
}

/// The collaborators an engine is constructed with
#[derive(Clone)]
pub struct Collaborators {
    pub records: Arc<dyn RecordStore>,
    pub notifier: Arc<dyn Notifier>,
    pub http: Arc<dyn HttpClient>,
    pub clock: Arc<dyn Clock>,
    pub scripts: Option<Arc<dyn ScriptRunner>>,
}

impl Collaborators {
    /// Bundle the required collaborators; no script runner
    pub fn new(
        records: Arc<dyn RecordStore>,
        notifier: Arc<dyn Notifier>,
        http: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            records,
            notifier,
            http,
            clock,
            scripts: None,
        }
    }

    /// Enable `run_script` actions
    pub fn with_script_runner(mut self, scripts: Arc<dyn ScriptRunner>) -> Self {
        self.scripts = Some(scripts);
        self
    }
}

/// In-process collaborators that keep everything in memory
#[cfg(feature = "memory")]
pub mod memory {
    use super::*;
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Record store backed by a concurrent map per entity
    #[derive(Debug, Default)]
    pub struct MemoryRecordStore {
        entities: DashMap<String, DashMap<String, Value>>,
    }

    impl MemoryRecordStore {
        /// Create an empty store
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of records of an entity
        pub fn count(&self, entity: &str) -> usize {
            self.entities.get(entity).map(|e| e.len()).unwrap_or(0)
        }
    }

    #[async_trait]
    impl RecordStore for MemoryRecordStore {
        async fn create(&self, entity: &str, data: Value) -> Result<Value, EngineError> {
            let mut record = match data {
                Value::Object(map) => map,
                other => {
                    let mut map = serde_json::Map::new();
                    map.insert("value".to_string(), other);
                    map
                }
            };
            let id = match record.get("id") {
                Some(Value::String(id)) => id.clone(),
                Some(Value::Number(id)) => id.to_string(),
                _ => Uuid::new_v4().to_string(),
            };
            record.insert("id".to_string(), Value::String(id.clone()));
            let record = Value::Object(record);
            self.entities
                .entry(entity.to_string())
                .or_default()
                .insert(id, record.clone());
            Ok(record)
        }

        async fn update(&self, entity: &str, id: &str, patch: Value) -> Result<Value, EngineError> {
            let table = self
                .entities
                .get(entity)
                .ok_or_else(|| EngineError::Collaborator(format!("{} {} not found", entity, id)))?;
            let mut record = table
                .get_mut(id)
                .ok_or_else(|| EngineError::Collaborator(format!("{} {} not found", entity, id)))?;
            if let (Value::Object(target), Value::Object(changes)) = (&mut *record, patch) {
                for (key, value) in changes {
                    if key != "id" {
                        target.insert(key, value);
                    }
                }
            }
            Ok(record.clone())
        }

        async fn delete(&self, entity: &str, id: &str) -> Result<(), EngineError> {
            self.entities
                .get(entity)
                .and_then(|table| table.remove(id))
                .map(|_| ())
                .ok_or_else(|| EngineError::Collaborator(format!("{} {} not found", entity, id)))
        }

        async fn find(&self, entity: &str, id: &str) -> Result<Option<Value>, EngineError> {
            Ok(self
                .entities
                .get(entity)
                .and_then(|table| table.get(id).map(|r| r.clone())))
        }
    }

    /// Notifier that keeps every message it was asked to send
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
    }

    impl RecordingNotifier {
        /// Create an empty outbox
        pub fn new() -> Self {
            Self::default()
        }

        /// Messages sent so far
        pub fn sent(&self) -> Vec<Notification> {
            self.sent.lock().map(|s| s.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, notification: Notification) -> Result<String, EngineError> {
            let mut sent = self
                .sent
                .lock()
                .map_err(|_| EngineError::Collaborator("notifier outbox poisoned".to_string()))?;
            sent.push(notification);
            Ok(format!("msg-{}", sent.len()))
        }
    }

    /// Clock whose sleeps return immediately; requested waits are summed
    #[derive(Debug, Default)]
    pub struct InstantClock {
        slept_ms: AtomicU64,
    }

    impl InstantClock {
        /// Create a clock
        pub fn new() -> Self {
            Self::default()
        }

        /// Total time callers asked to sleep
        pub fn slept(&self) -> Duration {
            Duration::from_millis(self.slept_ms.load(Ordering::SeqCst))
        }
    }

    #[async_trait]
    impl Clock for InstantClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }

        async fn sleep(&self, duration: Duration) {
            let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
            self.slept_ms.fetch_add(ms, Ordering::SeqCst);
            tokio::task::yield_now().await;
        }
    }

}

//!
//! Standard collaborators for the Flowline engine
//!
//! The core engine performs no I/O of its own. This crate provides the
//! production implementations it is usually wired with: an HTTP client on
//! top of `reqwest`, a notifier that writes deliveries to the log, and a
//! clock driven by tokio timers.

/// HTTP client for webhook and API steps
pub mod http;

/// Notification delivery
pub mod notifier;

/// Wall clock and timers
pub mod clock;

use std::sync::Arc;

use flowline_core::collaborators::memory::MemoryRecordStore;
use flowline_core::Collaborators;

pub use clock::TokioClock;
pub use http::{HttpError, ReqwestHttpClient};
pub use notifier::TracingNotifier;

/// Collaborators for running workflows in a single process: real HTTP,
/// logged notifications, tokio timers and an in-memory record store.
pub fn standard_collaborators() -> Result<Collaborators, HttpError> {
    Ok(Collaborators::new(
        Arc::new(MemoryRecordStore::new()),
        Arc::new(TracingNotifier::new()),
        Arc::new(ReqwestHttpClient::new()?),
        Arc::new(TokioClock),
    ))
}

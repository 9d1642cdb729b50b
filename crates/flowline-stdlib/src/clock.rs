use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowline_core::Clock;
use std::time::Duration;

/// System time with tokio sleeps
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

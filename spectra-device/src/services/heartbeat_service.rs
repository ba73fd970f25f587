use std::sync::Arc;
use std::time::Duration;

use spectra_api::DeviceReport;
use tokio::time::{self, MissedTickBehavior};
use tracing::Span;

use crate::services::publisher::Publisher;

/// Publishes `check` on a fixed period so the controller sees the device
/// is alive.
pub struct HeartbeatService {
    publisher: Arc<dyn Publisher>,
    topic: String,
    interval: Duration,
    span: Span,
}

impl HeartbeatService {
    pub fn new(publisher: Arc<dyn Publisher>, topic: &str, interval: Duration, span: Span) -> Self {
        Self {
            publisher,
            topic: topic.to_string(),
            interval,
            span,
        }
    }

    pub async fn beat(&self) -> bool {
        match self.publisher.publish(&self.topic, DeviceReport::Check.to_fields()).await {
            Ok(()) => {
                tracing::trace!(parent: &self.span, "heartbeat sent");
                true
            }
            Err(e) => {
                tracing::debug!(parent: &self.span, "heartbeat skipped: {e}");
                false
            }
        }
    }

    pub async fn run(&self) {
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            self.beat().await;
        }
    }
}

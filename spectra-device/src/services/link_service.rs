use std::sync::Arc;
use std::time::Duration;

use spectra_api::transport::Session;
use tracing::Span;

/// Keeps the session to the local broker up, retrying at a fixed period.
pub struct LinkService {
    session: Arc<Session>,
    host: String,
    retry: Duration,
    span: Span,
}

impl LinkService {
    pub fn new(session: Arc<Session>, host: &str, retry: Duration, span: Span) -> Self {
        Self {
            session,
            host: host.to_string(),
            retry,
            span,
        }
    }

    pub async fn run(&self) {
        loop {
            if !self.session.is_connected() {
                if self.session.state().lost_connection() {
                    tracing::warn!(parent: &self.span, "broker link lost, reconnecting");
                }
                if let Err(e) = self.session.connect(&self.host).await {
                    tracing::warn!(parent: &self.span, "broker on {} unavailable ({e}), retrying in {:?}", self.host, self.retry);
                }
            }

            tokio::time::sleep(self.retry).await;
        }
    }
}

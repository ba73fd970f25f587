use async_trait::async_trait;
use spectra_api::transport::{Session, SessionError};

/// Outbound half of the broker connection.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, fields: Vec<String>) -> Result<(), SessionError>;
}

#[async_trait]
impl Publisher for Session {
    async fn publish(&self, topic: &str, fields: Vec<String>) -> Result<(), SessionError> {
        Session::publish(self, topic, fields).await.map(|_| ())
    }
}

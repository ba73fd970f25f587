use async_trait::async_trait;
use spectra_api::transport::{Session, SessionError};

/// The broker connection as seen by the orchestrator and the panel service.
#[async_trait]
pub trait Link: Send + Sync {
    async fn connect(&self, host: &str) -> Result<(), SessionError>;

    async fn disconnect(&self);

    async fn publish(&self, topic: &str, fields: Vec<String>) -> Result<(), SessionError>;

    fn is_connected(&self) -> bool;

    fn lost_connection(&self) -> bool;
}

#[async_trait]
impl Link for Session {
    async fn connect(&self, host: &str) -> Result<(), SessionError> {
        Session::connect(self, host).await
    }

    async fn disconnect(&self) {
        Session::disconnect(self).await
    }

    async fn publish(&self, topic: &str, fields: Vec<String>) -> Result<(), SessionError> {
        Session::publish(self, topic, fields).await.map(|_| ())
    }

    fn is_connected(&self) -> bool {
        Session::is_connected(self)
    }

    fn lost_connection(&self) -> bool {
        self.state().lost_connection()
    }
}

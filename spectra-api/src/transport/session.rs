use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::task::JoinHandle;
use tracing::{Instrument, Span};
use uuid::Uuid;

use super::error::SessionError;
use crate::message::Message;

/// Handler invoked from the receive task with the raw payload of every
/// publish on its topic.
pub type Callback = Arc<dyn Fn(&str) + Send + Sync>;

const REQUEST_CAPACITY: usize = 10;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub port: u16,
    /// Prefix of the MQTT client id; every connect appends a fresh suffix.
    pub client_id: String,
    pub keep_alive: Duration,
    pub credentials: Option<(String, String)>,
    pub connect_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            port: 1883,
            client_id: String::from("spectra"),
            keep_alive: Duration::from_secs(20),
            credentials: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Connection flags shared between the receive task and everyone polling it.
#[derive(Debug, Default)]
pub struct SessionState {
    connected: AtomicBool,
    ever_connected: AtomicBool,
    lost_connection: AtomicBool,
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn ever_connected(&self) -> bool {
        self.ever_connected.load(Ordering::SeqCst)
    }

    /// Set when the broker link dropped without a call to `disconnect`.
    pub fn lost_connection(&self) -> bool {
        self.lost_connection.load(Ordering::SeqCst)
    }

    fn mark_connected(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.ever_connected.store(true, Ordering::SeqCst);
        self.lost_connection.store(false, Ordering::SeqCst);
    }

    fn mark_lost(&self) -> bool {
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        if was_connected {
            self.lost_connection.store(true, Ordering::SeqCst);
        }
        was_connected
    }
}

/// One publish/subscribe connection to the broker.
///
/// `connect` performs the handshake and then hands the event loop to a
/// background receive task. Retrying is left to the caller.
pub struct Session {
    options: SessionOptions,
    state: Arc<SessionState>,
    client: RwLock<Option<AsyncClient>>,
    receiver: Mutex<Option<JoinHandle<()>>>,
    callbacks: Arc<RwLock<HashMap<String, Callback>>>,
    span: Span,
}

impl Session {
    pub fn new(options: SessionOptions, span: Span) -> Self {
        Self {
            options,
            state: Arc::new(SessionState::default()),
            client: RwLock::new(None),
            receiver: Mutex::new(None),
            callbacks: Arc::new(RwLock::new(HashMap::new())),
            span,
        }
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub async fn connect(&self, host: &str) -> Result<(), SessionError> {
        if self.is_connected() {
            return Ok(());
        }
        self.stop_receiver();

        let client_id = format!("{}-{}", self.options.client_id, Uuid::new_v4().simple());
        tracing::info!(parent: &self.span, "{client_id} is connecting to broker on {host}:{}", self.options.port);

        let mut mqtt_options = MqttOptions::new(&client_id, host, self.options.port);
        mqtt_options.set_keep_alive(self.options.keep_alive);
        if let Some((username, password)) = &self.options.credentials {
            mqtt_options.set_credentials(username, password);
        }

        let (client, mut event_loop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);

        match tokio::time::timeout(self.options.connect_timeout, handshake(&mut event_loop)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(parent: &self.span, "{client_id} failed broker connection: {e}");
                return Err(e);
            }
            Err(_) => {
                tracing::error!(parent: &self.span, "{client_id} timed out waiting for broker");
                return Err(SessionError::Timeout);
            }
        }

        let topics: Vec<String> = self.callback_topics();
        for topic in &topics {
            client.subscribe(topic.as_str(), QoS::AtMostOnce).await?;
            tracing::debug!(parent: &self.span, "subscribed to topic {topic}");
        }

        self.state.mark_connected();
        *self.client.write().unwrap_or_else(|e| e.into_inner()) = Some(client);

        let handle = tokio::spawn(
            receive_loop(event_loop, Arc::clone(&self.state), Arc::clone(&self.callbacks))
                .instrument(self.span.clone()),
        );
        *self.receiver.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);

        tracing::info!(parent: &self.span, "{client_id} successfully connected to broker");

        Ok(())
    }

    /// Registers the handler for `topic`, subscribing right away when
    /// connected. Handlers are kept across reconnects.
    pub async fn subscribe(&self, topic: &str, callback: Callback) -> Result<(), SessionError> {
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(topic.to_string(), callback);

        if let Some(client) = self.connected_client() {
            client.subscribe(topic, QoS::AtMostOnce).await?;
            tracing::info!(parent: &self.span, "subscribed to topic {topic}");
        }

        Ok(())
    }

    /// Frames `fields` and publishes them. Fails with `NotConnected`, and
    /// logs it, when there is no live link.
    pub async fn publish<I, S>(&self, topic: &str, fields: I) -> Result<Message, SessionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let message = Message::encode(fields);

        let Some(client) = self.connected_client() else {
            tracing::error!(parent: &self.span, "not connected to broker, dropped message: {message}");
            return Err(SessionError::NotConnected);
        };

        client
            .publish(topic, QoS::AtMostOnce, false, message.to_wire())
            .await?;
        tracing::debug!(parent: &self.span, "published on {topic}: {message}");

        Ok(message)
    }

    /// Idempotent; safe to call on a session that never connected.
    pub async fn disconnect(&self) {
        let was_connected = self.state.connected.swap(false, Ordering::SeqCst);
        let client = self.client.write().unwrap_or_else(|e| e.into_inner()).take();

        if was_connected {
            if let Some(client) = client {
                if let Err(e) = client.try_disconnect() {
                    tracing::debug!(parent: &self.span, "disconnect request not queued: {e}");
                }
            }
            tracing::info!(parent: &self.span, "purposely disconnected from broker");
        }

        let handle = self.receiver.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(Duration::from_secs(1), &mut handle).await.is_err() {
                handle.abort();
            }
        }
    }

    fn connected_client(&self) -> Option<AsyncClient> {
        if !self.is_connected() {
            return None;
        }
        self.client.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn callback_topics(&self) -> Vec<String> {
        self.callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    fn stop_receiver(&self) {
        if let Some(handle) = self.receiver.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_receiver();
    }
}

async fn handshake(event_loop: &mut EventLoop) -> Result<(), SessionError> {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return match ack.code {
                    rumqttc::ConnectReturnCode::Success => Ok(()),
                    code => Err(SessionError::ConnectionRefused { code: code as u8 }),
                };
            }
            Ok(_) => continue,
            Err(ConnectionError::ConnectionRefused(code)) => {
                return Err(SessionError::ConnectionRefused { code: code as u8 });
            }
            Err(e) => return Err(SessionError::Unreachable(e.to_string())),
        }
    }
}

async fn receive_loop(
    mut event_loop: EventLoop,
    state: Arc<SessionState>,
    callbacks: Arc<RwLock<HashMap<String, Callback>>>,
) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let payload = String::from_utf8_lossy(&publish.payload);
                let callback = callbacks
                    .read()
                    .unwrap_or_else(|e| e.into_inner())
                    .get(&publish.topic)
                    .cloned();

                match callback {
                    Some(callback) => callback(&payload),
                    None => tracing::debug!("no handler for topic {}", publish.topic),
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                if state.mark_lost() {
                    tracing::warn!("broker closed the connection");
                }
                break;
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(e) => {
                if state.mark_lost() {
                    tracing::warn!("lost connection to broker: {e}");
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> SessionOptions {
        SessionOptions {
            connect_timeout: Duration::from_secs(2),
            ..SessionOptions::default()
        }
    }

    #[tokio::test]
    async fn test_publish_while_disconnected_fails() {
        let session = Session::new(options(), Span::none());

        let result = session.publish("pc_to_pi", ["status", "1"]).await;
        assert_eq!(result, Err(SessionError::NotConnected));
        assert!(!session.state().ever_connected());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let session = Session::new(options(), Span::none());

        session.disconnect().await;
        session.disconnect().await;

        assert!(!session.is_connected());
        assert!(!session.state().lost_connection());
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let session = Session::new(
            SessionOptions {
                port: 1,
                ..options()
            },
            Span::none(),
        );

        let result = session.connect("127.0.0.1").await;
        assert!(matches!(
            result,
            Err(SessionError::Unreachable(_)) | Err(SessionError::Timeout)
        ));
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_subscribe_before_connect_registers_handler() {
        let session = Session::new(options(), Span::none());

        session
            .subscribe("pi_to_pc", Arc::new(|_payload: &str| {}))
            .await
            .unwrap();

        assert_eq!(session.callback_topics(), vec!["pi_to_pc".to_string()]);
    }

    #[test]
    fn test_state_marks_loss_only_when_connected() {
        let state = SessionState::default();
        assert!(!state.mark_lost());
        assert!(!state.lost_connection());

        state.mark_connected();
        assert!(state.mark_lost());
        assert!(state.lost_connection());
        assert!(state.ever_connected());
        assert!(!state.is_connected());
    }
}

use std::env;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use spectra_api::transport::SessionOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logger {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Broker {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub connect_timeout_secs: u64,
    pub retry_secs: u64,
    pub topic: BrokerTopic,
    pub auth: Option<BrokerAuth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerTopic {
    /// Controller to device.
    pub command: String,
    /// Device to controller.
    pub report: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerAuth {
    pub username: String,
    pub password: String,
}

impl Broker {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            port: self.port,
            client_id: self.client_id.clone(),
            keep_alive: Duration::from_secs(self.keep_alive_secs),
            credentials: self
                .auth
                .as_ref()
                .map(|auth| (auth.username.clone(), auth.password.clone())),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }

    pub fn retry(&self) -> Duration {
        Duration::from_secs(self.retry_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scheduler {
    pub channels: u8,
    pub poll_secs: u64,
}

impl Scheduler {
    pub fn poll(&self) -> Duration {
        Duration::from_secs(self.poll_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub interval_secs: u64,
}

impl Heartbeat {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actuator {
    pub baud_rate: u32,
    /// Explicit port paths; discovered by `port_filter` when absent.
    pub port_paths: Option<Vec<String>>,
    pub port_filter: String,
    pub expected_links: usize,
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub logger: Logger,
    pub broker: Broker,
    pub scheduler: Scheduler,
    pub heartbeat: Heartbeat,
    pub actuator: Actuator,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or("development".into());

        let settings: Settings = Config::builder()
            .add_source(File::with_name("configs/default"))
            .add_source(File::with_name(&format!("configs/{run_mode}")).required(false))
            .add_source(Environment::with_prefix("SPECTRA").separator("_"))
            .build()?
            .try_deserialize()?;

        if settings.scheduler.channels == 0 {
            return Err(ConfigError::Message("at least one channel is required".into()));
        }

        Ok(settings)
    }
}

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
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub connect_timeout_secs: u64,
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
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Looked up before every connection attempt when set.
    pub hostname: Option<String>,
    /// Used when there is no hostname or the lookup fails.
    pub address: String,
    pub channels: u8,
    pub management: Management,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Management {
    pub user: String,
    pub port: u16,
    pub identity_file: Option<String>,
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub commands: ManagementCommands,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagementCommands {
    pub process_check: String,
    pub process_start: String,
    pub process_stop: String,
    pub broker_status: String,
    pub broker_running_marker: String,
    pub broker_start: String,
    pub reboot: String,
}

impl Default for ManagementCommands {
    fn default() -> Self {
        Self {
            process_check: String::from("pgrep -f '[s]pectra_device'"),
            process_start: String::from("cd /home/pi/spectra && nohup ./spectra_device > /dev/null 2>&1 &"),
            process_stop: String::from("pkill -f '[s]pectra_device'"),
            broker_status: String::from("systemctl status mosquitto"),
            broker_running_marker: String::from("Active: active (running)"),
            broker_start: String::from("sudo systemctl enable mosquitto.service && sudo /etc/init.d/mosquitto start"),
            reboot: String::from("sudo shutdown -r now"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub tick_secs: u64,
    pub soft_timeout_ticks: u32,
    pub hard_timeout_ticks: u32,
}

impl Heartbeat {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recovery {
    pub broker_settle_secs: u64,
    pub process_settle_secs: u64,
    pub reboot_wait_secs: u64,
    pub max_attempts: u32,
}

impl Recovery {
    pub fn broker_settle(&self) -> Duration {
        Duration::from_secs(self.broker_settle_secs)
    }

    pub fn process_settle(&self) -> Duration {
        Duration::from_secs(self.process_settle_secs)
    }

    pub fn reboot_wait(&self) -> Duration {
        Duration::from_secs(self.reboot_wait_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub channel: u8,
    #[serde(default)]
    pub activate: bool,
    pub windows: Vec<Window>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Window {
    /// `HH:MM`
    pub start: String,
    /// `HH:MM`
    pub end: String,
    pub levels: [u8; 4],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub logger: Logger,
    pub broker: Broker,
    pub device: Device,
    pub heartbeat: Heartbeat,
    pub recovery: Recovery,
    pub status_poll_secs: Option<u64>,
    #[serde(default)]
    pub schedules: Vec<Schedule>,
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

        if settings.heartbeat.tick_secs == 0 {
            return Err(ConfigError::Message("heartbeat tick must be at least one second".into()));
        }
        if settings.heartbeat.soft_timeout_ticks > settings.heartbeat.hard_timeout_ticks {
            return Err(ConfigError::Message("soft heartbeat timeout exceeds the hard timeout".into()));
        }

        Ok(settings)
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use spectra_api::transport::SessionError;
use spectra_api::{DeviceReport, Message};
use spectra_device::configs::settings::Settings;
use spectra_device::errors::DeviceError;
use spectra_device::services::actuator_service::{ActuatorHub, ActuatorLink};
use spectra_device::services::command_service::CommandService;
use spectra_device::services::publisher::Publisher;
use spectra_device::services::scheduler_service::{FixedClock, SchedulerService};
use tracing::Span;

pub struct MockPublisher {
    connected: AtomicBool,
    published: Mutex<Vec<Message>>,
}

impl MockPublisher {
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<Message> {
        self.published.lock().unwrap().clone()
    }

    pub fn reports(&self) -> Vec<DeviceReport> {
        self.published()
            .iter()
            .map(|message| DeviceReport::try_from(message).unwrap())
            .collect()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    async fn publish(&self, _topic: &str, fields: Vec<String>) -> Result<(), SessionError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SessionError::NotConnected);
        }
        self.published.lock().unwrap().push(Message::encode(fields));
        Ok(())
    }
}

#[derive(Default)]
pub struct MockLink {
    lines: Mutex<Vec<String>>,
}

impl MockLink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl ActuatorLink for MockLink {
    fn name(&self) -> &str {
        "mock"
    }

    fn write_line(&self, line: &str) -> Result<(), DeviceError> {
        self.lines.lock().unwrap().push(line.to_string());
        Ok(())
    }
}

pub struct MockApp {
    pub settings: Settings,
    pub clock: Arc<FixedClock>,
    pub publisher: Arc<MockPublisher>,
    pub links: Vec<Arc<MockLink>>,
    pub scheduler: Arc<SchedulerService>,
    pub commands: CommandService,
}

impl MockApp {
    pub fn new() -> Self {
        let settings: Settings = toml::from_str(include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/configs/default.toml"
        )))
        .unwrap();

        let clock = Arc::new(FixedClock::new(0));
        let publisher = Arc::new(MockPublisher {
            connected: AtomicBool::new(true),
            published: Mutex::new(Vec::new()),
        });
        let links: Vec<Arc<MockLink>> = (0..settings.actuator.expected_links)
            .map(|_| Arc::new(MockLink::default()))
            .collect();

        let actuators = Arc::new(ActuatorHub::new(
            links.iter().map(|link| Arc::clone(link) as Arc<dyn ActuatorLink>).collect(),
            Span::none(),
        ));
        let scheduler = Arc::new(SchedulerService::new(
            settings.scheduler.channels,
            clock.clone(),
            Arc::clone(&actuators),
            Span::none(),
        ));
        let commands = CommandService::new(
            publisher.clone(),
            &settings.broker.topic.report,
            Arc::clone(&scheduler),
            actuators,
            Span::none(),
        );

        Self {
            settings,
            clock,
            publisher,
            links,
            scheduler,
            commands,
        }
    }

    /// Lines written to the first board; every board gets the same.
    pub fn lines(&self) -> Vec<String> {
        self.links[0].lines()
    }
}

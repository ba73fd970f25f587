use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use spectra_api::Message;
use spectra_api::transport::SessionError;
use spectra_controller::configs::settings::Settings;
use spectra_controller::services::endpoint_service::Endpoint;
use spectra_controller::services::event::ControllerEvent;
use spectra_controller::services::heartbeat_service::HeartbeatMonitor;
use spectra_controller::services::link::Link;
use spectra_controller::services::management_service::ManagementChannel;
use spectra_controller::services::panel_service::PanelService;
use spectra_controller::services::recovery_service::RecoveryOrchestrator;
use tokio::sync::broadcast;
use tracing::Span;

/// Ordered record of every call made against the mocks.
#[derive(Debug, Default)]
pub struct Journal(Mutex<Vec<String>>);

impl Journal {
    fn record(&self, call: &str) {
        self.0.lock().unwrap().push(call.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Answers queued up front, then a fixed fallback.
#[derive(Debug)]
pub struct Script {
    queue: Mutex<VecDeque<bool>>,
    fallback: AtomicBool,
}

impl Script {
    fn new(fallback: bool) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: AtomicBool::new(fallback),
        }
    }

    pub fn then(&self, answers: &[bool]) -> &Self {
        self.queue.lock().unwrap().extend(answers);
        self
    }

    pub fn always(&self, answer: bool) -> &Self {
        self.fallback.store(answer, Ordering::SeqCst);
        self
    }

    fn next(&self) -> bool {
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.load(Ordering::SeqCst))
    }
}

pub struct MockLink {
    journal: Arc<Journal>,
    pub connect: Script,
    connected: AtomicBool,
    lost: AtomicBool,
    published: Mutex<Vec<Message>>,
}

impl MockLink {
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.lost.store(true, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<Message> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Link for MockLink {
    async fn connect(&self, _host: &str) -> Result<(), SessionError> {
        self.journal.record("connect");
        if self.connect.next() {
            self.connected.store(true, Ordering::SeqCst);
            self.lost.store(false, Ordering::SeqCst);
            Ok(())
        } else {
            Err(SessionError::Unreachable(String::from("connection refused")))
        }
    }

    async fn disconnect(&self) {
        self.journal.record("disconnect");
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn publish(&self, _topic: &str, fields: Vec<String>) -> Result<(), SessionError> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        self.published.lock().unwrap().push(Message::encode(fields));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn lost_connection(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }
}

pub struct MockManagement {
    journal: Arc<Journal>,
    pub reachable: Script,
    pub process_running: Script,
    pub broker_running: Script,
}

#[async_trait]
impl ManagementChannel for MockManagement {
    async fn is_reachable(&self) -> bool {
        self.journal.record("is_reachable");
        self.reachable.next()
    }

    async fn is_control_process_running(&self) -> bool {
        self.journal.record("is_control_process_running");
        self.process_running.next()
    }

    async fn start_control_process(&self) -> bool {
        self.journal.record("start_control_process");
        true
    }

    async fn stop_control_process(&self) -> bool {
        self.journal.record("stop_control_process");
        true
    }

    async fn is_broker_running(&self) -> bool {
        self.journal.record("is_broker_running");
        self.broker_running.next()
    }

    async fn start_broker(&self) -> bool {
        self.journal.record("start_broker");
        true
    }

    async fn reboot(&self) -> bool {
        self.journal.record("reboot");
        true
    }
}

pub struct MockApp {
    pub settings: Settings,
    pub journal: Arc<Journal>,
    pub link: Arc<MockLink>,
    pub management: Arc<MockManagement>,
    pub monitor: Arc<HeartbeatMonitor>,
    pub sender: broadcast::Sender<ControllerEvent>,
}

impl MockApp {
    pub fn new() -> Self {
        let mut settings: Settings = toml::from_str(include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/configs/default.toml"
        )))
        .unwrap();
        settings.device.hostname = None;
        settings.device.address = String::from("127.0.0.1");
        settings.heartbeat.tick_secs = 1;
        settings.recovery.broker_settle_secs = 0;
        settings.recovery.process_settle_secs = 0;
        settings.recovery.reboot_wait_secs = 0;
        settings.schedules.clear();

        let journal = Arc::new(Journal::default());
        let link = Arc::new(MockLink {
            journal: Arc::clone(&journal),
            connect: Script::new(true),
            connected: AtomicBool::new(false),
            lost: AtomicBool::new(false),
            published: Mutex::new(Vec::new()),
        });
        let management = Arc::new(MockManagement {
            journal: Arc::clone(&journal),
            reachable: Script::new(true),
            process_running: Script::new(true),
            broker_running: Script::new(true),
        });
        let (sender, _) = broadcast::channel(64);

        Self {
            settings,
            journal,
            link,
            management,
            monitor: Arc::new(HeartbeatMonitor::new()),
            sender,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.settings.recovery.max_attempts = max_attempts;
        self
    }

    pub fn orchestrator(&self) -> RecoveryOrchestrator {
        RecoveryOrchestrator::new(
            self.link.clone(),
            self.management.clone(),
            Arc::new(Endpoint::new(&self.settings.device, Span::none())),
            Arc::clone(&self.monitor),
            &self.settings.heartbeat,
            self.settings.recovery.clone(),
            self.sender.clone(),
            Span::none(),
        )
    }

    pub fn panels(&self) -> PanelService {
        PanelService::new(
            self.link.clone(),
            &self.settings.broker.topic.command,
            self.settings.device.channels,
            Arc::clone(&self.monitor),
            self.sender.clone(),
            Span::none(),
        )
    }

    pub fn calls(&self) -> Vec<String> {
        self.journal.calls()
    }
}

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast::Sender;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::Span;

use crate::configs::settings::{Heartbeat, Recovery};
use crate::errors::{FatalReason, RecoveryError};
use crate::services::endpoint_service::Endpoint;
use crate::services::event::ControllerEvent;
use crate::services::heartbeat_service::{HeartbeatMonitor, Thresholds};
use crate::services::link::Link;
use crate::services::management_service::ManagementChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    ScriptNotRunning,
    BrokerUnreachable,
    LivenessTimeout,
    DeviceUnresponsive,
}

impl FailureClass {
    /// Remediation level, 0 being the mildest.
    pub fn level(&self) -> u8 {
        match self {
            FailureClass::ScriptNotRunning => 0,
            FailureClass::BrokerUnreachable => 1,
            FailureClass::LivenessTimeout => 2,
            FailureClass::DeviceUnresponsive => 3,
        }
    }

    pub fn steps(&self) -> &'static [Step] {
        match self {
            FailureClass::ScriptNotRunning => &[Step::RequireReachable, Step::RestartControlProcess],
            FailureClass::BrokerUnreachable => &[Step::EnsureBroker],
            FailureClass::LivenessTimeout => &[Step::RequireReachable, Step::EnsureBroker, Step::RestartOrReboot],
            FailureClass::DeviceUnresponsive => &[Step::Reboot],
        }
    }
}

/// One remediation action against the management channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Fatal when the device does not answer.
    RequireReachable,
    /// Starts the broker if needed; fatal when it stays down.
    EnsureBroker,
    RestartControlProcess,
    /// Restarts the control process and reboots when it does not come up.
    RestartOrReboot,
    Reboot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Connecting,
    Live,
    Degraded(FailureClass),
    Fatal(FatalReason),
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Idle => write!(f, "idle"),
            LinkState::Connecting => write!(f, "connecting"),
            LinkState::Live => write!(f, "live"),
            LinkState::Degraded(class) => write!(f, "degraded (level {})", class.level()),
            LinkState::Fatal(reason) => write!(f, "fatal ({reason})"),
        }
    }
}

/// How `establish` reached `Live`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Established {
    /// A fresh session; the heartbeat starts over.
    Connected,
    /// The session survived remediation; the heartbeat keeps counting.
    Resumed,
}

/// Pure link state transitions; no I/O happens here.
#[derive(Debug, Clone)]
pub struct LinkMachine {
    state: LinkState,
    thresholds: Thresholds,
}

impl LinkMachine {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { state: LinkState::Idle, thresholds }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn begin_connect(&mut self) {
        self.state = LinkState::Connecting;
    }

    pub fn connected(&mut self) {
        self.state = LinkState::Live;
    }

    pub fn fail(&mut self, class: FailureClass) {
        self.state = LinkState::Degraded(class);
    }

    pub fn remediated(&mut self) {
        self.state = LinkState::Idle;
    }

    pub fn fatal(&mut self, reason: FatalReason) {
        self.state = LinkState::Fatal(reason);
    }

    /// Feeds the tick count after an increment and returns the failure to
    /// remediate when the state escalates.
    pub fn on_tick(&mut self, ticks: u32) -> Option<FailureClass> {
        let escalation = match self.state {
            LinkState::Live | LinkState::Degraded(FailureClass::LivenessTimeout) => self.thresholds.evaluate(ticks),
            _ => None,
        }?;

        if self.state == LinkState::Degraded(escalation) {
            return None;
        }
        self.state = LinkState::Degraded(escalation);

        Some(escalation)
    }
}

/// Drives the link through connection, liveness supervision and
/// remediation until it turns fatal.
pub struct RecoveryOrchestrator {
    link: Arc<dyn Link>,
    management: Arc<dyn ManagementChannel>,
    endpoint: Arc<Endpoint>,
    monitor: Arc<HeartbeatMonitor>,
    machine: Mutex<LinkMachine>,
    tick: Duration,
    recovery: Recovery,
    sender: Sender<ControllerEvent>,
    span: Span,
}

impl RecoveryOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        link: Arc<dyn Link>,
        management: Arc<dyn ManagementChannel>,
        endpoint: Arc<Endpoint>,
        monitor: Arc<HeartbeatMonitor>,
        heartbeat: &Heartbeat,
        recovery: Recovery,
        sender: Sender<ControllerEvent>,
        span: Span,
    ) -> Self {
        Self {
            link,
            management,
            endpoint,
            monitor,
            machine: Mutex::new(LinkMachine::new(Thresholds::from(heartbeat))),
            tick: heartbeat.tick(),
            recovery,
            sender,
            span,
        }
    }

    pub fn state(&self) -> LinkState {
        self.machine.lock().unwrap_or_else(|e| e.into_inner()).state()
    }

    /// Connects, supervises and remediates until a fatal failure.
    pub async fn run(&self) -> Result<(), RecoveryError> {
        let mut attempts = 0;
        let mut failure = None;

        loop {
            if let Some(class) = failure.take() {
                attempts += 1;
                if attempts > self.recovery.max_attempts {
                    return Err(self.fatal(FatalReason::RetriesExhausted));
                }
                self.remediate(class).await?;
            }

            match self.establish().await {
                Ok(Established::Connected) => attempts = 0,
                Ok(Established::Resumed) => {}
                Err(class) => {
                    failure = Some(class);
                    continue;
                }
            }

            let heard = self.monitor.resets();
            let class = self.watch().await;
            if self.monitor.resets() != heard {
                attempts = 0;
            }
            failure = Some(class);
        }
    }

    /// Runs the connection procedure once. A session that is still up is
    /// resumed without touching the heartbeat, so a device that stays
    /// silent keeps escalating.
    pub async fn establish(&self) -> Result<Established, FailureClass> {
        self.transition(LinkMachine::begin_connect);

        if self.link.is_connected() {
            tracing::debug!(parent: &self.span, ticks = self.monitor.ticks(), "link still up, resuming supervision");
            self.transition(LinkMachine::connected);
            return Ok(Established::Resumed);
        }

        let host = self.endpoint.refresh().await;

        if !self.management.is_control_process_running().await {
            tracing::warn!(parent: &self.span, "control process is not running on {host}");
            return Err(self.fail(FailureClass::ScriptNotRunning));
        }

        if let Err(e) = self.link.connect(&host).await {
            tracing::error!(parent: &self.span, "cannot connect to broker on {host}: {e}");
            return Err(self.fail(FailureClass::BrokerUnreachable));
        }

        self.monitor.reset();
        self.transition(LinkMachine::connected);
        Ok(Established::Connected)
    }

    /// Ticks until the device has been silent long enough to escalate.
    pub async fn watch(&self) -> FailureClass {
        let mut interval = time::interval_at(Instant::now() + self.tick, self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reported_loss = false;

        loop {
            interval.tick().await;

            if !reported_loss && self.link.lost_connection() {
                tracing::warn!(parent: &self.span, "connection to broker lost, waiting for the heartbeat to expire");
                reported_loss = true;
            }

            if let Some(class) = self.on_tick() {
                return class;
            }
        }
    }

    /// Advances the heartbeat counter once.
    pub fn on_tick(&self) -> Option<FailureClass> {
        let ticks = self.monitor.tick();
        tracing::trace!(parent: &self.span, ticks, "heartbeat tick");

        let escalation = self.with_machine(|machine| machine.on_tick(ticks));
        if let Some(class) = escalation {
            tracing::error!(parent: &self.span, "no message from device for {ticks} ticks, link is {}", LinkState::Degraded(class));
            self.notify(LinkState::Degraded(class));
        }
        escalation
    }

    pub async fn remediate(&self, class: FailureClass) -> Result<(), RecoveryError> {
        self.endpoint.refresh().await;
        tracing::info!(parent: &self.span, "running level {} remediation for {class:?}", class.level());

        for step in class.steps() {
            self.run_step(*step).await?;
        }

        self.transition(LinkMachine::remediated);
        Ok(())
    }

    async fn run_step(&self, step: Step) -> Result<(), RecoveryError> {
        tracing::debug!(parent: &self.span, "remediation step {step:?}");

        match step {
            Step::RequireReachable => {
                if !self.management.is_reachable().await {
                    return Err(self.fatal(FatalReason::DeviceUnreachable));
                }
            }
            Step::EnsureBroker => {
                if self.management.is_broker_running().await {
                    tracing::info!(parent: &self.span, "broker is operational");
                    return Ok(());
                }

                tracing::error!(parent: &self.span, "broker not running, attempting to start it");
                self.management.start_broker().await;
                time::sleep(self.recovery.broker_settle()).await;

                if !self.management.is_broker_running().await {
                    return Err(self.fatal(FatalReason::BrokerDown));
                }
                tracing::info!(parent: &self.span, "broker is operational, retrying connection");
            }
            Step::RestartControlProcess => self.restart_control_process().await,
            Step::RestartOrReboot => {
                tracing::error!(parent: &self.span, "device went silent, restarting control process");
                self.restart_control_process().await;

                if !self.management.is_control_process_running().await {
                    tracing::error!(parent: &self.span, "control process cannot be run, rebooting device");
                    self.reboot().await;
                }
            }
            Step::Reboot => self.reboot().await,
        }

        Ok(())
    }

    async fn restart_control_process(&self) {
        if !self.management.stop_control_process().await {
            tracing::warn!(parent: &self.span, "stop request for the control process was not delivered");
        }
        self.management.start_control_process().await;
        time::sleep(self.recovery.process_settle()).await;
    }

    async fn reboot(&self) {
        self.link.disconnect().await;
        self.management.reboot().await;

        tracing::warn!(parent: &self.span, "device is rebooting, all schedules on it are lost");
        self.send(ControllerEvent::ScheduleStateLost);

        time::sleep(self.recovery.reboot_wait()).await;
    }

    fn fail(&self, class: FailureClass) -> FailureClass {
        self.transition(|machine| machine.fail(class));
        class
    }

    fn fatal(&self, reason: FatalReason) -> RecoveryError {
        self.transition(|machine| machine.fatal(reason));
        let error = RecoveryError::Fatal(reason);
        tracing::error!(parent: &self.span, "{error}");
        error
    }

    fn transition<F>(&self, apply: F)
    where
        F: FnOnce(&mut LinkMachine),
    {
        let (before, after) = self.with_machine(|machine| {
            let before = machine.state();
            apply(machine);
            (before, machine.state())
        });

        if before != after {
            tracing::info!(parent: &self.span, "link {before} -> {after}");
            self.notify(after);
        }
    }

    fn with_machine<T>(&self, apply: impl FnOnce(&mut LinkMachine) -> T) -> T {
        let mut machine = self.machine.lock().unwrap_or_else(|e| e.into_inner());
        apply(&mut machine)
    }

    fn notify(&self, state: LinkState) {
        self.send(ControllerEvent::StateChanged(state));
    }

    fn send(&self, event: ControllerEvent) {
        // No receivers is fine.
        let _ = self.sender.send(event);
    }
}

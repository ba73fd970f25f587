use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use spectra_api::message::CodecError;
use spectra_api::schedule::parse_minute;
use spectra_api::transport::Callback;
use spectra_api::{ChannelId, ControllerCommand, DeviceReport, Levels, Message, ScheduleStore, ScheduleWindow, Temperatures};
use time::OffsetDateTime;
use tokio::sync::broadcast::Sender;
use tracing::Span;

use crate::configs::settings::Schedule;
use crate::errors::PanelError;
use crate::services::event::ControllerEvent;
use crate::services::heartbeat_service::HeartbeatMonitor;
use crate::services::link::Link;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelTelemetry {
    pub channel: ChannelId,
    pub levels: Levels,
    pub temperatures: Temperatures,
    pub received_at: OffsetDateTime,
}

#[derive(Debug, Default)]
struct Panel {
    schedule: ScheduleStore,
    active: bool,
    autostart: bool,
    telemetry: Option<ChannelTelemetry>,
}

/// Operator side of the panels: schedule authoring, commands to the device
/// and the latest telemetry it reported.
pub struct PanelService {
    link: Arc<dyn Link>,
    topic: String,
    monitor: Arc<HeartbeatMonitor>,
    panels: RwLock<Vec<Panel>>,
    pending_autostart: AtomicBool,
    sender: Sender<ControllerEvent>,
    span: Span,
}

impl PanelService {
    pub fn new(
        link: Arc<dyn Link>,
        topic: &str,
        channels: u8,
        monitor: Arc<HeartbeatMonitor>,
        sender: Sender<ControllerEvent>,
        span: Span,
    ) -> Self {
        Self {
            link,
            topic: topic.to_string(),
            monitor,
            panels: RwLock::new((0..channels).map(|_| Panel::default()).collect()),
            pending_autostart: AtomicBool::new(true),
            sender,
            span,
        }
    }

    pub fn channels(&self) -> Vec<ChannelId> {
        let count = self.read(|panels| panels.len());
        (1..=count as u8).filter_map(ChannelId::new).collect()
    }

    pub fn channel(&self, id: u8) -> Result<ChannelId, PanelError> {
        let count = self.read(|panels| panels.len());

        ChannelId::new(id)
            .filter(|channel| channel.index() < count)
            .ok_or(PanelError::UnknownChannel(id))
    }

    /// Adds the configured windows to the schedule book. Bad windows are
    /// logged and skipped.
    pub fn load_schedules(&self, schedules: &[Schedule]) {
        for schedule in schedules {
            let channel = match self.channel(schedule.channel) {
                Ok(channel) => channel,
                Err(e) => {
                    tracing::error!(parent: &self.span, "skipping configured schedule: {e}");
                    continue;
                }
            };

            for window in &schedule.windows {
                if let Err(e) = self.add_window_at(channel, &window.start, &window.end, window.levels) {
                    tracing::error!(parent: &self.span, "skipping window {}-{} on channel {channel}: {e}", window.start, window.end);
                }
            }

            if schedule.activate {
                self.write(channel, |panel| panel.autostart = true);
            }
        }
    }

    pub fn add_window(&self, channel: ChannelId, start: u16, end: u16, values: [u8; 4]) -> Result<ScheduleWindow, PanelError> {
        let window = self.try_write(channel, |panel| panel.schedule.add_window(start, end, values))??;
        tracing::info!(parent: &self.span, "channel {channel}: added window {window}");

        Ok(window)
    }

    /// Same as `add_window` with `HH:MM` times.
    pub fn add_window_at(&self, channel: ChannelId, start: &str, end: &str, values: [u8; 4]) -> Result<ScheduleWindow, PanelError> {
        let start = parse_minute(start).ok_or_else(|| PanelError::InvalidTime(start.to_string()))?;
        let end = parse_minute(end).ok_or_else(|| PanelError::InvalidTime(end.to_string()))?;

        self.add_window(channel, start, end, values)
    }

    pub fn remove_window(&self, channel: ChannelId, window: &ScheduleWindow) -> Result<bool, PanelError> {
        self.try_write(channel, |panel| panel.schedule.remove_window(window))
    }

    pub fn schedule(&self, channel: ChannelId) -> Result<ScheduleStore, PanelError> {
        self.try_read(channel, |panel| panel.schedule.clone())
    }

    pub fn is_active(&self, channel: ChannelId) -> Result<bool, PanelError> {
        self.try_read(channel, |panel| panel.active)
    }

    pub fn telemetry(&self, channel: ChannelId) -> Option<ChannelTelemetry> {
        self.try_read(channel, |panel| panel.telemetry).ok().flatten()
    }

    pub async fn request_status(&self, channel: ChannelId) -> Result<(), PanelError> {
        self.channel(channel.get())?;
        self.send(ControllerCommand::Status { channel }).await
    }

    pub async fn set_levels(&self, channel: ChannelId, levels: Levels) -> Result<(), PanelError> {
        self.channel(channel.get())?;
        self.send(ControllerCommand::Set { channel, levels }).await
    }

    /// Sends the channel's schedule to the device and marks it active.
    pub async fn activate(&self, channel: ChannelId) -> Result<(), PanelError> {
        let schedule = self.schedule(channel)?;
        self.send(ControllerCommand::activate(channel, &schedule)).await?;

        self.write(channel, |panel| panel.active = true);
        tracing::info!(parent: &self.span, "channel {channel}: schedule activated with {} windows", schedule.len());
        let _ = self.sender.send(ControllerEvent::Activated(channel));

        Ok(())
    }

    pub async fn deactivate(&self, channel: ChannelId) -> Result<(), PanelError> {
        self.channel(channel.get())?;
        self.send(ControllerCommand::Deactivate { channel }).await?;

        self.write(channel, |panel| panel.active = false);
        tracing::info!(parent: &self.span, "channel {channel}: schedule deactivated");
        let _ = self.sender.send(ControllerEvent::Deactivated(channel));

        Ok(())
    }

    /// Activates the configured schedules on the first `Live` after startup.
    /// Later reconnects and device reboots never re-send them, since the
    /// device may already have consumed some of their windows.
    pub async fn on_live(&self) {
        if !self.pending_autostart.swap(false, Ordering::SeqCst) {
            return;
        }

        let channels: Vec<ChannelId> = self
            .channels()
            .into_iter()
            .filter(|channel| self.try_read(*channel, |panel| panel.autostart).unwrap_or(false))
            .collect();

        for channel in channels {
            if let Err(e) = self.activate(channel).await {
                tracing::error!(parent: &self.span, "channel {channel}: cannot activate configured schedule: {e}");
                self.pending_autostart.store(true, Ordering::SeqCst);
            }
        }
    }

    /// The device lost its schedules; every channel is inactive again until
    /// the operator activates it.
    pub fn forget_activations(&self) -> Vec<ChannelId> {
        let mut panels = self.panels.write().unwrap_or_else(|e| e.into_inner());
        let forgotten = panels
            .iter_mut()
            .enumerate()
            .filter(|(_, panel)| panel.active)
            .filter_map(|(index, panel)| {
                panel.active = false;
                ChannelId::new(index as u8 + 1)
            })
            .collect::<Vec<_>>();

        if !forgotten.is_empty() {
            tracing::warn!(parent: &self.span, "schedules on channels {forgotten:?} must be activated again");
        }
        forgotten
    }

    /// Session callback for the device topic. It holds the service weakly,
    /// since the service itself holds the session.
    pub fn inbound_handler(self: &Arc<Self>) -> Callback {
        let panels: Weak<Self> = Arc::downgrade(self);
        Arc::new(move |raw: &str| {
            if let Some(panels) = panels.upgrade() {
                panels.handle_inbound(raw);
            }
        })
    }

    /// Handles one raw message from the device topic.
    pub fn handle_inbound(&self, raw: &str) {
        let message = match Message::decode(raw) {
            Ok(message) => message,
            Err(CodecError::ChecksumMismatch) => {
                tracing::error!(parent: &self.span, "hashes do not match, dropped: {raw}");
                return;
            }
            Err(e) => {
                tracing::debug!(parent: &self.span, "{e}, dropped: {raw}");
                return;
            }
        };

        self.monitor.reset();

        match DeviceReport::try_from(&message) {
            Ok(DeviceReport::Status { channel, levels, temperatures }) => {
                let telemetry = ChannelTelemetry {
                    channel,
                    levels,
                    temperatures,
                    received_at: OffsetDateTime::now_utc(),
                };
                if self.try_write(channel, |panel| panel.telemetry = Some(telemetry)).is_err() {
                    tracing::warn!(parent: &self.span, "status for unknown channel {channel}");
                    return;
                }
                tracing::info!(parent: &self.span, "channel {channel}: levels {levels}, temperatures {:?}", temperatures.0);
                let _ = self.sender.send(ControllerEvent::Telemetry(telemetry));
            }
            Ok(DeviceReport::Check) => tracing::trace!(parent: &self.span, "heartbeat from device"),
            Ok(DeviceReport::Echo(echo)) => tracing::debug!(parent: &self.span, "device received: {echo}"),
            Ok(DeviceReport::Error(code)) => {
                tracing::warn!(parent: &self.span, "device reported error {}", code.code());
                let _ = self.sender.send(ControllerEvent::DeviceError(code));
            }
            Err(e) => tracing::debug!(parent: &self.span, "unhandled report {message}: {e}"),
        }
    }

    async fn send(&self, command: ControllerCommand) -> Result<(), PanelError> {
        self.link.publish(&self.topic, command.to_fields()).await?;
        Ok(())
    }

    fn read<T>(&self, apply: impl FnOnce(&[Panel]) -> T) -> T {
        let panels = self.panels.read().unwrap_or_else(|e| e.into_inner());
        apply(&panels)
    }

    fn try_read<T>(&self, channel: ChannelId, apply: impl FnOnce(&Panel) -> T) -> Result<T, PanelError> {
        let panels = self.panels.read().unwrap_or_else(|e| e.into_inner());
        panels
            .get(channel.index())
            .map(apply)
            .ok_or(PanelError::UnknownChannel(channel.get()))
    }

    fn try_write<T>(&self, channel: ChannelId, apply: impl FnOnce(&mut Panel) -> T) -> Result<T, PanelError> {
        let mut panels = self.panels.write().unwrap_or_else(|e| e.into_inner());
        panels
            .get_mut(channel.index())
            .map(apply)
            .ok_or(PanelError::UnknownChannel(channel.get()))
    }

    fn write(&self, channel: ChannelId, apply: impl FnOnce(&mut Panel)) {
        let _ = self.try_write(channel, apply);
    }
}

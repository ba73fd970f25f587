use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use spectra_api::schedule::{format_minute, minute_of_day};
use spectra_api::{ChannelId, Levels, ScheduleStore, ScheduleWindow};
use ::time::{OffsetDateTime, UtcOffset};
use tokio::time::{self, MissedTickBehavior};
use tracing::Span;

use crate::services::actuator_service::ActuatorHub;

/// Source of the current minute of day.
pub trait Clock: Send + Sync {
    fn minute_of_day(&self) -> u16;
}

/// Wall clock in a fixed UTC offset.
///
/// The local offset can only be read reliably while the process is single
/// threaded, so `detect` belongs before the runtime starts.
#[derive(Debug, Clone, Copy)]
pub struct LocalClock {
    offset: UtcOffset,
}

impl LocalClock {
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }

    pub fn detect() -> Self {
        Self::new(UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC))
    }
}

impl Clock for LocalClock {
    fn minute_of_day(&self) -> u16 {
        let now = OffsetDateTime::now_utc().to_offset(self.offset);
        minute_of_day(now.hour(), now.minute())
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct FixedClock(AtomicU16);

impl FixedClock {
    pub fn new(minute: u16) -> Self {
        Self(AtomicU16::new(minute))
    }

    pub fn set(&self, minute: u16) {
        self.0.store(minute, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn minute_of_day(&self) -> u16 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChannelSlot {
    pub schedule: ScheduleStore,
    pub output: Levels,
}

/// Device-side schedules and live outputs of every channel.
///
/// Windows fire at most once: the first poll that finds one due applies it
/// and removes it. Windows whose time passed unseen stay in the store.
pub struct SchedulerService {
    slots: Mutex<Vec<ChannelSlot>>,
    clock: Arc<dyn Clock>,
    actuators: Arc<ActuatorHub>,
    span: Span,
}

impl SchedulerService {
    pub fn new(channels: u8, clock: Arc<dyn Clock>, actuators: Arc<ActuatorHub>, span: Span) -> Self {
        Self {
            slots: Mutex::new(vec![ChannelSlot::default(); usize::from(channels)]),
            clock,
            actuators,
            span,
        }
    }

    pub fn contains(&self, channel: ChannelId) -> bool {
        channel.index() < self.lock().len()
    }

    /// Replaces the schedule of `channel` with the given entries and returns
    /// how many were accepted.
    pub fn activate(&self, channel: ChannelId, entries: &[String]) -> Option<usize> {
        let mut slots = self.lock();
        let slot = slots.get_mut(channel.index())?;
        slot.schedule.clear();

        for entry in entries {
            let accepted = ScheduleWindow::parse_entry(entry).and_then(|window| slot.schedule.insert(window));
            if let Err(e) = accepted {
                tracing::warn!(parent: &self.span, "channel {channel}: skipping entry {entry}: {e}");
            }
        }

        let accepted = slot.schedule.len();
        tracing::info!(parent: &self.span, "channel {channel}: schedule activated with {accepted} windows");

        Some(accepted)
    }

    /// Drops the schedule of `channel`, leaving its output as it is.
    pub fn deactivate(&self, channel: ChannelId) -> bool {
        let mut slots = self.lock();
        let Some(slot) = slots.get_mut(channel.index()) else {
            return false;
        };

        slot.schedule.clear();
        tracing::info!(parent: &self.span, "channel {channel}: schedule deactivated");

        true
    }

    /// Records a manual output change; the caller drives the actuators.
    pub fn set_output(&self, channel: ChannelId, levels: Levels) -> bool {
        let mut slots = self.lock();
        let Some(slot) = slots.get_mut(channel.index()) else {
            return false;
        };

        slot.output = levels;
        true
    }

    pub fn output(&self, channel: ChannelId) -> Option<Levels> {
        self.lock().get(channel.index()).map(|slot| slot.output)
    }

    pub fn schedule(&self, channel: ChannelId) -> Option<ScheduleStore> {
        self.lock().get(channel.index()).map(|slot| slot.schedule.clone())
    }

    /// Applies and consumes every window due now. Returns what fired.
    pub fn poll_once(&self) -> Vec<(ChannelId, ScheduleWindow)> {
        let now = self.clock.minute_of_day();

        let fired: Vec<(ChannelId, ScheduleWindow)> = {
            let mut slots = self.lock();
            slots
                .iter_mut()
                .enumerate()
                .filter_map(|(index, slot)| Some((ChannelId::new(u8::try_from(index + 1).ok()?)?, slot)))
                .flat_map(|(channel, slot)| {
                    let due = slot.schedule.take_due(now);
                    if let Some(last) = due.last() {
                        slot.output = last.levels;
                    }
                    due.into_iter().map(move |window| (channel, window))
                })
                .collect()
        };

        for (channel, window) in &fired {
            tracing::info!(
                parent: &self.span,
                "channel {channel}: window {window} fired at {}",
                format_minute(now)
            );
            self.actuators.set(*channel, window.levels);
        }

        fired
    }

    pub async fn run(self: Arc<Self>, period: Duration) {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            self.poll_once();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ChannelSlot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::configs::settings::Heartbeat;
use crate::services::recovery_service::FailureClass;

/// Counts heartbeat ticks since the last valid message from the device.
///
/// Ticks come from the orchestrator and resets from the session receive
/// task, so the counter is a plain atomic.
#[derive(Debug, Default)]
pub struct HeartbeatMonitor {
    ticks: AtomicU32,
    resets: AtomicU64,
}

impl HeartbeatMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the counter and returns the new value.
    pub fn tick(&self) -> u32 {
        self.ticks.fetch_add(1, Ordering::SeqCst).saturating_add(1)
    }

    pub fn reset(&self) {
        self.ticks.store(0, Ordering::SeqCst);
        self.resets.fetch_add(1, Ordering::SeqCst);
    }

    pub fn ticks(&self) -> u32 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Number of resets so far; a change means the device was heard.
    pub fn resets(&self) -> u64 {
        self.resets.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub soft: u32,
    pub hard: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { soft: 7, hard: 8 }
    }
}

impl From<&Heartbeat> for Thresholds {
    fn from(heartbeat: &Heartbeat) -> Self {
        Self {
            soft: heartbeat.soft_timeout_ticks,
            hard: heartbeat.hard_timeout_ticks,
        }
    }
}

impl Thresholds {
    pub fn evaluate(&self, ticks: u32) -> Option<FailureClass> {
        if ticks > self.hard {
            Some(FailureClass::DeviceUnresponsive)
        } else if ticks == self.soft {
            Some(FailureClass::LivenessTimeout)
        } else {
            None
        }
    }
}

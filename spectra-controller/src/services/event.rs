use spectra_api::{ChannelId, ErrorCode};

use crate::services::panel_service::ChannelTelemetry;
use crate::services::recovery_service::LinkState;

#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    StateChanged(LinkState),
    /// The device rebooted and forgot every schedule it held.
    ScheduleStateLost,
    Telemetry(ChannelTelemetry),
    DeviceError(ErrorCode),
    Activated(ChannelId),
    Deactivated(ChannelId),
}

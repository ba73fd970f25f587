pub mod message;
pub mod models;
pub mod schedule;
pub mod transport;

pub use message::{ControllerCommand, DeviceReport, ErrorCode, Keyword, Message};
pub use models::{Band, ChannelId, Levels, Temperatures};
pub use schedule::{ScheduleError, ScheduleStore, ScheduleWindow};

/// Topic carrying controller commands to the device.
pub const CONTROLLER_TOPIC: &str = "pc_to_pi";

/// Topic carrying device reports back to the controller.
pub const DEVICE_TOPIC: &str = "pi_to_pc";

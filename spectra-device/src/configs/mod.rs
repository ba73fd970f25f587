pub mod settings;

pub use settings::{Actuator, Broker, Heartbeat, Scheduler, Settings};

pub mod settings;

pub use settings::{Broker, Device, Heartbeat, Management, Recovery, Settings};

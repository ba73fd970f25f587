pub mod device;

pub use device::DeviceError;

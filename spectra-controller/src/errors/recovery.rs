use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalReason {
    DeviceUnreachable,
    BrokerDown,
    RetriesExhausted,
}

impl FatalReason {
    pub fn exit_code(&self) -> i32 {
        match self {
            FatalReason::DeviceUnreachable => 1,
            FatalReason::BrokerDown => 2,
            FatalReason::RetriesExhausted => 3,
        }
    }
}

impl fmt::Display for FatalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalReason::DeviceUnreachable => write!(f, "device cannot be reached over the management channel"),
            FatalReason::BrokerDown => write!(f, "broker on the device will not start"),
            FatalReason::RetriesExhausted => write!(f, "recovery attempts exhausted"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("Fatal link failure, {0}. Restart device power and this program, and make sure the device address is correct")]
    Fatal(FatalReason),
}

impl RecoveryError {
    pub fn exit_code(&self) -> i32 {
        match self {
            RecoveryError::Fatal(reason) => reason.exit_code(),
        }
    }
}

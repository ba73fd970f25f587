use spectra_api::transport::SessionError;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Expected {expected} actuator links, found {found}")]
    MissingLinks { expected: usize, found: usize },

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Incomplete write to {0}")]
    IncompleteWrite(String),

    #[error("Link error: {0}")]
    Link(#[from] SessionError),
}

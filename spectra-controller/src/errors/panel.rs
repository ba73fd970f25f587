use spectra_api::ScheduleError;
use spectra_api::transport::SessionError;

#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    #[error("Unknown channel {0}")]
    UnknownChannel(u8),

    #[error("Invalid schedule: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("Invalid time of day {0}")]
    InvalidTime(String),

    #[error("Link error: {0}")]
    Link(#[from] SessionError),
}

pub mod panel;
pub mod recovery;

pub use panel::PanelError;
pub use recovery::{FatalReason, RecoveryError};

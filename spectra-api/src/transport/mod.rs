mod error;
mod session;

pub use error::SessionError;
pub use session::{Callback, Session, SessionOptions, SessionState};

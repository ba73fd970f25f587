use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Publish or subscribe attempted without a live connection
    NotConnected,
    /// Broker answered the handshake with a non-success return code
    ConnectionRefused { code: u8 },
    /// Broker could not be reached at all
    Unreachable(String),
    /// No CONNACK within the connect timeout
    Timeout,
    /// Request could not be queued on the client
    Client(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "Not connected to broker"),
            Self::ConnectionRefused { code } => {
                write!(f, "Connection refused with result code {}", code)
            }
            Self::Unreachable(e) => write!(f, "Broker unreachable: {}", e),
            Self::Timeout => write!(f, "Connection timeout"),
            Self::Client(e) => write!(f, "Client error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<rumqttc::ClientError> for SessionError {
    fn from(err: rumqttc::ClientError) -> Self {
        SessionError::Client(err.to_string())
    }
}

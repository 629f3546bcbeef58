use thiserror::Error;

pub type Result<T, E = TransportError> = core::result::Result<T, E>;

/// Failures of a single bus handle.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not supported by this backend: {0}")]
    Unsupported(&'static str),
    #[error("bus I/O failed: {0}")]
    Io(String),
    #[error("no frame within the receive timeout")]
    Timeout,
    #[error("malformed frame: {0}")]
    InvalidFrame(&'static str),
    #[error("bus not connected: {0}")]
    NotConnected(String),
    #[error("{0} lock poisoned")]
    Poisoned(&'static str),
}

impl TransportError {
    /// Receive timeouts are the normal idle outcome of a poll, not a fault.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => TransportError::Timeout,
            _ => TransportError::Io(e.to_string()),
        }
    }
}

#[cfg(feature = "slcan")]
impl From<serialport::Error> for TransportError {
    fn from(e: serialport::Error) -> Self {
        match e.kind() {
            serialport::ErrorKind::NoDevice => TransportError::NotConnected(e.to_string()),
            _ => TransportError::Io(e.to_string()),
        }
    }
}

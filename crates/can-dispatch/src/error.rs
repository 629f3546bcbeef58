use crate::Role;
use can_transport::TransportError;
use signal_db::{DatabaseError, EncodeError};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// How the caller named the message to transmit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKey {
    Id(u32),
    Name(String),
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKey::Id(id) => write!(f, "0x{id:X}"),
            MessageKey::Name(name) => f.write_str(name),
        }
    }
}

/// Transmit-path failures. None of these are retried by the processor.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("unknown message {0}")]
    UnknownMessage(MessageKey),
    #[error("encoding failed: {0}")]
    EncodeFailed(#[from] EncodeError),
    #[error("message {0} has no valid CAN id for its payload")]
    InvalidFrame(String),
    #[error("interface not found: {0}")]
    InterfaceNotFound(String),
    #[error("interface {interface} has role {role} and cannot send")]
    RoleNotPermitted { interface: String, role: Role },
    #[error("transport failure on {interface}: {source}")]
    TransportFailure {
        interface: String,
        #[source]
        source: TransportError,
    },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("interface {0} is already registered")]
    Duplicate(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("processor already started")]
    AlreadyStarted,
    #[error("start must be called from within a tokio runtime")]
    NoRuntime,
    #[error("spawning reader for {interface}: {source}")]
    Spawn {
        interface: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("interface {interface}: {reason}")]
    Interface { interface: String, reason: String },
}

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("insufficient data for {message}: expected {expected} bytes, got {actual}")]
    InsufficientData {
        message: String,
        expected: usize,
        actual: usize,
    },
    /// Only reachable with a definition that bypassed database validation.
    #[error("signal {signal} lies outside the payload of {message}")]
    SignalOutOfBounds { message: String, signal: String },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EncodeError {
    #[error("unknown signal {signal} in message {message}")]
    UnknownSignal { message: String, signal: String },
    #[error("value {value} for {signal} does not fit {bits} bits (raw {raw})")]
    ValueOutOfRange {
        signal: String,
        value: f64,
        raw: f64,
        bits: u8,
    },
    #[error("signal {signal} has no choice labelled {label:?}")]
    UnknownChoice { signal: String, label: String },
    #[error("signal {signal} lies outside the payload of {message}")]
    SignalOutOfBounds { message: String, signal: String },
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing yaml {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("parsing json {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("duplicate frame id 0x{0:X}")]
    DuplicateFrameId(u32),
    #[error("duplicate message name {0}")]
    DuplicateMessageName(String),
    #[error("invalid message {message}: {reason}")]
    InvalidMessage { message: String, reason: String },
    #[error("invalid signal {message}.{signal}: {reason}")]
    InvalidSignal {
        message: String,
        signal: String,
        reason: String,
    },
}

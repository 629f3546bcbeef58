use crate::{BusInfo, CanFrame, Result, TransportError};

/// A minimal blocking CAN bus interface.
///
/// Buses are moved onto reader threads, so every backend must be `Send`.
pub trait CanBus: Send {
    /// Open a CAN interface by name (e.g., "can0", "/dev/ttyACM0").
    fn open(name: &str) -> Result<Self>
    where
        Self: Sized;

    /// Attempt to list available interfaces for this backend.
    fn list() -> Result<Vec<BusInfo>>
    where
        Self: Sized;

    /// Receive one frame (blocking with optional timeout in milliseconds).
    fn recv(&mut self, _timeout_ms: Option<u64>) -> Result<CanFrame>;

    /// Send one frame.
    fn send(&mut self, frame: &CanFrame) -> Result<()>;

    /// Second handle onto the same channel, so one thread can block in `recv`
    /// while another sends.
    fn try_clone(&self) -> Result<Self>
    where
        Self: Sized,
    {
        Err(TransportError::Unsupported("handle cloning not supported"))
    }
}

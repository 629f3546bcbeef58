use can_transport::{CanBus, CanFrame, Result, TransportError};
use std::sync::{Mutex, MutexGuard};

/// Shared, thread-safe view of one CAN channel.
///
/// `recv` is only ever called from the interface's reader thread; `send` may be called
/// from any number of callers at once.
pub trait FrameTransport: Send + Sync {
    fn send(&self, frame: &CanFrame) -> Result<()>;

    /// Blocking receive; `Err(TransportError::Timeout)` when nothing arrived in time.
    fn recv(&self, timeout_ms: Option<u64>) -> Result<CanFrame>;
}

/// Adapts a blocking [`CanBus`] into a [`FrameTransport`].
///
/// The bus is cloned into separate receive and transmit handles so a reader blocked
/// in `recv` never holds up a sender.
pub struct BusTransport<B: CanBus> {
    rx: Mutex<B>,
    tx: Mutex<B>,
}

impl<B: CanBus> BusTransport<B> {
    pub fn new(bus: B) -> Result<Self> {
        let tx = bus.try_clone()?;
        Ok(Self {
            rx: Mutex::new(bus),
            tx: Mutex::new(tx),
        })
    }
}

fn lock<B>(m: &Mutex<B>) -> Result<MutexGuard<'_, B>> {
    m.lock()
        .map_err(|_| TransportError::Poisoned("transport"))
}

impl<B: CanBus> FrameTransport for BusTransport<B> {
    fn send(&self, frame: &CanFrame) -> Result<()> {
        lock(&self.tx)?.send(frame)
    }

    fn recv(&self, timeout_ms: Option<u64>) -> Result<CanFrame> {
        lock(&self.rx)?.recv(timeout_ms)
    }
}

//! can-transport: cross-platform CAN bus abstractions
//!
//! Blocking [`CanBus`] handles for classic CAN. Backends are feature-gated: `mock` (on by
//! default) is an in-process bus with frame injection and send capture, so the engine
//! and its tests run on any host; `slcan` drives USB-serial adapters.

mod types;
pub use types::{hex_bytes, BusInfo, CanFrame, CanId, Timestamp};

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::CanBus;

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockBus, MockHandle};

#[cfg(feature = "slcan")]
mod slcan;

#[cfg(feature = "slcan")]
pub use slcan::{SlcanBitrate, SlcanBus};

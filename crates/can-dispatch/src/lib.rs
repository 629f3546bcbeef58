//! can-dispatch: multi-interface receive/transmit over a shared signal database
//!
//! Every interface in an [`InterfaceRegistry`] carries a [`Role`]. Once a
//! [`MessageProcessor`] is started, each receiving interface gets a reader thread that
//! feeds a bounded channel, and a tokio task that decodes what arrives and reports it
//! to an [`EventSink`]. Transmission goes the other way through
//! [`MessageProcessor::send`] and is only allowed on sending interfaces.

mod role;
pub use role::Role;

mod error;
pub use error::{ConfigError, DispatchError, MessageKey, RegistryError, SendError};

mod transport;
pub use transport::{BusTransport, FrameTransport};

mod registry;
pub use registry::{InterfaceEntry, InterfaceRegistry};

mod events;
pub use events::{ChannelSink, DecodedEvent, EventSink, LogSink, RawFrame, SignalEvent, UnknownEvent};

mod metrics;
pub use metrics::DispatchMetrics;

mod processor;
pub use processor::{MessageProcessor, ProcessorHandle, ProcessorOptions};

mod config;
pub use config::{Backend, EngineConfig, InterfaceConfig, OpenedInterfaces};

mod simulator;
pub use simulator::{Simulator, TrendGenerator};

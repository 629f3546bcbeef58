use can_transport::{CanFrame, Timestamp};
use serde::{Serialize, Serializer};
use signal_db::SignalValues;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// A frame as delivered by an interface, tagged with where it came from.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub frame: CanFrame,
    pub source_interface: String,
}

impl RawFrame {
    pub fn new(frame: CanFrame, source_interface: impl Into<String>) -> Self {
        Self {
            frame,
            source_interface: source_interface.into(),
        }
    }

    pub fn frame_id(&self) -> u32 {
        self.frame.id.raw()
    }

    pub fn data(&self) -> &[u8] {
        self.frame.payload()
    }

    pub fn is_extended_id(&self) -> bool {
        self.frame.id.is_extended()
    }

    /// Capture time, or now if the transport did not stamp the frame.
    pub fn timestamp(&self) -> Timestamp {
        self.frame.timestamp.unwrap_or_else(Timestamp::now)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DecodedEvent {
    pub frame_id: u32,
    pub message_name: String,
    pub interface: String,
    pub signals: SignalValues,
    #[serde(serialize_with = "rfc3339")]
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnknownEvent {
    pub frame_id: u32,
    pub raw_hex: String,
    pub interface: String,
    #[serde(serialize_with = "rfc3339")]
    pub timestamp: Timestamp,
}

/// Either notification, for consumers that want a single stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SignalEvent {
    Decoded(DecodedEvent),
    Unknown(UnknownEvent),
}

fn rfc3339<S: Serializer>(ts: &Timestamp, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.rfc3339())
}

/// Downstream consumer of receive-path notifications.
///
/// Calls arrive on the consumer task of whichever interface received the frame, so
/// implementations must be cheap and must not block; hand off to a queue if needed.
pub trait EventSink: Send + Sync {
    fn on_decoded(&self, event: DecodedEvent);
    fn on_unknown(&self, event: UnknownEvent);
}

/// Forwards every event into an unbounded channel.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SignalEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SignalEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn on_decoded(&self, event: DecodedEvent) {
        // Receiver gone means nobody is listening any more; dropping is fine.
        let _ = self.tx.send(SignalEvent::Decoded(event));
    }

    fn on_unknown(&self, event: UnknownEvent) {
        let _ = self.tx.send(SignalEvent::Unknown(event));
    }
}

/// Writes events to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn on_decoded(&self, event: DecodedEvent) {
        info!(
            message = %event.message_name,
            interface = %event.interface,
            signals = ?event.signals,
            "decoded"
        );
    }

    fn on_unknown(&self, event: UnknownEvent) {
        debug!(
            frame_id = format_args!("0x{:X}", event.frame_id),
            interface = %event.interface,
            data = %event.raw_hex,
            "unknown frame"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use can_transport::CanId;

    #[test]
    fn test_event_json_shape() {
        let ev = SignalEvent::Unknown(UnknownEvent {
            frame_id: 0x999,
            raw_hex: "01 02".into(),
            interface: "can0".into(),
            timestamp: Timestamp::now(),
        });
        let v: serde_json::Value = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["event"], "unknown");
        assert_eq!(v["frame_id"], 0x999);
        assert_eq!(v["raw_hex"], "01 02");
        assert!(v["timestamp"].as_str().unwrap().contains('T'));
    }

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (sink, mut rx) = ChannelSink::new();
        sink.on_unknown(UnknownEvent {
            frame_id: 1,
            raw_hex: String::new(),
            interface: "a".into(),
            timestamp: Timestamp::now(),
        });
        assert!(matches!(rx.recv().await, Some(SignalEvent::Unknown(_))));
    }

    #[test]
    fn test_raw_frame_accessors() {
        let frame = CanFrame::new(CanId::extended(0x0CF0_0400).unwrap(), &[1, 2, 3]).unwrap();
        let raw = RawFrame::new(frame, "can1");
        assert_eq!(raw.frame_id(), 0x0CF0_0400);
        assert!(raw.is_extended_id());
        assert_eq!(raw.data(), &[1, 2, 3]);
        assert_eq!(raw.source_interface, "can1");
    }
}

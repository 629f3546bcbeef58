use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Counters for the receive and transmit paths of one processor.
#[derive(Clone)]
pub struct DispatchMetrics {
    pub registry: Registry,
    pub rx_frames: IntCounter,
    pub decoded: IntCounter,
    pub unknown: IntCounter,
    pub decode_errors: IntCounter,
    pub tx_frames: IntCounter,
    pub tx_errors: IntCounter,
    pub messages_loaded: IntGauge,
}

impl DispatchMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let c = IntCounter::new(name, help)?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };
        let rx_frames = counter("canvis_rx_frames", "Total CAN frames received")?;
        let decoded = counter("canvis_decoded_frames", "Frames decoded against the database")?;
        let unknown = counter("canvis_unknown_frames", "Frames with no matching message")?;
        let decode_errors = counter("canvis_decode_errors", "Frames that failed to decode")?;
        let tx_frames = counter("canvis_tx_frames", "Total CAN frames sent")?;
        let tx_errors = counter("canvis_tx_errors", "Send requests that failed")?;
        let messages_loaded = IntGauge::new(
            "canvis_messages_loaded",
            "Number of message definitions in the database",
        )?;
        registry.register(Box::new(messages_loaded.clone()))?;
        Ok(Self {
            registry,
            rx_frames,
            decoded,
            unknown,
            decode_errors,
            tx_frames,
            tx_errors,
            messages_loaded,
        })
    }

    /// Prometheus text exposition of every registered metric.
    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_show_up_in_text() {
        let m = DispatchMetrics::new().unwrap();
        m.rx_frames.inc();
        m.rx_frames.inc();
        m.unknown.inc();
        m.messages_loaded.set(3);
        let text = m.encode_text();
        assert!(text.contains("canvis_rx_frames 2"));
        assert!(text.contains("canvis_unknown_frames 1"));
        assert!(text.contains("canvis_messages_loaded 3"));
    }
}

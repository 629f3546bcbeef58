use crate::{
    DecodedEvent, DispatchError, DispatchMetrics, EventSink, FrameTransport, InterfaceRegistry,
    MessageKey, RawFrame, SendError, UnknownEvent,
};
use can_transport::{hex_bytes, CanFrame};
use serde::{Deserialize, Serialize};
use signal_db::{
    decode_values, encode, encode_values, MessageDef, PhysicalValues, SignalDatabase,
    SignalValues,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle as TaskHandle;
use tracing::{debug, info, warn};

const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorOptions {
    /// Frames buffered per interface between its reader thread and consumer task.
    pub queue_capacity: usize,
    /// Upper bound on a single blocking receive; also the shutdown latency.
    pub poll_timeout_ms: u64,
    /// Emit choice labels instead of numbers where a signal defines them.
    pub decode_choices: bool,
    /// Retry unmatched ids under [`signal_db::FALLBACK_ID_MASKS`].
    pub id_fallback: bool,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            poll_timeout_ms: 100,
            decode_choices: true,
            id_fallback: true,
        }
    }
}

/// Routes inbound frames to the decoder and event sink, and outbound values to the
/// encoder and an interface.
pub struct MessageProcessor {
    db: Arc<SignalDatabase>,
    registry: Arc<InterfaceRegistry>,
    sink: Arc<dyn EventSink>,
    options: ProcessorOptions,
    metrics: Option<DispatchMetrics>,
    started: AtomicBool,
}

impl MessageProcessor {
    pub fn new(
        db: Arc<SignalDatabase>,
        registry: InterfaceRegistry,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            db,
            registry: Arc::new(registry),
            sink,
            options: ProcessorOptions::default(),
            metrics: None,
            started: AtomicBool::new(false),
        }
    }

    pub fn with_options(mut self, options: ProcessorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_metrics(mut self, metrics: DispatchMetrics) -> Self {
        metrics.messages_loaded.set(self.db.len() as i64);
        self.metrics = Some(metrics);
        self
    }

    pub fn database(&self) -> &Arc<SignalDatabase> {
        &self.db
    }

    pub fn registry(&self) -> &InterfaceRegistry {
        &self.registry
    }

    pub fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    pub fn metrics(&self) -> Option<&DispatchMetrics> {
        self.metrics.as_ref()
    }

    /// Decode one inbound frame and notify the sink. Never fails; a frame that
    /// cannot be decoded is logged and dropped.
    pub fn on_frame_received(&self, raw: RawFrame) {
        self.count(|m| m.rx_frames.inc());
        let frame_id = raw.frame_id();
        if raw.frame.rtr {
            debug!(
                frame_id = format_args!("0x{frame_id:X}"),
                interface = %raw.source_interface,
                "ignoring remote frame"
            );
            return;
        }
        let Some(msg) = self.db.lookup(frame_id, self.options.id_fallback) else {
            debug!(
                frame_id = format_args!("0x{frame_id:X}"),
                interface = %raw.source_interface,
                "no message definition"
            );
            self.count(|m| m.unknown.inc());
            self.sink.on_unknown(UnknownEvent {
                frame_id,
                raw_hex: hex_bytes(raw.data()),
                interface: raw.source_interface.clone(),
                timestamp: raw.timestamp(),
            });
            return;
        };

        match decode_values(msg, raw.data(), self.options.decode_choices) {
            Ok(signals) => {
                debug!(message = %msg.name, interface = %raw.source_interface, "decoded frame");
                self.count(|m| m.decoded.inc());
                self.sink.on_decoded(DecodedEvent {
                    frame_id,
                    message_name: msg.name.clone(),
                    interface: raw.source_interface.clone(),
                    signals,
                    timestamp: raw.timestamp(),
                });
            }
            Err(e) => {
                warn!(interface = %raw.source_interface, error = %e, "dropping undecodable frame");
                self.count(|m| m.decode_errors.inc());
            }
        }
    }

    /// Encode `values` for the message with `frame_id` and transmit on `interface`.
    pub fn send(
        &self,
        interface: &str,
        frame_id: u32,
        values: &PhysicalValues,
    ) -> Result<(), SendError> {
        let result = self
            .message_for(MessageKey::Id(frame_id))
            .and_then(|msg| Ok((msg, encode(msg, values)?)))
            .and_then(|(msg, payload)| self.transmit(interface, msg, &payload));
        self.record_send(&result);
        result
    }

    /// Like [`send`](Self::send), accepting choice labels as values.
    pub fn send_values(
        &self,
        interface: &str,
        frame_id: u32,
        values: &SignalValues,
    ) -> Result<(), SendError> {
        let result = self
            .message_for(MessageKey::Id(frame_id))
            .and_then(|msg| Ok((msg, encode_values(msg, values)?)))
            .and_then(|(msg, payload)| self.transmit(interface, msg, &payload));
        self.record_send(&result);
        result
    }

    pub fn send_by_name(
        &self,
        interface: &str,
        message: &str,
        values: &SignalValues,
    ) -> Result<(), SendError> {
        let result = self
            .message_for(MessageKey::Name(message.to_string()))
            .and_then(|msg| Ok((msg, encode_values(msg, values)?)))
            .and_then(|(msg, payload)| self.transmit(interface, msg, &payload));
        self.record_send(&result);
        result
    }

    /// Attach a reader thread and consumer task to every receiving interface.
    ///
    /// Must be called from within a tokio runtime, and only once. If a reader thread
    /// cannot be spawned, the consumers already attached are stopped again.
    pub fn start(self: &Arc<Self>) -> Result<ProcessorHandle, DispatchError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| DispatchError::NoRuntime)?;
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(DispatchError::AlreadyStarted);
        }

        let mut handle = ProcessorHandle {
            shutdown: Arc::new(AtomicBool::new(false)),
            readers: Vec::new(),
            consumers: Vec::new(),
        };
        for entry in self.registry.receivers() {
            if !entry.mark_registered() {
                warn!(interface = %entry.name(), "receive consumer already attached");
                continue;
            }
            let (tx, mut rx) = mpsc::channel::<RawFrame>(self.options.queue_capacity.max(1));
            let reader = spawn_reader(
                entry.name().to_string(),
                Arc::clone(entry.transport()),
                tx,
                Arc::clone(&handle.shutdown),
                self.options.poll_timeout_ms,
            )
            .map_err(|source| DispatchError::Spawn {
                interface: entry.name().to_string(),
                source,
            })?;
            handle.readers.push(reader);

            let this = Arc::clone(self);
            handle.consumers.push(runtime.spawn(async move {
                while let Some(raw) = rx.recv().await {
                    this.on_frame_received(raw);
                }
            }));
            info!(interface = %entry.name(), role = %entry.role(), "receive consumer attached");
        }
        Ok(handle)
    }

    fn message_for(&self, key: MessageKey) -> Result<&MessageDef, SendError> {
        let found = match &key {
            MessageKey::Id(id) => self.db.message_by_id(*id),
            MessageKey::Name(name) => self.db.message_by_name(name),
        };
        found.ok_or(SendError::UnknownMessage(key))
    }

    fn transmit(&self, interface: &str, msg: &MessageDef, payload: &[u8]) -> Result<(), SendError> {
        let entry = self
            .registry
            .get(interface)
            .ok_or_else(|| SendError::InterfaceNotFound(interface.to_string()))?;
        if !entry.role().can_send() {
            return Err(SendError::RoleNotPermitted {
                interface: interface.to_string(),
                role: entry.role(),
            });
        }
        let frame = msg
            .can_id()
            .and_then(|id| CanFrame::new(id, payload))
            .ok_or_else(|| SendError::InvalidFrame(msg.name.clone()))?;
        entry
            .transport()
            .send(&frame)
            .map_err(|source| SendError::TransportFailure {
                interface: interface.to_string(),
                source,
            })?;
        debug!(message = %msg.name, interface, data = %frame.data_hex(), "frame sent");
        Ok(())
    }

    fn record_send(&self, result: &Result<(), SendError>) {
        match result {
            Ok(()) => self.count(|m| m.tx_frames.inc()),
            Err(e) => {
                debug!(error = %e, "send rejected");
                self.count(|m| m.tx_errors.inc());
            }
        }
    }

    fn count(&self, f: impl FnOnce(&DispatchMetrics)) {
        if let Some(m) = &self.metrics {
            f(m);
        }
    }
}

fn spawn_reader(
    name: String,
    transport: Arc<dyn FrameTransport>,
    tx: mpsc::Sender<RawFrame>,
    shutdown: Arc<AtomicBool>,
    poll_timeout_ms: u64,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("can-rx-{name}"))
        .spawn(move || {
            debug!(interface = %name, "reader started");
            while !shutdown.load(Ordering::Acquire) {
                match transport.recv(Some(poll_timeout_ms)) {
                    Ok(frame) => {
                        if tx.blocking_send(RawFrame::new(frame, name.as_str())).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.is_timeout() => {}
                    Err(e) => {
                        warn!(interface = %name, error = %e, "receive failed");
                        std::thread::sleep(RECV_ERROR_BACKOFF);
                    }
                }
            }
            debug!(interface = %name, "reader stopped");
        })
}

/// Running receive pipeline returned by [`MessageProcessor::start`].
///
/// Dropping the handle without [`shutdown`](Self::shutdown) still stops the reader
/// threads; their consumers then exit once the queues drain.
pub struct ProcessorHandle {
    shutdown: Arc<AtomicBool>,
    readers: Vec<JoinHandle<()>>,
    consumers: Vec<TaskHandle<()>>,
}

impl ProcessorHandle {
    /// Number of interfaces with an attached receive consumer.
    pub fn receivers(&self) -> usize {
        self.readers.len()
    }

    /// Stop the readers, then wait for every queued frame to be processed.
    pub async fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Release);
        let readers = std::mem::take(&mut self.readers);
        let joined = tokio::task::spawn_blocking(move || {
            for r in readers {
                if r.join().is_err() {
                    warn!("reader thread panicked");
                }
            }
        })
        .await;
        if joined.is_err() {
            warn!("joining reader threads failed");
        }
        for c in std::mem::take(&mut self.consumers) {
            if let Err(e) = c.await {
                warn!(error = %e, "consumer task failed");
            }
        }
        info!("processor stopped");
    }
}

impl Drop for ProcessorHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

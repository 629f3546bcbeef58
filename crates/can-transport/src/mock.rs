use crate::{BusInfo, CanBus, CanFrame, Result, TransportError};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Default)]
struct MockState {
    inbox: VecDeque<CanFrame>,
    sent: Vec<CanFrame>,
    fail_sends: Option<String>,
    loopback: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<MockState>,
    ready: Condvar,
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, MockState>> {
        self.state
            .lock()
            .map_err(|_| TransportError::Poisoned("mock bus state"))
    }
}

/// A simple in-process mock bus. Each bus instance is independent.
///
/// Frames pushed through a [`MockHandle`] are returned by `recv` in order; frames
/// passed to `send` are recorded and, with loopback enabled, echoed back to `recv`.
pub struct MockBus {
    name: String,
    shared: Arc<Shared>,
}

/// Test/simulation side of a [`MockBus`]: injects traffic and inspects what was sent.
#[derive(Clone)]
pub struct MockHandle {
    name: String,
    shared: Arc<Shared>,
}

impl MockBus {
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            name: self.name.clone(),
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl MockHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a frame for the next `recv`.
    pub fn inject(&self, frame: CanFrame) {
        if let Ok(mut st) = self.shared.lock() {
            st.inbox.push_back(frame);
            self.shared.ready.notify_one();
        }
    }

    /// Frames accepted by `send` so far.
    pub fn sent(&self) -> Vec<CanFrame> {
        self.shared
            .lock()
            .map(|st| st.sent.clone())
            .unwrap_or_default()
    }

    /// Make every subsequent `send` fail with `NotConnected(reason)`; `None` restores.
    pub fn fail_sends(&self, reason: Option<&str>) {
        if let Ok(mut st) = self.shared.lock() {
            st.fail_sends = reason.map(str::to_string);
        }
    }

    /// Echo sent frames back into the receive queue.
    pub fn set_loopback(&self, on: bool) {
        if let Ok(mut st) = self.shared.lock() {
            st.loopback = on;
        }
    }
}

impl CanBus for MockBus {
    fn open(name: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            shared: Arc::new(Shared::default()),
        })
    }

    fn list() -> Result<Vec<BusInfo>> {
        Ok(vec![BusInfo {
            name: "mock0".to_string(),
            driver: "mock".to_string(),
        }])
    }

    fn recv(&mut self, timeout_ms: Option<u64>) -> Result<CanFrame> {
        let deadline = timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms));
        let mut st = self.shared.lock()?;
        loop {
            if let Some(frame) = st.inbox.pop_front() {
                return Ok(match frame.timestamp {
                    Some(_) => frame,
                    None => frame.stamped_now(),
                });
            }
            st = match deadline {
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return Err(TransportError::Timeout);
                    }
                    self.shared
                        .ready
                        .wait_timeout(st, d - now)
                        .map_err(|_| TransportError::Poisoned("mock bus state"))?
                        .0
                }
                None => self
                    .shared
                    .ready
                    .wait(st)
                    .map_err(|_| TransportError::Poisoned("mock bus state"))?,
            };
        }
    }

    fn send(&mut self, frame: &CanFrame) -> Result<()> {
        let mut st = self.shared.lock()?;
        if let Some(reason) = &st.fail_sends {
            return Err(TransportError::NotConnected(reason.clone()));
        }
        st.sent.push(frame.clone());
        if st.loopback {
            st.inbox.push_back(frame.clone());
            self.shared.ready.notify_one();
        }
        Ok(())
    }

    fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            name: self.name.clone(),
            shared: Arc::clone(&self.shared),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CanId;

    fn frame(id: u16, data: &[u8]) -> CanFrame {
        CanFrame::new(CanId::standard(id).unwrap(), data).unwrap()
    }

    #[test]
    fn test_recv_times_out_when_idle() {
        let mut bus = MockBus::open("mock0").unwrap();
        let err = bus.recv(Some(5)).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_injected_frames_arrive_in_order_with_timestamp() {
        let mut bus = MockBus::open("mock0").unwrap();
        let h = bus.handle();
        h.inject(frame(0x100, &[1]));
        h.inject(frame(0x101, &[2]));
        let a = bus.recv(Some(10)).unwrap();
        let b = bus.recv(Some(10)).unwrap();
        assert_eq!(a.id.raw(), 0x100);
        assert_eq!(b.id.raw(), 0x101);
        assert!(a.timestamp.is_some());
    }

    #[test]
    fn test_inject_wakes_blocked_reader() {
        let mut bus = MockBus::open("mock0").unwrap();
        let h = bus.handle();
        let t = std::thread::spawn(move || bus.recv(Some(2_000)));
        std::thread::sleep(Duration::from_millis(20));
        h.inject(frame(0x7, &[]));
        let got = t.join().unwrap().unwrap();
        assert_eq!(got.id.raw(), 0x7);
    }

    #[test]
    fn test_send_failure_injection() {
        let mut bus = MockBus::open("mock0").unwrap();
        let h = bus.handle();
        h.fail_sends(Some("unplugged"));
        assert!(matches!(
            bus.send(&frame(0x1, &[0])),
            Err(TransportError::NotConnected(_))
        ));
        assert!(h.sent().is_empty());

        h.fail_sends(None);
        h.set_loopback(true);
        bus.send(&frame(0x1, &[0xAA])).unwrap();
        assert_eq!(h.sent().len(), 1);
        assert_eq!(bus.recv(Some(10)).unwrap().payload(), &[0xAA]);
    }

    #[test]
    fn test_clone_shares_channel() {
        let mut rx = MockBus::open("mock0").unwrap();
        let mut tx = rx.try_clone().unwrap();
        rx.handle().set_loopback(true);
        tx.send(&frame(0x42, &[1, 2])).unwrap();
        assert_eq!(rx.recv(Some(10)).unwrap().id.raw(), 0x42);
    }
}

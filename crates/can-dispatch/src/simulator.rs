use can_transport::{CanFrame, MockHandle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use signal_db::{encode, MessageDef, PhysicalValues, SignalDatabase, SignalDef};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const DEFAULT_PERIOD: Duration = Duration::from_millis(100);
const TICK: Duration = Duration::from_millis(10);
const DEFAULT_RANGE: (f64, f64) = (0.0, 100.0);

/// Bounded random walk with normally distributed steps, σ = 1% of the range.
#[derive(Debug, Clone)]
pub struct TrendGenerator {
    current: f64,
    min: f64,
    max: f64,
    /// `None` for a degenerate range, which never moves.
    step: Option<Normal<f64>>,
}

impl TrendGenerator {
    pub fn new(min: f64, max: f64, rng: &mut impl Rng) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            current: if min < max { rng.gen_range(min..=max) } else { min },
            min,
            max,
            step: Some((max - min) * 0.01)
                .filter(|sigma| *sigma > 0.0)
                .and_then(|sigma| Normal::new(0.0, sigma).ok()),
        }
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn next_value(&mut self, rng: &mut impl Rng) -> f64 {
        if let Some(step) = &self.step {
            self.current += step.sample(rng);
        }
        self.current = self.current.clamp(self.min, self.max);
        self.current
    }
}

struct Scheduled {
    message: MessageDef,
    period: Duration,
    next_due: Option<Instant>,
    generators: Vec<(String, TrendGenerator)>,
}

/// Generates periodic traffic for every database message and injects it into a
/// mock interface, as if a live bus were attached.
pub struct Simulator {
    target: MockHandle,
    schedule: Vec<Scheduled>,
    rng: StdRng,
}

impl Simulator {
    pub fn new(db: &SignalDatabase, target: MockHandle) -> Self {
        Self::with_rng(db, target, StdRng::from_entropy())
    }

    pub fn with_seed(db: &SignalDatabase, target: MockHandle, seed: u64) -> Self {
        Self::with_rng(db, target, StdRng::seed_from_u64(seed))
    }

    fn with_rng(db: &SignalDatabase, target: MockHandle, mut rng: StdRng) -> Self {
        let schedule = db
            .messages()
            .iter()
            .filter(|m| m.can_id().is_some())
            .map(|m| Scheduled {
                message: m.clone(),
                period: m.period_ms.map_or(DEFAULT_PERIOD, Duration::from_millis),
                next_due: None,
                generators: m
                    .signals
                    .iter()
                    .map(|s| {
                        let (lo, hi) = simulated_range(s);
                        (s.name.clone(), TrendGenerator::new(lo, hi, &mut rng))
                    })
                    .collect(),
            })
            .collect();
        Self {
            target,
            schedule,
            rng,
        }
    }

    pub fn target(&self) -> &str {
        self.target.name()
    }

    /// Emit every message whose period has elapsed at `now`; returns frames injected.
    pub fn tick(&mut self, now: Instant) -> usize {
        let mut injected = 0;
        for entry in &mut self.schedule {
            if entry.next_due.is_some_and(|due| now < due) {
                continue;
            }
            entry.next_due = Some(now + entry.period);

            let values: PhysicalValues = entry
                .generators
                .iter_mut()
                .map(|(name, g)| (name.clone(), g.next_value(&mut self.rng)))
                .collect();
            let frame = encode(&entry.message, &values)
                .map_err(|e| e.to_string())
                .and_then(|payload| {
                    entry
                        .message
                        .can_id()
                        .and_then(|id| CanFrame::new(id, &payload))
                        .ok_or_else(|| "message has no valid CAN id".to_string())
                });
            match frame {
                Ok(frame) => {
                    self.target.inject(frame);
                    injected += 1;
                }
                Err(e) => warn!(message = %entry.message.name, error = %e, "simulated frame skipped"),
            }
        }
        injected
    }

    /// Run on a background thread until `shutdown` is set.
    pub fn spawn(mut self, shutdown: Arc<AtomicBool>) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name(format!("can-sim-{}", self.target.name()))
            .spawn(move || {
                info!(interface = %self.target.name(), messages = self.schedule.len(), "simulator started");
                let mut total = 0usize;
                while !shutdown.load(Ordering::Acquire) {
                    total += self.tick(Instant::now());
                    std::thread::sleep(TICK);
                }
                debug!(frames = total, "simulator stopped");
            })
    }
}

/// The signal's advisory range (default 0..100) intersected with what its bits can
/// represent, so every generated value encodes.
fn simulated_range(sig: &SignalDef) -> (f64, f64) {
    let (raw_lo, raw_hi) = sig.raw_bounds();
    let a = raw_lo as f64 * sig.scale + sig.offset;
    let b = raw_hi as f64 * sig.scale + sig.offset;
    let (rep_lo, rep_hi) = if a <= b { (a, b) } else { (b, a) };

    let lo = sig.min.unwrap_or(DEFAULT_RANGE.0).max(rep_lo);
    let hi = sig.max.unwrap_or(DEFAULT_RANGE.1).min(rep_hi);
    if lo <= hi {
        (lo, hi)
    } else {
        (rep_lo, rep_lo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use can_transport::{CanBus, MockBus};
    use signal_db::{decode, SignalDef};

    fn db() -> SignalDatabase {
        let fast = MessageDef {
            period_ms: Some(10),
            ..MessageDef::new(0x0CF0_0400, "EEC1", 8)
                .with_signal(SignalDef::new("EngineSpeed", 24, 16).scaled(0.125, 0.0).with_range(0.0, 8000.0))
                .with_signal(SignalDef::new("Tiny", 0, 2))
        };
        let slow = MessageDef::new(0x100, "Status", 1).with_signal(SignalDef::new("Temp", 0, 8).signed());
        SignalDatabase::new(vec![fast, slow]).unwrap()
    }

    #[test]
    fn test_generator_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut g = TrendGenerator::new(10.0, 20.0, &mut rng);
        for _ in 0..10_000 {
            let v = g.next_value(&mut rng);
            assert!((10.0..=20.0).contains(&v));
        }
    }

    #[test]
    fn test_generator_steps_are_gaussian() {
        // Restart from the midpoint each step so clamping stays out of the statistics.
        let mut rng = StdRng::seed_from_u64(1);
        let mut g = TrendGenerator::new(0.0, 100_000.0, &mut rng);
        let mut deltas = Vec::new();
        for _ in 0..5000 {
            g.current = 50_000.0;
            deltas.push(g.next_value(&mut rng) - 50_000.0);
        }
        let n = deltas.len() as f64;
        let mean = deltas.iter().sum::<f64>() / n;
        let sd = (deltas.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n).sqrt();
        assert!(mean.abs() < 0.1 * 1000.0, "mean {mean}");
        assert!((sd - 1000.0).abs() < 100.0, "sd {sd}");
        // A uniform ±σ step never exceeds σ; a normal one does about a third of the time.
        let beyond = deltas.iter().filter(|d| d.abs() > 1000.0).count();
        assert!(beyond > 1000, "{beyond} steps beyond one σ");
        assert!(deltas.iter().all(|d| d.abs() < 6.0 * 1000.0));
    }

    #[test]
    fn test_degenerate_range_is_constant() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut g = TrendGenerator::new(5.0, 5.0, &mut rng);
        for _ in 0..10 {
            assert_eq!(g.next_value(&mut rng), 5.0);
        }
    }

    #[test]
    fn test_range_respects_bit_width() {
        assert_eq!(simulated_range(&SignalDef::new("Tiny", 0, 2)), (0.0, 3.0));
        assert_eq!(simulated_range(&SignalDef::new("s", 0, 8).signed()), (0.0, 100.0));
        let speed = SignalDef::new("s", 0, 16).scaled(0.125, 0.0).with_range(0.0, 9000.0);
        assert_eq!(simulated_range(&speed), (0.0, 8191.875));
    }

    #[test]
    fn test_tick_honours_periods() {
        let db = db();
        let bus = MockBus::open("sim").unwrap();
        let mut sim = Simulator::with_seed(&db, bus.handle(), 42);
        let t0 = Instant::now();
        assert_eq!(sim.tick(t0), 2);
        assert_eq!(sim.tick(t0 + Duration::from_millis(5)), 0);
        assert_eq!(sim.tick(t0 + Duration::from_millis(10)), 1);
        assert_eq!(sim.tick(t0 + Duration::from_millis(100)), 2);
    }

    #[test]
    fn test_injected_frames_decode() {
        let db = db();
        let mut bus = MockBus::open("sim").unwrap();
        let mut sim = Simulator::with_seed(&db, bus.handle(), 3);
        sim.tick(Instant::now());
        for _ in 0..2 {
            let frame = bus.recv(Some(10)).unwrap();
            let msg = db.message_by_id(frame.id.raw()).unwrap();
            let values = decode(msg, frame.payload()).unwrap();
            if msg.name == "EEC1" {
                assert!((0.0..=8000.0).contains(&values["EngineSpeed"]));
                assert!(frame.id.is_extended());
            }
        }
    }
}

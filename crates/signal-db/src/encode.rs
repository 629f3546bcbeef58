use crate::{
    BitLayout, EncodeError, MessageDef, PhysicalValues, SignalDef, SignalValue, SignalValues,
};

/// Encode physical values into a zeroed `msg.byte_length` payload.
///
/// Signals not named in `values` stay zero. Any unknown name fails the whole call;
/// no partially written buffer is returned.
pub fn encode(msg: &MessageDef, values: &PhysicalValues) -> Result<Vec<u8>, EncodeError> {
    encode_items(
        msg,
        values
            .iter()
            .map(|(name, v)| (name.as_str(), SignalValue::Physical(*v))),
    )
}

/// Like [`encode`], but accepts choice labels for enumerated signals.
pub fn encode_values(msg: &MessageDef, values: &SignalValues) -> Result<Vec<u8>, EncodeError> {
    encode_items(msg, values.iter().map(|(name, v)| (name.as_str(), v.clone())))
}

fn encode_items<'a>(
    msg: &MessageDef,
    items: impl IntoIterator<Item = (&'a str, SignalValue)>,
) -> Result<Vec<u8>, EncodeError> {
    let mut buf = vec![0u8; usize::from(msg.byte_length)];
    for (name, value) in items {
        let sig = msg.signal(name).ok_or_else(|| EncodeError::UnknownSignal {
            message: msg.name.clone(),
            signal: name.to_string(),
        })?;
        let raw = match value {
            SignalValue::Physical(v) => physical_to_raw(sig, v)?,
            SignalValue::Label(label) => choice_to_raw(sig, &label)?,
        };
        if !BitLayout::for_signal(sig).pack(&mut buf, raw) {
            return Err(EncodeError::SignalOutOfBounds {
                message: msg.name.clone(),
                signal: sig.name.clone(),
            });
        }
    }
    Ok(buf)
}

/// `round((physical - offset) / scale)` as the signal's two's complement bit pattern.
///
/// No clamping to `min`/`max`; a value whose raw integer cannot be represented in
/// `bit_length` bits is an error rather than being silently wrapped.
pub fn physical_to_raw(sig: &SignalDef, physical: f64) -> Result<u64, EncodeError> {
    let scaled = ((physical - sig.offset) / sig.scale).round();
    let out_of_range = || EncodeError::ValueOutOfRange {
        signal: sig.name.clone(),
        value: physical,
        raw: scaled,
        bits: sig.bit_length,
    };
    if !scaled.is_finite() {
        return Err(out_of_range());
    }
    // Compare as integers: u64::MAX / i64::MAX round up to 2^64 / 2^63 in f64.
    let raw = scaled as i128;
    let (lo, hi) = sig.raw_bounds();
    if raw < lo || raw > hi {
        return Err(out_of_range());
    }
    Ok(to_bits(sig, raw))
}

fn choice_to_raw(sig: &SignalDef, label: &str) -> Result<u64, EncodeError> {
    let raw = sig
        .choices
        .iter()
        .find(|(_, l)| l.as_str() == label)
        .map(|(raw, _)| *raw)
        .ok_or_else(|| EncodeError::UnknownChoice {
            signal: sig.name.clone(),
            label: label.to_string(),
        })?;
    let (lo, hi) = sig.raw_bounds();
    let raw = i128::from(raw);
    if raw < lo || raw > hi {
        return Err(EncodeError::ValueOutOfRange {
            signal: sig.name.clone(),
            value: raw as f64,
            raw: raw as f64,
            bits: sig.bit_length,
        });
    }
    Ok(to_bits(sig, raw))
}

fn to_bits(sig: &SignalDef, raw: i128) -> u64 {
    let n = u32::from(sig.bit_length.clamp(1, 64));
    let mask = if n == 64 { u64::MAX } else { (1u64 << n) - 1 };
    (raw as u64) & mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode;

    fn eec1() -> MessageDef {
        MessageDef::new(0x0CF0_0400, "EEC1", 8)
            .with_signal(SignalDef::new("EngineSpeed", 24, 16).scaled(0.125, 0.0))
            .with_signal(SignalDef::new("Torque", 16, 8).scaled(1.0, -125.0))
    }

    fn values(pairs: &[(&str, f64)]) -> PhysicalValues {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_engine_speed_encodes_to_known_bytes() {
        let data = encode(&eec1(), &values(&[("EngineSpeed", 1000.0)])).unwrap();
        assert_eq!(data, vec![0, 0, 0, 0x40, 0x1F, 0, 0, 0]);
    }

    #[test]
    fn test_unknown_signal_fails_without_buffer() {
        let err = encode(
            &eec1(),
            &values(&[("EngineSpeed", 1000.0), ("NoSuchSignal", 1.0)]),
        )
        .unwrap_err();
        assert_eq!(
            err,
            EncodeError::UnknownSignal {
                message: "EEC1".into(),
                signal: "NoSuchSignal".into()
            }
        );
    }

    #[test]
    fn test_round_trip_within_half_scale() {
        let msg = MessageDef::new(0x1F0, "Mixed", 8)
            .with_signal(
                SignalDef::new("Temperature", 0, 12)
                    .big_endian()
                    .signed()
                    .scaled(0.01, 250.0),
            )
            .with_signal(SignalDef::new("Radius", 20, 6).big_endian().scaled(0.1, 0.0))
            .with_signal(SignalDef::new("Current", 32, 16).signed().scaled(0.05, 0.0))
            .with_signal(SignalDef::new("Flag", 63, 1));
        let cases = [
            values(&[("Temperature", 244.14), ("Radius", 1.8), ("Current", -12.34), ("Flag", 1.0)]),
            values(&[("Temperature", 270.47), ("Radius", 6.3), ("Current", 1638.35), ("Flag", 0.0)]),
            values(&[("Temperature", 229.52), ("Radius", 0.0), ("Current", -1638.4), ("Flag", 1.0)]),
        ];
        for input in cases {
            let data = encode(&msg, &input).unwrap();
            let output = decode(&msg, &data).unwrap();
            for (name, expected) in &input {
                let sig = msg.signal(name).unwrap();
                let got = output[name];
                assert!(
                    (got - expected).abs() <= sig.scale / 2.0 + 1e-9,
                    "{name}: expected {expected}, got {got}"
                );
            }
        }
    }

    #[test]
    fn test_random_layouts_round_trip() {
        use crate::{BitLayout, ByteOrder};
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        const SCALES: [f64; 5] = [1.0, 0.5, 0.125, 0.01, 2.0];
        // Keeps raw * scale + offset well inside f64's exact range.
        const RAW_LIMIT: i64 = 1 << 40;

        let mut rng = StdRng::seed_from_u64(0x0CF0_0400);
        for _ in 0..2000 {
            let order = if rng.gen() {
                ByteOrder::LittleEndian
            } else {
                ByteOrder::BigEndian
            };
            let bit_length: u8 = rng.gen_range(1..=64);
            let start_bit = loop {
                let start: u16 = rng.gen_range(0..64);
                if BitLayout::new(start, bit_length, order).end_byte() <= 8 {
                    break start;
                }
            };
            let mut sig = SignalDef::new("x", start_bit, bit_length).scaled(
                SCALES[rng.gen_range(0..SCALES.len())],
                f64::from(rng.gen_range(-1000i32..=1000)) * 0.5,
            );
            sig.byte_order = order;
            sig.signed = rng.gen();

            let (lo, hi) = sig.raw_bounds();
            let lo = lo.max(i128::from(-RAW_LIMIT)) as i64;
            let hi = hi.min(i128::from(RAW_LIMIT)) as i64;
            let raw = rng.gen_range(lo..=hi);
            let physical = raw as f64 * sig.scale + sig.offset;

            assert_eq!(
                physical_to_raw(&sig, physical).unwrap(),
                to_bits(&sig, i128::from(raw)),
                "{sig:?} raw {raw}"
            );
            let msg = MessageDef::new(0x40, "Sweep", 8).with_signal(sig.clone());
            let data = encode(&msg, &values(&[("x", physical)])).unwrap();
            let got = decode(&msg, &data).unwrap()["x"];
            assert!(
                (got - physical).abs() <= sig.scale / 2.0,
                "{sig:?}: expected {physical}, got {got}"
            );
        }
    }

    #[test]
    fn test_min_max_not_clamped() {
        let mut msg = eec1();
        msg.signals[0].min = Some(0.0);
        msg.signals[0].max = Some(100.0);
        let data = encode(&msg, &values(&[("EngineSpeed", 1000.0)])).unwrap();
        assert_eq!(decode(&msg, &data).unwrap()["EngineSpeed"], 1000.0);
    }

    #[test]
    fn test_value_beyond_bit_width_is_rejected() {
        let msg = eec1();
        assert!(matches!(
            encode(&msg, &values(&[("EngineSpeed", 9000.0)])),
            Err(EncodeError::ValueOutOfRange { bits: 16, .. })
        ));
        assert!(matches!(
            encode(&msg, &values(&[("EngineSpeed", -1.0)])),
            Err(EncodeError::ValueOutOfRange { .. })
        ));
        assert!(matches!(
            encode(&msg, &values(&[("EngineSpeed", f64::NAN)])),
            Err(EncodeError::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn test_64_bit_limits_are_exact() {
        let unsigned = SignalDef::new("w", 0, 64);
        assert!(matches!(
            physical_to_raw(&unsigned, u64::MAX as f64),
            Err(EncodeError::ValueOutOfRange { bits: 64, .. })
        ));
        assert_eq!(physical_to_raw(&unsigned, 2f64.powi(63)).unwrap(), 1u64 << 63);

        let signed = SignalDef::new("s", 0, 64).signed();
        assert!(matches!(
            physical_to_raw(&signed, i64::MAX as f64),
            Err(EncodeError::ValueOutOfRange { bits: 64, .. })
        ));
        assert_eq!(
            physical_to_raw(&signed, i64::MIN as f64).unwrap(),
            i64::MIN as u64
        );

        let msg = MessageDef::new(0x30, "Wide", 8).with_signal(unsigned);
        assert!(encode(&msg, &values(&[("w", 1.9e19)])).is_err());
    }

    #[test]
    fn test_negative_signed_raw_is_twos_complement() {
        let sig = SignalDef::new("t", 0, 12).signed().scaled(0.01, 250.0);
        assert_eq!(physical_to_raw(&sig, 244.14).unwrap(), 0xDB6);
    }

    #[test]
    fn test_unspecified_signals_stay_zero() {
        let data = encode(&eec1(), &values(&[("Torque", -125.0)])).unwrap();
        assert_eq!(data, vec![0u8; 8]);
    }

    #[test]
    fn test_labels_encode_through_choices() {
        let msg = MessageDef::new(0x20, "Gear", 1).with_signal(
            SignalDef::new("Mode", 2, 2)
                .with_choice(0, "Off")
                .with_choice(2, "Sport"),
        );
        let mut vals = SignalValues::new();
        vals.insert("Mode".into(), SignalValue::from("Sport"));
        assert_eq!(encode_values(&msg, &vals).unwrap(), vec![0b0000_1000]);

        vals.insert("Mode".into(), SignalValue::from("Eco"));
        assert!(matches!(
            encode_values(&msg, &vals),
            Err(EncodeError::UnknownChoice { .. })
        ));
    }
}

use crate::{BitLayout, DecodeError, MessageDef, PhysicalValues, SignalDef, SignalValue, SignalValues};
use std::collections::BTreeMap;

/// Decode every signal of `msg` from `data`.
///
/// `data` must hold at least `msg.byte_length` bytes; trailing bytes are ignored.
/// `min`/`max` are not enforced, so out-of-calibration readings are returned as-is.
pub fn decode(msg: &MessageDef, data: &[u8]) -> Result<PhysicalValues, DecodeError> {
    decode_with(msg, data, physical)
}

/// Like [`decode`], but with `labels` set a signal whose raw integer appears in its
/// choice table comes back as that label.
///
/// The lookup uses the extracted integer itself, so wide signals resolve exactly.
pub fn decode_values(
    msg: &MessageDef,
    data: &[u8],
    labels: bool,
) -> Result<SignalValues, DecodeError> {
    decode_with(msg, data, |sig, raw| {
        let label = labels
            .then_some(raw)
            .and_then(|r| i64::try_from(r).ok())
            .and_then(|r| sig.choices.get(&r));
        match label {
            Some(l) => SignalValue::Label(l.clone()),
            None => SignalValue::Physical(physical(sig, raw)),
        }
    })
}

/// Decode a single signal from a payload that is already known to be long enough.
pub fn decode_signal(sig: &SignalDef, data: &[u8]) -> Option<f64> {
    raw_integer(sig, data).map(|raw| physical(sig, raw))
}

fn decode_with<T>(
    msg: &MessageDef,
    data: &[u8],
    convert: impl Fn(&SignalDef, i128) -> T,
) -> Result<BTreeMap<String, T>, DecodeError> {
    let expected = usize::from(msg.byte_length);
    if data.len() < expected {
        return Err(DecodeError::InsufficientData {
            message: msg.name.clone(),
            expected,
            actual: data.len(),
        });
    }
    let payload = &data[..expected];
    let mut out = BTreeMap::new();
    for sig in &msg.signals {
        let raw = raw_integer(sig, payload).ok_or_else(|| DecodeError::SignalOutOfBounds {
            message: msg.name.clone(),
            signal: sig.name.clone(),
        })?;
        out.insert(sig.name.clone(), convert(sig, raw));
    }
    Ok(out)
}

fn physical(sig: &SignalDef, raw: i128) -> f64 {
    raw as f64 * sig.scale + sig.offset
}

/// Extracted bits interpreted per the signal's signedness.
fn raw_integer(sig: &SignalDef, data: &[u8]) -> Option<i128> {
    let bits = BitLayout::for_signal(sig).extract(data)?;
    if sig.signed {
        let shift = 64 - u32::from(sig.bit_length.clamp(1, 64));
        Some(i128::from(((bits as i64) << shift) >> shift))
    } else {
        Some(i128::from(bits))
    }
}

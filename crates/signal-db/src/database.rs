use crate::{BitLayout, DatabaseError, MessageDef};
use std::collections::{HashMap, HashSet};

/// Masks tried in order when an id misses, to tolerate adapters that leave flag bits
/// in the upper nibble or report J1939 ids without priority bits.
pub const FALLBACK_ID_MASKS: [u32; 3] = [0x1FFF_FFFF, 0x0FFF_FFFF, 0x00FF_FFFF];

/// Immutable, validated set of message definitions.
#[derive(Debug, Clone, Default)]
pub struct SignalDatabase {
    messages: Vec<MessageDef>,
    by_id: HashMap<u32, usize>,
    by_name: HashMap<String, usize>,
}

impl SignalDatabase {
    pub fn new(messages: Vec<MessageDef>) -> Result<Self, DatabaseError> {
        let mut by_id = HashMap::with_capacity(messages.len());
        let mut by_name = HashMap::with_capacity(messages.len());
        for (idx, msg) in messages.iter().enumerate() {
            validate_message(msg)?;
            if by_id.insert(msg.frame_id, idx).is_some() {
                return Err(DatabaseError::DuplicateFrameId(msg.frame_id));
            }
            if by_name.insert(msg.name.clone(), idx).is_some() {
                return Err(DatabaseError::DuplicateMessageName(msg.name.clone()));
            }
        }
        Ok(Self {
            messages,
            by_id,
            by_name,
        })
    }

    /// Exact lookup.
    pub fn message_by_id(&self, frame_id: u32) -> Option<&MessageDef> {
        self.by_id.get(&frame_id).map(|&i| &self.messages[i])
    }

    /// Exact lookup, then [`FALLBACK_ID_MASKS`] in order when `fallback` is set.
    pub fn lookup(&self, frame_id: u32, fallback: bool) -> Option<&MessageDef> {
        if let Some(m) = self.message_by_id(frame_id) {
            return Some(m);
        }
        if !fallback {
            return None;
        }
        FALLBACK_ID_MASKS
            .iter()
            .map(|mask| frame_id & mask)
            .filter(|&alt| alt != frame_id)
            .find_map(|alt| self.message_by_id(alt))
    }

    pub fn message_by_name(&self, name: &str) -> Option<&MessageDef> {
        self.by_name.get(name).map(|&i| &self.messages[i])
    }

    pub fn messages(&self) -> &[MessageDef] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

fn validate_message(msg: &MessageDef) -> Result<(), DatabaseError> {
    if msg.byte_length > 8 {
        return Err(DatabaseError::InvalidMessage {
            message: msg.name.clone(),
            reason: format!("byte_length {} exceeds 8", msg.byte_length),
        });
    }
    if msg.can_id().is_none() {
        return Err(DatabaseError::InvalidMessage {
            message: msg.name.clone(),
            reason: format!("frame id 0x{:X} does not fit its id format", msg.frame_id),
        });
    }
    let mut seen = HashSet::new();
    for sig in &msg.signals {
        let invalid = |reason: String| DatabaseError::InvalidSignal {
            message: msg.name.clone(),
            signal: sig.name.clone(),
            reason,
        };
        if !seen.insert(sig.name.as_str()) {
            return Err(invalid("duplicate signal name".into()));
        }
        if !(1..=64).contains(&sig.bit_length) {
            return Err(invalid(format!("bit_length {} not in 1..=64", sig.bit_length)));
        }
        if sig.scale == 0.0 || !sig.scale.is_finite() || !sig.offset.is_finite() {
            return Err(invalid("scale must be finite and nonzero".into()));
        }
        let end = BitLayout::for_signal(sig).end_byte();
        if end > usize::from(msg.byte_length) {
            return Err(invalid(format!(
                "bits reach byte {end}, message has {}",
                msg.byte_length
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SignalDef;

    fn eec1() -> MessageDef {
        MessageDef::new(0x0CF0_0400, "EEC1", 8)
            .with_signal(SignalDef::new("EngineSpeed", 24, 16).scaled(0.125, 0.0))
    }

    #[test]
    fn test_lookup_by_id_and_name() {
        let db = SignalDatabase::new(vec![eec1()]).unwrap();
        assert_eq!(db.len(), 1);
        assert_eq!(db.message_by_id(0x0CF0_0400).unwrap().name, "EEC1");
        assert_eq!(db.message_by_name("EEC1").unwrap().frame_id, 0x0CF0_0400);
        assert!(db.message_by_id(0x999).is_none());
    }

    #[test]
    fn test_fallback_masks() {
        let db = SignalDatabase::new(vec![MessageDef::new(0x00F0_0400, "Masked", 8)]).unwrap();
        assert!(db.lookup(0x18F0_0400, false).is_none());
        assert_eq!(db.lookup(0x18F0_0400, true).unwrap().name, "Masked");
        assert!(db.lookup(0x999, true).is_none());
    }

    #[test]
    fn test_duplicates_rejected() {
        let err = SignalDatabase::new(vec![eec1(), eec1()]).unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateFrameId(0x0CF0_0400)));

        let mut other = eec1();
        other.frame_id = 0x100;
        let err = SignalDatabase::new(vec![eec1(), other]).unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateMessageName(_)));
    }

    #[test]
    fn test_signal_outside_payload_rejected() {
        let msg = MessageDef::new(0x10, "Short", 4).with_signal(SignalDef::new("x", 24, 16));
        assert!(matches!(
            SignalDatabase::new(vec![msg]),
            Err(DatabaseError::InvalidSignal { .. })
        ));
    }

    #[test]
    fn test_zero_scale_and_width_rejected() {
        let msg = MessageDef::new(0x10, "A", 8).with_signal(SignalDef::new("x", 0, 8).scaled(0.0, 0.0));
        assert!(SignalDatabase::new(vec![msg]).is_err());
        let msg = MessageDef::new(0x10, "B", 8).with_signal(SignalDef::new("x", 0, 0));
        assert!(SignalDatabase::new(vec![msg]).is_err());
    }

    #[test]
    fn test_overlapping_signals_allowed() {
        let msg = MessageDef::new(0x10, "Overlap", 2)
            .with_signal(SignalDef::new("whole", 0, 16))
            .with_signal(SignalDef::new("low", 0, 8));
        assert!(SignalDatabase::new(vec![msg]).is_ok());
    }
}

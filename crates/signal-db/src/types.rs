use can_transport::CanId;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Physical values keyed by signal name, as produced by [`crate::decode`].
pub type PhysicalValues = BTreeMap<String, f64>;

/// Values keyed by signal name, where enumerated signals may carry a label.
pub type SignalValues = BTreeMap<String, SignalValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    /// Intel: `start_bit` is the least significant bit.
    #[serde(alias = "little", alias = "intel")]
    LittleEndian,
    /// Motorola: `start_bit` is the most significant bit, DBC sawtooth numbering.
    #[serde(alias = "big", alias = "motorola")]
    BigEndian,
}

impl Default for ByteOrder {
    fn default() -> Self {
        ByteOrder::LittleEndian
    }
}

/// One scaled field inside a message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct SignalDef {
    pub name: String,
    pub start_bit: u16,
    pub bit_length: u8,
    #[serde(default)]
    pub byte_order: ByteOrder,
    #[serde(default)]
    pub signed: bool,
    #[serde(default = "unit_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Advisory only; never enforced by the codec.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Advisory only; never enforced by the codec.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Raw value → label table for enumerated signals.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub choices: BTreeMap<i64, String>,
}

fn unit_scale() -> f64 {
    1.0
}

impl SignalDef {
    /// Minimal definition: unsigned little-endian, scale 1, offset 0.
    pub fn new(name: impl Into<String>, start_bit: u16, bit_length: u8) -> Self {
        Self {
            name: name.into(),
            start_bit,
            bit_length,
            byte_order: ByteOrder::LittleEndian,
            signed: false,
            scale: 1.0,
            offset: 0.0,
            unit: None,
            min: None,
            max: None,
            choices: BTreeMap::new(),
        }
    }

    pub fn big_endian(mut self) -> Self {
        self.byte_order = ByteOrder::BigEndian;
        self
    }

    pub fn signed(mut self) -> Self {
        self.signed = true;
        self
    }

    pub fn scaled(mut self, scale: f64, offset: f64) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn with_choice(mut self, raw: i64, label: impl Into<String>) -> Self {
        self.choices.insert(raw, label.into());
        self
    }

    /// Inclusive range of raw integers representable in this signal's bit width.
    pub fn raw_bounds(&self) -> (i128, i128) {
        let n = u32::from(self.bit_length.clamp(1, 64));
        if self.signed {
            (-(1i128 << (n - 1)), (1i128 << (n - 1)) - 1)
        } else {
            (0, (1i128 << n) - 1)
        }
    }
}

/// Schema for one kind of frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct MessageDef {
    #[serde(deserialize_with = "deserialize_frame_id")]
    #[cfg_attr(feature = "schema", schemars(with = "u32"))]
    pub frame_id: u32,
    pub name: String,
    pub byte_length: u8,
    /// Force 29-bit (`true`) or 11-bit (`false`) framing; defaults by id magnitude.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended: Option<bool>,
    /// Nominal cycle time, used when simulating traffic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_ms: Option<u64>,
    #[serde(default)]
    pub signals: Vec<SignalDef>,
}

impl MessageDef {
    pub fn new(frame_id: u32, name: impl Into<String>, byte_length: u8) -> Self {
        Self {
            frame_id,
            name: name.into(),
            byte_length,
            extended: None,
            period_ms: None,
            signals: Vec::new(),
        }
    }

    pub fn with_signal(mut self, signal: SignalDef) -> Self {
        self.signals.push(signal);
        self
    }

    pub fn signal(&self, name: &str) -> Option<&SignalDef> {
        self.signals.iter().find(|s| s.name == name)
    }

    pub fn is_extended(&self) -> bool {
        self.extended.unwrap_or(self.frame_id > 0x7FF)
    }

    /// Identifier used on the wire, or `None` when `frame_id` does not fit the format.
    pub fn can_id(&self) -> Option<CanId> {
        if self.is_extended() {
            CanId::extended(self.frame_id)
        } else {
            u16::try_from(self.frame_id).ok().and_then(CanId::standard)
        }
    }
}

/// A decoded or to-be-encoded signal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(untagged)]
pub enum SignalValue {
    Physical(f64),
    Label(String),
}

impl SignalValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SignalValue::Physical(v) => Some(*v),
            SignalValue::Label(_) => None,
        }
    }
}

impl From<f64> for SignalValue {
    fn from(v: f64) -> Self {
        SignalValue::Physical(v)
    }
}

impl From<&str> for SignalValue {
    fn from(s: &str) -> Self {
        SignalValue::Label(s.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FrameIdRepr {
    Num(u32),
    Text(String),
}

fn deserialize_frame_id<'de, D>(de: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match FrameIdRepr::deserialize(de)? {
        FrameIdRepr::Num(n) => Ok(n),
        FrameIdRepr::Text(s) => parse_frame_id(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid frame id: {s}"))),
    }
}

/// Parse `0x`-prefixed hex or decimal frame ids.
pub fn parse_frame_id(s: &str) -> Option<u32> {
    let t = s.trim();
    match t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16).ok(),
        None => t.parse::<u32>().ok(),
    }
}

use core::fmt;
use time::OffsetDateTime;

/// 11-bit or 29-bit CAN identifier
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct CanId {
    raw: u32,
    extended: bool,
}

impl CanId {
    pub fn standard(id11: u16) -> Option<Self> {
        if id11 <= 0x7FF {
            Some(Self {
                raw: id11 as u32,
                extended: false,
            })
        } else {
            None
        }
    }

    pub fn extended(id29: u32) -> Option<Self> {
        if id29 <= 0x1FFF_FFFF {
            Some(Self {
                raw: id29,
                extended: true,
            })
        } else {
            None
        }
    }

    /// Pick the narrowest identifier format that can carry `raw`.
    pub fn from_raw(raw: u32) -> Option<Self> {
        if raw <= 0x7FF {
            Self::standard(raw as u16)
        } else {
            Self::extended(raw)
        }
    }

    pub fn raw(&self) -> u32 {
        self.raw
    }
    pub fn is_extended(&self) -> bool {
        self.extended
    }
}

impl fmt::Display for CanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extended {
            write!(f, "0x{raw:08X}", raw = self.raw)
        } else {
            write!(f, "0x{raw:03X}", raw = self.raw)
        }
    }
}

/// A classic CAN data frame (no CAN FD)
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CanFrame {
    pub id: CanId,
    pub len: u8,
    pub data: [u8; 8],
    pub rtr: bool,
    pub timestamp: Option<Timestamp>,
}

impl CanFrame {
    pub fn new(id: CanId, data: &[u8]) -> Option<Self> {
        if data.len() > 8 {
            return None;
        }
        let mut buf = [0u8; 8];
        buf[..data.len()].copy_from_slice(data);
        Some(Self {
            id,
            len: data.len() as u8,
            data: buf,
            rtr: false,
            timestamp: None,
        })
    }

    /// The `len` valid bytes of the frame. Empty for remote frames, whose `len` is
    /// the requested DLC and carries no data.
    pub fn payload(&self) -> &[u8] {
        if self.rtr {
            return &[];
        }
        let len = usize::from(self.len).min(self.data.len());
        &self.data[..len]
    }

    /// Payload as space-separated upper-case hex, e.g. `"00 40 1F"`.
    pub fn data_hex(&self) -> String {
        hex_bytes(self.payload())
    }

    pub fn stamped_now(mut self) -> Self {
        self.timestamp = Some(Timestamp::now());
        self
    }
}

pub fn hex_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{b:02X}"));
    }
    out
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timestamp(pub OffsetDateTime);

impl Timestamp {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    pub fn rfc3339(&self) -> String {
        self.0
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug)]
pub struct BusInfo {
    pub name: String,
    pub driver: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_picks_format_by_magnitude() {
        let std_id = CanId::from_raw(0x123).unwrap();
        assert!(!std_id.is_extended());
        assert_eq!(std_id.to_string(), "0x123");

        let ext_id = CanId::from_raw(0x0CF0_0400).unwrap();
        assert!(ext_id.is_extended());
        assert_eq!(ext_id.to_string(), "0x0CF00400");

        assert!(CanId::from_raw(0x800).unwrap().is_extended());
        assert!(CanId::from_raw(0x2000_0000).is_none());
        assert!(CanId::standard(0x800).is_none());
    }

    #[test]
    fn test_frame_rejects_long_payload() {
        let id = CanId::standard(0x10).unwrap();
        assert!(CanFrame::new(id, &[0u8; 9]).is_none());
        let f = CanFrame::new(id, &[0x00, 0x40, 0x1F]).unwrap();
        assert_eq!(f.payload(), &[0x00, 0x40, 0x1F]);
        assert_eq!(f.data_hex(), "00 40 1F");
    }

    #[test]
    fn test_remote_frame_has_no_payload() {
        let mut f = CanFrame::new(CanId::extended(0x0CF0_0400).unwrap(), &[0u8; 8]).unwrap();
        f.rtr = true;
        assert_eq!(f.len, 8);
        assert!(f.payload().is_empty());
        assert_eq!(f.data_hex(), "");
    }
}

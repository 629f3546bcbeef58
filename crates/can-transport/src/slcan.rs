use crate::{BusInfo, CanBus, CanFrame, CanId, Result, Timestamp, TransportError};
use serialport::{SerialPort, SerialPortType};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

const BELL: u8 = 0x07;

/// SLCAN text protocol over serial (common on USB-CAN dongles)
pub struct SlcanBus {
    port_path: String,
    port: Box<dyn SerialPort>,
    pending: Vec<u8>,
}

impl SlcanBus {
    /// Open the port, program the bitrate (`Sx`), then open the channel (`O`).
    pub fn open_with(path: &str, bitrate: Option<SlcanBitrate>) -> Result<Self> {
        let mut port = serialport::new(path, 115200)
            .timeout(Duration::from_millis(200))
            .open()?;
        // Adapters left open by a previous session reject `Sx`; close first.
        let _ = port.write_all(b"C\r");
        let code = bitrate.unwrap_or(SlcanBitrate::B500k).code();
        port.write_all(&[b'S', code, b'\r'])?;
        port.write_all(b"O\r")?;
        debug!(path, "slcan channel opened");
        Ok(SlcanBus {
            port_path: path.to_string(),
            port,
            pending: Vec::with_capacity(64),
        })
    }

    pub fn path(&self) -> &str {
        &self.port_path
    }

    fn encode_frame(frame: &CanFrame) -> Result<Vec<u8>> {
        if frame.len > 8 {
            return Err(TransportError::InvalidFrame("dlc > 8"));
        }
        let (kind, id) = match (frame.id.is_extended(), frame.rtr) {
            (false, false) => ('t', format!("{:03X}", frame.id.raw())),
            (false, true) => ('r', format!("{:03X}", frame.id.raw())),
            (true, false) => ('T', format!("{:08X}", frame.id.raw())),
            (true, true) => ('R', format!("{:08X}", frame.id.raw())),
        };
        let mut line = format!("{kind}{id}{}", frame.len);
        if !frame.rtr {
            for b in frame.payload() {
                line.push_str(&format!("{b:02X}"));
            }
        }
        line.push('\r');
        Ok(line.into_bytes())
    }

    /// Take the next frame out of buffered adapter output; `None` until a full line
    /// has arrived.
    ///
    /// Command ACKs (bare CR, and `z`/`Z` after a transmit) are skipped. An error
    /// reply is a lone BELL with no CR; it is removed and reported on its own.
    fn next_frame(pending: &mut Vec<u8>) -> Option<Result<CanFrame>> {
        loop {
            let pos = pending.iter().position(|&b| b == b'\r' || b == BELL)?;
            if pending[pos] == BELL {
                pending.remove(pos);
                return Some(Err(TransportError::Io("adapter replied with BELL".into())));
            }
            let line: Vec<u8> = pending.drain(..=pos).collect();
            match &line[..pos] {
                [] | [b'z' | b'Z', ..] => continue,
                body => return Some(Self::parse_frame(body)),
            }
        }
    }

    fn parse_frame(line: &[u8]) -> Result<CanFrame> {
        let (&kind, rest) = line
            .split_first()
            .ok_or(TransportError::InvalidFrame("empty"))?;
        let (id_digits, extended) = match kind {
            b't' | b'r' => (3, false),
            b'T' | b'R' => (8, true),
            _ => return Err(TransportError::InvalidFrame("unknown header")),
        };
        if rest.len() < id_digits + 1 {
            return Err(TransportError::InvalidFrame("short header"));
        }
        let raw_id = hex_field(&rest[..id_digits])?;
        let id = match extended {
            true => CanId::extended(raw_id),
            false => u16::try_from(raw_id).ok().and_then(CanId::standard),
        };
        let id = id.ok_or(TransportError::InvalidFrame("id range"))?;

        let dlc = rest[id_digits].wrapping_sub(b'0');
        if dlc > 8 {
            return Err(TransportError::InvalidFrame("dlc > 8"));
        }
        let rtr = kind == b'r' || kind == b'R';
        let mut data = [0u8; 8];
        if !rtr {
            let body = &rest[id_digits + 1..];
            if body.len() < usize::from(dlc) * 2 {
                return Err(TransportError::InvalidFrame("short data"));
            }
            for (i, pair) in body.chunks_exact(2).take(usize::from(dlc)).enumerate() {
                data[i] = hex_field(pair)? as u8;
            }
        }
        Ok(CanFrame {
            id,
            len: dlc,
            data,
            rtr,
            timestamp: Some(Timestamp::now()),
        })
    }
}

fn hex_field(digits: &[u8]) -> Result<u32> {
    let s = std::str::from_utf8(digits).map_err(|_| TransportError::InvalidFrame("utf8"))?;
    u32::from_str_radix(s, 16).map_err(|_| TransportError::InvalidFrame("hex"))
}

impl CanBus for SlcanBus {
    fn open(path: &str) -> Result<Self>
    where
        Self: Sized,
    {
        Self::open_with(path, Some(SlcanBitrate::B500k))
    }

    fn list() -> Result<Vec<BusInfo>> {
        let ports = serialport::available_ports()?;
        Ok(ports
            .into_iter()
            .map(|p| BusInfo {
                driver: match p.port_type {
                    SerialPortType::UsbPort(_) => "slcan-serial".to_string(),
                    _ => "serial".to_string(),
                },
                name: p.port_name,
            })
            .collect())
    }

    fn recv(&mut self, timeout_ms: Option<u64>) -> Result<CanFrame> {
        if let Some(ms) = timeout_ms {
            self.port.set_timeout(Duration::from_millis(ms)).ok();
        }
        let mut buf = [0u8; 128];
        loop {
            if let Some(next) = Self::next_frame(&mut self.pending) {
                return next;
            }
            match self.port.read(&mut buf) {
                Ok(0) => continue,
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn send(&mut self, frame: &CanFrame) -> Result<()> {
        let line = Self::encode_frame(frame)?;
        self.port.write_all(&line)?;
        Ok(())
    }

    fn try_clone(&self) -> Result<Self> {
        let port = self.port.try_clone()?;
        Ok(SlcanBus {
            port_path: self.port_path.clone(),
            port,
            pending: Vec::with_capacity(64),
        })
    }
}

/// Supported SLCAN bitrates (mapped to Sx codes)
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SlcanBitrate {
    B10k,  // S0
    B20k,  // S1
    B50k,  // S2
    B100k, // S3
    B125k, // S4
    B250k, // S5
    B500k, // S6
    B800k, // S7
    B1M,   // S8
}

impl SlcanBitrate {
    pub fn code(self) -> u8 {
        match self {
            SlcanBitrate::B10k => b'0',
            SlcanBitrate::B20k => b'1',
            SlcanBitrate::B50k => b'2',
            SlcanBitrate::B100k => b'3',
            SlcanBitrate::B125k => b'4',
            SlcanBitrate::B250k => b'5',
            SlcanBitrate::B500k => b'6',
            SlcanBitrate::B800k => b'7',
            SlcanBitrate::B1M => b'8',
        }
    }

    /// Parse the short names used in configuration files ("500k", "1m").
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.trim().to_ascii_lowercase().as_str() {
            "10k" => SlcanBitrate::B10k,
            "20k" => SlcanBitrate::B20k,
            "50k" => SlcanBitrate::B50k,
            "100k" => SlcanBitrate::B100k,
            "125k" => SlcanBitrate::B125k,
            "250k" => SlcanBitrate::B250k,
            "500k" => SlcanBitrate::B500k,
            "800k" => SlcanBitrate::B800k,
            "1m" => SlcanBitrate::B1M,
            _ => return None,
        })
    }
}

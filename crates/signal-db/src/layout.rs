//! Bit placement of a signal inside a payload.
//!
//! A [`BitLayout`] splits a signal into per-byte spans once; the decoder walks the spans
//! to gather bits and the encoder walks the same spans to scatter them, so the two are
//! inverses by construction.

use crate::{ByteOrder, SignalDef};

/// A 64-bit signal starting mid-byte touches at most nine bytes.
const MAX_SPANS: usize = 9;

/// One contiguous run of bits within a single payload byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BitSpan {
    pub byte_index: usize,
    /// Lowest bit position within the byte (0..=7).
    pub bit_offset: u8,
    /// Number of consecutive bits (1..=8).
    pub num_bits: u8,
    /// Position of the span's lowest bit within the raw value.
    pub value_shift: u8,
}

impl BitSpan {
    fn mask(&self) -> u8 {
        ((1u16 << self.num_bits) - 1) as u8
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BitLayout {
    spans: [BitSpan; MAX_SPANS],
    count: usize,
}

impl BitLayout {
    pub fn for_signal(sig: &SignalDef) -> Self {
        Self::new(sig.start_bit, sig.bit_length, sig.byte_order)
    }

    pub fn new(start_bit: u16, bit_length: u8, order: ByteOrder) -> Self {
        let mut spans = [BitSpan::default(); MAX_SPANS];
        let mut count = 0;
        let mut byte_index = usize::from(start_bit / 8);
        let mut bit_index = (start_bit % 8) as u8;
        let mut remaining = bit_length.min(64);

        match order {
            ByteOrder::BigEndian => {
                // start_bit is the MSB; walk down within a byte, then continue at bit 7
                // of the next byte. The first span holds the top bits of the value.
                while remaining > 0 && count < MAX_SPANS {
                    let num_bits = (bit_index + 1).min(remaining);
                    remaining -= num_bits;
                    spans[count] = BitSpan {
                        byte_index,
                        bit_offset: bit_index + 1 - num_bits,
                        num_bits,
                        value_shift: remaining,
                    };
                    count += 1;
                    byte_index += 1;
                    bit_index = 7;
                }
            }
            ByteOrder::LittleEndian => {
                let mut value_shift = 0u8;
                while remaining > 0 && count < MAX_SPANS {
                    let num_bits = (8 - bit_index).min(remaining);
                    spans[count] = BitSpan {
                        byte_index,
                        bit_offset: bit_index,
                        num_bits,
                        value_shift,
                    };
                    count += 1;
                    value_shift += num_bits;
                    remaining -= num_bits;
                    byte_index += 1;
                    bit_index = 0;
                }
            }
        }

        Self { spans, count }
    }

    pub fn spans(&self) -> &[BitSpan] {
        &self.spans[..self.count]
    }

    /// One past the highest byte index the signal touches.
    pub fn end_byte(&self) -> usize {
        self.spans()
            .iter()
            .map(|s| s.byte_index + 1)
            .max()
            .unwrap_or(0)
    }

    /// Gather the raw unsigned value; `None` if any span falls outside `data`.
    pub fn extract(&self, data: &[u8]) -> Option<u64> {
        let mut raw = 0u64;
        for span in self.spans() {
            let byte = *data.get(span.byte_index)?;
            let bits = (byte >> span.bit_offset) & span.mask();
            raw |= u64::from(bits) << span.value_shift;
        }
        Some(raw)
    }

    /// Scatter `raw` into `data`, clearing the target bits first so neighbouring
    /// signals are preserved. Returns `false` without writing if a span is out of range.
    pub fn pack(&self, data: &mut [u8], raw: u64) -> bool {
        if self.end_byte() > data.len() {
            return false;
        }
        for span in self.spans() {
            let mask = span.mask();
            let bits = ((raw >> span.value_shift) as u8) & mask;
            data[span.byte_index] &= !(mask << span.bit_offset);
            data[span.byte_index] |= bits << span.bit_offset;
        }
        true
    }
}

//! Fixed-capacity bit storage backing the bloom filter.
//!
//! Bits are addressed through [`BitField::locate`], which maps a position to a
//! byte and a bit offset counted from the high end of that byte. Position 0 has
//! no byte of its own under this mapping and lands on bit 0 of the *last* byte.
//! The layout is what existing filter files contain, so it is kept as is.

use crate::errors::{FilterError, Result};

/// Physical location of a logical bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitPos {
    /// Index into the byte buffer.
    pub byte: usize,
    /// Shift inside that byte (`1 << bit`).
    pub bit: u8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitField {
    size: usize,
    bits: Vec<u8>,
}

impl BitField {
    /// Zeroed field of `size` bits.
    ///
    /// # Panics
    ///
    /// Panics if `size` is 0.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "bit field capacity must be positive");
        Self { size, bits: vec![0u8; size.div_ceil(8)] }
    }

    /// Rebuild a field from a raw buffer, e.g. one read back from disk.
    pub fn from_bytes(size: usize, bits: Vec<u8>) -> Result<Self> {
        if size == 0 {
            return Err(FilterError::BadHeader("bit field capacity is zero".into()));
        }
        let expected = size.div_ceil(8);
        if bits.len() != expected {
            return Err(FilterError::LengthMismatch { expected, found: bits.len() });
        }
        Ok(Self { size, bits })
    }

    /// Capacity in bits.
    pub fn capacity(&self) -> usize { self.size }

    /// True when no bit in the buffer is set.
    pub fn is_clear(&self) -> bool { self.bits.iter().all(|b| *b == 0) }

    pub fn as_bytes(&self) -> &[u8] { &self.bits }

    /// Map a bit position to its byte and in-byte offset.
    ///
    /// `locate(100)` is byte 12, bit 4: position `p > 0` lives in byte
    /// `ceil(p / 8) - 1` at offset `(8 - p % 8) % 8`.
    pub fn locate(&self, position: usize) -> BitPos {
        assert!(
            position < self.size,
            "bit position {position} out of range for {} bits",
            self.size
        );
        let byte = match position.div_ceil(8).checked_sub(1) {
            Some(b) => b,
            None => self.bits.len() - 1,
        };
        let mut bit = (position % 8) as u8;
        if bit != 0 {
            bit = 8 - bit;
        }
        BitPos { byte, bit }
    }

    pub fn set_bit(&mut self, position: usize) {
        let pos = self.locate(position);
        self.bits[pos.byte] |= 1u8 << pos.bit;
    }

    pub fn clear_bit(&mut self, position: usize) {
        let pos = self.locate(position);
        self.bits[pos.byte] &= !(1u8 << pos.bit);
    }

    pub fn get_bit(&self, position: usize) -> bool {
        let pos = self.locate(position);
        self.bits[pos.byte] & (1u8 << pos.bit) != 0
    }

    /// Set every byte to `0xFF`, padding bits included.
    pub fn fill_ones(&mut self) { self.bits.fill(0xFF); }

    /// Set every byte to `0x00`.
    pub fn fill_zeros(&mut self) { self.bits.fill(0x00); }

    /// Number of set bits in the buffer, padding bits included.
    pub fn count_ones(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }
}

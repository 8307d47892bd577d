//! # Wire Encoding
//!
//! Little-endian, bit-exact encoding shared by chain entities and the
//! compact-block messages.
//!
//! ## Compact Size
//!
//! ```text
//! value < 0xFD          -> [value: 1]
//! value <= 0xFFFF       -> [0xFD][value: 2]
//! value <= 0xFFFF_FFFF  -> [0xFE][value: 4]
//! otherwise             -> [0xFF][value: 8]
//! ```
//!
//! Decoding only accepts the shortest form of each value.

use crate::errors::WireError;
use crate::Hash;

/// Types with a bit-exact wire form.
pub trait WireEncode {
    /// Append the wire form of `self` to `out`.
    fn encode(&self, out: &mut Vec<u8>);

    /// Encode into a fresh buffer.
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }
}

/// Types that can be decoded from untrusted bytes.
pub trait WireDecode: Sized {
    /// Smallest possible encoded size, used to bound declared counts
    /// before allocating.
    const MIN_ENCODED_SIZE: usize;

    /// Decode one value, leaving the rest of the reader untouched.
    fn decode(reader: &mut WireReader<'_>) -> Result<Self, WireError>;

    /// Decode a complete message. Trailing bytes are an error.
    fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let mut reader = WireReader::new(bytes);
        let value = Self::decode(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }
}

/// Bounds-checked cursor over a byte slice.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not consumed yet.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Consume exactly `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        if len > self.remaining() {
            return Err(WireError::UnexpectedEof {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, WireError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_hash(&mut self) -> Result<Hash, WireError> {
        self.read_array()
    }

    /// Read a canonical compact size.
    pub fn read_compact_size(&mut self) -> Result<u64, WireError> {
        let (value, min) = match self.read_u8()? {
            0xFF => (self.read_u64()?, 0x1_0000_0000),
            0xFE => (u64::from(self.read_u32()?), 0x1_0000),
            0xFD => (u64::from(self.read_u16()?), 0xFD),
            small => return Ok(u64::from(small)),
        };
        if value < min {
            return Err(WireError::NonCanonicalCompactSize { value });
        }
        Ok(value)
    }

    /// Read an element count and check that `count` elements of at least
    /// `min_element_size` bytes can still follow.
    pub fn read_count(&mut self, min_element_size: usize) -> Result<usize, WireError> {
        let count = self.read_compact_size()?;
        let remaining = self.remaining();
        let fits = usize::try_from(count)
            .ok()
            .and_then(|n| n.checked_mul(min_element_size))
            .is_some_and(|needed| needed <= remaining);
        if !fits {
            return Err(WireError::CountExceedsBuffer {
                count,
                min_element_size,
                remaining,
            });
        }
        // fits implies count <= remaining <= usize::MAX
        Ok(count as usize)
    }

    /// Decode a compact-size prefixed vector.
    pub fn read_vec<T: WireDecode>(&mut self) -> Result<Vec<T>, WireError> {
        let count = self.read_count(T::MIN_ENCODED_SIZE)?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(T::decode(self)?);
        }
        Ok(items)
    }

    /// Ensure the whole buffer was consumed.
    pub fn finish(self) -> Result<(), WireError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(WireError::TrailingBytes(n)),
        }
    }
}

/// Append a compact size in its shortest form.
pub fn write_compact_size(out: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xFC => out.push(value as u8),
        0xFD..=0xFFFF => {
            out.push(0xFD);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xFFFF_FFFF => {
            out.push(0xFE);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(0xFF);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

/// Append a compact-size prefixed vector.
pub fn write_vec<T: WireEncode>(out: &mut Vec<u8>, items: &[T]) {
    write_compact_size(out, items.len() as u64);
    for item in items {
        item.encode(out);
    }
}

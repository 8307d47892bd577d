//! Short transaction ids.
//!
//! ```text
//! (k0, k1)  = SHA-256(header_hash || nonce_le)[0..16] as two LE u64
//! short_id  = SipHash-2-4(k0, k1, tx_hash) & 0xFFFF_FFFF_FFFF
//! ```
//!
//! The result must match other implementations bit for bit; peers compute
//! short ids independently.

use std::fmt;
use std::hash::Hasher;

use sha2::{Digest, Sha256};
use shared_types::{Hash, WireDecode, WireEncode, WireError, WireReader};
use siphasher::sip::SipHasher24;

/// 48-bit keyed fingerprint of a transaction hash.
///
/// On the wire a short id is 6 bytes: a little-endian `u32` low word
/// followed by a little-endian `u16` high word.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ShortId(u64);

impl ShortId {
    /// Encoded size in bytes.
    pub const LEN: usize = 6;

    /// Mask of the 48 significant bits.
    pub const MASK: u64 = 0xFFFF_FFFF_FFFF;

    /// Returns `None` when `value` does not fit in 48 bits.
    pub fn new(value: u64) -> Option<Self> {
        (value <= Self::MASK).then_some(Self(value))
    }

    /// Keeps the low 48 bits of `value`.
    pub fn from_truncated(value: u64) -> Self {
        Self(value & Self::MASK)
    }

    pub fn to_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ShortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShortId({:012x})", self.0)
    }
}

impl fmt::Display for ShortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:012x}", self.0)
    }
}

impl WireEncode for ShortId {
    fn encode(&self, out: &mut Vec<u8>) {
        let low = (self.0 & 0xFFFF_FFFF) as u32;
        let high = ((self.0 >> 32) & 0xFFFF) as u16;
        out.extend_from_slice(&low.to_le_bytes());
        out.extend_from_slice(&high.to_le_bytes());
    }
}

impl WireDecode for ShortId {
    const MIN_ENCODED_SIZE: usize = Self::LEN;

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        let low = reader.read_u32()?;
        let high = reader.read_u16()?;
        Ok(Self(u64::from(low) | (u64::from(high) << 32)))
    }
}

/// Per-block SipHash key, derived once per announcement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShortIdKeys {
    k0: u64,
    k1: u64,
}

impl ShortIdKeys {
    pub fn new(k0: u64, k1: u64) -> Self {
        Self { k0, k1 }
    }

    /// Derive the key from the announced block hash and the sender's nonce.
    pub fn derive(header_hash: &Hash, nonce: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(header_hash);
        hasher.update(nonce.to_le_bytes());
        let digest: [u8; 32] = hasher.finalize().into();

        let mut k0 = [0u8; 8];
        let mut k1 = [0u8; 8];
        k0.copy_from_slice(&digest[0..8]);
        k1.copy_from_slice(&digest[8..16]);
        Self {
            k0: u64::from_le_bytes(k0),
            k1: u64::from_le_bytes(k1),
        }
    }

    pub fn k0(&self) -> u64 {
        self.k0
    }

    pub fn k1(&self) -> u64 {
        self.k1
    }

    /// Fingerprint a transaction hash under this key.
    pub fn short_id(&self, tx_hash: &Hash) -> ShortId {
        let mut hasher = SipHasher24::new_with_keys(self.k0, self.k1);
        hasher.write(tx_hash);
        ShortId::from_truncated(hasher.finish())
    }
}

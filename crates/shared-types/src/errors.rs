//! # Error Types
//!
//! Defines error types shared by every wire decoder.

use thiserror::Error;

/// Errors raised while decoding bytes received from a peer.
///
/// Every variant means the bytes are malformed. None of them can be caused by
/// local state, so the sending peer is always the party at fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// The buffer ended before a field could be read.
    #[error("Unexpected end of data: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    /// A compact size was encoded with more bytes than necessary.
    #[error("Non-canonical compact size: {value}")]
    NonCanonicalCompactSize { value: u64 },

    /// A declared element count cannot fit in the remaining bytes.
    #[error("Count {count} exceeds remaining buffer ({remaining} bytes, {min_element_size} per element)")]
    CountExceedsBuffer {
        count: u64,
        min_element_size: usize,
        remaining: usize,
    },

    /// An optional-field marker was neither 0 nor 1.
    #[error("Invalid option flag: {0}")]
    InvalidOptionFlag(u8),

    /// A decoded value does not fit the field it belongs to.
    #[error("Value out of range for {field}: {value}")]
    ValueOutOfRange { field: &'static str, value: u64 },

    /// Bytes were left over after a complete message was decoded.
    #[error("Trailing bytes after message: {0}")]
    TrailingBytes(usize),
}

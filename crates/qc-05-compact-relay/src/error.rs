//! Error types and outcome classification for compact block relay.

use shared_types::{Hash, WireError};
use thiserror::Error;

use crate::domain::ShortId;
use crate::ports::inbound::PeerAction;

/// Caller-facing classification of every reconstruction step.
///
/// | Status | Meaning | Peer at fault |
/// |---|---|---|
/// | `Ok` | step succeeded (a partial fill is still `Ok`) | no |
/// | `Invalid` | peer data violates the protocol | yes |
/// | `Failed` | reconstruction cannot proceed for local reasons | no |
/// | `CheckBlockFailed` | block assembled but failed validation | yes |
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReadStatus {
    Ok,
    Invalid,
    Failed,
    CheckBlockFailed,
}

impl ReadStatus {
    /// Whether the outcome is attributable to the sending peer.
    pub fn is_peer_fault(self) -> bool {
        matches!(self, Self::Invalid | Self::CheckBlockFailed)
    }
}

/// Errors from reconstructing a block out of a compact announcement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconstructionError {
    #[error("Announcement carries a null header")]
    NullHeader,

    #[error("Announcement contains no transactions")]
    EmptyBlock,

    #[error("Announced block has {count} transactions (max: {max})")]
    TooManyTransactions { count: usize, max: usize },

    #[error("Prefilled index {index} does not follow {previous}")]
    PrefilledOutOfOrder { index: u32, previous: u32 },

    #[error("Prefilled index {index} out of range for {count} transactions")]
    PrefilledOutOfRange { index: u32, count: usize },

    /// Two announced positions share one short id. Not the peer's fault:
    /// the caller must fall back to a full block request.
    #[error("Short id {short_id} announced more than once")]
    DuplicateShortId { short_id: ShortId },

    #[error("Peer supplied {supplied} transactions for {expected} missing positions")]
    MissingCountMismatch { expected: usize, supplied: usize },

    #[error("Supplied transaction at position {index} does not match short id {expected}")]
    ShortIdMismatch { index: usize, expected: ShortId },

    /// Position `index` cannot be addressed by a 16-bit follow-up request.
    #[error("Missing position {index} exceeds the 16-bit request range")]
    MissingIndexNotAddressable { index: usize },

    #[error("Block hash mismatch: expected {expected:?}, got {actual:?}")]
    BlockHashMismatch { expected: Hash, actual: Hash },

    #[error("Transaction index {index} out of range for {count} transactions")]
    TxIndexOutOfRange { index: usize, count: usize },

    #[error("Reconstructed block {block_hash:?} failed validation")]
    CheckBlockFailed { block_hash: Hash },

    /// An invariant the engine maintains itself was broken. A bug, not a
    /// peer fault.
    #[error("Internal invariant violated: {0}")]
    Internal(&'static str),
}

impl ReconstructionError {
    pub fn status(&self) -> ReadStatus {
        match self {
            Self::DuplicateShortId { .. }
            | Self::MissingIndexNotAddressable { .. }
            | Self::Internal(_) => ReadStatus::Failed,
            Self::CheckBlockFailed { .. } => ReadStatus::CheckBlockFailed,
            Self::NullHeader
            | Self::EmptyBlock
            | Self::TooManyTransactions { .. }
            | Self::PrefilledOutOfOrder { .. }
            | Self::PrefilledOutOfRange { .. }
            | Self::MissingCountMismatch { .. }
            | Self::ShortIdMismatch { .. }
            | Self::BlockHashMismatch { .. }
            | Self::TxIndexOutOfRange { .. } => ReadStatus::Invalid,
        }
    }

    pub fn is_peer_fault(&self) -> bool {
        self.status().is_peer_fault()
    }
}

/// Errors building an announcement from a local block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("Cannot announce a block without transactions")]
    EmptyBlock,

    #[error("Block has too many transactions to announce: {count}")]
    TooManyTransactions { count: usize },

    #[error("Prefill index {index} out of range for {count} transactions")]
    PrefillOutOfRange { index: usize, count: usize },
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Configuration value must be non-zero: {0}")]
    ZeroValue(&'static str),
}

/// Errors surfaced by the relay service.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] WireError),

    #[error(transparent)]
    Reconstruction(#[from] ReconstructionError),

    #[error("No reconstruction in flight for block {block_hash:?}")]
    UnknownBlock { block_hash: Hash },

    #[error("Failed to build announcement: {0}")]
    Build(#[from] BuildError),

    #[error("Network error: {0}")]
    NetworkError(String),
}

impl RelayError {
    /// Classification of failures that concern a peer's message. Malformed
    /// wire data counts as invalid.
    ///
    /// `None` for errors outside the reconstruction taxonomy: a response
    /// nobody is waiting for, a local build error, a transport failure.
    pub fn status(&self) -> Option<ReadStatus> {
        match self {
            Self::Malformed(_) => Some(ReadStatus::Invalid),
            Self::Reconstruction(err) => Some(err.status()),
            Self::UnknownBlock { .. } | Self::Build(_) | Self::NetworkError(_) => None,
        }
    }

    /// Suggested handling of the peer that sent the offending message.
    ///
    /// A late `BlockTxn` (the attempt was abandoned or evicted) is ignored,
    /// not answered with a full block request.
    pub fn action(&self) -> PeerAction {
        self.status().map_or(PeerAction::None, PeerAction::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(ReconstructionError::NullHeader.status(), ReadStatus::Invalid);
        assert_eq!(
            ReconstructionError::DuplicateShortId {
                short_id: ShortId::default()
            }
            .status(),
            ReadStatus::Failed
        );
        assert_eq!(
            ReconstructionError::CheckBlockFailed { block_hash: [0; 32] }.status(),
            ReadStatus::CheckBlockFailed
        );
        assert_eq!(
            ReconstructionError::MissingIndexNotAddressable { index: 70_000 }.status(),
            ReadStatus::Failed
        );
    }

    #[test]
    fn test_peer_fault() {
        assert!(ReconstructionError::MissingCountMismatch {
            expected: 1,
            supplied: 2
        }
        .is_peer_fault());
        assert!(!ReconstructionError::DuplicateShortId {
            short_id: ShortId::default()
        }
        .is_peer_fault());
        assert!(!ReadStatus::Ok.is_peer_fault());
    }

    #[test]
    fn test_relay_error_status() {
        let malformed = RelayError::from(WireError::TrailingBytes(3));
        assert_eq!(malformed.status(), Some(ReadStatus::Invalid));
        assert_eq!(malformed.action(), PeerAction::Misbehaving);

        let duplicate = RelayError::from(ReconstructionError::DuplicateShortId {
            short_id: ShortId::default(),
        });
        assert_eq!(duplicate.status(), Some(ReadStatus::Failed));
        assert_eq!(duplicate.action(), PeerAction::RequestFullBlock);
    }

    #[test]
    fn test_local_errors_suggest_nothing() {
        let unknown = RelayError::UnknownBlock { block_hash: [1; 32] };
        assert_eq!(unknown.status(), None);
        assert_eq!(unknown.action(), PeerAction::None);

        let network = RelayError::NetworkError("connection reset".into());
        assert_eq!(network.action(), PeerAction::None);

        let build = RelayError::from(BuildError::EmptyBlock);
        assert_eq!(build.status(), None);
        assert_eq!(build.action(), PeerAction::None);
    }
}

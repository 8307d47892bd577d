//! Inbound ports (API) for compact block relay.

use shared_types::{Block, Hash, PeerId};

use crate::domain::RelayMetrics;
use crate::error::{ReadStatus, ReconstructionError, RelayError};

/// What the caller should do about the peer after an outcome.
///
/// The relay only suggests; banning, disconnecting and re-requesting are
/// left to the connection manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PeerAction {
    None,
    /// Protocol violation: penalize the peer.
    Misbehaving,
    /// The peer relayed a block that fails validation.
    Disconnect,
    /// Reconstruction cannot proceed: ask for the full block instead.
    RequestFullBlock,
}

impl From<ReadStatus> for PeerAction {
    fn from(status: ReadStatus) -> Self {
        match status {
            ReadStatus::Ok => Self::None,
            ReadStatus::Invalid => Self::Misbehaving,
            ReadStatus::Failed => Self::RequestFullBlock,
            ReadStatus::CheckBlockFailed => Self::Disconnect,
        }
    }
}

/// Result of handling one compact block message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Block reconstructed and accepted by validation.
    Completed { block: Block },
    /// Follow-up request sent; the attempt is in flight.
    AwaitingTransactions { block_hash: Hash, missing: usize },
    /// The attempt ended without a block.
    Rejected {
        block_hash: Hash,
        error: ReconstructionError,
    },
}

impl RelayOutcome {
    pub fn block_hash(&self) -> Hash {
        match self {
            Self::Completed { block } => block.hash(),
            Self::AwaitingTransactions { block_hash, .. } | Self::Rejected { block_hash, .. } => {
                *block_hash
            }
        }
    }

    pub fn status(&self) -> ReadStatus {
        match self {
            Self::Completed { .. } | Self::AwaitingTransactions { .. } => ReadStatus::Ok,
            Self::Rejected { error, .. } => error.status(),
        }
    }

    pub fn action(&self) -> PeerAction {
        self.status().into()
    }
}

/// Sender-side API.
pub trait CompactRelayApi: Send + Sync {
    /// Announce a locally validated block to `peers` as a compact block.
    ///
    /// # Returns
    /// Number of peers the announcement was handed to
    fn announce_block(&self, peers: &[PeerId], block: &Block) -> Result<usize, RelayError>;

    /// Drop the in-flight attempt for `block_hash` from `peer`, e.g. after the
    /// full block arrived by another path. Returns whether one existed.
    fn abandon(&self, peer: PeerId, block_hash: Hash) -> bool;

    /// Get relay metrics.
    fn get_relay_metrics(&self) -> RelayMetrics;
}

/// Handle for compact block messages received from the network.
///
/// Errors are reserved for messages that carry no usable block context
/// (malformed bytes, unknown attempts, transport failures). Reconstruction
/// failures come back as [`RelayOutcome::Rejected`].
pub trait CompactBlockReceiver: Send + Sync {
    /// Handle an incoming `CompactBlock` announcement.
    fn handle_compact_block(&self, peer: PeerId, data: &[u8]) -> Result<RelayOutcome, RelayError>;

    /// Handle the peer's `BlockTxn` answer to our follow-up request.
    fn handle_block_txn(&self, peer: PeerId, data: &[u8]) -> Result<RelayOutcome, RelayError>;

    /// Answer a peer's `GetBlockTxn` request from `block`, which we hold in
    /// full.
    fn handle_get_block_txn(
        &self,
        peer: PeerId,
        data: &[u8],
        block: &Block,
    ) -> Result<(), RelayError>;
}

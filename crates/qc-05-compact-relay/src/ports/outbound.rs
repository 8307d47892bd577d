//! Outbound ports (SPI) for compact block relay.
//!
//! Implemented by adapters in the node runtime. The engine only reads
//! through them and never holds on to what they return beyond one call.

use shared_types::{Block, Hash, PeerId, TransactionRef};
use std::collections::HashMap;

use crate::error::RelayError;

/// Read access to the local transaction pool.
pub trait TransactionPool: Send + Sync {
    /// Look up a pooled transaction by hash.
    ///
    /// May return `None` for a hash listed by `tx_hashes` moments earlier;
    /// the pool is allowed to change between the two calls.
    fn get(&self, hash: &Hash) -> Option<TransactionRef>;

    /// Snapshot of every hash currently in the pool.
    fn tx_hashes(&self) -> Vec<Hash>;
}

/// Recently seen transactions kept outside the pool (e.g. relayed but
/// rejected), consulted as a second match source.
pub trait ExtraTransactionSource: Send + Sync {
    /// Snapshot of `(hash, transaction)` pairs, most relevant first.
    fn extra_transactions(&self) -> Vec<(Hash, TransactionRef)>;
}

/// Full block validation (proof, merkle root, size limits).
pub trait BlockValidator: Send + Sync {
    /// Returns `true` when `block` is valid at `height`.
    fn check_block(&self, block: &Block, height: u64) -> bool;
}

/// Peer network interface for P2P communication.
pub trait PeerNetwork: Send + Sync {
    /// Send message to a specific peer.
    fn send_to_peer(&self, peer_id: PeerId, message: NetworkMessage) -> Result<(), RelayError>;
}

/// Messages the relay hands to the framing layer, payloads already
/// serialized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkMessage {
    /// Compact block announcement
    CompactBlock { data: Vec<u8> },
    /// Request missing transactions
    GetBlockTxn { data: Vec<u8> },
    /// Missing transactions response
    BlockTxn { data: Vec<u8> },
}

impl TransactionPool for HashMap<Hash, TransactionRef> {
    fn get(&self, hash: &Hash) -> Option<TransactionRef> {
        HashMap::get(self, hash).cloned()
    }

    fn tx_hashes(&self) -> Vec<Hash> {
        self.keys().copied().collect()
    }
}

impl ExtraTransactionSource for Vec<(Hash, TransactionRef)> {
    fn extra_transactions(&self) -> Vec<(Hash, TransactionRef)> {
        self.clone()
    }
}

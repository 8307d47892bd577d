//! # Core Domain Entities
//!
//! Chain entities exchanged between peers and handed between subsystems.
//!
//! ## Wire Forms
//!
//! ```text
//! BlockHeader (146 bytes, fixed):
//! [version: 2][height: 8][parent_hash: 32][merkle_root: 32]
//! [state_root: 32][timestamp: 8][proposer: 32]
//!
//! Transaction (>= 114 bytes):
//! [from: 32][to_flag: 1][to: 32 if flag=1][value: 8][nonce: 8]
//! [data_len: compact size][data][signature: 64]
//! ```
//!
//! Both hashes are single SHA-256 over the wire form.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use sha2::{Digest, Sha256};

use crate::errors::WireError;
use crate::wire::{write_compact_size, WireDecode, WireEncode, WireReader};

/// A 32-byte hash (SHA-256).
pub type Hash = [u8; 32];

/// A 64-byte Ed25519 signature.
pub type Signature = [u8; 64];

/// A 32-byte Ed25519 public key.
pub type PublicKey = [u8; 32];

/// Shared handle to a transaction. The pool, the extra cache and the block
/// being reconstructed all point at the same allocation.
pub type TransactionRef = Arc<Transaction>;

/// Unique identifier for a node in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct NodeId(pub [u8; 32]);

/// A peer identifier (alias for `NodeId` in peer contexts).
pub type PeerId = NodeId;

fn sha256(bytes: &[u8]) -> Hash {
    Sha256::digest(bytes).into()
}

// =============================================================================
// BLOCK HEADER
// =============================================================================

/// The header of a block containing metadata and root hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockHeader {
    /// Protocol version for this block.
    pub version: u16,
    /// Block height in the chain.
    pub height: u64,
    /// Hash of the parent block (creates the chain linkage).
    pub parent_hash: Hash,
    /// Merkle root of all transactions in the block.
    pub merkle_root: Hash,
    /// Root hash of the state trie after applying this block.
    pub state_root: Hash,
    /// Unix timestamp when the block was proposed.
    pub timestamp: u64,
    /// The validator who proposed this block.
    pub proposer: PublicKey,
}

impl BlockHeader {
    /// Size of the fixed wire form.
    pub const ENCODED_SIZE: usize = 2 + 8 + 32 + 32 + 32 + 8 + 32;

    /// SHA-256 of the wire form.
    pub fn hash(&self) -> Hash {
        sha256(&self.to_bytes())
    }

    /// True for the all-zero header, which never identifies a real block.
    pub fn is_null(&self) -> bool {
        *self == Self::default()
    }
}

impl WireEncode for BlockHeader {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(&self.parent_hash);
        out.extend_from_slice(&self.merkle_root);
        out.extend_from_slice(&self.state_root);
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.proposer);
    }
}

impl WireDecode for BlockHeader {
    const MIN_ENCODED_SIZE: usize = Self::ENCODED_SIZE;

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            version: reader.read_u16()?,
            height: reader.read_u64()?,
            parent_hash: reader.read_hash()?,
            merkle_root: reader.read_hash()?,
            state_root: reader.read_hash()?,
            timestamp: reader.read_u64()?,
            proposer: reader.read_array()?,
        })
    }
}

// =============================================================================
// TRANSACTION
// =============================================================================

/// A raw transaction as received from the network.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sender's public key.
    pub from: PublicKey,
    /// Recipient's public key (optional for contract creation).
    pub to: Option<PublicKey>,
    /// Transaction amount in base units.
    pub value: u64,
    /// Sender's nonce to prevent replay attacks.
    pub nonce: u64,
    /// Transaction payload (contract call data, etc.).
    pub data: Vec<u8>,
    /// Sender's signature over the transaction.
    #[serde_as(as = "Bytes")]
    pub signature: Signature,
}

impl Transaction {
    /// Smallest wire form: no recipient, empty payload.
    pub const MIN_ENCODED_SIZE: usize = 32 + 1 + 8 + 8 + 1 + 64;

    /// SHA-256 of the wire form.
    pub fn hash(&self) -> Hash {
        sha256(&self.to_bytes())
    }
}

impl WireEncode for Transaction {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.from);
        match &self.to {
            Some(to) => {
                out.push(1);
                out.extend_from_slice(to);
            }
            None => out.push(0),
        }
        out.extend_from_slice(&self.value.to_le_bytes());
        out.extend_from_slice(&self.nonce.to_le_bytes());
        write_compact_size(out, self.data.len() as u64);
        out.extend_from_slice(&self.data);
        out.extend_from_slice(&self.signature);
    }
}

impl WireDecode for Transaction {
    const MIN_ENCODED_SIZE: usize = Transaction::MIN_ENCODED_SIZE;

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        let from = reader.read_array()?;
        let to = match reader.read_u8()? {
            0 => None,
            1 => Some(reader.read_array()?),
            flag => return Err(WireError::InvalidOptionFlag(flag)),
        };
        let value = reader.read_u64()?;
        let nonce = reader.read_u64()?;
        let data_len = reader.read_count(1)?;
        let data = reader.read_bytes(data_len)?.to_vec();
        let signature = reader.read_array()?;
        Ok(Self {
            from,
            to,
            value,
            nonce,
            data,
            signature,
        })
    }
}

impl WireEncode for TransactionRef {
    fn encode(&self, out: &mut Vec<u8>) {
        self.as_ref().encode(out);
    }
}

impl WireDecode for TransactionRef {
    const MIN_ENCODED_SIZE: usize = Transaction::MIN_ENCODED_SIZE;

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        Transaction::decode(reader).map(Arc::new)
    }
}

// =============================================================================
// BLOCK
// =============================================================================

/// A full block: header plus every transaction in block order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<TransactionRef>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<TransactionRef>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    /// The block is identified by its header hash.
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// The first transaction, if any.
    pub fn coinbase(&self) -> Option<&TransactionRef> {
        self.transactions.first()
    }
}

//! # Core Domain Entities
//!
//! Wire entities of the compact block protocol.
//!
//! - [`CompactBlock`]: header, nonce, short ids and prefilled transactions
//! - [`PrefilledTransaction`]: a transaction sent in full at a known position
//! - [`BlockTransactionsRequest`]: positions the receiver could not fill
//! - [`BlockTransactions`]: the sender's answer, one transaction per position
//!
//! ## Wire Format
//!
//! ```text
//! CompactBlock:
//! [header: 146][nonce: 8]
//! [short_id_count: compact size][short_ids: 6*N]
//! [prefilled_count: compact size][(index_delta: compact size, tx)...]
//!
//! BlockTransactionsRequest: [block_hash: 32][count: compact size][index: 2]*N
//! BlockTransactions:        [block_hash: 32][count: compact size][tx]*N
//! ```
//!
//! Prefilled positions travel as deltas: the first entry carries its
//! absolute position, each later entry the distance from the previous one.

use rand::Rng;
use shared_types::wire::{write_compact_size, write_vec};
use shared_types::{
    Block, BlockHeader, Hash, Transaction, TransactionRef, WireDecode, WireEncode, WireError,
    WireReader,
};

use super::{ShortId, ShortIdKeys};
use crate::error::{BuildError, ReconstructionError};

/// Transaction included in full in a compact block.
///
/// The coinbase is always prefilled; senders may add transactions they
/// expect the receiver to be missing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrefilledTransaction {
    /// Absolute position in the block's transaction list.
    pub index: u32,
    pub tx: TransactionRef,
}

/// Compact block announcement.
///
/// Invariant once accepted for reconstruction: prefilled indexes are
/// strictly increasing and below [`CompactBlock::block_tx_count`]. Decoding
/// does not enforce it; [`crate::domain::check_announcement`] does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompactBlock {
    pub header: BlockHeader,
    /// Sender-chosen nonce mixed into the short id key.
    pub nonce: u64,
    /// Short ids of every transaction that is not prefilled, in block order.
    pub short_ids: Vec<ShortId>,
    pub prefilled: Vec<PrefilledTransaction>,
}

impl CompactBlock {
    /// Creates an announcement with no transactions.
    pub fn new(header: BlockHeader, nonce: u64) -> Self {
        Self {
            header,
            nonce,
            short_ids: Vec::new(),
            prefilled: Vec::new(),
        }
    }

    /// Builder method: set short ids.
    pub fn with_short_ids(mut self, short_ids: Vec<ShortId>) -> Self {
        self.short_ids = short_ids;
        self
    }

    /// Builder method: set prefilled transactions.
    pub fn with_prefilled(mut self, prefilled: Vec<PrefilledTransaction>) -> Self {
        self.prefilled = prefilled;
        self
    }

    /// Build an announcement from a full block.
    ///
    /// Position 0 (the coinbase) is always prefilled, as is every position in
    /// `prefill`. Duplicates in `prefill` are ignored.
    pub fn from_block(block: &Block, nonce: u64, prefill: &[usize]) -> Result<Self, BuildError> {
        let count = block.transactions.len();
        if count == 0 {
            return Err(BuildError::EmptyBlock);
        }
        if u32::try_from(count).is_err() {
            return Err(BuildError::TooManyTransactions { count });
        }
        if let Some(&index) = prefill.iter().find(|&&i| i >= count) {
            return Err(BuildError::PrefillOutOfRange { index, count });
        }

        let mut prefilled_mask = vec![false; count];
        prefilled_mask[0] = true;
        for &index in prefill {
            prefilled_mask[index] = true;
        }

        let keys = ShortIdKeys::derive(&block.hash(), nonce);
        let mut compact = Self::new(block.header, nonce);
        for (index, tx) in block.transactions.iter().enumerate() {
            if prefilled_mask[index] {
                compact.prefilled.push(PrefilledTransaction {
                    // count fits in u32, checked above
                    index: index as u32,
                    tx: TransactionRef::clone(tx),
                });
            } else {
                compact.short_ids.push(keys.short_id(&tx.hash()));
            }
        }
        Ok(compact)
    }

    /// Same as [`CompactBlock::from_block`] with a fresh random nonce.
    pub fn from_block_with_random_nonce(block: &Block, prefill: &[usize]) -> Result<Self, BuildError> {
        Self::from_block(block, rand::thread_rng().gen(), prefill)
    }

    /// Number of transactions in the announced block.
    pub fn block_tx_count(&self) -> usize {
        self.short_ids.len() + self.prefilled.len()
    }

    /// Hash of the announced block.
    pub fn block_hash(&self) -> Hash {
        self.header.hash()
    }

    /// Short id key for this announcement.
    pub fn keys(&self) -> ShortIdKeys {
        ShortIdKeys::derive(&self.block_hash(), self.nonce)
    }
}

impl WireEncode for CompactBlock {
    fn encode(&self, out: &mut Vec<u8>) {
        self.header.encode(out);
        out.extend_from_slice(&self.nonce.to_le_bytes());
        write_vec(out, &self.short_ids);

        write_compact_size(out, self.prefilled.len() as u64);
        let mut previous: Option<u32> = None;
        for entry in &self.prefilled {
            // Positions are expected to be non-decreasing; anything else
            // wraps and will not decode back to the same value.
            let delta = match previous {
                None => entry.index,
                Some(prev) => entry.index.wrapping_sub(prev),
            };
            write_compact_size(out, u64::from(delta));
            entry.tx.encode(out);
            previous = Some(entry.index);
        }
    }
}

impl WireDecode for CompactBlock {
    const MIN_ENCODED_SIZE: usize = BlockHeader::ENCODED_SIZE + 8 + 1 + 1;

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        let header = BlockHeader::decode(reader)?;
        let nonce = reader.read_u64()?;
        let short_ids = reader.read_vec::<ShortId>()?;

        let prefilled_count = reader.read_count(1 + Transaction::MIN_ENCODED_SIZE)?;
        let mut prefilled = Vec::with_capacity(prefilled_count);
        let mut previous: Option<u32> = None;
        for _ in 0..prefilled_count {
            let delta = reader.read_compact_size()?;
            let absolute = match previous {
                None => Some(delta),
                Some(prev) => u64::from(prev).checked_add(delta),
            };
            let index = absolute
                .and_then(|value| u32::try_from(value).ok())
                .ok_or(WireError::ValueOutOfRange {
                    field: "prefilled index",
                    value: delta,
                })?;
            let tx = TransactionRef::decode(reader)?;
            prefilled.push(PrefilledTransaction { index, tx });
            previous = Some(index);
        }

        Ok(Self {
            header,
            nonce,
            short_ids,
            prefilled,
        })
    }
}

/// Request for the transactions at `indexes` of block `block_hash`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockTransactionsRequest {
    pub block_hash: Hash,
    /// Absolute positions, ascending.
    pub indexes: Vec<u16>,
}

impl WireEncode for BlockTransactionsRequest {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.block_hash);
        write_compact_size(out, self.indexes.len() as u64);
        for index in &self.indexes {
            out.extend_from_slice(&index.to_le_bytes());
        }
    }
}

impl WireDecode for BlockTransactionsRequest {
    const MIN_ENCODED_SIZE: usize = 32 + 1;

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        let block_hash = reader.read_hash()?;
        let count = reader.read_count(2)?;
        let mut indexes = Vec::with_capacity(count);
        for _ in 0..count {
            indexes.push(reader.read_u16()?);
        }
        Ok(Self {
            block_hash,
            indexes,
        })
    }
}

/// Transactions answering a [`BlockTransactionsRequest`], in request order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockTransactions {
    pub block_hash: Hash,
    pub transactions: Vec<TransactionRef>,
}

impl BlockTransactions {
    /// Answer `request` from a block we hold in full.
    pub fn from_request(
        block: &Block,
        request: &BlockTransactionsRequest,
    ) -> Result<Self, ReconstructionError> {
        let block_hash = block.hash();
        if request.block_hash != block_hash {
            return Err(ReconstructionError::BlockHashMismatch {
                expected: block_hash,
                actual: request.block_hash,
            });
        }

        let count = block.transactions.len();
        let transactions = request
            .indexes
            .iter()
            .map(|&index| {
                block
                    .transactions
                    .get(usize::from(index))
                    .cloned()
                    .ok_or(ReconstructionError::TxIndexOutOfRange {
                        index: usize::from(index),
                        count,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            block_hash,
            transactions,
        })
    }
}

impl WireEncode for BlockTransactions {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.block_hash);
        write_vec(out, &self.transactions);
    }
}

impl WireDecode for BlockTransactions {
    const MIN_ENCODED_SIZE: usize = 32 + 1;

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            block_hash: reader.read_hash()?,
            transactions: reader.read_vec()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn make_tx(nonce: u64) -> TransactionRef {
        Arc::new(Transaction {
            from: [0xAA; 32],
            to: Some([0xBB; 32]),
            value: 100,
            nonce,
            data: vec![nonce as u8; 3],
            signature: [0; 64],
        })
    }

    fn make_block(tx_count: u64) -> Block {
        let header = BlockHeader {
            version: 1,
            height: 100,
            parent_hash: [0x11; 32],
            timestamp: 1_701_705_600,
            ..Default::default()
        };
        Block::new(header, (0..tx_count).map(make_tx).collect())
    }

    #[test]
    fn test_from_block_prefills_coinbase() {
        let block = make_block(4);
        let compact = CompactBlock::from_block(&block, 42, &[]).unwrap();

        assert_eq!(compact.block_tx_count(), 4);
        assert_eq!(compact.prefilled.len(), 1);
        assert_eq!(compact.prefilled[0].index, 0);
        assert_eq!(compact.prefilled[0].tx, block.transactions[0]);

        let keys = compact.keys();
        let expected: Vec<ShortId> = block.transactions[1..]
            .iter()
            .map(|tx| keys.short_id(&tx.hash()))
            .collect();
        assert_eq!(compact.short_ids, expected);
    }

    #[test]
    fn test_from_block_extra_prefill() {
        let block = make_block(5);
        let compact = CompactBlock::from_block(&block, 7, &[3, 3, 0]).unwrap();

        let indexes: Vec<u32> = compact.prefilled.iter().map(|p| p.index).collect();
        assert_eq!(indexes, vec![0, 3]);
        assert_eq!(compact.short_ids.len(), 3);
    }

    #[test]
    fn test_from_block_errors() {
        let empty = Block::new(BlockHeader::default(), Vec::new());
        assert_eq!(
            CompactBlock::from_block(&empty, 1, &[]),
            Err(BuildError::EmptyBlock)
        );

        let block = make_block(2);
        assert_eq!(
            CompactBlock::from_block(&block, 1, &[2]),
            Err(BuildError::PrefillOutOfRange { index: 2, count: 2 })
        );
    }

    #[test]
    fn test_random_nonce_changes_short_ids() {
        let block = make_block(3);
        let a = CompactBlock::from_block_with_random_nonce(&block, &[]).unwrap();
        let b = CompactBlock::from_block(&block, a.nonce.wrapping_add(1), &[]).unwrap();
        assert_ne!(a.short_ids, b.short_ids);
    }

    #[test]
    fn test_compact_block_roundtrip_with_deltas() {
        let block = make_block(6);
        let compact = CompactBlock::from_block(&block, 99, &[2, 5]).unwrap();
        let bytes = compact.to_bytes();

        let decoded = CompactBlock::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, compact);
        let indexes: Vec<u32> = decoded.prefilled.iter().map(|p| p.index).collect();
        assert_eq!(indexes, vec![0, 2, 5]);
    }

    #[test]
    fn test_prefilled_deltas_on_the_wire() {
        let tx = make_tx(1);
        let compact = CompactBlock::new(BlockHeader::default(), 0).with_prefilled(vec![
            PrefilledTransaction {
                index: 1,
                tx: tx.clone(),
            },
            PrefilledTransaction {
                index: 4,
                tx: tx.clone(),
            },
        ]);
        let bytes = compact.to_bytes();
        let tx_len = tx.to_bytes().len();

        // header + nonce + short id count (0) + prefilled count (2)
        let mut offset = BlockHeader::ENCODED_SIZE + 8 + 1 + 1;
        assert_eq!(bytes[offset], 1);
        offset += 1 + tx_len;
        assert_eq!(bytes[offset], 3);
    }

    #[test]
    fn test_short_id_count_exceeding_buffer_is_malformed() {
        let compact = CompactBlock::new(make_block(1).header, 5);
        let mut bytes = compact.to_bytes();
        // Overwrite short id count with 100 while no ids follow
        bytes[BlockHeader::ENCODED_SIZE + 8] = 100;
        assert!(matches!(
            CompactBlock::from_bytes(&bytes),
            Err(WireError::CountExceedsBuffer { count: 100, .. })
        ));
    }

    #[test]
    fn test_prefilled_delta_overflow_is_malformed() {
        let tx = make_tx(1);
        let mut bytes = Vec::new();
        BlockHeader::default().encode(&mut bytes);
        bytes.extend_from_slice(&0u64.to_le_bytes());
        write_compact_size(&mut bytes, 0);
        write_compact_size(&mut bytes, 2);
        write_compact_size(&mut bytes, u64::from(u32::MAX));
        tx.encode(&mut bytes);
        write_compact_size(&mut bytes, 1);
        tx.encode(&mut bytes);

        assert_eq!(
            CompactBlock::from_bytes(&bytes),
            Err(WireError::ValueOutOfRange {
                field: "prefilled index",
                value: 1
            })
        );
    }

    #[test]
    fn test_truncated_compact_block() {
        let compact = CompactBlock::from_block(&make_block(3), 1, &[]).unwrap();
        let bytes = compact.to_bytes();
        for len in [0, 10, BlockHeader::ENCODED_SIZE + 4, bytes.len() - 1] {
            assert!(CompactBlock::from_bytes(&bytes[..len]).is_err(), "len {len}");
        }
    }

    #[test]
    fn test_request_roundtrip() {
        let request = BlockTransactionsRequest {
            block_hash: [9; 32],
            indexes: vec![1, 2, 300, u16::MAX],
        };
        let bytes = request.to_bytes();
        assert_eq!(bytes.len(), 32 + 1 + 4 * 2);
        assert_eq!(BlockTransactionsRequest::from_bytes(&bytes).unwrap(), request);
    }

    #[test]
    fn test_response_from_request() {
        let block = make_block(4);
        let request = BlockTransactionsRequest {
            block_hash: block.hash(),
            indexes: vec![1, 3],
        };
        let response = BlockTransactions::from_request(&block, &request).unwrap();
        assert_eq!(
            response.transactions,
            vec![block.transactions[1].clone(), block.transactions[3].clone()]
        );

        let decoded = BlockTransactions::from_bytes(&response.to_bytes()).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_response_from_bad_request() {
        let block = make_block(2);
        let out_of_range = BlockTransactionsRequest {
            block_hash: block.hash(),
            indexes: vec![2],
        };
        assert!(matches!(
            BlockTransactions::from_request(&block, &out_of_range),
            Err(ReconstructionError::TxIndexOutOfRange { index: 2, count: 2 })
        ));

        let wrong_block = BlockTransactionsRequest {
            block_hash: [0; 32],
            indexes: vec![0],
        };
        assert!(matches!(
            BlockTransactions::from_request(&block, &wrong_block),
            Err(ReconstructionError::BlockHashMismatch { .. })
        ));
    }
}

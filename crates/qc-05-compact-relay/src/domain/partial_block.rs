//! # Partially Downloaded Block
//!
//! Reconstruction state for one compact block announcement.
//!
//! ```text
//! init(announcement, pool, extra)
//!     ├─ all slots filled ──► fill_block(vec![]) ──► Block
//!     └─ slots missing ─────► missing_request() ──► peer
//!                             fill_block(response) ──► Block
//! ```
//!
//! `fill_block` consumes the state: once it returns, successfully or not,
//! the attempt is over and a retry starts from a fresh announcement.
//!
//! ## Collisions
//!
//! Two distinct transactions whose short ids match the same announced
//! position are never guessed between. The slot is emptied and stays empty
//! for the rest of matching, so the peer has to send it.

use std::collections::HashMap;
use std::mem;

use shared_types::{Block, BlockHeader, Hash, TransactionRef};
use tracing::{debug, trace, warn};

use super::{
    check_announcement, BlockTransactionsRequest, CompactBlock, CompactRelayConfig, Provenance,
    ReconstructionStats, ShortId, ShortIdKeys,
};
use crate::error::ReconstructionError;
use crate::ports::outbound::{BlockValidator, TransactionPool};

/// Contents of one transaction position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Slot {
    Empty,
    Filled {
        tx: TransactionRef,
        provenance: Provenance,
    },
}

impl Slot {
    pub fn is_filled(&self) -> bool {
        matches!(self, Self::Filled { .. })
    }

    pub fn provenance(&self) -> Option<Provenance> {
        match self {
            Self::Filled { provenance, .. } => Some(*provenance),
            Self::Empty => None,
        }
    }
}

/// Which candidate has matched a short-id position so far.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Claim {
    Unclaimed,
    Claimed(Hash),
    /// Two distinct transactions matched. Terminal for this attempt.
    Ambiguous,
}

/// Per-announcement reconstruction state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartiallyDownloadedBlock {
    header: BlockHeader,
    block_hash: Hash,
    keys: ShortIdKeys,
    /// Announced short id per position; `None` for prefilled positions.
    short_ids: Vec<Option<ShortId>>,
    slots: Vec<Slot>,
    stats: ReconstructionStats,
}

impl PartiallyDownloadedBlock {
    /// Validate `compact` and fill every position the local sources can.
    ///
    /// The pool is scanned first, then at most
    /// `config.max_extra_transactions` entries of `extra`. A partial fill is
    /// a success; the caller asks the peer for [`Self::missing_request`].
    pub fn init<P>(
        compact: &CompactBlock,
        pool: &P,
        extra: &[(Hash, TransactionRef)],
        config: &CompactRelayConfig,
    ) -> Result<Self, ReconstructionError>
    where
        P: TransactionPool + ?Sized,
    {
        let keys = compact.keys();
        Self::init_with(compact, pool, extra, config, |hash| keys.short_id(hash))
    }

    /// [`Self::init`] with the fingerprint function supplied by the caller.
    pub(crate) fn init_with<P, F>(
        compact: &CompactBlock,
        pool: &P,
        extra: &[(Hash, TransactionRef)],
        config: &CompactRelayConfig,
        short_id_of: F,
    ) -> Result<Self, ReconstructionError>
    where
        P: TransactionPool + ?Sized,
        F: Fn(&Hash) -> ShortId,
    {
        check_announcement(compact, config)?;

        let block_hash = compact.block_hash();
        let count = compact.block_tx_count();
        let mut partial = Self {
            header: compact.header,
            block_hash,
            keys: compact.keys(),
            short_ids: vec![None; count],
            slots: vec![Slot::Empty; count],
            stats: ReconstructionStats::default(),
        };

        for entry in &compact.prefilled {
            // In range: checked by check_announcement
            partial.fill(
                entry.index as usize,
                TransactionRef::clone(&entry.tx),
                Provenance::Prefilled,
            );
        }

        // Open positions and short ids pair up exactly: prefilled positions
        // are distinct and below the count, which is their sum.
        let mut positions: HashMap<ShortId, usize> = HashMap::with_capacity(compact.short_ids.len());
        let open: Vec<usize> = (0..count).filter(|&i| !partial.slots[i].is_filled()).collect();
        for (&position, &short_id) in open.iter().zip(&compact.short_ids) {
            if positions.insert(short_id, position).is_some() {
                debug!(
                    block = %hex::encode(block_hash),
                    %short_id,
                    "Short id announced twice, full block required"
                );
                return Err(ReconstructionError::DuplicateShortId { short_id });
            }
            partial.short_ids[position] = Some(short_id);
        }

        let mut claims = vec![Claim::Unclaimed; count];

        for hash in pool.tx_hashes() {
            if let Some(&position) = positions.get(&short_id_of(&hash)) {
                partial.offer(&mut claims, position, hash, Provenance::Pool, || pool.get(&hash));
            }
        }

        for (hash, tx) in extra.iter().take(config.max_extra_transactions) {
            if let Some(&position) = positions.get(&short_id_of(hash)) {
                partial.offer(&mut claims, position, *hash, Provenance::Extra, || {
                    Some(TransactionRef::clone(tx))
                });
            }
        }

        debug!(
            block = %hex::encode(block_hash),
            tx_count = count,
            prefilled = partial.stats.prefilled,
            pool = partial.stats.pool,
            extra = partial.stats.extra,
            missing = partial.missing_count(),
            "Initialized compact block reconstruction"
        );

        Ok(partial)
    }

    /// Offer the transaction `hash` as the match for `position`.
    ///
    /// The first hash to match claims the position even when `fetch` misses
    /// (the pool dropped the transaction mid-scan). The slot then stays empty
    /// until the same hash is offered again; any other hash makes the
    /// position ambiguous.
    fn offer<F>(
        &mut self,
        claims: &mut [Claim],
        position: usize,
        hash: Hash,
        provenance: Provenance,
        fetch: F,
    ) where
        F: FnOnce() -> Option<TransactionRef>,
    {
        match claims[position] {
            Claim::Ambiguous => {}
            Claim::Claimed(existing) if existing == hash => {
                if !self.slots[position].is_filled() {
                    if let Some(tx) = fetch() {
                        self.fill(position, tx, provenance);
                    }
                }
            }
            Claim::Claimed(_) => {
                trace!(
                    block = %hex::encode(self.block_hash),
                    position,
                    "Ambiguous short id match, leaving slot empty"
                );
                let previous = mem::replace(&mut self.slots[position], Slot::Empty);
                if let Some(previous) = previous.provenance() {
                    self.stats.forget(previous);
                }
                claims[position] = Claim::Ambiguous;
            }
            Claim::Unclaimed => {
                claims[position] = Claim::Claimed(hash);
                if let Some(tx) = fetch() {
                    self.fill(position, tx, provenance);
                }
            }
        }
    }

    fn fill(&mut self, position: usize, tx: TransactionRef, provenance: Provenance) {
        self.slots[position] = Slot::Filled { tx, provenance };
        self.stats.record(provenance);
    }

    /// `false` for empty or out-of-range positions.
    pub fn is_tx_available(&self, position: usize) -> bool {
        self.slots.get(position).is_some_and(Slot::is_filled)
    }

    pub fn block_tx_count(&self) -> usize {
        self.slots.len()
    }

    pub fn missing_count(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.is_filled()).count()
    }

    /// Empty positions, ascending.
    pub fn missing_indices(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.is_filled())
            .map(|(position, _)| position)
            .collect()
    }

    /// Follow-up request for every empty position.
    ///
    /// Fails with [`ReconstructionError::MissingIndexNotAddressable`] when an
    /// empty position does not fit the 16-bit request index.
    pub fn missing_request(&self) -> Result<BlockTransactionsRequest, ReconstructionError> {
        let indexes = self
            .missing_indices()
            .into_iter()
            .map(|index| {
                u16::try_from(index)
                    .map_err(|_| ReconstructionError::MissingIndexNotAddressable { index })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BlockTransactionsRequest {
            block_hash: self.block_hash,
            indexes,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Slot::is_filled)
    }

    pub fn slot(&self, position: usize) -> Option<&Slot> {
        self.slots.get(position)
    }

    pub fn stats(&self) -> ReconstructionStats {
        self.stats
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn block_hash(&self) -> Hash {
        self.block_hash
    }

    pub fn keys(&self) -> ShortIdKeys {
        self.keys
    }

    /// Merge the peer's transactions for the empty positions, in position
    /// order, verify them and assemble the block.
    ///
    /// Nothing is applied unless `missing` has exactly one transaction per
    /// empty position. `validator` only sees a block whose every supplied
    /// transaction matched its announced short id.
    pub fn fill_block<V>(
        mut self,
        missing: Vec<TransactionRef>,
        block_height: u64,
        validator: &V,
    ) -> Result<Block, ReconstructionError>
    where
        V: BlockValidator + ?Sized,
    {
        let expected = self.missing_count();
        if missing.len() != expected {
            warn!(
                block = %hex::encode(self.block_hash),
                expected,
                supplied = missing.len(),
                "Peer supplied wrong number of transactions"
            );
            return Err(ReconstructionError::MissingCountMismatch {
                expected,
                supplied: missing.len(),
            });
        }

        let mut supplied = missing.into_iter();
        for slot in self.slots.iter_mut().filter(|slot| !slot.is_filled()) {
            let tx = supplied
                .next()
                .ok_or(ReconstructionError::Internal("supplied transactions exhausted"))?;
            *slot = Slot::Filled {
                tx,
                provenance: Provenance::Supplied,
            };
        }

        for (position, slot) in self.slots.iter().enumerate() {
            let Slot::Filled {
                tx,
                provenance: Provenance::Supplied,
            } = slot
            else {
                continue;
            };
            let announced = self.short_ids[position]
                .ok_or(ReconstructionError::Internal("supplied position without a short id"))?;
            if self.keys.short_id(&tx.hash()) != announced {
                warn!(
                    block = %hex::encode(self.block_hash),
                    position,
                    short_id = %announced,
                    "Supplied transaction does not match announced short id"
                );
                return Err(ReconstructionError::ShortIdMismatch {
                    index: position,
                    expected: announced,
                });
            }
        }

        let transactions = self
            .slots
            .into_iter()
            .map(|slot| match slot {
                Slot::Filled { tx, .. } => Ok(tx),
                Slot::Empty => Err(ReconstructionError::Internal("empty slot after fill")),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let block = Block::new(self.header, transactions);

        if !validator.check_block(&block, block_height) {
            warn!(
                block = %hex::encode(self.block_hash),
                block_height,
                "Reconstructed block failed validation"
            );
            return Err(ReconstructionError::CheckBlockFailed {
                block_hash: self.block_hash,
            });
        }

        debug!(
            block = %hex::encode(self.block_hash),
            tx_count = block.transactions.len(),
            prefilled = self.stats.prefilled,
            pool = self.stats.pool,
            extra = self.stats.extra,
            requested = expected,
            "Reconstructed block"
        );

        Ok(block)
    }
}

//! Value objects for compact block relay configuration and state.

use serde::{Deserialize, Serialize};
use shared_types::{Hash, PeerId, Transaction};
use std::collections::{HashMap, VecDeque};

use super::PartiallyDownloadedBlock;
use crate::error::ConfigError;

/// Compact block relay configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactRelayConfig {
    /// Maximum block size in bytes. Bounds the transaction count an
    /// announcement may claim.
    pub max_block_size_bytes: usize,
    /// Maximum number of extra-cache entries scanned per announcement.
    pub max_extra_transactions: usize,
    /// Maximum reconstructions tracked at once by the relay service.
    pub max_in_flight: usize,
}

impl Default for CompactRelayConfig {
    fn default() -> Self {
        Self {
            max_block_size_bytes: 10 * 1024 * 1024, // 10 MB
            max_extra_transactions: 100,
            max_in_flight: 16,
        }
    }
}

impl CompactRelayConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_block_size_bytes == 0 {
            return Err(ConfigError::ZeroValue("max_block_size_bytes"));
        }
        if self.max_in_flight == 0 {
            return Err(ConfigError::ZeroValue("max_in_flight"));
        }
        Ok(())
    }

    /// Largest transaction count a block within the size limit can hold.
    pub fn max_block_transactions(&self) -> usize {
        self.max_block_size_bytes / Transaction::MIN_ENCODED_SIZE
    }
}

/// Where a filled slot's transaction came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Provenance {
    /// Sent in full inside the announcement.
    Prefilled,
    /// Matched against the local transaction pool.
    Pool,
    /// Matched against the extra transaction cache.
    Extra,
    /// Sent by the peer in a follow-up response.
    Supplied,
}

/// Per-announcement match counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconstructionStats {
    pub prefilled: usize,
    pub pool: usize,
    pub extra: usize,
}

impl ReconstructionStats {
    pub fn filled(&self) -> usize {
        self.prefilled + self.pool + self.extra
    }

    pub(crate) fn record(&mut self, provenance: Provenance) {
        if let Some(counter) = self.counter_mut(provenance) {
            *counter += 1;
        }
    }

    pub(crate) fn forget(&mut self, provenance: Provenance) {
        if let Some(counter) = self.counter_mut(provenance) {
            *counter = counter.saturating_sub(1);
        }
    }

    fn counter_mut(&mut self, provenance: Provenance) -> Option<&mut usize> {
        match provenance {
            Provenance::Prefilled => Some(&mut self.prefilled),
            Provenance::Pool => Some(&mut self.pool),
            Provenance::Extra => Some(&mut self.extra),
            Provenance::Supplied => None,
        }
    }
}

/// Relay counters for monitoring.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelayMetrics {
    /// Blocks reconstructed and accepted by validation.
    pub blocks_reconstructed: u64,
    /// Of those, blocks that needed no follow-up round.
    pub reconstructed_without_request: u64,
    /// Transactions requested from peers.
    pub transactions_requested: u64,
    pub prefilled_matches: u64,
    pub pool_matches: u64,
    pub extra_matches: u64,
    pub invalid: u64,
    pub failed: u64,
    pub check_block_failed: u64,
}

/// Key of an in-flight reconstruction: one attempt per peer per block.
pub type AttemptKey = (PeerId, Hash);

/// Bounded set of in-flight reconstructions, evicting the oldest.
pub struct InFlightAttempts {
    attempts: HashMap<AttemptKey, PartiallyDownloadedBlock>,
    insertion_order: VecDeque<AttemptKey>,
    max_size: usize,
}

impl InFlightAttempts {
    pub fn new(max_size: usize) -> Self {
        Self {
            attempts: HashMap::with_capacity(max_size),
            insertion_order: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// Track `partial` under `key`, replacing an older attempt for the same
    /// key. Returns the key evicted to make room, if any.
    pub fn insert(
        &mut self,
        key: AttemptKey,
        partial: PartiallyDownloadedBlock,
    ) -> Option<AttemptKey> {
        if self.attempts.insert(key, partial).is_some() {
            self.insertion_order.retain(|k| *k != key);
            self.insertion_order.push_back(key);
            return None;
        }
        self.insertion_order.push_back(key);

        if self.attempts.len() > self.max_size {
            if let Some(oldest) = self.insertion_order.pop_front() {
                self.attempts.remove(&oldest);
                return Some(oldest);
            }
        }
        None
    }

    /// Take ownership of the attempt for `key`.
    pub fn take(&mut self, key: &AttemptKey) -> Option<PartiallyDownloadedBlock> {
        let partial = self.attempts.remove(key)?;
        self.insertion_order.retain(|k| k != key);
        Some(partial)
    }

    pub fn contains(&self, key: &AttemptKey) -> bool {
        self.attempts.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}

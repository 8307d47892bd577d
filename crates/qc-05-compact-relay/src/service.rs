//! # Compact Relay Service
//!
//! Drives [`PartiallyDownloadedBlock`] through the message exchange with
//! peers.
//!
//! ## Architecture
//!
//! This service implements both inbound ports:
//! - [`CompactRelayApi`]: Announcing locally validated blocks
//! - [`CompactBlockReceiver`]: Handling compact block messages from peers
//!
//! It depends on four outbound ports (implemented by adapters in node-runtime):
//! - [`TransactionPool`]: Pool lookup for reconstruction
//! - [`ExtraTransactionSource`]: Recently seen transactions outside the pool
//! - [`BlockValidator`]: Full validation of reconstructed blocks
//! - [`PeerNetwork`]: Sending serialized messages
//!
//! ## Flow
//!
//! ```text
//! CompactBlock ──► init ──┬─ complete ──► validate ──► Completed
//!                         └─ partial ──► GetBlockTxn ──► (in flight)
//! BlockTxn ──► take attempt ──► fill_block ──► validate ──► Completed
//! ```
//!
//! Peer penalties are suggested through [`RelayOutcome::action`], never
//! applied here.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::{
    BlockTransactions, BlockTransactionsRequest, CompactBlock, CompactRelayConfig,
    InFlightAttempts, PartiallyDownloadedBlock, RelayMetrics,
};
use crate::error::{ConfigError, ReadStatus, ReconstructionError, RelayError};
use crate::ports::inbound::{CompactBlockReceiver, CompactRelayApi, RelayOutcome};
use crate::ports::outbound::{
    BlockValidator, ExtraTransactionSource, NetworkMessage, PeerNetwork, TransactionPool,
};
use shared_types::{Block, Hash, PeerId, TransactionRef, WireDecode, WireEncode};

/// Compact Relay Service.
///
/// ## Thread Safety
///
/// This service is thread-safe and can be shared across tasks via `Arc`.
/// Each attempt is owned by exactly one handler call at a time: it is taken
/// out of the in-flight set before `fill_block` runs.
pub struct CompactRelayService<P, E, V, N>
where
    P: TransactionPool,
    E: ExtraTransactionSource,
    V: BlockValidator,
    N: PeerNetwork,
{
    config: CompactRelayConfig,
    /// Attempts waiting for a `BlockTxn`, keyed by (peer, block hash).
    in_flight: Mutex<InFlightAttempts>,
    pool: Arc<P>,
    extra: Arc<E>,
    validator: Arc<V>,
    network: Arc<N>,
    metrics: RwLock<RelayMetrics>,
}

impl<P, E, V, N> CompactRelayService<P, E, V, N>
where
    P: TransactionPool,
    E: ExtraTransactionSource,
    V: BlockValidator,
    N: PeerNetwork,
{
    pub fn new(
        config: CompactRelayConfig,
        pool: Arc<P>,
        extra: Arc<E>,
        validator: Arc<V>,
        network: Arc<N>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            in_flight: Mutex::new(InFlightAttempts::new(config.max_in_flight)),
            config,
            pool,
            extra,
            validator,
            network,
            metrics: RwLock::new(RelayMetrics::default()),
        })
    }

    pub fn config(&self) -> &CompactRelayConfig {
        &self.config
    }

    /// Number of attempts waiting for a peer's transactions.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Whether an attempt for `block_hash` from `peer` is waiting.
    pub fn is_in_flight(&self, peer: PeerId, block_hash: Hash) -> bool {
        self.in_flight.lock().contains(&(peer, block_hash))
    }

    /// Assemble and validate; shared tail of both reconstruction paths.
    fn finish(
        &self,
        partial: PartiallyDownloadedBlock,
        missing: Vec<TransactionRef>,
        requested: bool,
    ) -> RelayOutcome {
        let block_hash = partial.block_hash();
        let height = partial.header().height;
        let stats = partial.stats();

        match partial.fill_block(missing, height, self.validator.as_ref()) {
            Ok(block) => {
                let mut metrics = self.metrics.write();
                metrics.blocks_reconstructed += 1;
                if !requested {
                    metrics.reconstructed_without_request += 1;
                }
                metrics.prefilled_matches += stats.prefilled as u64;
                metrics.pool_matches += stats.pool as u64;
                metrics.extra_matches += stats.extra as u64;
                RelayOutcome::Completed { block }
            }
            Err(error) => self.reject(block_hash, error),
        }
    }

    fn reject(&self, block_hash: Hash, error: ReconstructionError) -> RelayOutcome {
        let status = error.status();
        {
            let mut metrics = self.metrics.write();
            match status {
                ReadStatus::Invalid => metrics.invalid += 1,
                ReadStatus::Failed => metrics.failed += 1,
                ReadStatus::CheckBlockFailed => metrics.check_block_failed += 1,
                ReadStatus::Ok => {}
            }
        }

        if status.is_peer_fault() {
            warn!(
                block = %hex::encode(block_hash),
                ?status,
                %error,
                "Compact block rejected"
            );
        } else {
            debug!(
                block = %hex::encode(block_hash),
                ?status,
                %error,
                "Compact block reconstruction abandoned"
            );
        }

        RelayOutcome::Rejected { block_hash, error }
    }
}

impl<P, E, V, N> CompactRelayApi for CompactRelayService<P, E, V, N>
where
    P: TransactionPool,
    E: ExtraTransactionSource,
    V: BlockValidator,
    N: PeerNetwork,
{
    fn announce_block(&self, peers: &[PeerId], block: &Block) -> Result<usize, RelayError> {
        let compact = CompactBlock::from_block_with_random_nonce(block, &[])?;
        let data = compact.to_bytes();

        let mut reached = 0;
        for peer in peers {
            match self
                .network
                .send_to_peer(*peer, NetworkMessage::CompactBlock { data: data.clone() })
            {
                Ok(()) => reached += 1,
                Err(error) => warn!(
                    block = %hex::encode(compact.block_hash()),
                    peer = %hex::encode(peer.0),
                    %error,
                    "Failed to announce compact block"
                ),
            }
        }

        debug!(
            block = %hex::encode(compact.block_hash()),
            short_ids = compact.short_ids.len(),
            prefilled = compact.prefilled.len(),
            reached,
            "Announced compact block"
        );
        Ok(reached)
    }

    fn abandon(&self, peer: PeerId, block_hash: Hash) -> bool {
        self.in_flight.lock().take(&(peer, block_hash)).is_some()
    }

    fn get_relay_metrics(&self) -> RelayMetrics {
        self.metrics.read().clone()
    }
}

impl<P, E, V, N> CompactBlockReceiver for CompactRelayService<P, E, V, N>
where
    P: TransactionPool,
    E: ExtraTransactionSource,
    V: BlockValidator,
    N: PeerNetwork,
{
    fn handle_compact_block(&self, peer: PeerId, data: &[u8]) -> Result<RelayOutcome, RelayError> {
        let compact = CompactBlock::from_bytes(data)?;
        let block_hash = compact.block_hash();

        let extra = self.extra.extra_transactions();
        let partial =
            match PartiallyDownloadedBlock::init(&compact, self.pool.as_ref(), &extra, &self.config) {
                Ok(partial) => partial,
                Err(error) => return Ok(self.reject(block_hash, error)),
            };

        if partial.is_complete() {
            return Ok(self.finish(partial, Vec::new(), false));
        }

        let request = match partial.missing_request() {
            Ok(request) => request,
            Err(error) => return Ok(self.reject(block_hash, error)),
        };
        let missing = request.indexes.len();

        self.network.send_to_peer(
            peer,
            NetworkMessage::GetBlockTxn {
                data: request.to_bytes(),
            },
        )?;
        self.metrics.write().transactions_requested += missing as u64;

        if let Some((evicted_peer, evicted_hash)) = self.in_flight.lock().insert((peer, block_hash), partial) {
            debug!(
                block = %hex::encode(evicted_hash),
                peer = %hex::encode(evicted_peer.0),
                "Dropped oldest in-flight reconstruction"
            );
        }

        debug!(
            block = %hex::encode(block_hash),
            peer = %hex::encode(peer.0),
            missing,
            "Requested missing transactions"
        );
        Ok(RelayOutcome::AwaitingTransactions {
            block_hash,
            missing,
        })
    }

    fn handle_block_txn(&self, peer: PeerId, data: &[u8]) -> Result<RelayOutcome, RelayError> {
        let response = BlockTransactions::from_bytes(data)?;
        let block_hash = response.block_hash;

        let partial = self
            .in_flight
            .lock()
            .take(&(peer, block_hash))
            .ok_or(RelayError::UnknownBlock { block_hash })?;

        Ok(self.finish(partial, response.transactions, true))
    }

    fn handle_get_block_txn(
        &self,
        peer: PeerId,
        data: &[u8],
        block: &Block,
    ) -> Result<(), RelayError> {
        let request = BlockTransactionsRequest::from_bytes(data)?;
        let response = BlockTransactions::from_request(block, &request)?;

        debug!(
            block = %hex::encode(response.block_hash),
            peer = %hex::encode(peer.0),
            transactions = response.transactions.len(),
            "Answering transaction request"
        );
        self.network.send_to_peer(
            peer,
            NetworkMessage::BlockTxn {
                data: response.to_bytes(),
            },
        )
    }
}

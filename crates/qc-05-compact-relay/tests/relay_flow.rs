//! # End-to-End Relay Tests
//!
//! Two relay services exchange real serialized messages:
//!
//! ```text
//! [Sender] ──CompactBlock──→ [Receiver]
//!    ↑                           │ pool lookup
//!    └───────GetBlockTxn─────────┤
//!    ────────BlockTxn───────────→│
//!                                ↓
//!                          Completed(block)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use qc_05_compact_relay::ports::outbound::{BlockValidator, NetworkMessage, PeerNetwork};
use qc_05_compact_relay::{
    CompactBlockReceiver, CompactRelayApi, CompactRelayConfig, CompactRelayService, PeerAction,
    ReadStatus, RelayError, RelayOutcome,
};
use shared_types::{Block, BlockHeader, Hash, NodeId, PeerId, Transaction, TransactionRef};

// =============================================================================
// TEST FIXTURES
// =============================================================================

#[derive(Default)]
struct RecordingNetwork {
    outbox: Mutex<Vec<(PeerId, NetworkMessage)>>,
}

impl RecordingNetwork {
    fn drain(&self) -> Vec<(PeerId, NetworkMessage)> {
        std::mem::take(&mut *self.outbox.lock())
    }
}

impl PeerNetwork for RecordingNetwork {
    fn send_to_peer(&self, peer_id: PeerId, message: NetworkMessage) -> Result<(), RelayError> {
        self.outbox.lock().push((peer_id, message));
        Ok(())
    }
}

/// Accepts blocks whose coinbase has no recipient.
struct CoinbaseRule;

impl BlockValidator for CoinbaseRule {
    fn check_block(&self, block: &Block, height: u64) -> bool {
        height == block.header.height && block.coinbase().is_some_and(|tx| tx.to.is_none())
    }
}

type Relay = CompactRelayService<
    HashMap<Hash, TransactionRef>,
    Vec<(Hash, TransactionRef)>,
    CoinbaseRule,
    RecordingNetwork,
>;

struct Node {
    id: PeerId,
    relay: Relay,
    network: Arc<RecordingNetwork>,
}

impl Node {
    fn new(byte: u8, pool: &[TransactionRef], extra: &[TransactionRef]) -> Self {
        let network = Arc::new(RecordingNetwork::default());
        let relay = CompactRelayService::new(
            CompactRelayConfig::default(),
            Arc::new(pool.iter().map(|tx| (tx.hash(), Arc::clone(tx))).collect()),
            Arc::new(extra.iter().map(|tx| (tx.hash(), Arc::clone(tx))).collect()),
            Arc::new(CoinbaseRule),
            Arc::clone(&network),
        )
        .unwrap();
        Self {
            id: NodeId([byte; 32]),
            relay,
            network,
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn transfer(nonce: u64) -> TransactionRef {
    Arc::new(Transaction {
        from: [0x10; 32],
        to: Some([0x20; 32]),
        value: 5 * nonce,
        nonce,
        data: nonce.to_le_bytes().to_vec(),
        signature: [0x30; 64],
    })
}

fn coinbase() -> TransactionRef {
    Arc::new(Transaction {
        from: [0; 32],
        to: None,
        value: 50,
        nonce: 0,
        data: b"coinbase".to_vec(),
        signature: [0; 64],
    })
}

fn make_block(transfers: u64) -> Block {
    let header = BlockHeader {
        version: 1,
        height: 1_000,
        parent_hash: [0x99; 32],
        timestamp: 1_701_705_600,
        proposer: [0x77; 32],
        ..Default::default()
    };
    let mut transactions = vec![coinbase()];
    transactions.extend((1..=transfers).map(transfer));
    Block::new(header, transactions)
}

/// Deliver every queued message between `sender` (holding `block`) and
/// `receiver` until the exchange settles. Returns the receiver's outcomes.
fn run_exchange(sender: &Node, receiver: &Node, block: &Block) -> Vec<RelayOutcome> {
    let mut outcomes = Vec::new();
    loop {
        let mut delivered = false;
        for (to, message) in sender.network.drain() {
            assert_eq!(to, receiver.id);
            delivered = true;
            let outcome = match message {
                NetworkMessage::CompactBlock { data } => {
                    receiver.relay.handle_compact_block(sender.id, &data)
                }
                NetworkMessage::BlockTxn { data } => receiver.relay.handle_block_txn(sender.id, &data),
                NetworkMessage::GetBlockTxn { .. } => panic!("sender never requests"),
            };
            outcomes.push(outcome.unwrap());
        }
        for (to, message) in receiver.network.drain() {
            assert_eq!(to, sender.id);
            delivered = true;
            let NetworkMessage::GetBlockTxn { data } = message else {
                panic!("receiver only requests, got {message:?}");
            };
            sender
                .relay
                .handle_get_block_txn(receiver.id, &data, block)
                .unwrap();
        }
        if !delivered {
            return outcomes;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[test]
fn test_block_rebuilt_entirely_from_pool() {
    init_tracing();
    let block = make_block(20);
    let sender = Node::new(1, &[], &[]);
    let receiver = Node::new(2, &block.transactions[1..], &[]);

    assert_eq!(sender.relay.announce_block(&[receiver.id], &block).unwrap(), 1);
    let outcomes = run_exchange(&sender, &receiver, &block);

    assert_eq!(outcomes, vec![RelayOutcome::Completed { block: block.clone() }]);
    let metrics = receiver.relay.get_relay_metrics();
    assert_eq!(metrics.reconstructed_without_request, 1);
    assert_eq!(metrics.pool_matches, 20);
    assert_eq!(metrics.transactions_requested, 0);
}

#[test]
fn test_missing_transactions_fetched_from_sender() {
    init_tracing();
    let block = make_block(10);
    let sender = Node::new(1, &[], &[]);
    // Every other transfer is known locally, one more sits in the extra cache
    let pool: Vec<TransactionRef> = block.transactions[1..].iter().step_by(2).cloned().collect();
    let receiver = Node::new(2, &pool, &block.transactions[2..3]);

    sender.relay.announce_block(&[receiver.id], &block).unwrap();
    let outcomes = run_exchange(&sender, &receiver, &block);

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].status(), ReadStatus::Ok);
    assert!(matches!(
        outcomes[0],
        RelayOutcome::AwaitingTransactions { missing: 4, .. }
    ));
    assert_eq!(outcomes[1], RelayOutcome::Completed { block: block.clone() });

    let metrics = receiver.relay.get_relay_metrics();
    assert_eq!(metrics.blocks_reconstructed, 1);
    assert_eq!(metrics.pool_matches, 5);
    assert_eq!(metrics.extra_matches, 1);
    assert_eq!(metrics.transactions_requested, 4);
    assert_eq!(receiver.relay.in_flight_count(), 0);
}

#[test]
fn test_same_block_from_two_peers_is_tracked_separately() {
    init_tracing();
    let block = make_block(3);
    let first = Node::new(1, &[], &[]);
    let second = Node::new(3, &[], &[]);
    let receiver = Node::new(2, &[], &[]);

    first.relay.announce_block(&[receiver.id], &block).unwrap();
    second.relay.announce_block(&[receiver.id], &block).unwrap();
    for sender in [&first, &second] {
        for (_, message) in sender.network.drain() {
            let NetworkMessage::CompactBlock { data } = message else {
                unreachable!()
            };
            receiver.relay.handle_compact_block(sender.id, &data).unwrap();
        }
    }

    assert_eq!(receiver.relay.in_flight_count(), 2);
    assert!(receiver.relay.abandon(first.id, block.hash()));
    assert!(receiver.relay.is_in_flight(second.id, block.hash()));
}

#[test]
fn test_forged_response_is_peer_fault() {
    init_tracing();
    let block = make_block(2);
    let sender = Node::new(1, &[], &[]);
    let receiver = Node::new(2, &block.transactions[1..2], &[]);

    sender.relay.announce_block(&[receiver.id], &block).unwrap();
    let (_, announcement) = sender.network.drain().remove(0);
    let NetworkMessage::CompactBlock { data } = announcement else {
        unreachable!()
    };
    receiver.relay.handle_compact_block(sender.id, &data).unwrap();

    let forged = qc_05_compact_relay::BlockTransactions {
        block_hash: block.hash(),
        transactions: vec![transfer(999)],
    };
    let outcome = receiver
        .relay
        .handle_block_txn(sender.id, &shared_types::WireEncode::to_bytes(&forged))
        .unwrap();

    assert_eq!(outcome.status(), ReadStatus::Invalid);
    assert_eq!(outcome.action(), PeerAction::Misbehaving);
}

#[test]
fn test_invalid_block_reconstructed_is_check_block_failed() {
    init_tracing();
    // Coinbase with a recipient breaks the validator's rule
    let mut block = make_block(2);
    block.transactions[0] = transfer(0);
    let sender = Node::new(1, &[], &[]);
    let receiver = Node::new(2, &block.transactions[1..], &[]);

    sender.relay.announce_block(&[receiver.id], &block).unwrap();
    let outcomes = run_exchange(&sender, &receiver, &block);

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status(), ReadStatus::CheckBlockFailed);
    assert_eq!(outcomes[0].action(), PeerAction::Disconnect);
}

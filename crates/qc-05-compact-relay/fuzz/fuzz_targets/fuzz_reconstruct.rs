//! Fuzz target for reconstruction from an adversarial announcement.
//!
//! The pool holds whatever the fuzzer supplies; the announcement and the
//! follow-up response are raw bytes. Nothing here may panic.
//!
//! ## Running
//!
//! ```bash
//! cd crates/qc-05-compact-relay
//! cargo +nightly fuzz run fuzz_reconstruct
//! ```

#![no_main]

use std::collections::HashMap;
use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use qc_05_compact_relay::ports::outbound::BlockValidator;
use qc_05_compact_relay::{
    BlockTransactions, CompactBlock, CompactRelayConfig, PartiallyDownloadedBlock,
};
use shared_types::{Block, Hash, Transaction, TransactionRef, WireDecode};

#[derive(Debug, arbitrary::Arbitrary)]
struct FuzzInput {
    announcement: Vec<u8>,
    pool: Vec<PoolTx>,
    response: Vec<u8>,
}

#[derive(Debug, arbitrary::Arbitrary)]
struct PoolTx {
    from: [u8; 32],
    value: u64,
    nonce: u64,
    data: Vec<u8>,
}

struct AcceptAll;

impl BlockValidator for AcceptAll {
    fn check_block(&self, _block: &Block, _height: u64) -> bool {
        true
    }
}

fuzz_target!(|input: FuzzInput| {
    let Ok(compact) = CompactBlock::from_bytes(&input.announcement) else {
        return;
    };
    let pool: HashMap<Hash, TransactionRef> = input
        .pool
        .into_iter()
        .map(|tx| {
            Arc::new(Transaction {
                from: tx.from,
                to: None,
                value: tx.value,
                nonce: tx.nonce,
                data: tx.data,
                signature: [0; 64],
            })
        })
        .map(|tx| (tx.hash(), tx))
        .collect();

    let config = CompactRelayConfig {
        max_block_size_bytes: 1 << 20,
        ..Default::default()
    };
    let Ok(partial) = PartiallyDownloadedBlock::init(&compact, &pool, &[], &config) else {
        return;
    };
    assert!(partial.missing_count() <= compact.block_tx_count());

    let supplied = BlockTransactions::from_bytes(&input.response)
        .map(|response| response.transactions)
        .unwrap_or_default();
    if let Ok(block) = partial.fill_block(supplied, compact.header.height, &AcceptAll) {
        assert_eq!(block.transactions.len(), compact.block_tx_count());
        assert_eq!(block.hash(), compact.block_hash());
    }
});

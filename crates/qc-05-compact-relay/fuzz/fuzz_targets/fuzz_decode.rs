//! Fuzz target for the compact block wire decoders.
//!
//! ## Running
//!
//! ```bash
//! cd crates/qc-05-compact-relay
//! cargo +nightly fuzz run fuzz_decode
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use qc_05_compact_relay::{BlockTransactions, BlockTransactionsRequest, CompactBlock};
use shared_types::{WireDecode, WireEncode};

fuzz_target!(|data: &[u8]| {
    // Anything that decodes must encode back to the same bytes
    if let Ok(compact) = CompactBlock::from_bytes(data) {
        assert_eq!(compact.to_bytes(), data);
    }
    if let Ok(request) = BlockTransactionsRequest::from_bytes(data) {
        assert_eq!(request.to_bytes(), data);
    }
    if let Ok(response) = BlockTransactions::from_bytes(data) {
        assert_eq!(response.to_bytes(), data);
    }
});

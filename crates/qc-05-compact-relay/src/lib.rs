//! # Compact Block Relay Subsystem (qc-05)
//!
//! Relays blocks as compact announcements and rebuilds them from the local
//! transaction pool, asking the sending peer only for what is missing.
//!
//! ## Architecture Role
//!
//! ```text
//! [Peer] ──CompactBlock──→ [Compact Relay (5)] ──lookup──→ [Mempool (6)]
//!    ↑                            │
//!    └──────GetBlockTxn───────────┤
//!    ───────BlockTxn─────────────→│
//!                                 ↓ assembled block
//!                           [Block Validation]
//! ```
//!
//! ## Outcomes
//!
//! Every step classifies into [`ReadStatus`]: `Ok`, `Invalid` (peer fault),
//! `Failed` (local, fall back to a full block) or `CheckBlockFailed` (the
//! block itself is bad). Malformed bytes surface as [`shared_types::WireError`]
//! before any reconstruction state exists.

pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use domain::*;
pub use error::{BuildError, ConfigError, ReadStatus, ReconstructionError, RelayError};
pub use ports::inbound::{CompactBlockReceiver, CompactRelayApi, PeerAction, RelayOutcome};
pub use service::CompactRelayService;

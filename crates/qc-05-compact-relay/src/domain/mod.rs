//! # Domain Layer for Compact Block Relay
//!
//! Pure reconstruction logic with no I/O. This is the innermost layer
//! of the hexagonal architecture.
//!
//! ## Contents
//!
//! - **short_id**: Keyed 48-bit transaction fingerprints (`ShortId`, `ShortIdKeys`)
//! - **entities**: Wire messages (`CompactBlock`, `BlockTransactionsRequest`, `BlockTransactions`)
//! - **invariants**: Structural checks on incoming announcements
//! - **partial_block**: Per-announcement reconstruction state (`PartiallyDownloadedBlock`)
//! - **value_objects**: Configuration, provenance, stats and in-flight tracking
//!
//! ## Design Principles
//!
//! 1. **No I/O**: Collaborators are reached only through `ports::outbound`
//! 2. **Synchronous**: Every operation is bounded by pool size plus block size
//! 3. **Testable**: All logic can be unit tested with in-memory collaborators

mod entities;
mod invariants;
mod partial_block;
mod short_id;
mod value_objects;

pub use entities::*;
pub use invariants::*;
pub use partial_block::*;
pub use short_id::*;
pub use value_objects::*;

//! # Shared Types Crate
//!
//! Chain entities and the wire encoding every subsystem agrees on.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: `BlockHeader`, `Transaction` and `Block`
//!   are defined once and shared by reference (`TransactionRef`).
//! - **Bit-exact Wire Forms**: all integers little-endian, counts as
//!   canonical compact sizes, decoders never trust a declared length.

pub mod entities;
pub mod errors;
pub mod wire;

pub use entities::*;
pub use errors::*;
pub use wire::{WireDecode, WireEncode, WireReader};

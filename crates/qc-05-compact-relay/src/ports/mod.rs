//! Ports Layer
//!
//! - Driving Ports (inbound): what the network layer calls
//! - Driven Ports (outbound): pool, extra cache, validation and peers

pub mod inbound;
pub mod outbound;

pub use inbound::{CompactBlockReceiver, CompactRelayApi, PeerAction, RelayOutcome};
pub use outbound::{
    BlockValidator, ExtraTransactionSource, NetworkMessage, PeerNetwork, TransactionPool,
};

//! Structural invariants of a compact block announcement.
//!
//! Checked before any matching work is done. Every violation here is the
//! sending peer's fault.

use super::{CompactBlock, CompactRelayConfig};
use crate::error::ReconstructionError;

/// INVARIANT-1: Non-null header
/// A null header never identifies a block.
pub fn invariant_header_present(compact: &CompactBlock) -> Result<(), ReconstructionError> {
    if compact.header.is_null() {
        return Err(ReconstructionError::NullHeader);
    }
    Ok(())
}

/// INVARIANT-2: Transaction count
/// At least one transaction, and no more than a block within the size limit
/// can hold.
pub fn invariant_tx_count(
    compact: &CompactBlock,
    config: &CompactRelayConfig,
) -> Result<(), ReconstructionError> {
    let count = compact.block_tx_count();
    if count == 0 {
        return Err(ReconstructionError::EmptyBlock);
    }
    let max = config.max_block_transactions();
    if count > max {
        return Err(ReconstructionError::TooManyTransactions { count, max });
    }
    Ok(())
}

/// INVARIANT-3: Prefilled positions
/// Strictly increasing (so never repeated) and inside the block.
pub fn invariant_prefilled_positions(compact: &CompactBlock) -> Result<(), ReconstructionError> {
    let count = compact.block_tx_count();
    let mut previous: Option<u32> = None;
    for entry in &compact.prefilled {
        if let Some(prev) = previous {
            if entry.index <= prev {
                return Err(ReconstructionError::PrefilledOutOfOrder {
                    index: entry.index,
                    previous: prev,
                });
            }
        }
        if entry.index as usize >= count {
            return Err(ReconstructionError::PrefilledOutOfRange {
                index: entry.index,
                count,
            });
        }
        previous = Some(entry.index);
    }
    Ok(())
}

/// Check all invariants for an incoming announcement.
pub fn check_announcement(
    compact: &CompactBlock,
    config: &CompactRelayConfig,
) -> Result<(), ReconstructionError> {
    invariant_header_present(compact)?;
    invariant_tx_count(compact, config)?;
    invariant_prefilled_positions(compact)
}

//! Choosing the next block to checkpoint.
//!
//! Selection is by depth in the main chain, not by block time: the newest
//! block with at least `min_depth` blocks on top of it, or genesis on a
//! shorter chain.

use phx_core::chain_index::{BlockHandle, ChainIndex};
use phx_core::types::Hash256;

/// Walk back from `best` to the first block buried `min_depth` deep.
///
/// Returns `None` only if `best` is not a valid handle.
pub fn select_candidate<I>(index: &I, best: BlockHandle, min_depth: u32) -> Option<Hash256>
where
    I: ChainIndex + ?Sized,
{
    let best_height = index.height(best)?;
    let mut current = best;
    let mut height = best_height;
    while u64::from(height) + u64::from(min_depth) > u64::from(best_height) {
        match index.parent(current) {
            Some(parent) => {
                current = parent;
                height = index.height(current)?;
            }
            None => break,
        }
    }
    index.hash(current)
}

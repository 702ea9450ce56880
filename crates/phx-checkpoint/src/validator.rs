//! Ancestry checks between checkpoints and blocks.
//!
//! Both checks walk previous-block links down to a target height and
//! compare hashes there. A walk that falls off the index means the index is
//! damaged, which is reported separately from a protocol conflict.

use phx_core::chain_index::{BlockHandle, ChainIndex};
use phx_core::types::Hash256;

use crate::error::ValidationError;

/// How a consistent candidate relates to the accepted checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// The candidate is the accepted block or one of its ancestors. Nothing
    /// to do.
    AncestorOrEqual,
    /// The candidate extends the accepted checkpoint.
    Descendant,
}

/// Decide whether `candidate` may replace `accepted`.
///
/// Both blocks must be indexed.
///
/// # Errors
///
/// - [`ValidationError::DivergesFromAccepted`] if the candidate is at or
///   below the accepted height but not on its ancestry.
/// - [`ValidationError::NotDescendantOfAccepted`] if the candidate is
///   higher but does not descend from the accepted block.
/// - [`ValidationError::ChainIndexCorrupt`] /
///   [`ValidationError::MissingIndexEntry`] for index damage.
pub fn validate<I>(
    index: &I,
    accepted: &Hash256,
    candidate: &Hash256,
) -> Result<ValidationOutcome, ValidationError>
where
    I: ChainIndex + ?Sized,
{
    let accepted_handle = index
        .lookup(accepted)
        .ok_or(ValidationError::MissingIndexEntry(*accepted))?;
    let candidate_handle = index
        .lookup(candidate)
        .ok_or(ValidationError::MissingIndexEntry(*candidate))?;
    let accepted_height = index
        .height(accepted_handle)
        .ok_or(ValidationError::MissingIndexEntry(*accepted))?;
    let candidate_height = index
        .height(candidate_handle)
        .ok_or(ValidationError::MissingIndexEntry(*candidate))?;

    if candidate_height <= accepted_height {
        let at_height = hash_at(index, accepted_handle, candidate_height, accepted)?;
        if at_height != *candidate {
            return Err(ValidationError::DivergesFromAccepted {
                candidate: *candidate,
                accepted: *accepted,
            });
        }
        return Ok(ValidationOutcome::AncestorOrEqual);
    }

    let at_height = hash_at(index, candidate_handle, accepted_height, candidate)?;
    if at_height != *accepted {
        return Err(ValidationError::NotDescendantOfAccepted {
            candidate: *candidate,
            accepted: *accepted,
        });
    }
    Ok(ValidationOutcome::Descendant)
}

/// Whether a new block `block_hash` on top of `parent` is consistent with
/// the sync checkpoint `sync`.
///
/// - Above the checkpoint the block must descend from it.
/// - At the checkpoint height it must be the checkpoint.
/// - Below it only blocks already indexed pass.
pub fn check_block<I>(
    index: &I,
    sync: &Hash256,
    block_hash: &Hash256,
    parent: BlockHandle,
) -> Result<bool, ValidationError>
where
    I: ChainIndex + ?Sized,
{
    let sync_handle = index
        .lookup(sync)
        .ok_or(ValidationError::MissingIndexEntry(*sync))?;
    let sync_height = index
        .height(sync_handle)
        .ok_or(ValidationError::MissingIndexEntry(*sync))?;
    let parent_entry = index
        .entry(parent)
        .ok_or(ValidationError::MissingIndexEntry(*block_hash))?;
    let height = parent_entry.height + 1;

    if height > sync_height {
        let at_height = hash_at(index, parent, sync_height, &parent_entry.hash)?;
        return Ok(at_height == *sync);
    }
    if height == sync_height {
        return Ok(block_hash == sync);
    }
    Ok(index.contains(block_hash))
}

fn hash_at<I>(
    index: &I,
    from: BlockHandle,
    height: u32,
    from_hash: &Hash256,
) -> Result<Hash256, ValidationError>
where
    I: ChainIndex + ?Sized,
{
    index
        .ancestor(from, height)
        .and_then(|handle| index.hash(handle))
        .ok_or(ValidationError::ChainIndexCorrupt(*from_hash))
}

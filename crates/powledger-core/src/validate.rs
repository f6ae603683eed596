use crate::{constants::GENESIS_PREVIOUS_HASH, meets_difficulty, Block};
use serde::Serialize;
use tracing::debug;

/// Outcome of checking one block against its predecessor and the difficulty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BlockValidity {
    pub index: u64,
    /// Stored `previous_hash` equals the predecessor's current `hash`.
    pub link_ok: bool,
    /// Stored `hash` equals the digest of the block's current fields.
    pub hash_ok: bool,
    /// Stored `hash` meets the difficulty in effect at validation time.
    pub pow_ok: bool,
    /// Every earlier block was individually valid.
    pub prefix_valid: bool,
}

impl BlockValidity {
    pub fn own_valid(&self) -> bool {
        self.link_ok && self.hash_ok && self.pow_ok
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ChainValidation {
    pub blocks: Vec<BlockValidity>,
    /// True iff every block is individually valid.
    pub overall: bool,
}

impl ChainValidation {
    pub fn first_invalid(&self) -> Option<u64> {
        self.blocks.iter().find(|b| !b.own_valid()).map(|b| b.index)
    }
}

/// Check every block in order. An invalid block does not stop the scan: each
/// block is compared with its predecessor's stored hash, and the failure only
/// clears `prefix_valid` for the blocks after it.
pub fn validate(blocks: &[Block], difficulty: u32) -> ChainValidation {
    let mut expected_previous: &str = GENESIS_PREVIOUS_HASH;
    let mut overall = true;
    let mut flags = Vec::with_capacity(blocks.len());

    for block in blocks {
        let recalculated = block.calculate_hash();
        let validity = BlockValidity {
            index: block.index,
            link_ok: block.previous_hash == expected_previous,
            hash_ok: block.hash == recalculated,
            pow_ok: meets_difficulty(&block.hash, difficulty),
            prefix_valid: overall,
        };
        if !validity.own_valid() {
            overall = false;
        }
        flags.push(validity);
        expected_previous = block.hash.as_str();
    }

    debug!("Validation complete at difficulty {difficulty}, overall validity: {overall}");
    ChainValidation {
        blocks: flags,
        overall,
    }
}

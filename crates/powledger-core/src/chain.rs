use crate::{
    constants::GENESIS_PREVIOUS_HASH,
    error::ChainError,
    validate::{validate, ChainValidation},
    Block, Payload,
};
use serde::{Deserialize, Serialize};

/// Ordered blocks. Linkage is checked by [`Chain::validate`], never enforced on
/// stored blocks, so tampering stays detectable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Chain {
    blocks: Vec<Block>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Index the next appended block will get.
    pub fn next_index(&self) -> u64 {
        self.blocks.len() as u64
    }

    pub fn latest(&self) -> Result<&Block, ChainError> {
        self.blocks.last().ok_or(ChainError::EmptyChain)
    }

    pub fn get(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.blocks.get(i))
    }

    pub(crate) fn get_mut(&mut self, index: u64) -> Result<&mut Block, ChainError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.blocks.get_mut(i))
            .ok_or(ChainError::BlockNotFound(index))
    }

    /// Set `index` and `previous_hash` so `candidate` follows the current tip.
    pub(crate) fn link(&self, candidate: &mut Block) -> Result<(), ChainError> {
        let tip = self.latest()?;
        candidate.index = self.next_index();
        candidate.previous_hash = tip.hash.clone();
        Ok(())
    }

    pub(crate) fn push(&mut self, block: Block) {
        self.blocks.push(block);
    }

    pub fn validate(&self, difficulty: u32) -> ChainValidation {
        validate(&self.blocks, difficulty)
    }
}

/// Unmined block 0 with the sentinel previous hash.
pub fn genesis_block(text: impl Into<String>, miner: impl Into<String>) -> Block {
    let mut block = Block::new(0, Payload::Genesis { text: text.into() }, miner);
    block.previous_hash = GENESIS_PREVIOUS_HASH.to_string();
    block
}

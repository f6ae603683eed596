//! Shared chain + balances behind a single lock, with at most one mining
//! operation in flight.

use crate::{
    chain::{genesis_block, Chain},
    config::ChainConfig,
    error::{ChainError, InsufficientFunds, MineError},
    ledger::{Balance, Balances},
    mine::{CancelToken, Miner, MiningObserver},
    validate::ChainValidation,
    Block, Payload,
};
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{info, warn};

/// Result of a successful append.
#[derive(Clone, Debug)]
pub struct Appended {
    pub block: Block,
    /// Reward issued to `block.miner`, if any.
    pub reward: Option<u64>,
    /// Set when the block was stored but its transaction effect was skipped.
    pub insufficient_funds: Option<InsufficientFunds>,
}

struct State {
    chain: Chain,
    balances: Balances,
}

/// Single-slot exclusive guard for mining.
struct MiningSlot {
    permits: Semaphore,
    active: Mutex<Option<CancelToken>>,
}

struct MiningGuard<'a> {
    slot: &'a MiningSlot,
    cancel: CancelToken,
    _permit: SemaphorePermit<'a>,
}

impl MiningSlot {
    fn new() -> Self {
        Self {
            permits: Semaphore::new(1),
            active: Mutex::new(None),
        }
    }

    fn active(&self) -> MutexGuard<'_, Option<CancelToken>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Each operation gets a fresh token, so a stale cancel never hits the next one.
    fn try_acquire(&self) -> Result<MiningGuard<'_>, ChainError> {
        let permit = self
            .permits
            .try_acquire()
            .map_err(|_| ChainError::MiningBusy)?;
        let cancel = CancelToken::new();
        *self.active() = Some(cancel.clone());
        Ok(MiningGuard {
            slot: self,
            cancel,
            _permit: permit,
        })
    }

    fn cancel(&self) -> bool {
        match self.active().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn is_busy(&self) -> bool {
        self.permits.available_permits() == 0
    }
}

impl Drop for MiningGuard<'_> {
    fn drop(&mut self) {
        *self.slot.active() = None;
    }
}

pub struct Blockchain {
    state: Mutex<State>,
    difficulty: AtomicU32,
    slot: MiningSlot,
    miner: Miner,
    mining_reward: u64,
    genesis_text: String,
    observer: Arc<dyn MiningObserver>,
}

impl Blockchain {
    pub fn new(config: ChainConfig) -> Self {
        Self::with_observer(config, ())
    }

    pub fn with_observer(config: ChainConfig, observer: impl MiningObserver + 'static) -> Self {
        Self {
            state: Mutex::new(State {
                chain: Chain::new(),
                balances: Balances::new(),
            }),
            difficulty: AtomicU32::new(config.difficulty),
            slot: MiningSlot::new(),
            miner: Miner::new(config.progress_interval),
            mining_reward: config.mining_reward,
            genesis_text: config.genesis_text,
            observer: Arc::new(observer),
        }
    }

    // Every critical section leaves the state consistent before anything can
    // fail, so a poisoned lock is still safe to use.
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty.load(Ordering::Relaxed)
    }

    /// Takes effect on the next mining or validation call.
    pub fn set_difficulty(&self, difficulty: u32) {
        self.difficulty.store(difficulty, Ordering::Relaxed);
        info!(
            "Difficulty updated to {difficulty}: hash must start with '{}'",
            "0".repeat(difficulty as usize)
        );
    }

    pub fn mining_reward(&self) -> u64 {
        self.mining_reward
    }

    pub fn is_mining(&self) -> bool {
        self.slot.is_busy()
    }

    /// Request cancellation of the in-flight mining operation. It is observed at
    /// the miner's next poll. Returns `false` if nothing was mining.
    pub fn cancel_mining(&self) -> bool {
        let requested = self.slot.cancel();
        if requested {
            info!("Mining cancellation requested");
        }
        requested
    }

    /// Mine and store block 0, then reward `miner` if it is non-empty.
    pub async fn create_genesis(&self, miner: &str) -> Result<Block, ChainError> {
        let guard = self.slot.try_acquire()?;
        let empty = self.state().chain.is_empty();
        if !empty {
            return Err(ChainError::GenesisExists);
        }

        let difficulty = self.difficulty();
        info!("Mining genesis block, difficulty {difficulty}");
        let candidate = genesis_block(self.genesis_text.as_str(), miner);
        let block = self
            .miner
            .mine(candidate, difficulty, &guard.cancel, self.observer.as_ref())
            .await?;

        let mut state = self.state();
        state.chain.push(block.clone());
        state.balances.issue_reward(&block.miner, self.mining_reward);
        info!("Genesis block #0 mined with hash {}", block.hash);
        Ok(block)
    }

    /// Link `candidate` to the tip, mine it at the current difficulty and store it.
    ///
    /// Returns [`ChainError::MiningBusy`] without touching anything if another
    /// operation is mining, and [`ChainError::MiningCancelled`] if cancelled, in
    /// which case the candidate is discarded. On success the miner is rewarded
    /// and then the payload effect is applied; an overdraft detected at this point
    /// is reported in [`Appended::insufficient_funds`].
    pub async fn append(&self, mut candidate: Block) -> Result<Appended, ChainError> {
        let guard = self.slot.try_acquire().inspect_err(|_| {
            warn!("Another operation is already in progress");
        })?;
        self.state().chain.link(&mut candidate)?;

        let difficulty = self.difficulty();
        info!(
            "Mining block #{} (nonce 0) difficulty {difficulty}",
            candidate.index
        );
        let block = match self
            .miner
            .mine(candidate, difficulty, &guard.cancel, self.observer.as_ref())
            .await
        {
            Ok(block) => block,
            Err(MineError::Cancelled) => {
                warn!("Mining cancelled, candidate discarded");
                return Err(ChainError::MiningCancelled);
            }
        };

        let mut state = self.state();
        state.chain.push(block.clone());
        let rewarded = state.balances.issue_reward(&block.miner, self.mining_reward);
        let insufficient_funds = state.balances.apply(&block).err();
        drop(state);

        info!("Block #{} successfully mined and added", block.index);
        Ok(Appended {
            block,
            reward: rewarded.then_some(self.mining_reward),
            insufficient_funds,
        })
    }

    /// Append a coinbase block issuing `amount` to `receiver`.
    pub async fn credit(
        &self,
        receiver: &str,
        amount: u64,
        miner: &str,
    ) -> Result<Appended, ChainError> {
        let payload = Payload::Coinbase {
            receiver: receiver.to_string(),
            amount,
        };
        self.append(Block::new(0, payload, miner)).await
    }

    /// Append a transaction after checking the sender's current balance. The
    /// balance is checked again when the mined block is applied.
    pub async fn transfer(
        &self,
        sender: &str,
        receiver: &str,
        amount: u64,
        miner: &str,
    ) -> Result<Appended, ChainError> {
        let (available, next_index) = {
            let state = self.state();
            (state.balances.get(sender), state.chain.next_index())
        };
        if available < Balance::from(amount) {
            return Err(InsufficientFunds {
                block_index: next_index,
                sender: sender.to_string(),
                amount,
                available,
            }
            .into());
        }
        let payload = Payload::Transaction {
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            amount,
        };
        self.append(Block::new(0, payload, miner)).await
    }

    /// Replace a stored block's payload and recompute its hash with the current
    /// nonce. Balances are not recalculated.
    pub fn recompute_after_edit(&self, index: u64, payload: Payload) -> Result<Block, ChainError> {
        self.edit_block(index, |block| {
            block.payload = payload;
            block.recompute_hash();
        })
    }

    /// Mutate any field of a stored block. Nothing is recomputed.
    pub fn edit_block<F>(&self, index: u64, edit: F) -> Result<Block, ChainError>
    where
        F: FnOnce(&mut Block),
    {
        let mut state = self.state();
        let block = state.chain.get_mut(index)?;
        edit(block);
        warn!("Block #{index} edited, hash is now {}", block.hash);
        Ok(block.clone())
    }

    /// Validate at the current difficulty.
    pub fn validate(&self) -> ChainValidation {
        self.validate_at(self.difficulty())
    }

    pub fn validate_at(&self, difficulty: u32) -> ChainValidation {
        self.state().chain.validate(difficulty)
    }

    pub fn latest(&self) -> Result<Block, ChainError> {
        self.state().chain.latest().cloned()
    }

    pub fn len(&self) -> usize {
        self.state().chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().chain.is_empty()
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.state().chain.blocks().to_vec()
    }

    pub fn chain(&self) -> Chain {
        self.state().chain.clone()
    }

    pub fn balances(&self) -> Balances {
        self.state().balances.clone()
    }

    /// Balances recomputed from the blocks as currently stored.
    pub fn replay_balances(&self) -> (Balances, Vec<InsufficientFunds>) {
        Balances::replay(self.state().chain.blocks(), self.mining_reward)
    }
}

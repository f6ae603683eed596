use crate::{constants::PROGRESS_INTERVAL, error::MineError, meets_difficulty, Block};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

/// Cooperative cancellation flag shared between a miner and whoever may stop it.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct MiningProgress {
    pub index: u64,
    pub nonce: u64,
    pub difficulty: u32,
}

/// Receives progress notifications. Delivery is fire-and-forget.
pub trait MiningObserver: Send + Sync {
    fn on_progress(&self, progress: MiningProgress);
}

impl MiningObserver for () {
    fn on_progress(&self, _progress: MiningProgress) {}
}

impl<F> MiningObserver for F
where
    F: Fn(MiningProgress) + Send + Sync,
{
    fn on_progress(&self, progress: MiningProgress) {
        self(progress)
    }
}

impl MiningObserver for UnboundedSender<MiningProgress> {
    fn on_progress(&self, progress: MiningProgress) {
        // a dropped receiver just means nobody is watching
        let _ = self.send(progress);
    }
}

/// Proof-of-work search over the nonce.
#[derive(Clone, Copy, Debug)]
pub struct Miner {
    progress_interval: u64,
}

impl Default for Miner {
    fn default() -> Self {
        Self::new(PROGRESS_INTERVAL)
    }
}

impl Miner {
    /// `progress_interval` is clamped to at least one attempt.
    pub fn new(progress_interval: u64) -> Self {
        Self {
            progress_interval: progress_interval.max(1),
        }
    }

    pub fn progress_interval(&self) -> u64 {
        self.progress_interval
    }

    /// Mine `block` by incrementing the nonce from zero until its hex digest
    /// starts with `difficulty` zeros.
    ///
    /// Every `progress_interval` attempts the observer is notified and the task
    /// yields to the scheduler. The cancel token is polled before each new
    /// attempt. There is no upper bound on attempts.
    pub async fn mine(
        &self,
        mut block: Block,
        difficulty: u32,
        cancel: &CancelToken,
        observer: &dyn MiningObserver,
    ) -> Result<Block, MineError> {
        let mut primed = Sha256::new();
        primed.update(block.head_bytes());
        let tail = block.tail_bytes();
        let attempt = |nonce: u64| {
            let mut hasher = primed.clone();
            hasher.update(nonce.to_le_bytes());
            hasher.update(&tail);
            hex::encode(hasher.finalize())
        };

        block.nonce = 0;
        block.hash = attempt(block.nonce);
        let mut attempts: u64 = 0;

        while !meets_difficulty(&block.hash, difficulty) {
            if cancel.is_cancelled() {
                debug!(index = block.index, nonce = block.nonce, "mining cancelled");
                return Err(MineError::Cancelled);
            }
            block.nonce = block.nonce.wrapping_add(1);
            block.hash = attempt(block.nonce);
            attempts += 1;

            if attempts % self.progress_interval == 0 {
                let progress = MiningProgress {
                    index: block.index,
                    nonce: block.nonce,
                    difficulty,
                };
                debug!(?progress, "mining");
                observer.on_progress(progress);
                tokio::task::yield_now().await;
            }
        }

        info!(
            "Mined block {} with nonce {} and hash {} (difficulty {})",
            block.index, block.nonce, block.hash, difficulty
        );
        Ok(block)
    }
}

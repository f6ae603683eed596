//! Account balances derived by replaying block effects.

use crate::{error::InsufficientFunds, Block, Payload};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

pub type Balance = i128;

/// Balances keyed by account name, sorted by name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balances(BTreeMap<String, Balance>);

impl Balances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Missing accounts read as zero.
    pub fn get(&self, account: &str) -> Balance {
        self.0.get(account).copied().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Balance)> {
        self.0.iter().map(|(name, bal)| (name.as_str(), *bal))
    }

    pub fn snapshot(&self) -> BTreeMap<String, Balance> {
        self.0.clone()
    }

    fn credit(&mut self, account: &str, amount: u64) {
        *self.0.entry(account.to_string()).or_default() += Balance::from(amount);
    }

    /// Apply the payload effect of `block`. Rewards are separate, see
    /// [`Balances::issue_reward`].
    ///
    /// A transaction whose sender cannot cover it changes nothing and
    /// returns [`InsufficientFunds`].
    pub fn apply(&mut self, block: &Block) -> Result<(), InsufficientFunds> {
        match &block.payload {
            Payload::Genesis { .. } => Ok(()),
            Payload::Coinbase { receiver, amount } => {
                self.credit(receiver, *amount);
                Ok(())
            }
            Payload::Transaction {
                sender,
                receiver,
                amount,
            } => {
                let available = self.get(sender);
                if available < Balance::from(*amount) {
                    warn!(
                        "Insufficient funds for {sender} detected after mining block {}, balance update skipped",
                        block.index
                    );
                    return Err(InsufficientFunds {
                        block_index: block.index,
                        sender: sender.clone(),
                        amount: *amount,
                        available,
                    });
                }
                *self.0.entry(sender.clone()).or_default() -= Balance::from(*amount);
                self.credit(receiver, *amount);
                Ok(())
            }
        }
    }

    /// Credit `reward` to `miner`. Returns `false` when `miner` is empty.
    pub fn issue_reward(&mut self, miner: &str, reward: u64) -> bool {
        if miner.is_empty() {
            return false;
        }
        self.credit(miner, reward);
        info!("Mining reward of {reward} credited to {miner}");
        true
    }

    /// Rebuild balances from scratch: for each block the reward first, then
    /// the payload effect. Every skipped transaction is collected.
    pub fn replay<'a, I>(blocks: I, reward: u64) -> (Self, Vec<InsufficientFunds>)
    where
        I: IntoIterator<Item = &'a Block>,
    {
        let mut balances = Self::new();
        let mut skipped = Vec::new();
        for block in blocks {
            balances.issue_reward(&block.miner, reward);
            if let Err(e) = balances.apply(block) {
                skipped.push(e);
            }
        }
        (balances, skipped)
    }
}

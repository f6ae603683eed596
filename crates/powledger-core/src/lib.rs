use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod blockchain;
pub mod chain;
pub mod config;
pub mod constants;
pub mod error;
pub mod ledger;
pub mod mine;
pub mod validate;

pub use blockchain::{Appended, Blockchain};
pub use chain::Chain;
pub use config::ChainConfig;
pub use error::{ChainError, ConfigError, InsufficientFunds, MineError};
pub use ledger::{Balance, Balances};
pub use mine::{CancelToken, Miner, MiningObserver, MiningProgress};
pub use validate::{validate, BlockValidity, ChainValidation};

/// What a block records. Serialized for hashing by [`Payload::write_canonical`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Genesis {
        text: String,
    },
    /// System-issued funds, no debit side.
    Coinbase {
        receiver: String,
        amount: u64,
    },
    Transaction {
        sender: String,
        receiver: String,
        amount: u64,
    },
}

impl Payload {
    fn tag(&self) -> u8 {
        match self {
            Payload::Genesis { .. } => 0,
            Payload::Coinbase { .. } => 1,
            Payload::Transaction { .. } => 2,
        }
    }

    /// Tag byte followed by the variant's fields in declaration order.
    pub fn write_canonical(&self, out: &mut Vec<u8>) {
        out.push(self.tag());
        match self {
            Payload::Genesis { text } => put_str(out, text),
            Payload::Coinbase { receiver, amount } => {
                put_str(out, receiver);
                out.extend_from_slice(&amount.to_le_bytes());
            }
            Payload::Transaction {
                sender,
                receiver,
                amount,
            } => {
                put_str(out, sender);
                put_str(out, receiver);
                out.extend_from_slice(&amount.to_le_bytes());
            }
        }
    }
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub payload: Payload,
    pub previous_hash: String,
    /// Empty until the block is first hashed.
    pub hash: String,
    pub nonce: u64,
    /// Account credited with the mining reward. Empty means no reward.
    pub miner: String,
}

impl Block {
    /// An unmined block stamped with the current time.
    pub fn new(index: u64, payload: Payload, miner: impl Into<String>) -> Self {
        Self {
            index,
            timestamp: now_millis(),
            payload,
            previous_hash: String::new(),
            hash: String::new(),
            nonce: 0,
            miner: miner.into(),
        }
    }

    /// Everything hashed before the nonce.
    pub fn head_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(64 + self.previous_hash.len());
        bytes.extend_from_slice(&self.index.to_le_bytes());
        put_str(&mut bytes, &self.previous_hash);
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        self.payload.write_canonical(&mut bytes);
        bytes
    }

    /// Everything hashed after the nonce.
    pub fn tail_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4 + self.miner.len());
        put_str(&mut bytes, &self.miner);
        bytes
    }

    pub fn hash_bytes(&self) -> Vec<u8> {
        let mut bytes = self.head_bytes();
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        bytes.extend_from_slice(&self.tail_bytes());
        bytes
    }

    /// Digest of the block's current fields. Does not touch `self.hash`.
    pub fn calculate_hash(&self) -> String {
        digest(&self.hash_bytes())
    }

    /// Overwrites `hash` from the current fields without re-mining.
    pub fn recompute_hash(&mut self) -> &str {
        self.hash = self.calculate_hash();
        &self.hash
    }
}

/// Lowercase hex SHA-256.
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// `true` if `hash` starts with `difficulty` zero characters.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

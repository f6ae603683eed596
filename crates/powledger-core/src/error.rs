use thiserror::Error;

/// Raised when a transaction's sender cannot cover the amount.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("insufficient funds for {sender} in block {block_index}: needs {amount}, has {available}")]
pub struct InsufficientFunds {
    pub block_index: u64,
    pub sender: String,
    pub amount: u64,
    pub available: i128,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MineError {
    #[error("mining cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("another mining operation is already in progress")]
    MiningBusy,
    #[error("mining cancelled")]
    MiningCancelled,
    #[error("chain is empty, create the genesis block first")]
    EmptyChain,
    #[error("genesis block already exists")]
    GenesisExists,
    #[error("block {0} not found")]
    BlockNotFound(u64),
    #[error(transparent)]
    InsufficientFunds(#[from] InsufficientFunds),
}

impl From<MineError> for ChainError {
    fn from(err: MineError) -> Self {
        match err {
            MineError::Cancelled => ChainError::MiningCancelled,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("progress_interval must be greater than zero")]
    ZeroProgressInterval,
}

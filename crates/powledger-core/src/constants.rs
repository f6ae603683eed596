pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
pub const GENESIS_PREVIOUS_HASH: &str = "0";
pub const GENESIS_TEXT: &str = "Genesis Block";
pub const MINING_REWARD: u64 = 5;
pub const DEFAULT_DIFFICULTY: u32 = 2;
pub const PROGRESS_INTERVAL: u64 = 5000;

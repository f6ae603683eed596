use crate::{
    constants::{DEFAULT_DIFFICULTY, GENESIS_TEXT, MINING_REWARD, PROGRESS_INTERVAL},
    error::ConfigError,
};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Leading zero characters a block hash needs.
    pub difficulty: u32,
    /// Attempts between progress reports and scheduler yields.
    pub progress_interval: u64,
    pub mining_reward: u64,
    pub genesis_text: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            progress_interval: PROGRESS_INTERVAL,
            mining_reward: MINING_REWARD,
            genesis_text: GENESIS_TEXT.to_string(),
        }
    }
}

impl ChainConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.check()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        if self.progress_interval == 0 {
            return Err(ConfigError::ZeroProgressInterval);
        }
        Ok(())
    }
}

#![allow(dead_code)]

use powledger_core::{Blockchain, ChainConfig, MiningProgress};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

pub fn config(difficulty: u32) -> ChainConfig {
    ChainConfig {
        difficulty,
        progress_interval: 100,
        ..ChainConfig::default()
    }
}

/// Genesis (miner "A"), coinbase 100 to "B", transfer B -> C of 30.
pub async fn scenario_chain(difficulty: u32) -> anyhow::Result<Blockchain> {
    let bc = Blockchain::new(config(difficulty));
    bc.create_genesis("A").await?;
    bc.credit("B", 100, "A").await?;
    bc.transfer("B", "C", 30, "A").await?;
    Ok(bc)
}

pub fn observed_chain(difficulty: u32) -> (Arc<Blockchain>, UnboundedReceiver<MiningProgress>) {
    let (tx, rx) = unbounded_channel();
    (Arc::new(Blockchain::with_observer(config(difficulty), tx)), rx)
}

/// Number of leading '0' characters.
pub fn leading_zeros(hash: &str) -> u32 {
    hash.bytes().take_while(|b| *b == b'0').count() as u32
}

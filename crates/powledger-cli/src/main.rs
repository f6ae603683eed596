use anyhow::Result;
use clap::{Parser, Subcommand};
use powledger_core::{
    Balances, Block, Blockchain, ChainConfig, ChainError, ChainValidation, MiningProgress, Payload,
};
use serde::Serialize;
use std::{path::PathBuf, sync::Arc};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "powledger-cli")]
#[command(about = "Drive an in-memory proof-of-work ledger")]
struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Leading zero characters a block hash needs
    #[arg(long, global = true)]
    difficulty: Option<u32>,

    /// Attempts between progress reports
    #[arg(long, global = true)]
    progress_interval: Option<u64>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Genesis, a credit, a transfer and an overdraft attempt, then print the chain
    Demo {
        /// Miner credited with every block reward
        #[arg(long, default_value = "A")]
        miner: String,
        /// Overwrite this block's payload and re-hash it without re-mining
        #[arg(long)]
        tamper: Option<u64>,
        /// Validate at this difficulty instead of the configured one
        #[arg(long)]
        revalidate: Option<u32>,
    },
    /// Mine coinbase blocks. Ctrl-C cancels the block being mined
    Mine {
        #[arg(long, default_value_t = 1)]
        blocks: u32,
        #[arg(long, default_value = "A")]
        miner: String,
        #[arg(long, default_value = "B")]
        receiver: String,
        #[arg(long, default_value_t = 10)]
        amount: u64,
    },
}

#[derive(Serialize)]
struct Report {
    difficulty: u32,
    blocks: Vec<Block>,
    balances: Balances,
    validation: ChainValidation,
}

impl Report {
    fn new(bc: &Blockchain, validation: ChainValidation) -> Self {
        Self {
            difficulty: bc.difficulty(),
            blocks: bc.blocks(),
            balances: bc.balances(),
            validation,
        }
    }
}

fn load_config(cli: &Cli) -> Result<ChainConfig> {
    let mut config = match &cli.config {
        Some(path) => ChainConfig::load(path)?,
        None => ChainConfig::default(),
    };
    if let Some(difficulty) = cli.difficulty {
        config.difficulty = difficulty;
    }
    if let Some(interval) = cli.progress_interval {
        config.progress_interval = interval;
    }
    config.check()?;
    Ok(config)
}

fn report_progress(p: MiningProgress) {
    info!(
        "Mining block #{}... (nonce {}) difficulty {}",
        p.index, p.nonce, p.difficulty
    );
}

async fn demo(
    bc: &Blockchain,
    miner: &str,
    tamper: Option<u64>,
    revalidate: Option<u32>,
) -> Result<Report> {
    bc.create_genesis(miner).await?;
    bc.credit("B", 100, miner).await?;
    bc.transfer("B", "C", 30, miner).await?;
    match bc.transfer("C", "D", 1000, miner).await {
        Err(ChainError::InsufficientFunds(e)) => warn!("Tx failed: {e}"),
        other => {
            other?;
        }
    }

    if let Some(index) = tamper {
        let forged = Payload::Coinbase {
            receiver: "Mallory".into(),
            amount: 1_000_000,
        };
        let block = bc.recompute_after_edit(index, forged)?;
        warn!("Block #{index} tampered, balances not recalculated");
        info!("New hash {}", block.hash);
    }

    let validation = match revalidate {
        Some(difficulty) => bc.validate_at(difficulty),
        None => bc.validate(),
    };
    if validation.overall {
        info!("Chain is valid at difficulty {}", bc.difficulty());
    } else {
        warn!("Chain integrity compromised");
    }
    Ok(Report::new(bc, validation))
}

async fn mine(
    bc: Arc<Blockchain>,
    blocks: u32,
    miner: &str,
    receiver: &str,
    amount: u64,
) -> Result<Report> {
    let watcher = {
        let bc = bc.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                bc.cancel_mining();
            }
        })
    };

    bc.create_genesis(miner).await?;
    for _ in 0..blocks {
        match bc.credit(receiver, amount, miner).await {
            Ok(added) => info!("Block #{} hash {}", added.block.index, added.block.hash),
            Err(ChainError::MiningCancelled) => {
                warn!("Mining cancelled");
                break;
            }
            Err(e) => {
                watcher.abort();
                return Err(e.into());
            }
        }
    }
    watcher.abort();

    Ok(Report::new(&bc, bc.validate()))
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let bc = Arc::new(Blockchain::with_observer(config, report_progress));

    let report = match cli.cmd {
        Command::Demo {
            miner,
            tamper,
            revalidate,
        } => demo(&bc, &miner, tamper, revalidate).await?,
        Command::Mine {
            blocks,
            miner,
            receiver,
            amount,
        } => mine(bc, blocks, &miner, &receiver, amount).await?,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

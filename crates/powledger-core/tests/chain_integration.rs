mod helpers;

use helpers::{leading_zeros, observed_chain, scenario_chain};
use powledger_core::{Block, ChainError, Payload};

#[tokio::test]
async fn end_to_end_balances() -> anyhow::Result<()> {
    let bc = powledger_core::Blockchain::new(helpers::config(2));

    bc.create_genesis("A").await?;
    assert_eq!(bc.balances().snapshot(), [("A".to_string(), 5)].into());

    bc.credit("B", 100, "A").await?;
    let b = bc.balances();
    assert_eq!((b.get("A"), b.get("B")), (10, 100));

    bc.transfer("B", "C", 30, "A").await?;
    let b = bc.balances();
    assert_eq!((b.get("A"), b.get("B"), b.get("C")), (15, 70, 30));

    // pre-mining check rejects the overdraft outright
    let err = bc.transfer("C", "D", 1000, "A").await.unwrap_err();
    assert!(matches!(err, ChainError::InsufficientFunds(_)));
    assert_eq!(bc.len(), 3);

    // submitted anyway: mined, stored, effect skipped, miner still paid
    let overdraft = Payload::Transaction {
        sender: "C".into(),
        receiver: "D".into(),
        amount: 1000,
    };
    let added = bc.append(Block::new(0, overdraft, "A")).await?;
    assert!(added.insufficient_funds.is_some());
    let b = bc.balances();
    assert_eq!((b.get("A"), b.get("C"), b.get("D")), (20, 30, 0));
    assert_eq!(bc.len(), 4);

    let v = bc.validate();
    assert!(v.overall);
    for block in bc.blocks() {
        assert!(block.hash.starts_with("00"));
    }
    Ok(())
}

#[tokio::test]
async fn validation_is_repeatable() -> anyhow::Result<()> {
    let bc = scenario_chain(2).await?;
    assert_eq!(bc.validate(), bc.validate());
    Ok(())
}

#[tokio::test]
async fn tampered_payload_breaks_the_chain() -> anyhow::Result<()> {
    let bc = scenario_chain(2).await?;
    bc.credit("E", 1, "A").await?;
    let original = bc.blocks();

    // pick a forged amount whose re-hash misses the difficulty prefix
    let mut amount = 1;
    let tampered = loop {
        let forged = Payload::Coinbase {
            receiver: "B".into(),
            amount,
        };
        let block = bc.recompute_after_edit(1, forged)?;
        if !block.hash.starts_with("00") {
            break block;
        }
        amount += 1;
    };
    assert_eq!(tampered.nonce, original[1].nonce);
    assert_ne!(tampered.hash, original[1].hash);

    let v = bc.validate();
    assert!(!v.overall);
    let b1 = v.blocks[1];
    assert!(b1.link_ok && b1.hash_ok);
    assert!(!b1.pow_ok);
    assert!(!b1.own_valid());
    assert!(b1.prefix_valid);

    let b2 = v.blocks[2];
    assert!(!b2.prefix_valid);
    assert!(!b2.link_ok);
    assert!(b2.hash_ok && b2.pow_ok);

    // later blocks are still checked on their own merits
    let b3 = v.blocks[3];
    assert!(b3.own_valid());
    assert!(!b3.prefix_valid);
    assert_eq!(v.first_invalid(), Some(1));

    // balances are not recalculated by tampering
    assert_eq!(bc.balances().get("B"), 70);
    Ok(())
}

#[tokio::test]
async fn forged_hash_without_recompute_is_detected() -> anyhow::Result<()> {
    let bc = scenario_chain(2).await?;
    bc.edit_block(2, |block| block.hash = "0".repeat(64))?;
    let v = bc.validate();
    assert!(!v.blocks[2].hash_ok);
    assert!(v.blocks[2].pow_ok);
    assert!(!v.overall);
    Ok(())
}

#[tokio::test]
async fn rehash_is_idempotent() -> anyhow::Result<()> {
    let bc = scenario_chain(1).await?;
    let payload = Payload::Coinbase {
        receiver: "X".into(),
        amount: 9,
    };
    let once = bc.recompute_after_edit(1, payload.clone())?;
    let twice = bc.recompute_after_edit(1, payload)?;
    assert_eq!(once.hash, twice.hash);
    Ok(())
}

#[tokio::test]
async fn raising_difficulty_reinterprets_history() -> anyhow::Result<()> {
    let bc = scenario_chain(2).await?;
    assert!(bc.validate().overall);

    let weakest = bc
        .blocks()
        .iter()
        .map(|b| leading_zeros(&b.hash))
        .min()
        .unwrap_or_default();
    let before = bc.blocks();
    bc.set_difficulty(weakest + 1);
    let v = bc.validate();
    assert!(!v.overall);
    assert!(v.blocks.iter().all(|b| b.link_ok && b.hash_ok));
    assert_eq!(bc.blocks(), before);

    bc.set_difficulty(0);
    assert!(bc.validate().overall);
    assert!(bc.validate_at(2).overall);
    Ok(())
}

#[tokio::test]
async fn mined_blocks_meet_every_difficulty() -> anyhow::Result<()> {
    for difficulty in 0..=3 {
        let bc = scenario_chain(difficulty).await?;
        let prefix = "0".repeat(difficulty as usize);
        assert!(bc.blocks().iter().all(|b| b.hash.starts_with(&prefix)));
        assert!(bc.validate().overall);
    }
    Ok(())
}

#[tokio::test]
async fn concurrent_append_is_rejected_without_mutation() -> anyhow::Result<()> {
    let (bc, mut rx) = observed_chain(0);
    bc.create_genesis("A").await?;
    bc.set_difficulty(64);

    let pending = {
        let bc = bc.clone();
        tokio::spawn(async move { bc.credit("B", 100, "A").await })
    };
    rx.recv().await.expect("mining started");

    let before = bc.blocks();
    let balances = bc.balances();
    let busy = bc.credit("C", 1, "A").await;
    assert!(matches!(busy, Err(ChainError::MiningBusy)));
    assert_eq!(bc.blocks(), before);
    assert_eq!(bc.balances(), balances);

    bc.cancel_mining();
    assert!(matches!(pending.await?, Err(ChainError::MiningCancelled)));

    // slot is free again
    bc.set_difficulty(1);
    let added = bc.credit("C", 1, "A").await?;
    assert_eq!(added.block.index, 1);
    assert_eq!(bc.balances().get("C"), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn multi_thread_runtime_allows_one_miner() -> anyhow::Result<()> {
    let (bc, _rx) = observed_chain(1);
    bc.create_genesis("A").await?;
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let bc = bc.clone();
            tokio::spawn(async move { bc.credit(&format!("R{i}"), 1, "A").await })
        })
        .collect();
    let mut added = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => added += 1,
            Err(ChainError::MiningBusy) => {}
            Err(e) => return Err(e.into()),
        }
    }
    assert!(added >= 1);
    assert_eq!(bc.len(), 1 + added);
    assert!(bc.validate().overall);
    Ok(())
}

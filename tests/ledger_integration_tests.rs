use roster_chain::core::{
    compute_balances, is_chain_valid, HighestFeeFirst, LedgerProjection, PenaltyStakingContract,
    SmartContract, TimeLockContract,
};
use roster_chain::utils::{from_json, to_json_pretty};
use roster_chain::{
    Amount, Block, BlockEdit, BlockchainError, ChainRejection, ChainSettings, MemoryStore,
    NodeEngine, NodeName, Roster, SledStore, SyncOutcome, Transaction, Wallet, WalletKeys,
};
use std::sync::Arc;
use tempfile::TempDir;

fn coins(s: &str) -> Amount {
    s.parse().unwrap()
}

fn fast_settings() -> ChainSettings {
    ChainSettings {
        initial_difficulty: 1,
        max_difficulty: 4,
        target_block_time_ms: 1,
        adjust_every_blocks: 1_000,
        ..ChainSettings::default()
    }
}

fn memory_engine(name: &str, settings: ChainSettings) -> NodeEngine {
    let engine = NodeEngine::new(
        name,
        WalletKeys::generate().unwrap(),
        Arc::new(MemoryStore::new()),
        settings,
    )
    .unwrap();
    engine.ensure_genesis().unwrap();
    engine
}

fn funded(engine: &NodeEngine, name: &str, blocks: u64) -> (Wallet, WalletKeys) {
    let (wallet, keys) = engine.create_wallet(name).unwrap();
    for _ in 0..blocks {
        engine.mine_pending(keys.private_key()).unwrap();
    }
    (wallet, keys)
}

fn mine_until(engine: &NodeEngine, index: u64) {
    while engine.last_block().unwrap().get_index() < index {
        engine.mine().unwrap();
    }
}

#[test]
fn test_genesis_only_chain_is_valid() {
    let engine = memory_engine("A", fast_settings());
    let chain = engine.chain().unwrap();
    assert_eq!(chain.len(), 1);
    assert!(is_chain_valid(&chain));
    assert!(!is_chain_valid(&[]));
}

#[test]
fn test_fork_resolves_to_longest_valid_chain() {
    let roster = Roster::new(&fast_settings()).unwrap();
    let a = roster.node(NodeName::A);
    let b = roster.node(NodeName::B);
    let c = roster.node(NodeName::C);

    // A and B both extend genesis without hearing from each other
    a.mine().unwrap();
    b.mine().unwrap();
    assert_ne!(
        a.get_block(1).unwrap().get_hash(),
        b.get_block(1).unwrap().get_hash()
    );

    let peers = roster.broadcast_chain(NodeName::B).unwrap();
    for peer in &peers {
        match peer.peer {
            NodeName::A => assert!(matches!(
                peer.result,
                Ok(SyncOutcome::Rejected(ChainRejection::NotLonger { .. }))
            )),
            _ => assert_eq!(peer.result, Ok(SyncOutcome::Adopted { length: 2 })),
        }
    }
    assert_eq!(c.chain().unwrap(), b.chain().unwrap());

    let report = roster
        .mine_and_broadcast(NodeName::A, a.node_keys().private_key())
        .unwrap();
    assert_eq!(report.adopted_by(), vec![NodeName::B, NodeName::C]);
    for (_, engine) in roster.nodes() {
        assert_eq!(engine.chain().unwrap(), a.chain().unwrap());
        assert!(engine.is_chain_valid().unwrap());
    }
}

#[test]
fn test_longer_invalid_chain_is_never_adopted() {
    let a = memory_engine("A", fast_settings());
    let b = NodeEngine::new(
        "B",
        WalletKeys::generate().unwrap(),
        Arc::new(MemoryStore::new()),
        fast_settings(),
    )
    .unwrap();
    assert!(b
        .try_adopt_external_chain(&a.chain().unwrap())
        .unwrap()
        .is_adopted());

    for _ in 0..3 {
        a.mine().unwrap();
    }
    let before = b.chain().unwrap();

    // Re-signing with the wrong key keeps the hash intact but breaks the signature
    let mut forged = a.chain().unwrap();
    let impostor = WalletKeys::generate().unwrap();
    forged[3].sign(impostor.private_key(), a.public_key()).unwrap();

    let outcome = b.try_adopt_external_chain(&forged).unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Rejected(ChainRejection::BadSignature { index: 3 })
    );
    assert_eq!(b.chain().unwrap(), before);
    assert_eq!(b.chain_length().unwrap(), 1);
}

// Blocks keep their index private, so a renumbered copy goes through the JSON form
fn renumbered(block: &Block, index: u64) -> Block {
    let mut value = serde_json::to_value(block).unwrap();
    value["index"] = serde_json::json!(index);
    serde_json::from_value(value).unwrap()
}

fn empty_engine(name: &str) -> NodeEngine {
    NodeEngine::new(
        name,
        WalletKeys::generate().unwrap(),
        Arc::new(MemoryStore::new()),
        fast_settings(),
    )
    .unwrap()
}

#[test]
fn test_rewritten_genesis_is_never_adopted() {
    let a = memory_engine("A", fast_settings());
    a.mine().unwrap();
    let b = memory_engine("B", fast_settings());
    let before = b.chain().unwrap();

    let mut forged = a.chain().unwrap();
    forged[0].transactions_mut().push(Transaction::new_coinbase(
        0,
        "ADDR_THIEF",
        Amount::from_coins(1_000_000),
    ));

    let outcome = b.try_adopt_external_chain(&forged).unwrap();
    assert_eq!(outcome, SyncOutcome::Rejected(ChainRejection::InvalidGenesis));
    assert_eq!(b.chain().unwrap(), before);
    assert!(b.is_chain_valid().unwrap());
    assert_eq!(b.wallet_balance("ADDR_THIEF").unwrap(), Amount::ZERO);
}

#[test]
fn test_renumbered_chain_is_never_adopted() {
    let a = memory_engine("A", fast_settings());
    a.mine().unwrap();
    a.mine().unwrap();
    let b = empty_engine("B");
    b.try_adopt_external_chain(&a.chain().unwrap()[..2]).unwrap();
    assert_eq!(b.chain_length().unwrap(), 2);

    let mut swapped = a.chain().unwrap();
    swapped[1] = renumbered(&swapped[1], 2);
    swapped[2] = renumbered(&swapped[2], 1);
    assert_eq!(
        b.try_adopt_external_chain(&swapped).unwrap(),
        SyncOutcome::Rejected(ChainRejection::BadIndex { index: 1 })
    );

    let mut collided = a.chain().unwrap();
    collided[2] = renumbered(&collided[2], 1);
    assert!(!b.try_adopt_external_chain(&collided).unwrap().is_adopted());

    assert_eq!(b.chain_length().unwrap(), 2);
    assert!(b.is_chain_valid().unwrap());
}

#[test]
fn test_time_lock_releases_only_at_unlock_block() {
    let engine = memory_engine("A", fast_settings());
    let lock = TimeLockContract::new(50).unwrap();
    let lock_account = lock.account().clone();

    let mut release_request = Transaction::new(lock.address(), "ADDR_X", coins("1"), Amount::ZERO);
    let mut standalone = TimeLockContract::with_account(lock_account.clone(), 50);
    assert!(!standalone.validate(&[], &mut release_request, 10));
    assert!(standalone.validate(&[], &mut release_request, 51));

    let info = engine.add_contract(Box::new(lock)).unwrap();
    let (alice, keys) = funded(&engine, "alice", 2);
    engine
        .submit_transaction(
            Transaction::new_signed(
                alice.get_address(),
                &info.address,
                coins("1"),
                Amount::ZERO,
                keys.private_key(),
            )
            .unwrap(),
        )
        .unwrap();
    engine.mine().unwrap();

    let mut release =
        Transaction::new(&info.address, alice.get_address(), coins("1"), Amount::ZERO);
    lock_account.sign(&mut release).unwrap();
    let release = engine.submit_transaction(release).unwrap();

    mine_until(&engine, 10);
    assert_eq!(engine.mempool().unwrap(), vec![release.clone()]);

    mine_until(&engine, 51);
    assert!(engine.mempool().unwrap().is_empty());
    let mined = engine.find_transaction(release.get_id()).unwrap();
    assert_eq!(mined.get_block_id(), Some(50));
    assert_eq!(engine.wallet_balance(alice.get_address()).unwrap(), coins("2"));
}

#[test]
fn test_tampered_amount_fails_admission() {
    let engine = memory_engine("A", fast_settings());
    let (alice, keys) = funded(&engine, "alice", 2);
    let mut tx = Transaction::new_signed(
        alice.get_address(),
        &engine.address(),
        coins("1.5"),
        Amount::ZERO,
        keys.private_key(),
    )
    .unwrap();
    tx.set_amount(coins("0.5"));

    let err = engine.submit_transaction(tx).unwrap_err();
    assert!(matches!(err, BlockchainError::InvalidSignature(_)));
    assert!(engine.mempool().unwrap().is_empty());
}

#[test]
fn test_overspend_is_insufficient_funds() {
    let engine = memory_engine("A", fast_settings());
    let (alice, keys) = funded(&engine, "alice", 1);
    let tx = Transaction::new_signed(
        alice.get_address(),
        &engine.address(),
        coins("1"),
        coins("0.00000001"),
        keys.private_key(),
    )
    .unwrap();
    let err = engine.submit_transaction(tx).unwrap_err();
    assert_eq!(
        err,
        BlockchainError::InsufficientFunds {
            required: coins("1.00000001"),
            available: coins("1"),
        }
    );
}

#[test]
fn test_rewards_halve_on_schedule() {
    let settings = ChainSettings {
        halving_interval: 2,
        ..fast_settings()
    };
    let engine = memory_engine("A", settings);
    let rewards: Vec<Amount> = (0..5)
        .map(|_| engine.mine().unwrap().get_transactions()[0].get_amount())
        .collect();
    assert_eq!(
        rewards,
        vec![coins("1"), coins("0.5"), coins("0.5"), coins("0.25"), coins("0.25")]
    );
    assert_eq!(
        engine.wallet_balance(&engine.address()).unwrap(),
        coins("2.5")
    );
}

#[test]
fn test_deep_halving_keeps_exact_fractions() {
    let settings = ChainSettings {
        halving_interval: 1,
        ..fast_settings()
    };
    let engine = memory_engine("A", settings);
    let mut last = Amount::ZERO;
    for _ in 0..28 {
        last = engine.mine().unwrap().get_transactions()[0].get_amount();
        assert!(last.is_positive());
    }
    // 1 / 2^28, and 1/2 + 1/4 + ... + 1/2^28 = 1 - 1/2^28
    assert_eq!(last, coins("0.0000000037252902984619140625"));
    assert_eq!(
        engine.wallet_balance(&engine.address()).unwrap(),
        coins("0.9999999962747097015380859375")
    );
}

#[test]
fn test_highest_fee_first_defers_cheap_transactions() {
    let engine = memory_engine("A", fast_settings());
    engine
        .set_selection_policy(Box::new(HighestFeeFirst { cap: 1 }))
        .unwrap();
    let (alice, keys) = funded(&engine, "alice", 3);
    let send = |fee: &str| {
        Transaction::new_signed(
            alice.get_address(),
            &engine.address(),
            coins("0.5"),
            coins(fee),
            keys.private_key(),
        )
        .unwrap()
    };
    let cheap = engine.submit_transaction(send("0.01")).unwrap();
    let rich = engine.submit_transaction(send("0.2")).unwrap();

    let block = engine.mine().unwrap();
    assert_eq!(block.get_transactions().len(), 2);
    assert_eq!(block.get_transactions()[1].get_id(), rich.get_id());
    assert_eq!(engine.mempool().unwrap(), vec![cheap]);
}

#[test]
fn test_early_penalty_withdrawal_through_engine() {
    let engine = memory_engine("A", fast_settings());
    let contract = PenaltyStakingContract::new(coins("0.01"), 10, coins("0.1")).unwrap();
    let account = contract.account().clone();
    let info = engine.add_contract(Box::new(contract)).unwrap();

    let (alice, keys) = funded(&engine, "alice", 5);
    engine
        .submit_transaction(
            Transaction::new_signed(
                alice.get_address(),
                &info.address,
                coins("4"),
                Amount::ZERO,
                keys.private_key(),
            )
            .unwrap(),
        )
        .unwrap();
    let start = engine.mine().unwrap().get_index();

    engine.mine().unwrap();
    let mut withdraw =
        Transaction::new(&info.address, alice.get_address(), coins("1"), Amount::ZERO);
    account.sign(&mut withdraw).unwrap();
    engine.submit_transaction(withdraw).unwrap();
    let block = engine.mine().unwrap();
    assert_eq!(block.get_index(), start + 2);

    // 4 - 0.4 penalty + 4 * 0.01 * 2 held blocks
    assert_eq!(block.get_transactions()[1].get_amount(), coins("3.68"));
    assert!(engine
        .stake_status(&info.address, alice.get_address())
        .unwrap()
        .is_none());
}

#[test]
fn test_balances_ignore_mempool_order_but_track_chain_order() {
    let engine = memory_engine("A", fast_settings());
    let (alice, keys) = funded(&engine, "alice", 2);
    let (bob, bob_keys) = engine.create_wallet("bob").unwrap();

    let to_bob = Transaction::new_signed(
        alice.get_address(),
        bob.get_address(),
        coins("1"),
        Amount::ZERO,
        keys.private_key(),
    )
    .unwrap();
    engine.submit_transaction(to_bob).unwrap();
    engine.mine().unwrap();
    let back = Transaction::new_signed(
        bob.get_address(),
        alice.get_address(),
        coins("0.75"),
        Amount::ZERO,
        bob_keys.private_key(),
    )
    .unwrap();
    engine.submit_transaction(back).unwrap();
    let extra = Transaction::new_signed(
        alice.get_address(),
        &engine.address(),
        coins("0.5"),
        Amount::ZERO,
        keys.private_key(),
    )
    .unwrap();
    engine.submit_transaction(extra).unwrap();

    let chain = engine.chain().unwrap();
    let mut pending = engine.mempool().unwrap();
    let forward = compute_balances(&chain, Some(&pending));
    pending.reverse();
    assert_eq!(forward, compute_balances(&chain, Some(&pending)));
    assert_eq!(forward[bob.get_address()], coins("0.25"));
    assert_eq!(forward[alice.get_address()], coins("1.25"));

    // Replaying bob's spend ahead of his funding overdraws him on the way
    let in_order = LedgerProjection::replay_chain(&chain);
    assert!(in_order.overdrafts().is_empty());
    let mut spent_first = LedgerProjection::new();
    for tx in &pending {
        spent_first.apply(tx, None);
    }
    for block in &chain {
        for tx in block.get_transactions() {
            spent_first.apply(tx, Some(block.get_index()));
        }
    }
    assert!(spent_first
        .overdrafts()
        .iter()
        .any(|o| o.address == bob.get_address()));
}

#[test]
fn test_tampered_stored_block_is_caught() {
    let engine = memory_engine("A", fast_settings());
    for _ in 0..3 {
        engine.mine().unwrap();
    }
    let original = engine.get_block(2).unwrap();
    engine
        .edit_block(
            2,
            &BlockEdit {
                timestamp: None,
                signature: engine.get_block(1).unwrap().get_signature().map(String::from),
            },
        )
        .unwrap();

    let report = engine.validation_report().unwrap();
    assert!(!report.is_chain_valid);
    assert_eq!(report.signature_validity.get(&2), Some(&false));
    assert_eq!(report.signature_validity.get(&3), Some(&true));
    assert_eq!(report.valid_blocks.get(&1), Some(&true));
    assert_eq!(report.valid_blocks.get(&3), Some(&false));
    assert_eq!(engine.get_block(2).unwrap().get_hash(), original.get_hash());
}

#[test]
fn test_sled_node_survives_restart() {
    let dir = TempDir::new().unwrap();
    let keys = WalletKeys::generate().unwrap();
    let settings = fast_settings();

    let (alice_address, pending_id, tip) = {
        let store = Arc::new(SledStore::open(dir.path()).unwrap());
        let engine = NodeEngine::new("A", keys.clone(), store, settings.clone()).unwrap();
        engine.ensure_genesis().unwrap();
        let (alice, alice_keys) = funded(&engine, "alice", 2);
        engine.set_difficulty(2).unwrap();
        let tip = engine.mine().unwrap();
        let pending = engine
            .submit_transaction(
                Transaction::new_signed(
                    alice.get_address(),
                    &engine.address(),
                    coins("0.5"),
                    Amount::ZERO,
                    alice_keys.private_key(),
                )
                .unwrap(),
            )
            .unwrap();
        (alice.get_address().to_string(), pending.get_id(), tip)
    };

    let store = Arc::new(SledStore::open(dir.path()).unwrap());
    let engine = NodeEngine::new("A", keys, store, settings).unwrap();
    assert_eq!(engine.chain_length().unwrap(), 4);
    assert_eq!(engine.last_block().unwrap(), tip);
    assert_eq!(engine.difficulty(), 2);
    assert!(engine.is_chain_valid().unwrap());
    assert_eq!(engine.find_wallet(&alice_address).unwrap().get_display_name(), "alice");
    assert_eq!(engine.mempool().unwrap()[0].get_id(), pending_id);

    let next = engine.mine().unwrap();
    assert_eq!(next.get_index(), 4);
    assert!(next.get_transactions()[0].get_id() > pending_id);
    assert!(engine.mempool().unwrap().is_empty());
}

#[test]
fn test_exported_chain_imports_on_fresh_node() {
    let source = memory_engine("A", fast_settings());
    source.mine().unwrap();
    source.mine().unwrap();
    let json = to_json_pretty(&source.chain().unwrap()).unwrap();

    let chain: Vec<Block> = from_json(&json).unwrap();
    let target = NodeEngine::new(
        "B",
        WalletKeys::generate().unwrap(),
        Arc::new(MemoryStore::new()),
        fast_settings(),
    )
    .unwrap();
    assert_eq!(
        target.try_adopt_external_chain(&chain).unwrap(),
        SyncOutcome::Adopted { length: 3 }
    );
    assert_eq!(target.chain().unwrap(), source.chain().unwrap());
}

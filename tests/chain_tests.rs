//! Block application and rollback integration tests

use std::collections::BTreeMap;

use arbora::core::{
    Address, Block, EventKind, GasPaymentData, Hash, KeyPair, TokenFlags, TokenInfo, Transaction,
};
use arbora::ledger::{Chain, LedgerError, Nexus, NexusConfig};
use arbora::storage::StorageContext;
use arbora::vm::{BlockExecutor, ScriptBuilder, Value};

fn gold() -> TokenInfo {
    TokenInfo::new(
        "GOLD",
        "Gold",
        8,
        1000,
        TokenFlags::FUNGIBLE | TokenFlags::CAPPED | TokenFlags::TRANSFERABLE | TokenFlags::BURNABLE,
    )
}

fn setup_nexus() -> Nexus {
    let mut nexus = Nexus::new(NexusConfig::default()).unwrap();
    nexus.create_token(gold()).unwrap();
    nexus
}

fn mint_script(symbol: &str, to: Address, amount: u64) -> Vec<u8> {
    ScriptBuilder::new()
        .call_interop(
            "Runtime.MintTokens",
            &[
                Value::String(symbol.to_string()),
                Value::Address(to),
                Value::Number(amount),
            ],
        )
        .build()
        .unwrap()
}

fn transfer_script(symbol: &str, from: Address, to: Address, amount: u64) -> Vec<u8> {
    ScriptBuilder::new()
        .call_interop(
            "Runtime.TransferTokens",
            &[
                Value::String(symbol.to_string()),
                Value::Address(from),
                Value::Address(to),
                Value::Number(amount),
            ],
        )
        .build()
        .unwrap()
}

fn signed_tx(sender: &KeyPair, script: Vec<u8>, nonce: u64) -> Transaction {
    Transaction::new_signed(sender.public, "main", script, nonce, 1, 10_000, &sender.secret)
        .unwrap()
}

fn next_block(chain: &Chain, txs: &[Transaction]) -> Block {
    let (height, previous) = match chain.last_block() {
        Some(last) => (last.height + 1, last.hash().unwrap()),
        None => (1, Hash::NULL),
    };
    let tx_hashes: Vec<Hash> = txs.iter().map(|tx| tx.hash().unwrap()).collect();
    Block::new(height, previous, 1_700_000_000 + height, tx_hashes)
}

fn snapshot(store: &dyn StorageContext) -> BTreeMap<Vec<u8>, Vec<u8>> {
    let mut data = BTreeMap::new();
    store.visit(&mut |key, value| {
        data.insert(key.to_vec(), value.to_vec());
    });
    data
}

#[test]
fn test_empty_block_applies() {
    let mut nexus = setup_nexus();
    let root = nexus.root();

    let block = next_block(nexus.root_chain(), &[]);
    BlockExecutor::add_block(&mut nexus, &root, block, &[]).unwrap();

    assert_eq!(nexus.root_chain().height(), 1);
}

#[test]
fn test_block_with_undeclared_tx_rejected() {
    let mut nexus = setup_nexus();
    let root = nexus.root();
    let alice = KeyPair::generate();
    let alice_addr = Address::from_pubkey(&alice.public);

    let tx = signed_tx(&alice, mint_script("GOLD", alice_addr, 10), 1);
    // Empty hash list but a supplied transaction
    let block = next_block(nexus.root_chain(), &[]);
    let result = BlockExecutor::add_block(&mut nexus, &root, block, &[tx]);
    assert!(matches!(result, Err(LedgerError::BlockGeneration(_))));
}

#[test]
fn test_block_with_missing_tx_rejected() {
    let mut nexus = setup_nexus();
    let root = nexus.root();
    let alice = KeyPair::generate();
    let alice_addr = Address::from_pubkey(&alice.public);

    let tx = signed_tx(&alice, mint_script("GOLD", alice_addr, 10), 1);
    // Declared hash but the transaction is not supplied
    let block = next_block(nexus.root_chain(), &[tx]);
    let result = BlockExecutor::add_block(&mut nexus, &root, block, &[]);
    assert!(matches!(result, Err(LedgerError::BlockGeneration(_))));
}

#[test]
fn test_bad_linkage_rejected() {
    let mut nexus = setup_nexus();
    let root = nexus.root();

    let block = next_block(nexus.root_chain(), &[]);
    BlockExecutor::add_block(&mut nexus, &root, block, &[]).unwrap();

    // Wrong height
    let skipped = Block::new(5, Hash::NULL, 0, vec![]);
    let result = BlockExecutor::add_block(&mut nexus, &root, skipped, &[]);
    assert!(matches!(result, Err(LedgerError::BlockGeneration(_))));

    // Wrong previous hash
    let forked = Block::new(2, Hash::NULL, 0, vec![]);
    let result = BlockExecutor::add_block(&mut nexus, &root, forked, &[]);
    assert!(matches!(result, Err(LedgerError::BlockGeneration(_))));
}

#[test]
fn test_mint_and_transfer() {
    // Genesis chain, GOLD capped at 1000; block 1 mints 500 to Alice,
    // block 2 transfers 200 from Alice to Bob
    let mut nexus = setup_nexus();
    let root = nexus.root();
    let alice = KeyPair::generate();
    let alice_addr = Address::from_pubkey(&alice.public);
    let bob_addr = Address::from_name("bob");

    let mint = signed_tx(&alice, mint_script("GOLD", alice_addr, 500), 1);
    let block = next_block(nexus.root_chain(), &[mint.clone()]);
    BlockExecutor::add_block(&mut nexus, &root, block, &[mint]).unwrap();

    let transfer = signed_tx(&alice, transfer_script("GOLD", alice_addr, bob_addr, 200), 2);
    let block = next_block(nexus.root_chain(), &[transfer.clone()]);
    BlockExecutor::add_block(&mut nexus, &root, block, &[transfer]).unwrap();

    assert_eq!(nexus.get_token_balance(&root, "GOLD", &alice_addr).unwrap(), 300);
    assert_eq!(nexus.get_token_balance(&root, "GOLD", &bob_addr).unwrap(), 200);
    let (local, _, max) = nexus.get_token_supply(&root, "GOLD").unwrap();
    assert_eq!(local, 500);
    assert_eq!(max, 1000);
}

#[test]
fn test_execution_follows_declared_order() {
    let mut nexus = setup_nexus();
    let root = nexus.root();
    let alice = KeyPair::generate();
    let alice_addr = Address::from_pubkey(&alice.public);
    let bob_addr = Address::from_name("bob");

    let mint = signed_tx(&alice, mint_script("GOLD", alice_addr, 100), 1);
    let spend = signed_tx(&alice, transfer_script("GOLD", alice_addr, bob_addr, 50), 2);

    // The block declares mint before spend; the supplied slice is reversed
    let block = next_block(nexus.root_chain(), &[mint.clone(), spend.clone()]);
    BlockExecutor::add_block(&mut nexus, &root, block, &[spend, mint]).unwrap();

    assert_eq!(nexus.get_token_balance(&root, "GOLD", &alice_addr).unwrap(), 50);
    assert_eq!(nexus.get_token_balance(&root, "GOLD", &bob_addr).unwrap(), 50);
}

#[test]
fn test_results_and_gas_events_recorded() {
    let mut nexus = setup_nexus();
    let root = nexus.root();
    let alice = KeyPair::generate();
    let alice_addr = Address::from_pubkey(&alice.public);

    let mint = signed_tx(&alice, mint_script("GOLD", alice_addr, 10), 1);
    let mint_hash = mint.hash().unwrap();
    let block = next_block(nexus.root_chain(), &[mint.clone()]);
    BlockExecutor::add_block(&mut nexus, &root, block, &[mint]).unwrap();

    let committed = nexus
        .root_chain()
        .find_block_by_height(1)
        .unwrap()
        .unwrap();
    // Script leaves nothing on the stack: empty result
    assert_eq!(committed.result_of(&mint_hash), Some(&[] as &[u8]));

    let events = committed.events_of(&mint_hash);
    assert!(events.iter().any(|e| e.kind == EventKind::TokenMint));

    let gas_event = events
        .iter()
        .find(|e| e.kind == EventKind::GasPayment)
        .expect("gas payment event");
    assert_eq!(gas_event.address, alice_addr);
    let data: GasPaymentData = arbora::core::serialize::from_bytes(&gas_event.data).unwrap();
    assert_eq!(data.price, 1);
    assert!(data.amount > 0);
}

#[test]
fn test_rejected_block_leaves_no_trace() {
    let mut nexus = setup_nexus();
    let root = nexus.root();
    let alice = KeyPair::generate();
    let forger = KeyPair::generate();
    let alice_addr = Address::from_pubkey(&alice.public);

    let mint = signed_tx(&alice, mint_script("GOLD", alice_addr, 100), 1);
    let block = next_block(nexus.root_chain(), &[mint.clone()]);
    BlockExecutor::add_block(&mut nexus, &root, block, &[mint]).unwrap();

    let before = snapshot(nexus.root_chain().storage());
    let head_before = nexus.root_chain().last_block().unwrap().hash().unwrap();

    // Signature by the wrong key: the block must be rejected wholesale
    let mut forged = Transaction::new(
        alice.public,
        "main",
        mint_script("GOLD", alice_addr, 100),
        2,
        1,
        10_000,
    );
    forged.sign(&forger.secret).unwrap();
    let forged_hash = forged.hash().unwrap();

    let block = next_block(nexus.root_chain(), &[forged.clone()]);
    let result = BlockExecutor::add_block(&mut nexus, &root, block, &[forged]);
    match result {
        Err(LedgerError::InvalidTransaction(hash)) => assert_eq!(hash, forged_hash),
        other => panic!("expected InvalidTransaction, got {:?}", other.map(|_| ())),
    }

    assert_eq!(snapshot(nexus.root_chain().storage()), before);
    assert_eq!(
        nexus.root_chain().last_block().unwrap().hash().unwrap(),
        head_before
    );
    assert_eq!(nexus.get_token_balance(&root, "GOLD", &alice_addr).unwrap(), 100);
}

#[test]
fn test_faulting_script_rejects_block() {
    let mut nexus = setup_nexus();
    let root = nexus.root();
    let alice = KeyPair::generate();
    let alice_addr = Address::from_pubkey(&alice.public);

    let before = snapshot(nexus.root_chain().storage());

    // Minting over the cap faults during execution
    let over_cap = signed_tx(&alice, mint_script("GOLD", alice_addr, 5000), 1);
    let over_cap_hash = over_cap.hash().unwrap();
    let block = next_block(nexus.root_chain(), &[over_cap.clone()]);
    let result = BlockExecutor::add_block(&mut nexus, &root, block, &[over_cap]);

    assert!(matches!(
        result,
        Err(LedgerError::InvalidTransaction(hash)) if hash == over_cap_hash
    ));
    assert_eq!(snapshot(nexus.root_chain().storage()), before);
    assert!(nexus.root_chain().last_block().is_none());
}

#[test]
fn test_rollback_restores_state() {
    // Apply B1..B5, roll back to B2, and compare against the state
    // observed right after B2
    let mut nexus = setup_nexus();
    let root = nexus.root();
    let alice = KeyPair::generate();
    let alice_addr = Address::from_pubkey(&alice.public);

    let mut snapshots = Vec::new();
    let mut hashes = Vec::new();
    for nonce in 1..=5 {
        let mint = signed_tx(&alice, mint_script("GOLD", alice_addr, 10), nonce);
        let block = next_block(nexus.root_chain(), &[mint.clone()]);
        let hash = BlockExecutor::add_block(&mut nexus, &root, block, &[mint]).unwrap();
        hashes.push(hash);
        snapshots.push(snapshot(nexus.root_chain().storage()));
    }

    nexus.delete_blocks(&root, hashes[1]).unwrap();

    let chain = nexus.root_chain();
    assert_eq!(chain.last_block().unwrap().hash().unwrap(), hashes[1]);
    assert_eq!(chain.height(), 2);
    assert_eq!(snapshot(chain.storage()), snapshots[1]);
    assert_eq!(nexus.get_token_balance(&root, "GOLD", &alice_addr).unwrap(), 20);

    // The rolled-back blocks are gone, the survivors remain
    assert!(nexus.root_chain().contains_block(&hashes[0]));
    assert!(nexus.root_chain().contains_block(&hashes[1]));
    for gone in &hashes[2..] {
        assert!(!nexus.root_chain().contains_block(gone));
    }
}

#[test]
fn test_rollback_to_null_clears_chain() {
    let mut nexus = setup_nexus();
    let root = nexus.root();
    let alice = KeyPair::generate();
    let alice_addr = Address::from_pubkey(&alice.public);

    let before = snapshot(nexus.root_chain().storage());

    let mint = signed_tx(&alice, mint_script("GOLD", alice_addr, 10), 1);
    let block = next_block(nexus.root_chain(), &[mint.clone()]);
    BlockExecutor::add_block(&mut nexus, &root, block, &[mint]).unwrap();

    nexus.delete_blocks(&root, Hash::NULL).unwrap();

    let chain = nexus.root_chain();
    assert!(chain.last_block().is_none());
    assert!(chain.current_epoch().is_none());
    assert_eq!(snapshot(chain.storage()), before);
}

#[test]
fn test_rollback_unknown_target_fails() {
    let mut nexus = setup_nexus();
    let root = nexus.root();

    let block = next_block(nexus.root_chain(), &[]);
    BlockExecutor::add_block(&mut nexus, &root, block, &[]).unwrap();

    let bogus = arbora::core::hash_blake3(b"not a block");
    let result = nexus.delete_blocks(&root, bogus);
    assert!(matches!(result, Err(LedgerError::RollbackTargetNotFound(_))));
}

#[test]
fn test_validator_rotation_over_epochs() {
    // Three validators, one block per epoch: V0 -> V1 -> V2 -> V0
    let mut nexus = setup_nexus();
    let root = nexus.root();
    let validators: Vec<Address> = ["v0", "v1", "v2"]
        .iter()
        .map(|n| Address::from_name(n))
        .collect();
    nexus.set_validators(validators.clone());

    let mut epoch_hashes = Vec::new();
    for step in 0..3u32 {
        let block = next_block(nexus.root_chain(), &[]);
        BlockExecutor::add_block(&mut nexus, &root, block, &[]).unwrap();

        let epoch = nexus.root_chain().current_epoch().unwrap().clone();
        assert_eq!(epoch.index, step);
        assert_eq!(epoch.validator, validators[step as usize]);
        assert_eq!(epoch.block_hashes.len(), 1);
        if let Some(previous) = epoch_hashes.last() {
            assert_eq!(epoch.previous_hash, *previous);
        } else {
            assert_eq!(epoch.previous_hash, Hash::NULL);
        }
        epoch_hashes.push(epoch.hash);

        assert!(nexus.is_current_validator(&root, &validators[step as usize]));
    }

    // A fourth block wraps around to V0
    let block = next_block(nexus.root_chain(), &[]);
    BlockExecutor::add_block(&mut nexus, &root, block, &[]).unwrap();
    let epoch = nexus.root_chain().current_epoch().unwrap();
    assert_eq!(epoch.index, 3);
    assert_eq!(epoch.validator, validators[0]);
}

#[test]
fn test_tx_for_other_chain_rejected() {
    let mut nexus = setup_nexus();
    let root = nexus.root();
    nexus.create_chain("main", "side").unwrap();
    let alice = KeyPair::generate();
    let alice_addr = Address::from_pubkey(&alice.public);

    let mut tx = Transaction::new(
        alice.public,
        "side",
        mint_script("GOLD", alice_addr, 10),
        1,
        1,
        10_000,
    );
    tx.sign(&alice.secret).unwrap();

    let block = next_block(nexus.root_chain(), &[tx.clone()]);
    let result = BlockExecutor::add_block(&mut nexus, &root, block, &[tx]);
    assert!(matches!(result, Err(LedgerError::InvalidTransaction(_))));
}

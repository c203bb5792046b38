//! Contract deployment and read-only query integration tests

use std::collections::BTreeMap;

use arbora::core::{Address, Block, Contract, Hash, KeyPair, TokenFlags, TokenInfo, Transaction};
use arbora::ledger::{Chain, LedgerError, Nexus, NexusConfig};
use arbora::storage::StorageContext;
use arbora::vm::{BlockExecutor, ScriptBuilder, Value};

fn setup_nexus() -> Nexus {
    let mut nexus = Nexus::new(NexusConfig::default()).unwrap();
    nexus
        .create_token(TokenInfo::new(
            "GOLD",
            "Gold",
            8,
            1000,
            TokenFlags::FUNGIBLE | TokenFlags::CAPPED | TokenFlags::TRANSFERABLE,
        ))
        .unwrap();
    nexus
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

/// A vault contract with a getter, a setter, and a constant method
fn vault_contract() -> Contract {
    let mut contract = Contract::new("vault");
    contract.add_method(
        "get_note",
        ScriptBuilder::new()
            .call_interop("Data.Get", &[Value::String("note".to_string())])
            .build()
            .unwrap(),
    );
    contract.add_method(
        "set_note",
        ScriptBuilder::new()
            .call_interop(
                "Data.Set",
                &[
                    Value::String("note".to_string()),
                    Value::String("written".to_string()),
                ],
            )
            .build()
            .unwrap(),
    );
    contract.add_method(
        "magic",
        ScriptBuilder::new().push(Value::Number(42)).build().unwrap(),
    );
    contract.add_method(
        "broken",
        ScriptBuilder::new()
            .call_interop("No.Such.Method", &[])
            .build()
            .unwrap(),
    );
    contract.add_method("void", ScriptBuilder::new().build().unwrap());
    contract
}

#[test]
fn test_query_returns_stack_top() {
    let mut nexus = setup_nexus();
    let root = nexus.root();
    nexus
        .chain_mut(&root)
        .unwrap()
        .deploy_contract(vault_contract())
        .unwrap();

    let result = BlockExecutor::invoke_contract(&nexus, &root, "vault", "magic", &[]).unwrap();
    assert_eq!(result, Value::Number(42));
}

#[test]
fn test_query_write_attempt_fails_without_side_effects() {
    let mut nexus = setup_nexus();
    let root = nexus.root();
    nexus
        .chain_mut(&root)
        .unwrap()
        .deploy_contract(vault_contract())
        .unwrap();

    let before = snapshot(nexus.root_chain().storage());

    let result = BlockExecutor::invoke_contract(&nexus, &root, "vault", "set_note", &[]);
    assert!(matches!(result, Err(LedgerError::Chain(_))));

    assert_eq!(snapshot(nexus.root_chain().storage()), before);
    assert_eq!(nexus.root_chain().storage().get(b"data/note"), None);
}

#[test]
fn test_query_fault_and_empty_stack_fail() {
    let mut nexus = setup_nexus();
    let root = nexus.root();
    nexus
        .chain_mut(&root)
        .unwrap()
        .deploy_contract(vault_contract())
        .unwrap();

    let result = BlockExecutor::invoke_contract(&nexus, &root, "vault", "broken", &[]);
    assert!(matches!(result, Err(LedgerError::Chain(_))));

    let result = BlockExecutor::invoke_contract(&nexus, &root, "vault", "void", &[]);
    assert!(matches!(result, Err(LedgerError::Chain(_))));

    let result = BlockExecutor::invoke_contract(&nexus, &root, "vault", "missing", &[]);
    assert!(matches!(result, Err(LedgerError::Chain(_))));

    let result = BlockExecutor::invoke_contract(&nexus, &root, "ghost", "magic", &[]);
    assert!(matches!(result, Err(LedgerError::Chain(_))));
}

#[test]
fn test_contract_write_through_block_then_query() {
    let mut nexus = setup_nexus();
    let root = nexus.root();
    nexus
        .chain_mut(&root)
        .unwrap()
        .deploy_contract(vault_contract())
        .unwrap();

    let writer = KeyPair::generate();
    let script = ScriptBuilder::new()
        .call_contract("vault", "set_note", &[])
        .build()
        .unwrap();
    let tx =
        Transaction::new_signed(writer.public, "main", script, 1, 1, 10_000, &writer.secret)
            .unwrap();
    let block = next_block(nexus.root_chain(), &[tx.clone()]);
    BlockExecutor::add_block(&mut nexus, &root, block, &[tx]).unwrap();

    let result = BlockExecutor::invoke_contract(&nexus, &root, "vault", "get_note", &[]).unwrap();
    assert_eq!(result, Value::Bytes(b"written".to_vec()));
}

#[test]
fn test_shared_nexus_serializes_access() {
    let nexus = setup_nexus();
    let shared = nexus.into_shared();

    {
        let mut guard = shared.write();
        let root = guard.root();
        guard
            .mint_tokens(&root, "GOLD", &Address::from_name("alice"), 100)
            .unwrap();
    }

    let guard = shared.read();
    let root = guard.root();
    assert_eq!(
        guard
            .get_token_balance(&root, "GOLD", &Address::from_name("alice"))
            .unwrap(),
        100
    );
}

#[test]
fn test_durable_backend_selected_by_cache_size() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = NexusConfig {
        cache_size: 1024,
        data_dir: dir.path().to_path_buf(),
        ..Default::default()
    };

    let mut nexus = Nexus::new(config).unwrap();
    let root = nexus.root();
    nexus
        .create_token(TokenInfo::new(
            "GOLD",
            "Gold",
            8,
            1000,
            TokenFlags::FUNGIBLE | TokenFlags::CAPPED | TokenFlags::TRANSFERABLE,
        ))
        .unwrap();
    nexus
        .mint_tokens(&root, "GOLD", &Address::from_name("alice"), 5)
        .unwrap();

    // The root chain flushed a snapshot file named after its address
    let expected = dir.path().join(format!("{}.db", root.to_hex()));
    assert!(expected.exists());
}

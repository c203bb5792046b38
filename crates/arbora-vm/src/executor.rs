use std::collections::BTreeMap;

use arbora_core::{
    serialize, Address, Block, Event, EventKind, GasPaymentData, Hash, Transaction,
};
use arbora_ledger::{Chain, LedgerError, Nexus};
use arbora_storage::ChangeSetBundle;
use tracing::{debug, info, warn};

use crate::error::VmError;
use crate::runtime::{ExecutionState, RuntimeVM};
use crate::script::{ScriptBuilder, Value};

/// Drives all-or-nothing block application and read-only queries.
///
/// The chain owns its state; this orchestrator owns the pipeline: link
/// check, set equality, per-transaction validity, staged execution over
/// one change-set bundle, then commit and plugin hooks. Any failure
/// before commit leaves every store untouched.
pub struct BlockExecutor;

impl BlockExecutor {
    /// Apply a block and its transactions to a chain
    pub fn add_block(
        nexus: &mut Nexus,
        chain_address: &Address,
        mut block: Block,
        transactions: &[Transaction],
    ) -> Result<Hash, LedgerError> {
        let chain = nexus
            .get_chain(chain_address)
            .ok_or_else(|| LedgerError::ChainNotFound(chain_address.to_hex()))?;

        // 1. Link check
        chain.verify_linkage(&block)?;

        // 2. The supplied transactions must equal the block's declared
        //    hash list as a multiset
        let mut by_hash: BTreeMap<Hash, &Transaction> = BTreeMap::new();
        let mut available: BTreeMap<Hash, usize> = BTreeMap::new();
        for tx in transactions {
            let hash = tx.hash()?;
            by_hash.insert(hash, tx);
            *available.entry(hash).or_insert(0) += 1;
        }
        for tx_hash in &block.tx_hashes {
            match available.get_mut(tx_hash) {
                Some(count) if *count > 0 => *count -= 1,
                _ => {
                    return Err(LedgerError::BlockGeneration(format!(
                        "transaction {} missing from block inputs",
                        tx_hash
                    )))
                }
            }
        }
        if let Some((extra, _)) = available.iter().find(|(_, count)| **count > 0) {
            return Err(LedgerError::BlockGeneration(format!(
                "transaction {} not declared in block",
                extra
            )));
        }

        // 3. Per-transaction validity
        for tx in transactions {
            Self::validate_transaction(chain, tx)?;
        }

        // 4-5. Stage one bundle and execute in the block's declared order
        let mut bundle = ChangeSetBundle::new();
        let execution_order = block.tx_hashes.clone();
        for tx_hash in &execution_order {
            let tx = match by_hash.get(tx_hash) {
                Some(tx) => *tx,
                None => return Err(LedgerError::InvalidTransaction(*tx_hash)),
            };

            let (state, result, mut events, gas_used) = {
                let mut vm = RuntimeVM::new(
                    &tx.script,
                    nexus,
                    *chain_address,
                    &block,
                    Some(tx),
                    &mut bundle,
                    false,
                )
                .map_err(|e| {
                    warn!("Transaction {} carries an invalid script: {}", tx_hash, e);
                    LedgerError::InvalidTransaction(*tx_hash)
                })?;
                let state = vm.execute();
                let result = match state {
                    ExecutionState::Halt => vm
                        .result_bytes()
                        .map_err(|_| LedgerError::InvalidTransaction(*tx_hash))?,
                    _ => Vec::new(),
                };
                (state, result, vm.take_events(), vm.gas_used())
            };

            if state != ExecutionState::Halt {
                info!("Transaction {} faulted, rejecting block", tx_hash);
                return Err(LedgerError::InvalidTransaction(*tx_hash));
            }

            events.push(Self::gas_payment_event(tx, gas_used)?);
            block.set_result(*tx_hash, result);
            block.add_events(*tx_hash, events);
            debug!("Transaction {} halted using {} gas", tx_hash, gas_used);
        }

        // 6. Commit: apply the journals (home chain first), persist the
        //    block and its transactions, rotate the epoch, fire plugins
        if let Some(changes) = bundle.get(chain_address) {
            let home = nexus
                .chain_mut(chain_address)
                .ok_or_else(|| LedgerError::ChainNotFound(chain_address.to_hex()))?;
            changes.execute(home.storage_mut());
        }
        for (touched, changes) in bundle.chains() {
            if touched == chain_address {
                continue;
            }
            let chain = nexus
                .chain_mut(touched)
                .ok_or_else(|| LedgerError::ChainNotFound(touched.to_hex()))?;
            changes.execute(chain.storage_mut());
            chain.storage_mut().flush()?;
        }

        let validators = nexus.validators().to_vec();
        let blocks_per_epoch = nexus.blocks_per_epoch();
        let block_hash = block.hash()?;
        {
            let chain = nexus
                .chain_mut(chain_address)
                .ok_or_else(|| LedgerError::ChainNotFound(chain_address.to_hex()))?;
            chain.commit_block(&block, transactions, bundle, &validators, blocks_per_epoch)?;
        }

        nexus.plugin_trigger_block(chain_address, &block);
        Ok(block_hash)
    }

    /// Signature, chain applicability, and script presence
    fn validate_transaction(chain: &Chain, tx: &Transaction) -> Result<(), LedgerError> {
        let hash = tx.hash()?;
        if tx.verify_signature().is_err() {
            warn!("Transaction {} has a bad signature", hash);
            return Err(LedgerError::InvalidTransaction(hash));
        }
        if !tx.applies_to(chain.name()) {
            warn!("Transaction {} targets chain '{}'", hash, tx.chain);
            return Err(LedgerError::InvalidTransaction(hash));
        }
        if tx.script.is_empty() {
            return Err(LedgerError::InvalidTransaction(hash));
        }
        Ok(())
    }

    fn gas_payment_event(tx: &Transaction, gas_used: u64) -> Result<Event, LedgerError> {
        let payer = Address::from_pubkey(&tx.sender);
        let data = serialize::to_bytes(&GasPaymentData {
            price: tx.gas_price,
            amount: gas_used,
        })?;
        Ok(Event::new(EventKind::GasPayment, payer, data))
    }

    /// Out-of-band query: run a contract method in a read-only VM over a
    /// throw-away change set and decode the top of the stack
    pub fn invoke_contract(
        nexus: &Nexus,
        chain_address: &Address,
        contract: &str,
        method: &str,
        args: &[Value],
    ) -> Result<Value, LedgerError> {
        let chain = nexus
            .get_chain(chain_address)
            .ok_or_else(|| LedgerError::ChainNotFound(chain_address.to_hex()))?;

        let deployed = chain
            .contract(contract)
            .ok_or_else(|| LedgerError::Chain(format!("contract '{}' not found", contract)))?;
        if deployed.method(method).is_none() {
            return Err(LedgerError::Chain(format!(
                "method '{}' not found on contract '{}'",
                method, contract
            )));
        }

        let script = ScriptBuilder::new()
            .call_contract(contract, method, args)
            .build()?;

        let (previous_hash, height, timestamp) = match chain.last_block() {
            Some(last) => (last.hash()?, last.height + 1, last.timestamp),
            None => (Hash::NULL, 1, 0),
        };
        let block = Block::new(height, previous_hash, timestamp, vec![]);

        let mut bundle = ChangeSetBundle::new();
        let mut vm = RuntimeVM::new(
            &script,
            nexus,
            *chain_address,
            &block,
            None,
            &mut bundle,
            true,
        )
        .map_err(|e: VmError| LedgerError::Chain(e.to_string()))?;

        match vm.execute() {
            ExecutionState::Halt => vm.stack.pop().ok_or_else(|| {
                LedgerError::Chain(format!(
                    "query {}.{} returned no value",
                    contract, method
                ))
            }),
            _ => Err(LedgerError::Chain(format!(
                "query {}.{} did not halt",
                contract, method
            ))),
        }
    }
}

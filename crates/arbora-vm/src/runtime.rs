use arbora_core::{serialize, Address, Block, Event, EventKind, Transaction};
use arbora_ledger::Nexus;
use arbora_storage::{ChangeSetBundle, ChangeSetView};
use tracing::{debug, warn};

use crate::error::VmError;
use crate::interop;
use crate::script::{decode_script, ScriptOp, Value};

/// Gas cost per pushed literal
pub const GAS_PUSH: u64 = 1;
/// Gas cost per interop invocation
pub const GAS_INTEROP: u64 = 8;
/// Gas cost per contract method call
pub const GAS_CALL: u64 = 16;
/// Gas limit for out-of-band queries with no transaction context
pub const QUERY_GAS_LIMIT: u64 = 100_000;

const MAX_CALL_DEPTH: u32 = 8;

/// Terminal and intermediate execution states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Running,
    Halt,
    Fault,
}

/// Executes one transaction script against ledger state.
///
/// All side effects flow into the change-set bundle keyed by chain
/// address; the nexus is only ever read. Loading another execution
/// context rebinds the current chain, and `Notify` appends to the event
/// list harvested by block application.
pub struct RuntimeVM<'a> {
    ops: Vec<ScriptOp>,
    pub stack: Vec<Value>,
    nexus: &'a Nexus,
    /// Chain the transaction was submitted to
    home: Address,
    /// Currently bound execution context
    current: Address,
    block: &'a Block,
    tx: Option<&'a Transaction>,
    changes: &'a mut ChangeSetBundle,
    events: Vec<Event>,
    read_only: bool,
    gas_used: u64,
    gas_limit: u64,
    depth: u32,
}

impl<'a> RuntimeVM<'a> {
    pub fn new(
        script: &[u8],
        nexus: &'a Nexus,
        chain: Address,
        block: &'a Block,
        tx: Option<&'a Transaction>,
        changes: &'a mut ChangeSetBundle,
        read_only: bool,
    ) -> Result<Self, VmError> {
        let ops = decode_script(script)?;
        let gas_limit = tx.map(|t| t.gas_limit).unwrap_or(QUERY_GAS_LIMIT);

        Ok(RuntimeVM {
            ops,
            stack: Vec::new(),
            nexus,
            home: chain,
            current: chain,
            block,
            tx,
            changes,
            events: Vec::new(),
            read_only,
            gas_used: 0,
            gas_limit,
            depth: 0,
        })
    }

    /// Run the script to a terminal state. Reaching the end of the
    /// script halts; any handler error or unknown method faults.
    pub fn execute(&mut self) -> ExecutionState {
        let ops = std::mem::take(&mut self.ops);
        match self.run_ops(&ops) {
            Ok(ExecutionState::Running) | Ok(ExecutionState::Halt) => ExecutionState::Halt,
            Ok(ExecutionState::Fault) => ExecutionState::Fault,
            Err(e) => {
                warn!("VM fault: {}", e);
                ExecutionState::Fault
            }
        }
    }

    fn run_ops(&mut self, ops: &[ScriptOp]) -> Result<ExecutionState, VmError> {
        for op in ops {
            match self.step(op)? {
                ExecutionState::Running => {}
                terminal => return Ok(terminal),
            }
        }
        Ok(ExecutionState::Running)
    }

    fn step(&mut self, op: &ScriptOp) -> Result<ExecutionState, VmError> {
        match op {
            ScriptOp::Push(value) => {
                self.consume_gas(GAS_PUSH)?;
                self.stack.push(value.clone());
                Ok(ExecutionState::Running)
            }
            ScriptOp::Interop(name) => {
                self.consume_gas(GAS_INTEROP)?;
                let handler =
                    interop::lookup(name).ok_or_else(|| VmError::UnknownMethod(name.clone()))?;
                handler(self)
            }
            ScriptOp::CallContract { contract, method } => {
                self.consume_gas(GAS_CALL)?;
                if self.depth >= MAX_CALL_DEPTH {
                    return Err(VmError::CallDepthExceeded);
                }
                let body = {
                    let chain = self
                        .nexus
                        .get_chain(&self.current)
                        .ok_or_else(|| VmError::ChainNotFound(self.current.to_hex()))?;
                    let contract = chain
                        .contract(contract)
                        .ok_or_else(|| VmError::ContractNotFound(contract.clone()))?;
                    contract
                        .method(method)
                        .ok_or_else(|| VmError::MethodNotFound(method.clone()))?
                        .to_vec()
                };
                let ops = decode_script(&body)?;
                debug!("Calling {}.{} at depth {}", contract, method, self.depth);
                self.depth += 1;
                let state = self.run_ops(&ops);
                self.depth -= 1;
                state
            }
        }
    }

    // Gas accounting

    fn consume_gas(&mut self, amount: u64) -> Result<(), VmError> {
        let used = self.gas_used.saturating_add(amount);
        if used > self.gas_limit {
            return Err(VmError::OutOfGas {
                limit: self.gas_limit,
            });
        }
        self.gas_used = used;
        Ok(())
    }

    pub fn gas_used(&self) -> u64 {
        self.gas_used
    }

    // Stack access for interop handlers

    pub fn pop(&mut self) -> Result<Value, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    pub fn pop_number(&mut self) -> Result<u64, VmError> {
        self.pop()?
            .as_number()
            .ok_or(VmError::TypeMismatch("number"))
    }

    pub fn pop_string(&mut self) -> Result<String, VmError> {
        match self.pop()? {
            Value::String(s) => Ok(s),
            _ => Err(VmError::TypeMismatch("string")),
        }
    }

    pub fn pop_address(&mut self) -> Result<Address, VmError> {
        self.pop()?
            .as_address()
            .ok_or(VmError::TypeMismatch("address"))
    }

    // Context

    pub fn nexus(&self) -> &Nexus {
        self.nexus
    }

    pub fn block(&self) -> &Block {
        self.block
    }

    pub fn transaction(&self) -> Option<&Transaction> {
        self.tx
    }

    pub fn home_chain(&self) -> Address {
        self.home
    }

    pub fn current_chain(&self) -> Address {
        self.current
    }

    /// Bind another chain from the nexus tree as the current execution
    /// context; its storage backs subsequent data and sheet operations
    pub fn load_context(&mut self, address: Address) -> Result<(), VmError> {
        if self.nexus.get_chain(&address).is_none() {
            return Err(VmError::ChainNotFound(address.to_hex()));
        }
        debug!("Binding execution context to chain {}", address.to_hex());
        self.current = address;
        Ok(())
    }

    /// Fail unless the VM may mutate state
    pub fn expect_writable(&self) -> Result<(), VmError> {
        if self.read_only {
            return Err(VmError::ReadOnlyContext);
        }
        Ok(())
    }

    /// Fail unless the transaction was signed by the named address
    pub fn expect_witness(&self, address: &Address) -> Result<(), VmError> {
        match self.tx {
            Some(tx) if Address::from_pubkey(&tx.sender) == *address => Ok(()),
            _ => Err(VmError::WitnessFailed(*address)),
        }
    }

    // Storage access through the change-set bundle

    /// Read a key on the current chain, seeing buffered writes first
    pub fn storage_get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, VmError> {
        let chain = self
            .nexus
            .get_chain(&self.current)
            .ok_or_else(|| VmError::ChainNotFound(self.current.to_hex()))?;
        Ok(self.changes.entry(self.current).get(chain.storage(), key))
    }

    /// Buffer a write on the current chain
    pub fn storage_put(&mut self, key: &[u8], value: &[u8]) -> Result<(), VmError> {
        self.expect_writable()?;
        let chain = self
            .nexus
            .get_chain(&self.current)
            .ok_or_else(|| VmError::ChainNotFound(self.current.to_hex()))?;
        self.changes.entry(self.current).put(chain.storage(), key, value);
        Ok(())
    }

    /// Buffer a deletion on the current chain
    pub fn storage_delete(&mut self, key: &[u8]) -> Result<(), VmError> {
        self.expect_writable()?;
        let chain = self
            .nexus
            .get_chain(&self.current)
            .ok_or_else(|| VmError::ChainNotFound(self.current.to_hex()))?;
        self.changes.entry(self.current).delete(chain.storage(), key);
        Ok(())
    }

    /// Run a closure over a storage view of the current chain that sees
    /// and buffers through the change set
    pub fn with_storage_view<R>(
        &mut self,
        f: impl FnOnce(&mut ChangeSetView<'_>) -> R,
    ) -> Result<R, VmError> {
        let chain = self
            .nexus
            .get_chain(&self.current)
            .ok_or_else(|| VmError::ChainNotFound(self.current.to_hex()))?;
        let changes = self.changes.entry(self.current);
        let mut view = ChangeSetView::new(chain.storage(), changes);
        Ok(f(&mut view))
    }

    // Events

    /// Serialize the content (null becomes empty) and append an event
    pub fn notify(&mut self, kind: EventKind, address: Address, content: &Value) -> Result<(), VmError> {
        let data = content.to_payload_bytes()?;
        self.events.push(Event::new(kind, address, data));
        Ok(())
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Serialized top of stack after a halt; empty when the stack is empty
    pub fn result_bytes(&self) -> Result<Vec<u8>, VmError> {
        match self.stack.last() {
            Some(value) => Ok(serialize::to_bytes(value)?),
            None => Ok(Vec::new()),
        }
    }
}

//! The interop registration table: named host methods callable from
//! scripts. Handlers take the VM context and return an execution state;
//! any handler error surfaces as a fault in the calling VM.

use arbora_core::{serialize, Event, EventKind, TokenEventData, TokenInfo};
use arbora_ledger::{BalanceSheet, OwnershipSheet, SupplySheet};
use tracing::{debug, info};

use crate::error::VmError;
use crate::script::Value;
use crate::runtime::{ExecutionState, RuntimeVM};

pub type InteropHandler = fn(&mut RuntimeVM<'_>) -> Result<ExecutionState, VmError>;

/// Resolve a method name to its handler; unknown names fault the caller
pub fn lookup(name: &str) -> Option<InteropHandler> {
    Some(match name {
        "Runtime.Log" => runtime_log,
        "Runtime.Notify" => runtime_notify,
        "Runtime.Time" => runtime_time,
        "Runtime.TransactionHash" => runtime_transaction_hash,
        "Runtime.Context" => runtime_context,
        "Runtime.MintTokens" => runtime_mint_tokens,
        "Runtime.BurnTokens" => runtime_burn_tokens,
        "Runtime.TransferTokens" => runtime_transfer_tokens,
        "Runtime.MintToken" => runtime_mint_token,
        "Runtime.SendToken" => runtime_send_token,
        "Data.Get" => data_get,
        "Data.Set" => data_set,
        "Data.Delete" => data_delete,
        _ => return None,
    })
}

fn data_key(key: &[u8]) -> Vec<u8> {
    let mut full = b"data/".to_vec();
    full.extend_from_slice(key);
    full
}

fn fungible_token(vm: &RuntimeVM<'_>, symbol: &str) -> Result<TokenInfo, VmError> {
    let token = vm
        .nexus()
        .get_token(symbol)
        .ok_or_else(|| VmError::TokenNotFound(symbol.to_string()))?;
    if !token.is_fungible() {
        return Err(VmError::InvalidToken(format!("{} is not fungible", symbol)));
    }
    Ok(token.clone())
}

fn non_fungible_token(vm: &RuntimeVM<'_>, symbol: &str) -> Result<TokenInfo, VmError> {
    let token = vm
        .nexus()
        .get_token(symbol)
        .ok_or_else(|| VmError::TokenNotFound(symbol.to_string()))?;
    if token.is_fungible() {
        return Err(VmError::InvalidToken(format!("{} is fungible", symbol)));
    }
    Ok(token.clone())
}

fn token_event(kind: EventKind, address: arbora_core::Address, symbol: &str, value: u64) -> Result<Event, VmError> {
    let data = serialize::to_bytes(&TokenEventData {
        symbol: symbol.to_string(),
        value,
    })?;
    Ok(Event::new(kind, address, data))
}

// Runtime family

/// `Runtime.Log(message)`
fn runtime_log(vm: &mut RuntimeVM<'_>) -> Result<ExecutionState, VmError> {
    let message = vm.pop_string()?;
    info!("[script] {}", message);
    Ok(ExecutionState::Running)
}

/// `Runtime.Notify(kind, address, content)` - custom event emission
fn runtime_notify(vm: &mut RuntimeVM<'_>) -> Result<ExecutionState, VmError> {
    let kind = vm.pop_number()?;
    let address = vm.pop_address()?;
    let content = vm.pop()?;
    vm.notify(EventKind::Custom(kind as u32), address, &content)?;
    Ok(ExecutionState::Running)
}

/// `Runtime.Time()` - push the block timestamp
fn runtime_time(vm: &mut RuntimeVM<'_>) -> Result<ExecutionState, VmError> {
    let timestamp = vm.block().timestamp;
    vm.stack.push(Value::Number(timestamp));
    Ok(ExecutionState::Running)
}

/// `Runtime.TransactionHash()` - push the executing transaction's hash
fn runtime_transaction_hash(vm: &mut RuntimeVM<'_>) -> Result<ExecutionState, VmError> {
    let value = match vm.transaction() {
        Some(tx) => Value::Hash(tx.hash()?),
        None => Value::Null,
    };
    vm.stack.push(value);
    Ok(ExecutionState::Running)
}

/// `Runtime.Context(address)` - bind another chain as the execution context
fn runtime_context(vm: &mut RuntimeVM<'_>) -> Result<ExecutionState, VmError> {
    let address = vm.pop_address()?;
    vm.load_context(address)?;
    Ok(ExecutionState::Running)
}

// Token family

/// `Runtime.MintTokens(symbol, to, amount)`
fn runtime_mint_tokens(vm: &mut RuntimeVM<'_>) -> Result<ExecutionState, VmError> {
    vm.expect_writable()?;
    let symbol = vm.pop_string()?;
    let to = vm.pop_address()?;
    let amount = vm.pop_number()?;

    let token = fungible_token(vm, &symbol)?;
    let supply = SupplySheet::new(&symbol);
    let balances = BalanceSheet::new(&symbol);

    vm.with_storage_view(|view| -> Result<(), VmError> {
        if token.is_capped() {
            supply.mint(view, amount)?;
        }
        balances.add(view, &to, amount);
        Ok(())
    })??;

    debug!("Minted {} {} to {}", amount, symbol, to);
    vm.emit(token_event(EventKind::TokenMint, to, &symbol, amount)?);
    Ok(ExecutionState::Running)
}

/// `Runtime.BurnTokens(symbol, from, amount)`
fn runtime_burn_tokens(vm: &mut RuntimeVM<'_>) -> Result<ExecutionState, VmError> {
    vm.expect_writable()?;
    let symbol = vm.pop_string()?;
    let from = vm.pop_address()?;
    let amount = vm.pop_number()?;

    let token = fungible_token(vm, &symbol)?;
    if !token.is_burnable() {
        return Err(VmError::InvalidToken(format!("{} is not burnable", symbol)));
    }
    vm.expect_witness(&from)?;

    let supply = SupplySheet::new(&symbol);
    let balances = BalanceSheet::new(&symbol);

    vm.with_storage_view(|view| -> Result<(), VmError> {
        balances.subtract(view, &from, amount)?;
        if token.is_capped() {
            supply.burn(view, amount)?;
        }
        Ok(())
    })??;

    vm.emit(token_event(EventKind::TokenBurn, from, &symbol, amount)?);
    Ok(ExecutionState::Running)
}

/// `Runtime.TransferTokens(symbol, from, to, amount)`
fn runtime_transfer_tokens(vm: &mut RuntimeVM<'_>) -> Result<ExecutionState, VmError> {
    vm.expect_writable()?;
    let symbol = vm.pop_string()?;
    let from = vm.pop_address()?;
    let to = vm.pop_address()?;
    let amount = vm.pop_number()?;

    let token = fungible_token(vm, &symbol)?;
    if !token.is_transferable() {
        return Err(VmError::InvalidToken(format!(
            "{} is not transferable",
            symbol
        )));
    }
    vm.expect_witness(&from)?;

    let balances = BalanceSheet::new(&symbol);
    vm.with_storage_view(|view| balances.transfer(view, &from, &to, amount))??;

    debug!("Transferred {} {} from {} to {}", amount, symbol, from, to);
    vm.emit(token_event(EventKind::TokenSend, from, &symbol, amount)?);
    vm.emit(token_event(EventKind::TokenReceive, to, &symbol, amount)?);
    Ok(ExecutionState::Running)
}

/// `Runtime.MintToken(symbol, to, id)` - non-fungible mint
fn runtime_mint_token(vm: &mut RuntimeVM<'_>) -> Result<ExecutionState, VmError> {
    vm.expect_writable()?;
    let symbol = vm.pop_string()?;
    let to = vm.pop_address()?;
    let id = vm.pop_number()?;

    non_fungible_token(vm, &symbol)?;
    let ownership = OwnershipSheet::new(&symbol);
    vm.with_storage_view(|view| ownership.give(view, &to, id))??;

    vm.emit(token_event(EventKind::TokenMint, to, &symbol, id)?);
    Ok(ExecutionState::Running)
}

/// `Runtime.SendToken(symbol, from, to, id)` - non-fungible transfer
fn runtime_send_token(vm: &mut RuntimeVM<'_>) -> Result<ExecutionState, VmError> {
    vm.expect_writable()?;
    let symbol = vm.pop_string()?;
    let from = vm.pop_address()?;
    let to = vm.pop_address()?;
    let id = vm.pop_number()?;

    let token = non_fungible_token(vm, &symbol)?;
    if !token.is_transferable() {
        return Err(VmError::InvalidToken(format!(
            "{} is not transferable",
            symbol
        )));
    }
    vm.expect_witness(&from)?;

    let ownership = OwnershipSheet::new(&symbol);
    vm.with_storage_view(|view| ownership.transfer(view, &from, &to, id))??;

    vm.emit(token_event(EventKind::TokenSend, from, &symbol, id)?);
    vm.emit(token_event(EventKind::TokenReceive, to, &symbol, id)?);
    Ok(ExecutionState::Running)
}

// Data family: contract-visible chain storage

/// `Data.Get(key)` - push the stored bytes or null
fn data_get(vm: &mut RuntimeVM<'_>) -> Result<ExecutionState, VmError> {
    let key = vm.pop()?.to_payload_bytes()?;
    let value = vm.storage_get(&data_key(&key))?;
    vm.stack.push(match value {
        Some(bytes) => Value::Bytes(bytes),
        None => Value::Null,
    });
    Ok(ExecutionState::Running)
}

/// `Data.Set(key, value)`
fn data_set(vm: &mut RuntimeVM<'_>) -> Result<ExecutionState, VmError> {
    let key = vm.pop()?.to_payload_bytes()?;
    let value = vm.pop()?.to_payload_bytes()?;
    vm.storage_put(&data_key(&key), &value)?;
    Ok(ExecutionState::Running)
}

/// `Data.Delete(key)`
fn data_delete(vm: &mut RuntimeVM<'_>) -> Result<ExecutionState, VmError> {
    let key = vm.pop()?.to_payload_bytes()?;
    vm.storage_delete(&data_key(&key))?;
    Ok(ExecutionState::Running)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_and_unknown() {
        assert!(lookup("Runtime.TransferTokens").is_some());
        assert!(lookup("Data.Get").is_some());
        assert!(lookup("Runtime.DoesNotExist").is_none());
    }

    #[test]
    fn test_data_key_prefixed() {
        assert_eq!(data_key(b"counter"), b"data/counter".to_vec());
    }
}

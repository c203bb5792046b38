use serde::{Deserialize, Serialize};

use crate::types::address::Address;

/// Kinds of events emitted during transaction execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    ChainCreate,
    TokenCreate,
    TokenMint,
    TokenBurn,
    TokenSend,
    TokenReceive,
    ContractDeploy,
    GasPayment,
    Custom(u32),
}

/// An event recorded against a transaction inside a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub address: Address,
    /// Length-prefixed payload; empty when the emitter passed nothing
    pub data: Vec<u8>,
}

impl Event {
    pub fn new(kind: EventKind, address: Address, data: Vec<u8>) -> Self {
        Event {
            kind,
            address,
            data,
        }
    }
}

/// Payload of a `GasPayment` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPaymentData {
    pub price: u64,
    pub amount: u64,
}

/// Payload of token mint, burn, send, and receive events. For
/// non-fungible tokens `value` carries the token ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEventData {
    pub symbol: String,
    pub value: u64,
}

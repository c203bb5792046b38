use arbora_core::{serialize, Address, CoreError, Hash};
use serde::{Deserialize, Serialize};

use crate::error::VmError;

/// A value on the VM stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Number(u64),
    Bytes(Vec<u8>),
    String(String),
    Address(Address),
    Hash(Hash),
}

impl Value {
    pub fn as_number(&self) -> Option<u64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            Value::Address(a) => Some(*a),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Raw payload bytes: bytes and strings pass through, null is empty,
    /// everything else is serialized
    pub fn to_payload_bytes(&self) -> Result<Vec<u8>, CoreError> {
        match self {
            Value::Null => Ok(Vec::new()),
            Value::Bytes(bytes) => Ok(bytes.clone()),
            Value::String(s) => Ok(s.as_bytes().to_vec()),
            other => serialize::to_bytes(other),
        }
    }
}

/// The execution contract of a script: push literals, call registered
/// interop methods, call deployed contract methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptOp {
    Push(Value),
    Interop(String),
    CallContract { contract: String, method: String },
}

/// Encode a script to its serialized transaction form
pub fn encode_script(ops: &[ScriptOp]) -> Result<Vec<u8>, CoreError> {
    serialize::to_bytes(&ops.to_vec())
}

/// Decode a serialized script
pub fn decode_script(bytes: &[u8]) -> Result<Vec<ScriptOp>, VmError> {
    serialize::from_bytes(bytes).map_err(|e| VmError::InvalidScript(e.to_string()))
}

/// Host-side script assembly. Arguments are pushed in reverse so that
/// handlers pop them in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ScriptBuilder {
    ops: Vec<ScriptOp>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        ScriptBuilder::default()
    }

    pub fn push(mut self, value: Value) -> Self {
        self.ops.push(ScriptOp::Push(value));
        self
    }

    pub fn call_interop(mut self, method: &str, args: &[Value]) -> Self {
        for arg in args.iter().rev() {
            self.ops.push(ScriptOp::Push(arg.clone()));
        }
        self.ops.push(ScriptOp::Interop(method.to_string()));
        self
    }

    pub fn call_contract(mut self, contract: &str, method: &str, args: &[Value]) -> Self {
        for arg in args.iter().rev() {
            self.ops.push(ScriptOp::Push(arg.clone()));
        }
        self.ops.push(ScriptOp::CallContract {
            contract: contract.to_string(),
            method: method.to_string(),
        });
        self
    }

    pub fn ops(self) -> Vec<ScriptOp> {
        self.ops
    }

    pub fn build(self) -> Result<Vec<u8>, CoreError> {
        encode_script(&self.ops)
    }
}

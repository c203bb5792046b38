use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::address::Address;

/// A deployed contract: a named table of methods, each holding a
/// serialized script executed by the runtime VM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub name: String,
    pub address: Address,
    /// Method name to serialized script body
    pub methods: BTreeMap<String, Vec<u8>>,
}

impl Contract {
    pub fn new(name: &str) -> Self {
        Contract {
            name: name.to_string(),
            address: Address::from_name(name),
            methods: BTreeMap::new(),
        }
    }

    /// Register a method body, replacing any previous definition
    pub fn add_method(&mut self, method: &str, script: Vec<u8>) {
        self.methods.insert(method.to_string(), script);
    }

    pub fn method(&self, name: &str) -> Option<&[u8]> {
        self.methods.get(name).map(|s| s.as_slice())
    }
}

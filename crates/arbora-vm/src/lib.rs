//! Arbora VM - the runtime VM bridge and block application
//!
//! Executes transaction scripts deterministically against a change-set
//! bundle, mediates side effects through registered interop methods,
//! collects events, and drives the all-or-nothing block application
//! pipeline.

pub mod error;
pub mod executor;
pub mod interop;
pub mod runtime;
pub mod script;

pub use error::VmError;
pub use executor::BlockExecutor;
pub use runtime::{ExecutionState, RuntimeVM};
pub use script::{decode_script, encode_script, ScriptBuilder, ScriptOp, Value};

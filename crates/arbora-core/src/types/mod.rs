pub mod address;
pub mod block;
pub mod contract;
pub mod epoch;
pub mod event;
pub mod token;
pub mod transaction;

pub use address::Address;
pub use block::Block;
pub use contract::Contract;
pub use epoch::Epoch;
pub use event::{Event, EventKind, GasPaymentData, TokenEventData};
pub use token::{TokenFlags, TokenInfo};
pub use transaction::Transaction;

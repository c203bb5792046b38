pub mod balance;
pub mod ownership;
pub mod supply;

pub use balance::BalanceSheet;
pub use ownership::OwnershipSheet;
pub use supply::SupplySheet;

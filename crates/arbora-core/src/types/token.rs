use serde::{Deserialize, Serialize};
use std::ops::BitOr;

/// Bit set describing token behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TokenFlags(pub u32);

impl TokenFlags {
    pub const NONE: TokenFlags = TokenFlags(0);
    /// Divisible balances tracked per address
    pub const FUNGIBLE: TokenFlags = TokenFlags(1 << 0);
    /// Finite max supply enforced across the chain tree
    pub const CAPPED: TokenFlags = TokenFlags(1 << 1);
    /// Holders may transfer to other addresses
    pub const TRANSFERABLE: TokenFlags = TokenFlags(1 << 2);
    /// Holders may destroy their balance
    pub const BURNABLE: TokenFlags = TokenFlags(1 << 3);

    pub fn contains(&self, other: TokenFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for TokenFlags {
    type Output = TokenFlags;

    fn bitor(self, rhs: TokenFlags) -> TokenFlags {
        TokenFlags(self.0 | rhs.0)
    }
}

/// Descriptor for a registered token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Ticker symbol, unique within a nexus
    pub symbol: String,
    /// Human-readable name
    pub name: String,
    /// Decimal places
    pub decimals: u8,
    /// Maximum supply; meaningful only for capped tokens
    pub max_supply: u64,
    /// Behavior flags
    pub flags: TokenFlags,
}

impl TokenInfo {
    pub fn new(symbol: &str, name: &str, decimals: u8, max_supply: u64, flags: TokenFlags) -> Self {
        TokenInfo {
            symbol: symbol.to_string(),
            name: name.to_string(),
            decimals,
            max_supply,
            flags,
        }
    }

    pub fn is_fungible(&self) -> bool {
        self.flags.contains(TokenFlags::FUNGIBLE)
    }

    pub fn is_capped(&self) -> bool {
        self.flags.contains(TokenFlags::CAPPED)
    }

    pub fn is_transferable(&self) -> bool {
        self.flags.contains(TokenFlags::TRANSFERABLE)
    }

    pub fn is_burnable(&self) -> bool {
        self.flags.contains(TokenFlags::BURNABLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_combination() {
        let flags = TokenFlags::FUNGIBLE | TokenFlags::CAPPED;
        assert!(flags.contains(TokenFlags::FUNGIBLE));
        assert!(flags.contains(TokenFlags::CAPPED));
        assert!(!flags.contains(TokenFlags::TRANSFERABLE));
    }

    #[test]
    fn test_token_info_predicates() {
        let token = TokenInfo::new(
            "GOLD",
            "Gold",
            8,
            1000,
            TokenFlags::FUNGIBLE | TokenFlags::CAPPED | TokenFlags::TRANSFERABLE,
        );
        assert!(token.is_fungible());
        assert!(token.is_capped());
        assert!(token.is_transferable());
        assert!(!token.is_burnable());
    }
}

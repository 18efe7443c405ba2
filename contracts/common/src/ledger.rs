//! Token Ledger Module
//!
//! ERC-20 style balances and allowances for every token in the system.
//! Contracts move value exclusively through this ledger, so a snapshot of
//! it captures every balance at once.
//!
//! ## Key Features
//!
//! - **Multi-token**: balances keyed by (token, holder)
//! - **Allowances**: `approve` / `transfer_from` with unlimited approval at `u128::MAX`
//! - **Conservation**: transfers never change total supply

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::precision::TOKEN_DECIMALS;
use crate::events::{EventLog, ShieldEvent};
use crate::types::{derive_address, format_address, is_zero_address, Address, CallContext, ZERO_ADDRESS};
use crate::{ShieldError, ShieldResult};

// ============================================================================
// Types
// ============================================================================

/// Token metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: u128,
}

/// Balances and allowances for all tokens
#[derive(Debug, Clone, Default)]
pub struct TokenLedger {
    tokens: BTreeMap<Address, TokenInfo>,
    balances: BTreeMap<(Address, Address), u128>,
    allowances: BTreeMap<(Address, Address, Address), u128>,
    nonce: u64,
    events: EventLog,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new token; its address is derived from the creator and a nonce
    pub fn create_token(&mut self, ctx: &CallContext, name: &str, symbol: &str) -> Address {
        self.nonce += 1;
        let token = derive_address(&ctx.caller, self.nonce);

        self.tokens.insert(
            token,
            TokenInfo {
                name: name.to_string(),
                symbol: symbol.to_string(),
                decimals: TOKEN_DECIMALS,
                total_supply: 0,
            },
        );

        log::debug!("token {} created at {}", symbol, format_address(&token));
        self.events.emit(ShieldEvent::TokenCreated {
            token,
            symbol: symbol.to_string(),
            block_height: ctx.block_height,
        });
        token
    }

    /// Token metadata
    pub fn token_info(&self, token: &Address) -> ShieldResult<&TokenInfo> {
        self.tokens.get(token).ok_or(ShieldError::UnknownToken { token: *token })
    }

    /// Mint new tokens to `to`
    pub fn mint(&mut self, ctx: &CallContext, token: Address, to: Address, amount: u128) -> ShieldResult<()> {
        if is_zero_address(&to) {
            return Err(ShieldError::InvalidAddress);
        }

        let info = self.tokens.get_mut(&token).ok_or(ShieldError::UnknownToken { token })?;
        let new_supply = info.total_supply.checked_add(amount).ok_or(ShieldError::Overflow)?;
        let balance = self.balances.get(&(token, to)).copied().unwrap_or(0);
        let new_balance = balance.checked_add(amount).ok_or(ShieldError::Overflow)?;

        info.total_supply = new_supply;
        self.balances.insert((token, to), new_balance);

        self.events.emit(ShieldEvent::Transfer {
            token,
            from: ZERO_ADDRESS,
            to,
            amount,
            block_height: ctx.block_height,
        });
        Ok(())
    }

    pub fn balance_of(&self, token: &Address, holder: &Address) -> u128 {
        self.balances.get(&(*token, *holder)).copied().unwrap_or(0)
    }

    pub fn total_supply(&self, token: &Address) -> u128 {
        self.tokens.get(token).map(|info| info.total_supply).unwrap_or(0)
    }

    /// Move `amount` of `token` from the caller to `to`
    pub fn transfer(&mut self, ctx: &CallContext, token: Address, to: Address, amount: u128) -> ShieldResult<()> {
        self.move_balance(token, ctx.caller, to, amount, ctx.block_height)
    }

    /// Set the caller's allowance for `spender`
    pub fn approve(&mut self, ctx: &CallContext, token: Address, spender: Address, amount: u128) -> ShieldResult<()> {
        if is_zero_address(&spender) {
            return Err(ShieldError::InvalidAddress);
        }
        self.token_info(&token)?;

        self.allowances.insert((token, ctx.caller, spender), amount);
        self.events.emit(ShieldEvent::Approval {
            token,
            owner: ctx.caller,
            spender,
            amount,
            block_height: ctx.block_height,
        });
        Ok(())
    }

    pub fn allowance(&self, token: &Address, owner: &Address, spender: &Address) -> u128 {
        self.allowances.get(&(*token, *owner, *spender)).copied().unwrap_or(0)
    }

    /// Move `amount` from `from` to `to`, spending the caller's allowance
    pub fn transfer_from(
        &mut self,
        ctx: &CallContext,
        token: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> ShieldResult<()> {
        let key = (token, from, ctx.caller);
        let allowed = self.allowances.get(&key).copied().unwrap_or(0);
        if allowed < amount {
            return Err(ShieldError::InsufficientAllowance { available: allowed, requested: amount });
        }

        self.move_balance(token, from, to, amount, ctx.block_height)?;

        if allowed != u128::MAX {
            self.allowances.insert(key, allowed - amount);
        }
        Ok(())
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    fn move_balance(&mut self, token: Address, from: Address, to: Address, amount: u128, block_height: u64) -> ShieldResult<()> {
        if is_zero_address(&to) {
            return Err(ShieldError::InvalidAddress);
        }
        self.token_info(&token)?;

        let from_balance = self.balance_of(&token, &from);
        if from_balance < amount {
            return Err(ShieldError::InsufficientBalance { available: from_balance, requested: amount });
        }

        if from != to {
            let to_balance = self.balance_of(&token, &to);
            let new_to = to_balance.checked_add(amount).ok_or(ShieldError::Overflow)?;
            self.balances.insert((token, from), from_balance - amount);
            self.balances.insert((token, to), new_to);
        }

        self.events.emit(ShieldEvent::Transfer { token, from, to, amount, block_height });
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn deployer() -> Address {
        [9u8; 20]
    }

    fn alice() -> Address {
        [1u8; 20]
    }

    fn bob() -> Address {
        [2u8; 20]
    }

    fn setup() -> (TokenLedger, Address) {
        let mut ledger = TokenLedger::new();
        let ctx = CallContext::new(deployer(), 1);
        let token = ledger.create_token(&ctx, "Wrapped Ether", "WETH");
        ledger.mint(&ctx, token, alice(), 1_000).unwrap();
        (ledger, token)
    }

    #[test]
    fn test_create_and_mint() {
        let (ledger, token) = setup();
        let info = ledger.token_info(&token).unwrap();
        assert_eq!(info.symbol, "WETH");
        assert_eq!(info.decimals, 18);
        assert_eq!(ledger.total_supply(&token), 1_000);
        assert_eq!(ledger.balance_of(&token, &alice()), 1_000);
    }

    #[test]
    fn test_distinct_token_addresses() {
        let mut ledger = TokenLedger::new();
        let ctx = CallContext::new(deployer(), 1);
        let a = ledger.create_token(&ctx, "A", "A");
        let b = ledger.create_token(&ctx, "B", "B");
        assert_ne!(a, b);
    }

    #[test]
    fn test_transfer() {
        let (mut ledger, token) = setup();
        ledger.transfer(&CallContext::new(alice(), 2), token, bob(), 400).unwrap();
        assert_eq!(ledger.balance_of(&token, &alice()), 600);
        assert_eq!(ledger.balance_of(&token, &bob()), 400);
        assert_eq!(ledger.total_supply(&token), 1_000);

        let result = ledger.transfer(&CallContext::new(bob(), 3), token, alice(), 401);
        assert_eq!(result, Err(ShieldError::InsufficientBalance { available: 400, requested: 401 }));
    }

    #[test]
    fn test_transfer_from_spends_allowance() {
        let (mut ledger, token) = setup();
        ledger.approve(&CallContext::new(alice(), 2), token, bob(), 300).unwrap();

        let spender = CallContext::new(bob(), 3);
        ledger.transfer_from(&spender, token, alice(), bob(), 200).unwrap();
        assert_eq!(ledger.allowance(&token, &alice(), &bob()), 100);

        let result = ledger.transfer_from(&spender, token, alice(), bob(), 200);
        assert_eq!(result, Err(ShieldError::InsufficientAllowance { available: 100, requested: 200 }));
    }

    #[test]
    fn test_unlimited_allowance() {
        let (mut ledger, token) = setup();
        ledger.approve(&CallContext::new(alice(), 2), token, bob(), u128::MAX).unwrap();
        ledger.transfer_from(&CallContext::new(bob(), 3), token, alice(), bob(), 500).unwrap();
        assert_eq!(ledger.allowance(&token, &alice(), &bob()), u128::MAX);
    }

    #[test]
    fn test_unknown_token_and_zero_recipient() {
        let (mut ledger, token) = setup();
        let ctx = CallContext::new(alice(), 2);
        assert!(matches!(
            ledger.transfer(&ctx, [7u8; 20], bob(), 1),
            Err(ShieldError::UnknownToken { .. })
        ));
        assert_eq!(ledger.transfer(&ctx, token, ZERO_ADDRESS, 1), Err(ShieldError::InvalidAddress));
    }
}

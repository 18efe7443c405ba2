//! DEX Aggregator Contract
//!
//! Swaps allow-listed tokens at owner-configured exchange rates.
//!
//! A rate is the WAD amount of `token_out` paid per whole `token_in`:
//! `amount_out = amount_in * rate / WAD`. Output is paid from the
//! aggregator's own balance, so the aggregator must be funded.

use std::collections::{BTreeMap, BTreeSet};

use cdp_shield_common::{
    access_control::Ownable,
    errors::{ShieldError, ShieldResult},
    events::{EventLog, ShieldEvent},
    interfaces::DexAggregator,
    ledger::TokenLedger,
    math::{mul_div_up, wad_mul},
    constants::precision::WAD,
    types::{format_address, Address, CallContext, SwapParams},
};

/// Mock DEX aggregator contract
#[derive(Debug, Clone)]
pub struct MockDexAggregator {
    address: Address,
    ownable: Ownable,
    allowed_tokens: BTreeSet<Address>,
    exchange_rates: BTreeMap<(Address, Address), u128>,
    events: EventLog,
}

impl MockDexAggregator {
    pub fn new(address: Address, owner: Address) -> ShieldResult<Self> {
        Ok(Self {
            address,
            ownable: Ownable::new(owner)?,
            allowed_tokens: BTreeSet::new(),
            exchange_rates: BTreeMap::new(),
            events: EventLog::new(),
        })
    }

    // ============ Admin Functions ============

    pub fn add_allowed_token(&mut self, ctx: &CallContext, token: Address) -> ShieldResult<()> {
        self.ownable.only_owner(&ctx.caller)?;
        self.allowed_tokens.insert(token);
        self.events.emit(ShieldEvent::TokenAllowanceChanged {
            token,
            allowed: true,
            block_height: ctx.block_height,
        });
        Ok(())
    }

    pub fn remove_allowed_token(&mut self, ctx: &CallContext, token: Address) -> ShieldResult<()> {
        self.ownable.only_owner(&ctx.caller)?;
        self.allowed_tokens.remove(&token);
        self.events.emit(ShieldEvent::TokenAllowanceChanged {
            token,
            allowed: false,
            block_height: ctx.block_height,
        });
        Ok(())
    }

    /// Set the WAD rate for `token_in -> token_out` (owner only)
    pub fn set_exchange_rate(
        &mut self,
        ctx: &CallContext,
        token_in: Address,
        token_out: Address,
        rate: u128,
    ) -> ShieldResult<()> {
        self.ownable.only_owner(&ctx.caller)?;
        if rate == 0 {
            return Err(ShieldError::ZeroAmount);
        }

        self.exchange_rates.insert((token_in, token_out), rate);
        log::debug!(
            "rate {} -> {} set to {}",
            format_address(&token_in),
            format_address(&token_out),
            rate
        );
        self.events.emit(ShieldEvent::ExchangeRateSet {
            token_in,
            token_out,
            rate,
            block_height: ctx.block_height,
        });
        Ok(())
    }

    // ============ Query Functions ============

    pub fn is_allowed(&self, token: &Address) -> bool {
        self.allowed_tokens.contains(token)
    }

    pub fn exchange_rate(&self, token_in: &Address, token_out: &Address) -> Option<u128> {
        self.exchange_rates.get(&(*token_in, *token_out)).copied()
    }

    pub fn owner(&self) -> Address {
        self.ownable.owner()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Allow-list and rate checks shared by quotes and swaps
    fn pair_rate(&self, token_in: &Address, token_out: &Address) -> ShieldResult<u128> {
        for token in [token_in, token_out] {
            if !self.is_allowed(token) {
                return Err(ShieldError::TokenNotAllowed { token: *token });
            }
        }
        self.exchange_rate(token_in, token_out)
            .ok_or(ShieldError::ExchangeRateNotSet { token_in: *token_in, token_out: *token_out })
    }
}

impl DexAggregator for MockDexAggregator {
    fn address(&self) -> Address {
        self.address
    }

    fn quote(&self, token_in: &Address, token_out: &Address, amount_in: u128) -> ShieldResult<u128> {
        let rate = self.pair_rate(token_in, token_out)?;
        wad_mul(amount_in, rate)
    }

    fn quote_amount_in(&self, token_in: &Address, token_out: &Address, amount_out: u128) -> ShieldResult<u128> {
        let rate = self.pair_rate(token_in, token_out)?;
        mul_div_up(amount_out, WAD, rate)
    }

    fn swap(&mut self, ledger: &mut TokenLedger, ctx: &CallContext, params: &SwapParams) -> ShieldResult<u128> {
        if params.amount_in == 0 {
            return Err(ShieldError::ZeroAmount);
        }

        let amount_out = self.quote(&params.token_in, &params.token_out, params.amount_in)?;
        if amount_out < params.min_amount_out {
            return Err(ShieldError::InsufficientOutputAmount {
                amount_out,
                min_amount_out: params.min_amount_out,
            });
        }

        let liquidity = ledger.balance_of(&params.token_out, &self.address);
        if liquidity < amount_out {
            return Err(ShieldError::InsufficientLiquidity { available: liquidity, requested: amount_out });
        }

        let trader = ctx.caller;
        let dex_ctx = ctx.as_contract(self.address);
        ledger.transfer_from(&dex_ctx, params.token_in, trader, self.address, params.amount_in)?;
        ledger.transfer(&dex_ctx, params.token_out, trader, amount_out)?;

        log::debug!(
            "swap by {}: {} in, {} out",
            format_address(&trader),
            params.amount_in,
            amount_out
        );
        self.events.emit(ShieldEvent::Swapped {
            trader,
            token_in: params.token_in,
            token_out: params.token_out,
            amount_in: params.amount_in,
            amount_out,
            block_height: ctx.block_height,
        });
        Ok(amount_out)
    }
}

// ============ Tests ============

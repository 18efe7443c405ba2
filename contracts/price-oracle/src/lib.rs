//! Price Oracle Contract
//!
//! Provides USD prices (WAD) for every token the shield values.
//! Uses a trusted-owner model: only the owner can publish prices.
//!
//! ## Freshness
//!
//! Each price records the block it was set at. When `max_price_age_blocks`
//! is non-zero, reads older than that bound fail with `StalePrice`.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use cdp_shield_common::{
    access_control::Ownable,
    errors::{ShieldError, ShieldResult},
    events::{EventLog, ShieldEvent},
    interfaces::PriceOracle,
    types::{format_address, Address, CallContext},
};

// ============ Oracle State ============

/// A published price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PriceFeed {
    /// USD per whole token (WAD)
    pub price: u128,
    /// Block height of the update
    pub updated_at: u64,
}

impl PriceFeed {
    /// Check if the feed is older than `max_age` blocks (0 = never stale)
    pub fn is_stale(&self, current_block: u64, max_age: u64) -> bool {
        max_age != 0 && current_block.saturating_sub(self.updated_at) > max_age
    }
}

/// Mock price oracle contract
#[derive(Debug, Clone)]
pub struct MockPriceOracle {
    address: Address,
    ownable: Ownable,
    prices: BTreeMap<Address, PriceFeed>,
    max_price_age_blocks: u64,
    events: EventLog,
}

impl MockPriceOracle {
    /// Create an oracle owned by `owner`
    pub fn new(address: Address, owner: Address, max_price_age_blocks: u64) -> ShieldResult<Self> {
        Ok(Self {
            address,
            ownable: Ownable::new(owner)?,
            prices: BTreeMap::new(),
            max_price_age_blocks,
            events: EventLog::new(),
        })
    }

    // ============ Admin Functions ============

    /// Publish a price (owner only)
    pub fn set_price(&mut self, ctx: &CallContext, token: Address, price: u128) -> ShieldResult<()> {
        self.ownable.only_owner(&ctx.caller)?;
        if price == 0 {
            return Err(ShieldError::InvalidPrice);
        }

        self.prices.insert(token, PriceFeed { price, updated_at: ctx.block_height });

        log::debug!("price of {} set to {}", format_address(&token), price);
        self.events.emit(ShieldEvent::PriceUpdated {
            token,
            price,
            block_height: ctx.block_height,
        });
        Ok(())
    }

    /// Change the staleness bound (owner only)
    pub fn set_max_price_age(&mut self, ctx: &CallContext, max_price_age_blocks: u64) -> ShieldResult<()> {
        self.ownable.only_owner(&ctx.caller)?;
        self.max_price_age_blocks = max_price_age_blocks;
        Ok(())
    }

    pub fn transfer_ownership(&mut self, ctx: &CallContext, new_owner: Address) -> ShieldResult<()> {
        self.ownable.transfer_ownership(ctx, new_owner, &mut self.events)
    }

    // ============ Query Functions ============

    /// Raw feed, fresh or not (display only)
    pub fn feed(&self, token: &Address) -> Option<&PriceFeed> {
        self.prices.get(token)
    }

    /// Check if a usable price exists
    pub fn is_price_fresh(&self, token: &Address, current_block: u64) -> bool {
        self.prices
            .get(token)
            .map(|feed| !feed.is_stale(current_block, self.max_price_age_blocks))
            .unwrap_or(false)
    }

    pub fn owner(&self) -> Address {
        self.ownable.owner()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }
}

impl PriceOracle for MockPriceOracle {
    fn address(&self) -> Address {
        self.address
    }

    fn max_price_age_blocks(&self) -> u64 {
        self.max_price_age_blocks
    }

    /// Get the current price
    ///
    /// # Errors
    /// - `PriceNotAvailable` if no price was ever set
    /// - `StalePrice` if the price exceeds `max_price_age_blocks`
    fn get_price(&self, token: &Address, current_block: u64) -> ShieldResult<u128> {
        let feed = self
            .prices
            .get(token)
            .ok_or(ShieldError::PriceNotAvailable { token: *token })?;

        if feed.is_stale(current_block, self.max_price_age_blocks) {
            return Err(ShieldError::StalePrice {
                token: *token,
                updated_at: feed.updated_at,
                current_block,
            });
        }

        Ok(feed.price)
    }
}

// ============ Tests ============

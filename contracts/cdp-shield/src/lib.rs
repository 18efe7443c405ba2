//! CDP Shield Contract
//!
//! Tracks collateralized debt positions, values them against a price oracle,
//! and deleverages them through a DEX aggregator, optionally funded by an
//! Aave-style flash loan.
//!
//! ## Core Operations
//!
//! - **RegisterPosition**: record a position, rejecting it below the minimum health factor
//! - **UpdatePosition**: restate collateral and debt (owner only)
//! - **ReduceLeverage**: sell owner collateral on the DEX and repay debt
//! - **FlashLoanReduceLeverage**: repay first with borrowed funds, sell collateral to cover the loan
//! - **FlashLoanEmergencyClose**: unwind a critical position completely
//!
//! ## Dependencies
//!
//! The shield stores only the addresses of its venues. Callers pass the
//! venues themselves into each operation (`Venues`, `FlashVenues`), and the
//! shield checks that they are the configured ones.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

pub mod registry;
mod settlement;
pub mod valuation;

use cdp_shield_common::{
    access_control::{self, Ownable, Pausable},
    config::ShieldConfig,
    constants::precision::WAD,
    errors::{ShieldError, ShieldResult},
    events::{EventLog, ShieldEvent},
    interfaces::{DexAggregator, FlashLender, PriceOracle},
    ledger::TokenLedger,
    math::{bps_mul, classify_risk, deleverage_amount, liquidation_price, mul_div_up, safe_add, safe_sub, usd_value, RiskLevel},
    types::{
        format_address, is_zero_address, Address, CallContext, FlashAction, FlashLoanParams, Position, PositionId,
        SwapParams,
    },
};
use cdp_shield_flash_receiver::FlashLoanReceiver;

pub use registry::PositionRegistry;
pub use settlement::FlashOutcome;

use settlement::FlashSettlement;
use valuation::{health_factor, position_health_factor, value_pair};

// ============ Venue Bundles ============

/// Venues needed by swap-funded operations
pub struct Venues<'a> {
    pub oracle: &'a dyn PriceOracle,
    pub dex: &'a mut dyn DexAggregator,
}

/// Venues needed by flash-loan-funded operations
pub struct FlashVenues<'a> {
    pub oracle: &'a dyn PriceOracle,
    pub dex: &'a mut dyn DexAggregator,
    pub pool: &'a mut dyn FlashLender,
    pub receiver: &'a mut FlashLoanReceiver,
}

/// Steps to bring a position to a target health factor with a flash loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct DeleveragePlan {
    /// Debt tokens to borrow and repay
    pub debt_to_repay: u128,
    /// Flash loan premium on `debt_to_repay`
    pub flash_premium: u128,
    /// Collateral to sell at oracle prices to cover principal plus premium
    pub collateral_to_sell: u128,
    /// Health factor after the plan executes at oracle prices
    pub expected_health_factor: u128,
}

// ============ Contract State ============

/// CDP Shield contract
#[derive(Debug, Clone)]
pub struct CdpShield {
    address: Address,
    ownable: Ownable,
    pausable: Pausable,
    price_oracle: Address,
    dex_aggregator: Address,
    aave_pool: Option<Address>,
    flash_loan_receiver: Option<Address>,
    config: ShieldConfig,
    registry: PositionRegistry,
    events: EventLog,
}

impl CdpShield {
    /// Deploy a shield bound to an oracle and a DEX aggregator
    pub fn new(
        address: Address,
        owner: Address,
        price_oracle: Address,
        dex_aggregator: Address,
        config: ShieldConfig,
    ) -> ShieldResult<Self> {
        if is_zero_address(&price_oracle) || is_zero_address(&dex_aggregator) {
            return Err(ShieldError::InvalidAddress);
        }
        config.validate()?;

        Ok(Self {
            address,
            ownable: Ownable::new(owner)?,
            pausable: Pausable::new(),
            price_oracle,
            dex_aggregator,
            aave_pool: None,
            flash_loan_receiver: None,
            config,
            registry: PositionRegistry::new(),
            events: EventLog::new(),
        })
    }

    // ============ Position Operations ============

    /// Register a position for `owner`
    ///
    /// # Errors
    /// - `EnforcedPause` while paused
    /// - `InvalidCollateralAmount` / `InvalidDebtAmount` for zero amounts
    /// - `HealthFactorTooLow` below the minimum health factor
    #[allow(clippy::too_many_arguments)]
    pub fn register_position(
        &mut self,
        ctx: &CallContext,
        oracle: &dyn PriceOracle,
        owner: Address,
        collateral_token: Address,
        debt_token: Address,
        collateral_amount: u128,
        debt_amount: u128,
    ) -> ShieldResult<PositionId> {
        self.pausable.when_not_paused()?;
        self.check_oracle(oracle)?;

        if collateral_amount == 0 {
            return Err(ShieldError::InvalidCollateralAmount);
        }
        if debt_amount == 0 {
            return Err(ShieldError::InvalidDebtAmount);
        }
        if is_zero_address(&owner) {
            return Err(ShieldError::InvalidAddress);
        }

        let hf = health_factor(
            oracle,
            ctx.block_height,
            self.config.liquidation_threshold_bps,
            &collateral_token,
            collateral_amount,
            &debt_token,
            debt_amount,
        )?;
        self.require_min_health(hf)?;

        let position_id = self.registry.insert(Position::new(
            0,
            owner,
            collateral_token,
            debt_token,
            collateral_amount,
            debt_amount,
            hf,
            ctx.block_height,
        ));

        log::debug!("position {} registered for {} (hf {})", position_id, format_address(&owner), hf);
        self.events.emit(ShieldEvent::PositionRegistered {
            position_id,
            owner,
            collateral_token,
            debt_token,
            collateral_amount,
            debt_amount,
            health_factor: hf,
            block_height: ctx.block_height,
        });
        Ok(position_id)
    }

    /// Restate a position's amounts (owner only)
    pub fn update_position(
        &mut self,
        ctx: &CallContext,
        oracle: &dyn PriceOracle,
        position_id: PositionId,
        collateral_amount: u128,
        debt_amount: u128,
    ) -> ShieldResult<()> {
        self.pausable.when_not_paused()?;
        self.check_oracle(oracle)?;
        let position = self.owned_active_position(ctx, position_id)?.clone();

        if collateral_amount == 0 {
            return Err(ShieldError::InvalidCollateralAmount);
        }

        let hf = position_health_factor(
            oracle,
            ctx.block_height,
            self.config.liquidation_threshold_bps,
            &position,
            collateral_amount,
            debt_amount,
        )?;
        self.require_min_health(hf)?;

        let stored = self.registry.get_mut(position_id)?;
        stored.collateral_amount = collateral_amount;
        stored.debt_amount = debt_amount;
        stored.health_factor = hf;
        stored.last_updated = ctx.block_height;

        log::debug!("position {} updated (hf {})", position_id, hf);
        self.events.emit(ShieldEvent::PositionUpdated {
            position_id,
            collateral_amount,
            debt_amount,
            health_factor: hf,
            block_height: ctx.block_height,
        });
        Ok(())
    }

    /// Sell `swap.amount_in` of the owner's collateral and repay `debt_to_repay`
    ///
    /// The owner must have approved the shield for the collateral. Swap
    /// output above `debt_to_repay` is returned to the owner.
    ///
    /// # Returns
    /// New health factor
    pub fn reduce_leverage(
        &mut self,
        ledger: &mut TokenLedger,
        ctx: &CallContext,
        venues: Venues<'_>,
        position_id: PositionId,
        debt_to_repay: u128,
        swap: SwapParams,
    ) -> ShieldResult<u128> {
        self.pausable.when_not_paused()?;
        self.check_oracle(venues.oracle)?;
        self.check_dex(&*venues.dex)?;
        let position = self.owned_active_position(ctx, position_id)?.clone();

        Self::check_repayment(&position, debt_to_repay)?;
        if swap.token_in != position.collateral_token || swap.token_out != position.debt_token {
            return Err(ShieldError::InvalidSwapTokens);
        }
        if swap.amount_in == 0 {
            return Err(ShieldError::InvalidSwapAmount);
        }
        if swap.amount_in > position.collateral_amount {
            return Err(ShieldError::ExceedsCollateralAmount {
                requested: swap.amount_in,
                available: position.collateral_amount,
            });
        }

        let threshold = self.config.liquidation_threshold_bps;
        let before = position_health_factor(
            venues.oracle,
            ctx.block_height,
            threshold,
            &position,
            position.collateral_amount,
            position.debt_amount,
        )?;

        // Pull collateral, sell it, keep the repayment and refund the rest
        let shield_ctx = ctx.as_contract(self.address);
        ledger.transfer_from(&shield_ctx, swap.token_in, position.owner, self.address, swap.amount_in)?;
        ledger.approve(&shield_ctx, swap.token_in, venues.dex.address(), swap.amount_in)?;

        let guarded = SwapParams { min_amount_out: swap.min_amount_out.max(debt_to_repay), ..swap };
        let amount_out = venues.dex.swap(ledger, &shield_ctx, &guarded)?;

        let surplus = safe_sub(amount_out, debt_to_repay)?;
        if surplus > 0 {
            ledger.transfer(&shield_ctx, swap.token_out, position.owner, surplus)?;
        }

        let collateral_amount = safe_sub(position.collateral_amount, swap.amount_in)?;
        let debt_amount = safe_sub(position.debt_amount, debt_to_repay)?;
        let after = position_health_factor(
            venues.oracle,
            ctx.block_height,
            threshold,
            &position,
            collateral_amount,
            debt_amount,
        )?;
        if after <= before {
            return Err(ShieldError::HealthFactorNotImproved { before, after });
        }

        let stored = self.registry.get_mut(position_id)?;
        stored.collateral_amount = collateral_amount;
        stored.debt_amount = debt_amount;
        stored.health_factor = after;
        stored.last_updated = ctx.block_height;

        log::debug!("position {} deleveraged: hf {} -> {}", position_id, before, after);
        self.events.emit(ShieldEvent::LeverageReduced {
            position_id,
            collateral_sold: swap.amount_in,
            debt_repaid: debt_to_repay,
            new_health_factor: after,
            block_height: ctx.block_height,
        });
        Ok(after)
    }

    /// Repay `debt_to_repay` with a flash loan, then sell collateral to cover it
    pub fn flash_loan_reduce_leverage(
        &mut self,
        ledger: &mut TokenLedger,
        ctx: &CallContext,
        venues: FlashVenues<'_>,
        position_id: PositionId,
        debt_to_repay: u128,
        min_amount_out: u128,
    ) -> ShieldResult<FlashOutcome> {
        self.require_flash_config()?;
        self.pausable.when_not_paused()?;
        let position = self.owned_active_position(ctx, position_id)?.clone();
        Self::check_repayment(&position, debt_to_repay)?;

        let action = FlashAction::ReduceLeverage { min_amount_out };
        self.run_flash_loan(ledger, ctx, venues, &position, debt_to_repay, action)
    }

    /// Unwind a critical position: repay all debt with a flash loan, sell
    /// collateral to cover it, release the rest and close the position.
    ///
    /// Allowed while paused.
    pub fn flash_loan_emergency_close(
        &mut self,
        ledger: &mut TokenLedger,
        ctx: &CallContext,
        venues: FlashVenues<'_>,
        position_id: PositionId,
        min_amount_out: u128,
    ) -> ShieldResult<FlashOutcome> {
        self.require_flash_config()?;
        let position = self.owned_active_position(ctx, position_id)?.clone();

        self.check_oracle(venues.oracle)?;
        let hf = position_health_factor(
            venues.oracle,
            ctx.block_height,
            self.config.liquidation_threshold_bps,
            &position,
            position.collateral_amount,
            position.debt_amount,
        )?;
        if hf > self.config.critical_health_factor {
            return Err(ShieldError::HealthFactorNotCritical {
                health_factor: hf,
                critical: self.config.critical_health_factor,
            });
        }

        let action = FlashAction::EmergencyClose { min_amount_out };
        let debt = position.debt_amount;
        self.run_flash_loan(ledger, ctx, venues, &position, debt, action)
    }

    fn run_flash_loan(
        &mut self,
        ledger: &mut TokenLedger,
        ctx: &CallContext,
        venues: FlashVenues<'_>,
        position: &Position,
        amount: u128,
        action: FlashAction,
    ) -> ShieldResult<FlashOutcome> {
        self.check_oracle(venues.oracle)?;
        self.check_dex(&*venues.dex)?;
        Self::check_venue(self.aave_pool, venues.pool.address())?;
        Self::check_venue(self.flash_loan_receiver, venues.receiver.address())?;

        let expected = FlashLoanParams { position_id: position.id, owner: position.owner, action };
        let params = expected.encode()?;

        log::info!(
            "flash loan of {} requested for position {} ({:?})",
            amount,
            position.id,
            action
        );

        let mut settlement = FlashSettlement {
            shield: self.address,
            config: &self.config,
            registry: &mut self.registry,
            events: &mut self.events,
            oracle: venues.oracle,
            dex: venues.dex,
            expected,
            outcome: None,
        };
        {
            let mut receiver = venues.receiver.bind(&mut settlement);
            venues.pool.flash_loan_simple(
                ledger,
                &ctx.as_contract(self.address),
                &mut receiver,
                position.debt_token,
                amount,
                params,
            )?;
        }

        settlement.outcome.ok_or(ShieldError::InvalidFlashLoanParams)
    }

    // ============ Admin Functions ============

    pub fn pause(&mut self, ctx: &CallContext) -> ShieldResult<()> {
        access_control::pause(&self.ownable, &mut self.pausable, ctx, &mut self.events)
    }

    pub fn unpause(&mut self, ctx: &CallContext) -> ShieldResult<()> {
        access_control::unpause(&self.ownable, &mut self.pausable, ctx, &mut self.events)
    }

    pub fn set_aave_pool(&mut self, ctx: &CallContext, pool: Address) -> ShieldResult<()> {
        self.ownable.only_owner(&ctx.caller)?;
        if is_zero_address(&pool) {
            return Err(ShieldError::InvalidAddress);
        }

        self.aave_pool = Some(pool);
        log::info!("aave pool set to {}", format_address(&pool));
        self.events.emit(ShieldEvent::AavePoolSet { pool, block_height: ctx.block_height });
        Ok(())
    }

    pub fn set_flash_loan_receiver(&mut self, ctx: &CallContext, receiver: Address) -> ShieldResult<()> {
        self.ownable.only_owner(&ctx.caller)?;
        if is_zero_address(&receiver) {
            return Err(ShieldError::InvalidAddress);
        }

        self.flash_loan_receiver = Some(receiver);
        log::info!("flash loan receiver set to {}", format_address(&receiver));
        self.events.emit(ShieldEvent::FlashLoanReceiverSet { receiver, block_height: ctx.block_height });
        Ok(())
    }

    pub fn transfer_ownership(&mut self, ctx: &CallContext, new_owner: Address) -> ShieldResult<()> {
        self.ownable.transfer_ownership(ctx, new_owner, &mut self.events)
    }

    // ============ Query Functions ============

    /// Health factor of arbitrary amounts at current prices
    pub fn calculate_health_factor(
        &self,
        oracle: &dyn PriceOracle,
        current_block: u64,
        collateral_amount: u128,
        debt_amount: u128,
        collateral_token: &Address,
        debt_token: &Address,
    ) -> ShieldResult<u128> {
        self.check_oracle(oracle)?;
        health_factor(
            oracle,
            current_block,
            self.config.liquidation_threshold_bps,
            collateral_token,
            collateral_amount,
            debt_token,
            debt_amount,
        )
    }

    pub fn get_position(&self, position_id: PositionId) -> ShieldResult<&Position> {
        self.registry.get(position_id)
    }

    pub fn get_position_count(&self) -> u64 {
        self.registry.count()
    }

    pub fn get_user_positions(&self, owner: &Address) -> Vec<PositionId> {
        self.registry.ids_of(owner)
    }

    /// Health factor of a position at current prices
    pub fn current_health_factor(
        &self,
        oracle: &dyn PriceOracle,
        current_block: u64,
        position_id: PositionId,
    ) -> ShieldResult<u128> {
        self.check_oracle(oracle)?;
        let position = self.registry.get(position_id)?;
        position_health_factor(
            oracle,
            current_block,
            self.config.liquidation_threshold_bps,
            position,
            position.collateral_amount,
            position.debt_amount,
        )
    }

    /// Collateral price (WAD) at which the position's health factor reaches 1.0
    pub fn liquidation_price(
        &self,
        oracle: &dyn PriceOracle,
        current_block: u64,
        position_id: PositionId,
    ) -> ShieldResult<u128> {
        self.check_oracle(oracle)?;
        let position = self.registry.get(position_id)?;
        if position.debt_amount == 0 {
            return Ok(0);
        }

        let debt_price = oracle.get_price(&position.debt_token, current_block)?;
        let debt_value = usd_value(position.debt_amount, debt_price)?;
        liquidation_price(position.collateral_amount, debt_value, self.config.liquidation_threshold_bps)
    }

    pub fn risk_level(
        &self,
        oracle: &dyn PriceOracle,
        current_block: u64,
        position_id: PositionId,
    ) -> ShieldResult<RiskLevel> {
        self.current_health_factor(oracle, current_block, position_id)
            .map(classify_risk)
    }

    /// Active positions whose live health factor is at or below `threshold`
    pub fn positions_at_risk(
        &self,
        oracle: &dyn PriceOracle,
        current_block: u64,
        threshold: u128,
    ) -> ShieldResult<Vec<(PositionId, u128)>> {
        self.check_oracle(oracle)?;
        let lt = self.config.liquidation_threshold_bps;

        let mut at_risk = Vec::new();
        for position in self.registry.active() {
            let hf = position_health_factor(
                oracle,
                current_block,
                lt,
                position,
                position.collateral_amount,
                position.debt_amount,
            )?;
            if hf <= threshold {
                at_risk.push((position.id, hf));
            }
        }
        Ok(at_risk)
    }

    /// Flash deleverage needed to reach `target_health_factor`, priced with
    /// the premium `pool` charges
    pub fn plan_deleverage(
        &self,
        oracle: &dyn PriceOracle,
        pool: &dyn FlashLender,
        current_block: u64,
        position_id: PositionId,
        target_health_factor: u128,
    ) -> ShieldResult<DeleveragePlan> {
        self.check_oracle(oracle)?;
        self.check_pool(pool)?;
        let premium_bps = pool.premium_bps();
        let position = self.registry.get(position_id)?;
        if !position.is_active() {
            return Err(ShieldError::PositionNotActive { position_id });
        }

        let lt = self.config.liquidation_threshold_bps;
        let value = value_pair(
            oracle,
            current_block,
            &position.collateral_token,
            position.collateral_amount,
            &position.debt_token,
            position.debt_amount,
        )?;

        let repay_value = deleverage_amount(
            value.collateral_value,
            value.debt_value,
            lt,
            target_health_factor,
            premium_bps,
        )?;
        let debt_to_repay = mul_div_up(repay_value, WAD, value.debt_price)?.min(position.debt_amount);
        let flash_premium = bps_mul(debt_to_repay, premium_bps)?;

        let owed_value = usd_value(safe_add(debt_to_repay, flash_premium)?, value.debt_price)?;
        let collateral_to_sell = mul_div_up(owed_value, WAD, value.collateral_price)?;
        if collateral_to_sell > position.collateral_amount {
            return Err(ShieldError::ExceedsCollateralAmount {
                requested: collateral_to_sell,
                available: position.collateral_amount,
            });
        }

        let expected_health_factor = position_health_factor(
            oracle,
            current_block,
            lt,
            position,
            position.collateral_amount - collateral_to_sell,
            position.debt_amount - debt_to_repay,
        )?;

        Ok(DeleveragePlan { debt_to_repay, flash_premium, collateral_to_sell, expected_health_factor })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn is_paused(&self) -> bool {
        self.pausable.is_paused()
    }

    pub fn owner(&self) -> Address {
        self.ownable.owner()
    }

    pub fn price_oracle(&self) -> Address {
        self.price_oracle
    }

    pub fn dex_aggregator(&self) -> Address {
        self.dex_aggregator
    }

    pub fn aave_pool(&self) -> Option<Address> {
        self.aave_pool
    }

    pub fn flash_loan_receiver(&self) -> Option<Address> {
        self.flash_loan_receiver
    }

    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    // ============ Helper Functions ============

    fn owned_active_position(&self, ctx: &CallContext, position_id: PositionId) -> ShieldResult<&Position> {
        let position = self.registry.get(position_id)?;
        if !position.is_owned_by(&ctx.caller) {
            return Err(ShieldError::NotPositionOwner { position_id, caller: ctx.caller });
        }
        if !position.is_active() {
            return Err(ShieldError::PositionNotActive { position_id });
        }
        Ok(position)
    }

    fn check_repayment(position: &Position, debt_to_repay: u128) -> ShieldResult<()> {
        if debt_to_repay == 0 {
            return Err(ShieldError::InvalidDebtAmount);
        }
        if debt_to_repay > position.debt_amount {
            return Err(ShieldError::ExceedsDebtAmount {
                requested: debt_to_repay,
                outstanding: position.debt_amount,
            });
        }
        Ok(())
    }

    fn require_min_health(&self, hf: u128) -> ShieldResult<()> {
        if hf < self.config.min_health_factor {
            return Err(ShieldError::HealthFactorTooLow {
                health_factor: hf,
                minimum: self.config.min_health_factor,
            });
        }
        Ok(())
    }

    fn require_flash_config(&self) -> ShieldResult<()> {
        if self.aave_pool.is_none() {
            return Err(ShieldError::AavePoolNotSet);
        }
        if self.flash_loan_receiver.is_none() {
            return Err(ShieldError::FlashLoanReceiverNotSet);
        }
        Ok(())
    }

    fn check_oracle(&self, oracle: &dyn PriceOracle) -> ShieldResult<()> {
        Self::check_venue(Some(self.price_oracle), oracle.address())?;
        if oracle.max_price_age_blocks() != self.config.max_price_age_blocks {
            return Err(ShieldError::InvalidConfig {
                param: "max_price_age_blocks",
                reason: "differs from oracle",
            });
        }
        Ok(())
    }

    fn check_pool(&self, pool: &dyn FlashLender) -> ShieldResult<()> {
        let expected = self.aave_pool.ok_or(ShieldError::AavePoolNotSet)?;
        Self::check_venue(Some(expected), pool.address())
    }

    fn check_dex(&self, dex: &dyn DexAggregator) -> ShieldResult<()> {
        Self::check_venue(Some(self.dex_aggregator), dex.address())
    }

    fn check_venue(expected: Option<Address>, actual: Address) -> ShieldResult<()> {
        match expected {
            Some(expected) if expected == actual => Ok(()),
            Some(expected) => Err(ShieldError::VenueMismatch { expected, actual }),
            None => Err(ShieldError::InvalidAddress),
        }
    }
}

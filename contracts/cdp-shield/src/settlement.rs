//! Flash Loan Settlement
//!
//! Runs inside the receiver's callback while a shield-initiated flash loan
//! is in flight. The borrowed debt tokens have already been credited to the
//! shield; settlement repays the position, sells just enough of the owner's
//! collateral to cover principal plus premium, and hands that sum back to
//! the receiver.

use cdp_shield_common::{
    config::ShieldConfig,
    constants::health::MAX_HEALTH_FACTOR,
    errors::{ShieldError, ShieldResult},
    events::{EventLog, ShieldEvent},
    interfaces::{DexAggregator, FlashLoanHandler, PriceOracle},
    ledger::TokenLedger,
    math::{safe_add, safe_sub},
    types::{format_address, Address, CallContext, FlashAction, FlashLoanCall, FlashLoanParams, PositionStatus, SwapParams},
};

use crate::registry::PositionRegistry;
use crate::valuation::position_health_factor;

/// Result of a completed settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashOutcome {
    /// Debt repaid with borrowed funds
    pub debt_repaid: u128,
    /// Premium paid to the pool
    pub premium: u128,
    /// Collateral sold to cover principal plus premium
    pub collateral_sold: u128,
    /// Debt tokens left over after repaying the pool, sent to the owner
    pub surplus: u128,
    /// Collateral still backing the position (released on close)
    pub collateral_remaining: u128,
    /// Health factor after settlement
    pub health_factor: u128,
}

/// Borrowed view of the shield for the duration of one flash loan
pub(crate) struct FlashSettlement<'a> {
    pub shield: Address,
    pub config: &'a ShieldConfig,
    pub registry: &'a mut PositionRegistry,
    pub events: &'a mut EventLog,
    pub oracle: &'a dyn PriceOracle,
    pub dex: &'a mut dyn DexAggregator,
    pub expected: FlashLoanParams,
    pub outcome: Option<FlashOutcome>,
}

impl FlashLoanHandler for FlashSettlement<'_> {
    fn address(&self) -> Address {
        self.shield
    }

    fn on_flash_loan(&mut self, ledger: &mut TokenLedger, receiver: Address, call: &FlashLoanCall) -> ShieldResult<()> {
        if call.initiator != self.shield {
            return Err(ShieldError::InvalidFlashLoanInitiator { initiator: call.initiator });
        }
        let params = FlashLoanParams::decode(&call.params)?;
        if params != self.expected || self.outcome.is_some() {
            return Err(ShieldError::InvalidFlashLoanParams);
        }

        let position = self.registry.get(params.position_id)?.clone();
        if !position.is_active() {
            return Err(ShieldError::PositionNotActive { position_id: position.id });
        }
        if call.asset != position.debt_token || params.owner != position.owner {
            return Err(ShieldError::InvalidFlashLoanParams);
        }
        if call.amount > position.debt_amount {
            return Err(ShieldError::ExceedsDebtAmount { requested: call.amount, outstanding: position.debt_amount });
        }

        let (min_amount_out, closing) = match params.action {
            FlashAction::ReduceLeverage { min_amount_out } => (min_amount_out, false),
            FlashAction::EmergencyClose { min_amount_out } => (min_amount_out, true),
        };
        if closing && call.amount != position.debt_amount {
            return Err(ShieldError::InvalidFlashLoanParams);
        }

        // Sell just enough collateral to return principal plus premium
        let owed = safe_add(call.amount, call.premium)?;
        let collateral_in = self
            .dex
            .quote_amount_in(&position.collateral_token, &position.debt_token, owed)?;
        if collateral_in > position.collateral_amount {
            return Err(ShieldError::ExceedsCollateralAmount {
                requested: collateral_in,
                available: position.collateral_amount,
            });
        }

        let ctx = CallContext::new(self.shield, call.block_height);
        ledger.transfer_from(&ctx, position.collateral_token, position.owner, self.shield, collateral_in)?;
        ledger.approve(&ctx, position.collateral_token, self.dex.address(), collateral_in)?;

        let swap = SwapParams::new(
            position.collateral_token,
            position.debt_token,
            collateral_in,
            min_amount_out.max(owed),
        );
        let amount_out = self.dex.swap(ledger, &ctx, &swap)?;

        ledger.transfer(&ctx, position.debt_token, receiver, owed)?;
        let surplus = safe_sub(amount_out, owed)?;
        if surplus > 0 {
            ledger.transfer(&ctx, position.debt_token, position.owner, surplus)?;
        }

        let collateral_remaining = safe_sub(position.collateral_amount, collateral_in)?;
        let debt_remaining = safe_sub(position.debt_amount, call.amount)?;

        let health_factor = if closing {
            MAX_HEALTH_FACTOR
        } else {
            let threshold = self.config.liquidation_threshold_bps;
            let before = position_health_factor(
                self.oracle,
                call.block_height,
                threshold,
                &position,
                position.collateral_amount,
                position.debt_amount,
            )?;
            let after = position_health_factor(
                self.oracle,
                call.block_height,
                threshold,
                &position,
                collateral_remaining,
                debt_remaining,
            )?;
            if after <= before {
                return Err(ShieldError::HealthFactorNotImproved { before, after });
            }
            after
        };

        let stored = self.registry.get_mut(position.id)?;
        stored.last_updated = call.block_height;
        stored.health_factor = health_factor;
        if closing {
            stored.collateral_amount = 0;
            stored.debt_amount = 0;
            stored.status = PositionStatus::Closed;

            log::info!(
                "position {} emergency closed for {}, {} collateral released",
                position.id,
                format_address(&position.owner),
                collateral_remaining
            );
            self.events.emit(ShieldEvent::PositionEmergencyClosed {
                position_id: position.id,
                owner: position.owner,
                debt_repaid: call.amount,
                collateral_sold: collateral_in,
                collateral_returned: collateral_remaining,
                block_height: call.block_height,
            });
        } else {
            stored.collateral_amount = collateral_remaining;
            stored.debt_amount = debt_remaining;

            log::debug!("position {} flash deleveraged, hf {}", position.id, health_factor);
            self.events.emit(ShieldEvent::FlashLeverageReduced {
                position_id: position.id,
                flash_amount: call.amount,
                premium: call.premium,
                collateral_sold: collateral_in,
                new_health_factor: health_factor,
                block_height: call.block_height,
            });
        }

        self.outcome = Some(FlashOutcome {
            debt_repaid: call.amount,
            premium: call.premium,
            collateral_sold: collateral_in,
            surplus,
            collateral_remaining,
            health_factor,
        });
        Ok(())
    }
}

//! Flash Loan Receiver Contract
//!
//! Receives flash loans from the lending pool on behalf of CDP Shield.
//! Inside the pool callback it forwards the borrowed funds to the shield,
//! lets the shield settle the position, then checks that principal plus
//! premium came back and approves the pool to collect it.
//!
//! The receiver is only callable by the configured pool, and only for loans
//! the configured shield initiated.

use cdp_shield_common::{
    access_control::Ownable,
    errors::{ShieldError, ShieldResult},
    events::{EventLog, ShieldEvent},
    interfaces::{FlashLoanHandler, FlashLoanSimpleReceiver},
    ledger::TokenLedger,
    math::safe_add,
    types::{format_address, is_zero_address, Address, CallContext, FlashLoanCall},
};

/// Flash loan receiver contract
#[derive(Debug, Clone)]
pub struct FlashLoanReceiver {
    address: Address,
    ownable: Ownable,
    aave_pool: Address,
    cdp_shield: Address,
    dex_aggregator: Address,
    events: EventLog,
}

impl FlashLoanReceiver {
    pub fn new(
        address: Address,
        owner: Address,
        aave_pool: Address,
        cdp_shield: Address,
        dex_aggregator: Address,
    ) -> ShieldResult<Self> {
        if is_zero_address(&aave_pool) {
            return Err(ShieldError::InvalidAddress);
        }
        if is_zero_address(&cdp_shield) {
            return Err(ShieldError::InvalidCdpShield);
        }
        if is_zero_address(&dex_aggregator) {
            return Err(ShieldError::InvalidDexAggregator);
        }

        Ok(Self {
            address,
            ownable: Ownable::new(owner)?,
            aave_pool,
            cdp_shield,
            dex_aggregator,
            events: EventLog::new(),
        })
    }

    // ============ Admin Functions ============

    pub fn set_cdp_shield(&mut self, ctx: &CallContext, cdp_shield: Address) -> ShieldResult<()> {
        self.ownable.only_owner(&ctx.caller)?;
        if is_zero_address(&cdp_shield) {
            return Err(ShieldError::InvalidCdpShield);
        }

        self.cdp_shield = cdp_shield;
        log::info!("receiver shield set to {}", format_address(&cdp_shield));
        self.events.emit(ShieldEvent::CdpShieldSet { shield: cdp_shield, block_height: ctx.block_height });
        Ok(())
    }

    pub fn set_dex_aggregator(&mut self, ctx: &CallContext, dex_aggregator: Address) -> ShieldResult<()> {
        self.ownable.only_owner(&ctx.caller)?;
        if is_zero_address(&dex_aggregator) {
            return Err(ShieldError::InvalidDexAggregator);
        }

        self.dex_aggregator = dex_aggregator;
        log::info!("receiver dex set to {}", format_address(&dex_aggregator));
        self.events.emit(ShieldEvent::DexAggregatorSet { dex: dex_aggregator, block_height: ctx.block_height });
        Ok(())
    }

    /// Sweep stranded tokens to the owner
    pub fn emergency_withdraw(
        &mut self,
        ledger: &mut TokenLedger,
        ctx: &CallContext,
        token: Address,
        amount: u128,
    ) -> ShieldResult<()> {
        self.ownable.only_owner(&ctx.caller)?;

        let owner = self.ownable.owner();
        ledger.transfer(&ctx.as_contract(self.address), token, owner, amount)?;

        log::warn!("emergency withdrawal of {} to {}", amount, format_address(&owner));
        self.events.emit(ShieldEvent::EmergencyWithdrawal {
            token,
            to: owner,
            amount,
            block_height: ctx.block_height,
        });
        Ok(())
    }

    pub fn transfer_ownership(&mut self, ctx: &CallContext, new_owner: Address) -> ShieldResult<()> {
        self.ownable.transfer_ownership(ctx, new_owner, &mut self.events)
    }

    // ============ Query Functions ============

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn aave_pool(&self) -> Address {
        self.aave_pool
    }

    pub fn cdp_shield(&self) -> Address {
        self.cdp_shield
    }

    pub fn dex_aggregator(&self) -> Address {
        self.dex_aggregator
    }

    pub fn owner(&self) -> Address {
        self.ownable.owner()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    // ============ Callback ============

    /// Attach the settlement logic for one flash loan
    pub fn bind<'a>(&'a mut self, handler: &'a mut dyn FlashLoanHandler) -> BoundReceiver<'a> {
        BoundReceiver { receiver: self, handler }
    }
}

/// Receiver paired with the shield's settlement for the duration of a loan
pub struct BoundReceiver<'a> {
    receiver: &'a mut FlashLoanReceiver,
    handler: &'a mut dyn FlashLoanHandler,
}

impl FlashLoanSimpleReceiver for BoundReceiver<'_> {
    fn address(&self) -> Address {
        self.receiver.address
    }

    fn execute_operation(&mut self, ledger: &mut TokenLedger, call: &FlashLoanCall) -> ShieldResult<bool> {
        let receiver = &mut *self.receiver;

        if call.lender != receiver.aave_pool {
            return Err(ShieldError::InvalidFlashLoanCaller { caller: call.lender });
        }
        if call.initiator != receiver.cdp_shield {
            return Err(ShieldError::InvalidFlashLoanInitiator { initiator: call.initiator });
        }
        if self.handler.address() != receiver.cdp_shield {
            return Err(ShieldError::VenueMismatch {
                expected: receiver.cdp_shield,
                actual: self.handler.address(),
            });
        }

        let ctx = CallContext::new(receiver.address, call.block_height);
        ledger.transfer(&ctx, call.asset, receiver.cdp_shield, call.amount)?;

        self.handler.on_flash_loan(ledger, receiver.address, call)?;

        let owed = safe_add(call.amount, call.premium)?;
        let available = ledger.balance_of(&call.asset, &receiver.address);
        if available < owed {
            return Err(ShieldError::InsufficientRepayment { available, required: owed });
        }
        ledger.approve(&ctx, call.asset, receiver.aave_pool, owed)?;

        log::debug!("flash loan settled: {} + {} premium", call.amount, call.premium);
        receiver.events.emit(ShieldEvent::FlashLoanExecuted {
            asset: call.asset,
            amount: call.amount,
            premium: call.premium,
            initiator: call.initiator,
            block_height: call.block_height,
        });
        Ok(true)
    }
}

// ============ Tests ============

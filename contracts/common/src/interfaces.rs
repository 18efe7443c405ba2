//! Contract Interfaces
//!
//! Contracts never hold references to each other. Every dependency is passed
//! into the call that needs it through one of these traits, together with
//! the shared `TokenLedger`.

use crate::ledger::TokenLedger;
use crate::types::{Address, CallContext, FlashLoanCall, SwapParams};
use crate::ShieldResult;

/// USD price source
pub trait PriceOracle {
    /// Address of the oracle contract
    fn address(&self) -> Address;

    /// Blocks after which a price is rejected as stale
    fn max_price_age_blocks(&self) -> u64;

    /// Price of one whole `token` in USD (WAD)
    fn get_price(&self, token: &Address, current_block: u64) -> ShieldResult<u128>;
}

/// Token swap venue
pub trait DexAggregator {
    /// Address of the aggregator contract
    fn address(&self) -> Address;

    /// Output for selling `amount_in` of `token_in`
    fn quote(&self, token_in: &Address, token_out: &Address, amount_in: u128) -> ShieldResult<u128>;

    /// Input needed to receive at least `amount_out` of `token_out` (rounded up)
    fn quote_amount_in(&self, token_in: &Address, token_out: &Address, amount_out: u128) -> ShieldResult<u128>;

    /// Swap on behalf of `ctx.caller`, pulling `token_in` through its allowance.
    /// Returns the amount of `token_out` paid to the caller.
    fn swap(&mut self, ledger: &mut TokenLedger, ctx: &CallContext, params: &SwapParams) -> ShieldResult<u128>;
}

/// Aave-style lender of single-asset flash loans
pub trait FlashLender {
    /// Address of the pool contract
    fn address(&self) -> Address;

    /// Premium charged per loan, in basis points
    fn premium_bps(&self) -> u64;

    /// Lend `amount` of `asset` to `receiver` for the duration of its callback.
    /// `ctx.caller` is recorded as the initiator.
    fn flash_loan_simple(
        &mut self,
        ledger: &mut TokenLedger,
        ctx: &CallContext,
        receiver: &mut dyn FlashLoanSimpleReceiver,
        asset: Address,
        amount: u128,
        params: Vec<u8>,
    ) -> ShieldResult<()>;
}

/// Callback side of a flash loan
pub trait FlashLoanSimpleReceiver {
    /// Address holding the borrowed funds
    fn address(&self) -> Address;

    /// Invoked by the lender after the funds arrive. Must leave
    /// `amount + premium` approved to the lender and return `true`.
    fn execute_operation(&mut self, ledger: &mut TokenLedger, call: &FlashLoanCall) -> ShieldResult<bool>;
}

/// Settlement logic run with flash-borrowed funds
pub trait FlashLoanHandler {
    /// Address that receives the borrowed funds from the receiver
    fn address(&self) -> Address;

    /// Use `call.amount` (already credited to `self.address()`) and send
    /// `call.amount + call.premium` of `call.asset` back to `receiver`.
    fn on_flash_loan(&mut self, ledger: &mut TokenLedger, receiver: Address, call: &FlashLoanCall) -> ShieldResult<()>;
}

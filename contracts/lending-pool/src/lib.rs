//! Lending Pool Contract
//!
//! Aave-compatible pool exposing deposits and single-asset flash loans.
//!
//! ## Flash Loan Flow
//!
//! 1. Check liquidity and compute the premium (5 bps, rounded down)
//! 2. Transfer `amount` to the receiver
//! 3. Call `execute_operation` on the receiver; it must return `true`
//! 4. Pull `amount + premium` back through the receiver's allowance
//!
//! Any failure aborts the enclosing transaction.

use cdp_shield_common::{
    constants::flash::FLASH_LOAN_PREMIUM_BPS,
    errors::{ShieldError, ShieldResult},
    events::{EventLog, ShieldEvent},
    interfaces::{FlashLender, FlashLoanSimpleReceiver},
    ledger::TokenLedger,
    math::{bps_mul, safe_add},
    types::{format_address, Address, CallContext, FlashLoanCall},
};

/// Mock Aave pool contract
#[derive(Debug, Clone)]
pub struct MockAavePool {
    address: Address,
    events: EventLog,
}

impl MockAavePool {
    pub fn new(address: Address) -> Self {
        Self { address, events: EventLog::new() }
    }

    /// Supply liquidity; pulls `amount` from the caller through its allowance
    pub fn deposit(&mut self, ledger: &mut TokenLedger, ctx: &CallContext, asset: Address, amount: u128) -> ShieldResult<()> {
        if amount == 0 {
            return Err(ShieldError::ZeroAmount);
        }

        ledger.transfer_from(&ctx.as_contract(self.address), asset, ctx.caller, self.address, amount)?;
        self.events.emit(ShieldEvent::Deposited {
            asset,
            from: ctx.caller,
            amount,
            block_height: ctx.block_height,
        });
        Ok(())
    }

    /// Pool liquidity of `asset`
    pub fn get_balance(&self, ledger: &TokenLedger, asset: &Address) -> u128 {
        ledger.balance_of(asset, &self.address)
    }

    /// Premium owed on a loan of `amount`
    pub fn flash_premium(&self, amount: u128) -> ShieldResult<u128> {
        bps_mul(amount, FLASH_LOAN_PREMIUM_BPS)
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }
}

impl FlashLender for MockAavePool {
    fn address(&self) -> Address {
        self.address
    }

    fn premium_bps(&self) -> u64 {
        FLASH_LOAN_PREMIUM_BPS
    }

    fn flash_loan_simple(
        &mut self,
        ledger: &mut TokenLedger,
        ctx: &CallContext,
        receiver: &mut dyn FlashLoanSimpleReceiver,
        asset: Address,
        amount: u128,
        params: Vec<u8>,
    ) -> ShieldResult<()> {
        if amount == 0 {
            return Err(ShieldError::ZeroAmount);
        }

        let available = self.get_balance(ledger, &asset);
        if available < amount {
            return Err(ShieldError::InsufficientLiquidity { available, requested: amount });
        }

        let premium = self.flash_premium(amount)?;
        let owed = safe_add(amount, premium)?;
        let receiver_address = receiver.address();
        let pool_ctx = ctx.as_contract(self.address);

        log::info!(
            "flash loan of {} to {} (premium {})",
            amount,
            format_address(&receiver_address),
            premium
        );
        ledger.transfer(&pool_ctx, asset, receiver_address, amount)?;

        let call = FlashLoanCall {
            lender: self.address,
            asset,
            amount,
            premium,
            initiator: ctx.caller,
            params,
            block_height: ctx.block_height,
        };
        if !receiver.execute_operation(ledger, &call)? {
            return Err(ShieldError::InvalidFlashLoanExecutorReturn);
        }

        ledger.transfer_from(&pool_ctx, asset, receiver_address, self.address, owed)?;

        self.events.emit(ShieldEvent::FlashLoan {
            receiver: receiver_address,
            initiator: ctx.caller,
            asset,
            amount,
            premium,
            block_height: ctx.block_height,
        });
        Ok(())
    }
}

// ============ Tests ============

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_shield_common::constants::precision::WAD;

    fn deployer() -> Address {
        [1u8; 20]
    }

    fn pool_address() -> Address {
        [70u8; 20]
    }

    fn receiver_address() -> Address {
        [80u8; 20]
    }

    /// Receiver that repays only when `repay` is set
    struct TestReceiver {
        repay: bool,
        result: bool,
        calls: Vec<FlashLoanCall>,
    }

    impl FlashLoanSimpleReceiver for TestReceiver {
        fn address(&self) -> Address {
            receiver_address()
        }

        fn execute_operation(&mut self, ledger: &mut TokenLedger, call: &FlashLoanCall) -> ShieldResult<bool> {
            self.calls.push(call.clone());
            if self.repay {
                let ctx = CallContext::new(receiver_address(), call.block_height);
                ledger.approve(&ctx, call.asset, call.lender, call.amount + call.premium)?;
            }
            Ok(self.result)
        }
    }

    fn setup() -> (TokenLedger, MockAavePool, Address) {
        let ctx = CallContext::new(deployer(), 1);
        let mut ledger = TokenLedger::new();
        let usdc = ledger.create_token(&ctx, "USD Coin", "USDC");
        ledger.mint(&ctx, usdc, pool_address(), 100_000 * WAD).unwrap();
        // Receiver holds enough to pay premiums
        ledger.mint(&ctx, usdc, receiver_address(), 100 * WAD).unwrap();
        (ledger, MockAavePool::new(pool_address()), usdc)
    }

    #[test]
    fn test_premium() {
        let pool = MockAavePool::new(pool_address());
        assert_eq!(pool.flash_premium(10_000).unwrap(), 5);
        assert_eq!(pool.flash_premium(1_999).unwrap(), 0);
        assert_eq!(pool.premium_bps(), 5);
    }

    #[test]
    fn test_deposit_and_balance() {
        let (mut ledger, mut pool, usdc) = setup();
        let ctx = CallContext::new(deployer(), 2);
        ledger.mint(&ctx, usdc, deployer(), 1_000 * WAD).unwrap();
        ledger.approve(&ctx, usdc, pool_address(), 1_000 * WAD).unwrap();

        pool.deposit(&mut ledger, &ctx, usdc, 1_000 * WAD).unwrap();
        assert_eq!(pool.get_balance(&ledger, &usdc), 101_000 * WAD);
    }

    #[test]
    fn test_flash_loan_repaid_with_premium() {
        let (mut ledger, mut pool, usdc) = setup();
        let mut receiver = TestReceiver { repay: true, result: true, calls: Vec::new() };
        let ctx = CallContext::new(deployer(), 3);

        pool.flash_loan_simple(&mut ledger, &ctx, &mut receiver, usdc, 10_000 * WAD, vec![1, 2, 3])
            .unwrap();

        let premium = 5 * WAD;
        assert_eq!(pool.get_balance(&ledger, &usdc), 100_000 * WAD + premium);
        assert_eq!(ledger.balance_of(&usdc, &receiver_address()), 100 * WAD - premium);

        let call = &receiver.calls[0];
        assert_eq!(call.initiator, deployer());
        assert_eq!(call.premium, premium);
        assert_eq!(call.params, vec![1, 2, 3]);
        assert_eq!(pool.events().len(), 1);
    }

    #[test]
    fn test_flash_loan_false_return() {
        let (mut ledger, mut pool, usdc) = setup();
        let mut receiver = TestReceiver { repay: true, result: false, calls: Vec::new() };
        let result = pool.flash_loan_simple(&mut ledger, &CallContext::new(deployer(), 3), &mut receiver, usdc, WAD, Vec::new());
        assert_eq!(result, Err(ShieldError::InvalidFlashLoanExecutorReturn));
    }

    #[test]
    fn test_flash_loan_not_repaid() {
        let (mut ledger, mut pool, usdc) = setup();
        let mut receiver = TestReceiver { repay: false, result: true, calls: Vec::new() };
        let result = pool.flash_loan_simple(&mut ledger, &CallContext::new(deployer(), 3), &mut receiver, usdc, WAD, Vec::new());
        assert!(matches!(result, Err(ShieldError::InsufficientAllowance { .. })));
    }

    #[test]
    fn test_flash_loan_insufficient_liquidity() {
        let (mut ledger, mut pool, usdc) = setup();
        let mut receiver = TestReceiver { repay: true, result: true, calls: Vec::new() };
        let result = pool.flash_loan_simple(
            &mut ledger,
            &CallContext::new(deployer(), 3),
            &mut receiver,
            usdc,
            200_000 * WAD,
            Vec::new(),
        );
        assert!(matches!(result, Err(ShieldError::InsufficientLiquidity { .. })));
        assert!(receiver.calls.is_empty());
    }
}

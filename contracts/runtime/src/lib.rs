//! CDP Shield Runtime
//!
//! Owns every contract of a CDP Shield deployment and executes calls against
//! them as transactions. Each transaction runs at a fresh block height; if it
//! fails, all state it touched is rolled back, so a reverted deleverage never
//! leaves half-moved balances behind.
//!
//! ## Usage
//!
//! ```ignore
//! let mut chain = Chain::deploy(deployer, ShieldConfig::default())?;
//! chain.fund(user, 100 * WAD, 10_000 * WAD)?;
//! chain.approve(user, chain.weth(), chain.shield_address(), u128::MAX)?;
//! let id = chain.register_position(user, 10 * WAD, 10_000 * WAD)?;
//! chain.flash_loan_reduce_leverage(user, id, 2_000 * WAD, 0)?;
//! ```

use cdp_shield::{CdpShield, DeleveragePlan, FlashOutcome, FlashVenues, Venues};
use cdp_shield_common::{
    config::ShieldConfig,
    errors::ShieldResult,
    ledger::TokenLedger,
    types::{derive_address, format_address, Address, CallContext, Position, PositionId, SwapParams},
};
use cdp_shield_dex_aggregator::MockDexAggregator;
use cdp_shield_flash_receiver::FlashLoanReceiver;
use cdp_shield_lending_pool::MockAavePool;
use cdp_shield_price_oracle::MockPriceOracle;

mod integration_tests;

/// Parameters of a fresh deployment
pub mod genesis {
    use cdp_shield_common::constants::precision::WAD;

    /// WETH price in USD (WAD)
    pub const ETH_PRICE: u128 = 2_000 * WAD;

    /// USDC price in USD (WAD)
    pub const USDC_PRICE: u128 = WAD;

    /// USDC paid per WETH on the DEX (WAD)
    pub const WETH_USDC_RATE: u128 = 2_000 * WAD;

    /// USDC seeded into the DEX
    pub const DEX_LIQUIDITY: u128 = 500_000 * WAD;

    /// USDC deposited into the lending pool
    pub const POOL_LIQUIDITY: u128 = 100_000 * WAD;

    /// Contract addresses are derived from the deployer starting at this nonce
    pub const CONTRACT_NONCE_BASE: u64 = 1_000;
}

// ============ State ============

/// Every contract of a deployment, cloned as a whole for rollback
#[derive(Debug, Clone)]
pub struct ChainState {
    pub ledger: TokenLedger,
    pub oracle: MockPriceOracle,
    pub dex: MockDexAggregator,
    pub pool: MockAavePool,
    pub receiver: FlashLoanReceiver,
    pub shield: CdpShield,
}

impl ChainState {
    /// Split into the shield, the ledger and the swap venues
    pub fn swap_parts(&mut self) -> (&mut CdpShield, &mut TokenLedger, Venues<'_>) {
        (
            &mut self.shield,
            &mut self.ledger,
            Venues { oracle: &self.oracle, dex: &mut self.dex },
        )
    }

    /// Split into the shield, the ledger and the flash loan venues
    pub fn flash_parts(&mut self) -> (&mut CdpShield, &mut TokenLedger, FlashVenues<'_>) {
        (
            &mut self.shield,
            &mut self.ledger,
            FlashVenues {
                oracle: &self.oracle,
                dex: &mut self.dex,
                pool: &mut self.pool,
                receiver: &mut self.receiver,
            },
        )
    }
}

// ============ Chain ============

/// Transactional executor over a `ChainState`
#[derive(Debug, Clone)]
pub struct Chain {
    state: ChainState,
    block_height: u64,
    deployer: Address,
    weth: Address,
    usdc: Address,
}

impl Chain {
    /// Deploy and wire a complete system owned by `deployer`
    ///
    /// Creates WETH and USDC, prices them, lists them on the DEX with USDC
    /// liquidity, funds the lending pool and points shield and receiver at
    /// each other.
    pub fn deploy(deployer: Address, config: ShieldConfig) -> ShieldResult<Self> {
        let ctx = CallContext::new(deployer, 0);
        let contract = |i: u64| derive_address(&deployer, genesis::CONTRACT_NONCE_BASE + i);
        let (oracle_addr, dex_addr, pool_addr, shield_addr, receiver_addr) =
            (contract(0), contract(1), contract(2), contract(3), contract(4));

        let mut ledger = TokenLedger::new();
        let weth = ledger.create_token(&ctx, "Wrapped Ether", "WETH");
        let usdc = ledger.create_token(&ctx, "USD Coin", "USDC");

        let mut oracle = MockPriceOracle::new(oracle_addr, deployer, config.max_price_age_blocks)?;
        oracle.set_price(&ctx, weth, genesis::ETH_PRICE)?;
        oracle.set_price(&ctx, usdc, genesis::USDC_PRICE)?;

        let mut dex = MockDexAggregator::new(dex_addr, deployer)?;
        dex.add_allowed_token(&ctx, weth)?;
        dex.add_allowed_token(&ctx, usdc)?;
        dex.set_exchange_rate(&ctx, weth, usdc, genesis::WETH_USDC_RATE)?;

        ledger.mint(&ctx, usdc, deployer, genesis::DEX_LIQUIDITY + genesis::POOL_LIQUIDITY)?;
        ledger.transfer(&ctx, usdc, dex_addr, genesis::DEX_LIQUIDITY)?;

        let mut pool = MockAavePool::new(pool_addr);
        ledger.approve(&ctx, usdc, pool_addr, genesis::POOL_LIQUIDITY)?;
        pool.deposit(&mut ledger, &ctx, usdc, genesis::POOL_LIQUIDITY)?;

        let mut shield = CdpShield::new(shield_addr, deployer, oracle_addr, dex_addr, config)?;
        let receiver = FlashLoanReceiver::new(receiver_addr, deployer, pool_addr, shield_addr, dex_addr)?;
        shield.set_aave_pool(&ctx, pool_addr)?;
        shield.set_flash_loan_receiver(&ctx, receiver_addr)?;

        log::info!(
            "deployed shield {} (oracle {}, dex {}, pool {}, receiver {})",
            format_address(&shield_addr),
            format_address(&oracle_addr),
            format_address(&dex_addr),
            format_address(&pool_addr),
            format_address(&receiver_addr)
        );

        Ok(Self {
            state: ChainState { ledger, oracle, dex, pool, receiver, shield },
            block_height: 0,
            deployer,
            weth,
            usdc,
        })
    }

    /// Run `call` as a transaction from `sender` in the next block
    ///
    /// On `Err` every contract is restored to its state before the call.
    pub fn transact<T>(
        &mut self,
        sender: Address,
        call: impl FnOnce(&mut ChainState, &CallContext) -> ShieldResult<T>,
    ) -> ShieldResult<T> {
        self.block_height += 1;
        let ctx = CallContext::new(sender, self.block_height);
        let snapshot = self.state.clone();

        match call(&mut self.state, &ctx) {
            Ok(value) => Ok(value),
            Err(err) => {
                log::warn!(
                    "transaction from {} reverted at block {}: {} [{}]",
                    format_address(&sender),
                    self.block_height,
                    err,
                    err.code()
                );
                self.state = snapshot;
                Err(err)
            }
        }
    }

    // ============ Token Transactions ============

    /// Mint test balances of both tokens to `to` (deployer transaction)
    pub fn fund(&mut self, to: Address, weth_amount: u128, usdc_amount: u128) -> ShieldResult<()> {
        let (weth, usdc) = (self.weth, self.usdc);
        self.transact(self.deployer, |s, ctx| {
            s.ledger.mint(ctx, weth, to, weth_amount)?;
            s.ledger.mint(ctx, usdc, to, usdc_amount)
        })
    }

    pub fn approve(&mut self, sender: Address, token: Address, spender: Address, amount: u128) -> ShieldResult<()> {
        self.transact(sender, |s, ctx| s.ledger.approve(ctx, token, spender, amount))
    }

    pub fn set_price(&mut self, sender: Address, token: Address, price: u128) -> ShieldResult<()> {
        self.transact(sender, |s, ctx| s.oracle.set_price(ctx, token, price))
    }

    // ============ Shield Transactions ============

    /// Register a WETH-collateral, USDC-debt position owned by `sender`
    pub fn register_position(
        &mut self,
        sender: Address,
        collateral_amount: u128,
        debt_amount: u128,
    ) -> ShieldResult<PositionId> {
        let (weth, usdc) = (self.weth, self.usdc);
        self.transact(sender, |s, ctx| {
            s.shield
                .register_position(ctx, &s.oracle, sender, weth, usdc, collateral_amount, debt_amount)
        })
    }

    pub fn update_position(
        &mut self,
        sender: Address,
        position_id: PositionId,
        collateral_amount: u128,
        debt_amount: u128,
    ) -> ShieldResult<()> {
        self.transact(sender, |s, ctx| {
            s.shield
                .update_position(ctx, &s.oracle, position_id, collateral_amount, debt_amount)
        })
    }

    pub fn reduce_leverage(
        &mut self,
        sender: Address,
        position_id: PositionId,
        debt_to_repay: u128,
        swap: SwapParams,
    ) -> ShieldResult<u128> {
        self.transact(sender, |s, ctx| {
            let (shield, ledger, venues) = s.swap_parts();
            shield.reduce_leverage(ledger, ctx, venues, position_id, debt_to_repay, swap)
        })
    }

    pub fn flash_loan_reduce_leverage(
        &mut self,
        sender: Address,
        position_id: PositionId,
        debt_to_repay: u128,
        min_amount_out: u128,
    ) -> ShieldResult<FlashOutcome> {
        self.transact(sender, |s, ctx| {
            let (shield, ledger, venues) = s.flash_parts();
            shield.flash_loan_reduce_leverage(ledger, ctx, venues, position_id, debt_to_repay, min_amount_out)
        })
    }

    pub fn flash_loan_emergency_close(
        &mut self,
        sender: Address,
        position_id: PositionId,
        min_amount_out: u128,
    ) -> ShieldResult<FlashOutcome> {
        self.transact(sender, |s, ctx| {
            let (shield, ledger, venues) = s.flash_parts();
            shield.flash_loan_emergency_close(ledger, ctx, venues, position_id, min_amount_out)
        })
    }

    pub fn pause(&mut self, sender: Address) -> ShieldResult<()> {
        self.transact(sender, |s, ctx| s.shield.pause(ctx))
    }

    pub fn unpause(&mut self, sender: Address) -> ShieldResult<()> {
        self.transact(sender, |s, ctx| s.shield.unpause(ctx))
    }

    // ============ Views ============

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn block_height(&self) -> u64 {
        self.block_height
    }

    pub fn deployer(&self) -> Address {
        self.deployer
    }

    pub fn weth(&self) -> Address {
        self.weth
    }

    pub fn usdc(&self) -> Address {
        self.usdc
    }

    pub fn shield_address(&self) -> Address {
        self.state.shield.address()
    }

    pub fn balance_of(&self, token: &Address, holder: &Address) -> u128 {
        self.state.ledger.balance_of(token, holder)
    }

    pub fn position(&self, position_id: PositionId) -> ShieldResult<&Position> {
        self.state.shield.get_position(position_id)
    }

    pub fn health_factor(&self, position_id: PositionId) -> ShieldResult<u128> {
        self.state
            .shield
            .current_health_factor(&self.state.oracle, self.block_height, position_id)
    }

    pub fn positions_at_risk(&self, threshold: u128) -> ShieldResult<Vec<(PositionId, u128)>> {
        self.state
            .shield
            .positions_at_risk(&self.state.oracle, self.block_height, threshold)
    }

    pub fn plan_deleverage(&self, position_id: PositionId, target_health_factor: u128) -> ShieldResult<DeleveragePlan> {
        self.state
            .shield
            .plan_deleverage(
                &self.state.oracle,
                &self.state.pool,
                self.block_height,
                position_id,
                target_health_factor,
            )
    }
}

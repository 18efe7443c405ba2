//! Integration Tests
//!
//! End-to-end scenarios across the shield, receiver, lending pool, DEX and
//! oracle, executed as transactions on a freshly deployed chain.

#[cfg(test)]
mod tests {
    use crate::*;
    use cdp_shield_common::{
        constants::{health::CRITICAL_HEALTH_FACTOR, precision::WAD},
        errors::ShieldError,
        events::EventType,
        interfaces::{DexAggregator, FlashLender},
        types::PositionStatus,
    };

    const USER_WETH: u128 = 100 * WAD;
    const USER_USDC: u128 = 10_000 * WAD;

    fn deployer() -> Address {
        [1u8; 20]
    }

    fn user1() -> Address {
        [2u8; 20]
    }

    fn user2() -> Address {
        [3u8; 20]
    }

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn setup_with(config: ShieldConfig) -> Chain {
        init_logging();
        let mut chain = Chain::deploy(deployer(), config).unwrap();
        let (weth, shield) = (chain.weth(), chain.shield_address());
        for user in [user1(), user2()] {
            chain.fund(user, USER_WETH, USER_USDC).unwrap();
            chain.approve(user, weth, shield, u128::MAX).unwrap();
        }
        chain
    }

    fn setup() -> Chain {
        setup_with(ShieldConfig::default())
    }

    fn weth_for_usdc(chain: &Chain, amount_in: u128, min_out: u128) -> SwapParams {
        SwapParams::new(chain.weth(), chain.usdc(), amount_in, min_out)
    }

    // ============================================================================
    // Deployment
    // ============================================================================

    #[test]
    fn test_deployment_wiring() {
        let chain = setup();
        let state = chain.state();

        assert_eq!(state.shield.owner(), deployer());
        assert_eq!(state.shield.aave_pool(), Some(state.pool.address()));
        assert_eq!(state.shield.flash_loan_receiver(), Some(state.receiver.address()));
        assert_eq!(state.receiver.cdp_shield(), chain.shield_address());
        assert_eq!(state.receiver.aave_pool(), state.pool.address());

        assert_eq!(state.pool.get_balance(&state.ledger, &chain.usdc()), genesis::POOL_LIQUIDITY);
        assert_eq!(chain.balance_of(&chain.usdc(), &state.dex.address()), genesis::DEX_LIQUIDITY);
        assert_eq!(chain.balance_of(&chain.weth(), &user1()), USER_WETH);
        assert_eq!(chain.balance_of(&chain.usdc(), &user1()), USER_USDC);
    }

    #[test]
    fn test_deploy_rejects_invalid_config() {
        let config = ShieldConfig { liquidation_threshold_bps: 0, ..Default::default() };
        let result = Chain::deploy(deployer(), config);
        assert!(matches!(result, Err(ShieldError::InvalidConfig { .. })));
    }

    // ============================================================================
    // Registration
    // ============================================================================

    #[test]
    fn test_register_and_track_positions() {
        let mut chain = setup();

        let first = chain.register_position(user1(), 10 * WAD, 10_000 * WAD).unwrap();
        let second = chain.register_position(user1(), 5 * WAD, 2_000 * WAD).unwrap();
        chain.register_position(user2(), 2 * WAD, 1_000 * WAD).unwrap();

        assert_eq!((first, second), (1, 2));
        assert_eq!(chain.state().shield.get_user_positions(&user1()), vec![1, 2]);
        assert_eq!(chain.position(first).unwrap().health_factor, 2 * WAD);
        assert_eq!(chain.health_factor(second).unwrap(), 5 * WAD);
    }

    #[test]
    fn test_rejected_registration_still_consumes_block() {
        let mut chain = setup();
        let height = chain.block_height();

        let err = chain.register_position(user1(), WAD, 10_000 * WAD).unwrap_err();
        assert_eq!(err.to_string(), "Health factor too low");
        assert_eq!(chain.block_height(), height + 1);
        assert_eq!(chain.state().shield.get_position_count(), 0);
    }

    #[test]
    fn test_update_position_by_owner() {
        let mut chain = setup();
        let id = chain.register_position(user1(), 10 * WAD, 10_000 * WAD).unwrap();

        let err = chain.update_position(user2(), id, 20 * WAD, 10_000 * WAD).unwrap_err();
        assert_eq!(err.to_string(), "Not position owner");

        chain.update_position(user1(), id, 20 * WAD, 10_000 * WAD).unwrap();
        assert_eq!(chain.position(id).unwrap().health_factor, 4 * WAD);
    }

    // ============================================================================
    // Swap-Funded Deleveraging
    // ============================================================================

    #[test]
    fn test_reduce_leverage_lifecycle() {
        let mut chain = setup();
        let id = chain.register_position(user1(), 10 * WAD, 10_000 * WAD).unwrap();

        let swap = weth_for_usdc(&chain, 101 * WAD / 100, 2_000 * WAD);
        let hf = chain.reduce_leverage(user1(), id, 2_000 * WAD, swap).unwrap();

        assert_eq!(hf, 2_247_500_000_000_000_000);
        assert_eq!(chain.balance_of(&chain.weth(), &user1()), USER_WETH - 101 * WAD / 100);
        assert_eq!(chain.balance_of(&chain.usdc(), &user1()), USER_USDC + 20 * WAD);
        assert_eq!(chain.balance_of(&chain.usdc(), &chain.shield_address()), 2_000 * WAD);
        assert_eq!(chain.position(id).unwrap().debt_amount, 8_000 * WAD);
    }

    #[test]
    fn test_failed_deleverage_reverts_swap() {
        let mut chain = setup();
        let id = chain.register_position(user1(), 10 * WAD, 10_000 * WAD).unwrap();
        let (weth, usdc) = (chain.weth(), chain.usdc());

        // DEX now pays a quarter of the oracle price
        chain
            .transact(deployer(), |s, ctx| s.dex.set_exchange_rate(ctx, weth, usdc, 500 * WAD))
            .unwrap();

        let dex = chain.state().dex.address();
        let ledger_events = chain.state().ledger.events().len();
        let before = chain.position(id).unwrap().clone();

        let swap = weth_for_usdc(&chain, 4 * WAD, 2_000 * WAD);
        let result = chain.reduce_leverage(user1(), id, 2_000 * WAD, swap);
        assert!(matches!(result, Err(ShieldError::HealthFactorNotImproved { .. })));

        // The swap ran before the check failed; none of it survives
        assert_eq!(chain.balance_of(&weth, &user1()), USER_WETH);
        assert_eq!(chain.balance_of(&usdc, &dex), genesis::DEX_LIQUIDITY);
        assert_eq!(chain.balance_of(&usdc, &chain.shield_address()), 0);
        assert_eq!(chain.state().ledger.events().len(), ledger_events);
        assert_eq!(chain.position(id).unwrap(), &before);
    }

    // ============================================================================
    // Flash Loan Deleveraging
    // ============================================================================

    #[test]
    fn test_flash_loan_reduce_leverage() {
        let mut chain = setup();
        let id = chain.register_position(user1(), 10 * WAD, 10_000 * WAD).unwrap();
        let usdc = chain.usdc();

        let outcome = chain.flash_loan_reduce_leverage(user1(), id, 2_000 * WAD, 2_000 * WAD).unwrap();
        assert_eq!(outcome.premium, WAD);
        assert_eq!(outcome.collateral_sold, 10_005 * WAD / 10_000);

        let state = chain.state();
        assert_eq!(state.pool.get_balance(&state.ledger, &usdc), genesis::POOL_LIQUIDITY + WAD);
        assert_eq!(chain.balance_of(&usdc, &state.receiver.address()), 0);
        assert_eq!(chain.position(id).unwrap().debt_amount, 8_000 * WAD);
        assert!(chain.health_factor(id).unwrap() > 2 * WAD);

        assert_eq!(state.pool.events().filter_by_type(EventType::FlashLoan).len(), 1);
        assert_eq!(state.receiver.events().filter_by_type(EventType::FlashLoanExecuted).len(), 1);
        assert_eq!(state.shield.events().filter_by_type(EventType::FlashLeverageReduced).len(), 1);
    }

    #[test]
    fn test_failed_flash_loan_reverts_everything() {
        let mut chain = setup();
        let id = chain.register_position(user1(), 10 * WAD, 10_000 * WAD).unwrap();
        let (weth, usdc) = (chain.weth(), chain.usdc());
        let pool = chain.state().pool.address();
        let pool_events = chain.state().pool.events().len();

        // 1.0005 WETH only fetches 2,001 USDC
        let result = chain.flash_loan_reduce_leverage(user1(), id, 2_000 * WAD, 3_000 * WAD);
        assert!(matches!(result, Err(ShieldError::InsufficientOutputAmount { .. })));

        assert_eq!(chain.balance_of(&usdc, &pool), genesis::POOL_LIQUIDITY);
        assert_eq!(chain.balance_of(&weth, &user1()), USER_WETH);
        assert_eq!(chain.balance_of(&usdc, &chain.shield_address()), 0);
        assert_eq!(chain.position(id).unwrap().debt_amount, 10_000 * WAD);
        assert_eq!(chain.state().pool.events().len(), pool_events);
    }

    #[test]
    fn test_flash_loan_limited_by_pool_liquidity() {
        let mut chain = setup();
        let id = chain.register_position(user1(), 100 * WAD, 150_000 * WAD).unwrap();

        let result = chain.flash_loan_reduce_leverage(user1(), id, 120_000 * WAD, 0);
        assert!(matches!(result, Err(ShieldError::InsufficientLiquidity { .. })));
        assert_eq!(chain.position(id).unwrap().debt_amount, 150_000 * WAD);
    }

    #[test]
    fn test_plan_then_execute_deleverage() {
        let mut chain = setup();
        let id = chain.register_position(user1(), 11 * WAD / 10, 2_000 * WAD).unwrap();
        let target = 3 * WAD / 2;

        let plan = chain.plan_deleverage(id, target).unwrap();
        let outcome = chain.flash_loan_reduce_leverage(user1(), id, plan.debt_to_repay, 0).unwrap();

        assert_eq!(outcome.collateral_sold, plan.collateral_to_sell);
        assert_eq!(outcome.health_factor, plan.expected_health_factor);
        assert!(outcome.health_factor.abs_diff(target) < WAD / 1_000_000);
    }

    // ============================================================================
    // Emergency Close
    // ============================================================================

    #[test]
    fn test_emergency_close_after_price_crash() {
        let mut chain = setup();
        let id = chain.register_position(user1(), 10 * WAD, 10_000 * WAD).unwrap();
        let (weth, usdc) = (chain.weth(), chain.usdc());

        let err = chain.flash_loan_emergency_close(user1(), id, 0).unwrap_err();
        assert_eq!(err.to_string(), "Health factor not critical");

        chain.set_price(deployer(), weth, 1_150 * WAD).unwrap();
        assert_eq!(chain.positions_at_risk(CRITICAL_HEALTH_FACTOR).unwrap(), vec![(id, 1_150_000_000_000_000_000)]);

        let outcome = chain.flash_loan_emergency_close(user1(), id, 0).unwrap();

        // 10,005 USDC owed at 2,000 USDC per WETH
        assert_eq!(outcome.collateral_sold, 50_025 * WAD / 10_000);
        assert_eq!(outcome.collateral_remaining, 10 * WAD - outcome.collateral_sold);
        assert_eq!(chain.balance_of(&weth, &user1()), USER_WETH - outcome.collateral_sold);
        assert_eq!(chain.balance_of(&usdc, &chain.state().pool.address()), genesis::POOL_LIQUIDITY + 5 * WAD);

        let position = chain.position(id).unwrap();
        assert_eq!(position.status, PositionStatus::Closed);
        assert_eq!(position.debt_amount, 0);
        assert!(chain.positions_at_risk(CRITICAL_HEALTH_FACTOR).unwrap().is_empty());
    }

    #[test]
    fn test_emergency_close_by_non_owner_rejected() {
        let mut chain = setup();
        let id = chain.register_position(user1(), 11 * WAD / 10, 2_000 * WAD).unwrap();

        let err = chain.flash_loan_emergency_close(user2(), id, 0).unwrap_err();
        assert_eq!(err.to_string(), "Not position owner");
        assert!(chain.position(id).unwrap().is_active());
    }

    // ============================================================================
    // Pause / Admin
    // ============================================================================

    #[test]
    fn test_pause_scope() {
        let mut chain = setup();
        let critical = chain.register_position(user1(), 11 * WAD / 10, 2_000 * WAD).unwrap();
        let healthy = chain.register_position(user2(), 10 * WAD, 10_000 * WAD).unwrap();

        assert!(matches!(
            chain.pause(user1()),
            Err(ShieldError::OwnableUnauthorizedAccount { .. })
        ));
        chain.pause(deployer()).unwrap();

        assert_eq!(chain.register_position(user1(), 10 * WAD, 1_000 * WAD), Err(ShieldError::EnforcedPause));
        assert_eq!(
            chain.flash_loan_reduce_leverage(user2(), healthy, 1_000 * WAD, 0),
            Err(ShieldError::EnforcedPause)
        );
        assert!(chain.flash_loan_emergency_close(user1(), critical, 0).is_ok());

        chain.unpause(deployer()).unwrap();
        assert!(chain.flash_loan_reduce_leverage(user2(), healthy, 1_000 * WAD, 0).is_ok());
    }

    #[test]
    fn test_receiver_emergency_withdraw() {
        let mut chain = setup();
        let usdc = chain.usdc();
        let receiver = chain.state().receiver.address();
        chain.fund(receiver, 0, 50 * WAD).unwrap();

        let result = chain.transact(user1(), |s, ctx| s.receiver.emergency_withdraw(&mut s.ledger, ctx, usdc, 50 * WAD));
        assert!(matches!(result, Err(ShieldError::OwnableUnauthorizedAccount { .. })));

        chain
            .transact(deployer(), |s, ctx| s.receiver.emergency_withdraw(&mut s.ledger, ctx, usdc, 50 * WAD))
            .unwrap();
        assert_eq!(chain.balance_of(&usdc, &deployer()), 50 * WAD);
        assert_eq!(chain.balance_of(&usdc, &receiver), 0);
    }

    // ============================================================================
    // Oracle Freshness
    // ============================================================================

    #[test]
    fn test_stale_prices_block_registration() {
        let mut chain = setup_with(ShieldConfig { max_price_age_blocks: 6, ..Default::default() });
        let (weth, usdc) = (chain.weth(), chain.usdc());

        // Prices were published at block 0; setup used blocks 1-4
        assert!(chain.register_position(user1(), 10 * WAD, 1_000 * WAD).is_ok());
        chain.pause(deployer()).unwrap();
        chain.unpause(deployer()).unwrap();

        let result = chain.register_position(user1(), 10 * WAD, 1_000 * WAD);
        assert!(matches!(result, Err(ShieldError::StalePrice { .. })));

        chain.set_price(deployer(), weth, genesis::ETH_PRICE).unwrap();
        chain.set_price(deployer(), usdc, genesis::USDC_PRICE).unwrap();
        assert!(chain.register_position(user1(), 10 * WAD, 1_000 * WAD).is_ok());
    }
}

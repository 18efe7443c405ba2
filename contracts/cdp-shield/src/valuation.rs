//! Live Valuation
//!
//! Health factors and USD values computed from current oracle prices.

use cdp_shield_common::{
    errors::ShieldResult,
    interfaces::PriceOracle,
    math::{calculate_health_factor, usd_value},
    types::{Address, Position},
};

/// USD values (WAD) of a collateral/debt pair at current prices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairValue {
    pub collateral_price: u128,
    pub debt_price: u128,
    pub collateral_value: u128,
    pub debt_value: u128,
}

/// Price both legs of a position
pub fn value_pair(
    oracle: &dyn PriceOracle,
    current_block: u64,
    collateral_token: &Address,
    collateral_amount: u128,
    debt_token: &Address,
    debt_amount: u128,
) -> ShieldResult<PairValue> {
    let collateral_price = oracle.get_price(collateral_token, current_block)?;
    let debt_price = oracle.get_price(debt_token, current_block)?;

    Ok(PairValue {
        collateral_price,
        debt_price,
        collateral_value: usd_value(collateral_amount, collateral_price)?,
        debt_value: usd_value(debt_amount, debt_price)?,
    })
}

/// Health factor of arbitrary amounts at current prices
pub fn health_factor(
    oracle: &dyn PriceOracle,
    current_block: u64,
    threshold_bps: u64,
    collateral_token: &Address,
    collateral_amount: u128,
    debt_token: &Address,
    debt_amount: u128,
) -> ShieldResult<u128> {
    let value = value_pair(oracle, current_block, collateral_token, collateral_amount, debt_token, debt_amount)?;
    calculate_health_factor(value.collateral_value, value.debt_value, threshold_bps)
}

/// Health factor of `position` with its amounts replaced
pub fn position_health_factor(
    oracle: &dyn PriceOracle,
    current_block: u64,
    threshold_bps: u64,
    position: &Position,
    collateral_amount: u128,
    debt_amount: u128,
) -> ShieldResult<u128> {
    health_factor(
        oracle,
        current_block,
        threshold_bps,
        &position.collateral_token,
        collateral_amount,
        &position.debt_token,
        debt_amount,
    )
}

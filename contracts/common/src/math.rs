//! Mathematical Utilities for CDP Shield
//!
//! WAD fixed-point helpers and the health-factor formulas.
//!
//! Token amounts and WAD prices are both scaled by 1e18, so a plain
//! `amount * price` can exceed `u128`. Every product therefore goes through
//! `mul_div`, which keeps the full 256-bit intermediate.

use crate::constants::{health, precision::{BPS_DENOMINATOR, WAD}, risk};
use crate::errors::{ShieldError, ShieldResult};

const LOW_MASK: u128 = u64::MAX as u128;

/// 256-bit product of two u128 values as (high, low) halves
fn full_mul(a: u128, b: u128) -> (u128, u128) {
    let (a1, a0) = (a >> 64, a & LOW_MASK);
    let (b1, b0) = (b >> 64, b & LOW_MASK);

    let p00 = a0 * b0;
    let p01 = a0 * b1;
    let p10 = a1 * b0;
    let p11 = a1 * b1;

    let mid = (p00 >> 64) + (p01 & LOW_MASK) + (p10 & LOW_MASK);
    let lo = (p00 & LOW_MASK) | (mid << 64);
    let hi = p11 + (p01 >> 64) + (p10 >> 64) + (mid >> 64);
    (hi, lo)
}

/// (a * b) / d as (quotient, remainder), exact for any inputs whose quotient fits
fn mul_div_rem(a: u128, b: u128, d: u128) -> ShieldResult<(u128, u128)> {
    if d == 0 {
        return Err(ShieldError::DivisionByZero);
    }

    let (hi, lo) = full_mul(a, b);
    if hi == 0 {
        return Ok((lo / d, lo % d));
    }
    if hi >= d {
        return Err(ShieldError::Overflow);
    }

    // Long division of (hi, lo) by d, one bit at a time
    let mut rem = hi;
    let mut quo: u128 = 0;
    for i in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> i) & 1);
        quo <<= 1;
        if carry == 1 || rem >= d {
            rem = rem.wrapping_sub(d);
            quo |= 1;
        }
    }
    Ok((quo, rem))
}

/// floor(a * b / d)
pub fn mul_div(a: u128, b: u128, d: u128) -> ShieldResult<u128> {
    mul_div_rem(a, b, d).map(|(q, _)| q)
}

/// ceil(a * b / d)
pub fn mul_div_up(a: u128, b: u128, d: u128) -> ShieldResult<u128> {
    let (q, r) = mul_div_rem(a, b, d)?;
    if r == 0 {
        Ok(q)
    } else {
        q.checked_add(1).ok_or(ShieldError::Overflow)
    }
}

/// a * b / WAD
pub fn wad_mul(a: u128, b: u128) -> ShieldResult<u128> {
    mul_div(a, b, WAD)
}

/// a * WAD / b
pub fn wad_div(a: u128, b: u128) -> ShieldResult<u128> {
    mul_div(a, WAD, b)
}

/// amount * bps / 10_000
pub fn bps_mul(amount: u128, bps: u64) -> ShieldResult<u128> {
    mul_div(amount, bps as u128, BPS_DENOMINATOR)
}

/// USD value (WAD) of `amount` tokens at `price` (WAD per whole token)
pub fn usd_value(amount: u128, price: u128) -> ShieldResult<u128> {
    wad_mul(amount, price)
}

/// Calculate a health factor from USD values
///
/// HF = collateral_value * threshold / debt_value
///
/// # Arguments
/// * `collateral_value` - Collateral value in USD (WAD)
/// * `debt_value` - Debt value in USD (WAD)
/// * `threshold_bps` - Liquidation threshold in basis points
///
/// # Returns
/// Health factor as WAD, saturating at `u128::MAX` for zero or dust debt
pub fn calculate_health_factor(
    collateral_value: u128,
    debt_value: u128,
    threshold_bps: u64,
) -> ShieldResult<u128> {
    if debt_value == 0 {
        return Ok(health::MAX_HEALTH_FACTOR);
    }

    let adjusted = bps_mul(collateral_value, threshold_bps)?;
    match wad_div(adjusted, debt_value) {
        Err(ShieldError::Overflow) => Ok(health::MAX_HEALTH_FACTOR),
        result => result,
    }
}

/// Health factor from token amounts and prices
pub fn health_factor_for(
    collateral_amount: u128,
    collateral_price: u128,
    debt_amount: u128,
    debt_price: u128,
    threshold_bps: u64,
) -> ShieldResult<u128> {
    let collateral_value = usd_value(collateral_amount, collateral_price)?;
    let debt_value = usd_value(debt_amount, debt_price)?;
    calculate_health_factor(collateral_value, debt_value, threshold_bps)
}

/// Collateral price (WAD) at which the health factor reaches 1.0
///
/// price = debt_value * 10_000 / (collateral_amount * threshold)
///
/// Returns 0 when there is no debt (the position cannot be liquidated).
pub fn liquidation_price(
    collateral_amount: u128,
    debt_value: u128,
    threshold_bps: u64,
) -> ShieldResult<u128> {
    if debt_value == 0 {
        return Ok(0);
    }
    if collateral_amount == 0 || threshold_bps == 0 {
        return Err(ShieldError::DivisionByZero);
    }

    let per_token = mul_div(debt_value, WAD, collateral_amount)?;
    mul_div(per_token, BPS_DENOMINATOR, threshold_bps as u128)
}

/// Debt value (USD, WAD) to repay so the health factor reaches `target`
///
/// Repaying R of debt with a flash loan costs R * (1 + premium) of collateral:
///
/// `HF' = (C - R(1+f)) * LT / (D - R) = target`
/// `R = (target * D - C * LT) / (target - (1+f) * LT)`
///
/// # Returns
/// 0 if the position is already at or above `target`
pub fn deleverage_amount(
    collateral_value: u128,
    debt_value: u128,
    threshold_bps: u64,
    target: u128,
    premium_bps: u64,
) -> ShieldResult<u128> {
    let current = calculate_health_factor(collateral_value, debt_value, threshold_bps)?;
    if current >= target {
        return Ok(0);
    }

    let lt = mul_div(WAD, threshold_bps as u128, BPS_DENOMINATOR)?;
    let lt_with_premium = mul_div(lt, BPS_DENOMINATOR + premium_bps as u128, BPS_DENOMINATOR)?;
    if target <= lt_with_premium {
        return Err(ShieldError::UnreachableHealthFactor { target });
    }

    let target_debt = wad_mul(target, debt_value)?;
    let adjusted_collateral = wad_mul(lt, collateral_value)?;
    let numerator = target_debt.saturating_sub(adjusted_collateral);
    let denominator = target - lt_with_premium;

    let repay = mul_div_up(numerator, WAD, denominator)?;
    Ok(repay.min(debt_value))
}

// ============ Risk Bands ============

/// Risk band of a position, as shown by monitoring views
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    /// HF >= 2.0
    Safe,
    /// 1.5 <= HF < 2.0
    Warning,
    /// 1.2 <= HF < 1.5
    Danger,
    /// HF < 1.2
    Critical,
}

impl RiskLevel {
    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "Safe",
            RiskLevel::Warning => "Warning",
            RiskLevel::Danger => "Danger",
            RiskLevel::Critical => "Critical",
        }
    }
}

/// Classify a health factor into its risk band
pub fn classify_risk(health_factor: u128) -> RiskLevel {
    if health_factor >= risk::SAFE {
        RiskLevel::Safe
    } else if health_factor >= risk::WARNING {
        RiskLevel::Warning
    } else if health_factor >= risk::DANGER {
        RiskLevel::Danger
    } else {
        RiskLevel::Critical
    }
}

/// Safe addition with overflow check
pub fn safe_add(a: u128, b: u128) -> ShieldResult<u128> {
    a.checked_add(b).ok_or(ShieldError::Overflow)
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u128, b: u128) -> ShieldResult<u128> {
    a.checked_sub(b).ok_or(ShieldError::Underflow)
}

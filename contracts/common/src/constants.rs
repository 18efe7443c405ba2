//! Protocol Constants
//!
//! All magic numbers and default configuration values for CDP Shield.
//! Amounts are 18-decimal base units, prices and health factors are WAD.

/// Fixed-point precision
pub mod precision {
    /// 1.0 with 18 decimals
    pub const WAD: u128 = 1_000_000_000_000_000_000;

    /// Basis points denominator (100 = 1%)
    pub const BPS_DENOMINATOR: u128 = 10_000;

    /// Decimal places of every token amount
    pub const TOKEN_DECIMALS: u8 = 18;
}

/// Health factor thresholds (WAD)
pub mod health {
    use super::precision::WAD;

    /// Share of collateral value counted against debt (100%)
    pub const LIQUIDATION_THRESHOLD_BPS: u64 = 10_000;

    /// Registrations and updates below this are rejected (1.1)
    pub const MIN_HEALTH_FACTOR: u128 = WAD + WAD / 10;

    /// Emergency close is allowed at or below this (1.2)
    pub const CRITICAL_HEALTH_FACTOR: u128 = WAD + WAD / 5;

    /// Liquidation boundary (1.0)
    pub const LIQUIDATION_HEALTH_FACTOR: u128 = WAD;

    /// Returned for positions without debt
    pub const MAX_HEALTH_FACTOR: u128 = u128::MAX;
}

/// Risk band boundaries used by monitoring views (WAD)
pub mod risk {
    use super::precision::WAD;

    /// At or above: safe
    pub const SAFE: u128 = 2 * WAD;

    /// At or above: warning
    pub const WARNING: u128 = WAD + WAD / 2;

    /// At or above: danger; below: critical
    pub const DANGER: u128 = WAD + WAD / 5;
}

/// Flash loan configuration
pub mod flash {
    /// Aave-compatible flash loan premium (0.05% = 5 bps)
    pub const FLASH_LOAN_PREMIUM_BPS: u64 = 5;
}

/// Oracle configuration
pub mod oracle {
    /// Maximum price age in blocks before a price is stale (0 disables the check)
    pub const DEFAULT_MAX_PRICE_AGE_BLOCKS: u64 = 0;
}

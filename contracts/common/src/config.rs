//! Shield Configuration
//!
//! Risk parameters of a CDP Shield deployment. Defaults come from
//! `constants`; deployments may override them before construction.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::{health, oracle, precision::{BPS_DENOMINATOR, WAD}};
use crate::{ShieldError, ShieldResult};

/// Risk parameters of a shield deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ShieldConfig {
    /// Share of collateral value counted against debt, in basis points
    pub liquidation_threshold_bps: u64,
    /// Registration / update floor (WAD)
    pub min_health_factor: u128,
    /// Emergency close allowed at or below this (WAD)
    pub critical_health_factor: u128,
    /// Oracle staleness bound in blocks (0 disables)
    pub max_price_age_blocks: u64,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            liquidation_threshold_bps: health::LIQUIDATION_THRESHOLD_BPS,
            min_health_factor: health::MIN_HEALTH_FACTOR,
            critical_health_factor: health::CRITICAL_HEALTH_FACTOR,
            max_price_age_blocks: oracle::DEFAULT_MAX_PRICE_AGE_BLOCKS,
        }
    }
}

impl ShieldConfig {
    /// Check parameter ranges
    pub fn validate(&self) -> ShieldResult<()> {
        if self.liquidation_threshold_bps == 0 {
            return Err(ShieldError::InvalidConfig {
                param: "liquidation_threshold_bps",
                reason: "must be positive",
            });
        }
        if self.liquidation_threshold_bps as u128 > BPS_DENOMINATOR {
            return Err(ShieldError::InvalidConfig {
                param: "liquidation_threshold_bps",
                reason: "must not exceed 100%",
            });
        }
        if self.min_health_factor < WAD {
            return Err(ShieldError::InvalidConfig {
                param: "min_health_factor",
                reason: "must be at least 1.0",
            });
        }
        if self.critical_health_factor < WAD {
            return Err(ShieldError::InvalidConfig {
                param: "critical_health_factor",
                reason: "must be at least 1.0",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ShieldConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.liquidation_threshold_bps, 10_000);
        assert_eq!(config.min_health_factor, 1_100_000_000_000_000_000);
        assert_eq!(config.critical_health_factor, 1_200_000_000_000_000_000);
    }

    #[test]
    fn test_rejects_out_of_range() {
        let zero_threshold = ShieldConfig { liquidation_threshold_bps: 0, ..Default::default() };
        assert!(matches!(zero_threshold.validate(), Err(ShieldError::InvalidConfig { .. })));

        let over_threshold = ShieldConfig { liquidation_threshold_bps: 10_001, ..Default::default() };
        assert!(over_threshold.validate().is_err());

        let low_min = ShieldConfig { min_health_factor: WAD - 1, ..Default::default() };
        assert!(low_min.validate().is_err());

        let low_critical = ShieldConfig { critical_health_factor: WAD / 2, ..Default::default() };
        assert!(low_critical.validate().is_err());
    }

    #[test]
    fn test_borsh_roundtrip_keeps_fields() {
        let config = ShieldConfig { max_price_age_blocks: 12, ..Default::default() };
        let bytes = borsh::to_vec(&config).unwrap();
        let decoded: ShieldConfig = borsh::from_slice(&bytes).unwrap();
        assert_eq!(decoded, config);
    }
}

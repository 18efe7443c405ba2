//! Error Types for CDP Shield
//!
//! One variant per revert reason. `Display` yields the exact revert string a
//! caller would see, `code()` a stable identifier for logs.

use thiserror::Error;

use crate::types::{Address, PositionId};

/// Result type alias for CDP Shield operations
pub type ShieldResult<T> = Result<T, ShieldError>;

/// Main error enum for all CDP Shield errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShieldError {
    // ============ Position Errors ============
    /// Collateral amount is zero
    #[error("Invalid collateral amount")]
    InvalidCollateralAmount,

    /// Debt amount is zero
    #[error("Invalid debt amount")]
    InvalidDebtAmount,

    /// Health factor below the registration floor
    #[error("Health factor too low")]
    HealthFactorTooLow { health_factor: u128, minimum: u128 },

    /// Caller does not own the position
    #[error("Not position owner")]
    NotPositionOwner { position_id: PositionId, caller: Address },

    /// Repayment larger than outstanding debt
    #[error("Exceeds debt amount")]
    ExceedsDebtAmount { requested: u128, outstanding: u128 },

    /// Swap input larger than the position's collateral
    #[error("Exceeds collateral amount")]
    ExceedsCollateralAmount { requested: u128, available: u128 },

    /// No position with the given id
    #[error("Position does not exist")]
    PositionNotFound { position_id: PositionId },

    /// Position was closed
    #[error("Position not active")]
    PositionNotActive { position_id: PositionId },

    /// Leverage reduction did not improve the health factor
    #[error("Health factor not improved")]
    HealthFactorNotImproved { before: u128, after: u128 },

    /// Emergency close requested on a healthy position
    #[error("Health factor not critical")]
    HealthFactorNotCritical { health_factor: u128, critical: u128 },

    /// Target health factor cannot be reached by deleveraging
    #[error("Target health factor unreachable")]
    UnreachableHealthFactor { target: u128 },

    /// Swap does not sell the position's collateral for its debt token
    #[error("Invalid swap tokens")]
    InvalidSwapTokens,

    /// Swap input is zero
    #[error("Invalid swap amount")]
    InvalidSwapAmount,

    // ============ Configuration Errors ============
    /// Flash operations need a lending pool
    #[error("Aave Pool not set")]
    AavePoolNotSet,

    /// Flash operations need a receiver
    #[error("Flash loan receiver not set")]
    FlashLoanReceiverNotSet,

    /// Zero address supplied
    #[error("Invalid address")]
    InvalidAddress,

    /// A dependency other than the configured one was supplied
    #[error("Unexpected venue")]
    VenueMismatch { expected: Address, actual: Address },

    /// Configuration parameter out of range
    #[error("Invalid config: {param} {reason}")]
    InvalidConfig { param: &'static str, reason: &'static str },

    // ============ Ownership / Pause Errors ============
    /// Caller is not the owner
    #[error("OwnableUnauthorizedAccount")]
    OwnableUnauthorizedAccount { account: Address },

    /// New owner is the zero address
    #[error("OwnableInvalidOwner")]
    OwnableInvalidOwner { owner: Address },

    /// Operation blocked while paused
    #[error("EnforcedPause")]
    EnforcedPause,

    /// Unpause requested while not paused
    #[error("ExpectedPause")]
    ExpectedPause,

    // ============ Flash Loan Errors ============
    /// Zero shield address given to the receiver
    #[error("InvalidCDPShield")]
    InvalidCdpShield,

    /// Zero DEX address given to the receiver
    #[error("InvalidDEXAggregator")]
    InvalidDexAggregator,

    /// Callback not invoked by the configured pool
    #[error("Invalid flash loan caller")]
    InvalidFlashLoanCaller { caller: Address },

    /// Flash loan not initiated by the configured shield
    #[error("Invalid flash loan initiator")]
    InvalidFlashLoanInitiator { initiator: Address },

    /// Receiver cannot cover principal plus premium
    #[error("Insufficient funds to repay flash loan")]
    InsufficientRepayment { available: u128, required: u128 },

    /// Receiver returned false from its callback
    #[error("Invalid flash loan executor return")]
    InvalidFlashLoanExecutorReturn,

    /// Flash loan params could not be decoded or do not match the loan
    #[error("Invalid flash loan params")]
    InvalidFlashLoanParams,

    /// Pool lacks the requested liquidity
    #[error("Insufficient liquidity")]
    InsufficientLiquidity { available: u128, requested: u128 },

    // ============ DEX Errors ============
    /// Token not on the DEX allow-list
    #[error("Token not allowed")]
    TokenNotAllowed { token: Address },

    /// No rate configured for the pair
    #[error("Exchange rate not set")]
    ExchangeRateNotSet { token_in: Address, token_out: Address },

    /// Swap output below the caller's floor
    #[error("Insufficient output amount")]
    InsufficientOutputAmount { amount_out: u128, min_amount_out: u128 },

    /// Zero amount not allowed
    #[error("Zero amount")]
    ZeroAmount,

    // ============ Oracle Errors ============
    /// No price recorded for the token
    #[error("Price not available")]
    PriceNotAvailable { token: Address },

    /// Price older than the oracle's maximum age
    #[error("Price is stale")]
    StalePrice { token: Address, updated_at: u64, current_block: u64 },

    /// Zero price submitted
    #[error("Invalid price")]
    InvalidPrice,

    // ============ Ledger Errors ============
    /// Holder balance too small
    #[error("Insufficient balance")]
    InsufficientBalance { available: u128, requested: u128 },

    /// Spender allowance too small
    #[error("Insufficient allowance")]
    InsufficientAllowance { available: u128, requested: u128 },

    /// Token was never created on the ledger
    #[error("Unknown token")]
    UnknownToken { token: Address },

    // ============ Math Errors ============
    /// Arithmetic overflow occurred
    #[error("Arithmetic overflow")]
    Overflow,

    /// Arithmetic underflow occurred
    #[error("Arithmetic underflow")]
    Underflow,

    /// Division by zero
    #[error("Division by zero")]
    DivisionByZero,
}

impl ShieldError {
    /// Returns a stable error code for logging/debugging
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCollateralAmount => "E001_INVALID_COLLATERAL",
            Self::InvalidDebtAmount => "E002_INVALID_DEBT",
            Self::HealthFactorTooLow { .. } => "E003_HF_TOO_LOW",
            Self::NotPositionOwner { .. } => "E004_NOT_OWNER",
            Self::ExceedsDebtAmount { .. } => "E005_EXCEEDS_DEBT",
            Self::ExceedsCollateralAmount { .. } => "E006_EXCEEDS_COLLATERAL",
            Self::PositionNotFound { .. } => "E007_POSITION_NOT_FOUND",
            Self::PositionNotActive { .. } => "E008_POSITION_INACTIVE",
            Self::HealthFactorNotImproved { .. } => "E009_HF_NOT_IMPROVED",
            Self::HealthFactorNotCritical { .. } => "E010_HF_NOT_CRITICAL",
            Self::UnreachableHealthFactor { .. } => "E011_HF_UNREACHABLE",
            Self::InvalidSwapTokens => "E012_INVALID_SWAP_TOKENS",
            Self::InvalidSwapAmount => "E013_INVALID_SWAP_AMOUNT",
            Self::AavePoolNotSet => "E020_POOL_NOT_SET",
            Self::FlashLoanReceiverNotSet => "E021_RECEIVER_NOT_SET",
            Self::InvalidAddress => "E022_INVALID_ADDRESS",
            Self::VenueMismatch { .. } => "E023_VENUE_MISMATCH",
            Self::InvalidConfig { .. } => "E024_INVALID_CONFIG",
            Self::OwnableUnauthorizedAccount { .. } => "E030_UNAUTHORIZED",
            Self::OwnableInvalidOwner { .. } => "E031_INVALID_OWNER",
            Self::EnforcedPause => "E032_PAUSED",
            Self::ExpectedPause => "E033_NOT_PAUSED",
            Self::InvalidCdpShield => "E040_INVALID_SHIELD",
            Self::InvalidDexAggregator => "E041_INVALID_DEX",
            Self::InvalidFlashLoanCaller { .. } => "E042_FLASH_CALLER",
            Self::InvalidFlashLoanInitiator { .. } => "E043_FLASH_INITIATOR",
            Self::InsufficientRepayment { .. } => "E044_FLASH_UNDERFUNDED",
            Self::InvalidFlashLoanExecutorReturn => "E045_FLASH_EXECUTOR",
            Self::InvalidFlashLoanParams => "E046_FLASH_PARAMS",
            Self::InsufficientLiquidity { .. } => "E047_NO_LIQUIDITY",
            Self::TokenNotAllowed { .. } => "E050_TOKEN_NOT_ALLOWED",
            Self::ExchangeRateNotSet { .. } => "E051_NO_RATE",
            Self::InsufficientOutputAmount { .. } => "E052_SLIPPAGE",
            Self::ZeroAmount => "E053_ZERO_AMOUNT",
            Self::PriceNotAvailable { .. } => "E060_NO_PRICE",
            Self::StalePrice { .. } => "E061_STALE_PRICE",
            Self::InvalidPrice => "E062_INVALID_PRICE",
            Self::InsufficientBalance { .. } => "E070_INSUFFICIENT_BALANCE",
            Self::InsufficientAllowance { .. } => "E071_INSUFFICIENT_ALLOWANCE",
            Self::UnknownToken { .. } => "E072_UNKNOWN_TOKEN",
            Self::Overflow => "E080_OVERFLOW",
            Self::Underflow => "E081_UNDERFLOW",
            Self::DivisionByZero => "E082_DIV_ZERO",
        }
    }

    /// Returns true if the caller can fix the condition and retry
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::HealthFactorTooLow { .. }
                | Self::InsufficientBalance { .. }
                | Self::InsufficientAllowance { .. }
                | Self::InsufficientOutputAmount { .. }
                | Self::StalePrice { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_error_codes_unique() {
        let errors = [
            ShieldError::InvalidCollateralAmount,
            ShieldError::InvalidDebtAmount,
            ShieldError::HealthFactorTooLow { health_factor: 1, minimum: 2 },
            ShieldError::EnforcedPause,
            ShieldError::AavePoolNotSet,
            ShieldError::Overflow,
        ];

        let codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        let unique: BTreeSet<_> = codes.iter().collect();
        assert_eq!(codes.len(), unique.len(), "Error codes must be unique");
    }

    #[test]
    fn test_position_error_codes_in_order() {
        assert_eq!(ShieldError::HealthFactorNotCritical { health_factor: 2, critical: 1 }.code(), "E010_HF_NOT_CRITICAL");
        assert_eq!(ShieldError::UnreachableHealthFactor { target: 1 }.code(), "E011_HF_UNREACHABLE");
        assert_eq!(ShieldError::InvalidSwapTokens.code(), "E012_INVALID_SWAP_TOKENS");
        assert_eq!(ShieldError::InvalidSwapAmount.code(), "E013_INVALID_SWAP_AMOUNT");
    }

    #[test]
    fn test_recoverable_errors() {
        // Caller can fix these and retry
        assert!(ShieldError::HealthFactorTooLow { health_factor: 1, minimum: 2 }.is_recoverable());
        assert!(ShieldError::InsufficientAllowance { available: 0, requested: 1 }.is_recoverable());
        assert!(ShieldError::InsufficientOutputAmount { amount_out: 1, min_amount_out: 2 }.is_recoverable());
        assert!(ShieldError::StalePrice { token: [1u8; 20], updated_at: 0, current_block: 10 }.is_recoverable());

        // Permanent for the given call
        assert!(!ShieldError::NotPositionOwner { position_id: 1, caller: [9u8; 20] }.is_recoverable());
        assert!(!ShieldError::EnforcedPause.is_recoverable());
        assert!(!ShieldError::Overflow.is_recoverable());
    }

    #[test]
    fn test_revert_strings() {
        assert_eq!(ShieldError::InvalidCollateralAmount.to_string(), "Invalid collateral amount");
        assert_eq!(
            ShieldError::NotPositionOwner { position_id: 1, caller: [9u8; 20] }.to_string(),
            "Not position owner"
        );
        assert_eq!(
            ShieldError::ExceedsDebtAmount { requested: 2, outstanding: 1 }.to_string(),
            "Exceeds debt amount"
        );
        assert_eq!(ShieldError::AavePoolNotSet.to_string(), "Aave Pool not set");
        assert_eq!(ShieldError::FlashLoanReceiverNotSet.to_string(), "Flash loan receiver not set");
        assert_eq!(
            ShieldError::HealthFactorNotCritical { health_factor: 2, critical: 1 }.to_string(),
            "Health factor not critical"
        );
    }
}

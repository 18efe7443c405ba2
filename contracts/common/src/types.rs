//! Core Types for CDP Shield
//!
//! This module defines the fundamental data structures shared by the
//! shield, the flash-loan receiver and the venues they talk to.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{ShieldError, ShieldResult};

/// Type alias for account and contract addresses (20 bytes)
pub type Address = [u8; 20];

/// Type alias for position identifiers (sequential, starting at 1)
pub type PositionId = u64;

/// The zero address, never a valid owner or venue
pub const ZERO_ADDRESS: Address = [0u8; 20];

/// Returns true for the zero address
pub fn is_zero_address(address: &Address) -> bool {
    *address == ZERO_ADDRESS
}

/// Derive a contract/token address from its creator and a nonce.
///
/// address = sha256(creator || nonce_be)[12..32]
pub fn derive_address(creator: &Address, nonce: u64) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(creator);
    hasher.update(nonce.to_be_bytes());
    let digest = hasher.finalize();

    let mut address = ZERO_ADDRESS;
    address.copy_from_slice(&digest[12..32]);
    address
}

/// Hex representation with `0x` prefix, for logs
pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}

// ============ Call Context ============

/// Who is calling and when
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    /// Transaction sender (or calling contract)
    pub caller: Address,
    /// Block height of the enclosing transaction
    pub block_height: u64,
}

impl CallContext {
    pub fn new(caller: Address, block_height: u64) -> Self {
        Self { caller, block_height }
    }

    /// Same block, different caller (contract-to-contract call)
    pub fn as_contract(&self, contract: Address) -> Self {
        Self { caller: contract, block_height: self.block_height }
    }
}

// ============ Position Types ============

/// Status of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum PositionStatus {
    /// Position is tracked and can be modified
    #[default]
    Active,
    /// Position was closed; kept for history
    Closed,
}

/// A registered collateralized debt position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Position {
    /// Sequential identifier
    pub id: PositionId,
    /// Owner address
    pub owner: Address,
    /// Token locked as collateral
    pub collateral_token: Address,
    /// Token borrowed
    pub debt_token: Address,
    /// Collateral amount (18 decimals)
    pub collateral_amount: u128,
    /// Debt amount (18 decimals)
    pub debt_amount: u128,
    /// Health factor at last write (WAD)
    pub health_factor: u128,
    /// Current status
    pub status: PositionStatus,
    /// Block height when registered
    pub created_at: u64,
    /// Block height of the last modification
    pub last_updated: u64,
}

impl Position {
    /// Creates a new active position
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: PositionId,
        owner: Address,
        collateral_token: Address,
        debt_token: Address,
        collateral_amount: u128,
        debt_amount: u128,
        health_factor: u128,
        block_height: u64,
    ) -> Self {
        Self {
            id,
            owner,
            collateral_token,
            debt_token,
            collateral_amount,
            debt_amount,
            health_factor,
            status: PositionStatus::Active,
            created_at: block_height,
            last_updated: block_height,
        }
    }

    /// Returns true if position is active
    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }

    /// Returns true if `account` owns the position
    pub fn is_owned_by(&self, account: &Address) -> bool {
        self.owner == *account
    }
}

// ============ Swap Types ============

/// DEX swap description (ephemeral, never persisted)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct SwapParams {
    /// Token sold
    pub token_in: Address,
    /// Token bought
    pub token_out: Address,
    /// Amount of `token_in` sold
    pub amount_in: u128,
    /// Minimum acceptable amount of `token_out`
    pub min_amount_out: u128,
}

impl SwapParams {
    pub fn new(token_in: Address, token_out: Address, amount_in: u128, min_amount_out: u128) -> Self {
        Self { token_in, token_out, amount_in, min_amount_out }
    }
}

// ============ Flash Loan Types ============

/// What the shield does with flash-borrowed funds
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum FlashAction {
    /// Repay part of the debt, sell collateral to cover the loan
    ReduceLeverage { min_amount_out: u128 },
    /// Repay the whole debt, sell collateral, close the position
    EmergencyClose { min_amount_out: u128 },
}

/// Opaque `params` payload carried through a flash loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct FlashLoanParams {
    /// Position being deleveraged
    pub position_id: PositionId,
    /// Position owner (collateral is pulled from here)
    pub owner: Address,
    /// Settlement to perform
    pub action: FlashAction,
}

impl FlashLoanParams {
    /// Encode for the lending pool
    pub fn encode(&self) -> ShieldResult<Vec<u8>> {
        borsh::to_vec(self).map_err(|_| ShieldError::InvalidFlashLoanParams)
    }

    /// Decode from the lending pool callback
    pub fn decode(bytes: &[u8]) -> ShieldResult<Self> {
        borsh::from_slice(bytes).map_err(|_| ShieldError::InvalidFlashLoanParams)
    }
}

/// Arguments of a flash-loan callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashLoanCall {
    /// Pool that lent the funds
    pub lender: Address,
    /// Borrowed token
    pub asset: Address,
    /// Borrowed amount
    pub amount: u128,
    /// Fee owed on top of `amount`
    pub premium: u128,
    /// Account that requested the loan
    pub initiator: Address,
    /// Opaque payload
    pub params: Vec<u8>,
    /// Block height of the enclosing transaction
    pub block_height: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_address_deterministic() {
        let creator = [7u8; 20];
        assert_eq!(derive_address(&creator, 1), derive_address(&creator, 1));
        assert_ne!(derive_address(&creator, 1), derive_address(&creator, 2));
        assert!(!is_zero_address(&derive_address(&creator, 0)));
    }

    #[test]
    fn test_format_address() {
        let mut address = ZERO_ADDRESS;
        address[19] = 0xab;
        assert_eq!(format_address(&address), "0x00000000000000000000000000000000000000ab");
    }

    #[test]
    fn test_flash_params_decode_rejects_garbage() {
        let params = FlashLoanParams {
            position_id: 3,
            owner: [1u8; 20],
            action: FlashAction::EmergencyClose { min_amount_out: 42 },
        };
        let bytes = params.encode().unwrap();
        assert_eq!(FlashLoanParams::decode(&bytes).unwrap(), params);

        assert_eq!(
            FlashLoanParams::decode(&bytes[..5]),
            Err(ShieldError::InvalidFlashLoanParams)
        );
    }

    #[test]
    fn test_position_ownership() {
        let position = Position::new(1, [1u8; 20], [2u8; 20], [3u8; 20], 10, 5, 2, 100);
        assert!(position.is_active());
        assert!(position.is_owned_by(&[1u8; 20]));
        assert!(!position.is_owned_by(&[2u8; 20]));
    }
}

//! Protocol Events for CDP Shield
//!
//! Events are emitted during contract execution and can be indexed
//! off-chain for building dashboards, alerts and audit trails.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::types::{Address, PositionId};

/// Event types for indexing and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Position Events (0x01 - 0x1F)
    PositionRegistered = 0x01,
    PositionUpdated = 0x02,
    LeverageReduced = 0x03,
    FlashLeverageReduced = 0x04,
    PositionEmergencyClosed = 0x05,

    // Token Events (0x20 - 0x3F)
    TokenCreated = 0x20,
    Transfer = 0x21,
    Approval = 0x22,

    // Oracle Events (0x40 - 0x5F)
    PriceUpdated = 0x40,

    // DEX Events (0x60 - 0x7F)
    Swapped = 0x60,
    ExchangeRateSet = 0x61,
    TokenAllowanceChanged = 0x62,

    // Lending Pool Events (0x80 - 0x9F)
    Deposited = 0x80,
    FlashLoan = 0x81,
    FlashLoanExecuted = 0x82,
    EmergencyWithdrawal = 0x83,

    // Admin Events (0xA0 - 0xBF)
    Paused = 0xA0,
    Unpaused = 0xA1,
    OwnershipTransferred = 0xA2,
    AavePoolSet = 0xA3,
    FlashLoanReceiverSet = 0xA4,
    CdpShieldSet = 0xA5,
    DexAggregatorSet = 0xA6,
}

/// Main event enum containing all possible protocol events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum ShieldEvent {
    // ============ Position Events ============

    /// Emitted when a position is registered
    PositionRegistered {
        position_id: PositionId,
        owner: Address,
        collateral_token: Address,
        debt_token: Address,
        collateral_amount: u128,
        debt_amount: u128,
        health_factor: u128,
        block_height: u64,
    },

    /// Emitted when the owner restates a position's amounts
    PositionUpdated {
        position_id: PositionId,
        collateral_amount: u128,
        debt_amount: u128,
        health_factor: u128,
        block_height: u64,
    },

    /// Emitted after a swap-funded repayment
    LeverageReduced {
        position_id: PositionId,
        collateral_sold: u128,
        debt_repaid: u128,
        new_health_factor: u128,
        block_height: u64,
    },

    /// Emitted after a flash-loan-funded repayment
    FlashLeverageReduced {
        position_id: PositionId,
        flash_amount: u128,
        premium: u128,
        collateral_sold: u128,
        new_health_factor: u128,
        block_height: u64,
    },

    /// Emitted when a critical position is unwound and closed
    PositionEmergencyClosed {
        position_id: PositionId,
        owner: Address,
        debt_repaid: u128,
        collateral_sold: u128,
        collateral_returned: u128,
        block_height: u64,
    },

    // ============ Token Events ============

    /// Emitted when a token is created on the ledger
    TokenCreated {
        token: Address,
        symbol: String,
        block_height: u64,
    },

    /// Emitted on every balance movement (mint has `from == ZERO_ADDRESS`)
    Transfer {
        token: Address,
        from: Address,
        to: Address,
        amount: u128,
        block_height: u64,
    },

    /// Emitted when an allowance is set
    Approval {
        token: Address,
        owner: Address,
        spender: Address,
        amount: u128,
        block_height: u64,
    },

    // ============ Oracle Events ============

    /// Emitted when a token price is set
    PriceUpdated {
        token: Address,
        price: u128,
        block_height: u64,
    },

    // ============ DEX Events ============

    /// Emitted on every swap
    Swapped {
        trader: Address,
        token_in: Address,
        token_out: Address,
        amount_in: u128,
        amount_out: u128,
        block_height: u64,
    },

    /// Emitted when a pair rate is configured
    ExchangeRateSet {
        token_in: Address,
        token_out: Address,
        rate: u128,
        block_height: u64,
    },

    /// Emitted when a token joins or leaves the allow-list
    TokenAllowanceChanged {
        token: Address,
        allowed: bool,
        block_height: u64,
    },

    // ============ Lending Pool Events ============

    /// Emitted when liquidity is supplied
    Deposited {
        asset: Address,
        from: Address,
        amount: u128,
        block_height: u64,
    },

    /// Emitted by the pool once a flash loan is repaid
    FlashLoan {
        receiver: Address,
        initiator: Address,
        asset: Address,
        amount: u128,
        premium: u128,
        block_height: u64,
    },

    /// Emitted by the receiver after a successful callback
    FlashLoanExecuted {
        asset: Address,
        amount: u128,
        premium: u128,
        initiator: Address,
        block_height: u64,
    },

    /// Emitted when stranded funds are swept to the owner
    EmergencyWithdrawal {
        token: Address,
        to: Address,
        amount: u128,
        block_height: u64,
    },

    // ============ Admin Events ============

    /// Emitted when a contract is paused
    Paused {
        account: Address,
        block_height: u64,
    },

    /// Emitted when a contract is unpaused
    Unpaused {
        account: Address,
        block_height: u64,
    },

    /// Emitted when ownership changes hands
    OwnershipTransferred {
        previous_owner: Address,
        new_owner: Address,
        block_height: u64,
    },

    /// Emitted when the shield's lending pool is set
    AavePoolSet {
        pool: Address,
        block_height: u64,
    },

    /// Emitted when the shield's flash loan receiver is set
    FlashLoanReceiverSet {
        receiver: Address,
        block_height: u64,
    },

    /// Emitted when the receiver's shield is set
    CdpShieldSet {
        shield: Address,
        block_height: u64,
    },

    /// Emitted when the receiver's DEX is set
    DexAggregatorSet {
        dex: Address,
        block_height: u64,
    },
}

impl ShieldEvent {
    /// Get the event type for filtering
    pub fn event_type(&self) -> EventType {
        match self {
            Self::PositionRegistered { .. } => EventType::PositionRegistered,
            Self::PositionUpdated { .. } => EventType::PositionUpdated,
            Self::LeverageReduced { .. } => EventType::LeverageReduced,
            Self::FlashLeverageReduced { .. } => EventType::FlashLeverageReduced,
            Self::PositionEmergencyClosed { .. } => EventType::PositionEmergencyClosed,
            Self::TokenCreated { .. } => EventType::TokenCreated,
            Self::Transfer { .. } => EventType::Transfer,
            Self::Approval { .. } => EventType::Approval,
            Self::PriceUpdated { .. } => EventType::PriceUpdated,
            Self::Swapped { .. } => EventType::Swapped,
            Self::ExchangeRateSet { .. } => EventType::ExchangeRateSet,
            Self::TokenAllowanceChanged { .. } => EventType::TokenAllowanceChanged,
            Self::Deposited { .. } => EventType::Deposited,
            Self::FlashLoan { .. } => EventType::FlashLoan,
            Self::FlashLoanExecuted { .. } => EventType::FlashLoanExecuted,
            Self::EmergencyWithdrawal { .. } => EventType::EmergencyWithdrawal,
            Self::Paused { .. } => EventType::Paused,
            Self::Unpaused { .. } => EventType::Unpaused,
            Self::OwnershipTransferred { .. } => EventType::OwnershipTransferred,
            Self::AavePoolSet { .. } => EventType::AavePoolSet,
            Self::FlashLoanReceiverSet { .. } => EventType::FlashLoanReceiverSet,
            Self::CdpShieldSet { .. } => EventType::CdpShieldSet,
            Self::DexAggregatorSet { .. } => EventType::DexAggregatorSet,
        }
    }

    /// Get block height when event occurred
    pub fn block_height(&self) -> u64 {
        match self {
            Self::PositionRegistered { block_height, .. }
            | Self::PositionUpdated { block_height, .. }
            | Self::LeverageReduced { block_height, .. }
            | Self::FlashLeverageReduced { block_height, .. }
            | Self::PositionEmergencyClosed { block_height, .. }
            | Self::TokenCreated { block_height, .. }
            | Self::Transfer { block_height, .. }
            | Self::Approval { block_height, .. }
            | Self::PriceUpdated { block_height, .. }
            | Self::Swapped { block_height, .. }
            | Self::ExchangeRateSet { block_height, .. }
            | Self::TokenAllowanceChanged { block_height, .. }
            | Self::Deposited { block_height, .. }
            | Self::FlashLoan { block_height, .. }
            | Self::FlashLoanExecuted { block_height, .. }
            | Self::EmergencyWithdrawal { block_height, .. }
            | Self::Paused { block_height, .. }
            | Self::Unpaused { block_height, .. }
            | Self::OwnershipTransferred { block_height, .. }
            | Self::AavePoolSet { block_height, .. }
            | Self::FlashLoanReceiverSet { block_height, .. }
            | Self::CdpShieldSet { block_height, .. }
            | Self::DexAggregatorSet { block_height, .. } => *block_height,
        }
    }

    /// Serialize event to bytes for storage/transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Deserialize event from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

/// Event log for collecting events emitted by one contract
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<ShieldEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Emit an event (add to log)
    pub fn emit(&mut self, event: ShieldEvent) {
        log::trace!("event {:?} at block {}", event.event_type(), event.block_height());
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[ShieldEvent] {
        &self.events
    }

    /// Most recent event, if any
    pub fn last(&self) -> Option<&ShieldEvent> {
        self.events.last()
    }

    /// Filter events by type
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&ShieldEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Check if any events were emitted
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Get number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type() {
        let event = ShieldEvent::PositionRegistered {
            position_id: 1,
            owner: [2u8; 20],
            collateral_token: [3u8; 20],
            debt_token: [4u8; 20],
            collateral_amount: 10,
            debt_amount: 5,
            health_factor: 2,
            block_height: 100,
        };

        assert_eq!(event.event_type(), EventType::PositionRegistered);
        assert_eq!(event.block_height(), 100);
    }

    #[test]
    fn test_event_serialization() {
        let event = ShieldEvent::FlashLoan {
            receiver: [1u8; 20],
            initiator: [2u8; 20],
            asset: [3u8; 20],
            amount: 2_000,
            premium: 1,
            block_height: 200,
        };

        let bytes = event.to_bytes();
        let restored = ShieldEvent::from_bytes(&bytes).unwrap();
        assert_eq!(event, restored);
        assert!(ShieldEvent::from_bytes(&[0xff, 0x00]).is_none());
    }

    #[test]
    fn test_event_log() {
        let mut log = EventLog::new();
        assert!(log.is_empty());

        log.emit(ShieldEvent::Paused { account: [1u8; 20], block_height: 7 });
        log.emit(ShieldEvent::Unpaused { account: [1u8; 20], block_height: 8 });
        log.emit(ShieldEvent::Paused { account: [1u8; 20], block_height: 9 });

        assert_eq!(log.len(), 3);
        assert!(log.has_events());
        assert_eq!(log.filter_by_type(EventType::Paused).len(), 2);
        assert_eq!(log.last().map(|e| e.block_height()), Some(9));
    }
}

//! Access Control Module
//!
//! Single-owner authorization and a global pause switch, shared by every
//! CDP Shield contract.
//!
//! ## Key Features
//!
//! - **Ownable**: one owner per contract, transferable, never the zero address
//! - **Pausable**: owner-controlled switch that blocks state-changing entry points

use serde::{Deserialize, Serialize};

use crate::events::{EventLog, ShieldEvent};
use crate::types::{is_zero_address, Address, CallContext};
use crate::{ShieldError, ShieldResult};

// ============================================================================
// Types
// ============================================================================

/// Ownership state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownable {
    owner: Address,
}

impl Ownable {
    /// Create ownership state; the zero address is rejected
    pub fn new(owner: Address) -> ShieldResult<Self> {
        if is_zero_address(&owner) {
            return Err(ShieldError::OwnableInvalidOwner { owner });
        }
        Ok(Self { owner })
    }

    /// Current owner
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Fails with `OwnableUnauthorizedAccount` unless `account` is the owner
    pub fn only_owner(&self, account: &Address) -> ShieldResult<()> {
        if *account != self.owner {
            return Err(ShieldError::OwnableUnauthorizedAccount { account: *account });
        }
        Ok(())
    }

    /// Hand ownership to `new_owner`
    pub fn transfer_ownership(
        &mut self,
        ctx: &CallContext,
        new_owner: Address,
        events: &mut EventLog,
    ) -> ShieldResult<()> {
        self.only_owner(&ctx.caller)?;
        if is_zero_address(&new_owner) {
            return Err(ShieldError::OwnableInvalidOwner { owner: new_owner });
        }

        let previous_owner = self.owner;
        self.owner = new_owner;

        log::info!(
            "ownership transferred {} -> {}",
            crate::types::format_address(&previous_owner),
            crate::types::format_address(&new_owner)
        );
        events.emit(ShieldEvent::OwnershipTransferred {
            previous_owner,
            new_owner,
            block_height: ctx.block_height,
        });
        Ok(())
    }
}

/// Pause state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pausable {
    paused: bool,
}

impl Pausable {
    pub fn new() -> Self {
        Self { paused: false }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Guard for entry points that must not run while paused
    pub fn when_not_paused(&self) -> ShieldResult<()> {
        if self.paused {
            return Err(ShieldError::EnforcedPause);
        }
        Ok(())
    }

    /// Guard for entry points that only run while paused
    pub fn when_paused(&self) -> ShieldResult<()> {
        if !self.paused {
            return Err(ShieldError::ExpectedPause);
        }
        Ok(())
    }
}

// ============================================================================
// Core Access Control Functions
// ============================================================================

/// Pause a contract (owner only)
pub fn pause(
    ownable: &Ownable,
    pausable: &mut Pausable,
    ctx: &CallContext,
    events: &mut EventLog,
) -> ShieldResult<()> {
    ownable.only_owner(&ctx.caller)?;
    pausable.when_not_paused()?;

    pausable.paused = true;
    log::info!("paused by {}", crate::types::format_address(&ctx.caller));
    events.emit(ShieldEvent::Paused { account: ctx.caller, block_height: ctx.block_height });
    Ok(())
}

/// Unpause a contract (owner only)
pub fn unpause(
    ownable: &Ownable,
    pausable: &mut Pausable,
    ctx: &CallContext,
    events: &mut EventLog,
) -> ShieldResult<()> {
    ownable.only_owner(&ctx.caller)?;
    pausable.when_paused()?;

    pausable.paused = false;
    log::info!("unpaused by {}", crate::types::format_address(&ctx.caller));
    events.emit(ShieldEvent::Unpaused { account: ctx.caller, block_height: ctx.block_height });
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

//! Position Registry
//!
//! Append-only store of positions with a per-owner index. Ids are
//! sequential and start at 1; positions are never removed, only closed.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use cdp_shield_common::{
    errors::{ShieldError, ShieldResult},
    types::{Address, Position, PositionId},
};

/// All positions known to a shield
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PositionRegistry {
    positions: Vec<Position>,
    by_owner: BTreeMap<Address, Vec<PositionId>>,
}

impl PositionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next inserted position will receive
    pub fn next_id(&self) -> PositionId {
        self.positions.len() as PositionId + 1
    }

    /// Store a position under the next sequential id
    pub fn insert(&mut self, mut position: Position) -> PositionId {
        let id = self.next_id();
        position.id = id;

        self.by_owner.entry(position.owner).or_default().push(id);
        self.positions.push(position);
        id
    }

    pub fn get(&self, position_id: PositionId) -> ShieldResult<&Position> {
        Self::index(position_id)
            .and_then(|i| self.positions.get(i))
            .ok_or(ShieldError::PositionNotFound { position_id })
    }

    pub fn get_mut(&mut self, position_id: PositionId) -> ShieldResult<&mut Position> {
        Self::index(position_id)
            .and_then(|i| self.positions.get_mut(i))
            .ok_or(ShieldError::PositionNotFound { position_id })
    }

    /// Number of positions ever registered
    pub fn count(&self) -> u64 {
        self.positions.len() as u64
    }

    /// Ids owned by `owner`, in registration order
    pub fn ids_of(&self, owner: &Address) -> Vec<PositionId> {
        self.by_owner.get(owner).cloned().unwrap_or_default()
    }

    pub fn active(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter().filter(|p| p.is_active())
    }

    fn index(position_id: PositionId) -> Option<usize> {
        position_id.checked_sub(1).map(|i| i as usize)
    }
}

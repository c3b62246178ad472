//! Player slot assignment
//!
//! A session has a fixed number of identity slots. Each slot pairs a position
//! (which selects the spawn point of the current level) with a colour. A
//! joining player takes the lowest free slot, so a slot freed by a leaving
//! player is reused before any higher one.

use log::{debug, info};
use shared::{PlayerId, Rgb, MAX_PLAYERS};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

const SLOT_COLORS: [Rgb; MAX_PLAYERS] = [
    [0, 183, 235],
    [255, 0, 144],
    [255, 255, 0],
    [255, 255, 255],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerSlot {
    pub position: u32,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    #[error("cannot add {player}: all {capacity} slots are taken")]
    Capacity { player: PlayerId, capacity: usize },
}

pub struct SlotManager {
    slots: Vec<PlayerSlot>,
    assignments: HashMap<PlayerId, usize>,
}

impl SlotManager {
    /// Creates the standard four-slot roster.
    pub fn new() -> Self {
        Self::with_capacity(MAX_PLAYERS)
    }

    /// Creates a roster with `capacity` slots. Slot `n` always gets the same
    /// colour; colours repeat past the fourth slot.
    pub fn with_capacity(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|position| PlayerSlot {
                position: position as u32,
                color: SLOT_COLORS[position % SLOT_COLORS.len()],
            })
            .collect();

        Self {
            slots,
            assignments: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Assigns the lowest free slot to `player`.
    ///
    /// A player that already holds a slot keeps it.
    pub fn add_player(&mut self, player: PlayerId) -> Result<PlayerSlot, SlotError> {
        if let Some(index) = self.assignments.get(&player) {
            debug!("{} already holds slot {}", player, index);
            return Ok(self.slots[*index]);
        }

        let taken: BTreeSet<usize> = self.assignments.values().copied().collect();
        let index = (0..self.slots.len())
            .find(|index| !taken.contains(index))
            .ok_or(SlotError::Capacity {
                player,
                capacity: self.slots.len(),
            })?;

        self.assignments.insert(player, index);
        info!("{} assigned slot {}", player, index);
        Ok(self.slots[index])
    }

    /// Frees the slot held by `player`. Unknown players are ignored.
    pub fn remove_player(&mut self, player: PlayerId) -> Option<PlayerSlot> {
        let index = self.assignments.remove(&player)?;
        info!("{} released slot {}", player, index);
        Some(self.slots[index])
    }

    /// Rostered players, ordered by slot position.
    pub fn assigned_player_ids(&self) -> Vec<PlayerId> {
        let mut players: Vec<(usize, PlayerId)> = self
            .assignments
            .iter()
            .map(|(player, index)| (*index, *player))
            .collect();
        players.sort();
        players.into_iter().map(|(_, player)| player).collect()
    }

    pub fn slot_for(&self, player: PlayerId) -> Option<PlayerSlot> {
        self.assignments
            .get(&player)
            .map(|index| self.slots[*index])
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.assignments.len() >= self.slots.len()
    }
}

impl Default for SlotManager {
    fn default() -> Self {
        Self::new()
    }
}

//! Characters and items that fire can reach.
//!
//! The simulation only needs where they are and what can burn; health and
//! inventory live with the host.

use serde::{Deserialize, Serialize};

use super::Vec2;

/// A character standing somewhere in the vessel
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Character {
    pub position: Vec2,
    /// Limbs still attached; burn damage is split between them
    pub intact_limbs: u8,
}

impl Character {
    pub fn new(position: Vec2) -> Self {
        Self {
            position,
            intact_limbs: 15,
        }
    }

    pub fn with_limbs(mut self, limbs: u8) -> Self {
        self.intact_limbs = limbs;
        self
    }
}

/// A loose item with a condition meter
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FlammableItem {
    pub position: Vec2,
    /// 0 = destroyed, 100 = pristine
    pub condition: f32,
    pub flammable: bool,
}

impl FlammableItem {
    pub fn new(position: Vec2, flammable: bool) -> Self {
        Self {
            position,
            condition: 100.0,
            flammable,
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.condition <= 0.0
    }
}

//! Vessel layouts - authored compartments, walls, doors and occupants.
//!
//! Layouts are plain serde data, usually read from JSON, and are turned into
//! entities by [`crate::engine::SimulationEngine::load_layout`].

use hecs::Entity;
use serde::{Deserialize, Serialize};

use crate::components::{DoorState, Rect, Vec2, VesselId};
use crate::error::SimError;

fn full_gas() -> f32 {
    100.0
}

fn fully_open() -> f32 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompartmentDef {
    pub rect: Rect,
    #[serde(default)]
    pub water: f32,
    #[serde(default = "full_gas")]
    pub gas_percentage: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WallDef {
    pub rect: Rect,
    pub max_health: f32,
    #[serde(default)]
    pub min_health: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpeningDef {
    pub rect: Rect,
    /// Overrides the orientation guessed from the rect's aspect
    #[serde(default)]
    pub horizontal: Option<bool>,
    #[serde(default = "fully_open")]
    pub open: f32,
    #[serde(default)]
    pub door: Option<DoorState>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemDef {
    pub position: Vec2,
    #[serde(default)]
    pub flammable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FireDef {
    /// Index into `compartments`
    pub compartment: usize,
    pub position: Vec2,
}

/// Everything needed to build a vessel
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VesselLayout {
    pub name: String,
    pub vessel: VesselId,
    pub compartments: Vec<CompartmentDef>,
    pub walls: Vec<WallDef>,
    pub openings: Vec<OpeningDef>,
    pub characters: Vec<Vec2>,
    pub items: Vec<ItemDef>,
    pub fires: Vec<FireDef>,
}

impl VesselLayout {
    pub fn from_json_str(json: &str) -> Result<Self, SimError> {
        let layout: VesselLayout = serde_json::from_str(json)?;
        layout.validate()?;
        Ok(layout)
    }

    /// Reject geometry the simulation cannot represent
    pub fn validate(&self) -> Result<(), SimError> {
        let bad_rect = |r: &Rect| !r.is_finite() || r.width < 0.0 || r.height < 0.0;
        if self.compartments.iter().any(|c| bad_rect(&c.rect)) || self.walls.iter().any(|w| bad_rect(&w.rect)) {
            return Err(SimError::InvalidValue {
                what: "layout rects must be finite with non-negative size",
            });
        }
        if self.walls.iter().any(|w| !(w.max_health > 0.0) || w.min_health > w.max_health) {
            return Err(SimError::InvalidValue {
                what: "wall health must satisfy 0 <= min_health <= max_health, max_health > 0",
            });
        }
        if self.fires.iter().any(|f| f.compartment >= self.compartments.len()) {
            return Err(SimError::InvalidValue {
                what: "fire refers to a compartment that is not in the layout",
            });
        }
        Ok(())
    }
}

/// Entities created from a layout, in layout order
#[derive(Debug, Clone, Default)]
pub struct VesselHandles {
    pub name: String,
    pub compartments: Vec<Entity>,
    pub walls: Vec<Entity>,
    pub openings: Vec<Entity>,
    pub characters: Vec<Entity>,
    pub items: Vec<Entity>,
    pub fires: Vec<Entity>,
}

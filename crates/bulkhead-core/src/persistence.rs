//! Save/Load functionality for persisting simulation state
//!
//! Uses bincode for compact binary snapshots. Entities are stored as plain
//! records and referenced by position in their list, never by `hecs::Entity`.
//! Breaches are not stored: they are rebuilt by replaying wall damage.

use hecs::World;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use thiserror::Error;

use crate::components::*;
use crate::error::SimError;

/// Version number for save file format (increment when format changes)
pub const SAVE_VERSION: u32 = 1;

/// A fire, relative to its compartment's rect so it survives resizes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SavedFire {
    /// Bottom-left corner as a fraction of the compartment's width/height
    pub position: Vec2,
    /// Size as a fraction of the compartment's width/height
    pub size: Vec2,
}

impl SavedFire {
    pub fn capture(fire: &Combustion, bounds: Rect) -> Self {
        let fraction = |v: f32, extent: f32| if extent > 0.0 { v / extent } else { 0.0 };
        Self {
            position: Vec2::new(
                fraction(fire.position.x - bounds.left(), bounds.width),
                fraction(fire.position.y - bounds.bottom(), bounds.height),
            ),
            size: Vec2::new(fraction(fire.size.x, bounds.width), fraction(fire.size.y, bounds.height)),
        }
    }

    /// Absolute (position, size) inside `bounds`
    pub fn resolve(&self, bounds: Rect) -> (Vec2, Vec2) {
        (
            Vec2::new(
                bounds.left() + self.position.x * bounds.width,
                bounds.bottom() + self.position.y * bounds.height,
            ),
            Vec2::new(self.size.x * bounds.width, self.size.y * bounds.height),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedCompartment {
    pub rect: Rect,
    pub vessel: VesselId,
    pub water: f32,
    pub gas_percentage: f32,
    pub fires: Vec<SavedFire>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedWall {
    pub rect: Rect,
    pub vessel: VesselId,
    pub max_health: f32,
    pub min_health: f32,
    /// Per-section damage, in section order
    pub damage: Vec<f32>,
}

/// An authored (non-breach) opening
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedOpening {
    pub rect: Rect,
    pub vessel: VesselId,
    pub is_horizontal: bool,
    pub open: f32,
    pub door: Option<DoorState>,
}

/// Serializable snapshot of the simulation state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveData {
    /// Save format version
    pub version: u32,
    /// Simulated seconds since start
    pub sim_time: f64,
    pub tick: u64,
    pub compartments: Vec<SavedCompartment>,
    pub walls: Vec<SavedWall>,
    pub openings: Vec<SavedOpening>,
    pub characters: Vec<Character>,
    pub items: Vec<FlammableItem>,
}

impl SaveData {
    /// Snapshot a world. Lists are ordered by net id so equal worlds produce
    /// equal saves.
    pub fn capture(world: &World, sim_time: f64, tick: u64) -> Self {
        let mut compartments: Vec<(NetId, SavedCompartment)> = world
            .query::<&Compartment>()
            .iter()
            .map(|(_, c)| {
                let fires = c
                    .fires
                    .iter()
                    .filter_map(|&f| world.get::<&Combustion>(f).ok().map(|f| SavedFire::capture(&f, c.rect())))
                    .collect();
                (
                    c.net_id,
                    SavedCompartment {
                        rect: c.rect(),
                        vessel: c.vessel,
                        water: c.water(),
                        gas_percentage: c.gas_percentage(),
                        fires,
                    },
                )
            })
            .collect();
        compartments.sort_by_key(|(id, _)| *id);

        let mut walls: Vec<(NetId, SavedWall)> = world
            .query::<&StructuralWall>()
            .iter()
            .map(|(_, w)| {
                (
                    w.net_id,
                    SavedWall {
                        rect: w.rect(),
                        vessel: w.vessel,
                        max_health: w.max_health(),
                        min_health: w.min_health(),
                        damage: w.sections().iter().map(|s| s.damage()).collect(),
                    },
                )
            })
            .collect();
        walls.sort_by_key(|(id, _)| *id);

        let mut openings: Vec<(NetId, SavedOpening)> = world
            .query::<&Opening>()
            .iter()
            .filter(|(_, o)| o.wall.is_none())
            .map(|(_, o)| {
                (
                    o.net_id,
                    SavedOpening {
                        rect: o.rect(),
                        vessel: o.vessel,
                        is_horizontal: o.is_horizontal(),
                        open: o.open(),
                        door: o.door,
                    },
                )
            })
            .collect();
        openings.sort_by_key(|(id, _)| *id);

        Self {
            version: SAVE_VERSION,
            sim_time,
            tick,
            compartments: compartments.into_iter().map(|(_, c)| c).collect(),
            walls: walls.into_iter().map(|(_, w)| w).collect(),
            openings: openings.into_iter().map(|(_, o)| o).collect(),
            characters: world.query::<&Character>().iter().map(|(_, c)| *c).collect(),
            items: world.query::<&FlammableItem>().iter().map(|(_, i)| *i).collect(),
        }
    }
}

/// Save the simulation state to a writer
pub fn save_simulation<W: Write>(writer: W, world: &World, sim_time: f64, tick: u64) -> Result<(), SaveError> {
    let save_data = SaveData::capture(world, sim_time, tick);
    bincode::serialize_into(writer, &save_data)?;
    log::info!(
        "saved {} compartments, {} walls, {} openings",
        save_data.compartments.len(),
        save_data.walls.len(),
        save_data.openings.len()
    );
    Ok(())
}

/// Load and version-check a snapshot; rebuilding the world is up to the engine
pub fn load_simulation<R: Read>(reader: R) -> Result<SaveData, SaveError> {
    let save_data: SaveData = bincode::deserialize_from(reader)?;

    if save_data.version != SAVE_VERSION {
        return Err(SaveError::VersionMismatch {
            expected: SAVE_VERSION,
            found: save_data.version,
        });
    }
    Ok(save_data)
}

/// Errors that can occur during save/load
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Bincode(#[from] Box<bincode::ErrorKind>),

    #[error("Save version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("could not rebuild saved world: {0}")]
    Rebuild(#[from] SimError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn world_with_fire() -> World {
        let mut world = World::new();
        let mut room = Compartment::new(Rect::new(100.0, 200.0, 400.0, 100.0), VesselId(0), NetId(1));
        room.set_water(8_000.0);
        let room = world.spawn((room,));
        let fire = world.spawn((Combustion::new(room, Vec2::new(200.0, 100.0)),));
        world.get::<&mut Compartment>(room).unwrap().fires.push(fire);
        world.spawn((StructuralWall::new(Rect::new(84.0, 200.0, 16.0, 100.0), 100.0, VesselId(0), NetId(2)),));
        world
    }

    #[test]
    fn test_saved_fire_is_relative() {
        let bounds = Rect::new(100.0, 200.0, 400.0, 100.0);
        let fire = Combustion::new(hecs::World::new().spawn(()), Vec2::new(200.0, 150.0));
        let saved = SavedFire::capture(&fire, bounds);
        assert_eq!(saved.position, Vec2::new(0.25, 0.5));
        assert_eq!(saved.size, Vec2::new(0.025, 0.1));

        let (position, size) = saved.resolve(bounds);
        assert_eq!(position, fire.position);
        assert_abs_diff_eq!(size.x, fire.size.x, epsilon = 1e-4);
        assert_abs_diff_eq!(size.y, fire.size.y, epsilon = 1e-4);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let world = world_with_fire();

        let mut buffer = Vec::new();
        save_simulation(&mut buffer, &world, 12.5, 750).expect("Save failed");
        let loaded = load_simulation(&buffer[..]).expect("Load failed");

        assert_eq!(loaded.tick, 750);
        assert!((loaded.sim_time - 12.5).abs() < 1e-9);
        assert_eq!(loaded.compartments.len(), 1);
        assert_eq!(loaded.compartments[0].water, 8_000.0);
        assert_eq!(loaded.compartments[0].fires.len(), 1);
        assert_eq!(loaded.walls[0].damage, vec![0.0, 0.0]);
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut data = SaveData::capture(&World::new(), 0.0, 0);
        data.version = SAVE_VERSION + 1;
        let bytes = bincode::serialize(&data).unwrap();
        assert!(matches!(
            load_simulation(&bytes[..]),
            Err(SaveError::VersionMismatch { found, .. }) if found == SAVE_VERSION + 1
        ));
    }

    #[test]
    fn test_truncated_save_is_error() {
        let mut buffer = Vec::new();
        save_simulation(&mut buffer, &world_with_fire(), 0.0, 0).unwrap();
        buffer.truncate(buffer.len() / 2);
        assert!(load_simulation(&buffer[..]).is_err());
    }
}

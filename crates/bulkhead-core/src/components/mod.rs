//! Component definitions for the ECS simulation.
//!
//! Components are pure data structs attached to entities.
//! State rules (clamping, thresholds) live with the data; cross-entity
//! behaviour lives in systems.

mod combustion;
mod common;
mod compartment;
mod occupants;
mod opening;
mod wall;

pub use combustion::*;
pub use common::*;
pub use compartment::*;
pub use occupants::*;
pub use opening::*;
pub use wall::*;

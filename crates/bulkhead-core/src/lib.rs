//! Bulkhead Core - Compartment Flooding and Fire Simulation
//!
//! A 2D simulation of a vessel split into compartments: water and gas flow
//! through openings, damaged hull walls breach and flood, and fires grow,
//! consume gas, spread through doors and get put out.
//!
//! # Architecture
//!
//! The simulation uses an Entity Component System (ECS) architecture via `hecs`:
//! - **Entities**: Compartments, openings, structural walls, fires, occupants
//! - **Components**: Pure data attached to entities (Compartment, Opening, etc.)
//! - **Systems**: Logic that queries and updates components, in a fixed tick order
//!
//! Collisions and effects are delegated to the host through the
//! [`physics::PhysicsWorld`] and [`observer::SimObserver`] traits.
//!
//! # Example
//!
//! ```rust,no_run
//! use bulkhead_core::prelude::*;
//!
//! let mut engine = SimulationEngine::new();
//!
//! let room = engine.add_compartment(Rect::new(0.0, 192.0, 400.0, 192.0), VesselId(0)).unwrap();
//! let hull = engine.add_wall(Rect::new(-16.0, 192.0, 16.0, 192.0), 100.0, 0.0, VesselId(0)).unwrap();
//! engine.start_fire(room, Vec2::new(200.0, 0.0)).unwrap();
//! engine.queue_damage(hull, 1, 100.0).unwrap();
//!
//! // Run simulation
//! loop {
//!     engine.update(1.0 / 60.0).unwrap(); // 60 FPS
//! }
//! ```

pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod ids;
pub mod layout;
pub mod observer;
pub mod persistence;
pub mod physics;
pub mod replication;
pub mod systems;

/// Commonly used types for convenient importing
pub mod prelude {
    pub use crate::components::*;
    pub use crate::config::SimConfig;
    pub use crate::engine::SimulationEngine;
    pub use crate::error::SimError;
    pub use crate::layout::{VesselHandles, VesselLayout};
    pub use crate::observer::{EventLog, NullObserver, SimEvent, SimObserver};
    pub use crate::physics::{PhysicsWorld, StaticBodies};
}

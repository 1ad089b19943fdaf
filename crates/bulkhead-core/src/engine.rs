//! Simulation engine - main entry point for running the simulation

use std::collections::HashMap;
use std::io::{Read, Write};

use hecs::{Entity, World};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::components::*;
use crate::config::SimConfig;
use crate::error::SimError;
use crate::ids::IdAllocator;
use crate::layout::{OpeningDef, VesselHandles, VesselLayout};
use crate::observer::{NullObserver, SimObserver};
use crate::persistence::{self, SaveData, SaveError};
use crate::physics::{PhysicsWorld, StaticBodies};
use crate::replication::{self, CompartmentNetState};
use crate::systems::*;

/// Main simulation engine
pub struct SimulationEngine<P: PhysicsWorld = StaticBodies, O: SimObserver = NullObserver> {
    /// ECS world containing all entities
    pub world: World,
    pub config: SimConfig,
    /// Collider backend kept in sync with walls and exterior blockers
    pub physics: P,
    /// Receives breach, explosion and fire events
    pub observer: O,
    /// Simulated seconds since start
    pub sim_time: f64,
    /// Completed ticks; also feeds the flow order
    pub tick: u64,

    ids: IdAllocator,
    rng: ChaCha8Rng,
    vessel_positions: HashMap<VesselId, Vec2>,
    pending_damage: Vec<DamageRequest>,
    fire_spread_timer: f32,
}

impl SimulationEngine {
    /// Create a new empty simulation with default tunables
    pub fn new() -> Self {
        Self::with_config(SimConfig::default())
    }

    pub fn with_config(config: SimConfig) -> Self {
        Self::with_parts(config, StaticBodies::new(), NullObserver)
    }
}

impl Default for SimulationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PhysicsWorld, O: SimObserver> SimulationEngine<P, O> {
    /// Create an engine around a host's physics backend and observer
    pub fn with_parts(config: SimConfig, physics: P, observer: O) -> Self {
        Self {
            world: World::new(),
            ids: IdAllocator::new(config.max_entity_ids),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            fire_spread_timer: config.fire.spread_interval,
            config,
            physics,
            observer,
            sim_time: 0.0,
            tick: 0,
            vessel_positions: HashMap::new(),
            pending_damage: Vec::new(),
        }
    }

    fn breach_parts(&mut self) -> (&mut World, BreachContext<'_>) {
        (
            &mut self.world,
            BreachContext {
                thresholds: &self.config.breach,
                explosion: &self.config.explosion,
                ids: &mut self.ids,
                physics: &mut self.physics,
                observer: &mut self.observer,
            },
        )
    }

    /// Advance the simulation by `dt` seconds.
    ///
    /// Only running out of entity ids is an error; everything else that goes
    /// wrong inside a tick is logged and skipped.
    pub fn update(&mut self, dt: f32) -> Result<(), SimError> {
        if !dt.is_finite() || dt <= 0.0 {
            log::warn!("ignoring update with dt = {}", dt);
            return Ok(());
        }

        // 1: wall damage, breaches, explosions, colliders
        let requests = std::mem::take(&mut self.pending_damage);
        if !requests.is_empty() {
            let (world, mut ctx) = self.breach_parts();
            apply_damage_queue(world, &mut ctx, requests)?;
        }

        // 2: topology
        prune_stale_links(&mut self.world);
        refresh_dirty_links(&mut self.world);

        // 3: gas and waves
        compartment_system(&mut self.world, dt, &self.config.gas);

        // 4: flow
        let flow = FlowContext {
            dt,
            gas: &self.config.gas,
            vessel_positions: &self.vessel_positions,
        };
        opening_flow_system(&mut self.world, &mut self.physics, &flow, self.config.seed, self.tick);

        // 5: fire
        let mut fire = FireContext {
            config: &self.config.fire,
            physics: &self.physics,
            observer: &mut self.observer,
        };
        fire_system(&mut self.world, &mut fire, &mut self.rng, &mut self.fire_spread_timer, dt);

        self.sim_time += dt as f64;
        self.tick += 1;
        Ok(())
    }

    /// Re-resolve every opening whose links are out of date
    pub fn refresh_topology(&mut self) -> usize {
        prune_stale_links(&mut self.world);
        refresh_dirty_links(&mut self.world)
    }

    /// World position of a moving vessel, for cross-vessel openings
    pub fn set_vessel_position(&mut self, vessel: VesselId, position: Vec2) {
        if position.is_finite() {
            self.vessel_positions.insert(vessel, position);
        } else {
            log::warn!("ignoring non-finite position for vessel {}", vessel.0);
        }
    }

    // Compartments

    pub fn add_compartment(&mut self, rect: Rect, vessel: VesselId) -> Result<Entity, SimError> {
        if !rect.is_finite() || rect.width < 0.0 || rect.height < 0.0 {
            return Err(SimError::InvalidValue { what: "compartment rect must be finite with non-negative size" });
        }
        let net_id = self.ids.allocate()?;
        let entity = self.world.spawn((Compartment::new(rect, vessel, net_id),));
        mark_all_links_dirty(&mut self.world);
        Ok(entity)
    }

    pub fn resize_compartment(&mut self, compartment: Entity, rect: Rect) -> Result<(), SimError> {
        let resized = self
            .world
            .get::<&mut Compartment>(compartment)
            .map_err(|_| SimError::UnknownEntity(compartment))?
            .resize(rect);
        if !resized {
            return Err(SimError::InvalidValue { what: "compartment rect must be finite with non-negative size" });
        }
        mark_all_links_dirty(&mut self.world);
        Ok(())
    }

    /// Remove a compartment and the fires inside it. Openings that linked to
    /// it are re-resolved on the next tick.
    pub fn remove_compartment(&mut self, compartment: Entity) -> Result<(), SimError> {
        let c = self
            .world
            .remove_one::<Compartment>(compartment)
            .map_err(|_| SimError::UnknownEntity(compartment))?;
        for &fire in &c.fires {
            if self.world.despawn(fire).is_ok() {
                self.observer.fire_extinguished(fire);
            }
        }
        self.ids.release(c.net_id);
        let _ = self.world.despawn(compartment);
        mark_all_links_dirty(&mut self.world);
        Ok(())
    }

    /// Set a compartment's water and gas directly, e.g. from a host script
    pub fn set_compartment_state(&mut self, compartment: Entity, water: f32, gas_percentage: f32) -> Result<(), SimError> {
        let mut c = self
            .world
            .get::<&mut Compartment>(compartment)
            .map_err(|_| SimError::UnknownEntity(compartment))?;
        if !c.set_water(water) || !c.set_gas_percentage(gas_percentage) {
            return Err(SimError::InvalidValue { what: "water and gas must be finite" });
        }
        c.reset_pressure();
        Ok(())
    }

    // Openings

    /// Add an authored, fully open opening
    pub fn add_opening(&mut self, rect: Rect, vessel: VesselId) -> Result<Entity, SimError> {
        self.add_opening_def(
            &OpeningDef {
                rect,
                horizontal: None,
                open: 1.0,
                door: None,
            },
            vessel,
        )
    }

    pub fn add_opening_def(&mut self, def: &OpeningDef, vessel: VesselId) -> Result<Entity, SimError> {
        if !def.rect.is_finite() || !def.open.is_finite() {
            return Err(SimError::InvalidValue { what: "opening rect and open must be finite" });
        }
        let net_id = self.ids.allocate()?;
        let horizontal = def.horizontal.unwrap_or(def.rect.width < def.rect.height);
        let mut opening = Opening::with_orientation(def.rect, horizontal, vessel, net_id).with_open(def.open);
        opening.door = def.door;
        let entity = self.world.spawn((opening,));
        refresh_links(&mut self.world, entity);
        Ok(entity)
    }

    pub fn set_opening_open(&mut self, opening: Entity, open: f32) -> Result<(), SimError> {
        let accepted = self
            .world
            .get::<&mut Opening>(opening)
            .map_err(|_| SimError::UnknownEntity(opening))?
            .set_open(open);
        if accepted {
            Ok(())
        } else {
            Err(SimError::InvalidValue { what: "open must be finite" })
        }
    }

    pub fn set_door(&mut self, opening: Entity, door: Option<DoorState>) -> Result<(), SimError> {
        self.world
            .get::<&mut Opening>(opening)
            .map_err(|_| SimError::UnknownEntity(opening))?
            .door = door;
        Ok(())
    }

    /// Move an opening; its links are re-resolved on the next tick
    pub fn move_opening(&mut self, opening: Entity, rect: Rect) -> Result<(), SimError> {
        let moved = self
            .world
            .get::<&mut Opening>(opening)
            .map_err(|_| SimError::UnknownEntity(opening))?
            .set_rect(rect);
        if moved {
            Ok(())
        } else {
            Err(SimError::InvalidValue { what: "opening rect must be finite" })
        }
    }

    /// Remove an authored opening. Breaches belong to their wall section and
    /// go away when the section is repaired.
    pub fn remove_opening(&mut self, opening: Entity) -> Result<(), SimError> {
        if self
            .world
            .get::<&Opening>(opening)
            .map_err(|_| SimError::UnknownEntity(opening))?
            .wall
            .is_some()
        {
            return Err(SimError::InvalidValue { what: "breaches are removed by repairing their wall section" });
        }
        let o = self
            .world
            .remove_one::<Opening>(opening)
            .map_err(|_| SimError::UnknownEntity(opening))?;
        for compartment in o.links.iter() {
            if let Ok(mut c) = self.world.get::<&mut Compartment>(compartment) {
                c.openings.retain(|&e| e != opening);
            }
        }
        if let Some(blocker) = o.exterior_blocker {
            self.physics.remove_body(blocker);
        }
        self.ids.release(o.net_id);
        let _ = self.world.despawn(opening);
        Ok(())
    }

    // Walls

    pub fn add_wall(&mut self, rect: Rect, max_health: f32, min_health: f32, vessel: VesselId) -> Result<Entity, SimError> {
        if !rect.is_finite() || rect.width < 0.0 || rect.height < 0.0 {
            return Err(SimError::InvalidValue { what: "wall rect must be finite with non-negative size" });
        }
        if !max_health.is_finite() || !min_health.is_finite() || max_health <= 0.0 {
            return Err(SimError::InvalidValue { what: "wall health must be finite and positive" });
        }
        let net_id = self.ids.allocate()?;
        let wall = StructuralWall::new(rect, max_health, vessel, net_id).with_min_health(min_health);
        let entity = self.world.spawn((wall,));
        rebuild_colliders(&mut self.world, &mut self.physics, entity);
        Ok(entity)
    }

    pub fn remove_wall(&mut self, wall: Entity) -> Result<(), SimError> {
        let (world, mut ctx) = self.breach_parts();
        remove_wall(world, &mut ctx, wall)
    }

    /// Set a section's damage and resolve the consequences right away
    pub fn set_section_damage(&mut self, wall: Entity, section: usize, damage: f32) -> Result<SectionUpdate, SimError> {
        let (world, mut ctx) = self.breach_parts();
        set_section_damage(world, &mut ctx, wall, section, damage)
    }

    pub fn add_section_damage(&mut self, wall: Entity, section: usize, amount: f32) -> Result<SectionUpdate, SimError> {
        let (world, mut ctx) = self.breach_parts();
        add_section_damage(world, &mut ctx, wall, section, amount)
    }

    /// Damage the section under a world point; `None` if the point misses
    pub fn damage_wall_at(&mut self, wall: Entity, point: Vec2, amount: f32) -> Result<Option<SectionUpdate>, SimError> {
        let (world, mut ctx) = self.breach_parts();
        damage_wall_at(world, &mut ctx, wall, point, amount)
    }

    /// Queue damage to be resolved at the start of the next update
    pub fn queue_damage(&mut self, wall: Entity, section: usize, amount: f32) -> Result<(), SimError> {
        let net_id = self
            .world
            .get::<&StructuralWall>(wall)
            .map_err(|_| SimError::UnknownEntity(wall))?
            .net_id;
        self.pending_damage.push(DamageRequest {
            wall: net_id,
            section,
            amount,
        });
        Ok(())
    }

    // Occupants and fire

    pub fn add_character(&mut self, position: Vec2) -> Entity {
        self.world.spawn((Character::new(position),))
    }

    pub fn add_item(&mut self, position: Vec2, flammable: bool) -> Entity {
        self.world.spawn((FlammableItem::new(position, flammable),))
    }

    pub fn start_fire(&mut self, compartment: Entity, position: Vec2) -> Result<Entity, SimError> {
        start_fire(&mut self.world, &mut self.observer, compartment, position)
    }

    pub fn extinguish(&mut self, fire: Entity, amount: f32) -> Result<f32, SimError> {
        extinguish(&mut self.world, &mut self.observer, fire, amount)
    }

    pub fn extinguish_fires_in(&mut self, compartment: Entity, dt: f32, amount: f32, position: Vec2) -> Result<f32, SimError> {
        extinguish_fires_in(&mut self.world, &mut self.observer, compartment, dt, amount, position)
    }

    // Queries

    pub fn compartment_count(&self) -> usize {
        self.world.query::<&Compartment>().iter().count()
    }

    pub fn opening_count(&self) -> usize {
        self.world.query::<&Opening>().iter().count()
    }

    /// Openings created by wall damage
    pub fn breach_count(&self) -> usize {
        self.world.query::<&Opening>().iter().filter(|(_, o)| o.wall.is_some()).count()
    }

    pub fn wall_count(&self) -> usize {
        self.world.query::<&StructuralWall>().iter().count()
    }

    pub fn fire_count(&self) -> usize {
        self.world.query::<&Combustion>().iter().count()
    }

    pub fn total_water(&self) -> f32 {
        self.world.query::<&Compartment>().iter().map(|(_, c)| c.water()).sum()
    }

    pub fn compartment_at(&self, point: Vec2) -> Option<Entity> {
        compartment_at(&self.world, point)
    }

    pub fn ids_in_use(&self) -> usize {
        self.ids.in_use()
    }

    // Layouts

    /// Build a vessel from an authored layout
    pub fn load_layout(&mut self, layout: &VesselLayout) -> Result<VesselHandles, SimError> {
        layout.validate()?;
        let mut handles = VesselHandles {
            name: layout.name.clone(),
            ..Default::default()
        };

        for def in &layout.compartments {
            let entity = self.add_compartment(def.rect, layout.vessel)?;
            if let Ok(mut c) = self.world.get::<&mut Compartment>(entity) {
                c.set_water(def.water);
                c.set_gas_percentage(def.gas_percentage);
                c.settle_surface();
            }
            handles.compartments.push(entity);
        }
        for def in &layout.walls {
            handles
                .walls
                .push(self.add_wall(def.rect, def.max_health, def.min_health, layout.vessel)?);
        }
        for def in &layout.openings {
            handles.openings.push(self.add_opening_def(def, layout.vessel)?);
        }
        self.refresh_topology();

        for &position in &layout.characters {
            handles.characters.push(self.add_character(position));
        }
        for item in &layout.items {
            handles.items.push(self.add_item(item.position, item.flammable));
        }
        for def in &layout.fires {
            let compartment = handles.compartments[def.compartment];
            handles.fires.push(self.start_fire(compartment, def.position)?);
        }

        log::info!(
            "loaded vessel '{}': {} compartments, {} walls, {} openings",
            layout.name,
            handles.compartments.len(),
            handles.walls.len(),
            handles.openings.len()
        );
        Ok(handles)
    }

    // Persistence and replication

    /// Save simulation state to a writer
    pub fn save<W: Write>(&self, writer: W) -> Result<(), SaveError> {
        persistence::save_simulation(writer, &self.world, self.sim_time, self.tick)
    }

    /// Load simulation state from a reader, replacing the current world
    pub fn load<R: Read>(&mut self, reader: R) -> Result<(), SaveError> {
        let data = persistence::load_simulation(reader)?;
        self.restore(data)?;
        Ok(())
    }

    /// Drop every entity and collider and start over with a fresh id space
    pub fn clear(&mut self) {
        let mut bodies = Vec::new();
        for (_, wall) in self.world.query::<&StructuralWall>().iter() {
            bodies.extend(wall.bodies.iter().copied());
            bodies.extend(wall.sensor);
        }
        for (_, opening) in self.world.query::<&Opening>().iter() {
            bodies.extend(opening.exterior_blocker);
        }
        for body in bodies {
            self.physics.remove_body(body);
        }

        self.world.clear();
        self.ids = IdAllocator::new(self.config.max_entity_ids);
        self.rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        self.pending_damage.clear();
        self.fire_spread_timer = self.config.fire.spread_interval;
        self.sim_time = 0.0;
        self.tick = 0;
    }

    /// Rebuild the world from a snapshot. Breaches come back by replaying
    /// wall damage, without reporting breaches or explosions to the observer.
    pub fn restore(&mut self, data: SaveData) -> Result<(), SimError> {
        self.clear();

        let mut compartments = Vec::with_capacity(data.compartments.len());
        for saved in &data.compartments {
            let entity = self.add_compartment(saved.rect, saved.vessel)?;
            if let Ok(mut c) = self.world.get::<&mut Compartment>(entity) {
                c.set_water(saved.water);
                c.set_gas_percentage(saved.gas_percentage);
                c.settle_surface();
            }
            compartments.push(entity);
        }

        for saved in &data.openings {
            let def = OpeningDef {
                rect: saved.rect,
                horizontal: Some(saved.is_horizontal),
                open: saved.open,
                door: saved.door,
            };
            self.add_opening_def(&def, saved.vessel)?;
        }

        let mut walls = Vec::with_capacity(data.walls.len());
        for saved in &data.walls {
            walls.push(self.add_wall(saved.rect, saved.max_health, saved.min_health, saved.vessel)?);
        }
        self.refresh_topology();

        let mut silent = NullObserver;
        for (&wall, saved) in walls.iter().zip(&data.walls) {
            let count = self
                .world
                .get::<&StructuralWall>(wall)
                .map(|w| w.section_count())
                .unwrap_or(0);
            for (section, &damage) in saved.damage.iter().enumerate().take(count) {
                if damage <= 0.0 {
                    continue;
                }
                let mut ctx = BreachContext {
                    thresholds: &self.config.breach,
                    explosion: &self.config.explosion,
                    ids: &mut self.ids,
                    physics: &mut self.physics,
                    observer: &mut silent,
                };
                match set_section_damage(&mut self.world, &mut ctx, wall, section, damage) {
                    Ok(_) => {}
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => log::warn!("skipping saved damage: {}", e),
                }
            }
        }

        for (&compartment, saved) in compartments.iter().zip(&data.compartments) {
            let Ok(bounds) = self.world.get::<&Compartment>(compartment).map(|c| c.rect()) else {
                continue;
            };
            for fire in &saved.fires {
                let (position, size) = fire.resolve(bounds);
                let entity = self.world.spawn((Combustion::new(compartment, position).with_size(size),));
                if let Ok(mut c) = self.world.get::<&mut Compartment>(compartment) {
                    c.fires.push(entity);
                }
            }
        }

        for character in data.characters {
            self.world.spawn((character,));
        }
        for item in data.items {
            self.world.spawn((item,));
        }

        self.sim_time = data.sim_time;
        self.tick = data.tick;
        log::info!(
            "restored {} compartments, {} walls at tick {}",
            compartments.len(),
            walls.len(),
            self.tick
        );
        Ok(())
    }

    /// Replicated state of one compartment
    pub fn net_state(&self, compartment: Entity) -> Result<CompartmentNetState, SimError> {
        CompartmentNetState::capture(&self.world, compartment)
    }

    pub fn apply_net_state(&mut self, compartment: Entity, state: &CompartmentNetState) -> Result<Vec<Entity>, SimError> {
        replication::apply_net_state(&mut self.world, compartment, state)
    }
}

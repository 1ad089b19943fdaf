//! Wall damage resolution - turns section damage into breach openings,
//! explosions and collider changes.
//!
//! A section owns its opening: it is created the moment damage reaches the
//! leak threshold and destroyed when damage falls back below it. Colliders
//! are only rebuilt when a section crosses the fully-destroyed boundary.

use hecs::{Entity, World};
use serde::{Deserialize, Serialize};

use super::topology::refresh_links;
use crate::components::*;
use crate::config::{BreachConfig, ExplosionConfig};
use crate::error::SimError;
use crate::ids::IdAllocator;
use crate::observer::SimObserver;
use crate::physics::{BodyCategory, BodyDesc, BodyKind, PhysicsWorld};

/// Everything damage resolution may touch besides the world
pub struct BreachContext<'a> {
    pub thresholds: &'a BreachConfig,
    pub explosion: &'a ExplosionConfig,
    pub ids: &'a mut IdAllocator,
    pub physics: &'a mut dyn PhysicsWorld,
    pub observer: &'a mut dyn SimObserver,
}

/// Damage queued for the next tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageRequest {
    /// Wall net id; entities do not survive a save
    pub wall: NetId,
    pub section: usize,
    pub amount: f32,
}

/// What a damage write did to a section
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionUpdate {
    pub state: SectionState,
    pub damage: f32,
    pub opening: Option<Entity>,
    pub opening_created: bool,
    pub opening_removed: bool,
    pub colliders_rebuilt: bool,
    pub exploded: bool,
}

/// Set a section's damage and apply every consequence immediately
pub fn set_section_damage(
    world: &mut World,
    ctx: &mut BreachContext,
    wall: Entity,
    section: usize,
    damage: f32,
) -> Result<SectionUpdate, SimError> {
    let (section_rect, wall_is_horizontal, vessel, max_health, existing, old, new) = {
        let mut w = world
            .get::<&mut StructuralWall>(wall)
            .map_err(|_| SimError::UnknownEntity(wall))?;
        let count = w.section_count();
        let Some(rect) = w.section(section).map(|s| s.rect) else {
            log::warn!("damage for section {} of wall {} ignored, wall has {} sections", section, w.net_id.0, count);
            return Err(SimError::SectionOutOfRange { section, count });
        };
        let existing = w.section(section).and_then(|s| s.opening);
        let Some((old, new)) = w.store_damage(section, damage) else {
            log::warn!("rejected non-finite damage {} for wall {}", damage, w.net_id.0);
            return Err(SimError::InvalidValue { what: "wall damage must be finite" });
        };
        (rect, w.is_horizontal(), w.vessel, w.max_health(), existing, old, new)
    };

    let state = SectionState::classify(new, max_health, ctx.thresholds);
    let existing = existing.filter(|&o| world.contains(o));
    let mut update = SectionUpdate {
        state,
        damage: new,
        opening: None,
        opening_created: false,
        opening_removed: false,
        colliders_rebuilt: false,
        exploded: false,
    };

    if state.has_opening() {
        let target_open = breach_open(new, max_health, ctx.thresholds);
        let (opening, created) = match existing {
            Some(o) => (o, false),
            None => {
                let o = create_breach(world, ctx, wall, section, section_rect, wall_is_horizontal, vessel)?;
                (o, true)
            }
        };
        let (old_open, exterior) = {
            let mut o = world
                .get::<&mut Opening>(opening)
                .map_err(|_| SimError::UnknownEntity(opening))?;
            let old_open = if created { 0.0 } else { o.open() };
            o.set_open(target_open);
            (old_open, o.is_room_to_exterior())
        };
        update.opening = Some(opening);
        update.opening_created = created;

        let sudden = created || target_open - old_open > ctx.explosion.open_delta;
        if state.is_breached() && exterior && sudden {
            trigger_explosion(world, ctx, opening);
            update.exploded = true;
        }
    } else if let Some(opening) = existing {
        remove_breach(world, ctx, opening);
        if let Ok(mut w) = world.get::<&mut StructuralWall>(wall) {
            w.set_section_opening(section, None);
        }
        update.opening_removed = true;
    }

    if solid_transition(old, new, max_health).is_some() {
        rebuild_colliders(world, &mut *ctx.physics, wall);
        update.colliders_rebuilt = true;
    }

    Ok(update)
}

/// Add to a section's current damage
pub fn add_section_damage(
    world: &mut World,
    ctx: &mut BreachContext,
    wall: Entity,
    section: usize,
    amount: f32,
) -> Result<SectionUpdate, SimError> {
    let current = world
        .get::<&StructuralWall>(wall)
        .map_err(|_| SimError::UnknownEntity(wall))?
        .section(section)
        .map(|s| s.damage());
    match current {
        Some(current) => set_section_damage(world, ctx, wall, section, current + amount),
        // Let `set_section_damage` report the bad index
        None => set_section_damage(world, ctx, wall, section, amount),
    }
}

/// Damage whichever section lies under a world point. Points off the wall
/// are logged and ignored.
pub fn damage_wall_at(
    world: &mut World,
    ctx: &mut BreachContext,
    wall: Entity,
    point: Vec2,
    amount: f32,
) -> Result<Option<SectionUpdate>, SimError> {
    let index = world
        .get::<&StructuralWall>(wall)
        .map_err(|_| SimError::UnknownEntity(wall))?
        .find_section_index(point);
    match index {
        Some(section) => add_section_damage(world, ctx, wall, section, amount).map(Some),
        None => {
            log::warn!("damage at {:?} misses wall {:?}", point, wall);
            Ok(None)
        }
    }
}

/// Apply queued damage. Recoverable errors are logged and skipped; only
/// running out of ids aborts.
pub fn apply_damage_queue(
    world: &mut World,
    ctx: &mut BreachContext,
    requests: impl IntoIterator<Item = DamageRequest>,
) -> Result<usize, SimError> {
    let mut applied = 0;
    for request in requests {
        let Some(wall) = wall_by_net_id(world, request.wall) else {
            log::warn!("queued damage for unknown wall {}", request.wall.0);
            continue;
        };
        match add_section_damage(world, ctx, wall, request.section, request.amount) {
            Ok(_) => applied += 1,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => log::warn!("queued wall damage skipped: {}", e),
        }
    }
    Ok(applied)
}

pub fn wall_by_net_id(world: &World, id: NetId) -> Option<Entity> {
    world
        .query::<&StructuralWall>()
        .iter()
        .find(|(_, w)| w.net_id == id)
        .map(|(entity, _)| entity)
}

fn create_breach(
    world: &mut World,
    ctx: &mut BreachContext,
    wall: Entity,
    section: usize,
    section_rect: Rect,
    wall_is_horizontal: bool,
    vessel: VesselId,
) -> Result<Entity, SimError> {
    let net_id = ctx.ids.allocate()?;
    let rect = section_rect.expanded(BREACH_MARGIN);
    let mut opening = Opening::with_orientation(rect, !wall_is_horizontal, vessel, net_id);
    opening.set_open(0.0);
    opening.wall = Some(WallSectionRef { wall, section });

    let entity = world.spawn((opening,));
    refresh_links(world, entity);
    if let Ok(mut w) = world.get::<&mut StructuralWall>(wall) {
        w.set_section_opening(section, Some(entity));
    }
    log::debug!("breach {} opened in section {} of wall {:?}", net_id.0, section, wall);
    ctx.observer.breach_created(entity, rect.center());
    Ok(entity)
}

/// Despawn a breach and detach it from everything that references it
fn remove_breach(world: &mut World, ctx: &mut BreachContext, opening: Entity) {
    let Ok(mut o) = world.remove_one::<Opening>(opening) else {
        return;
    };
    o.set_open(0.0);
    for compartment in o.links.iter() {
        if let Ok(mut c) = world.get::<&mut Compartment>(compartment) {
            c.openings.retain(|&e| e != opening);
        }
    }
    if let Some(blocker) = o.exterior_blocker.take() {
        ctx.physics.remove_body(blocker);
    }
    ctx.ids.release(o.net_id);
    let _ = world.despawn(opening);
    log::debug!("breach {} closed", o.net_id.0);
    ctx.observer.breach_removed(opening);
}

/// One-shot blast at a sudden exterior breach, weakened by other open
/// exterior breaches nearby in the same compartment
fn trigger_explosion(world: &World, ctx: &mut BreachContext, opening: Entity) {
    let Ok(o) = world.get::<&Opening>(opening) else {
        return;
    };
    let center = o.rect().center();
    let radius = (o.size() * ctx.explosion.radius_factor).clamp(0.0, ctx.explosion.max_radius);

    let nearby = o
        .links
        .first()
        .and_then(|c| world.get::<&Compartment>(c).ok().map(|c| c.openings.clone()))
        .unwrap_or_default()
        .into_iter()
        .filter(|&other| other != opening)
        .filter(|&other| {
            world.get::<&Opening>(other).is_ok_and(|g| {
                g.is_room_to_exterior()
                    && g.effective_open() > 0.0
                    && g.rect().center().distance(&center) <= ctx.explosion.max_radius
            })
        })
        .count();

    let strength = ctx.explosion.strength * o.open() / (1 + nearby) as f32;
    ctx.observer.explosion(center, radius, strength);
}

/// Replace a wall's colliders: one solid body per run of non-destroyed
/// sections, plus a whole-wall sensor when there are holes or no solid body.
pub fn rebuild_colliders(world: &mut World, physics: &mut dyn PhysicsWorld, wall: Entity) {
    let Ok(mut w) = world.get::<&mut StructuralWall>(wall) else {
        return;
    };
    for body in w.bodies.drain(..) {
        physics.remove_body(body);
    }
    if let Some(sensor) = w.sensor.take() {
        physics.remove_body(sensor);
    }

    let runs = w.solid_runs();
    w.bodies = runs
        .iter()
        .map(|run| physics.create_rect_body(BodyDesc::from_rect(*run, BodyKind::Solid, BodyCategory::Wall)))
        .collect();

    if w.has_holes() || w.bodies.is_empty() {
        let desc = BodyDesc::from_rect(w.rect(), BodyKind::Sensor, BodyCategory::Wall);
        w.sensor = Some(physics.create_rect_body(desc));
    }
    log::debug!("wall {} rebuilt with {} bodies", w.net_id.0, w.bodies.len());
}

/// Tear down a wall: its breaches go with it, as do its bodies
pub fn remove_wall(world: &mut World, ctx: &mut BreachContext, wall: Entity) -> Result<(), SimError> {
    let w = world
        .remove_one::<StructuralWall>(wall)
        .map_err(|_| SimError::UnknownEntity(wall))?;
    for opening in w.sections().iter().filter_map(|s| s.opening) {
        remove_breach(world, ctx, opening);
    }
    for body in &w.bodies {
        ctx.physics.remove_body(*body);
    }
    if let Some(sensor) = w.sensor {
        ctx.physics.remove_body(sensor);
    }
    ctx.ids.release(w.net_id);
    let _ = world.despawn(wall);
    Ok(())
}

//! Fire system - growth, gas consumption, occupant damage, spread, merging
//! and extinguishing.

use hecs::{Entity, World};
use rand::Rng;

use super::topology::{approximate_distance, compartment_at};
use crate::components::*;
use crate::config::FireConfig;
use crate::error::SimError;
use crate::observer::SimObserver;
use crate::physics::{CollisionFilter, PhysicsWorld};

/// Horizontal reach of a targeted extinguish beyond a fire's edges
pub const EXTINGUISH_RANGE: f32 = 100.0;
/// Burn on characters stops growing past this width
const MAX_BURN_WIDTH: f32 = 500.0;

pub struct FireContext<'a> {
    pub config: &'a FireConfig,
    pub physics: &'a dyn PhysicsWorld,
    pub observer: &'a mut dyn SimObserver,
}

/// Start a fire on the floor of `compartment` at `position`
pub fn start_fire(
    world: &mut World,
    observer: &mut dyn SimObserver,
    compartment: Entity,
    position: Vec2,
) -> Result<Entity, SimError> {
    if !position.is_finite() {
        return Err(SimError::InvalidValue { what: "fire position must be finite" });
    }
    let bounds = world
        .get::<&Compartment>(compartment)
        .map_err(|_| SimError::UnknownEntity(compartment))?
        .rect();
    let mut fire = Combustion::new(compartment, position);
    fire.clamp_into(bounds);
    Ok(spawn_fire(world, observer, fire))
}

fn spawn_fire(world: &mut World, observer: &mut dyn SimObserver, fire: Combustion) -> Entity {
    let compartment = fire.compartment;
    let entity = world.spawn((fire,));
    if let Ok(mut c) = world.get::<&mut Compartment>(compartment) {
        c.fires.push(entity);
    }
    observer.fire_started(entity, compartment);
    entity
}

/// One fire tick. `spread_timer` counts down to the next spread attempt.
pub fn fire_system<R: Rng>(world: &mut World, ctx: &mut FireContext, rng: &mut R, spread_timer: &mut f32, dt: f32) {
    let fires: Vec<Entity> = world.query::<&Combustion>().iter().map(|(e, _)| e).collect();
    if fires.is_empty() {
        *spread_timer = ctx.config.spread_interval;
        return;
    }

    for &fire in &fires {
        burn(world, ctx, fire, dt);
    }
    for &fire in &fires {
        damage_occupants(world, ctx, fire, dt);
    }

    *spread_timer -= dt;
    if *spread_timer <= 0.0 {
        *spread_timer += ctx.config.spread_interval.max(dt);
        spread_fires(world, ctx, rng);
    }

    merge_fires(world);
    remove_extinguished(world, ctx.observer);
}

/// Grow or shrink with the gas supply, eat gas and get doused by flood water
fn burn(world: &mut World, ctx: &mut FireContext, fire: Entity, dt: f32) {
    let Ok(mut f) = world.get::<&mut Combustion>(fire) else {
        return;
    };
    let Ok(mut c) = world.get::<&mut Compartment>(f.compartment) else {
        // Compartment gone: the fire goes with it
        f.size.x = 0.0;
        return;
    };

    f.grow(Combustion::grow_modifier(c.gas_percentage()), dt, ctx.config);
    f.clamp_into(c.rect());

    let gas_used = f.width().max(0.0) * dt * ctx.config.oxygen_consumption;
    let gas = c.gas();
    c.set_gas(gas - gas_used);

    let submerged = c.surface() - f.position.y;
    if submerged > 0.0 {
        let amount = f.reduce(submerged * dt * ctx.config.water_extinguish_rate);
        if amount > 0.0 {
            ctx.observer.water_extinguished(fire, amount);
        }
    }
}

fn damage_occupants(world: &mut World, ctx: &mut FireContext, fire: Entity, dt: f32) {
    let Some((center, width, range, compartment)) = world.get::<&Combustion>(fire).ok().and_then(|f| {
        (!f.is_extinguished()).then(|| {
            (f.center(), f.width(), f.damage_range(ctx.config.max_damage_range), f.compartment)
        })
    }) else {
        return;
    };

    let characters: Vec<(Entity, Vec2, u8)> = world
        .query::<&Character>()
        .iter()
        .filter(|(_, ch)| ch.intact_limbs > 0 && ch.position.distance(&center) <= range)
        .map(|(e, ch)| (e, ch.position, ch.intact_limbs))
        .collect();

    for (character, position, limbs) in characters {
        let Some(standing_in) = compartment_at(world, position) else {
            continue;
        };
        if approximate_distance(world, center, position, compartment, standing_in, range) > range {
            continue;
        }
        let per_limb = width.min(MAX_BURN_WIDTH).sqrt() * dt * ctx.config.character_burn_rate / limbs as f32;
        for limb in 0..limbs {
            ctx.observer.character_burned(character, limb, per_limb);
        }
    }

    let burn = width * dt * ctx.config.item_burn_rate;
    let items: Vec<Entity> = world
        .query::<&FlammableItem>()
        .iter()
        .filter(|(_, item)| item.flammable && !item.is_destroyed())
        .filter(|(_, item)| item.position.distance(&center) <= range)
        .filter(|(_, item)| {
            ctx.physics
                .query_segment(center, item.position, CollisionFilter::SOLID_WALLS)
                .is_empty()
        })
        .map(|(e, _)| e)
        .collect();

    for item in items {
        let destroyed = match world.get::<&mut FlammableItem>(item) {
            Ok(mut it) => {
                it.condition = (it.condition - burn).max(0.0);
                it.is_destroyed()
            }
            Err(_) => continue,
        };
        ctx.observer.item_damaged(item, burn);
        if destroyed {
            let _ = world.despawn(item);
            ctx.observer.item_caught_fire(item);
        }
    }
}

/// Try to jump through every open doorway the flames reach
fn spread_fires<R: Rng>(world: &mut World, ctx: &mut FireContext, rng: &mut R) {
    let sources: Vec<(Entity, Entity, Rect)> = world
        .query::<&Combustion>()
        .iter()
        .filter(|(_, f)| !f.is_extinguished())
        .map(|(e, f)| (e, f.compartment, f.reach_rect()))
        .collect();

    let mut spawned = Vec::new();
    for (fire, compartment, reach) in sources {
        let openings = match world.get::<&Compartment>(compartment) {
            Ok(c) => c.openings.clone(),
            Err(_) => continue,
        };
        for opening in openings {
            let Some((target, at)) = world.get::<&Opening>(opening).ok().and_then(|o| {
                let qualifies =
                    o.is_room_to_room() && o.effective_open() > 0.0 && o.rect().intersects(&reach);
                qualifies
                    .then(|| o.links.other(compartment).map(|t| (t, o.rect().center())))
                    .flatten()
            }) else {
                continue;
            };
            if rng.gen::<f32>() >= ctx.config.spread_probability {
                continue;
            }
            let Ok(bounds) = world.get::<&Compartment>(target).map(|c| c.rect()) else {
                continue;
            };
            let mut new_fire = Combustion::new(
                target,
                Vec2::new(at.x - INITIAL_FIRE_SIZE / 2.0, bounds.bottom()),
            );
            new_fire.clamp_into(bounds);
            spawned.push((fire, opening, new_fire));
        }
    }

    for (from, opening, new_fire) in spawned {
        let to = spawn_fire(world, ctx.observer, new_fire);
        log::debug!("fire {:?} spread through {:?} as {:?}", from, opening, to);
        ctx.observer.fire_spread(from, to, opening);
    }
}

/// Fold overlapping fires in the same compartment into the wider one
pub fn merge_fires(world: &mut World) -> usize {
    let mut fires: Vec<(Entity, Combustion)> = world
        .query::<&Combustion>()
        .iter()
        .map(|(e, f)| (e, f.clone()))
        .collect();
    let mut absorbed = vec![false; fires.len()];

    for i in 0..fires.len() {
        if absorbed[i] {
            continue;
        }
        for j in (i + 1)..fires.len() {
            if absorbed[j] || fires[i].1.compartment != fires[j].1.compartment {
                continue;
            }
            if !fires[i].1.rect().intersects(&fires[j].1.rect()) {
                continue;
            }
            let (keep, drop) = if fires[j].1.width() > fires[i].1.width() { (j, i) } else { (i, j) };
            let other = fires[drop].1.clone();
            fires[keep].1.merge_from(&other);
            absorbed[drop] = true;
            if drop == i {
                break;
            }
        }
    }

    let mut merged = 0;
    for ((entity, fire), gone) in fires.into_iter().zip(absorbed) {
        if gone {
            unregister_fire(world, entity, fire.compartment);
            let _ = world.despawn(entity);
            merged += 1;
        } else if let Ok(mut f) = world.get::<&mut Combustion>(entity) {
            *f = fire;
        }
    }
    merged
}

fn remove_extinguished(world: &mut World, observer: &mut dyn SimObserver) {
    let out: Vec<(Entity, Entity)> = world
        .query::<&Combustion>()
        .iter()
        .filter(|(_, f)| f.is_extinguished())
        .map(|(e, f)| (e, f.compartment))
        .collect();
    for (fire, compartment) in out {
        remove_fire(world, observer, fire, compartment);
    }
}

fn remove_fire(world: &mut World, observer: &mut dyn SimObserver, fire: Entity, compartment: Entity) {
    unregister_fire(world, fire, compartment);
    let _ = world.despawn(fire);
    observer.fire_extinguished(fire);
}

fn unregister_fire(world: &mut World, fire: Entity, compartment: Entity) {
    if let Ok(mut c) = world.get::<&mut Compartment>(compartment) {
        c.fires.retain(|&f| f != fire);
    }
}

/// Put out up to `amount` of a fire's width. Whatever is removed is added to
/// the compartment as water. Returns the amount consumed.
pub fn extinguish(
    world: &mut World,
    observer: &mut dyn SimObserver,
    fire: Entity,
    amount: f32,
) -> Result<f32, SimError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(SimError::InvalidValue { what: "extinguish amount must be finite and non-negative" });
    }
    let (consumed, compartment, out) = {
        let mut f = world
            .get::<&mut Combustion>(fire)
            .map_err(|_| SimError::UnknownEntity(fire))?;
        let consumed = f.reduce(amount);
        (consumed, f.compartment, f.is_extinguished())
    };
    if let Ok(mut c) = world.get::<&mut Compartment>(compartment) {
        c.add_water(consumed);
    }
    if out {
        remove_fire(world, observer, fire, compartment);
    }
    Ok(consumed)
}

/// Hose down every fire in a compartment near `position`
pub fn extinguish_fires_in(
    world: &mut World,
    observer: &mut dyn SimObserver,
    compartment: Entity,
    dt: f32,
    amount: f32,
    position: Vec2,
) -> Result<f32, SimError> {
    let fires = world
        .get::<&Compartment>(compartment)
        .map_err(|_| SimError::UnknownEntity(compartment))?
        .fires
        .clone();
    let mut total = 0.0;
    for fire in fires {
        let in_range = world.get::<&Combustion>(fire).is_ok_and(|f| {
            position.x >= f.position.x - EXTINGUISH_RANGE
                && position.x <= f.position.x + f.width() + EXTINGUISH_RANGE
        });
        if in_range {
            total += extinguish(world, observer, fire, amount * dt)?;
        }
    }
    Ok(total)
}

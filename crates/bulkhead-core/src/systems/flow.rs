//! Opening flow - moves water and gas through every opening once per tick.
//!
//! Openings are processed in a seeded random order that changes every tick,
//! so no opening systematically wins when several drain the same compartment.

use std::collections::HashMap;

use hecs::{Entity, World};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::water::with_compartment_pair;
use crate::components::{Compartment, NetId, Opening, Rect, Vec2, VesselId, MAX_COMPRESS};
use crate::config::GasConfig;
use crate::physics::{BodyCategory, BodyDesc, BodyKind, CollisionFilter, PhysicsWorld};

/// Horizontal room-to-room transfer per unit of pressure difference
const HORIZONTAL_FLOW_RATE: f32 = 300.0;
/// Max water pushed up through a hatch per second per unit of size factor
const PUSH_UP_RATE: f32 = 8_000.0;
/// Max water draining down a hatch per second per unit of size factor
const DRAIN_RATE: f32 = 25_000.0;
/// Exterior inflow per second per unit of `size * open^2`
const EXTERIOR_FLOW_RATE: f32 = 500.0;
/// Pressure gained per second by an overfull compartment open to the sea
const OVERFILL_PRESSURE_RATE: f32 = 30.0;
/// Lethal pressure gained per second through an unsealed exterior opening
const LETHAL_PRESSURE_RATE: f32 = 10.0;
/// Transfers bigger than this kick off a visible slosh
const SLOSH_THRESHOLD: f32 = 1.5;
const VERTICAL_FORCE_CAP: f32 = 200.0;
/// How far outside the hull the exterior blocker probe reaches
const BLOCKER_PROBE_DISTANCE: f32 = 500.0;

/// Shared inputs for one flow pass
pub struct FlowContext<'a> {
    pub dt: f32,
    pub gas: &'a GasConfig,
    pub vessel_positions: &'a HashMap<VesselId, Vec2>,
}

/// Result of moving water through one opening
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlowOutcome {
    pub force: Vec2,
    /// Index into the opening's links of the compartment that received water
    pub target: Option<usize>,
}

/// The opening data the flow rules read
#[derive(Debug, Clone, Copy)]
pub struct OpeningShape {
    pub rect: Rect,
    pub is_horizontal: bool,
    pub size: f32,
    pub open: f32,
}

impl OpeningShape {
    pub fn of(opening: &Opening) -> Self {
        Self {
            rect: opening.rect(),
            is_horizontal: opening.is_horizontal(),
            size: opening.size(),
            open: opening.effective_open(),
        }
    }
}

/// Deterministically shuffle `items` for a given tick
pub fn flow_order<T>(seed: u64, tick: u64, items: &mut [T]) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed ^ tick.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    items.shuffle(&mut rng);
}

/// Compute flow through every opening, in the tick's shuffled order
pub fn opening_flow_system(
    world: &mut World,
    physics: &mut dyn PhysicsWorld,
    ctx: &FlowContext,
    seed: u64,
    tick: u64,
) {
    let mut openings: Vec<(NetId, Entity)> = world
        .query::<&Opening>()
        .iter()
        .map(|(entity, o)| (o.net_id, entity))
        .collect();
    openings.sort_by_key(|(id, _)| *id);
    flow_order(seed, tick, &mut openings);

    for (_, opening) in openings {
        update_opening(world, ctx, opening);
        maintain_exterior_blocker(world, physics, opening);
    }
}

/// Run one opening's flow step
pub fn update_opening(world: &mut World, ctx: &FlowContext, opening: Entity) {
    let (shape, links, vessel) = match world.get::<&Opening>(opening) {
        Ok(o) => (OpeningShape::of(&o), o.links, o.vessel),
        Err(_) => return,
    };

    if shape.open <= 0.0 || links.is_inert() {
        if let Ok(mut o) = world.get::<&mut Opening>(opening) {
            o.reset_flow();
        }
        return;
    }

    let outcome = match (links.first(), links.second()) {
        (Some(a), Some(b)) => {
            let offset = vessel_offset(world, vessel, a, b, ctx.vessel_positions);
            with_compartment_pair(world, a, b, |upper_or_left, lower_or_right| {
                balance_gas(&shape, upper_or_left, lower_or_right, ctx.dt, ctx.gas);
                room_to_room(&shape, upper_or_left, lower_or_right, offset, ctx.dt)
            })
        }
        (Some(a), None) => world
            .query_one_mut::<&mut Compartment>(a)
            .ok()
            .map(|c| room_to_exterior(&shape, c, ctx.dt)),
        _ => None,
    };

    // A stale link leaves the opening inert until topology is refreshed
    let Some(outcome) = outcome else {
        if let Ok(mut o) = world.get::<&mut Opening>(opening) {
            o.reset_flow();
            o.links_dirty = true;
        }
        return;
    };

    if let Ok(mut o) = world.get::<&mut Opening>(opening) {
        o.update_flow_force(outcome.force, ctx.dt);
        o.flow_target = outcome.target.and_then(|i| if i == 0 { links.first() } else { links.second() });
    }
}

/// Vertical pressure offset between two vessels joined by an opening.
///
/// NOTE: the offset is taken relative to whichever compartment sits on a
/// different vessel than the opening, and is only ever added to the second
/// compartment's side of the comparison. This asymmetry is intentional.
fn vessel_offset(
    world: &World,
    opening_vessel: VesselId,
    a: Entity,
    b: Entity,
    positions: &HashMap<VesselId, Vec2>,
) -> f32 {
    let vessel_of = |e: Entity| world.get::<&Compartment>(e).map(|c| c.vessel).ok();
    let pos = |v: VesselId| positions.get(&v).copied().unwrap_or(Vec2::ZERO);
    match (vessel_of(a), vessel_of(b)) {
        (Some(va), _) if va != opening_vessel => pos(opening_vessel).y - pos(va).y,
        (_, Some(vb)) if vb != opening_vessel => pos(vb).y - pos(opening_vessel).y,
        _ => 0.0,
    }
}

/// Raise `receiver`'s pressure towards `donor`'s once it is overfull
fn share_overfill_pressure(receiver: &mut Compartment, donor_pressure: f32) {
    if receiver.water() > receiver.volume() {
        let p = receiver.pressure();
        receiver.set_pressure(p.max((p + donor_pressure) / 2.0));
    }
}

/// Water exchange between two compartments. For a vertical opening `h1` is
/// the upper compartment, for a horizontal one the left.
pub fn room_to_room(shape: &OpeningShape, h1: &mut Compartment, h2: &mut Compartment, sub_offset: f32, dt: f32) -> FlowOutcome {
    let mut outcome = FlowOutcome::default();
    if h1.water() <= 0.0 && h2.water() <= 0.0 {
        return outcome;
    }

    let size_factor = shape.size / 100.0 * shape.open;
    let rect = shape.rect;

    if shape.is_horizontal {
        let level1 = h1.surface() + h1.waves().last();
        let level2 = h2.surface() + h2.waves().first();
        if level1.max(level2) > rect.y - shape.size {
            let p1 = h1.pressure();
            let p2 = h2.pressure() + sub_offset;
            let delta;
            if p1 > p2 {
                delta = ((p1 - p2) * HORIZONTAL_FLOW_RATE * size_factor * dt)
                    .min(h1.water().min(h1.volume()))
                    .min(h2.water_ceiling() - h2.water())
                    .max(0.0);
                h1.add_water(-delta);
                h2.add_water(delta);
                share_overfill_pressure(h2, h1.pressure());
                outcome.force = Vec2::new(delta, 0.0);
                outcome.target = Some(1);
            } else {
                delta = ((p2 - p1) * HORIZONTAL_FLOW_RATE * size_factor * dt)
                    .min(h2.water().min(h2.volume()))
                    .min(h1.water_ceiling() - h1.water())
                    .max(0.0);
                h2.add_water(-delta);
                h1.add_water(delta);
                share_overfill_pressure(h1, h2.pressure());
                outcome.force = Vec2::new(-delta, 0.0);
                outcome.target = Some(0);
            }

            if delta > SLOSH_THRESHOLD && sub_offset == 0.0 {
                seed_slosh(h1, h2, rect.y);
            }
        }
    } else if h2.pressure() + sub_offset > h1.pressure() && h2.water() > 0.0 {
        // Lower compartment overfull: force water up through the hatch
        let delta = (h2.water() - h2.volume() + h2.volume() * MAX_COMPRESS)
            .min(dt * PUSH_UP_RATE * size_factor)
            .min(h1.water_ceiling() - h1.water())
            .max(0.0);
        let lift = (h2.pressure() - h1.pressure()).min(VERTICAL_FORCE_CAP).min(delta);
        h1.add_water(delta);
        h2.add_water(-delta);
        share_overfill_pressure(h1, h2.pressure());
        outcome.force = Vec2::new(0.0, lift);
        outcome.target = Some(0);
    } else if h1.water() > 0.0 {
        let delta = h1
            .water()
            .min(dt * DRAIN_RATE * size_factor)
            .min(h2.water_ceiling() - h2.water())
            .max(0.0);
        h1.add_water(-delta);
        h2.add_water(delta);
        let tilt = h1.waves().height(h1.wave_index(rect.left())) - h1.waves().height(h1.wave_index(rect.right()));
        outcome.force = Vec2::new(tilt, (-delta).clamp(-VERTICAL_FORCE_CAP, 0.0));
        share_overfill_pressure(h2, h1.pressure());
        outcome.target = Some(1);
    }

    if shape.open > 0.0 {
        if h1.is_full() && h2.is_full() && h1.water() > 0.0 {
            let avg = (h1.lethal_pressure() + h2.lethal_pressure()) / 2.0;
            h1.set_lethal_pressure(avg);
            h2.set_lethal_pressure(avg);
        } else {
            h1.set_lethal_pressure(0.0);
            h2.set_lethal_pressure(0.0);
        }
    }

    outcome
}

/// Kick the boundary wave cells of both compartments toward their average level
fn seed_slosh(h1: &mut Compartment, h2: &mut Compartment, opening_top: f32) {
    let avg = (h1.surface() + h2.surface()) / 2.0;

    let last = h1.waves().len().saturating_sub(1);
    let level1 = h1.surface() + h1.waves().last();
    if !h1.is_full() && level1 < opening_top {
        let v = (avg - level1) * 0.1;
        h1.waves_mut().set_velocity(last, v);
        h1.waves_mut().set_velocity(last.saturating_sub(1), v);
    }

    let level2 = h2.surface() + h2.waves().first();
    if !h2.is_full() && level2 < opening_top {
        let v = (avg - level2) * 0.1;
        h2.waves_mut().set_velocity(0, v);
        h2.waves_mut().set_velocity(1, v);
    }
}

/// The sea pours in; it always wins the pressure comparison
pub fn room_to_exterior(shape: &OpeningShape, hull: &mut Compartment, dt: f32) -> FlowOutcome {
    let rect = shape.rect;
    let size_factor = shape.size * shape.open * shape.open;
    let delta = (EXTERIOR_FLOW_RATE * size_factor * dt)
        .min(hull.water_ceiling() - hull.water())
        .max(0.0);
    hull.add_water(delta);

    if hull.water() > hull.volume() {
        hull.set_pressure(hull.pressure() + OVERFILL_PRESSURE_RATE * dt);
    }

    let hull_center = hull.rect().center();
    let force;
    if shape.is_horizontal {
        let dir = if rect.x > hull_center.x { -1.0 } else { 1.0 };
        force = Vec2::new(delta * dir, 0.0);

        if !hull.is_full() && hull.surface() < rect.top() {
            let i1 = hull.wave_index(rect.left());
            let i2 = hull.wave_index(rect.right());
            let strength = (force.x.abs() / VERTICAL_FORCE_CAP).min(1.0);
            let vel = (rect.y - rect.height / 2.0 - (hull.surface() + hull.waves().height(i1))) * strength;
            if vel > 0.0 {
                hull.waves_mut().add_velocity(i1, vel * dt);
                hull.waves_mut().add_velocity(i2, vel * dt);
            }
        } else {
            hull.add_lethal_pressure(LETHAL_PRESSURE_RATE * dt);
        }
    } else {
        let dir = if rect.y > hull_center.y { -1.0 } else { 1.0 };
        force = Vec2::new(0.0, delta * dir);
        if hull.is_full() {
            hull.add_lethal_pressure(LETHAL_PRESSURE_RATE * dt);
        }
    }

    FlowOutcome {
        force,
        target: Some(0),
    }
}

/// Equalise gas through an opening that is not under water
pub fn balance_gas(shape: &OpeningShape, h1: &mut Compartment, h2: &mut Compartment, dt: f32, config: &GasConfig) {
    if shape.is_horizontal {
        let level = (h1.surface() + h1.waves().last()).max(h2.surface() + h2.waves().first());
        if level > shape.rect.top() {
            return;
        }
    } else if h2.is_full() {
        return;
    }

    let total_volume = h1.volume() + h2.volume();
    if total_volume <= 0.0 {
        return;
    }
    let total_gas = h1.gas() + h2.gas();
    let max_step = config.distribution_speed * dt;
    let delta = (total_gas * h1.volume() / total_volume - h1.gas()).clamp(-max_step, max_step);
    h1.set_gas(h1.gas() + delta);
    h2.set_gas(h2.gas() - delta);
}

/// Keep a solid blocker outside every open room-to-exterior opening so the
/// breach cannot be used to pass through the hull
pub fn maintain_exterior_blocker(world: &mut World, physics: &mut dyn PhysicsWorld, opening: Entity) {
    let (wants, existing, rect, is_horizontal, hull) = match world.get::<&Opening>(opening) {
        Ok(o) => (
            o.is_room_to_exterior() && o.effective_open() > 0.0,
            o.exterior_blocker,
            o.rect(),
            o.is_horizontal(),
            o.links.first(),
        ),
        Err(_) => return,
    };

    match (wants, existing) {
        (false, Some(handle)) => {
            physics.remove_body(handle);
            if let Ok(mut o) = world.get::<&mut Opening>(opening) {
                o.exterior_blocker = None;
            }
        }
        (true, None) => {
            let Some(hull_center) = hull.and_then(|h| world.get::<&Compartment>(h).ok().map(|c| c.rect().center())) else {
                return;
            };
            let center = rect.center();
            let outward = if is_horizontal {
                Vec2::new(if center.x < hull_center.x { -1.0 } else { 1.0 }, 0.0)
            } else {
                Vec2::new(0.0, if center.y > hull_center.y { 1.0 } else { -1.0 })
            };
            let edge = center + Vec2::new(outward.x * rect.width / 2.0, outward.y * rect.height / 2.0);
            let position = physics
                .raycast(edge, edge + outward * BLOCKER_PROBE_DISTANCE, CollisionFilter::LEVEL)
                .map(|hit| hit.point)
                .unwrap_or(edge);
            let handle = physics.create_rect_body(BodyDesc {
                position,
                size: rect.size(),
                rotation: 0.0,
                kind: BodyKind::Solid,
                category: BodyCategory::Blocker,
            });
            if let Ok(mut o) = world.get::<&mut Opening>(opening) {
                o.exterior_blocker = Some(handle);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{NetId, VesselId};
    use crate::physics::StaticBodies;

    fn room(x: f32, water: f32) -> Compartment {
        Compartment::new(Rect::new(x, 100.0, 200.0, 100.0), VesselId(0), NetId(1)).with_water(water)
    }

    fn doorway() -> OpeningShape {
        OpeningShape {
            rect: Rect::new(200.0, 100.0, 10.0, 100.0),
            is_horizontal: true,
            size: 100.0,
            open: 1.0,
        }
    }

    #[test]
    fn test_flow_order_is_seeded_permutation() {
        let mut a: Vec<u32> = (0..32).collect();
        let mut b = a.clone();
        flow_order(7, 3, &mut a);
        flow_order(7, 3, &mut b);
        assert_eq!(a, b);

        let mut c: Vec<u32> = (0..32).collect();
        flow_order(7, 4, &mut c);
        assert_ne!(a, c);

        let mut sorted = a.clone();
        sorted.sort();
        assert_eq!(sorted, (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn test_higher_pressure_donates() {
        let mut left = room(0.0, 16_000.0);
        let mut right = room(210.0, 0.0);
        let before = left.water() + right.water();
        let out = room_to_room(&doorway(), &mut left, &mut right, 0.0, 1.0 / 60.0);

        assert!(out.force.x > 0.0);
        assert_eq!(out.target, Some(1));
        assert!(right.water() > 0.0);
        assert!((left.water() + right.water() - before).abs() < 0.01);
    }

    #[test]
    fn test_dry_rooms_do_nothing() {
        let mut left = room(0.0, 0.0);
        let mut right = room(210.0, 0.0);
        let out = room_to_room(&doorway(), &mut left, &mut right, 0.0, 1.0 / 60.0);
        assert_eq!(out, FlowOutcome::default());
    }

    #[test]
    fn test_vertical_drain_moves_water_down() {
        let hatch = OpeningShape {
            rect: Rect::new(50.0, 110.0, 100.0, 10.0),
            is_horizontal: false,
            size: 100.0,
            open: 1.0,
        };
        let mut upper = Compartment::new(Rect::new(0.0, 210.0, 200.0, 100.0), VesselId(0), NetId(1)).with_water(1_000.0);
        let mut lower = room(0.0, 0.0);
        let out = room_to_room(&hatch, &mut upper, &mut lower, 0.0, 1.0 / 60.0);

        assert!(out.force.y < 0.0);
        assert_eq!(out.target, Some(1));
        assert!(upper.water() < 1_000.0);
        assert!((upper.water() + lower.water() - 1_000.0).abs() < 0.01);
    }

    #[test]
    fn test_overfull_lower_room_pushes_water_up() {
        let hatch = OpeningShape {
            rect: Rect::new(50.0, 110.0, 100.0, 10.0),
            is_horizontal: false,
            size: 100.0,
            open: 1.0,
        };
        let mut upper = Compartment::new(Rect::new(0.0, 210.0, 200.0, 100.0), VesselId(0), NetId(1));
        let mut lower = room(0.0, 20_000.0 * MAX_COMPRESS);
        lower.set_pressure(400.0);
        let before = upper.water() + lower.water();
        let out = room_to_room(&hatch, &mut upper, &mut lower, 0.0, 1.0 / 60.0);

        assert!(out.force.y > 0.0);
        assert_eq!(out.target, Some(0));
        assert!(upper.water() > 0.0);
        assert!((upper.water() + lower.water() - before).abs() < 0.01);

        // Keep forcing until the upper room is packed
        for _ in 0..600 {
            lower.set_water(lower.water_ceiling());
            lower.set_pressure(1_000.0);
            room_to_room(&hatch, &mut upper, &mut lower, 0.0, 1.0 / 60.0);
            assert!(upper.water() <= upper.water_ceiling() + 1e-3);
        }
        assert!(upper.water() > 20_000.0);
    }

    #[test]
    fn test_exterior_flow_scales_with_open_squared() {
        let mut shape = OpeningShape {
            rect: Rect::new(-10.0, 100.0, 10.0, 100.0),
            is_horizontal: true,
            size: 100.0,
            open: 1.0,
        };
        let mut full_open = room(0.0, 0.0);
        room_to_exterior(&shape, &mut full_open, 0.01);

        shape.open = 0.5;
        let mut half_open = room(0.0, 0.0);
        room_to_exterior(&shape, &mut half_open, 0.01);

        assert!((full_open.water() - 500.0).abs() < 0.01);
        assert!((half_open.water() - 125.0).abs() < 0.01);
    }

    #[test]
    fn test_exterior_flow_builds_lethal_pressure_when_full() {
        let shape = OpeningShape {
            rect: Rect::new(-10.0, 100.0, 10.0, 100.0),
            is_horizontal: true,
            size: 100.0,
            open: 1.0,
        };
        let mut hull = room(0.0, 21_000.0);
        for _ in 0..60 {
            room_to_exterior(&shape, &mut hull, 1.0 / 60.0);
        }
        assert!(hull.water() <= hull.water_ceiling());
        assert!(hull.lethal_pressure() > 9.0);
    }

    #[test]
    fn test_gas_balances_towards_volume_share() {
        let mut a = room(0.0, 0.0);
        let mut b = room(210.0, 0.0);
        a.set_gas_percentage(100.0);
        b.set_gas_percentage(0.0);
        let total = a.gas() + b.gas();
        let config = GasConfig::default();
        for _ in 0..2_000 {
            balance_gas(&doorway(), &mut a, &mut b, 1.0 / 60.0, &config);
        }
        assert!((a.gas() - b.gas()).abs() < 1.0);
        assert!((a.gas() + b.gas() - total).abs() < 0.5);
    }

    #[test]
    fn test_gas_blocked_when_submerged() {
        let mut a = room(0.0, 21_000.0);
        let mut b = room(210.0, 21_000.0);
        b.set_gas(0.0);
        balance_gas(&doorway(), &mut a, &mut b, 1.0, &GasConfig::default());
        assert_eq!(b.gas(), 0.0);
    }

    #[test]
    fn test_blocker_follows_exterior_state() {
        let mut world = World::new();
        let mut physics = StaticBodies::new();
        let hull = world.spawn((room(0.0, 0.0),));
        let mut gap = Opening::new(Rect::new(-10.0, 100.0, 10.0, 100.0), VesselId(0), NetId(2));
        gap.links = crate::components::OpeningLinks::from_probes(Some(hull), None);
        let gap = world.spawn((gap,));

        maintain_exterior_blocker(&mut world, &mut physics, gap);
        assert_eq!(physics.count(BodyCategory::Blocker, BodyKind::Solid), 1);

        world.get::<&mut Opening>(gap).unwrap().set_open(0.0);
        maintain_exterior_blocker(&mut world, &mut physics, gap);
        assert!(physics.is_empty());
    }
}

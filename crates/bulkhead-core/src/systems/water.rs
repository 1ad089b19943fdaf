//! Compartment integration - gas decay and the surface wave, including waves
//! travelling through open doorways into the neighbouring compartment.

use hecs::{Entity, World};

use crate::components::{Compartment, Opening, WAVE_SPREAD, WAVE_WIDTH};
use crate::config::GasConfig;

/// Run `f` with two distinct compartments borrowed mutably at once.
///
/// `b` is lifted out of the world for the duration of the call so both can be
/// borrowed; returns `None` (without calling `f`) if either is gone.
pub(crate) fn with_compartment_pair<R>(
    world: &mut World,
    a: Entity,
    b: Entity,
    f: impl FnOnce(&mut Compartment, &mut Compartment) -> R,
) -> Option<R> {
    if a == b || !world.contains(a) {
        return None;
    }
    let mut second = world.remove_one::<Compartment>(b).ok()?;
    let result = match world.query_one_mut::<&mut Compartment>(a) {
        Ok(first) => Some(f(first, &mut second)),
        Err(_) => None,
    };
    if world.insert_one(b, second).is_err() {
        log::warn!("compartment {:?} vanished while borrowed", b);
    }
    result
}

/// Gas decay and wave integration for every compartment
pub fn compartment_system(world: &mut World, dt: f32, gas: &GasConfig) {
    for (_, compartment) in world.query_mut::<&mut Compartment>() {
        compartment.tick_gas(dt, gas.deterioration_speed);
        compartment.begin_wave_step(dt);
    }

    propagate_waves(world);

    for (_, compartment) in world.query_mut::<&mut Compartment>() {
        compartment.finish_wave_step(dt);
    }
}

/// Carry waves through open side-by-side doorways. Only the first linked
/// compartment drives the exchange, so each opening is applied once.
pub fn propagate_waves(world: &mut World) {
    let mut crossings: Vec<(crate::components::NetId, Entity, Entity, f32, f32, f32)> = world
        .query::<&Opening>()
        .iter()
        .filter(|(_, o)| o.is_horizontal() && o.is_room_to_room() && o.effective_open() > 0.0)
        .filter_map(|(_, o)| {
            let rect = o.rect();
            Some((
                o.net_id,
                o.links.first()?,
                o.links.second()?,
                o.effective_open(),
                rect.top(),
                rect.bottom(),
            ))
        })
        .collect();
    crossings.sort_by_key(|c| c.0);

    for (_, owner, other, open, top, bottom) in crossings {
        with_compartment_pair(world, owner, other, |a, b| {
            exchange_boundary_waves(a, b, open, top, bottom)
        });
    }
}

/// Couple `a`'s last wave cell to `b`'s first across an opening spanning
/// `bottom..top`. Does nothing unless both surfaces lie inside that span.
pub fn exchange_boundary_waves(a: &mut Compartment, b: &mut Compartment, open: f32, top: f32, bottom: f32) {
    if !a.is_update_active() {
        return;
    }
    let in_span = |s: f32| s >= bottom && s <= top;
    if !in_span(a.surface()) || !in_span(b.surface()) {
        return;
    }

    let surface_diff = (a.surface() - b.surface()) * open;
    let last = a.waves().len().saturating_sub(1);

    for _ in 0..2 {
        let right = WAVE_SPREAD * (b.waves().first() - a.waves().last() - surface_diff) * 0.5;
        a.waves_mut().add_velocity(last, right);
        a.waves_mut().add_height(last, right);

        let left = WAVE_SPREAD * (a.waves().last() - b.waves().first() + surface_diff) * 0.5;
        b.waves_mut().add_velocity(0, left);
        b.waves_mut().add_height(0, left);
    }

    if surface_diff.abs() < WAVE_WIDTH {
        b.waves_mut().set_height(0, surface_diff * 0.5);
        a.waves_mut().set_height(last, -surface_diff * 0.5);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{NetId, Rect, VesselId};

    #[test]
    fn test_pair_borrow_restores_second() {
        let mut world = World::new();
        let a = world.spawn((Compartment::new(Rect::new(0.0, 100.0, 100.0, 100.0), VesselId(0), NetId(1)),));
        let b = world.spawn((Compartment::new(Rect::new(100.0, 100.0, 100.0, 100.0), VesselId(0), NetId(2)),));

        let moved = with_compartment_pair(&mut world, a, b, |ca, cb| {
            ca.set_water(1_000.0);
            cb.set_water(2_000.0);
            3_000.0
        });
        assert_eq!(moved, Some(3_000.0));
        assert_eq!(world.get::<&Compartment>(a).unwrap().water(), 1_000.0);
        assert_eq!(world.get::<&Compartment>(b).unwrap().water(), 2_000.0);

        assert!(with_compartment_pair(&mut world, a, a, |_, _| ()).is_none());
    }

    #[test]
    fn test_pair_borrow_with_missing_first() {
        let mut world = World::new();
        let a = world.spawn((Compartment::new(Rect::new(0.0, 100.0, 100.0, 100.0), VesselId(0), NetId(1)),));
        let b = world.spawn((Compartment::new(Rect::new(100.0, 100.0, 100.0, 100.0), VesselId(0), NetId(2)),));
        world.despawn(a).unwrap();

        assert!(with_compartment_pair(&mut world, a, b, |_, _| ()).is_none());
        assert!(world.get::<&Compartment>(b).is_ok());
    }

    #[test]
    fn test_boundary_exchange_pins_small_steps() {
        let mut a = Compartment::new(Rect::new(0.0, 100.0, 100.0, 100.0), VesselId(0), NetId(1)).with_water(5_000.0);
        let mut b = Compartment::new(Rect::new(100.0, 100.0, 100.0, 100.0), VesselId(0), NetId(2)).with_water(4_000.0);
        exchange_boundary_waves(&mut a, &mut b, 1.0, 100.0, 0.0);

        // Surfaces at 50 and 40: the boundary cells meet halfway
        assert!((b.waves().first() - 5.0).abs() < 1e-4);
        assert!((a.waves().last() + 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_boundary_exchange_needs_surfaces_in_span() {
        let mut a = Compartment::new(Rect::new(0.0, 100.0, 100.0, 100.0), VesselId(0), NetId(1)).with_water(5_000.0);
        let mut b = Compartment::new(Rect::new(100.0, 100.0, 100.0, 100.0), VesselId(0), NetId(2)).with_water(4_000.0);
        exchange_boundary_waves(&mut a, &mut b, 1.0, 100.0, 60.0);
        assert_eq!(a.waves().last(), 0.0);
        assert_eq!(b.waves().first(), 0.0);
    }

    #[test]
    fn test_gas_decays_in_every_compartment() {
        let mut world = World::new();
        let a = world.spawn((Compartment::new(Rect::new(0.0, 100.0, 100.0, 100.0), VesselId(0), NetId(1)),));
        compartment_system(&mut world, 1.0, &GasConfig::default());
        let gas = world.get::<&Compartment>(a).unwrap().gas();
        assert!((gas - (10_000.0 - 0.3)).abs() < 1e-2);
    }
}

//! End-to-end scenarios driven through `SimulationEngine`.

use approx::{assert_abs_diff_eq, assert_relative_eq};
use bulkhead_core::persistence::SaveData;
use bulkhead_core::prelude::*;

const DT: f32 = 1.0 / 60.0;
const VESSEL: VesselId = VesselId(0);

fn logged_engine() -> SimulationEngine<StaticBodies, EventLog> {
    SimulationEngine::with_parts(SimConfig::default(), StaticBodies::new(), EventLog::new())
}

fn run<P: PhysicsWorld, O: SimObserver>(engine: &mut SimulationEngine<P, O>, seconds: f32) {
    let ticks = (seconds / DT).round() as usize;
    for _ in 0..ticks {
        engine.update(DT).unwrap();
    }
}

fn water_of<P: PhysicsWorld, O: SimObserver>(engine: &SimulationEngine<P, O>, compartment: hecs::Entity) -> f32 {
    engine.world.get::<&Compartment>(compartment).unwrap().water()
}

#[test]
fn test_side_by_side_rooms_equalise() {
    let mut engine = SimulationEngine::new();
    let left = engine.add_compartment(Rect::new(0.0, 100.0, 200.0, 100.0), VESSEL).unwrap();
    let right = engine.add_compartment(Rect::new(210.0, 100.0, 200.0, 100.0), VESSEL).unwrap();
    engine.add_opening(Rect::new(200.0, 100.0, 10.0, 100.0), VESSEL).unwrap();

    let volume = 20_000.0;
    engine.set_compartment_state(left, 0.8 * volume, 100.0).unwrap();
    let total = engine.total_water();

    for _ in 0..(30.0 / DT) as usize {
        engine.update(DT).unwrap();
        for room in [left, right] {
            let water = water_of(&engine, room);
            assert!(water >= 0.0);
            assert!(water <= volume * MAX_COMPRESS + 1e-2);
        }
    }

    let (l, r) = (water_of(&engine, left), water_of(&engine, right));
    assert!((l - r).abs() < 0.05 * volume, "left {} right {}", l, r);
    assert_relative_eq!(engine.total_water(), total, max_relative = 1e-3);
}

#[test]
fn test_breach_opens_once_at_leak_threshold() {
    let mut engine = logged_engine();
    engine.add_compartment(Rect::new(0.0, 96.0, 300.0, 96.0), VESSEL).unwrap();
    let wall = engine.add_wall(Rect::new(-16.0, 96.0, 16.0, 96.0), 100.0, 0.0, VESSEL).unwrap();

    let mut created_at = None;
    for step in 0..=50 {
        let update = engine.set_section_damage(wall, 0, step as f32).unwrap();
        if update.opening_created {
            assert!(created_at.is_none(), "opening created twice");
            created_at = Some(step);
        }
    }
    assert_eq!(created_at, Some(10));
    assert_eq!(engine.breach_count(), 1);
    assert_eq!(engine.observer.count(|e| matches!(e, SimEvent::BreachCreated { .. })), 1);

    let breach = engine
        .world
        .query::<&Opening>()
        .iter()
        .find(|(_, o)| o.wall.is_some())
        .map(|(_, o)| o.open())
        .unwrap();
    assert_abs_diff_eq!(breach, 0.35, epsilon = 1e-5);
}

#[test]
fn test_hull_breach_floods_and_crushes() {
    let mut engine = logged_engine();
    let room = engine.add_compartment(Rect::new(0.0, 96.0, 200.0, 96.0), VESSEL).unwrap();
    let wall = engine.add_wall(Rect::new(-16.0, 96.0, 16.0, 96.0), 100.0, 0.0, VESSEL).unwrap();

    engine.queue_damage(wall, 0, 100.0).unwrap();
    run(&mut engine, 10.0);

    let c = engine.world.get::<&Compartment>(room).unwrap();
    assert!(c.water() >= c.volume());
    assert!(c.water() <= c.water_ceiling() + 1e-2);
    assert!(c.lethal_pressure() > 30.0, "lethal pressure {}", c.lethal_pressure());
    assert_eq!(engine.observer.count(|e| matches!(e, SimEvent::Explosion { .. })), 1);
}

#[test]
fn test_repair_stops_flooding() {
    let mut engine = SimulationEngine::new();
    let room = engine.add_compartment(Rect::new(0.0, 96.0, 200.0, 96.0), VESSEL).unwrap();
    let wall = engine.add_wall(Rect::new(-16.0, 96.0, 16.0, 96.0), 100.0, 0.0, VESSEL).unwrap();

    engine.set_section_damage(wall, 0, 30.0).unwrap();
    run(&mut engine, 0.5);
    engine.set_section_damage(wall, 0, 0.0).unwrap();
    let after_repair = water_of(&engine, room);
    assert!(after_repair > 0.0);

    run(&mut engine, 2.0);
    assert_eq!(engine.breach_count(), 0);
    assert_abs_diff_eq!(water_of(&engine, room), after_repair, epsilon = 1e-3);
}

#[test]
fn test_fire_suffocates_in_thin_air() {
    let mut engine = logged_engine();
    let room = engine.add_compartment(Rect::new(0.0, 100.0, 400.0, 100.0), VESSEL).unwrap();
    let fire = engine.start_fire(room, Vec2::new(200.0, 0.0)).unwrap();

    let mut last_width = f32::MAX;
    let mut ticks = 0;
    while engine.world.contains(fire) {
        engine.set_compartment_state(room, 0.0, 5.0).unwrap();
        let width = engine.world.get::<&Combustion>(fire).unwrap().width();
        assert!(width < last_width, "fire grew from {} to {}", last_width, width);
        last_width = width;

        engine.update(DT).unwrap();
        ticks += 1;
        assert!(ticks < 600, "fire never went out");
    }

    assert_eq!(engine.fire_count(), 0);
    assert!(last_width < 1.0 + 0.1);
    assert_eq!(engine.observer.count(|e| *e == SimEvent::FireExtinguished { fire }), 1);
}

#[test]
fn test_extinguish_conserves_agent() {
    let mut engine = SimulationEngine::new();
    let room = engine.add_compartment(Rect::new(0.0, 100.0, 400.0, 100.0), VESSEL).unwrap();
    let fire = engine.start_fire(room, Vec2::new(200.0, 0.0)).unwrap();
    let width = engine.world.get::<&Combustion>(fire).unwrap().width();
    let before = water_of(&engine, room);

    let consumed = engine.extinguish(fire, width * 5.0).unwrap();

    assert_eq!(consumed, width);
    assert!(!engine.world.contains(fire));
    assert_relative_eq!(water_of(&engine, room), before + consumed);
}

#[test]
fn test_bounds_hold_under_mixed_load() {
    let mut engine = SimulationEngine::new();
    let upper = engine.add_compartment(Rect::new(0.0, 200.0, 200.0, 100.0), VESSEL).unwrap();
    let lower = engine.add_compartment(Rect::new(0.0, 100.0, 200.0, 100.0), VESSEL).unwrap();
    let side = engine.add_compartment(Rect::new(210.0, 100.0, 200.0, 100.0), VESSEL).unwrap();
    let hatch = engine.add_opening(Rect::new(80.0, 105.0, 40.0, 10.0), VESSEL).unwrap();
    let door = engine.add_opening(Rect::new(200.0, 100.0, 10.0, 100.0), VESSEL).unwrap();
    let hull = engine.add_wall(Rect::new(410.0, 100.0, 16.0, 100.0), 100.0, 0.0, VESSEL).unwrap();

    engine.set_compartment_state(upper, 15_000.0, 100.0).unwrap();
    engine.start_fire(lower, Vec2::new(100.0, 0.0)).unwrap();
    engine.start_fire(side, Vec2::new(300.0, 0.0)).unwrap();

    for tick in 0..900 {
        match tick {
            120 => engine.queue_damage(hull, 0, 70.0).unwrap(),
            300 => engine.set_opening_open(door, 0.3).unwrap(),
            450 => engine.set_door(hatch, Some(DoorState::closed())).unwrap(),
            600 => engine.queue_damage(hull, 0, -70.0).unwrap(),
            _ => {}
        }
        engine.update(DT).unwrap();

        for (_, c) in engine.world.query::<&Compartment>().iter() {
            assert!(c.water() >= 0.0 && c.water() <= c.water_ceiling() + 1e-2);
            assert!(c.gas() >= 0.0 && c.gas() <= c.volume() + 1e-2);
            assert!((0.0..=MAX_LETHAL_PRESSURE).contains(&c.lethal_pressure()));
        }
        for (_, o) in engine.world.query::<&Opening>().iter() {
            assert!((0.0..=1.0).contains(&o.open()));
        }
    }
}

#[test]
fn test_repeated_repair_keeps_single_breach() {
    let mut engine = SimulationEngine::new();
    engine.add_compartment(Rect::new(0.0, 96.0, 200.0, 96.0), VESSEL).unwrap();
    let wall = engine.add_wall(Rect::new(-16.0, 96.0, 16.0, 96.0), 100.0, 0.0, VESSEL).unwrap();
    let baseline = engine.ids_in_use();

    for _ in 0..20 {
        engine.set_section_damage(wall, 0, 0.0).unwrap();
        engine.set_section_damage(wall, 0, 40.0).unwrap();
        engine.update(DT).unwrap();
    }

    assert_eq!(engine.breach_count(), 1);
    assert_eq!(engine.ids_in_use(), baseline + 1);
}

#[test]
fn test_save_load_matches_state() {
    let mut engine = SimulationEngine::new();
    let left = engine.add_compartment(Rect::new(0.0, 192.0, 300.0, 192.0), VESSEL).unwrap();
    engine.add_compartment(Rect::new(310.0, 192.0, 300.0, 192.0), VESSEL).unwrap();
    engine.add_opening(Rect::new(300.0, 192.0, 10.0, 192.0), VESSEL).unwrap();
    let hull = engine.add_wall(Rect::new(-16.0, 192.0, 16.0, 192.0), 120.0, 20.0, VESSEL).unwrap();
    engine.add_character(Vec2::new(50.0, 10.0));
    engine.add_item(Vec2::new(80.0, 5.0), false);
    engine.start_fire(left, Vec2::new(150.0, 0.0)).unwrap();
    engine.set_section_damage(hull, 1, 80.0).unwrap();
    run(&mut engine, 2.0);

    let mut bytes = Vec::new();
    engine.save(&mut bytes).unwrap();
    let mut restored = SimulationEngine::new();
    restored.load(&bytes[..]).unwrap();

    let before = SaveData::capture(&engine.world, engine.sim_time, engine.tick);
    let after = SaveData::capture(&restored.world, restored.sim_time, restored.tick);

    assert_eq!(after.tick, before.tick);
    assert_eq!(after.compartments.len(), before.compartments.len());
    for (a, b) in after.compartments.iter().zip(&before.compartments) {
        assert_eq!(a.rect, b.rect);
        assert_abs_diff_eq!(a.water, b.water, epsilon = 1e-2);
        assert_abs_diff_eq!(a.gas_percentage, b.gas_percentage, epsilon = 1e-2);
        assert_eq!(a.fires.len(), b.fires.len());
    }
    for (a, b) in after.walls.iter().zip(&before.walls) {
        assert_eq!(a.damage, b.damage);
        assert_eq!(a.min_health, b.min_health);
    }
    assert_eq!(restored.breach_count(), engine.breach_count());
    assert_eq!(after.characters.len(), 1);
    assert_eq!(after.items.len(), 1);
}

#[test]
fn test_net_state_mirrors_compartment() {
    let mut server = SimulationEngine::new();
    let room = server.add_compartment(Rect::new(0.0, 100.0, 200.0, 100.0), VESSEL).unwrap();
    server.set_compartment_state(room, 10_000.0, 60.0).unwrap();
    server.start_fire(room, Vec2::new(100.0, 0.0)).unwrap();

    let mut client = SimulationEngine::new();
    let mirror = client.add_compartment(Rect::new(0.0, 100.0, 200.0, 100.0), VESSEL).unwrap();
    let bytes = server.net_state(room).unwrap().encode();
    let state = bulkhead_core::replication::CompartmentNetState::decode(&bytes).unwrap();
    let fires = client.apply_net_state(mirror, &state).unwrap();

    let c = client.world.get::<&Compartment>(mirror).unwrap();
    assert_abs_diff_eq!(c.water(), 10_000.0, epsilon = 100.0);
    assert_abs_diff_eq!(c.gas_percentage(), 60.0, epsilon = 0.5);
    assert_eq!(fires.len(), 1);
}

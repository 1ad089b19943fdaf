//! Bulkhead Headless Simulation Harness
//!
//! Drives the test vessel through flooding, hull breach and fire scenarios.
//! Runs entirely in-process, with the built-in static collider set standing
//! in for a host physics engine.
//!
//! Usage:
//!   cargo run -p bulkhead-simtest
//!   cargo run -p bulkhead-simtest -- --verbose

use bulkhead_core::persistence::SaveData;
use bulkhead_core::prelude::*;
use bulkhead_core::replication::{CompartmentNetState, MAX_NET_FIRES};
use hecs::Entity;

// ── Vessel layout (same JSON a host would ship) ─────────────────────────
const VESSEL_JSON: &str = include_str!("../../../data/test_vessel.json");

const DT: f32 = 1.0 / 60.0;

// Indices into the layout's lists
const BRIDGE: usize = 0;
const ENGINE_ROOM: usize = 1;
const CARGO: usize = 2;
const PORT_HULL: usize = 0;
const HATCH: usize = 0;
const CARGO_DOOR: usize = 1;

type Engine = SimulationEngine<StaticBodies, EventLog>;

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

fn main() {
    let verbose = std::env::args().any(|a| a == "--verbose");
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if verbose { "debug" } else { "warn" }),
    )
    .init();
    println!("=== Bulkhead Simulation Harness ===\n");

    let layout = match VesselLayout::from_json_str(VESSEL_JSON) {
        Ok(layout) => layout,
        Err(e) => {
            println!("  ✗ layout_parse: {}", e);
            std::process::exit(1);
        }
    };

    log::info!("loaded layout '{}' ({} compartments)", layout.name, layout.compartments.len());
    if verbose {
        if let Ok(json) = serde_json::to_string_pretty(&SimConfig::default()) {
            println!("Default tunables:\n{}\n", json);
        }
    }

    let mut results = Vec::new();

    // 1. Layout loading and topology
    results.extend(validate_layout(&layout, verbose));

    // 2. Water equalisation through a door
    results.extend(validate_equalisation(&layout, verbose));

    // 3. Hull breach flooding
    results.extend(validate_hull_breach(&layout, verbose));

    // 4. Breach repair
    results.extend(validate_breach_repair(&layout, verbose));

    // 5. Fire growth, spread and suffocation
    results.extend(validate_fire(&layout, verbose));

    // 6. Save / load
    results.extend(validate_save_load(&layout, verbose));

    // 7. Replication codec
    results.extend(validate_replication(&layout, verbose));

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn spawn_vessel(layout: &VesselLayout, config: SimConfig) -> Result<(Engine, VesselHandles), SimError> {
    let mut engine = SimulationEngine::with_parts(config, StaticBodies::new(), EventLog::new());
    let handles = engine.load_layout(layout)?;
    Ok((engine, handles))
}

fn run(engine: &mut Engine, seconds: f32) -> Result<(), SimError> {
    let ticks = (seconds / DT).round() as usize;
    for _ in 0..ticks {
        engine.update(DT)?;
    }
    Ok(())
}

fn setup_failed(name: &str, error: SimError) -> Vec<TestResult> {
    vec![TestResult {
        name: name.into(),
        passed: false,
        detail: format!("setup failed: {}", error),
    }]
}

/// Water in a compartment, NaN if the entity is gone
fn water(engine: &Engine, compartment: Entity) -> f32 {
    engine
        .world
        .get::<&Compartment>(compartment)
        .map(|c| c.water())
        .unwrap_or(f32::NAN)
}

fn depth(engine: &Engine, compartment: Entity) -> f32 {
    engine
        .world
        .get::<&Compartment>(compartment)
        .map(|c| c.water() / c.rect().width)
        .unwrap_or(f32::NAN)
}

fn lethal_pressure(engine: &Engine, compartment: Entity) -> f32 {
    engine
        .world
        .get::<&Compartment>(compartment)
        .map(|c| c.lethal_pressure())
        .unwrap_or(f32::NAN)
}

/// Every compartment within its water and gas bounds
fn bounds_hold(engine: &Engine) -> bool {
    engine.world.query::<&Compartment>().iter().all(|(_, c)| {
        c.water() >= 0.0
            && c.water() <= c.water_ceiling() + 1e-2
            && c.gas() >= 0.0
            && c.gas() <= c.volume() + 1e-2
    })
}

// ── 1. Layout ───────────────────────────────────────────────────────────

fn validate_layout(layout: &VesselLayout, verbose: bool) -> Vec<TestResult> {
    println!("--- Vessel Layout ---");
    let mut results = Vec::new();

    let (engine, handles) = match spawn_vessel(layout, SimConfig::default()) {
        Ok(v) => v,
        Err(e) => return setup_failed("layout_load", e),
    };

    results.push(TestResult {
        name: "layout_counts".into(),
        passed: engine.compartment_count() == 3 && engine.wall_count() == 2 && engine.opening_count() == 2,
        detail: format!(
            "{} compartments, {} walls, {} openings",
            engine.compartment_count(),
            engine.wall_count(),
            engine.opening_count()
        ),
    });

    let linked = |opening: Entity| {
        engine
            .world
            .get::<&Opening>(opening)
            .map(|o| o.is_room_to_room())
            .unwrap_or(false)
    };
    results.push(TestResult {
        name: "layout_openings_linked".into(),
        passed: linked(handles.openings[HATCH]) && linked(handles.openings[CARGO_DOOR]),
        detail: "hatch and cargo door both join two compartments".into(),
    });

    results.push(TestResult {
        name: "layout_ids_allocated".into(),
        passed: engine.ids_in_use() == 7,
        detail: format!("{} net ids in use", engine.ids_in_use()),
    });

    results.push(TestResult {
        name: "layout_occupants".into(),
        passed: handles.characters.len() == 2 && handles.items.len() == 2,
        detail: format!("{} characters, {} items", handles.characters.len(), handles.items.len()),
    });

    if verbose {
        for (i, &c) in handles.compartments.iter().enumerate() {
            if let Ok(c) = engine.world.get::<&Compartment>(c) {
                println!("    compartment {}: {:?}, {} openings", i, c.rect(), c.openings.len());
            }
        }
    }

    results
}

// ── 2. Equalisation ─────────────────────────────────────────────────────

fn validate_equalisation(layout: &VesselLayout, _verbose: bool) -> Vec<TestResult> {
    println!("--- Equalisation ---");
    let mut results = Vec::new();

    let (mut engine, handles) = match spawn_vessel(layout, SimConfig::default()) {
        Ok(v) => v,
        Err(e) => return setup_failed("equalise_setup", e),
    };
    let engine_room = handles.compartments[ENGINE_ROOM];
    let cargo = handles.compartments[CARGO];

    if let Err(e) = engine.set_compartment_state(engine_room, 16_000.0, 100.0) {
        return setup_failed("equalise_setup", e);
    }
    let total = engine.total_water();

    let mut in_bounds = true;
    for _ in 0..(30.0 / DT) as usize {
        if let Err(e) = engine.update(DT) {
            return setup_failed("equalise_run", e);
        }
        in_bounds &= bounds_hold(&engine);
    }

    let (d1, d2) = (depth(&engine, engine_room), depth(&engine, cargo));
    results.push(TestResult {
        name: "equalise_levels_converge".into(),
        passed: (d1 - d2).abs() < 5.0,
        detail: format!("engine room depth {:.1}, cargo depth {:.1}", d1, d2),
    });

    let drift = (engine.total_water() - total).abs() / total;
    results.push(TestResult {
        name: "equalise_mass_conserved".into(),
        passed: drift < 1e-3,
        detail: format!("relative drift {:.2e}", drift),
    });

    results.push(TestResult {
        name: "equalise_bounds".into(),
        passed: in_bounds,
        detail: "water and gas stayed within bounds every tick".into(),
    });

    results
}

// ── 3. Hull breach ──────────────────────────────────────────────────────

fn validate_hull_breach(layout: &VesselLayout, verbose: bool) -> Vec<TestResult> {
    println!("--- Hull Breach ---");
    let mut results = Vec::new();

    let (mut engine, handles) = match spawn_vessel(layout, SimConfig::default()) {
        Ok(v) => v,
        Err(e) => return setup_failed("breach_setup", e),
    };
    let engine_room = handles.compartments[ENGINE_ROOM];
    let cargo = handles.compartments[CARGO];

    // Seal the hatch so the bridge stays dry and crush pressure can build below
    let setup = engine
        .set_opening_open(handles.openings[HATCH], 0.0)
        .and_then(|_| engine.queue_damage(handles.walls[PORT_HULL], 1, 100.0));
    if let Err(e) = setup {
        return setup_failed("breach_setup", e);
    }

    let mut in_bounds = true;
    for _ in 0..(15.0 / DT) as usize {
        if let Err(e) = engine.update(DT) {
            return setup_failed("breach_run", e);
        }
        in_bounds &= bounds_hold(&engine);
    }

    results.push(TestResult {
        name: "breach_single_opening".into(),
        passed: engine.breach_count() == 1,
        detail: format!("{} breaches", engine.breach_count()),
    });

    let explosions = engine.observer.count(|e| matches!(e, SimEvent::Explosion { .. }));
    results.push(TestResult {
        name: "breach_single_explosion".into(),
        passed: explosions == 1,
        detail: format!("{} explosions", explosions),
    });

    let flooded = [engine_room, cargo].iter().all(|&c| {
        engine
            .world
            .get::<&Compartment>(c)
            .map(|c| c.is_full())
            .unwrap_or(false)
    });
    results.push(TestResult {
        name: "breach_floods_deck".into(),
        passed: flooded,
        detail: format!(
            "engine room {:.0}, cargo {:.0}",
            water(&engine, engine_room),
            water(&engine, cargo)
        ),
    });

    let lethal = lethal_pressure(&engine, engine_room);
    results.push(TestResult {
        name: "breach_lethal_pressure".into(),
        passed: lethal > 10.0,
        detail: format!("lethal pressure {:.1}", lethal),
    });

    results.push(TestResult {
        name: "breach_bounds".into(),
        passed: in_bounds,
        detail: "water and gas stayed within bounds every tick".into(),
    });

    if verbose {
        println!("    bridge water after breach: {:.0}", water(&engine, handles.compartments[BRIDGE]));
    }

    results
}

// ── 4. Breach repair ────────────────────────────────────────────────────

fn validate_breach_repair(layout: &VesselLayout, _verbose: bool) -> Vec<TestResult> {
    println!("--- Breach Repair ---");
    let mut results = Vec::new();

    let (mut engine, handles) = match spawn_vessel(layout, SimConfig::default()) {
        Ok(v) => v,
        Err(e) => return setup_failed("repair_setup", e),
    };
    let hull = handles.walls[PORT_HULL];

    let leak = engine
        .set_section_damage(hull, 1, 30.0)
        .and_then(|_| run(&mut engine, 1.0))
        .and_then(|_| engine.set_section_damage(hull, 1, 0.0));
    let repaired = match leak {
        Ok(update) => update,
        Err(e) => return setup_failed("repair_run", e),
    };

    results.push(TestResult {
        name: "repair_removes_opening".into(),
        passed: repaired.opening_removed && engine.breach_count() == 0,
        detail: format!("{} breaches after repair", engine.breach_count()),
    });

    let removed = engine.observer.count(|e| matches!(e, SimEvent::BreachRemoved { .. }));
    results.push(TestResult {
        name: "repair_event".into(),
        passed: removed == 1,
        detail: format!("{} breach_removed events", removed),
    });

    let total = engine.total_water();
    if let Err(e) = run(&mut engine, 3.0) {
        return setup_failed("repair_run", e);
    }
    let drift = (engine.total_water() - total).abs() / total.max(1.0);
    results.push(TestResult {
        name: "repair_stops_inflow".into(),
        passed: total > 0.0 && drift < 1e-3,
        detail: format!("{:.0} water aboard, drift {:.2e}", total, drift),
    });

    results
}

// ── 5. Fire ─────────────────────────────────────────────────────────────

fn validate_fire(layout: &VesselLayout, verbose: bool) -> Vec<TestResult> {
    println!("--- Fire ---");
    let mut results = Vec::new();

    let mut config = SimConfig::default();
    config.fire.spread_probability = 1.0;
    let (mut engine, handles) = match spawn_vessel(layout, config) {
        Ok(v) => v,
        Err(e) => return setup_failed("fire_setup", e),
    };
    let engine_room = handles.compartments[ENGINE_ROOM];
    let cargo = handles.compartments[CARGO];

    let fire = match engine
        .start_fire(engine_room, Vec2::new(195.0, 0.0))
        .and_then(|fire| run(&mut engine, 3.0).map(|_| fire))
    {
        Ok(fire) => fire,
        Err(e) => return setup_failed("fire_run", e),
    };

    let width = engine
        .world
        .get::<&Combustion>(fire)
        .map(|f| f.width())
        .unwrap_or(0.0);
    results.push(TestResult {
        name: "fire_grows".into(),
        passed: width > INITIAL_FIRE_SIZE,
        detail: format!("width {:.1} after 3s", width),
    });

    let gas = engine
        .world
        .get::<&Compartment>(engine_room)
        .map(|c| c.gas_percentage())
        .unwrap_or(f32::NAN);
    results.push(TestResult {
        name: "fire_consumes_gas".into(),
        passed: gas < 100.0,
        detail: format!("engine room gas {:.1}%", gas),
    });

    let spread = engine.observer.count(|e| matches!(e, SimEvent::FireSpread { .. }));
    let cargo_fires = engine
        .world
        .get::<&Compartment>(cargo)
        .map(|c| c.fires.len())
        .unwrap_or(0);
    results.push(TestResult {
        name: "fire_spreads_through_door".into(),
        passed: spread > 0 && cargo_fires > 0,
        detail: format!("{} spread events, {} fires in cargo", spread, cargo_fires),
    });

    // Shut the door and starve every compartment of air
    if let Err(e) = engine.set_door(handles.openings[CARGO_DOOR], Some(DoorState::closed())) {
        return setup_failed("fire_smother", e);
    }
    let mut seconds = 0.0;
    while engine.fire_count() > 0 && seconds < 30.0 {
        for &c in &handles.compartments {
            let w = water(&engine, c);
            if let Err(e) = engine.set_compartment_state(c, w, 5.0) {
                return setup_failed("fire_smother", e);
            }
        }
        if let Err(e) = engine.update(DT) {
            return setup_failed("fire_smother", e);
        }
        seconds += DT;
    }
    results.push(TestResult {
        name: "fire_suffocates".into(),
        passed: engine.fire_count() == 0,
        detail: format!("{} fires left after {:.1}s at 5% gas", engine.fire_count(), seconds),
    });

    let started = engine.observer.count(|e| matches!(e, SimEvent::FireStarted { .. }));
    let extinguished = engine.observer.count(|e| matches!(e, SimEvent::FireExtinguished { .. }));
    results.push(TestResult {
        name: "fire_events_balanced".into(),
        passed: extinguished > 0 && extinguished <= started,
        detail: format!("{} started, {} extinguished", started, extinguished),
    });

    if verbose {
        let burns = engine.observer.count(|e| matches!(e, SimEvent::CharacterBurned { .. }));
        println!("    character burn events: {}", burns);
    }

    results
}

// ── 6. Save / Load ──────────────────────────────────────────────────────

fn validate_save_load(layout: &VesselLayout, _verbose: bool) -> Vec<TestResult> {
    println!("--- Save / Load ---");
    let mut results = Vec::new();

    let (mut engine, handles) = match spawn_vessel(layout, SimConfig::default()) {
        Ok(v) => v,
        Err(e) => return setup_failed("save_setup", e),
    };
    let setup = engine
        .set_section_damage(handles.walls[PORT_HULL], 1, 70.0)
        .and_then(|_| engine.start_fire(handles.compartments[CARGO], Vec2::new(300.0, 0.0)))
        .and_then(|_| run(&mut engine, 5.0));
    if let Err(e) = setup {
        return setup_failed("save_setup", e);
    }

    let mut bytes = Vec::new();
    if let Err(e) = engine.save(&mut bytes) {
        results.push(TestResult {
            name: "save_write".into(),
            passed: false,
            detail: format!("{}", e),
        });
        return results;
    }

    let mut restored = SimulationEngine::new();
    if let Err(e) = restored.load(&bytes[..]) {
        results.push(TestResult {
            name: "save_read".into(),
            passed: false,
            detail: format!("{}", e),
        });
        return results;
    }

    let before = SaveData::capture(&engine.world, engine.sim_time, engine.tick);
    let after = SaveData::capture(&restored.world, restored.sim_time, restored.tick);

    let water_match = before
        .compartments
        .iter()
        .zip(&after.compartments)
        .all(|(a, b)| (a.water - b.water).abs() < 1e-2 && (a.gas_percentage - b.gas_percentage).abs() < 1e-2);
    results.push(TestResult {
        name: "save_compartments_match".into(),
        passed: before.compartments.len() == after.compartments.len() && water_match,
        detail: format!("{} compartments, {} bytes", after.compartments.len(), bytes.len()),
    });

    let damage_match = before
        .walls
        .iter()
        .zip(&after.walls)
        .all(|(a, b)| a.damage == b.damage);
    results.push(TestResult {
        name: "save_breaches_rebuilt".into(),
        passed: damage_match && restored.breach_count() == engine.breach_count(),
        detail: format!("{} breaches restored", restored.breach_count()),
    });

    results.push(TestResult {
        name: "save_fires_match".into(),
        passed: restored.fire_count() == engine.fire_count() && restored.tick == engine.tick,
        detail: format!("{} fires at tick {}", restored.fire_count(), restored.tick),
    });

    results
}

// ── 7. Replication ──────────────────────────────────────────────────────

fn validate_replication(layout: &VesselLayout, _verbose: bool) -> Vec<TestResult> {
    println!("--- Replication ---");
    let mut results = Vec::new();

    let (mut engine, handles) = match spawn_vessel(layout, SimConfig::default()) {
        Ok(v) => v,
        Err(e) => return setup_failed("net_setup", e),
    };
    let engine_room = handles.compartments[ENGINE_ROOM];
    let state = engine
        .set_compartment_state(engine_room, 12_000.0, 40.0)
        .and_then(|_| engine.start_fire(engine_room, Vec2::new(100.0, 0.0)))
        .and_then(|_| engine.net_state(engine_room));
    let state = match state {
        Ok(state) => state,
        Err(e) => return setup_failed("net_setup", e),
    };

    let bytes = state.encode();
    results.push(TestResult {
        name: "net_encoded_size".into(),
        passed: bytes.len() == 3 + 3 * state.fires.len(),
        detail: format!("{} bytes for {} fires", bytes.len(), state.fires.len()),
    });

    let decoded = CompartmentNetState::decode(&bytes);
    let close = decoded.as_ref().is_ok_and(|d| {
        (d.water_fraction - state.water_fraction).abs() < 0.01
            && (d.gas_percentage - state.gas_percentage).abs() < 0.5
            && d.fires.len() == state.fires.len()
    });
    results.push(TestResult {
        name: "net_decode_matches".into(),
        passed: close,
        detail: format!("water fraction {:.3}", state.water_fraction),
    });

    // Hostile input: oversized count, out-of-range fire positions
    let mut hostile = vec![255, 255, 200];
    hostile.extend(std::iter::repeat(255).take(MAX_NET_FIRES * 3));
    let clamped = CompartmentNetState::decode(&hostile).is_ok_and(|d| {
        d.fires.len() == MAX_NET_FIRES && d.fires.iter().all(|f| f.x <= 0.95 && f.y <= 0.95)
    });
    results.push(TestResult {
        name: "net_decode_clamps".into(),
        passed: clamped,
        detail: format!("fire count capped at {}", MAX_NET_FIRES),
    });

    results.push(TestResult {
        name: "net_truncated_rejected".into(),
        passed: CompartmentNetState::decode(&bytes[..2]).is_err(),
        detail: "2-byte buffer rejected".into(),
    });

    results
}

//! Effects observer - where the pure simulation hands events to the host.
//!
//! Hosts implement [`SimObserver`] to play sounds, spawn particles, apply
//! damage to their own character/item models or forward state over the
//! network. Every method defaults to doing nothing.

use hecs::Entity;

use crate::components::Vec2;

pub trait SimObserver {
    /// A wall section started leaking
    fn breach_created(&mut self, _opening: Entity, _position: Vec2) {}

    /// A breach was repaired and its opening removed
    fn breach_removed(&mut self, _opening: Entity) {}

    /// One-shot blast at a sudden exterior breach
    fn explosion(&mut self, _position: Vec2, _radius: f32, _strength: f32) {}

    fn fire_started(&mut self, _fire: Entity, _compartment: Entity) {}

    /// A fire jumped through `opening` into another compartment
    fn fire_spread(&mut self, _from: Entity, _to: Entity, _opening: Entity) {}

    /// The fire went out and was removed
    fn fire_extinguished(&mut self, _fire: Entity) {}

    /// Flood water reduced a fire by `amount` width
    fn water_extinguished(&mut self, _fire: Entity, _amount: f32) {}

    fn character_burned(&mut self, _character: Entity, _limb: u8, _amount: f32) {}

    fn item_damaged(&mut self, _item: Entity, _amount: f32) {}

    /// The item burned up; it has already been despawned
    fn item_caught_fire(&mut self, _item: Entity) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl SimObserver for NullObserver {}

/// Everything an observer can be told, as data
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    BreachCreated { opening: Entity, position: Vec2 },
    BreachRemoved { opening: Entity },
    Explosion { position: Vec2, radius: f32, strength: f32 },
    FireStarted { fire: Entity, compartment: Entity },
    FireSpread { from: Entity, to: Entity, opening: Entity },
    FireExtinguished { fire: Entity },
    WaterExtinguished { fire: Entity, amount: f32 },
    CharacterBurned { character: Entity, limb: u8, amount: f32 },
    ItemDamaged { item: Entity, amount: f32 },
    ItemCaughtFire { item: Entity },
}

/// Observer that records every event, for tests and replays
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    pub events: Vec<SimEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&SimEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl SimObserver for EventLog {
    fn breach_created(&mut self, opening: Entity, position: Vec2) {
        self.events.push(SimEvent::BreachCreated { opening, position });
    }

    fn breach_removed(&mut self, opening: Entity) {
        self.events.push(SimEvent::BreachRemoved { opening });
    }

    fn explosion(&mut self, position: Vec2, radius: f32, strength: f32) {
        self.events.push(SimEvent::Explosion {
            position,
            radius,
            strength,
        });
    }

    fn fire_started(&mut self, fire: Entity, compartment: Entity) {
        self.events.push(SimEvent::FireStarted { fire, compartment });
    }

    fn fire_spread(&mut self, from: Entity, to: Entity, opening: Entity) {
        self.events.push(SimEvent::FireSpread { from, to, opening });
    }

    fn fire_extinguished(&mut self, fire: Entity) {
        self.events.push(SimEvent::FireExtinguished { fire });
    }

    fn water_extinguished(&mut self, fire: Entity, amount: f32) {
        self.events.push(SimEvent::WaterExtinguished { fire, amount });
    }

    fn character_burned(&mut self, character: Entity, limb: u8, amount: f32) {
        self.events.push(SimEvent::CharacterBurned {
            character,
            limb,
            amount,
        });
    }

    fn item_damaged(&mut self, item: Entity, amount: f32) {
        self.events.push(SimEvent::ItemDamaged { item, amount });
    }

    fn item_caught_fire(&mut self, item: Entity) {
        self.events.push(SimEvent::ItemCaughtFire { item });
    }
}

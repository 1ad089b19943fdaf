//! Opening component - a gap joining two compartments, or one compartment
//! and the water outside.

use hecs::Entity;
use serde::{Deserialize, Serialize};

use super::{NetId, Rect, Vec2, VesselId};
use crate::physics::BodyHandle;

/// Largest flow force component an opening can exert
pub const MAX_FLOW_FORCE: f32 = 500.0;
/// Seconds after opening during which a stronger raw force bypasses smoothing
pub const OPENED_FORCE_WINDOW: f32 = 1.0;
/// Distance over which an opening's flow force fades out
pub const FLOW_FORCE_RANGE: f32 = 500.0;
/// Below this effective openness a doorway counts as shut for reachability
pub const PASSABLE_OPEN: f32 = 0.1;

/// State of a door fitted into an opening
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DoorState {
    /// 0 = shut, 1 = fully open
    pub open_state: f32,
    /// A broken door no longer restricts the opening
    pub broken: bool,
}

impl DoorState {
    pub fn closed() -> Self {
        Self {
            open_state: 0.0,
            broken: false,
        }
    }

    pub fn open() -> Self {
        Self {
            open_state: 1.0,
            broken: false,
        }
    }
}

/// The wall section that spawned (and owns) a breach
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallSectionRef {
    pub wall: Entity,
    pub section: usize,
}

/// Up to two distinct linked compartments; the first slot is always filled
/// before the second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpeningLinks([Option<Entity>; 2]);

impl OpeningLinks {
    pub fn none() -> Self {
        Self([None, None])
    }

    /// Build from probe results, compacting and refusing self-links
    pub fn from_probes(first: Option<Entity>, second: Option<Entity>) -> Self {
        match (first, second) {
            (Some(a), Some(b)) if a == b => Self::none(),
            (None, Some(b)) => Self([Some(b), None]),
            (a, b) => Self([a, b]),
        }
    }

    pub fn first(&self) -> Option<Entity> {
        self.0[0]
    }

    pub fn second(&self) -> Option<Entity> {
        self.0[1]
    }

    pub fn count(&self) -> usize {
        self.0.iter().filter(|l| l.is_some()).count()
    }

    pub fn is_inert(&self) -> bool {
        self.count() == 0
    }

    pub fn is_room_to_room(&self) -> bool {
        self.count() == 2
    }

    pub fn is_room_to_exterior(&self) -> bool {
        self.count() == 1
    }

    pub fn contains(&self, compartment: Entity) -> bool {
        self.0.contains(&Some(compartment))
    }

    /// The compartment on the other side of `from`, if any
    pub fn other(&self, from: Entity) -> Option<Entity> {
        match self.0 {
            [Some(a), Some(b)] if a == from => Some(b),
            [Some(a), Some(b)] if b == from => Some(a),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.0.iter().flatten().copied()
    }
}

/// A connective edge of the compartment graph
#[derive(Debug, Clone)]
pub struct Opening {
    pub net_id: NetId,
    pub vessel: VesselId,
    rect: Rect,
    is_horizontal: bool,
    open: f32,
    opened_timer: f32,
    pub links: OpeningLinks,
    pub door: Option<DoorState>,
    pub wall: Option<WallSectionRef>,
    /// Raw force computed by the last flow step
    pub flow_force: Vec2,
    /// Smoothed force handed to physics
    pub lerped_flow_force: Vec2,
    /// Compartment water flowed into during the last step
    pub flow_target: Option<Entity>,
    pub(crate) exterior_blocker: Option<BodyHandle>,
    pub(crate) links_dirty: bool,
}

impl Opening {
    /// Fully open gap; a gap taller than wide joins left and right neighbours
    pub fn new(rect: Rect, vessel: VesselId, net_id: NetId) -> Self {
        Self::with_orientation(rect, rect.width < rect.height, vessel, net_id)
    }

    pub fn with_orientation(rect: Rect, is_horizontal: bool, vessel: VesselId, net_id: NetId) -> Self {
        Self {
            net_id,
            vessel,
            rect,
            is_horizontal,
            open: 1.0,
            opened_timer: OPENED_FORCE_WINDOW,
            links: OpeningLinks::none(),
            door: None,
            wall: None,
            flow_force: Vec2::ZERO,
            lerped_flow_force: Vec2::ZERO,
            flow_target: None,
            exterior_blocker: None,
            links_dirty: true,
        }
    }

    pub fn with_open(mut self, open: f32) -> Self {
        self.set_open(open);
        self
    }

    pub fn with_door(mut self, door: DoorState) -> Self {
        self.door = Some(door);
        self
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Move the opening; links are re-resolved on the next tick
    pub fn set_rect(&mut self, rect: Rect) -> bool {
        if !rect.is_finite() {
            log::warn!("rejected non-finite rect for opening {}", self.net_id.0);
            return false;
        }
        self.rect = rect;
        self.links_dirty = true;
        true
    }

    /// True when the gap sits in a vertical wall and water flows sideways
    pub fn is_horizontal(&self) -> bool {
        self.is_horizontal
    }

    /// Extent across which water passes
    pub fn size(&self) -> f32 {
        if self.is_horizontal {
            self.rect.height
        } else {
            self.rect.width
        }
    }

    pub fn open(&self) -> f32 {
        self.open
    }

    /// Set openness; returns false if the value was rejected
    pub fn set_open(&mut self, open: f32) -> bool {
        if !open.is_finite() {
            log::warn!("rejected non-finite open value for opening {}", self.net_id.0);
            return false;
        }
        let open = open.clamp(0.0, 1.0);
        if open > self.open {
            self.opened_timer = OPENED_FORCE_WINDOW;
        }
        self.open = open;
        true
    }

    /// Openness after the door (if any) has had its say
    pub fn effective_open(&self) -> f32 {
        match self.door {
            Some(door) if !door.broken => self.open.min(door.open_state.clamp(0.0, 1.0)),
            _ => self.open,
        }
    }

    /// Whether something can travel through: an intact door must be at least
    /// slightly open, otherwise any openness will do
    pub fn is_passable(&self) -> bool {
        match self.door {
            Some(door) if !door.broken => door.open_state >= PASSABLE_OPEN && self.open > 0.0,
            _ => self.open > 0.0,
        }
    }

    pub fn is_room_to_room(&self) -> bool {
        self.links.is_room_to_room()
    }

    pub fn is_room_to_exterior(&self) -> bool {
        self.links.is_room_to_exterior()
    }

    /// Clamp the raw force and blend it into the smoothed one
    pub fn update_flow_force(&mut self, raw: Vec2, dt: f32) {
        let raw = Vec2::new(
            raw.x.clamp(-MAX_FLOW_FORCE, MAX_FLOW_FORCE),
            raw.y.clamp(-MAX_FLOW_FORCE, MAX_FLOW_FORCE),
        );
        self.flow_force = raw;
        if self.opened_timer > 0.0 && raw.length_squared() > self.lerped_flow_force.length_squared() {
            self.lerped_flow_force = raw;
        } else {
            self.lerped_flow_force = self.lerped_flow_force.lerp(raw, (dt * 5.0).min(1.0));
        }
        self.opened_timer -= dt;
    }

    /// Inert openings let nothing through and keep no force
    pub fn reset_flow(&mut self) {
        self.flow_force = Vec2::ZERO;
        self.lerped_flow_force = Vec2::ZERO;
        self.flow_target = None;
    }

    /// Force this opening exerts on a floating body at `position`
    pub fn force_at(&self, position: Vec2) -> Vec2 {
        if self.lerped_flow_force.length_squared() < 0.0001 {
            return Vec2::ZERO;
        }
        let falloff = (1.0 - self.rect.center().distance(&position) / FLOW_FORCE_RANGE).max(0.0);
        self.lerped_flow_force * falloff
    }
}

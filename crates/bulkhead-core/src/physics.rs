//! Rigid-body physics seam.
//!
//! The simulation never resolves collisions itself. It asks the host's
//! physics engine for static rectangles and ray queries through
//! [`PhysicsWorld`]. [`StaticBodies`] is a small in-memory implementation
//! for hosts without an engine, the test-suite and the harness.

use serde::{Deserialize, Serialize};

use crate::components::{Rect, Vec2};

/// Opaque handle to a body owned by the physics engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Collides with everything
    Solid,
    /// Detects overlap but never blocks
    Sensor,
}

/// What a body is, for query filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyCategory {
    /// Wall-section colliders and wall sensors
    Wall,
    /// Blockers behind room-to-exterior openings
    Blocker,
    /// Terrain and anything else outside the vessel
    Level,
}

/// Which bodies a query may hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionFilter {
    pub walls: bool,
    pub blockers: bool,
    pub level: bool,
    pub include_sensors: bool,
}

impl CollisionFilter {
    pub const SOLID_WALLS: Self = Self {
        walls: true,
        blockers: false,
        level: false,
        include_sensors: false,
    };

    pub const LEVEL: Self = Self {
        walls: false,
        blockers: false,
        level: true,
        include_sensors: false,
    };

    pub const ALL: Self = Self {
        walls: true,
        blockers: true,
        level: true,
        include_sensors: true,
    };

    pub fn accepts(&self, category: BodyCategory, kind: BodyKind) -> bool {
        if kind == BodyKind::Sensor && !self.include_sensors {
            return false;
        }
        match category {
            BodyCategory::Wall => self.walls,
            BodyCategory::Blocker => self.blockers,
            BodyCategory::Level => self.level,
        }
    }
}

/// Request for a new static rectangle; `position` is the centre
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyDesc {
    pub position: Vec2,
    pub size: Vec2,
    pub rotation: f32,
    pub kind: BodyKind,
    pub category: BodyCategory,
}

impl BodyDesc {
    /// Axis-aligned body covering `rect`
    pub fn from_rect(rect: Rect, kind: BodyKind, category: BodyCategory) -> Self {
        Self {
            position: rect.center(),
            size: rect.size(),
            rotation: 0.0,
            kind,
            category,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub body: BodyHandle,
    pub point: Vec2,
    /// 0 at the ray start, 1 at its end
    pub fraction: f32,
}

/// Operations the simulation needs from a physics engine
pub trait PhysicsWorld {
    fn create_rect_body(&mut self, desc: BodyDesc) -> BodyHandle;

    fn remove_body(&mut self, handle: BodyHandle);

    /// First body hit along the segment
    fn raycast(&self, start: Vec2, end: Vec2, filter: CollisionFilter) -> Option<RayHit>;

    /// Every body hit along the segment, nearest first
    fn query_segment(&self, start: Vec2, end: Vec2, filter: CollisionFilter) -> Vec<RayHit>;
}

#[derive(Debug, Clone)]
struct StaticBody {
    handle: BodyHandle,
    rect: Rect,
    kind: BodyKind,
    category: BodyCategory,
}

/// Axis-aligned static bodies with brute-force ray tests.
///
/// Rotation is ignored: every body the simulation creates is axis-aligned.
#[derive(Debug, Clone, Default)]
pub struct StaticBodies {
    bodies: Vec<StaticBody>,
    next_handle: u32,
}

impl StaticBodies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.bodies.iter().any(|b| b.handle == handle)
    }

    pub fn count(&self, category: BodyCategory, kind: BodyKind) -> usize {
        self.bodies
            .iter()
            .filter(|b| b.category == category && b.kind == kind)
            .count()
    }

    fn hits(&self, start: Vec2, end: Vec2, filter: CollisionFilter) -> Vec<RayHit> {
        let mut hits: Vec<RayHit> = self
            .bodies
            .iter()
            .filter(|b| filter.accepts(b.category, b.kind))
            .filter_map(|b| {
                segment_entry(start, end, &b.rect).map(|fraction| RayHit {
                    body: b.handle,
                    point: start.lerp(end, fraction),
                    fraction,
                })
            })
            .collect();
        hits.sort_by(|a, b| a.fraction.total_cmp(&b.fraction));
        hits
    }
}

impl PhysicsWorld for StaticBodies {
    fn create_rect_body(&mut self, desc: BodyDesc) -> BodyHandle {
        self.next_handle += 1;
        let handle = BodyHandle(self.next_handle);
        let rect = Rect::new(
            desc.position.x - desc.size.x / 2.0,
            desc.position.y + desc.size.y / 2.0,
            desc.size.x,
            desc.size.y,
        );
        self.bodies.push(StaticBody {
            handle,
            rect,
            kind: desc.kind,
            category: desc.category,
        });
        handle
    }

    fn remove_body(&mut self, handle: BodyHandle) {
        self.bodies.retain(|b| b.handle != handle);
    }

    fn raycast(&self, start: Vec2, end: Vec2, filter: CollisionFilter) -> Option<RayHit> {
        self.hits(start, end, filter).into_iter().next()
    }

    fn query_segment(&self, start: Vec2, end: Vec2, filter: CollisionFilter) -> Vec<RayHit> {
        self.hits(start, end, filter)
    }
}

/// Slab test: fraction along `start..end` where the segment enters `rect`
fn segment_entry(start: Vec2, end: Vec2, rect: &Rect) -> Option<f32> {
    let dir = end - start;
    let mut t_min = 0.0_f32;
    let mut t_max = 1.0_f32;

    for (origin, delta, lo, hi) in [
        (start.x, dir.x, rect.left(), rect.right()),
        (start.y, dir.y, rect.bottom(), rect.top()),
    ] {
        if delta.abs() < f32::EPSILON {
            if origin < lo || origin > hi {
                return None;
            }
        } else {
            let t1 = (lo - origin) / delta;
            let t2 = (hi - origin) / delta;
            let (near, far) = if t1 < t2 { (t1, t2) } else { (t2, t1) };
            t_min = t_min.max(near);
            t_max = t_max.min(far);
            if t_min > t_max {
                return None;
            }
        }
    }
    Some(t_min)
}

//! Structural wall component - damage-tracked sections and the rules that map
//! damage onto breach openness and collider coverage.

use hecs::Entity;

use super::{NetId, Rect, Vec2, VesselId};
use crate::config::BreachConfig;
use crate::physics::BodyHandle;

/// Length of one damage section along the wall axis
pub const WALL_SECTION_SIZE: f32 = 96.0;
/// A breach opening extends this far past its section on every side
pub const BREACH_MARGIN: f32 = 10.0;

/// Damage state of a single wall section
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SectionState {
    /// Below the leak threshold: solid, no opening
    Intact,
    /// Opening exists with a small `open` value
    Leaking,
    /// Past the big-gap threshold
    Breached,
    /// Damage at max health; the section has no solid collider
    Destroyed,
}

impl SectionState {
    pub fn classify(damage: f32, max_health: f32, thresholds: &BreachConfig) -> Self {
        if max_health <= 0.0 || damage >= max_health {
            return SectionState::Destroyed;
        }
        let ratio = damage / max_health;
        if ratio < thresholds.leak_threshold {
            SectionState::Intact
        } else if ratio < thresholds.big_gap_threshold {
            SectionState::Leaking
        } else {
            SectionState::Breached
        }
    }

    pub fn has_opening(self) -> bool {
        self != SectionState::Intact
    }

    pub fn is_breached(self) -> bool {
        matches!(self, SectionState::Breached | SectionState::Destroyed)
    }
}

/// Change in whether a section contributes a solid collider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolidTransition {
    BecameHole,
    BecameSolid,
}

/// Edge detector for collider rebuilds: `Some` only when a section crosses
/// the max-health boundary.
pub fn solid_transition(old_damage: f32, new_damage: f32, max_health: f32) -> Option<SolidTransition> {
    let was_hole = old_damage >= max_health;
    let is_hole = new_damage >= max_health;
    match (was_hole, is_hole) {
        (false, true) => Some(SolidTransition::BecameHole),
        (true, false) => Some(SolidTransition::BecameSolid),
        _ => None,
    }
}

/// `open` for a breach at the given damage: flat zero below the leak
/// threshold, one ramp up to the big-gap threshold, a second one beyond.
pub fn breach_open(damage: f32, max_health: f32, thresholds: &BreachConfig) -> f32 {
    if max_health <= 0.0 {
        return thresholds.max_open;
    }
    let ratio = (damage / max_health).clamp(0.0, 1.0);
    let leak = thresholds.leak_threshold;
    let big = thresholds.big_gap_threshold;
    if ratio < leak {
        0.0
    } else if ratio < big {
        thresholds.leak_open * (ratio - leak) / (big - leak)
    } else if big >= 1.0 {
        thresholds.max_open
    } else {
        thresholds.leak_open + (thresholds.max_open - thresholds.leak_open) * (ratio - big) / (1.0 - big)
    }
}

#[derive(Debug, Clone)]
pub struct WallSection {
    pub rect: Rect,
    damage: f32,
    /// Breach owned by this section
    pub opening: Option<Entity>,
}

impl WallSection {
    pub fn damage(&self) -> f32 {
        self.damage
    }
}

/// A wall split into fixed-size damage sections
#[derive(Debug, Clone)]
pub struct StructuralWall {
    pub net_id: NetId,
    pub vessel: VesselId,
    rect: Rect,
    is_horizontal: bool,
    max_health: f32,
    min_health: f32,
    sections: Vec<WallSection>,
    pub(crate) bodies: Vec<BodyHandle>,
    pub(crate) sensor: Option<BodyHandle>,
}

impl StructuralWall {
    pub fn new(rect: Rect, max_health: f32, vessel: VesselId, net_id: NetId) -> Self {
        let is_horizontal = rect.width > rect.height;
        let sections = build_sections(rect, is_horizontal);
        Self {
            net_id,
            vessel,
            rect,
            is_horizontal,
            max_health: max_health.max(0.0),
            min_health: 0.0,
            sections,
            bodies: Vec::new(),
            sensor: None,
        }
    }

    /// Health that damage can never remove
    pub fn with_min_health(mut self, min_health: f32) -> Self {
        self.min_health = min_health.clamp(0.0, self.max_health);
        self
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn is_horizontal(&self) -> bool {
        self.is_horizontal
    }

    pub fn max_health(&self) -> f32 {
        self.max_health
    }

    pub fn min_health(&self) -> f32 {
        self.min_health
    }

    /// Highest damage a section can hold
    pub fn max_damage(&self) -> f32 {
        self.max_health - self.min_health
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn section(&self, index: usize) -> Option<&WallSection> {
        self.sections.get(index)
    }

    pub fn sections(&self) -> &[WallSection] {
        &self.sections
    }

    /// Section under a world point, or `None` if the point is off the wall
    pub fn find_section_index(&self, point: Vec2) -> Option<usize> {
        let offset = if self.is_horizontal {
            point.x - self.rect.x
        } else {
            self.rect.y - point.y
        };
        if !offset.is_finite() || offset < 0.0 {
            return None;
        }
        let index = (offset / WALL_SECTION_SIZE).floor() as usize;
        (index < self.sections.len()).then_some(index)
    }

    /// Clamp and store damage, returning (old, new) when the write was accepted
    pub(crate) fn store_damage(&mut self, index: usize, damage: f32) -> Option<(f32, f32)> {
        if !damage.is_finite() {
            return None;
        }
        let max_damage = self.max_damage();
        let section = self.sections.get_mut(index)?;
        let old = section.damage;
        section.damage = damage.clamp(0.0, max_damage);
        Some((old, section.damage))
    }

    pub(crate) fn set_section_opening(&mut self, index: usize, opening: Option<Entity>) {
        if let Some(section) = self.sections.get_mut(index) {
            section.opening = opening;
        }
    }

    pub fn has_holes(&self) -> bool {
        self.sections.iter().any(|s| s.damage >= self.max_health)
    }

    /// Maximal runs of contiguous sections that still need a solid collider
    pub fn solid_runs(&self) -> Vec<Rect> {
        let mut runs = Vec::new();
        let mut current: Option<Rect> = None;
        for section in &self.sections {
            if section.damage < self.max_health {
                current = Some(match current {
                    Some(run) => run.union(&section.rect),
                    None => section.rect,
                });
            } else if let Some(run) = current.take() {
                runs.push(run);
            }
        }
        if let Some(run) = current {
            runs.push(run);
        }
        runs
    }
}

fn build_sections(rect: Rect, is_horizontal: bool) -> Vec<WallSection> {
    let length = if is_horizontal { rect.width } else { rect.height };
    let count = (length / WALL_SECTION_SIZE).ceil().max(1.0) as usize;
    (0..count)
        .map(|i| {
            let start = i as f32 * WALL_SECTION_SIZE;
            let extent = (length - start).min(WALL_SECTION_SIZE).max(0.0);
            let section_rect = if is_horizontal {
                Rect::new(rect.x + start, rect.y, extent, rect.height)
            } else {
                Rect::new(rect.x, rect.y - start, rect.width, extent)
            };
            WallSection {
                rect: section_rect,
                damage: 0.0,
                opening: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> BreachConfig {
        BreachConfig::default()
    }

    #[test]
    fn test_sections_cover_wall() {
        let wall = StructuralWall::new(Rect::new(0.0, 0.0, 250.0, 16.0), 100.0, VesselId(0), NetId(1));
        assert!(wall.is_horizontal());
        assert_eq!(wall.section_count(), 3);
        assert_eq!(wall.section(2).unwrap().rect, Rect::new(192.0, 0.0, 58.0, 16.0));

        let vertical = StructuralWall::new(Rect::new(0.0, 200.0, 16.0, 200.0), 100.0, VesselId(0), NetId(2));
        assert!(!vertical.is_horizontal());
        assert_eq!(vertical.section(1).unwrap().rect, Rect::new(0.0, 104.0, 16.0, 96.0));
    }

    #[test]
    fn test_find_section_index() {
        let wall = StructuralWall::new(Rect::new(100.0, 0.0, 288.0, 16.0), 100.0, VesselId(0), NetId(1));
        assert_eq!(wall.find_section_index(Vec2::new(100.0, -8.0)), Some(0));
        assert_eq!(wall.find_section_index(Vec2::new(200.0, -8.0)), Some(1));
        assert_eq!(wall.find_section_index(Vec2::new(50.0, -8.0)), None);
        assert_eq!(wall.find_section_index(Vec2::new(500.0, -8.0)), None);

        let vertical = StructuralWall::new(Rect::new(0.0, 200.0, 16.0, 200.0), 100.0, VesselId(0), NetId(2));
        assert_eq!(vertical.find_section_index(Vec2::new(8.0, 190.0)), Some(0));
        assert_eq!(vertical.find_section_index(Vec2::new(8.0, 5.0)), Some(2));
    }

    #[test]
    fn test_classify_states() {
        let t = thresholds();
        assert_eq!(SectionState::classify(5.0, 100.0, &t), SectionState::Intact);
        assert_eq!(SectionState::classify(10.0, 100.0, &t), SectionState::Leaking);
        assert_eq!(SectionState::classify(50.0, 100.0, &t), SectionState::Breached);
        assert_eq!(SectionState::classify(100.0, 100.0, &t), SectionState::Destroyed);
    }

    #[test]
    fn test_breach_open_two_segments() {
        let t = thresholds();
        assert_eq!(breach_open(9.9, 100.0, &t), 0.0);
        assert!((breach_open(10.0, 100.0, &t) - 0.0).abs() < 1e-6);
        assert!((breach_open(30.0, 100.0, &t) - 0.175).abs() < 1e-5);
        assert!((breach_open(50.0, 100.0, &t) - 0.35).abs() < 1e-5);
        assert!((breach_open(75.0, 100.0, &t) - 0.55).abs() < 1e-5);
        assert!((breach_open(100.0, 100.0, &t) - 0.75).abs() < 1e-5);
    }

    #[test]
    fn test_solid_transition_edges_only() {
        assert_eq!(solid_transition(0.0, 50.0, 100.0), None);
        assert_eq!(solid_transition(50.0, 100.0, 100.0), Some(SolidTransition::BecameHole));
        assert_eq!(solid_transition(100.0, 100.0, 100.0), None);
        assert_eq!(solid_transition(100.0, 99.0, 100.0), Some(SolidTransition::BecameSolid));
    }

    #[test]
    fn test_store_damage_clamps_to_min_health() {
        let mut wall = StructuralWall::new(Rect::new(0.0, 0.0, 96.0, 16.0), 100.0, VesselId(0), NetId(1))
            .with_min_health(20.0);
        assert_eq!(wall.store_damage(0, 500.0), Some((0.0, 80.0)));
        assert_eq!(wall.store_damage(0, f32::NAN), None);
        assert_eq!(wall.store_damage(3, 10.0), None);
        assert_eq!(wall.section(0).unwrap().damage(), 80.0);
    }

    #[test]
    fn test_solid_runs_split_at_holes() {
        let mut wall = StructuralWall::new(Rect::new(0.0, 0.0, 480.0, 16.0), 100.0, VesselId(0), NetId(1));
        assert_eq!(wall.solid_runs(), vec![Rect::new(0.0, 0.0, 480.0, 16.0)]);

        wall.store_damage(2, 100.0);
        wall.store_damage(3, 60.0);
        let runs = wall.solid_runs();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0], Rect::new(0.0, 0.0, 192.0, 16.0));
        assert_eq!(runs[1], Rect::new(288.0, 0.0, 192.0, 16.0));
        assert!(wall.has_holes());
    }
}

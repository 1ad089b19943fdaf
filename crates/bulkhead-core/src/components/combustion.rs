//! Combustion component - a fire volume burning inside one compartment.

use hecs::Entity;

use super::{Rect, Vec2};
use crate::config::FireConfig;

/// Fires narrower than this go out
pub const MIN_FIRE_WIDTH: f32 = 1.0;
/// Width and height of a freshly started fire
pub const INITIAL_FIRE_SIZE: f32 = 10.0;
/// Gas percentage at which a fire neither grows nor shrinks
pub const FIRE_GAS_FLOOR: f32 = 10.0;
/// Sideways reach past the burning area, enough to touch a door frame
pub const FIRE_REACH_MARGIN: f32 = 5.0;

/// A fire. `position` is the bottom-left corner; flames rise from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Combustion {
    pub compartment: Entity,
    pub position: Vec2,
    pub size: Vec2,
}

impl Combustion {
    pub fn new(compartment: Entity, position: Vec2) -> Self {
        Self {
            compartment,
            position,
            size: Vec2::new(INITIAL_FIRE_SIZE, INITIAL_FIRE_SIZE),
        }
    }

    pub fn with_size(mut self, size: Vec2) -> Self {
        if size.is_finite() {
            self.size = Vec2::new(size.x.max(0.0), size.y.max(0.0));
        }
        self
    }

    pub fn width(&self) -> f32 {
        self.size.x
    }

    /// Burning area as a top-left anchored rect
    pub fn rect(&self) -> Rect {
        Rect::new(self.position.x, self.position.y + self.size.y, self.size.x, self.size.y)
    }

    /// Area the flames can lick, twice as tall as the burning area
    pub fn reach_rect(&self) -> Rect {
        Rect::new(
            self.position.x - FIRE_REACH_MARGIN,
            self.position.y + self.size.y * 2.0,
            self.size.x + FIRE_REACH_MARGIN * 2.0,
            self.size.y * 2.0,
        )
    }

    pub fn center(&self) -> Vec2 {
        self.rect().center()
    }

    /// Positive above the gas floor, negative below, capped at 1
    pub fn grow_modifier(gas_percentage: f32) -> f32 {
        (gas_percentage / FIRE_GAS_FLOOR - 1.0).min(1.0)
    }

    pub fn damage_range(&self, max_range: f32) -> f32 {
        (self.size.x.max(0.0).sqrt() * 20.0).clamp(0.0, max_range)
    }

    pub fn is_extinguished(&self) -> bool {
        self.size.x < MIN_FIRE_WIDTH
    }

    /// Grow or shrink symmetrically about the fire's centre
    pub fn grow(&mut self, grow_modifier: f32, dt: f32, config: &FireConfig) {
        let delta = config.grow_speed * grow_modifier * dt;
        if !delta.is_finite() {
            return;
        }
        self.size.x += delta;
        self.position.x -= delta * 0.5;
        self.size.y = (self.size.y + delta).min(config.max_height).max(config.min_height);
    }

    /// Keep the fire inside the compartment's floor span
    pub fn clamp_into(&mut self, bounds: Rect) {
        self.size.x = self.size.x.min(bounds.width);
        let max_x = (bounds.right() - self.size.x).max(bounds.left());
        self.position.x = self.position.x.clamp(bounds.left(), max_x);
        self.position.y = self.position.y.clamp(bounds.bottom(), bounds.top());
    }

    /// Narrow the fire by up to `amount`, returning what was actually removed
    pub fn reduce(&mut self, amount: f32) -> f32 {
        if !amount.is_finite() {
            return 0.0;
        }
        let consumed = amount.clamp(0.0, self.size.x.max(0.0));
        self.size.x -= consumed;
        self.position.x += consumed / 2.0;
        consumed
    }

    /// Absorb another fire's area
    pub fn merge_from(&mut self, other: &Combustion) {
        let left = self.position.x.min(other.position.x);
        let right = (self.position.x + self.size.x).max(other.position.x + other.size.x);
        let bottom = self.position.y.min(other.position.y);
        let top = (self.position.y + self.size.y).max(other.position.y + other.size.y);
        self.position = Vec2::new(left, bottom);
        self.size = Vec2::new(right - left, top - bottom);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fire() -> Combustion {
        let mut world = hecs::World::new();
        Combustion::new(world.spawn(()), Vec2::new(100.0, 0.0))
    }

    #[test]
    fn test_grow_modifier_band() {
        assert_eq!(Combustion::grow_modifier(100.0), 1.0);
        assert_eq!(Combustion::grow_modifier(10.0), 0.0);
        assert!((Combustion::grow_modifier(5.0) + 0.5).abs() < 1e-6);
        assert_eq!(Combustion::grow_modifier(0.0), -1.0);
    }

    #[test]
    fn test_growth_keeps_center() {
        let mut f = fire();
        let center_x = f.center().x;
        f.grow(1.0, 1.0, &FireConfig::default());
        assert_eq!(f.width(), 15.0);
        assert!((f.center().x - center_x).abs() < 1e-4);
        assert_eq!(f.size.y, 15.0);
    }

    #[test]
    fn test_height_clamped() {
        let mut f = fire();
        for _ in 0..100 {
            f.grow(1.0, 1.0, &FireConfig::default());
        }
        assert_eq!(f.size.y, 50.0);
    }

    #[test]
    fn test_reduce_returns_consumed() {
        let mut f = fire();
        assert_eq!(f.reduce(4.0), 4.0);
        assert_eq!(f.width(), 6.0);
        assert_eq!(f.reduce(100.0), 6.0);
        assert!(f.is_extinguished());
        assert_eq!(f.reduce(f32::NAN), 0.0);
    }

    #[test]
    fn test_damage_range() {
        let mut f = fire();
        f.size.x = 100.0;
        assert_eq!(f.damage_range(500.0), 200.0);
        assert_eq!(f.damage_range(150.0), 150.0);
    }

    #[test]
    fn test_clamp_into_bounds() {
        let mut f = fire();
        f.position.x = -20.0;
        f.size.x = 50.0;
        f.clamp_into(Rect::new(0.0, 100.0, 40.0, 100.0));
        assert_eq!(f.position.x, 0.0);
        assert_eq!(f.width(), 40.0);
    }

    #[test]
    fn test_clamp_into_room_narrower_than_fire() {
        let mut f = fire();
        let bounds = Rect::new(0.383, 100.0, 2.27, 100.0);
        f.clamp_into(bounds);
        assert_eq!(f.width(), 2.27);
        assert_eq!(f.position.x, 0.383);
    }

    #[test]
    fn test_merge_takes_union() {
        let mut a = fire();
        let mut b = a.clone();
        b.position = Vec2::new(105.0, 0.0);
        b.size = Vec2::new(20.0, 30.0);
        a.merge_from(&b);
        assert_eq!(a.position, Vec2::new(100.0, 0.0));
        assert_eq!(a.size, Vec2::new(25.0, 30.0));
    }
}

//! Common geometry used across multiple entity types.
//!
//! The world is 2-D and y-up. A [`Rect`] is anchored at its top-left corner,
//! so its bottom edge is `y - height`.

use serde::{Deserialize, Serialize};

/// 2D position / direction vector
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_squared(&self, other: &Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn distance(&self, other: &Self) -> f32 {
        self.distance_squared(other).sqrt()
    }

    pub fn length_squared(&self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    pub fn length(&self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Linear interpolation towards `other`; `t` is not clamped
    pub fn lerp(&self, other: Self, t: f32) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

impl std::ops::Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, scalar: f32) -> Self {
        Self {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }
}

/// Axis-aligned rectangle, top-left anchored in a y-up world
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn left(&self) -> f32 {
        self.x
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn top(&self) -> f32 {
        self.y
    }

    pub fn bottom(&self) -> f32 {
        self.y - self.height
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.width / 2.0, self.y - self.height / 2.0)
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Inclusive containment test
    pub fn contains(&self, point: &Vec2) -> bool {
        point.x >= self.left()
            && point.x <= self.right()
            && point.y <= self.top()
            && point.y >= self.bottom()
    }

    /// True when the two rectangles share any area (touching edges do not count)
    pub fn intersects(&self, other: &Rect) -> bool {
        self.left() < other.right()
            && other.left() < self.right()
            && self.bottom() < other.top()
            && other.bottom() < self.top()
    }

    /// Smallest rectangle covering both
    pub fn union(&self, other: &Rect) -> Rect {
        let left = self.left().min(other.left());
        let right = self.right().max(other.right());
        let top = self.top().max(other.top());
        let bottom = self.bottom().min(other.bottom());
        Rect::new(left, top, right - left, top - bottom)
    }

    /// Grow the rectangle by `amount` on every side
    pub fn expanded(&self, amount: f32) -> Rect {
        Rect::new(
            self.x - amount,
            self.y + amount,
            self.width + amount * 2.0,
            self.height + amount * 2.0,
        )
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }
}

/// Identifies the moving vessel a compartment or opening belongs to.
///
/// Compartments on different vessels can still be joined by an opening
/// (docking ports); their relative position feeds the flow pressure offset.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VesselId(pub u16);

/// Network / persistence id assigned from the bounded id space
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetId(pub u16);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec2_operations() {
        let a = Vec2::new(1.0, 2.0);
        let b = Vec2::new(4.0, 6.0);

        let sum = a + b;
        assert_eq!(sum.x, 5.0);
        assert_eq!(sum.y, 8.0);

        let diff = b - a;
        assert_eq!(diff.length(), 5.0);

        let scaled = a * 2.0;
        assert_eq!(scaled.y, 4.0);
    }

    #[test]
    fn test_vec2_lerp() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, -10.0);
        let mid = a.lerp(b, 0.5);
        assert!((mid.x - 5.0).abs() < 0.001);
        assert!((mid.y + 5.0).abs() < 0.001);
    }

    #[test]
    fn test_rect_edges_are_y_up() {
        let r = Rect::new(0.0, 100.0, 200.0, 50.0);
        assert_eq!(r.bottom(), 50.0);
        assert_eq!(r.right(), 200.0);
        assert_eq!(r.center(), Vec2::new(100.0, 75.0));
        assert!(r.contains(&Vec2::new(0.0, 100.0)));
        assert!(!r.contains(&Vec2::new(10.0, 101.0)));
    }

    #[test]
    fn test_rect_union_and_intersection() {
        let a = Rect::new(0.0, 10.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 10.0, 10.0);
        assert!(a.intersects(&b));
        let u = a.union(&b);
        assert_eq!(u, Rect::new(0.0, 10.0, 15.0, 15.0));

        let c = Rect::new(10.0, 10.0, 5.0, 5.0);
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_rect_expanded() {
        let r = Rect::new(0.0, 0.0, 96.0, 20.0).expanded(10.0);
        assert_eq!(r, Rect::new(-10.0, 10.0, 116.0, 40.0));
    }
}

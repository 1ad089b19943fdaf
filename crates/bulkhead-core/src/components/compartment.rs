//! Compartment component - a sealed volume holding water, gas and a surface wave.
//!
//! All setters reject non-finite input and clamp into range, so a single bad
//! write from a neighbour can never push the state out of bounds.

use hecs::Entity;

use super::{NetId, Rect, VesselId};

/// Horizontal extent covered by one wave cell
pub const WAVE_WIDTH: f32 = 32.0;
pub const WAVE_STIFFNESS: f32 = 0.01;
pub const WAVE_SPREAD: f32 = 0.02;
pub const WAVE_DAMPENING: f32 = 0.02;
/// Headroom above nominal volume that pressure-driven inflow may fill
pub const MAX_COMPRESS: f32 = 1.05;
pub const MAX_LETHAL_PRESSURE: f32 = 100.0;
/// Lethal pressure lost per second while the compartment is not full
pub const LETHAL_PRESSURE_DECAY: f32 = 10.0;
/// Wave amplitude under which an empty compartment counts as settled
const SETTLE_EPSILON: f32 = 0.1;

/// 1-D surface wave along a compartment's width
#[derive(Debug, Clone)]
pub struct WaveField {
    pub(crate) height: Vec<f32>,
    pub(crate) velocity: Vec<f32>,
    left_delta: Vec<f32>,
    right_delta: Vec<f32>,
}

impl WaveField {
    pub fn for_width(width: f32) -> Self {
        let cells = ((width / WAVE_WIDTH).ceil() + 1.0).max(2.0) as usize;
        Self {
            height: vec![0.0; cells],
            velocity: vec![0.0; cells],
            left_delta: vec![0.0; cells],
            right_delta: vec![0.0; cells],
        }
    }

    pub fn len(&self) -> usize {
        self.height.len()
    }

    pub fn is_empty(&self) -> bool {
        self.height.is_empty()
    }

    pub fn height(&self, index: usize) -> f32 {
        self.height.get(index).copied().unwrap_or(0.0)
    }

    pub fn velocity(&self, index: usize) -> f32 {
        self.velocity.get(index).copied().unwrap_or(0.0)
    }

    pub fn first(&self) -> f32 {
        self.height(0)
    }

    pub fn last(&self) -> f32 {
        self.height(self.len().saturating_sub(1))
    }

    pub(crate) fn add_velocity(&mut self, index: usize, amount: f32) {
        if let Some(v) = self.velocity.get_mut(index) {
            if amount.is_finite() {
                *v += amount;
            }
        }
    }

    pub(crate) fn set_velocity(&mut self, index: usize, value: f32) {
        if let Some(v) = self.velocity.get_mut(index) {
            if value.is_finite() {
                *v = value;
            }
        }
    }

    pub(crate) fn add_height(&mut self, index: usize, amount: f32) {
        if let Some(h) = self.height.get_mut(index) {
            if amount.is_finite() {
                *h += amount;
            }
        }
    }

    pub(crate) fn set_height(&mut self, index: usize, value: f32) {
        if let Some(h) = self.height.get_mut(index) {
            if value.is_finite() {
                *h = value;
            }
        }
    }

    /// Advance each cell and bounce it off the compartment's ceiling and floor
    fn integrate(&mut self, surface: f32, top: f32, bottom: f32) {
        for i in 0..self.len() {
            self.height[i] += self.velocity[i];
            let level = surface + self.height[i];
            if level > top {
                self.height[i] -= level - top;
                self.velocity[i] *= -0.5;
            } else if level < bottom {
                self.height[i] -= level - bottom;
                self.velocity[i] *= -0.5;
            }
            let accel = -WAVE_STIFFNESS * self.height[i] - self.velocity[i] * WAVE_DAMPENING;
            self.velocity[i] += accel;
        }
    }

    /// Neighbour diffusion into velocities; heights follow in `apply_spread`
    fn spread_velocities(&mut self) {
        let len = self.len();
        if len < 3 {
            return;
        }
        for _ in 0..2 {
            for i in 1..len - 1 {
                self.left_delta[i] = WAVE_SPREAD * (self.height[i] - self.height[i - 1]);
                self.velocity[i - 1] += self.left_delta[i];
                self.right_delta[i] = WAVE_SPREAD * (self.height[i] - self.height[i + 1]);
                self.velocity[i + 1] += self.right_delta[i];
            }
        }
    }

    fn apply_spread(&mut self) {
        let len = self.len();
        if len < 3 {
            return;
        }
        for _ in 0..2 {
            for i in 1..len - 1 {
                self.height[i - 1] += self.left_delta[i];
                self.height[i + 1] += self.right_delta[i];
            }
        }
    }

    fn is_settled(&self) -> bool {
        let len = self.len();
        len < 3 || self.height[1..len - 1].iter().all(|h| h.abs() <= SETTLE_EPSILON)
    }
}

/// A sealed volume of the vessel interior
#[derive(Debug, Clone)]
pub struct Compartment {
    pub net_id: NetId,
    pub vessel: VesselId,
    rect: Rect,
    water: f32,
    gas: f32,
    pressure: f32,
    surface: f32,
    lethal_pressure: f32,
    waves: WaveField,
    update_active: bool,
    /// Openings touching this compartment; weak, never despawned from here
    pub openings: Vec<Entity>,
    /// Live fires inside this compartment
    pub fires: Vec<Entity>,
}

impl Compartment {
    /// New compartment, dry and at full gas
    pub fn new(rect: Rect, vessel: VesselId, net_id: NetId) -> Self {
        let bottom = rect.bottom();
        Self {
            net_id,
            vessel,
            rect,
            water: 0.0,
            gas: rect.area().max(0.0),
            pressure: bottom,
            surface: bottom,
            lethal_pressure: 0.0,
            waves: WaveField::for_width(rect.width),
            update_active: false,
            openings: Vec::new(),
            fires: Vec::new(),
        }
    }

    pub fn with_water(mut self, amount: f32) -> Self {
        self.set_water(amount);
        self.settle_surface();
        self
    }

    /// Snap the surface and pressure to the resting water level, skipping
    /// the lerp
    pub fn settle_surface(&mut self) {
        self.surface = self.target_surface();
        self.reset_pressure();
    }

    /// Pressure implied by the water amount alone, including overfill
    pub fn reset_pressure(&mut self) {
        self.pressure = if self.rect.width > 0.0 {
            self.rect.bottom() + self.water / self.rect.width
        } else {
            self.rect.bottom()
        };
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn volume(&self) -> f32 {
        self.rect.area().max(0.0)
    }

    pub fn water(&self) -> f32 {
        self.water
    }

    /// Highest water amount the compartment may hold
    pub fn water_ceiling(&self) -> f32 {
        self.volume() * MAX_COMPRESS
    }

    /// Water at or above the point where the compartment counts as flooded
    pub fn is_full(&self) -> bool {
        self.water >= self.volume() / MAX_COMPRESS
    }

    pub fn gas(&self) -> f32 {
        self.gas
    }

    pub fn gas_percentage(&self) -> f32 {
        let volume = self.volume();
        if volume > 0.0 {
            self.gas / volume * 100.0
        } else {
            100.0
        }
    }

    pub fn pressure(&self) -> f32 {
        self.pressure
    }

    pub fn surface(&self) -> f32 {
        self.surface
    }

    pub fn lethal_pressure(&self) -> f32 {
        self.lethal_pressure
    }

    pub fn waves(&self) -> &WaveField {
        &self.waves
    }

    pub(crate) fn waves_mut(&mut self) -> &mut WaveField {
        &mut self.waves
    }

    pub fn is_update_active(&self) -> bool {
        self.update_active
    }

    /// Wave cell covering world x
    pub fn wave_index(&self, x: f32) -> usize {
        let last = self.waves.len().saturating_sub(1);
        let index = ((x - self.rect.x) / WAVE_WIDTH).floor();
        if index.is_nan() || index < 0.0 {
            0
        } else {
            (index as usize).min(last)
        }
    }

    /// Set the water amount; returns false if the value was rejected
    pub fn set_water(&mut self, amount: f32) -> bool {
        if !amount.is_finite() {
            log::warn!("rejected non-finite water amount {} for compartment {}", amount, self.net_id.0);
            return false;
        }
        self.water = amount.clamp(0.0, self.water_ceiling());
        if self.water < self.volume() && self.rect.width > 0.0 {
            self.pressure = self.rect.bottom() + self.water / self.rect.width;
        }
        if self.water > 0.0 {
            self.update_active = true;
        }
        true
    }

    pub fn add_water(&mut self, delta: f32) -> bool {
        self.set_water(self.water + delta)
    }

    /// Set the gas amount; returns false if the value was rejected
    pub fn set_gas(&mut self, amount: f32) -> bool {
        if !amount.is_finite() {
            log::warn!("rejected non-finite gas amount {} for compartment {}", amount, self.net_id.0);
            return false;
        }
        self.gas = amount.clamp(0.0, self.volume());
        true
    }

    pub fn set_gas_percentage(&mut self, percentage: f32) -> bool {
        self.set_gas(percentage / 100.0 * self.volume())
    }

    pub(crate) fn set_pressure(&mut self, pressure: f32) {
        if pressure.is_finite() {
            self.pressure = pressure;
        }
    }

    pub fn set_lethal_pressure(&mut self, value: f32) {
        if value.is_finite() {
            self.lethal_pressure = value.clamp(0.0, MAX_LETHAL_PRESSURE);
        }
    }

    pub fn add_lethal_pressure(&mut self, delta: f32) {
        self.set_lethal_pressure(self.lethal_pressure + delta);
    }

    /// Move or resize; the gas percentage is kept, water is re-clamped
    pub fn resize(&mut self, rect: Rect) -> bool {
        if !rect.is_finite() || rect.width < 0.0 || rect.height < 0.0 {
            log::warn!("rejected invalid rect {:?} for compartment {}", rect, self.net_id.0);
            return false;
        }
        let gas_percentage = self.gas_percentage();
        self.rect = rect;
        self.waves = WaveField::for_width(rect.width);
        self.set_gas_percentage(gas_percentage);
        self.set_water(self.water);
        self.reset_pressure();
        self.surface = self.surface.clamp(rect.bottom(), rect.top().max(rect.bottom()));
        true
    }

    fn target_surface(&self) -> f32 {
        let mut depth = if self.rect.width > 0.0 {
            self.water / self.rect.width
        } else {
            0.0
        };
        if depth < 1.0 {
            depth = 0.0;
        }
        self.rect.bottom() + depth
    }

    /// Gas decay; runs every tick whether or not water is present
    pub fn tick_gas(&mut self, dt: f32, deterioration_speed: f32) {
        self.set_gas(self.gas - deterioration_speed * dt);
    }

    /// First half of the wave step: surface, integration and velocity spread.
    ///
    /// Returns false when the wave simulation is inactive and nothing was done.
    pub fn begin_wave_step(&mut self, dt: f32) -> bool {
        if !self.update_active {
            self.lethal_pressure = 0.0;
            return false;
        }
        let bottom = self.rect.bottom();
        let t = (dt * 10.0).min(1.0);
        self.surface = (self.surface + (self.target_surface() - self.surface) * t).max(bottom);

        self.waves.integrate(self.surface, self.rect.top(), bottom);
        self.waves.spread_velocities();
        true
    }

    /// Second half of the wave step; call after cross-opening propagation
    pub fn finish_wave_step(&mut self, dt: f32) {
        if !self.update_active {
            return;
        }
        self.waves.apply_spread();

        if self.water < self.volume() {
            self.add_lethal_pressure(-LETHAL_PRESSURE_DECAY * dt);
            if self.water <= 0.0 && self.surface <= self.rect.bottom() + 1.0 && self.waves.is_settled() {
                self.update_active = false;
            }
        }
    }

    pub fn tick_waves(&mut self, dt: f32) {
        if self.begin_wave_step(dt) {
            self.finish_wave_step(dt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> Compartment {
        Compartment::new(Rect::new(0.0, 100.0, 200.0, 100.0), VesselId(0), NetId(1))
    }

    #[test]
    fn test_new_compartment_full_of_gas() {
        let c = room();
        assert_eq!(c.volume(), 20_000.0);
        assert_eq!(c.gas_percentage(), 100.0);
        assert_eq!(c.water(), 0.0);
        assert_eq!(c.waves().len(), 8);
    }

    #[test]
    fn test_set_water_clamps_and_sets_pressure() {
        let mut c = room();
        assert!(c.set_water(10_000.0));
        assert!((c.pressure() - 50.0).abs() < 0.001);
        assert!(c.is_update_active());

        c.set_water(1.0e9);
        assert!((c.water() - c.water_ceiling()).abs() < 0.01);

        c.set_water(-5.0);
        assert_eq!(c.water(), 0.0);
    }

    #[test]
    fn test_full_compartment_pressure_includes_overfill() {
        let mut c = room().with_water(20_500.0);
        assert!((c.pressure() - 102.5).abs() < 0.001);

        c.resize(Rect::new(0.0, 100.0, 400.0, 100.0));
        assert!((c.pressure() - 20_500.0 / 400.0).abs() < 0.001);
    }

    #[test]
    fn test_non_finite_writes_rejected() {
        let mut c = room();
        c.set_water(500.0);
        assert!(!c.set_water(f32::NAN));
        assert!(!c.set_gas(f32::INFINITY));
        assert_eq!(c.water(), 500.0);
        assert_eq!(c.gas(), c.volume());
    }

    #[test]
    fn test_gas_percentage_zero_volume() {
        let c = Compartment::new(Rect::new(0.0, 0.0, 0.0, 0.0), VesselId(0), NetId(1));
        assert_eq!(c.gas_percentage(), 100.0);
    }

    #[test]
    fn test_gas_decay() {
        let mut c = room();
        c.tick_gas(10.0, 0.3);
        assert!((c.gas() - (20_000.0 - 3.0)).abs() < 0.001);
    }

    #[test]
    fn test_resize_keeps_gas_percentage() {
        let mut c = room();
        c.set_gas_percentage(40.0);
        c.resize(Rect::new(0.0, 100.0, 400.0, 100.0));
        assert!((c.gas_percentage() - 40.0).abs() < 0.01);
        assert_eq!(c.waves().len(), 14);
    }

    #[test]
    fn test_wave_index_clamped() {
        let c = room();
        assert_eq!(c.wave_index(-50.0), 0);
        assert_eq!(c.wave_index(33.0), 1);
        assert_eq!(c.wave_index(10_000.0), c.waves().len() - 1);
    }

    #[test]
    fn test_surface_approaches_water_level() {
        let mut c = room();
        c.set_water(5_000.0);
        for _ in 0..200 {
            c.tick_waves(1.0 / 60.0);
        }
        assert!((c.surface() - 25.0).abs() < 0.5);
    }

    #[test]
    fn test_waves_stay_inside_compartment() {
        let mut c = room().with_water(10_000.0);
        c.waves_mut().set_velocity(3, 500.0);
        for _ in 0..600 {
            c.tick_waves(1.0 / 60.0);
            for i in 0..c.waves().len() {
                let level = c.surface() + c.waves().height(i);
                assert!(level <= c.rect().top() + 50.0);
            }
        }
        assert!(c.waves().height(3).abs() < 5.0);
    }

    #[test]
    fn test_empty_compartment_deactivates() {
        let mut c = room();
        c.set_water(100.0);
        c.set_water(0.0);
        for _ in 0..120 {
            c.tick_waves(1.0 / 60.0);
        }
        assert!(!c.is_update_active());
        assert_eq!(c.lethal_pressure(), 0.0);
    }

    #[test]
    fn test_lethal_pressure_clamped() {
        let mut c = room();
        c.add_lethal_pressure(500.0);
        assert_eq!(c.lethal_pressure(), MAX_LETHAL_PRESSURE);
        c.add_lethal_pressure(-1_000.0);
        assert_eq!(c.lethal_pressure(), 0.0);
    }
}

//! Simulation tunables.
//!
//! Everything here can be overridden from JSON; omitted fields fall back to
//! the defaults below.

use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// Root configuration for a [`crate::engine::SimulationEngine`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    /// Seed for every random decision (flow order, fire spread)
    pub seed: u64,
    /// Upper bound of the network id space
    pub max_entity_ids: u16,
    pub gas: GasConfig,
    pub breach: BreachConfig,
    pub explosion: ExplosionConfig,
    pub fire: FireConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0x5EED_B01D,
            max_entity_ids: u16::MAX,
            gas: GasConfig::default(),
            breach: BreachConfig::default(),
            explosion: ExplosionConfig::default(),
            fire: FireConfig::default(),
        }
    }
}

impl SimConfig {
    /// Parse and validate a JSON config
    pub fn from_json_str(json: &str) -> Result<Self, SimError> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would break the breach state machine
    pub fn validate(&self) -> Result<(), SimError> {
        let b = &self.breach;
        if !(b.leak_threshold > 0.0 && b.leak_threshold < b.big_gap_threshold && b.big_gap_threshold <= 1.0) {
            return Err(SimError::InvalidValue {
                what: "breach thresholds must satisfy 0 < leak < big_gap <= 1",
            });
        }
        if !(0.0..=1.0).contains(&b.leak_open) || !(b.leak_open..=1.0).contains(&b.max_open) {
            return Err(SimError::InvalidValue {
                what: "breach open ramp must satisfy 0 <= leak_open <= max_open <= 1",
            });
        }
        let f = &self.fire;
        if !(f.min_height.is_finite() && f.max_height.is_finite() && 0.0 <= f.min_height && f.min_height <= f.max_height) {
            return Err(SimError::InvalidValue {
                what: "fire height band must satisfy 0 <= min_height <= max_height",
            });
        }
        let rates = [
            f.grow_speed,
            f.oxygen_consumption,
            f.max_damage_range,
            f.character_burn_rate,
            f.item_burn_rate,
            f.water_extinguish_rate,
            self.gas.deterioration_speed,
            self.gas.distribution_speed,
        ];
        if rates.iter().any(|r| !r.is_finite() || *r < 0.0) {
            return Err(SimError::InvalidValue {
                what: "fire and gas rates must be finite and non-negative",
            });
        }
        if !(f.spread_interval.is_finite() && f.spread_interval > 0.0) || !(0.0..=1.0).contains(&f.spread_probability) {
            return Err(SimError::InvalidValue {
                what: "fire spread interval must be positive and probability within [0, 1]",
            });
        }
        if self.max_entity_ids == 0 {
            return Err(SimError::InvalidValue {
                what: "max_entity_ids must be at least 1",
            });
        }
        Ok(())
    }
}

/// Breathable gas transport
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GasConfig {
    /// Gas lost per second in every compartment
    pub deterioration_speed: f32,
    /// Max gas moved through one opening per second
    pub distribution_speed: f32,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            deterioration_speed: 0.3,
            distribution_speed: 500.0,
        }
    }
}

/// Wall damage thresholds, as fractions of a section's max health
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BreachConfig {
    pub leak_threshold: f32,
    pub big_gap_threshold: f32,
    /// `open` reached exactly at the big-gap threshold
    pub leak_open: f32,
    /// `open` of a fully destroyed section
    pub max_open: f32,
}

impl Default for BreachConfig {
    fn default() -> Self {
        Self {
            leak_threshold: 0.1,
            big_gap_threshold: 0.5,
            leak_open: 0.35,
            max_open: 0.75,
        }
    }
}

/// Explosion raised by sudden exterior breaches
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExplosionConfig {
    /// Minimum single-step `open` increase that counts as sudden
    pub open_delta: f32,
    pub radius_factor: f32,
    pub max_radius: f32,
    pub strength: f32,
}

impl Default for ExplosionConfig {
    fn default() -> Self {
        Self {
            open_delta: 0.1,
            radius_factor: 2.0,
            max_radius: 500.0,
            strength: 50.0,
        }
    }
}

/// Fire growth, damage and spread
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FireConfig {
    /// Width change per second at full grow modifier
    pub grow_speed: f32,
    /// Gas consumed per unit of width per second
    pub oxygen_consumption: f32,
    pub min_height: f32,
    pub max_height: f32,
    pub max_damage_range: f32,
    /// Burn applied to a character per second, before the limb split
    pub character_burn_rate: f32,
    /// Condition lost by flammable items per unit of width per second
    pub item_burn_rate: f32,
    /// Width removed per unit of submerged depth per second
    pub water_extinguish_rate: f32,
    /// Seconds between spread attempts
    pub spread_interval: f32,
    pub spread_probability: f32,
}

impl Default for FireConfig {
    fn default() -> Self {
        Self {
            grow_speed: 5.0,
            oxygen_consumption: 50.0,
            min_height: 10.0,
            max_height: 50.0,
            max_damage_range: 500.0,
            character_burn_rate: 0.5,
            item_burn_rate: 0.01,
            water_extinguish_rate: 1.0,
            spread_interval: 1.0,
            spread_probability: 0.25,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SimConfig::from_json_str(r#"{ "seed": 7, "fire": { "grow_speed": 2.5 } }"#).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.fire.grow_speed, 2.5);
        assert_eq!(config.fire.oxygen_consumption, 50.0);
        assert_eq!(config.breach, BreachConfig::default());
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let json = r#"{ "breach": { "leak_threshold": 0.6, "big_gap_threshold": 0.5 } }"#;
        assert!(matches!(
            SimConfig::from_json_str(json),
            Err(SimError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_inverted_fire_heights_rejected() {
        let json = r#"{ "fire": { "min_height": 60, "max_height": 50 } }"#;
        assert!(matches!(
            SimConfig::from_json_str(json),
            Err(SimError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_negative_rates_rejected() {
        for json in [
            r#"{ "fire": { "grow_speed": -1.0 } }"#,
            r#"{ "fire": { "oxygen_consumption": -50.0 } }"#,
            r#"{ "gas": { "deterioration_speed": -0.3 } }"#,
        ] {
            assert!(SimConfig::from_json_str(json).is_err(), "{}", json);
        }
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        assert!(matches!(
            SimConfig::from_json_str("{ seed: "),
            Err(SimError::Config(_))
        ));
    }
}

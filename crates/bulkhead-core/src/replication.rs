//! Compact per-compartment state for network replication.
//!
//! Every field is a ranged fraction packed into one byte. Decoding clamps
//! everything back into range, since the bytes come from the network.

use hecs::{Entity, World};
use thiserror::Error;

use crate::components::*;
use crate::error::SimError;

/// Most fires a single compartment update carries
pub const MAX_NET_FIRES: usize = 16;
/// Highest replicated water fraction; compartments can be overfull
pub const MAX_WATER_FRACTION: f32 = 1.5;
/// Fire positions are kept off the compartment edges
const FIRE_POSITION_MIN: f32 = 0.05;
const FIRE_POSITION_MAX: f32 = 0.95;

const HEADER_LEN: usize = 3;
const FIRE_LEN: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("buffer truncated: needed {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },
}

/// One fire, normalized to its compartment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetFire {
    /// Horizontal position of the fire's left edge, 0..1 across the compartment
    pub x: f32,
    /// Height of the fire's base, 0..1 from the floor
    pub y: f32,
    /// Width as a fraction of the compartment width
    pub size: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompartmentNetState {
    /// `water / volume`
    pub water_fraction: f32,
    pub gas_percentage: f32,
    pub fires: Vec<NetFire>,
}

fn quantize(value: f32, min: f32, max: f32) -> u8 {
    let t = ((value - min) / (max - min)).clamp(0.0, 1.0);
    if t.is_nan() {
        return 0;
    }
    (t * 255.0).round() as u8
}

fn dequantize(byte: u8, min: f32, max: f32) -> f32 {
    min + (byte as f32 / 255.0) * (max - min)
}

impl CompartmentNetState {
    /// Read a compartment's replicated state out of the world
    pub fn capture(world: &World, compartment: Entity) -> Result<Self, SimError> {
        let c = world
            .get::<&Compartment>(compartment)
            .map_err(|_| SimError::UnknownEntity(compartment))?;
        let rect = c.rect();
        let volume = c.volume();
        let fraction = |v: f32, extent: f32| if extent > 0.0 { v / extent } else { 0.0 };

        let fires = c
            .fires
            .iter()
            .filter_map(|&f| world.get::<&Combustion>(f).ok())
            .take(MAX_NET_FIRES)
            .map(|f| NetFire {
                x: fraction(f.position.x - rect.left(), rect.width),
                y: fraction(f.position.y - rect.bottom(), rect.height),
                size: fraction(f.size.x, rect.width),
            })
            .collect();

        Ok(Self {
            water_fraction: fraction(c.water(), volume),
            gas_percentage: c.gas_percentage(),
            fires,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let fires = &self.fires[..self.fires.len().min(MAX_NET_FIRES)];
        let mut bytes = Vec::with_capacity(HEADER_LEN + fires.len() * FIRE_LEN);
        bytes.push(quantize(self.water_fraction, 0.0, MAX_WATER_FRACTION));
        bytes.push(quantize(self.gas_percentage, 0.0, 100.0));
        bytes.push(fires.len() as u8);
        for fire in fires {
            bytes.push(quantize(fire.x, 0.0, 1.0));
            bytes.push(quantize(fire.y, 0.0, 1.0));
            bytes.push(quantize(fire.size, 0.0, 1.0));
        }
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::Truncated {
                needed: HEADER_LEN,
                available: bytes.len(),
            });
        }
        let count = (bytes[2] as usize).min(MAX_NET_FIRES);
        let needed = HEADER_LEN + count * FIRE_LEN;
        if bytes.len() < needed {
            return Err(CodecError::Truncated {
                needed,
                available: bytes.len(),
            });
        }

        let fires = bytes[HEADER_LEN..needed]
            .chunks_exact(FIRE_LEN)
            .map(|chunk| NetFire {
                x: dequantize(chunk[0], 0.0, 1.0).clamp(FIRE_POSITION_MIN, FIRE_POSITION_MAX),
                y: dequantize(chunk[1], 0.0, 1.0).clamp(FIRE_POSITION_MIN, FIRE_POSITION_MAX),
                size: dequantize(chunk[2], 0.0, 1.0).clamp(0.0, 1.0),
            })
            .collect();

        Ok(Self {
            water_fraction: dequantize(bytes[0], 0.0, MAX_WATER_FRACTION).clamp(0.0, MAX_WATER_FRACTION),
            gas_percentage: dequantize(bytes[1], 0.0, 100.0).clamp(0.0, 100.0),
            fires,
        })
    }
}

/// Overwrite a compartment with replicated state. Existing fires are
/// replaced wholesale. Returns the new fire entities.
pub fn apply_net_state(
    world: &mut World,
    compartment: Entity,
    state: &CompartmentNetState,
) -> Result<Vec<Entity>, SimError> {
    let (rect, old_fires) = {
        let mut c = world
            .get::<&mut Compartment>(compartment)
            .map_err(|_| SimError::UnknownEntity(compartment))?;
        let volume = c.volume();
        c.set_water(state.water_fraction * volume);
        c.set_gas_percentage(state.gas_percentage);
        c.settle_surface();
        (c.rect(), std::mem::take(&mut c.fires))
    };

    for fire in old_fires {
        let _ = world.despawn(fire);
    }

    let mut spawned = Vec::with_capacity(state.fires.len());
    for fire in &state.fires {
        let position = Vec2::new(rect.left() + fire.x * rect.width, rect.bottom() + fire.y * rect.height);
        let mut combustion = Combustion::new(compartment, position);
        combustion.size.x = fire.size * rect.width;
        combustion.clamp_into(rect);
        spawned.push(world.spawn((combustion,)));
    }
    if let Ok(mut c) = world.get::<&mut Compartment>(compartment) {
        c.fires = spawned.clone();
    }
    Ok(spawned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_endpoints() {
        assert_eq!(quantize(0.0, 0.0, 1.5), 0);
        assert_eq!(quantize(1.5, 0.0, 1.5), 255);
        assert_eq!(quantize(9.0, 0.0, 1.5), 255);
        assert_eq!(quantize(-3.0, 0.0, 1.5), 0);
        assert_eq!(quantize(f32::NAN, 0.0, 1.5), 0);
    }

    #[test]
    fn test_encode_layout() {
        let state = CompartmentNetState {
            water_fraction: 0.75,
            gas_percentage: 100.0,
            fires: vec![NetFire { x: 0.5, y: 0.0, size: 1.0 }],
        };
        let bytes = state.encode();
        assert_eq!(bytes.len(), 6);
        assert_eq!(bytes[0], 128);
        assert_eq!(bytes[1], 255);
        assert_eq!(bytes[2], 1);
        assert_eq!(&bytes[3..], &[128, 0, 255]);
    }

    #[test]
    fn test_decode_clamps_fire_positions() {
        let decoded = CompartmentNetState::decode(&[0, 0, 1, 0, 255, 255]).unwrap();
        assert_eq!(decoded.fires[0].x, FIRE_POSITION_MIN);
        assert_eq!(decoded.fires[0].y, FIRE_POSITION_MAX);
        assert_eq!(decoded.fires[0].size, 1.0);
    }

    #[test]
    fn test_decode_caps_fire_count() {
        let mut bytes = vec![10, 20, 200];
        bytes.extend(std::iter::repeat(100).take(MAX_NET_FIRES * FIRE_LEN));
        let decoded = CompartmentNetState::decode(&bytes).unwrap();
        assert_eq!(decoded.fires.len(), MAX_NET_FIRES);
    }

    #[test]
    fn test_truncated_buffers() {
        assert_eq!(
            CompartmentNetState::decode(&[1]),
            Err(CodecError::Truncated { needed: 3, available: 1 })
        );
        assert_eq!(
            CompartmentNetState::decode(&[1, 2, 2, 0, 0, 0]),
            Err(CodecError::Truncated { needed: 9, available: 6 })
        );
    }

    #[test]
    fn test_capture_and_apply() {
        let mut world = World::new();
        let source = world.spawn((Compartment::new(Rect::new(0.0, 100.0, 200.0, 100.0), VesselId(0), NetId(1))
            .with_water(15_000.0),));
        let fire = world.spawn((Combustion::new(source, Vec2::new(50.0, 0.0)),));
        world.get::<&mut Compartment>(source).unwrap().fires.push(fire);

        let state = CompartmentNetState::capture(&world, source).unwrap();
        assert!((state.water_fraction - 0.75).abs() < 1e-6);
        assert_eq!(state.fires.len(), 1);

        let decoded = CompartmentNetState::decode(&state.encode()).unwrap();
        let target = world.spawn((Compartment::new(Rect::new(0.0, 100.0, 200.0, 100.0), VesselId(0), NetId(2)),));
        let fires = apply_net_state(&mut world, target, &decoded).unwrap();

        let c = world.get::<&Compartment>(target).unwrap();
        assert!((c.water() - 15_000.0).abs() < 60.0);
        assert_eq!(c.fires, fires);
        let f = world.get::<&Combustion>(fires[0]).unwrap();
        assert!((f.position.x - 50.0).abs() < 1.0);
        assert!((f.width() - 10.0).abs() < 1.0);
    }
}

//! Compartment graph topology - which compartments each opening joins, and
//! rough travel distances through that graph.

use hecs::{Entity, World};

use crate::components::{Compartment, Opening, OpeningLinks, Vec2};

/// How far past an opening's edge the neighbour probes reach
const PROBE_OFFSET: f32 = 1.0;

/// Compartment containing `point`. Overlaps resolve to the lowest net id so
/// lookups do not depend on storage order.
pub fn compartment_at(world: &World, point: Vec2) -> Option<Entity> {
    world
        .query::<&Compartment>()
        .iter()
        .filter(|(_, c)| c.rect().contains(&point))
        .min_by_key(|(_, c)| c.net_id)
        .map(|(entity, _)| entity)
}

/// Probe points just beyond the two edges water passes through. For a
/// horizontal gap that is left then right, for a vertical one above then below.
pub fn probe_points(opening: &Opening) -> [Vec2; 2] {
    let rect = opening.rect();
    if opening.is_horizontal() {
        let y = rect.y - rect.height / 2.0;
        [
            Vec2::new(rect.left() - PROBE_OFFSET, y),
            Vec2::new(rect.right() + PROBE_OFFSET, y),
        ]
    } else {
        let x = rect.center().x;
        [
            Vec2::new(x, rect.top() + PROBE_OFFSET),
            Vec2::new(x, rect.bottom() - PROBE_OFFSET),
        ]
    }
}

/// Re-resolve an opening's linked compartments and keep the compartments'
/// opening lists in sync. Returns false if the opening no longer exists.
pub fn refresh_links(world: &mut World, opening: Entity) -> bool {
    let (probes, old_links) = match world.get::<&Opening>(opening) {
        Ok(o) => (probe_points(&o), o.links),
        Err(_) => return false,
    };

    let links = OpeningLinks::from_probes(
        compartment_at(world, probes[0]),
        compartment_at(world, probes[1]),
    );

    if links.is_inert() {
        log::debug!("opening {:?} found no neighbouring compartment", opening);
    }

    for compartment in old_links.iter().filter(|c| !links.contains(*c)) {
        if let Ok(mut c) = world.get::<&mut Compartment>(compartment) {
            c.openings.retain(|&o| o != opening);
        }
    }
    for compartment in links.iter() {
        if let Ok(mut c) = world.get::<&mut Compartment>(compartment) {
            if !c.openings.contains(&opening) {
                c.openings.push(opening);
            }
        }
    }

    if let Ok(mut o) = world.get::<&mut Opening>(opening) {
        o.links = links;
        o.links_dirty = false;
    }
    true
}

/// Refresh every opening flagged dirty; returns how many were refreshed
pub fn refresh_dirty_links(world: &mut World) -> usize {
    let mut dirty: Vec<(crate::components::NetId, Entity)> = world
        .query::<&Opening>()
        .iter()
        .filter(|(_, o)| o.links_dirty)
        .map(|(entity, o)| (o.net_id, entity))
        .collect();
    dirty.sort_by_key(|(id, _)| *id);
    for (_, opening) in &dirty {
        refresh_links(world, *opening);
    }
    dirty.len()
}

/// Flag every opening for re-resolution, e.g. after compartments change
pub fn mark_all_links_dirty(world: &mut World) {
    for (_, opening) in world.query_mut::<&mut Opening>() {
        opening.links_dirty = true;
    }
}

/// Drop links to compartments that no longer exist
pub fn prune_stale_links(world: &mut World) {
    let stale: Vec<Entity> = world
        .query::<&Opening>()
        .iter()
        .filter(|(_, o)| o.links.iter().any(|c| !world.contains(c)))
        .map(|(entity, _)| entity)
        .collect();
    for opening in stale {
        if let Ok(mut o) = world.get::<&mut Opening>(opening) {
            o.links_dirty = true;
        }
    }
}

/// Rough walking distance from `start_pos` in `from` to `end_pos` in `to`,
/// following passable openings depth-first. Returns `f32::MAX` when the
/// target cannot be reached within `max_distance`.
pub fn approximate_distance(
    world: &World,
    start_pos: Vec2,
    end_pos: Vec2,
    from: Entity,
    to: Entity,
    max_distance: f32,
) -> f32 {
    let mut searched = Vec::new();
    walk(world, start_pos, end_pos, from, to, 0.0, max_distance, &mut searched)
}

#[allow(clippy::too_many_arguments)]
fn walk(
    world: &World,
    start_pos: Vec2,
    end_pos: Vec2,
    current: Entity,
    target: Entity,
    distance: f32,
    max_distance: f32,
    searched: &mut Vec<Entity>,
) -> f32 {
    if distance >= max_distance {
        return f32::MAX;
    }
    if current == target {
        let total = distance + start_pos.distance(&end_pos);
        return if total <= max_distance { total } else { f32::MAX };
    }
    searched.push(current);

    let openings = match world.get::<&Compartment>(current) {
        Ok(c) => c.openings.clone(),
        Err(_) => return f32::MAX,
    };

    for opening in openings {
        let (gap_pos, next) = match world.get::<&Opening>(opening) {
            Ok(o) if o.is_passable() => (o.rect().center(), o.links.other(current)),
            _ => continue,
        };
        let Some(next) = next else { continue };
        if searched.contains(&next) {
            continue;
        }
        let dist = walk(
            world,
            gap_pos,
            end_pos,
            next,
            target,
            distance + start_pos.distance(&gap_pos),
            max_distance,
            searched,
        );
        if dist < f32::MAX {
            return dist;
        }
    }
    f32::MAX
}

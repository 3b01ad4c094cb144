use std::collections::HashSet;

use bevy::prelude::*;

use super::aabb::Aabb;
use super::body::RigidBody;
use super::grid::SpatialGrid;

/// Candidate pairs for this tick, produced here and consumed by the narrow
/// phase. Each pair is ordered (`a < b`) and appears at most once.
#[derive(Resource, Default)]
pub struct BroadPhasePairs(pub Vec<(Entity, Entity)>);

pub(super) fn collect_pairs(
    grid: Res<SpatialGrid>,
    mut pairs: ResMut<BroadPhasePairs>,
    movers: Query<(Entity, &RigidBody, &Aabb)>,
    boxes: Query<&Aabb>,
) {
    pairs.0.clear();
    let mut seen: HashSet<(Entity, Entity)> = HashSet::new();

    for (entity, body, aabb) in movers.iter() {
        if body.is_static() {
            continue;
        }
        for candidate in grid.query(aabb) {
            if candidate == entity {
                continue;
            }
            // A candidate may have been despawned after its last grid move.
            let Ok(other) = boxes.get(candidate) else {
                continue;
            };
            if !aabb.overlaps(other) {
                continue;
            }
            let pair = if entity < candidate {
                (entity, candidate)
            } else {
                (candidate, entity)
            };
            if seen.insert(pair) {
                pairs.0.push(pair);
            }
        }
    }
}

use std::collections::HashMap;

use bevy::prelude::*;

use super::aabb::Aabb;

/// Side length of one grid cell, in world units. Sized above the largest
/// collidable extent (a fully charged shield) so that any overlapping pair
/// is found by scanning a cell and its eight neighbors.
pub const CELL_SIZE: f32 = 128.0;

pub fn cell_key(position: Vec2) -> (i32, i32) {
    (
        (position.x / CELL_SIZE).floor() as i32,
        (position.y / CELL_SIZE).floor() as i32,
    )
}

/// Bucketed broad-phase index. Each entity is homed in exactly one cell,
/// keyed by its position; crossing a cell boundary moves it, never
/// duplicates it.
#[derive(Resource, Default)]
pub struct SpatialGrid {
    cells: HashMap<(i32, i32), Vec<Entity>>,
    homes: HashMap<Entity, (i32, i32)>,
}

impl SpatialGrid {
    pub fn insert(&mut self, entity: Entity, position: Vec2) {
        let key = cell_key(position);
        if let Some(old) = self.homes.insert(entity, key) {
            if old == key {
                return;
            }
            self.evict(entity, old);
        }
        self.cells.entry(key).or_default().push(entity);
    }

    /// Re-home an entity after it moved. This is the hottest grid call and
    /// short-circuits when the cell key is unchanged.
    pub fn update(&mut self, entity: Entity, position: Vec2) {
        let key = cell_key(position);
        match self.homes.get(&entity).copied() {
            Some(old) if old == key => {}
            Some(old) => {
                self.evict(entity, old);
                self.homes.insert(entity, key);
                self.cells.entry(key).or_default().push(entity);
            }
            None => {
                self.homes.insert(entity, key);
                self.cells.entry(key).or_default().push(entity);
            }
        }
    }

    pub fn remove(&mut self, entity: Entity) {
        if let Some(key) = self.homes.remove(&entity) {
            self.evict(entity, key);
        }
    }

    fn evict(&mut self, entity: Entity, key: (i32, i32)) {
        if let Some(cell) = self.cells.get_mut(&key) {
            cell.retain(|&e| e != entity);
            if cell.is_empty() {
                self.cells.remove(&key);
            }
        }
    }

    /// All entities homed in cells covered by `aabb`, padded by one cell on
    /// every side so neighbors whose own extent reaches into the region are
    /// not missed.
    pub fn query(&self, aabb: &Aabb) -> Vec<Entity> {
        let (min_x, min_y) = cell_key(aabb.min);
        let (max_x, max_y) = cell_key(aabb.max);
        let mut out = Vec::new();
        for cx in (min_x - 1)..=(max_x + 1) {
            for cy in (min_y - 1)..=(max_y + 1) {
                if let Some(cell) = self.cells.get(&(cx, cy)) {
                    out.extend_from_slice(cell);
                }
            }
        }
        out
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.homes.contains_key(&entity)
    }

    pub fn len(&self) -> usize {
        self.homes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.homes.is_empty()
    }
}

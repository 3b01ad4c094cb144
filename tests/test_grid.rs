use bevy::prelude::*;
use bevy_arena::physics::grid::{cell_key, SpatialGrid, CELL_SIZE};
use bevy_arena::physics::Aabb;
use rand::prelude::*;
use std::collections::HashMap;

fn around(position: Vec2) -> Aabb {
    Aabb {
        min: position - Vec2::splat(1.0),
        max: position + Vec2::splat(1.0),
    }
}

/// Fresh entity handles without spinning up a full app.
fn entities(n: usize) -> (World, Vec<Entity>) {
    let mut world = World::new();
    let handles = (0..n).map(|_| world.spawn_empty().id()).collect();
    (world, handles)
}

#[test]
fn query_finds_inserted_entity() {
    let (_world, e) = entities(1);
    let mut grid = SpatialGrid::default();
    let position = Vec2::new(300.0, 450.0);
    grid.insert(e[0], position);

    assert!(grid.query(&around(position)).contains(&e[0]));
    assert!(grid.contains(e[0]));
    assert_eq!(grid.len(), 1);
}

#[test]
fn move_within_cell_keeps_entity_findable() {
    let (_world, e) = entities(1);
    let mut grid = SpatialGrid::default();
    let position = Vec2::new(10.0, 10.0);
    grid.insert(e[0], position);

    // Same cell, different point.
    let nudged = Vec2::new(CELL_SIZE - 1.0, CELL_SIZE - 1.0);
    assert_eq!(cell_key(position), cell_key(nudged));
    grid.update(e[0], nudged);

    assert_eq!(grid.len(), 1);
    assert!(grid.query(&around(nudged)).contains(&e[0]));
}

#[test]
fn move_across_cells_never_duplicates() {
    let (_world, e) = entities(1);
    let mut grid = SpatialGrid::default();
    let start = Vec2::new(10.0, 10.0);
    let far = Vec2::new(CELL_SIZE * 10.0, CELL_SIZE * 10.0);
    grid.insert(e[0], start);
    grid.update(e[0], far);

    assert_eq!(grid.len(), 1, "entity must live in exactly one cell");
    assert!(grid.query(&around(far)).contains(&e[0]));
    assert!(
        !grid.query(&around(start)).contains(&e[0]),
        "entity should have left its old cell"
    );
}

#[test]
fn remove_forgets_entity() {
    let (_world, e) = entities(1);
    let mut grid = SpatialGrid::default();
    let position = Vec2::new(-200.0, 999.0);
    grid.insert(e[0], position);
    grid.remove(e[0]);

    assert!(!grid.contains(e[0]));
    assert!(grid.is_empty());
    assert!(!grid.query(&around(position)).contains(&e[0]));

    // Removing twice is a no-op.
    grid.remove(e[0]);
    assert!(grid.is_empty());
}

#[test]
fn query_covers_neighboring_cells() {
    let (_world, e) = entities(1);
    let mut grid = SpatialGrid::default();
    // Just over a cell boundary from the query region.
    let position = Vec2::new(CELL_SIZE + 1.0, 0.0);
    grid.insert(e[0], position);

    let region = Aabb {
        min: Vec2::new(0.0, 0.0),
        max: Vec2::new(CELL_SIZE - 1.0, CELL_SIZE - 1.0),
    };
    assert!(
        grid.query(&region).contains(&e[0]),
        "query must include the one-cell neighborhood pad"
    );
}

#[test]
fn negative_coordinates_use_distinct_cells() {
    assert_ne!(cell_key(Vec2::new(-1.0, -1.0)), cell_key(Vec2::new(1.0, 1.0)));
    assert_eq!(cell_key(Vec2::new(-1.0, 0.0)), cell_key(Vec2::new(-CELL_SIZE + 1.0, 0.0)));
}

#[test]
fn fuzz_random_operations_stay_consistent() {
    let mut rng = StdRng::seed_from_u64(7);
    let (_world, handles) = entities(32);
    let mut grid = SpatialGrid::default();
    let mut mirror: HashMap<Entity, Vec2> = HashMap::new();

    for _ in 0..2000 {
        let entity = handles[rng.random_range(0..handles.len())];
        let position = Vec2::new(
            rng.random_range(-5000.0f32..=5000.0),
            rng.random_range(-5000.0f32..=5000.0),
        );
        match rng.random_range(0..4) {
            0 => {
                grid.insert(entity, position);
                mirror.insert(entity, position);
            }
            1 | 2 => {
                grid.update(entity, position);
                mirror.insert(entity, position);
            }
            _ => {
                grid.remove(entity);
                mirror.remove(&entity);
            }
        }

        assert_eq!(grid.len(), mirror.len(), "grid and mirror disagree on population");
        for (&entity, &last_position) in &mirror {
            assert!(
                grid.query(&around(last_position)).contains(&entity),
                "querying around an entity's last-set position must return it"
            );
        }
    }
}

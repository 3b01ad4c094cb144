use bevy::prelude::*;

use crate::shield::Shield;

use super::body::{Collider, Position, Rotation};
use super::shape::Shape;

/// Axis-aligned bounding box fully containing the transformed shape as of
/// the last refresh.
#[derive(Component, Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn of(shape: &Shape, position: Vec2, rotation: f32) -> Self {
        match shape.world_vertices(position, rotation) {
            None => {
                let r = shape.bounding_radius();
                Aabb {
                    min: position - Vec2::splat(r),
                    max: position + Vec2::splat(r),
                }
            }
            Some((vertices, count)) => {
                let mut min = vertices[0];
                let mut max = vertices[0];
                for v in &vertices[1..count] {
                    min = min.min(*v);
                    max = max.max(*v);
                }
                Aabb { min, max }
            }
        }
    }

    /// Box for the full collidable extent: the shape, widened to the
    /// shield bubble while one is up. The narrow phase substitutes the
    /// same radius, so broad and narrow phase agree on reach.
    pub fn of_collidable(
        shape: &Shape,
        shield: Option<&Shield>,
        position: Vec2,
        rotation: f32,
    ) -> Self {
        match shield {
            Some(shield) if shield.active() => {
                let r = shape.bounding_radius().max(shield.radius);
                Aabb {
                    min: position - Vec2::splat(r),
                    max: position + Vec2::splat(r),
                }
            }
            _ => Aabb::of(shape, position, rotation),
        }
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }
}

/// Recomputes boxes only for bodies whose transform or shield state
/// changed this tick. Most bodies (mines, arena obstacles) sit still most
/// ticks, so this is where the caching pays off. Shield changes count
/// because raising a charged shield grows the collidable extent.
pub(super) fn refresh(
    mut bodies: Query<
        (&Collider, Option<&Shield>, &Position, &Rotation, &mut Aabb),
        Or<(Changed<Position>, Changed<Rotation>, Changed<Shield>)>,
    >,
) {
    for (collider, shield, position, rotation, mut aabb) in bodies.iter_mut() {
        let fresh = Aabb::of_collidable(&collider.shape, shield, position.0, rotation.0);
        if fresh != *aabb {
            *aabb = fresh;
        }
    }
}

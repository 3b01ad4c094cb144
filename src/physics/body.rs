use bevy::prelude::*;

use super::aabb::Aabb;
use super::shape::Shape;

/// Whether a body is simulated or an immovable part of the arena.
#[derive(Component, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RigidBody {
    Dynamic,
    Static,
}

impl RigidBody {
    pub fn is_static(self) -> bool {
        matches!(self, RigidBody::Static)
    }
}

#[derive(Component, Clone, Copy, Debug, Default, PartialEq)]
pub struct Position(pub Vec2);

/// Orientation in radians, kept in `[0, 2π)` by the integrator.
#[derive(Component, Clone, Copy, Debug, Default, PartialEq)]
pub struct Rotation(pub f32);

#[derive(Component, Clone, Copy, Debug, Default, PartialEq)]
pub struct LinearVelocity(pub Vec2);

#[derive(Component, Clone, Copy, Debug, Default, PartialEq)]
pub struct AngularVelocity(pub f32);

/// Acceleration accumulator. Control and gravity contributions add into it;
/// the integrator consumes and zeroes it every tick.
#[derive(Component, Clone, Copy, Debug, Default, PartialEq)]
pub struct Acceleration(pub Vec2);

/// Shape and material of a body. Mass is never set directly; it is derived
/// from shape area and density (see [`MassProperties`]).
#[derive(Component, Clone, Copy, Debug, PartialEq)]
pub struct Collider {
    pub shape: Shape,
    pub density: f32,
    /// Restitution in `[0, 1]`.
    pub elasticity: f32,
    /// Per-tick multiplicative damping in `[0, 1]`.
    pub drag: f32,
}

#[derive(Component, Clone, Copy, Debug, Default, PartialEq)]
pub struct MassProperties {
    pub mass: f32,
    pub inv_mass: f32,
    pub inertia: f32,
    pub inv_inertia: f32,
}

impl MassProperties {
    /// Derive mass from `area × density`. Static bodies keep their computed
    /// mass but get zero inverse terms so no impulse or correction ever
    /// displaces them.
    pub fn derive(body: RigidBody, collider: &Collider) -> Self {
        let mass = collider.shape.area() * collider.density;
        let inertia = collider.shape.inertia(mass);
        if body.is_static() || mass <= 0.0 {
            MassProperties {
                mass,
                inv_mass: 0.0,
                inertia,
                inv_inertia: 0.0,
            }
        } else {
            MassProperties {
                mass,
                inv_mass: 1.0 / mass,
                inertia,
                inv_inertia: if inertia > 0.0 { 1.0 / inertia } else { 0.0 },
            }
        }
    }
}

/// Transform at the previous tick, for cheap moved-since checks.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct LastPose {
    pub position: Vec2,
    pub rotation: f32,
}

/// Tick at which the transform last changed. The sync layer serializes only
/// bodies stamped with the current tick.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct LastMoved(pub u64);

#[derive(Bundle, Clone)]
pub struct BodyBundle {
    pub body: RigidBody,
    pub collider: Collider,
    pub mass: MassProperties,
    pub position: Position,
    pub rotation: Rotation,
    pub linear_velocity: LinearVelocity,
    pub angular_velocity: AngularVelocity,
    pub acceleration: Acceleration,
    pub aabb: Aabb,
    pub last_pose: LastPose,
    pub last_moved: LastMoved,
    pub transform: Transform,
}

impl BodyBundle {
    pub fn new(body: RigidBody, collider: Collider, position: Vec2, rotation: f32) -> Self {
        let mass = MassProperties::derive(body, &collider);
        let aabb = Aabb::of(&collider.shape, position, rotation);
        BodyBundle {
            body,
            collider,
            mass,
            position: Position(position),
            rotation: Rotation(rotation),
            linear_velocity: LinearVelocity::default(),
            angular_velocity: AngularVelocity::default(),
            acceleration: Acceleration::default(),
            aabb,
            last_pose: LastPose { position, rotation },
            last_moved: LastMoved(0),
            transform: Transform::from_translation(position.extend(0.0)),
        }
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.linear_velocity = LinearVelocity(velocity);
        self
    }
}

/// Keeps [`MassProperties`] in sync when a collider or body kind changes
/// after spawn.
pub(super) fn derive_mass_properties(
    mut bodies: Query<
        (&RigidBody, &Collider, &mut MassProperties),
        Or<(Changed<Collider>, Changed<RigidBody>)>,
    >,
) {
    for (body, collider, mut mass) in bodies.iter_mut() {
        let derived = MassProperties::derive(*body, collider);
        if derived != *mass {
            *mass = derived;
        }
    }
}

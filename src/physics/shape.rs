use bevy::prelude::*;

/// Collision shape of a rigid body. Each variant carries only the fields
/// that describe it; derived quantities (area, inertia, extents) are
/// queried through the methods below.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Shape {
    Circle { radius: f32 },
    Box { half_extents: Vec2 },
    /// Convex triangle given as local vertices around the body origin,
    /// counter-clockwise.
    Triangle { vertices: [Vec2; 3] },
}

impl Shape {
    pub fn area(&self) -> f32 {
        match *self {
            Shape::Circle { radius } => std::f32::consts::PI * radius * radius,
            Shape::Box { half_extents } => 4.0 * half_extents.x * half_extents.y,
            Shape::Triangle { vertices: [a, b, c] } => 0.5 * (b - a).perp_dot(c - a).abs(),
        }
    }

    /// Moment of inertia about the body origin for the given mass.
    pub fn inertia(&self, mass: f32) -> f32 {
        match *self {
            Shape::Circle { radius } => 0.5 * mass * radius * radius,
            Shape::Box { half_extents } => {
                let w = 2.0 * half_extents.x;
                let h = 2.0 * half_extents.y;
                mass * (w * w + h * h) / 12.0
            }
            Shape::Triangle { vertices } => polygon_inertia(&vertices, mass),
        }
    }

    /// Radius of the smallest origin-centered circle containing the shape
    /// at any rotation.
    pub fn bounding_radius(&self) -> f32 {
        match *self {
            Shape::Circle { radius } => radius,
            Shape::Box { half_extents } => half_extents.length(),
            Shape::Triangle { vertices } => {
                vertices.iter().map(|v| v.length()).fold(0.0, f32::max)
            }
        }
    }

    /// World-space vertices for polygon shapes; `None` for circles.
    /// The returned array is valid up to the returned count.
    pub fn world_vertices(&self, position: Vec2, rotation: f32) -> Option<([Vec2; 4], usize)> {
        let rot = Vec2::from_angle(rotation);
        match *self {
            Shape::Circle { .. } => None,
            Shape::Box { half_extents } => {
                let Vec2 { x, y } = half_extents;
                let local = [
                    Vec2::new(-x, -y),
                    Vec2::new(x, -y),
                    Vec2::new(x, y),
                    Vec2::new(-x, y),
                ];
                let mut out = [Vec2::ZERO; 4];
                for (o, v) in out.iter_mut().zip(local) {
                    *o = position + rot.rotate(v);
                }
                Some((out, 4))
            }
            Shape::Triangle { vertices } => {
                let mut out = [Vec2::ZERO; 4];
                for (o, v) in out.iter_mut().zip(vertices) {
                    *o = position + rot.rotate(v);
                }
                Some((out, 3))
            }
        }
    }
}

/// Second moment of a uniform convex polygon about its centroid.
fn polygon_inertia(vertices: &[Vec2], mass: f32) -> f32 {
    let n = vertices.len();
    let mut twice_area = 0.0;
    let mut centroid = Vec2::ZERO;
    for i in 0..n {
        let a = vertices[i];
        let b = vertices[(i + 1) % n];
        let cross = a.perp_dot(b);
        twice_area += cross;
        centroid += (a + b) * cross;
    }
    if twice_area.abs() <= f32::EPSILON {
        return 0.0;
    }
    let centroid = centroid / (3.0 * twice_area);

    let mut numer = 0.0;
    let mut denom = 0.0;
    for i in 0..n {
        let a = vertices[i] - centroid;
        let b = vertices[(i + 1) % n] - centroid;
        let cross = a.perp_dot(b).abs();
        numer += cross * (a.dot(a) + a.dot(b) + b.dot(b));
        denom += cross;
    }
    mass * numer / (6.0 * denom)
}

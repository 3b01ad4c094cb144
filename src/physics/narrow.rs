use std::collections::{HashMap, HashSet};

use bevy::prelude::*;

use crate::projectile::Projectile;
use crate::shield::Shield;
use crate::TICK_DT;

use super::body::{
    AngularVelocity, Collider, LastMoved, LinearVelocity, MassProperties, Position, RigidBody,
    Rotation,
};
use super::broad::BroadPhasePairs;
use super::shape::Shape;
use super::SimTick;

/// Fixed sub-step count per tick. Re-resolving the same pair list several
/// times with capped corrections keeps stacked contacts stable.
const SUB_STEPS: usize = 8;
/// Maximum positional correction per sub-step, to avoid explosive pops.
const CORRECTION_CAP: f32 = 0.05;
/// Penetration below this is left to the velocity bias.
const CONTACT_SLOP: f32 = 0.01;
/// Baumgarte factor for the lingering-penetration velocity bias.
const BAUMGARTE: f32 = 0.2;
/// Cap on the bias separation speed so deep overlaps get a steady push,
/// never a launch, and restitution stays exact for real collisions.
const MAX_BIAS_SPEED: f32 = 4.0;
/// Post-impulse damping, suppressing jitter at rest.
const POST_DAMP_LINEAR: f32 = 0.999;
const POST_DAMP_ANGULAR: f32 = 0.98;

/// One resolved pair. Lives for a single tick; downstream systems (damage,
/// pickups) consume it and the list is cleared on the next run.
#[derive(Clone, Copy, Debug)]
pub struct Contact {
    pub a: Entity,
    pub b: Entity,
    /// Unit normal pointing from `b` toward `a`.
    pub normal: Vec2,
    pub penetration: f32,
    /// Total impulse applied across all sub-steps.
    pub impulse: f32,
}

#[derive(Resource, Default)]
pub struct Collisions(pub Vec<Contact>);

/// Emitted once per resolved pair per tick.
#[derive(Message, Clone, Copy, Debug)]
pub struct CollisionEvent {
    pub a: Entity,
    pub b: Entity,
    pub normal: Vec2,
    pub impulse: f32,
}

struct ContactGeom {
    normal: Vec2,
    penetration: f32,
    points: [Vec2; 2],
    count: usize,
}

#[derive(Clone, Copy)]
struct Scratch {
    entity: Entity,
    position: Vec2,
    rotation: f32,
    linear_velocity: Vec2,
    angular_velocity: f32,
    inv_mass: f32,
    inv_inertia: f32,
    elasticity: f32,
    shape: Shape,
    /// Circle substitution radius while a charged shield is up.
    effective_circle: Option<f32>,
    is_static: bool,
    firer: Option<Entity>,
    touched: bool,
}

pub(super) fn resolve(
    tick: Res<SimTick>,
    pairs: Res<BroadPhasePairs>,
    mut collisions: ResMut<Collisions>,
    mut events: MessageWriter<CollisionEvent>,
    mut bodies: Query<(
        &RigidBody,
        &Collider,
        &MassProperties,
        &mut Position,
        &Rotation,
        &mut LinearVelocity,
        &mut AngularVelocity,
        &mut LastMoved,
    )>,
    shields: Query<&Shield>,
    projectiles: Query<&Projectile>,
) {
    collisions.0.clear();

    // Snapshot every participating body once, then resolve sub-steps on the
    // snapshot so all pair tests within a step see consistent state.
    let mut index: HashMap<Entity, usize> = HashMap::new();
    let mut scratch: Vec<Scratch> = Vec::new();
    let mut active: Vec<(usize, usize)> = Vec::new();

    'pairs: for &(a, b) in &pairs.0 {
        for entity in [a, b] {
            if index.contains_key(&entity) {
                continue;
            }
            // Despawned mid-tick: drop the stale pair.
            let Ok((body, collider, mass, position, rotation, linear_velocity, angular_velocity, _)) =
                bodies.get(entity)
            else {
                continue 'pairs;
            };
            let shield_radius = shields.get(entity).ok().and_then(|shield| {
                shield
                    .active()
                    .then(|| collider.shape.bounding_radius().max(shield.radius))
            });
            let effective_circle = match collider.shape {
                Shape::Circle { radius } => Some(shield_radius.unwrap_or(radius)),
                _ => shield_radius,
            };
            index.insert(entity, scratch.len());
            scratch.push(Scratch {
                entity,
                position: position.0,
                rotation: rotation.0,
                linear_velocity: linear_velocity.0,
                angular_velocity: angular_velocity.0,
                inv_mass: mass.inv_mass,
                inv_inertia: mass.inv_inertia,
                elasticity: collider.elasticity,
                shape: collider.shape,
                effective_circle,
                is_static: body.is_static(),
                firer: projectiles.get(entity).ok().map(|p| p.firer),
                touched: false,
            });
        }
        let ia = index[&a];
        let ib = index[&b];

        // Ownership exclusions: projectiles never collide with their firer,
        // and two projectiles from the same firer pass through each other.
        match (scratch[ia].firer, scratch[ib].firer) {
            (Some(fa), Some(fb)) if fa == fb => continue,
            (Some(fa), _) if fa == b => continue,
            (_, Some(fb)) if fb == a => continue,
            _ => {}
        }
        active.push((ia, ib));
    }

    let mut accumulated: Vec<(Vec2, f32, f32)> = vec![(Vec2::ZERO, 0.0, 0.0); active.len()];
    let mut had_contact: Vec<bool> = vec![false; active.len()];

    for _ in 0..SUB_STEPS {
        let mut resolved: HashSet<usize> = HashSet::new();
        for (pair_index, &(ia, ib)) in active.iter().enumerate() {
            if resolved.contains(&ia) || resolved.contains(&ib) {
                continue;
            }
            let Some(geom) = contact_geometry(&scratch[ia], &scratch[ib]) else {
                continue;
            };

            let (head, tail) = scratch.split_at_mut(ia.max(ib));
            let (first, second) = if ia < ib {
                (&mut head[ia], &mut tail[0])
            } else {
                (&mut tail[0], &mut head[ib])
            };
            let applied = resolve_contact(first, second, &geom);

            had_contact[pair_index] = true;
            accumulated[pair_index].0 = geom.normal;
            accumulated[pair_index].1 = geom.penetration;
            accumulated[pair_index].2 += applied;

            resolved.insert(ia);
            resolved.insert(ib);
        }
        if resolved.is_empty() {
            break;
        }
    }

    for (pair_index, &(ia, ib)) in active.iter().enumerate() {
        if !had_contact[pair_index] {
            continue;
        }
        let (normal, penetration, impulse) = accumulated[pair_index];
        let contact = Contact {
            a: scratch[ia].entity,
            b: scratch[ib].entity,
            normal,
            penetration,
            impulse,
        };
        collisions.0.push(contact);
        events.write(CollisionEvent {
            a: contact.a,
            b: contact.b,
            normal: contact.normal,
            impulse: contact.impulse,
        });
    }

    #[cfg(feature = "physics_debug")]
    if !collisions.0.is_empty() {
        info!("narrow phase resolved {} contact(s)", collisions.0.len());
    }

    // Write corrected state back through the ECS, stamping movers.
    for s in &scratch {
        if !s.touched || s.is_static {
            continue;
        }
        let Ok((_, _, _, mut position, _, mut linear_velocity, mut angular_velocity, mut last_moved)) =
            bodies.get_mut(s.entity)
        else {
            continue;
        };
        if position.0 != s.position {
            position.0 = s.position;
            last_moved.0 = tick.0;
        }
        if linear_velocity.0 != s.linear_velocity {
            linear_velocity.0 = s.linear_velocity;
        }
        if angular_velocity.0 != s.angular_velocity {
            angular_velocity.0 = s.angular_velocity;
        }
    }
}

/// Positional correction plus impulse for one contact, on the scratch
/// state. Returns the impulse magnitude applied.
fn resolve_contact(a: &mut Scratch, b: &mut Scratch, geom: &ContactGeom) -> f32 {
    let total_inv = a.inv_mass + b.inv_mass;
    if total_inv <= 0.0 {
        return 0.0;
    }
    a.touched = true;
    b.touched = true;

    // Positional correction, weighted by inverse mass so heavier bodies
    // move less; statics (inverse mass zero) never move. Capped per
    // sub-step.
    let correction = (geom.penetration - CONTACT_SLOP)
        .max(0.0)
        .min(CORRECTION_CAP);
    if correction > 0.0 {
        a.position += geom.normal * correction * (a.inv_mass / total_inv);
        b.position -= geom.normal * correction * (b.inv_mass / total_inv);
    }

    let elasticity = a.elasticity.min(b.elasticity);
    let bias = (BAUMGARTE * (geom.penetration - CONTACT_SLOP).max(0.0) / TICK_DT)
        .min(MAX_BIAS_SPEED);
    let share = 1.0 / geom.count as f32;
    let mut total_impulse = 0.0;

    for point in &geom.points[..geom.count] {
        let ra = *point - a.position;
        let rb = *point - b.position;
        // Contact-point velocity includes each body's angular contribution.
        let va = a.linear_velocity + a.angular_velocity * ra.perp();
        let vb = b.linear_velocity + b.angular_velocity * rb.perp();
        let vn = (va - vb).dot(geom.normal);

        // Apply only when approaching, or when lingering penetration makes
        // the bias term demand a push.
        if vn >= bias {
            continue;
        }
        let ra_n = ra.perp_dot(geom.normal);
        let rb_n = rb.perp_dot(geom.normal);
        let denom = total_inv + ra_n * ra_n * a.inv_inertia + rb_n * rb_n * b.inv_inertia;
        if denom <= 0.0 {
            continue;
        }
        // Restitution or the bias floor, whichever asks for more; adding
        // them would overshoot the exchange velocity on clean impacts.
        let j = ((-(1.0 + elasticity) * vn).max(bias) / denom * share).max(0.0);
        let impulse = geom.normal * j;

        a.linear_velocity += impulse * a.inv_mass;
        a.angular_velocity += ra.perp_dot(impulse) * a.inv_inertia;
        b.linear_velocity -= impulse * b.inv_mass;
        b.angular_velocity -= rb.perp_dot(impulse) * b.inv_inertia;
        total_impulse += j;
    }

    if !a.is_static {
        a.linear_velocity *= POST_DAMP_LINEAR;
        a.angular_velocity *= POST_DAMP_ANGULAR;
    }
    if !b.is_static {
        b.linear_velocity *= POST_DAMP_LINEAR;
        b.angular_velocity *= POST_DAMP_ANGULAR;
    }

    total_impulse
}

/// Exact shape test for a pair, honoring shield circle substitution. The
/// returned normal points from `b` toward `a`.
fn contact_geometry(a: &Scratch, b: &Scratch) -> Option<ContactGeom> {
    match (a.effective_circle, b.effective_circle) {
        (Some(ra), Some(rb)) => circle_circle(a.position, ra, b.position, rb),
        (Some(ra), None) => {
            // circle_polygon points from the polygon to the circle, which
            // is already b → a here.
            let (verts, count) = b.shape.world_vertices(b.position, b.rotation)?;
            circle_polygon(a.position, ra, &verts[..count])
        }
        (None, Some(rb)) => {
            let (verts, count) = a.shape.world_vertices(a.position, a.rotation)?;
            circle_polygon(b.position, rb, &verts[..count]).map(|mut geom| {
                geom.normal = -geom.normal;
                geom
            })
        }
        (None, None) => {
            let (va, ca) = a.shape.world_vertices(a.position, a.rotation)?;
            let (vb, cb) = b.shape.world_vertices(b.position, b.rotation)?;
            polygon_polygon(&va[..ca], &vb[..cb])
        }
    }
}

/// The common, specialized path: squared-distance compare first.
fn circle_circle(pa: Vec2, ra: f32, pb: Vec2, rb: f32) -> Option<ContactGeom> {
    let delta = pa - pb;
    let radius_sum = ra + rb;
    if delta.length_squared() >= radius_sum * radius_sum {
        return None;
    }
    let dist = delta.length();
    let normal = if dist > f32::EPSILON {
        delta / dist
    } else {
        Vec2::X
    };
    let penetration = radius_sum - dist;
    // Midpoint of the overlap band.
    let point = ((pb + normal * rb) + (pa - normal * ra)) * 0.5;
    Some(ContactGeom {
        normal,
        penetration,
        points: [point, Vec2::ZERO],
        count: 1,
    })
}

/// Circle vs. convex CCW polygon. The returned normal points from the
/// polygon toward the circle center.
fn circle_polygon(center: Vec2, radius: f32, verts: &[Vec2]) -> Option<ContactGeom> {
    let n = verts.len();
    let mut inside = true;
    let mut closest = verts[0];
    let mut closest_dist_sq = f32::MAX;
    // Deepest face while inside: signed distance along the outward normal
    // is negative; track the greatest (closest to the surface).
    let mut best_face_dist = f32::MIN;
    let mut best_face_normal = Vec2::X;
    let mut best_face_point = verts[0];

    for i in 0..n {
        let v0 = verts[i];
        let v1 = verts[(i + 1) % n];
        let edge = v1 - v0;

        if edge.perp_dot(center - v0) < 0.0 {
            inside = false;
        }

        let t = ((center - v0).dot(edge) / edge.length_squared()).clamp(0.0, 1.0);
        let point = v0 + edge * t;
        let dist_sq = center.distance_squared(point);
        if dist_sq < closest_dist_sq {
            closest_dist_sq = dist_sq;
            closest = point;
        }

        let outward = Vec2::new(edge.y, -edge.x).normalize_or_zero();
        let face_dist = (center - v0).dot(outward);
        if face_dist > best_face_dist {
            best_face_dist = face_dist;
            best_face_normal = outward;
            best_face_point = center - outward * face_dist;
        }
    }

    if inside {
        return Some(ContactGeom {
            normal: best_face_normal,
            penetration: radius - best_face_dist,
            points: [best_face_point, Vec2::ZERO],
            count: 1,
        });
    }

    if closest_dist_sq >= radius * radius {
        return None;
    }
    let dist = closest_dist_sq.sqrt();
    let normal = if dist > f32::EPSILON {
        (center - closest) / dist
    } else {
        best_face_normal
    };
    Some(ContactGeom {
        normal,
        penetration: radius - dist,
        points: [closest, Vec2::ZERO],
        count: 1,
    })
}

/// Separating-axis test over both polygons' edge normals, producing the
/// minimum-overlap axis and up to two contained vertices as contact points.
fn polygon_polygon(verts_a: &[Vec2], verts_b: &[Vec2]) -> Option<ContactGeom> {
    let mut min_overlap = f32::MAX;
    let mut min_axis = Vec2::X;

    for verts in [verts_a, verts_b] {
        let n = verts.len();
        for i in 0..n {
            let edge = verts[(i + 1) % n] - verts[i];
            let axis = Vec2::new(edge.y, -edge.x).normalize_or_zero();
            if axis == Vec2::ZERO {
                continue;
            }
            let (min_a, max_a) = project(verts_a, axis);
            let (min_b, max_b) = project(verts_b, axis);
            let overlap = max_a.min(max_b) - min_a.max(min_b);
            if overlap < 0.0 {
                return None;
            }
            if overlap < min_overlap {
                min_overlap = overlap;
                min_axis = axis;
            }
        }
    }

    let center_a = polygon_center(verts_a);
    let center_b = polygon_center(verts_b);
    let normal = if min_axis.dot(center_a - center_b) >= 0.0 {
        min_axis
    } else {
        -min_axis
    };

    let mut points = [Vec2::ZERO; 2];
    let mut count = 0;
    for &v in verts_b {
        if count < 2 && point_in_polygon(v, verts_a) {
            points[count] = v;
            count += 1;
        }
    }
    for &v in verts_a {
        if count < 2 && point_in_polygon(v, verts_b) {
            points[count] = v;
            count += 1;
        }
    }
    if count == 0 {
        points[0] = (center_a + center_b) * 0.5;
        count = 1;
    }

    Some(ContactGeom {
        normal,
        penetration: min_overlap,
        points,
        count,
    })
}

fn project(verts: &[Vec2], axis: Vec2) -> (f32, f32) {
    let mut min = f32::MAX;
    let mut max = f32::MIN;
    for &v in verts {
        let d = v.dot(axis);
        min = min.min(d);
        max = max.max(d);
    }
    (min, max)
}

fn polygon_center(verts: &[Vec2]) -> Vec2 {
    verts.iter().copied().sum::<Vec2>() / verts.len() as f32
}

fn point_in_polygon(point: Vec2, verts: &[Vec2]) -> bool {
    let n = verts.len();
    for i in 0..n {
        let edge = verts[(i + 1) % n] - verts[i];
        if edge.perp_dot(point - verts[i]) < 0.0 {
            return false;
        }
    }
    true
}

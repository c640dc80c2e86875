//! Static collision geometry.
//!
//! Every collider answers two questions: [`Collider::test`] reports whether a
//! particle is in an inadmissible state and never mutates it, and
//! [`Collider::resolve`] pushes the particle back. Resolution always works
//! against a single plane:
//!
//! 1. the position is reflected across the plane, scaled by `1 + restitution`
//! 2. the normal velocity is reversed, scaled by `1 + restitution`
//! 3. the tangential velocity is damped by `friction`
//! 4. `prev_position` is rewritten from the new velocity so Verlet sees the
//!    same velocity on its next step

use bevy::prelude::*;

use super::particle::Particle;

/// Separation below which a direction is considered undefined.
const MIN_DISTANCE: f32 = 1e-6;

/// Two crossing parameters closer than this count as a tie.
const LAMBDA_TIE: f32 = 1e-6;

/// Infinite plane `normal · x + offset = 0`, admissible on the side the normal points to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaneCollider {
    pub normal: Vec3,
    pub offset: f32,
}

impl Default for PlaneCollider {
    fn default() -> Self {
        Self::floor(0.0)
    }
}

impl PlaneCollider {
    pub fn new(normal: Vec3, offset: f32) -> Self {
        Self {
            normal: normal.normalize_or(Vec3::Y),
            offset,
        }
    }

    /// Plane through `point` facing `normal`.
    pub fn from_point(normal: Vec3, point: Vec3) -> Self {
        let normal = normal.normalize_or(Vec3::Y);
        Self {
            normal,
            offset: -normal.dot(point),
        }
    }

    /// Horizontal floor at `height`, facing up.
    pub fn floor(height: f32) -> Self {
        Self::from_point(Vec3::Y, Vec3::new(0.0, height, 0.0))
    }

    #[inline]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.offset
    }
}

/// Sphere given by center and radius.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SphereCollider {
    pub center: Vec3,
    pub radius: f32,
}

impl SphereCollider {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Negative inside, positive outside.
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        (point - self.center).length() - self.radius
    }

    /// Outward direction from the center towards `prev`, falling back to `pos`.
    fn outward(&self, prev: Vec3, pos: Vec3) -> Vec3 {
        let from_prev = prev - self.center;
        if from_prev.length_squared() > MIN_DISTANCE * MIN_DISTANCE {
            return from_prev.normalize();
        }
        (pos - self.center).normalize_or(Vec3::Y)
    }
}

/// Axis-aligned box given by center and half extents.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AabbCollider {
    pub center: Vec3,
    pub half_extents: Vec3,
}

/// Face of an [`AabbCollider`] crossed by a segment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceCrossing {
    /// 0 = x, 1 = y, 2 = z.
    pub axis: usize,
    /// `1.0` for the maximum face, `-1.0` for the minimum face.
    pub side: f32,
    /// Segment parameter of the crossing in `[0, 1)`.
    pub lambda: f32,
}

impl AabbCollider {
    pub fn new(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            center,
            half_extents: half_extents.abs(),
        }
    }

    pub fn min(&self) -> Vec3 {
        self.center - self.half_extents
    }

    pub fn max(&self) -> Vec3 {
        self.center + self.half_extents
    }

    /// Strictly inside the box.
    pub fn contains(&self, point: Vec3) -> bool {
        (point - self.center).abs().cmplt(self.half_extents).all()
    }

    /// Outside at least one slab.
    pub fn exceeds(&self, point: Vec3) -> bool {
        (point - self.center).abs().cmpgt(self.half_extents).any()
    }

    /// Plane of a face with its normal pointing towards the box interior.
    fn inner_face(&self, axis: usize, side: f32) -> PlaneCollider {
        let normal = -side * Vec3::AXES[axis];
        let point = self.center + side * self.half_extents[axis] * Vec3::AXES[axis];
        PlaneCollider::from_point(normal, point)
    }

    /// Plane of a face with its normal pointing away from the box.
    fn outer_face(&self, axis: usize, side: f32) -> PlaneCollider {
        let normal = side * Vec3::AXES[axis];
        let point = self.center + side * self.half_extents[axis] * Vec3::AXES[axis];
        PlaneCollider::from_point(normal, point)
    }

    /// First face the segment `prev -> pos` leaves the box through.
    ///
    /// Faces are intersected as six planes; the smallest crossing parameter
    /// wins and exact ties go to the lowest axis, minimum face first.
    pub fn crossed_face(&self, prev: Vec3, pos: Vec3) -> Option<FaceCrossing> {
        let mut best: Option<FaceCrossing> = None;
        for axis in 0..3 {
            for side in [-1.0, 1.0] {
                let face = self.inner_face(axis, side);
                let d_prev = face.signed_distance(prev);
                let d_now = face.signed_distance(pos);
                if d_prev < 0.0 || d_now >= 0.0 {
                    continue;
                }
                let lambda = d_prev / (d_prev - d_now);
                if best.is_none_or(|b| lambda < b.lambda - LAMBDA_TIE) {
                    best = Some(FaceCrossing { axis, side, lambda });
                }
            }
        }
        best
    }
}

/// Static collision primitive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Collider {
    /// Particles must stay on the positive side. Detects crossings between
    /// `prev_position` and `position`.
    Plane(PlaneCollider),
    /// Solid sphere, particles stay outside.
    Sphere(SphereCollider),
    /// Solid box, particles stay outside.
    Aabb(AabbCollider),
    /// Box container, particles stay inside. Exceeded faces are resolved in axis order.
    InnerAabb(AabbCollider),
    /// Inverted sphere, particles stay inside.
    Snowball(SphereCollider),
    /// Box container resolved against the face the particle actually crossed.
    InnerAabbRay(AabbCollider),
}

impl Collider {
    pub fn plane(normal: Vec3, offset: f32) -> Self {
        Collider::Plane(PlaneCollider::new(normal, offset))
    }

    pub fn floor(height: f32) -> Self {
        Collider::Plane(PlaneCollider::floor(height))
    }

    pub fn sphere(center: Vec3, radius: f32) -> Self {
        Collider::Sphere(SphereCollider::new(center, radius))
    }

    pub fn aabb(center: Vec3, half_extents: Vec3) -> Self {
        Collider::Aabb(AabbCollider::new(center, half_extents))
    }

    pub fn inner_aabb(center: Vec3, half_extents: Vec3) -> Self {
        Collider::InnerAabb(AabbCollider::new(center, half_extents))
    }

    pub fn snowball(center: Vec3, radius: f32) -> Self {
        Collider::Snowball(SphereCollider::new(center, radius))
    }

    pub fn inner_aabb_ray(center: Vec3, half_extents: Vec3) -> Self {
        Collider::InnerAabbRay(AabbCollider::new(center, half_extents))
    }

    /// Reference point of the geometry.
    pub fn center(&self) -> Vec3 {
        match self {
            Collider::Plane(p) => -p.offset * p.normal,
            Collider::Sphere(s) | Collider::Snowball(s) => s.center,
            Collider::Aabb(b) | Collider::InnerAabb(b) | Collider::InnerAabbRay(b) => b.center,
        }
    }

    /// Move the geometry by `offset`.
    pub fn translate(&mut self, offset: Vec3) {
        match self {
            Collider::Plane(p) => p.offset -= p.normal.dot(offset),
            Collider::Sphere(s) | Collider::Snowball(s) => s.center += offset,
            Collider::Aabb(b) | Collider::InnerAabb(b) | Collider::InnerAabbRay(b) => {
                b.center += offset
            }
        }
    }

    /// Whether `particle` violates this collider. Never mutates the particle.
    pub fn test(&self, particle: &Particle) -> bool {
        let pos = particle.position;
        match self {
            // Half-space: crossing during the step and starting behind the plane both count.
            Collider::Plane(p) => p.signed_distance(pos) < 0.0,
            Collider::Sphere(s) => pos.distance_squared(s.center) < s.radius * s.radius,
            Collider::Snowball(s) => pos.distance_squared(s.center) > s.radius * s.radius,
            Collider::Aabb(b) => b.contains(pos),
            Collider::InnerAabb(b) | Collider::InnerAabbRay(b) => b.exceeds(pos),
        }
    }

    /// Push `particle` back into the admissible region.
    ///
    /// Call only when [`Collider::test`] is true. Immovable particles are left alone.
    pub fn resolve(&self, particle: &mut Particle, restitution: f32, friction: f32, dt: f32) {
        if particle.is_immovable() {
            return;
        }
        match self {
            Collider::Plane(p) => resolve_against_plane(particle, p, restitution, friction, dt),
            Collider::Sphere(s) => {
                let normal = s.outward(particle.prev_position, particle.position);
                let tangent = PlaneCollider::from_point(normal, s.center + normal * s.radius);
                resolve_against_plane(particle, &tangent, restitution, friction, dt);
            }
            Collider::Snowball(s) => {
                let outward = s.outward(particle.prev_position, particle.position);
                let tangent = PlaneCollider::from_point(-outward, s.center + outward * s.radius);
                resolve_against_plane(particle, &tangent, restitution, friction, dt);
            }
            Collider::Aabb(b) => {
                let (axis, side) = exit_face(b, particle.prev_position, particle.position);
                let face = b.outer_face(axis, side);
                resolve_against_plane(particle, &face, restitution, friction, dt);
            }
            Collider::InnerAabb(b) => resolve_exceeded_faces(b, particle, restitution, friction, dt),
            Collider::InnerAabbRay(b) => {
                if let Some(crossing) = b.crossed_face(particle.prev_position, particle.position) {
                    let face = b.inner_face(crossing.axis, crossing.side);
                    resolve_against_plane(particle, &face, restitution, friction, dt);
                }
                // Corners can leave the particle outside a second face.
                resolve_exceeded_faces(b, particle, restitution, friction, dt);
            }
        }
    }

    /// Test and resolve `particle` against each collider in order.
    pub fn resolve_all(
        colliders: &[Collider],
        particle: &mut Particle,
        restitution: f32,
        friction: f32,
        dt: f32,
    ) {
        if particle.is_immovable() {
            return;
        }
        for collider in colliders {
            if collider.test(particle) {
                collider.resolve(particle, restitution, friction, dt);
            }
        }
    }
}

/// Face used to push a particle out of a solid box.
///
/// Prefers the first axis whose slab `prev` was still outside of, otherwise
/// the face of least penetration.
fn exit_face(b: &AabbCollider, prev: Vec3, pos: Vec3) -> (usize, f32) {
    let prev_local = prev - b.center;
    for axis in 0..3 {
        if prev_local[axis].abs() >= b.half_extents[axis] {
            return (axis, side_of(prev_local[axis]));
        }
    }
    let local = pos - b.center;
    let penetration = b.half_extents - local.abs();
    let axis = if penetration.x <= penetration.y && penetration.x <= penetration.z {
        0
    } else if penetration.y <= penetration.z {
        1
    } else {
        2
    };
    (axis, side_of(local[axis]))
}

fn resolve_exceeded_faces(
    b: &AabbCollider,
    particle: &mut Particle,
    restitution: f32,
    friction: f32,
    dt: f32,
) {
    for axis in 0..3 {
        let local = particle.position[axis] - b.center[axis];
        if local.abs() > b.half_extents[axis] {
            let face = b.inner_face(axis, side_of(local));
            resolve_against_plane(particle, &face, restitution, friction, dt);
        }
    }
}

#[inline]
fn side_of(value: f32) -> f32 {
    if value < 0.0 {
        -1.0
    } else {
        1.0
    }
}

fn resolve_against_plane(
    particle: &mut Particle,
    plane: &PlaneCollider,
    restitution: f32,
    friction: f32,
    dt: f32,
) {
    let normal = plane.normal;
    let depth = plane.signed_distance(particle.position).min(0.0);
    particle.position -= (1.0 + restitution) * depth * normal;

    let vn = normal.dot(particle.velocity);
    if vn < 0.0 {
        particle.velocity -= (1.0 + restitution) * vn * normal;
    }
    let tangential = particle.velocity - normal.dot(particle.velocity) * normal;
    particle.velocity -= friction * tangential;

    if dt > 0.0 {
        particle.prev_position = particle.position - dt * particle.velocity;
    }
}

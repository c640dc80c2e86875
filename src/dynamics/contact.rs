//! Pairwise particle contacts driven by the spatial hash adjacency.
//!
//! Both passes expect [`SpatialHash::query_all`] to have run on the current
//! positions and visit each unordered pair once.

use bevy::prelude::*;

use super::particle::Particle;
use super::spatial::SpatialHash;

const MIN_DISTANCE: f32 = 1e-6;

/// Cloth self-collision settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SelfCollision {
    /// Minimum separation between non-adjacent mesh particles.
    pub thickness: f32,
    /// Mesh spacing used to turn grid coordinates into rest distances.
    pub spacing: f32,
    /// Fraction of relative velocity removed from colliding pairs.
    pub friction: f32,
}

impl Default for SelfCollision {
    fn default() -> Self {
        Self {
            thickness: 1.0,
            spacing: 1.0,
            friction: 0.0,
        }
    }
}

/// Mutable references to two distinct particles.
fn pair_mut(particles: &mut [Particle], i: usize, j: usize) -> Option<(&mut Particle, &mut Particle)> {
    if i == j || i.max(j) >= particles.len() {
        return None;
    }
    if i < j {
        let (left, right) = particles.split_at_mut(j);
        Some((&mut left[i], &mut right[0]))
    } else {
        let (left, right) = particles.split_at_mut(i);
        Some((&mut right[0], &mut left[j]))
    }
}

/// Rest distance squared between two mesh particles, unbounded when either
/// has no grid coordinate.
fn rest_distance_sq(a: &Particle, b: &Particle, spacing: f32) -> f32 {
    match (a.grid_coord, b.grid_coord) {
        (Some(ca), Some(cb)) => {
            let d = ca.as_vec2() - cb.as_vec2();
            d.length_squared() * spacing * spacing
        }
        _ => f32::INFINITY,
    }
}

/// Keep cloth particles at least `thickness` apart, never closer than their
/// rest distance in the mesh allows, and damp their relative velocity.
///
/// Operates on positions only, so it belongs after a Verlet substep. Returns
/// the number of corrected pairs.
pub fn resolve_self_collisions(
    particles: &mut [Particle],
    hash: &SpatialHash,
    settings: &SelfCollision,
) -> usize {
    let thickness_sq = settings.thickness * settings.thickness;
    let mut corrected = 0;

    for i in 0..particles.len() {
        for &j in hash.neighbors(i) {
            if j <= i {
                continue;
            }
            let Some((p0, p1)) = pair_mut(particles, i, j) else {
                continue;
            };
            let (w0, w1) = (p0.inv_mass(), p1.inv_mass());
            if w0 + w1 == 0.0 {
                continue;
            }

            let delta = p1.position - p0.position;
            let dist_sq = delta.length_squared();
            if dist_sq > thickness_sq || dist_sq == 0.0 {
                continue;
            }
            let rest_sq = rest_distance_sq(p0, p1, settings.spacing);
            if dist_sq > rest_sq {
                continue;
            }

            let min_dist = if rest_sq < thickness_sq {
                rest_sq.sqrt()
            } else {
                settings.thickness
            };
            let dist = dist_sq.sqrt();
            let correction = delta * ((min_dist - dist) / dist);
            p0.position -= correction * (w0 / (w0 + w1));
            p1.position += correction * (w1 / (w0 + w1));

            let v0 = p0.position - p0.prev_position;
            let v1 = p1.position - p1.prev_position;
            let average = 0.5 * (v0 + v1);
            if w0 > 0.0 {
                p0.position += settings.friction * (average - v0);
            }
            if w1 > 0.0 {
                p1.position += settings.friction * (average - v1);
            }
            corrected += 1;
        }
    }
    corrected
}

/// Separate free particles closer than `min_dist` and reflect their
/// approaching normal velocity.
///
/// Only pairs where both particles satisfy `active` interact. Positions and
/// previous positions are updated together so Verlet keeps the new velocity.
pub fn resolve_particle_contacts(
    particles: &mut [Particle],
    hash: &SpatialHash,
    min_dist: f32,
    restitution: f32,
    dt: f32,
    active: impl Fn(&Particle) -> bool,
) -> usize {
    let mut contacts = 0;
    for i in 0..particles.len() {
        for &j in hash.neighbors(i) {
            if j <= i {
                continue;
            }
            let Some((p0, p1)) = pair_mut(particles, i, j) else {
                continue;
            };
            if !active(p0) || !active(p1) {
                continue;
            }
            let (w0, w1) = (p0.inv_mass(), p1.inv_mass());
            if w0 + w1 == 0.0 {
                continue;
            }

            let delta = p1.position - p0.position;
            let dist = delta.length();
            if dist >= min_dist || dist < MIN_DISTANCE {
                continue;
            }
            let normal = delta / dist;
            let overlap = min_dist - dist;
            p0.position -= normal * overlap * (w0 / (w0 + w1));
            p1.position += normal * overlap * (w1 / (w0 + w1));

            let approach = (p1.velocity - p0.velocity).dot(normal);
            if approach < 0.0 {
                let impulse = -(1.0 + restitution) * approach / (w0 + w1);
                p0.velocity -= impulse * w0 * normal;
                p1.velocity += impulse * w1 * normal;
            }

            for p in [p0, p1] {
                if !p.is_immovable() && dt > 0.0 {
                    p.prev_position = p.position - dt * p.velocity;
                }
            }
            contacts += 1;
        }
    }
    contacts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adjacency(particles: &[Particle], max_dist: f32) -> SpatialHash {
        let positions: Vec<Vec3> = particles.iter().map(|p| p.position).collect();
        let mut hash = SpatialHash::new(max_dist, positions.len());
        hash.rebuild(&positions);
        hash.query_all(&positions, max_dist);
        hash
    }

    #[test]
    fn test_self_collision_pushes_distant_mesh_nodes_apart() {
        // Nodes four columns apart in the mesh but folded onto each other.
        let mut particles = vec![
            Particle::new(Vec3::ZERO).with_grid_coord(0, 0),
            Particle::new(Vec3::new(0.2, 0.0, 0.0)).with_grid_coord(4, 0),
        ];
        let hash = adjacency(&particles, 1.0);
        let settings = SelfCollision::default();

        assert_eq!(resolve_self_collisions(&mut particles, &hash, &settings), 1);
        let gap = particles[0].position.distance(particles[1].position);
        assert!((gap - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_self_collision_respects_rest_distance() {
        // Diagonal mesh neighbors closer than thickness but at their rest distance.
        let rest = 2f32.sqrt() * 0.5;
        let mut particles = vec![
            Particle::new(Vec3::ZERO).with_grid_coord(0, 0),
            Particle::new(Vec3::new(rest * 0.9, 0.0, 0.0)).with_grid_coord(1, 1),
        ];
        let hash = adjacency(&particles, 1.0);
        let settings = SelfCollision {
            thickness: 1.0,
            spacing: 0.5,
            friction: 0.0,
        };

        resolve_self_collisions(&mut particles, &hash, &settings);
        let gap = particles[0].position.distance(particles[1].position);
        assert!((gap - rest).abs() < 1e-5);
    }

    #[test]
    fn test_self_collision_friction_matches_velocities() {
        let mut particles = vec![
            Particle::launched(Vec3::ZERO, Vec3::X, 1.0).with_grid_coord(0, 0),
            Particle::launched(Vec3::new(0.0, 1.0, 0.0), Vec3::NEG_X, 1.0).with_grid_coord(9, 9),
        ];
        let hash = adjacency(&particles, 1.0);
        let settings = SelfCollision {
            friction: 1.0,
            ..default()
        };

        resolve_self_collisions(&mut particles, &hash, &settings);
        let v0 = particles[0].position - particles[0].prev_position;
        let v1 = particles[1].position - particles[1].prev_position;
        assert!((v0 - v1).length() < 1e-5);
    }

    #[test]
    fn test_self_collision_leaves_locked_pairs() {
        let mut particles = vec![
            Particle::new(Vec3::ZERO).with_grid_coord(0, 0).locked(),
            Particle::new(Vec3::new(0.1, 0.0, 0.0)).with_grid_coord(5, 0).locked(),
        ];
        let hash = adjacency(&particles, 1.0);

        assert_eq!(
            resolve_self_collisions(&mut particles, &hash, &SelfCollision::default()),
            0
        );
    }

    #[test]
    fn test_head_on_contact_swaps_velocities() {
        let mut particles = vec![
            Particle::new(Vec3::ZERO).with_velocity(Vec3::X),
            Particle::new(Vec3::new(1.5, 0.0, 0.0)).with_velocity(Vec3::NEG_X),
        ];
        let hash = adjacency(&particles, 2.0);

        let contacts = resolve_particle_contacts(&mut particles, &hash, 2.0, 1.0, 0.1, |_| true);

        assert_eq!(contacts, 1);
        assert!((particles[0].velocity - Vec3::NEG_X).length() < 1e-5);
        assert!((particles[1].velocity - Vec3::X).length() < 1e-5);
        assert!((particles[0].position.distance(particles[1].position) - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_inactive_particles_do_not_collide() {
        let mut particles = vec![
            Particle::new(Vec3::ZERO).with_life(1.0),
            Particle::new(Vec3::new(0.5, 0.0, 0.0)),
        ];
        let hash = adjacency(&particles, 2.0);

        let contacts =
            resolve_particle_contacts(&mut particles, &hash, 2.0, 1.0, 0.1, Particle::is_alive);
        assert_eq!(contacts, 0);
    }
}

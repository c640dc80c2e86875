//! Force generators.
//!
//! Every force acts on a set of particle indices ("influenced particles") and
//! adds into their force accumulators. The owning system zeroes accumulators
//! before evaluating forces, so applying a force is idempotent within a step.

use bevy::prelude::*;

use super::particle::Particle;

/// Distances below this are treated as coincident.
const MIN_DISTANCE: f32 = 1e-6;

/// Scale applied to blackhole intensity.
const BLACKHOLE_SCALE: f32 = 1000.0;

/// Stable handle to a force inside a [`ParticleSystem`](super::system::ParticleSystem).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ForceId(pub usize);

/// Velocity drag model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DragMode {
    #[default]
    None,
    /// `F = -c v`
    Linear,
    /// `F = -c |v| v`
    Quadratic,
}

/// Role of a spring inside a cloth or rope mesh.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SpringKind {
    #[default]
    Stretch,
    Shear,
    Bend,
}

impl SpringKind {
    /// Whether constraint relaxation projects this spring.
    pub fn is_relaxed(self) -> bool {
        matches!(self, SpringKind::Stretch | SpringKind::Shear)
    }
}

/// Constant acceleration such as gravity or wind. Scaled by particle mass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstantAcceleration {
    pub acceleration: Vec3,
    pub particles: Vec<usize>,
}

/// Velocity-dependent drag.
#[derive(Clone, Debug, PartialEq)]
pub struct Drag {
    pub mode: DragMode,
    pub coefficient: f32,
    pub particles: Vec<usize>,
}

impl Default for Drag {
    fn default() -> Self {
        Self {
            mode: DragMode::Linear,
            coefficient: 0.015,
            particles: Vec::new(),
        }
    }
}

/// Inverse-cube point attractor.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Blackhole {
    pub center: Vec3,
    pub intensity: f32,
    pub particles: Vec<usize>,
}

/// Damped spring between two particles.
#[derive(Clone, Debug, PartialEq)]
pub struct Spring {
    /// Endpoint indices `[a, b]`.
    pub particles: [usize; 2],
    pub rest_length: f32,
    pub stiffness: f32,
    pub damping: f32,
    pub kind: SpringKind,
}

impl Spring {
    pub fn new(a: usize, b: usize, rest_length: f32, stiffness: f32, damping: f32) -> Self {
        Self {
            particles: [a, b],
            rest_length,
            stiffness,
            damping,
            kind: SpringKind::Stretch,
        }
    }

    pub fn with_kind(mut self, kind: SpringKind) -> Self {
        self.kind = kind;
        self
    }

    #[inline]
    pub fn a(&self) -> usize {
        self.particles[0]
    }

    #[inline]
    pub fn b(&self) -> usize {
        self.particles[1]
    }

    /// Force on endpoint `a`; endpoint `b` receives the negation.
    ///
    /// Returns `None` when the endpoints coincide.
    pub fn force_on_a(&self, pa: &Particle, pb: &Particle) -> Option<Vec3> {
        let delta = pb.position - pa.position;
        let length = delta.length();
        if length < MIN_DISTANCE {
            return None;
        }
        let dir = delta / length;
        let relative_velocity = pb.velocity - pa.velocity;
        let magnitude = self.stiffness * (length - self.rest_length)
            + self.damping * relative_velocity.dot(dir);
        Some(magnitude * dir)
    }
}

/// Externally computed per-particle force, assigned once per step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SphForce {
    pub particles: Vec<usize>,
    /// Force for `particles[k]`, same length as `particles`.
    pub forces: Vec<Vec3>,
}

impl SphForce {
    pub fn new(particles: Vec<usize>) -> Self {
        let forces = vec![Vec3::ZERO; particles.len()];
        Self { particles, forces }
    }

    /// Zero every stored force.
    pub fn clear_forces(&mut self) {
        self.forces.fill(Vec3::ZERO);
    }
}

/// A force generator.
#[derive(Clone, Debug, PartialEq)]
pub enum Force {
    Acceleration(ConstantAcceleration),
    Drag(Drag),
    Blackhole(Blackhole),
    Spring(Spring),
    Sph(SphForce),
}

impl Force {
    /// Gravity-like constant acceleration on `particles`.
    pub fn acceleration(acceleration: Vec3, particles: Vec<usize>) -> Self {
        Force::Acceleration(ConstantAcceleration {
            acceleration,
            particles,
        })
    }

    pub fn drag(mode: DragMode, coefficient: f32, particles: Vec<usize>) -> Self {
        Force::Drag(Drag {
            mode,
            coefficient,
            particles,
        })
    }

    pub fn blackhole(center: Vec3, intensity: f32, particles: Vec<usize>) -> Self {
        Force::Blackhole(Blackhole {
            center,
            intensity,
            particles,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Force::Acceleration(_) => "acceleration",
            Force::Drag(_) => "drag",
            Force::Blackhole(_) => "blackhole",
            Force::Spring(_) => "spring",
            Force::Sph(_) => "sph",
        }
    }

    /// Indices this force acts on.
    pub fn influenced(&self) -> &[usize] {
        match self {
            Force::Acceleration(f) => &f.particles,
            Force::Drag(f) => &f.particles,
            Force::Blackhole(f) => &f.particles,
            Force::Spring(f) => &f.particles,
            Force::Sph(f) => &f.particles,
        }
    }

    /// Add a particle to the influenced set. Springs have fixed endpoints and
    /// return `false`.
    pub fn add_influenced(&mut self, index: usize) -> bool {
        match self {
            Force::Acceleration(f) => f.particles.push(index),
            Force::Drag(f) => f.particles.push(index),
            Force::Blackhole(f) => f.particles.push(index),
            Force::Sph(f) => {
                f.particles.push(index);
                f.forces.push(Vec3::ZERO);
            }
            Force::Spring(_) => return false,
        }
        true
    }

    /// Remove every influenced particle. Springs are left untouched.
    pub fn clear_influenced(&mut self) {
        match self {
            Force::Acceleration(f) => f.particles.clear(),
            Force::Drag(f) => f.particles.clear(),
            Force::Blackhole(f) => f.particles.clear(),
            Force::Sph(f) => {
                f.particles.clear();
                f.forces.clear();
            }
            Force::Spring(_) => {}
        }
    }

    pub fn as_spring(&self) -> Option<&Spring> {
        match self {
            Force::Spring(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_spring_mut(&mut self) -> Option<&mut Spring> {
        match self {
            Force::Spring(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sph_mut(&mut self) -> Option<&mut SphForce> {
        match self {
            Force::Sph(f) => Some(f),
            _ => None,
        }
    }

    /// Add this force's contribution to the accumulators of `particles`.
    ///
    /// Immovable particles receive nothing and out-of-range indices are skipped.
    pub fn apply(&self, particles: &mut [Particle]) {
        match self {
            Force::Acceleration(f) => {
                for &i in &f.particles {
                    if let Some(p) = movable(particles, i) {
                        p.force += p.mass * f.acceleration;
                    }
                }
            }
            Force::Drag(f) => {
                for &i in &f.particles {
                    if let Some(p) = movable(particles, i) {
                        p.force += match f.mode {
                            DragMode::None => Vec3::ZERO,
                            DragMode::Linear => -f.coefficient * p.velocity,
                            DragMode::Quadratic => {
                                -f.coefficient * p.velocity.length() * p.velocity
                            }
                        };
                    }
                }
            }
            Force::Blackhole(f) => {
                for &i in &f.particles {
                    if let Some(p) = movable(particles, i) {
                        let to_center = f.center - p.position;
                        let dist = to_center.length();
                        if dist < MIN_DISTANCE {
                            continue;
                        }
                        p.force += to_center / dist * f.intensity * BLACKHOLE_SCALE
                            / (dist * dist * dist);
                    }
                }
            }
            Force::Spring(s) => {
                let [a, b] = s.particles;
                if a >= particles.len() || b >= particles.len() || a == b {
                    return;
                }
                let Some(force) = s.force_on_a(&particles[a], &particles[b]) else {
                    return;
                };
                if !particles[a].is_immovable() {
                    particles[a].force += force;
                }
                if !particles[b].is_immovable() {
                    particles[b].force -= force;
                }
            }
            Force::Sph(f) => {
                for (&i, &force) in f.particles.iter().zip(&f.forces) {
                    if let Some(p) = movable(particles, i) {
                        p.force += force;
                    }
                }
            }
        }
    }
}

#[inline]
fn movable(particles: &mut [Particle], i: usize) -> Option<&mut Particle> {
    particles.get_mut(i).filter(|p| !p.is_immovable())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(distance: f32) -> Vec<Particle> {
        vec![
            Particle::new(Vec3::ZERO),
            Particle::new(Vec3::new(distance, 0.0, 0.0)),
        ]
    }

    #[test]
    fn test_gravity_scales_with_mass() {
        let mut particles = vec![Particle::new(Vec3::ZERO).with_mass(2.0)];
        let gravity = Force::acceleration(Vec3::new(0.0, -9.81, 0.0), vec![0]);
        gravity.apply(&mut particles);

        assert_eq!(particles[0].force, Vec3::new(0.0, -19.62, 0.0));
    }

    #[test]
    fn test_locked_particles_receive_no_force() {
        let mut particles = vec![Particle::new(Vec3::ZERO).locked()];
        Force::acceleration(Vec3::NEG_Y, vec![0]).apply(&mut particles);
        Force::blackhole(Vec3::X, 1.0, vec![0]).apply(&mut particles);

        assert_eq!(particles[0].force, Vec3::ZERO);
    }

    #[test]
    fn test_spring_obeys_third_law() {
        let mut particles = pair(1.5);
        particles[1].velocity = Vec3::new(0.5, 0.0, 0.0);
        let spring = Force::Spring(Spring::new(0, 1, 1.0, 10.0, 2.0));
        spring.apply(&mut particles);

        // 10 * 0.5 stretch + 2 * 0.5 separation speed
        assert!((particles[0].force - Vec3::new(6.0, 0.0, 0.0)).length() < 1e-5);
        assert_eq!(particles[0].force, -particles[1].force);
    }

    #[test]
    fn test_spring_skips_locked_endpoint() {
        let mut particles = pair(2.0);
        particles[0].locked = true;
        Force::Spring(Spring::new(0, 1, 1.0, 1.0, 0.0)).apply(&mut particles);

        assert_eq!(particles[0].force, Vec3::ZERO);
        assert_eq!(particles[1].force, Vec3::new(-1.0, 0.0, 0.0));
    }

    #[test]
    fn test_spring_degenerate_length() {
        let mut particles = pair(0.0);
        Force::Spring(Spring::new(0, 1, 1.0, 5.0, 1.0)).apply(&mut particles);

        assert!(particles.iter().all(|p| p.force == Vec3::ZERO));
    }

    #[test]
    fn test_drag_modes() {
        let mut particles = vec![Particle::new(Vec3::ZERO).with_velocity(Vec3::new(2.0, 0.0, 0.0))];
        Force::drag(DragMode::Linear, 0.5, vec![0]).apply(&mut particles);
        assert_eq!(particles[0].force, Vec3::new(-1.0, 0.0, 0.0));

        particles[0].force = Vec3::ZERO;
        Force::drag(DragMode::Quadratic, 0.5, vec![0]).apply(&mut particles);
        assert_eq!(particles[0].force, Vec3::new(-2.0, 0.0, 0.0));

        particles[0].force = Vec3::ZERO;
        Force::drag(DragMode::None, 0.5, vec![0]).apply(&mut particles);
        assert_eq!(particles[0].force, Vec3::ZERO);
    }

    #[test]
    fn test_blackhole_inverse_cube() {
        let mut particles = vec![Particle::new(Vec3::new(2.0, 0.0, 0.0))];
        Force::blackhole(Vec3::ZERO, 1.0, vec![0]).apply(&mut particles);

        assert!((particles[0].force - Vec3::new(-125.0, 0.0, 0.0)).length() < 1e-3);
    }

    #[test]
    fn test_sph_force_assignment() {
        let mut particles = pair(1.0);
        let mut force = Force::Sph(SphForce::new(vec![0, 1]));
        if let Some(sph) = force.as_sph_mut() {
            sph.forces[1] = Vec3::Y;
        }
        force.apply(&mut particles);

        assert_eq!(particles[0].force, Vec3::ZERO);
        assert_eq!(particles[1].force, Vec3::Y);
    }

    #[test]
    fn test_influenced_bookkeeping() {
        let mut gravity = Force::acceleration(Vec3::NEG_Y, Vec::new());
        assert!(gravity.add_influenced(3));
        assert_eq!(gravity.influenced(), &[3]);
        gravity.clear_influenced();
        assert!(gravity.influenced().is_empty());

        let mut spring = Force::Spring(Spring::new(0, 1, 1.0, 1.0, 0.0));
        assert!(!spring.add_influenced(2));
        assert_eq!(spring.influenced(), &[0, 1]);
    }
}

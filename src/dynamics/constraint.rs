//! Spring length relaxation for cloth and ropes.
//!
//! After each substep every stretch and shear spring whose length left the
//! tolerance band is projected back onto the nearest band edge. Passes are
//! Gauss-Seidel style: each projection sees the corrections made before it.

use bevy::prelude::*;

use super::force::Spring;
use super::particle::Particle;
use super::system::ParticleSystem;

const MIN_LENGTH: f32 = 1e-6;

/// Admissible spring length range as fractions of the rest length.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LengthBand {
    pub min_ratio: f32,
    pub max_ratio: f32,
}

impl Default for LengthBand {
    fn default() -> Self {
        Self {
            min_ratio: 0.9,
            max_ratio: 1.1,
        }
    }
}

impl LengthBand {
    pub fn new(min_ratio: f32, max_ratio: f32) -> Self {
        Self {
            min_ratio: min_ratio.min(max_ratio),
            max_ratio: max_ratio.max(min_ratio),
        }
    }

    /// Nearest admissible length for a spring currently `length` long.
    #[inline]
    pub fn clamp(&self, length: f32, rest_length: f32) -> f32 {
        length.clamp(self.min_ratio * rest_length, self.max_ratio * rest_length)
    }

    pub fn contains(&self, length: f32, rest_length: f32) -> bool {
        length >= self.min_ratio * rest_length && length <= self.max_ratio * rest_length
    }
}

/// Project one spring back into `band`. Returns whether anything moved.
///
/// The correction is split evenly between free endpoints. A locked endpoint
/// pushes the whole correction onto the other one; two locked endpoints
/// leave the violation in place.
pub fn project_spring(particles: &mut [Particle], spring: &Spring, band: LengthBand) -> bool {
    let [a, b] = spring.particles;
    if a >= particles.len() || b >= particles.len() || a == b {
        return false;
    }

    let (pa, pb) = (particles[a].position, particles[b].position);
    let delta = pb - pa;
    let length = delta.length();
    if length < MIN_LENGTH {
        return false;
    }
    let target = band.clamp(length, spring.rest_length);
    if target == length {
        return false;
    }
    let dir = delta / length;

    match (particles[a].is_immovable(), particles[b].is_immovable()) {
        (true, true) => return false,
        (true, false) => particles[b].position = pa + target * dir,
        (false, true) => particles[a].position = pb - target * dir,
        (false, false) => {
            let center = 0.5 * (pa + pb);
            particles[a].position = center - 0.5 * target * dir;
            particles[b].position = center + 0.5 * target * dir;
        }
    }
    true
}

/// Run up to `iterations` relaxation passes over the relaxed springs of
/// `system`, stopping early once a pass changes nothing. Returns the number of
/// passes that moved particles.
pub fn relax_springs(system: &mut ParticleSystem, iterations: u32, band: LengthBand) -> u32 {
    let (particles, forces) = system.split_mut();
    let mut passes = 0;
    for _ in 0..iterations {
        let mut moved = false;
        for spring in forces.iter().filter_map(|f| f.as_spring()) {
            if spring.kind.is_relaxed() {
                moved |= project_spring(particles, spring, band);
            }
        }
        if !moved {
            break;
        }
        passes += 1;
    }
    passes
}

/// Largest relative deviation from rest length over the relaxed springs.
pub fn max_stretch_error(system: &ParticleSystem) -> f32 {
    let particles = system.particles();
    system
        .springs()
        .filter(|s| s.kind.is_relaxed() && s.rest_length > 0.0)
        .filter_map(|s| {
            let a = particles.get(s.a())?;
            let b = particles.get(s.b())?;
            Some((a.position.distance(b.position) / s.rest_length - 1.0).abs())
        })
        .fold(0.0, f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::force::SpringKind;

    fn stretched_pair(distance: f32) -> ParticleSystem {
        let mut system = ParticleSystem::new();
        system.add_particle(Particle::new(Vec3::ZERO));
        system.add_particle(Particle::new(Vec3::new(distance, 0.0, 0.0)));
        system.add_spring(Spring::new(0, 1, 1.0, 10.0, 0.0));
        system
    }

    fn distance(system: &ParticleSystem) -> f32 {
        system.particles()[0]
            .position
            .distance(system.particles()[1].position)
    }

    #[test]
    fn test_relaxation_converges_into_band() {
        let mut system = stretched_pair(1.5);
        relax_springs(&mut system, 5, LengthBand::default());

        let d = distance(&system);
        assert!(d > 0.9 - 1e-5 && d < 1.1 + 1e-5, "distance {d}");
        // The midpoint is preserved by a symmetric split.
        let center = 0.5 * (system.particles()[0].position + system.particles()[1].position);
        assert!((center - Vec3::new(0.75, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_compressed_spring_expands() {
        let mut system = stretched_pair(0.5);
        relax_springs(&mut system, 1, LengthBand::default());
        assert!((distance(&system) - 0.9).abs() < 1e-5);
    }

    #[test]
    fn test_locked_endpoint_takes_no_correction() {
        let mut system = stretched_pair(2.0);
        system.set_locked(0, true);
        relax_springs(&mut system, 3, LengthBand::default());

        assert_eq!(system.particles()[0].position, Vec3::ZERO);
        assert!((system.particles()[1].position.x - 1.1).abs() < 1e-5);
    }

    #[test]
    fn test_both_locked_is_left_violated() {
        let mut system = stretched_pair(2.0);
        system.set_locked(0, true);
        system.set_locked(1, true);

        assert_eq!(relax_springs(&mut system, 3, LengthBand::default()), 0);
        assert_eq!(distance(&system), 2.0);
    }

    #[test]
    fn test_bend_springs_are_not_relaxed() {
        let mut system = ParticleSystem::new();
        system.add_particle(Particle::new(Vec3::ZERO));
        system.add_particle(Particle::new(Vec3::new(3.0, 0.0, 0.0)));
        system.add_spring(Spring::new(0, 1, 1.0, 1.0, 0.0).with_kind(SpringKind::Bend));

        assert_eq!(relax_springs(&mut system, 3, LengthBand::default()), 0);
        assert_eq!(distance(&system), 3.0);
    }

    #[test]
    fn test_coincident_endpoints_are_skipped() {
        let mut system = stretched_pair(0.0);
        relax_springs(&mut system, 3, LengthBand::default());
        assert!(system.particles().iter().all(|p| p.position.is_finite()));
    }

    #[test]
    fn test_chain_settles() {
        let mut system = ParticleSystem::new();
        for i in 0..6 {
            let p = Particle::new(Vec3::new(1.6 * i as f32, 0.0, 0.0));
            system.add_particle(if i == 0 { p.locked() } else { p });
        }
        for i in 0..5 {
            system.add_spring(Spring::new(i, i + 1, 1.0, 10.0, 0.0));
        }

        relax_springs(&mut system, 50, LengthBand::default());
        assert!(max_stretch_error(&system) <= 0.1 + 1e-4);
    }
}

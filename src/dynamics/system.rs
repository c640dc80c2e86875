//! Particle system: the single owner of a body's particles and forces.
//!
//! Integrators see the system through two views. The phase-space view packs
//! all positions followed by all velocities into one vector, with
//! [`ParticleSystem::derivative`] recomputing forces at whatever state was last
//! written. The position view exposes positions, previous positions and
//! accelerations for Verlet-style stepping.

use bevy::prelude::*;

use super::force::{Force, ForceId, Spring};
use super::particle::{GpuParticle, Particle};

/// Insertion-ordered particles and forces with stable indices.
#[derive(Clone, Debug, Default)]
pub struct ParticleSystem {
    particles: Vec<Particle>,
    forces: Vec<Force>,
}

impl ParticleSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(particles: usize) -> Self {
        Self {
            particles: Vec::with_capacity(particles),
            forces: Vec::new(),
        }
    }

    /// Add a particle and return its index. The particle's `id` is overwritten.
    pub fn add_particle(&mut self, mut particle: Particle) -> usize {
        let id = self.particles.len();
        particle.id = id;
        self.particles.push(particle);
        id
    }

    pub fn add_force(&mut self, force: Force) -> ForceId {
        self.forces.push(force);
        ForceId(self.forces.len() - 1)
    }

    pub fn add_spring(&mut self, spring: Spring) -> ForceId {
        self.add_force(Force::Spring(spring))
    }

    /// Drop every particle and force.
    pub fn clear(&mut self) {
        self.particles.clear();
        self.forces.clear();
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn particle(&self, i: usize) -> Option<&Particle> {
        self.particles.get(i)
    }

    pub fn particle_mut(&mut self, i: usize) -> Option<&mut Particle> {
        self.particles.get_mut(i)
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    pub fn forces(&self) -> &[Force] {
        &self.forces
    }

    pub fn forces_mut(&mut self) -> &mut [Force] {
        &mut self.forces
    }

    pub fn force(&self, id: ForceId) -> Option<&Force> {
        self.forces.get(id.0)
    }

    pub fn force_mut(&mut self, id: ForceId) -> Option<&mut Force> {
        self.forces.get_mut(id.0)
    }

    /// Both collections at once, for passes that read forces while moving particles.
    pub fn split_mut(&mut self) -> (&mut [Particle], &[Force]) {
        (&mut self.particles, &self.forces)
    }

    pub fn springs(&self) -> impl Iterator<Item = &Spring> {
        self.forces.iter().filter_map(Force::as_spring)
    }

    /// Zero every force accumulator.
    pub fn reset_forces(&mut self) {
        for p in &mut self.particles {
            p.force = Vec3::ZERO;
        }
    }

    /// Recompute every accumulator from scratch at the current state.
    pub fn update_forces(&mut self) {
        self.reset_forces();
        for force in &self.forces {
            force.apply(&mut self.particles);
        }
    }

    /// Phase-space state: all positions followed by all velocities.
    pub fn state(&self) -> Vec<Vec3> {
        let mut state = Vec::with_capacity(2 * self.particles.len());
        state.extend(self.particles.iter().map(|p| p.position));
        state.extend(self.particles.iter().map(|p| p.velocity));
        state
    }

    /// Write a phase-space state back. Immovable particles keep their values.
    pub fn set_state(&mut self, state: &[Vec3]) {
        let n = self.particles.len();
        if state.len() != 2 * n {
            return;
        }
        let (positions, velocities) = state.split_at(n);
        for ((p, &x), &v) in self.particles.iter_mut().zip(positions).zip(velocities) {
            if p.is_immovable() {
                continue;
            }
            p.position = x;
            p.velocity = v;
        }
    }

    /// Time derivative of the current state: velocities followed by
    /// accelerations. Recomputes forces first. Immovable particles contribute zeros.
    pub fn derivative(&mut self) -> Vec<Vec3> {
        self.update_forces();
        let mut derivative = Vec::with_capacity(2 * self.particles.len());
        derivative.extend(self.particles.iter().map(|p| {
            if p.is_immovable() {
                Vec3::ZERO
            } else {
                p.velocity
            }
        }));
        derivative.extend(self.particles.iter().map(|p| p.force * p.inv_mass()));
        derivative
    }

    pub fn positions(&self) -> Vec<Vec3> {
        self.particles.iter().map(|p| p.position).collect()
    }

    pub fn set_positions(&mut self, positions: &[Vec3]) {
        for (p, &x) in self.particles.iter_mut().zip(positions) {
            if !p.is_immovable() {
                p.position = x;
            }
        }
    }

    pub fn prev_positions(&self) -> Vec<Vec3> {
        self.particles.iter().map(|p| p.prev_position).collect()
    }

    pub fn set_prev_positions(&mut self, positions: &[Vec3]) {
        for (p, &x) in self.particles.iter_mut().zip(positions) {
            if !p.is_immovable() {
                p.prev_position = x;
            }
        }
    }

    pub fn velocities(&self) -> Vec<Vec3> {
        self.particles.iter().map(|p| p.velocity).collect()
    }

    pub fn set_velocities(&mut self, velocities: &[Vec3]) {
        for (p, &v) in self.particles.iter_mut().zip(velocities) {
            if !p.is_immovable() {
                p.velocity = v;
            }
        }
    }

    /// Accelerations at the current state. Recomputes forces first.
    pub fn accelerations(&mut self) -> Vec<Vec3> {
        self.update_forces();
        self.particles
            .iter()
            .map(|p| p.force * p.inv_mass())
            .collect()
    }

    /// Move a particle together with its previous position so no velocity is injected.
    pub fn translate_particle(&mut self, i: usize, offset: Vec3) -> bool {
        let Some(p) = self.particles.get_mut(i) else {
            return false;
        };
        p.position += offset;
        p.prev_position += offset;
        true
    }

    pub fn set_locked(&mut self, i: usize, locked: bool) -> bool {
        let Some(p) = self.particles.get_mut(i) else {
            return false;
        };
        p.locked = locked;
        if locked {
            p.velocity = Vec3::ZERO;
            p.prev_position = p.position;
        }
        true
    }

    pub fn kinetic_energy(&self) -> f32 {
        self.particles
            .iter()
            .filter(|p| !p.is_immovable())
            .map(|p| 0.5 * p.mass * p.velocity.length_squared())
            .sum()
    }

    /// GPU upload layout of every particle.
    pub fn gpu_particles(&self) -> Vec<GpuParticle> {
        self.particles.iter().map(GpuParticle::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn falling_pair() -> ParticleSystem {
        let mut system = ParticleSystem::new();
        system.add_particle(Particle::new(Vec3::ZERO).with_velocity(Vec3::X));
        system.add_particle(Particle::new(Vec3::Y).locked());
        system.add_force(Force::acceleration(Vec3::new(0.0, -10.0, 0.0), vec![0, 1]));
        system
    }

    #[test]
    fn test_ids_follow_insertion_order() {
        let mut system = ParticleSystem::new();
        let a = system.add_particle(Particle::new(Vec3::ZERO));
        let b = system.add_particle(Particle::new(Vec3::ONE));

        assert_eq!((a, b), (0, 1));
        assert_eq!(system.particle(1).map(|p| p.id), Some(1));
        assert!(system.particle(2).is_none());
    }

    #[test]
    fn test_state_layout() {
        let system = falling_pair();
        let state = system.state();

        assert_eq!(state, vec![Vec3::ZERO, Vec3::Y, Vec3::X, Vec3::ZERO]);
    }

    #[test]
    fn test_derivative_skips_locked() {
        let mut system = falling_pair();
        let derivative = system.derivative();

        assert_eq!(derivative[0], Vec3::X);
        assert_eq!(derivative[1], Vec3::ZERO);
        assert_eq!(derivative[2], Vec3::new(0.0, -10.0, 0.0));
        assert_eq!(derivative[3], Vec3::ZERO);
    }

    #[test]
    fn test_set_state_preserves_locked() {
        let mut system = falling_pair();
        system.set_state(&[Vec3::ONE, Vec3::ONE, Vec3::Z, Vec3::Z]);

        assert_eq!(system.particles()[0].position, Vec3::ONE);
        assert_eq!(system.particles()[0].velocity, Vec3::Z);
        assert_eq!(system.particles()[1].position, Vec3::Y);
        assert_eq!(system.particles()[1].velocity, Vec3::ZERO);
    }

    #[test]
    fn test_set_state_rejects_wrong_length() {
        let mut system = falling_pair();
        system.set_state(&[Vec3::ONE]);
        assert_eq!(system.particles()[0].position, Vec3::ZERO);
    }

    #[test]
    fn test_update_forces_is_idempotent() {
        let mut system = falling_pair();
        system.update_forces();
        system.update_forces();

        assert_eq!(system.particles()[0].force, Vec3::new(0.0, -10.0, 0.0));
    }

    #[test]
    fn test_translate_particle_keeps_velocity() {
        let mut system = falling_pair();
        assert!(system.translate_particle(0, Vec3::new(0.0, 2.0, 0.0)));

        let p = &system.particles()[0];
        assert_eq!(p.position - p.prev_position, Vec3::ZERO);
        assert!(!system.translate_particle(5, Vec3::ONE));
    }

    #[test]
    fn test_toggle_lock() {
        let mut system = falling_pair();
        assert!(system.set_locked(1, false));
        assert!(!system.particles()[1].is_immovable());
        assert!(system.set_locked(0, true));
        assert_eq!(system.particles()[0].velocity, Vec3::ZERO);
        assert!(!system.set_locked(9, true));
    }
}

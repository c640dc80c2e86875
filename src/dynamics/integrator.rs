//! Time integration strategies.
//!
//! The explicit schemes work on the phase-space vector of a
//! [`ParticleSystem`] and evaluate forces once per stage. Verlet works on
//! positions only and keeps velocity implicit in `position - prev_position`.
//!
//! Every scheme leaves `prev_position` holding the position from before the
//! step, which is what plane colliders use to detect crossings. Immovable
//! particles are never written.

use bevy::prelude::*;

use super::system::ParticleSystem;

/// Default Verlet damping.
pub const DEFAULT_VERLET_DAMPING: f32 = 0.99;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Integrator {
    /// Forward Euler on the phase vector. First order.
    Euler,
    /// Velocity first, then position from the new velocity.
    SymplecticEuler,
    /// Derivative re-evaluated at the half step. Second order.
    Midpoint,
    /// Heun's two-stage Runge-Kutta.
    Rk2,
    /// Classic four-stage Runge-Kutta.
    Rk4,
    /// Position Verlet, `x1 = x0 + k (x0 - x_prev) + dt² a`.
    Verlet {
        /// Velocity damping `k`, below 1 bleeds energy.
        damping: f32,
    },
}

impl Default for Integrator {
    fn default() -> Self {
        Integrator::verlet(DEFAULT_VERLET_DAMPING)
    }
}

impl Integrator {
    pub fn verlet(damping: f32) -> Self {
        Integrator::Verlet { damping }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Integrator::Euler => "euler",
            Integrator::SymplecticEuler => "symplectic-euler",
            Integrator::Midpoint => "midpoint",
            Integrator::Rk2 => "rk2",
            Integrator::Rk4 => "rk4",
            Integrator::Verlet { .. } => "verlet",
        }
    }

    /// Advance `system` by `dt`.
    pub fn step(&self, system: &mut ParticleSystem, dt: f32) {
        if dt <= 0.0 || system.is_empty() {
            return;
        }

        match *self {
            Integrator::Verlet { damping } => step_verlet(system, dt, damping),
            explicit => {
                let previous = system.positions();
                step_phase_space(explicit, system, dt);
                system.set_prev_positions(&previous);
            }
        }
    }
}

fn step_phase_space(integrator: Integrator, system: &mut ParticleSystem, dt: f32) {
    let x0 = system.state();
    match integrator {
        Integrator::Euler => {
            let k1 = system.derivative();
            system.set_state(&axpy(&x0, dt, &k1));
        }
        Integrator::SymplecticEuler => {
            let n = system.len();
            let k1 = system.derivative();
            let mut x1 = x0.clone();
            for i in 0..n {
                x1[n + i] = x0[n + i] + dt * k1[n + i];
                x1[i] = x0[i] + dt * x1[n + i];
            }
            system.set_state(&x1);
        }
        Integrator::Midpoint => {
            let k1 = system.derivative();
            system.set_state(&axpy(&x0, 0.5 * dt, &k1));
            let k2 = system.derivative();
            system.set_state(&axpy(&x0, dt, &k2));
        }
        Integrator::Rk2 => {
            let k1 = system.derivative();
            system.set_state(&axpy(&x0, dt, &k1));
            let k2 = system.derivative();
            let slope: Vec<Vec3> = k1.iter().zip(&k2).map(|(a, b)| 0.5 * (*a + *b)).collect();
            system.set_state(&axpy(&x0, dt, &slope));
        }
        Integrator::Rk4 => {
            let k1 = system.derivative();
            system.set_state(&axpy(&x0, 0.5 * dt, &k1));
            let k2 = system.derivative();
            system.set_state(&axpy(&x0, 0.5 * dt, &k2));
            let k3 = system.derivative();
            system.set_state(&axpy(&x0, dt, &k3));
            let k4 = system.derivative();
            let slope: Vec<Vec3> = k1
                .iter()
                .zip(&k2)
                .zip(&k3)
                .zip(&k4)
                .map(|(((a, b), c), d)| (*a + 2.0 * *b + 2.0 * *c + *d) / 6.0)
                .collect();
            system.set_state(&axpy(&x0, dt, &slope));
        }
        Integrator::Verlet { .. } => {}
    }
}

/// `x + a * y` elementwise.
fn axpy(x: &[Vec3], a: f32, y: &[Vec3]) -> Vec<Vec3> {
    x.iter().zip(y).map(|(x, y)| *x + a * *y).collect()
}

fn step_verlet(system: &mut ParticleSystem, dt: f32, damping: f32) {
    let accelerations = system.accelerations();
    for (p, a) in system.particles_mut().iter_mut().zip(accelerations) {
        if p.is_immovable() {
            continue;
        }
        let current = p.position;
        let next = current + damping * (current - p.prev_position) + dt * dt * a;
        p.prev_position = current;
        p.position = next;
        p.velocity = (next - current) / dt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::force::{Force, Spring};
    use crate::dynamics::particle::Particle;

    const G: f32 = -9.81;

    fn projectile(integrator: Integrator, dt: f32, steps: usize) -> Vec3 {
        let mut system = ParticleSystem::new();
        system.add_particle(Particle::launched(Vec3::ZERO, Vec3::new(1.0, 10.0, 0.0), dt));
        system.add_force(Force::acceleration(Vec3::new(0.0, G, 0.0), vec![0]));
        for _ in 0..steps {
            integrator.step(&mut system, dt);
        }
        system.particles()[0].position
    }

    fn analytic(t: f32) -> Vec3 {
        Vec3::new(t, 10.0 * t + 0.5 * G * t * t, 0.0)
    }

    #[test]
    fn test_projectile_matches_closed_form() {
        let (dt, steps) = (0.01, 100);
        let exact = analytic(dt * steps as f32);

        // First order: error is |g| dt t / 2.
        let euler = projectile(Integrator::Euler, dt, steps);
        assert!((euler.y - exact.y).abs() < 0.06);
        assert!((euler.y - exact.y).abs() > 0.03);

        for integrator in [Integrator::Midpoint, Integrator::Rk2, Integrator::Rk4] {
            let p = projectile(integrator, dt, steps);
            assert!(
                (p - exact).length() < 1e-3,
                "{} drifted to {p:?}, expected {exact:?}",
                integrator.name()
            );
        }

        let symplectic = projectile(Integrator::SymplecticEuler, dt, steps);
        assert!((symplectic.y - exact.y).abs() < 0.06);

        let verlet = projectile(Integrator::verlet(1.0), dt, steps);
        assert!((verlet - exact).length() < 0.1);
    }

    #[test]
    fn test_locked_particle_never_moves() {
        for integrator in [
            Integrator::Euler,
            Integrator::SymplecticEuler,
            Integrator::Midpoint,
            Integrator::Rk2,
            Integrator::Rk4,
            Integrator::default(),
        ] {
            let mut system = ParticleSystem::new();
            system.add_particle(Particle::new(Vec3::ONE).locked());
            system.add_particle(Particle::new(Vec3::ZERO));
            system.add_force(Force::acceleration(Vec3::new(0.0, G, 0.0), vec![0, 1]));
            system.add_spring(Spring::new(0, 1, 0.5, 50.0, 1.0));
            for _ in 0..10 {
                integrator.step(&mut system, 0.01);
            }

            let locked = &system.particles()[0];
            assert_eq!(locked.position, Vec3::ONE, "{}", integrator.name());
            assert_eq!(locked.velocity, Vec3::ZERO, "{}", integrator.name());
            assert_ne!(system.particles()[1].position, Vec3::ZERO);
        }
    }

    #[test]
    fn test_explicit_step_records_previous_position() {
        let mut system = ParticleSystem::new();
        system.add_particle(Particle::new(Vec3::ZERO).with_velocity(Vec3::X));
        Integrator::Euler.step(&mut system, 0.5);

        let p = &system.particles()[0];
        assert_eq!(p.prev_position, Vec3::ZERO);
        assert_eq!(p.position, Vec3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn test_verlet_damping_bleeds_velocity() {
        let mut system = ParticleSystem::new();
        system.add_particle(Particle::launched(Vec3::ZERO, Vec3::X, 1.0));
        Integrator::verlet(0.5).step(&mut system, 1.0);

        let p = &system.particles()[0];
        assert_eq!(p.position, Vec3::new(0.5, 0.0, 0.0));
        assert_eq!(p.prev_position, Vec3::ZERO);
        assert_eq!(p.velocity, Vec3::new(0.5, 0.0, 0.0));
    }

    fn oscillator_energy(integrator: Integrator) -> (f32, f32) {
        let stiffness = 100.0;
        let mut system = ParticleSystem::new();
        system.add_particle(Particle::new(Vec3::ZERO).locked());
        system.add_particle(Particle::new(Vec3::new(1.1, 0.0, 0.0)));
        system.add_spring(Spring::new(0, 1, 1.0, stiffness, 0.0));

        let energy = |system: &ParticleSystem| {
            let stretch = system.particles()[1].position.length() - 1.0;
            system.kinetic_energy() + 0.5 * stiffness * stretch * stretch
        };
        let initial = energy(&system);
        for _ in 0..1000 {
            integrator.step(&mut system, 0.01);
        }
        (initial, energy(&system))
    }

    #[test]
    fn test_symplectic_euler_keeps_spring_energy_bounded() {
        let (initial, euler) = oscillator_energy(Integrator::Euler);
        assert!(euler > 2.0 * initial);

        let (initial, symplectic) = oscillator_energy(Integrator::SymplecticEuler);
        assert!(symplectic < 1.2 * initial);
    }

    #[test]
    fn test_zero_dt_is_noop() {
        let mut system = ParticleSystem::new();
        system.add_particle(Particle::new(Vec3::ZERO).with_velocity(Vec3::X));
        Integrator::Rk4.step(&mut system, 0.0);
        assert_eq!(system.particles()[0].position, Vec3::ZERO);
    }
}

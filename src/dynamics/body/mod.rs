//! Simulated bodies.
//!
//! A body owns one particle system, its static colliders and whatever solver
//! state it needs, and knows how to advance itself by one external frame.
//! Renderers and interaction layers only talk to the [`Body`] trait.

mod cloth;
mod fluid;
mod fountain;
mod projectile;
mod rope;
mod snowball;

pub use cloth::{ClothBody, ClothConfig, ClothLayout};
pub use fluid::{FluidBody, FluidConfig};
pub use fountain::{FountainBody, FountainConfig};
pub use projectile::{ProjectileBody, ProjectileConfig};
pub use rope::{RopeBody, RopeConfig};
pub use snowball::{SnowballBody, SnowballConfig};

use bevy::log::info;
use bevy::prelude::*;

use super::collider::Collider;
use super::constraint::relax_springs;
use super::force::{Force, ForceId};
use super::integrator::Integrator;
use super::params::SimParams;
use super::system::ParticleSystem;

/// A simulated body driven one frame at a time.
pub trait Body: Send + Sync {
    fn name(&self) -> &'static str;

    /// First-time setup. Bodies build everything in [`Body::reset`].
    fn initialize(&mut self, params: &SimParams) {
        self.reset(params);
    }

    /// Rebuild particles, forces and colliders from scratch.
    fn reset(&mut self, params: &SimParams);

    /// Advance by one external frame.
    fn update(&mut self);

    fn system(&self) -> &ParticleSystem;

    fn system_mut(&mut self) -> &mut ParticleSystem;

    fn colliders(&self) -> &[Collider];

    fn colliders_mut(&mut self) -> &mut [Collider];

    fn params(&self) -> &SimParams;

    /// Push new coefficients into live forces and solvers without a reset.
    fn set_params(&mut self, params: &SimParams);

    /// Frames advanced since the last reset.
    fn frame(&self) -> u64;

    fn position(&self, i: usize) -> Option<Vec3> {
        self.system().particle(i).map(|p| p.position)
    }

    fn color(&self, i: usize) -> Option<Color> {
        self.system().particle(i).map(|p| p.color)
    }

    fn radius(&self, i: usize) -> Option<f32> {
        self.system().particle(i).map(|p| p.radius)
    }

    fn translate_collider(&mut self, index: usize, offset: Vec3) -> bool {
        match self.colliders_mut().get_mut(index) {
            Some(collider) => {
                collider.translate(offset);
                true
            }
            None => false,
        }
    }

    fn translate_particle(&mut self, i: usize, offset: Vec3) -> bool {
        self.system_mut().translate_particle(i, offset)
    }

    fn set_locked(&mut self, i: usize, locked: bool) -> bool {
        self.system_mut().set_locked(i, locked)
    }
}

/// Names accepted by [`body_by_name`].
pub const BODY_NAMES: [&str; 6] = ["cloth", "rope", "fluid", "fountain", "snowball", "projectile"];

/// Build and initialize a body with its preset parameters.
pub fn body_by_name(name: &str) -> Option<Box<dyn Body>> {
    let mut body: Box<dyn Body> = match name {
        "cloth" => Box::new(ClothBody::new(ClothConfig::default())),
        "sail" => Box::new(ClothBody::new(ClothConfig::sail())),
        "rope" => Box::new(RopeBody::new(RopeConfig::default())),
        "fluid" => Box::new(FluidBody::new(FluidConfig::default())),
        "fountain" => Box::new(FountainBody::new(FountainConfig::default())),
        "snowball" => Box::new(SnowballBody::new(SnowballConfig::default())),
        "projectile" => Box::new(ProjectileBody::new(ProjectileConfig::default())),
        _ => return None,
    };
    let params = preset(name);
    body.initialize(&params);
    Some(body)
}

/// Preset parameters for a body name. Unknown names get the defaults.
pub fn preset(name: &str) -> SimParams {
    match name {
        "cloth" | "sail" => SimParams::cloth(),
        "rope" => SimParams::rope(),
        "fluid" => SimParams::fluid(),
        "fountain" | "snowball" => SimParams::fountain(),
        "projectile" => SimParams::projectile(),
        _ => SimParams::default(),
    }
}

/// Gravity, wind, drag and blackhole registered on every body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Environment {
    gravity: ForceId,
    wind: ForceId,
    drag: ForceId,
    blackhole: ForceId,
}

impl Environment {
    pub(crate) fn attach(system: &mut ParticleSystem, params: &SimParams, particles: &[usize]) -> Self {
        let (center, intensity) = blackhole(params);
        Self {
            gravity: system.add_force(Force::acceleration(params.gravity, particles.to_vec())),
            wind: system.add_force(Force::acceleration(params.wind, particles.to_vec())),
            drag: system.add_force(Force::drag(
                params.drag,
                params.drag_coefficient,
                particles.to_vec(),
            )),
            blackhole: system.add_force(Force::blackhole(center, intensity, particles.to_vec())),
        }
    }

    pub(crate) fn sync(&self, system: &mut ParticleSystem, params: &SimParams) {
        if let Some(Force::Acceleration(f)) = system.force_mut(self.gravity) {
            f.acceleration = params.gravity;
        }
        if let Some(Force::Acceleration(f)) = system.force_mut(self.wind) {
            f.acceleration = params.wind;
        }
        if let Some(Force::Drag(f)) = system.force_mut(self.drag) {
            f.mode = params.drag;
            f.coefficient = params.drag_coefficient;
        }
        if let Some(Force::Blackhole(f)) = system.force_mut(self.blackhole) {
            (f.center, f.intensity) = blackhole(params);
        }
    }

    /// Register a particle added after the body was built.
    pub(crate) fn add_particle(&self, system: &mut ParticleSystem, i: usize) {
        for id in [self.gravity, self.wind, self.drag, self.blackhole] {
            if let Some(force) = system.force_mut(id) {
                force.add_influenced(i);
            }
        }
    }
}

/// A disabled blackhole keeps its slot with zero intensity.
fn blackhole(params: &SimParams) -> (Vec3, f32) {
    params
        .blackhole
        .map_or((Vec3::ZERO, 0.0), |b| (b.center, b.intensity))
}

pub(crate) fn sync_springs(system: &mut ParticleSystem, params: &SimParams) {
    for spring in system.forces_mut().iter_mut().filter_map(Force::as_spring_mut) {
        spring.stiffness = params.spring_stiffness;
        spring.damping = params.spring_damping;
    }
}

/// One frame of a spring body: Verlet substeps, each followed by spring
/// relaxation, static collisions and `after_substep`.
pub(crate) fn step_constrained(
    system: &mut ParticleSystem,
    colliders: &[Collider],
    params: &SimParams,
    mut after_substep: impl FnMut(&mut ParticleSystem),
) {
    let dt = params.substep_dt();
    let integrator = Integrator::verlet(params.verlet_damping);
    for _ in 0..params.substeps.max(1) {
        integrator.step(system, dt);
        relax_springs(system, params.relaxation_iterations, params.tolerance_band);
        for p in system.particles_mut() {
            // Colliders reflect velocity, so it has to include the relaxation moves.
            if !p.is_immovable() {
                p.velocity = p.implicit_velocity(dt);
            }
            Collider::resolve_all(colliders, p, params.restitution, params.friction, dt);
        }
        after_substep(system);
    }
}

pub(crate) fn log_reset(name: &str, system: &ParticleSystem, colliders: &[Collider]) {
    info!(
        "{name} reset: {} particles, {} forces, {} colliders",
        system.len(),
        system.forces().len(),
        colliders.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::force::Spring;
    use crate::dynamics::particle::Particle;

    #[test]
    fn test_every_named_body_builds() {
        for name in BODY_NAMES {
            let body = body_by_name(name).unwrap_or_else(|| panic!("{name} missing"));
            assert_eq!(body.name(), name);
            assert!(!body.system().is_empty(), "{name} is empty after reset");
            assert_eq!(body.frame(), 0);
        }
        assert!(body_by_name("teapot").is_none());
    }

    #[test]
    fn test_locked_particles_survive_updates() {
        for name in ["cloth", "sail", "rope", "fluid", "fountain", "snowball", "projectile"] {
            let Some(mut body) = body_by_name(name) else {
                panic!("{name} missing");
            };
            // Pin a free particle on top of whatever the body locks itself.
            let Some(free) = body.system().particles().iter().rposition(|p| !p.locked) else {
                panic!("{name} has no free particle");
            };
            assert!(body.set_locked(free, true), "{name} refused to lock {free}");
            let locked: Vec<(usize, Vec3)> = body
                .system()
                .particles()
                .iter()
                .filter(|p| p.locked)
                .map(|p| (p.id, p.position))
                .collect();
            assert!(!locked.is_empty());

            for _ in 0..10 {
                body.update();
            }
            for (i, position) in locked {
                let p = &body.system().particles()[i];
                assert_eq!(p.position, position, "{name} moved {i}");
                assert_eq!(p.velocity, Vec3::ZERO);
            }
            assert_eq!(body.frame(), 10);
        }
    }

    #[test]
    fn test_relaxation_into_floor_bounces() {
        let mut system = ParticleSystem::new();
        system.add_particle(Particle::new(Vec3::new(0.0, 0.5, 0.0)).locked());
        let free = system.add_particle(Particle::new(Vec3::new(0.0, 0.1, 0.0)));
        // Compressed spring: relaxation pushes the free end below the floor.
        system.add_spring(Spring::new(0, free, 0.6, 0.0, 0.0));
        let params = SimParams {
            substeps: 1,
            restitution: 0.5,
            friction: 0.0,
            ..default()
        };
        let dt = params.substep_dt();

        step_constrained(&mut system, &[Collider::floor(0.0)], &params, |_| {});

        let p = &system.particles()[free];
        assert!(p.position.y >= 0.0);
        assert!(p.velocity.y > 0.0, "relaxation velocity lost: {}", p.velocity);
        assert!((p.velocity - p.implicit_velocity(dt)).length() < 1e-3);
    }

    #[test]
    fn test_environment_sync() {
        let mut system = ParticleSystem::new();
        let i = system.add_particle(Particle::new(Vec3::ZERO));
        let params = SimParams::default();
        let env = Environment::attach(&mut system, &params, &[i]);

        let params = params
            .with_gravity(Vec3::new(0.0, -1.0, 0.0))
            .with_wind(Vec3::X);
        env.sync(&mut system, &params);
        system.update_forces();

        assert_eq!(system.particles()[0].force, Vec3::new(1.0, -1.0, 0.0));
    }

    #[test]
    fn test_translate_collider_bounds() {
        let Some(mut body) = body_by_name("fountain") else {
            panic!("fountain missing");
        };
        let before = body.colliders()[0].center();
        assert!(body.translate_collider(0, Vec3::Y));
        assert_eq!(body.colliders()[0].center(), before + Vec3::Y);
        assert!(!body.translate_collider(99, Vec3::Y));
    }
}

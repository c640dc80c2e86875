//! Particles rattling around inside a hollow sphere.

use std::f32::consts::{FRAC_PI_2, TAU};

use bevy::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{log_reset, Body, Environment};
use crate::dynamics::collider::Collider;
use crate::dynamics::integrator::Integrator;
use crate::dynamics::params::SimParams;
use crate::dynamics::particle::Particle;
use crate::dynamics::system::ParticleSystem;

const FLAKE_COLOR: Color = Color::srgb(0.6, 0.85, 0.92);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SnowballConfig {
    pub center: Vec3,
    pub radius: f32,
    pub particles: u32,
}

impl Default for SnowballConfig {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            radius: 50.0,
            particles: 1000,
        }
    }
}

pub struct SnowballBody {
    config: SnowballConfig,
    params: SimParams,
    system: ParticleSystem,
    colliders: Vec<Collider>,
    environment: Option<Environment>,
    integrator: Integrator,
    frame: u64,
}

impl SnowballBody {
    pub fn new(config: SnowballConfig) -> Self {
        Self {
            config,
            params: SimParams::fountain(),
            system: ParticleSystem::new(),
            colliders: Vec::new(),
            environment: None,
            integrator: Integrator::SymplecticEuler,
            frame: 0,
        }
    }

    pub fn config(&self) -> &SnowballConfig {
        &self.config
    }

    /// Shake the globe: move the shell and every particle with it.
    pub fn shake(&mut self, offset: Vec3) {
        self.config.center += offset;
        for collider in &mut self.colliders {
            collider.translate(offset);
        }
        for i in 0..self.system.len() {
            self.system.translate_particle(i, offset);
        }
    }
}

/// Uniform sample inside a ball.
fn sample_ball(rng: &mut StdRng, radius: f32) -> Vec3 {
    let azimuth = rng.random_range(0.0..TAU);
    let elevation = (1.0 - 2.0 * rng.random_range(0.0f32..=1.0)).acos() - FRAC_PI_2;
    let distance = radius * rng.random_range(0.0f32..=1.0).cbrt();
    Vec3::new(
        azimuth.cos() * elevation.cos(),
        elevation.sin(),
        azimuth.sin() * elevation.cos(),
    ) * distance
}

impl Body for SnowballBody {
    fn name(&self) -> &'static str {
        "snowball"
    }

    fn reset(&mut self, params: &SimParams) {
        self.params = params.validated();
        self.system.clear();
        self.frame = 0;

        let mut rng = StdRng::seed_from_u64(self.params.seed);
        for _ in 0..self.config.particles {
            let position = self.config.center + sample_ball(&mut rng, self.config.radius);
            self.system
                .add_particle(Particle::new(position).with_color(FLAKE_COLOR));
        }
        let all: Vec<usize> = (0..self.system.len()).collect();
        self.environment = Some(Environment::attach(&mut self.system, &self.params, &all));
        self.colliders = vec![Collider::snowball(self.config.center, self.config.radius)];
        log_reset(self.name(), &self.system, &self.colliders);
    }

    fn update(&mut self) {
        let dt = self.params.time_step;
        self.integrator.step(&mut self.system, dt);
        for p in self.system.particles_mut() {
            Collider::resolve_all(&self.colliders, p, self.params.restitution, self.params.friction, dt);
        }
        self.frame += 1;
    }

    fn system(&self) -> &ParticleSystem {
        &self.system
    }

    fn system_mut(&mut self) -> &mut ParticleSystem {
        &mut self.system
    }

    fn colliders(&self) -> &[Collider] {
        &self.colliders
    }

    fn colliders_mut(&mut self) -> &mut [Collider] {
        &mut self.colliders
    }

    fn params(&self) -> &SimParams {
        &self.params
    }

    fn set_params(&mut self, params: &SimParams) {
        self.params = params.validated();
        if let Some(environment) = self.environment {
            environment.sync(&mut self.system, &self.params);
        }
    }

    fn frame(&self) -> u64 {
        self.frame
    }
}

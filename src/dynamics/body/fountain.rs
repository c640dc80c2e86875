//! Pooled particle emitter.

use std::collections::VecDeque;

use bevy::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{log_reset, Body, Environment};
use crate::dynamics::collider::Collider;
use crate::dynamics::contact::resolve_particle_contacts;
use crate::dynamics::integrator::Integrator;
use crate::dynamics::params::SimParams;
use crate::dynamics::particle::Particle;
use crate::dynamics::spatial::SpatialHash;
use crate::dynamics::system::ParticleSystem;

const SPRAY_COLOR: Color = Color::srgb(0.6, 0.85, 0.92);

/// Touching droplets swap their normal velocities.
const CONTACT_RESTITUTION: f32 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FountainConfig {
    pub emitter: Vec3,
    /// Particles per second.
    pub emit_rate: f32,
    /// Seconds a particle lives before it returns to the pool.
    pub lifetime: f32,
    pub particle_radius: f32,
    /// Horizontal launch speed range, per axis.
    pub spread: f32,
    /// Vertical launch speed range.
    pub launch_speed: (f32, f32),
}

impl Default for FountainConfig {
    fn default() -> Self {
        Self {
            emitter: Vec3::new(0.0, 10.0, 0.0),
            emit_rate: 100.0,
            lifetime: 10.0,
            particle_radius: 1.0,
            spread: 1.0,
            launch_speed: (28.0, 30.0),
        }
    }
}

/// Emitter that recycles expired particles instead of growing forever.
pub struct FountainBody {
    config: FountainConfig,
    params: SimParams,
    system: ParticleSystem,
    colliders: Vec<Collider>,
    environment: Option<Environment>,
    hash: SpatialHash,
    rng: StdRng,
    dead: VecDeque<usize>,
    integrator: Integrator,
    frame: u64,
}

impl FountainBody {
    pub fn new(config: FountainConfig) -> Self {
        let params = SimParams::fountain();
        Self {
            config,
            hash: SpatialHash::new(2.0 * config.particle_radius, 1024),
            rng: StdRng::seed_from_u64(params.seed),
            params,
            system: ParticleSystem::new(),
            colliders: Vec::new(),
            environment: None,
            dead: VecDeque::new(),
            integrator: Integrator::Euler,
            frame: 0,
        }
    }

    pub fn config(&self) -> &FountainConfig {
        &self.config
    }

    pub fn alive(&self) -> usize {
        self.system.particles().iter().filter(|p| p.is_alive()).count()
    }

    /// Move the emitter without touching particles already in flight.
    pub fn move_emitter(&mut self, offset: Vec3) {
        self.config.emitter += offset;
    }

    fn emit_count(&self) -> usize {
        (self.config.emit_rate * self.params.time_step).round().max(1.0) as usize
    }

    /// Separate touching droplets and exchange their approach velocities.
    fn resolve_contacts(&mut self) -> usize {
        let min_dist = 2.0 * self.config.particle_radius;
        let positions = self.system.positions();
        self.hash.rebuild(&positions);
        self.hash.query_all(&positions, min_dist);
        resolve_particle_contacts(
            self.system.particles_mut(),
            &self.hash,
            min_dist,
            CONTACT_RESTITUTION,
            self.params.time_step,
            Particle::is_alive,
        )
    }

    fn emit(&mut self) {
        let dt = self.params.time_step;
        let spread = self.config.spread.abs();
        let (low, high) = self.config.launch_speed;
        let velocity = Vec3::new(
            self.rng.random_range(-spread..=spread),
            self.rng.random_range(low.min(high)..=high.max(low)),
            self.rng.random_range(-spread..=spread),
        );
        let particle = Particle::launched(self.config.emitter, velocity, dt)
            .with_radius(self.config.particle_radius)
            .with_life(self.config.lifetime)
            .with_color(SPRAY_COLOR);

        match self.dead.pop_front() {
            Some(i) => {
                if let Some(slot) = self.system.particle_mut(i) {
                    *slot = Particle { id: i, ..particle };
                }
            }
            None => {
                let i = self.system.add_particle(particle);
                if let Some(environment) = self.environment {
                    environment.add_particle(&mut self.system, i);
                }
            }
        }
    }
}

impl Body for FountainBody {
    fn name(&self) -> &'static str {
        "fountain"
    }

    fn reset(&mut self, params: &SimParams) {
        self.params = params.validated();
        self.system.clear();
        self.dead.clear();
        self.frame = 0;
        self.rng = StdRng::seed_from_u64(self.params.seed);

        self.environment = Some(Environment::attach(&mut self.system, &self.params, &[]));
        // Floor last so nothing is left below it.
        self.colliders = vec![
            Collider::sphere(Vec3::new(20.0, 0.0, 20.0), 20.0),
            Collider::floor(0.0),
        ];
        self.hash = SpatialHash::new(2.0 * self.config.particle_radius, 1024);
        // Start with one frame of spray so the body is never empty.
        for _ in 0..self.emit_count() {
            self.emit();
        }
        log_reset(self.name(), &self.system, &self.colliders);
    }

    fn update(&mut self) {
        let dt = self.params.time_step;
        if self.frame > 0 {
            for _ in 0..self.emit_count() {
                self.emit();
            }
        }

        self.integrator.step(&mut self.system, dt);
        self.resolve_contacts();
        for p in self.system.particles_mut().iter_mut().filter(|p| p.is_alive()) {
            Collider::resolve_all(&self.colliders, p, self.params.restitution, self.params.friction, dt);
        }

        for p in self.system.particles_mut() {
            if !p.is_alive() {
                continue;
            }
            p.life -= dt;
            if p.life <= 0.0 {
                // Parked until reused.
                p.life = 0.0;
                p.locked = true;
                p.velocity = Vec3::ZERO;
                p.prev_position = p.position;
                self.dead.push_back(p.id);
            }
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

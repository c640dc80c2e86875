//! Chain of particles hanging from its first link.

use bevy::prelude::*;

use super::{log_reset, step_constrained, sync_springs, Body, Environment};
use crate::dynamics::collider::Collider;
use crate::dynamics::force::Spring;
use crate::dynamics::params::SimParams;
use crate::dynamics::particle::Particle;
use crate::dynamics::system::ParticleSystem;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RopeConfig {
    pub links: u32,
    pub spacing: f32,
    /// Position of the anchored first particle.
    pub anchor: Vec3,
    /// Direction the rope is laid out along before it starts falling.
    pub direction: Vec3,
}

impl Default for RopeConfig {
    fn default() -> Self {
        Self {
            links: 20,
            spacing: 1.0,
            anchor: Vec3::new(-20.0, 80.0, -20.0),
            direction: Vec3::Z,
        }
    }
}

pub struct RopeBody {
    config: RopeConfig,
    params: SimParams,
    system: ParticleSystem,
    colliders: Vec<Collider>,
    environment: Option<Environment>,
    frame: u64,
}

impl RopeBody {
    pub fn new(config: RopeConfig) -> Self {
        Self {
            config: RopeConfig {
                links: config.links.max(2),
                direction: config.direction.normalize_or(Vec3::Z),
                ..config
            },
            params: SimParams::rope(),
            system: ParticleSystem::new(),
            colliders: Vec::new(),
            environment: None,
            frame: 0,
        }
    }

    pub fn config(&self) -> &RopeConfig {
        &self.config
    }

    /// Distance from the anchor to the free end.
    pub fn span(&self) -> f32 {
        let particles = self.system.particles();
        match (particles.first(), particles.last()) {
            (Some(first), Some(last)) => first.position.distance(last.position),
            _ => 0.0,
        }
    }
}

impl Body for RopeBody {
    fn name(&self) -> &'static str {
        "rope"
    }

    fn reset(&mut self, params: &SimParams) {
        self.params = params.validated();
        self.system.clear();
        self.frame = 0;

        let RopeConfig {
            links,
            spacing,
            anchor,
            direction,
        } = self.config;
        for i in 0..links {
            let particle = Particle::new(anchor + direction * spacing * i as f32);
            self.system
                .add_particle(if i == 0 { particle.locked() } else { particle });
        }
        for i in 0..(links - 1) as usize {
            self.system.add_spring(Spring::new(
                i,
                i + 1,
                spacing,
                self.params.spring_stiffness,
                self.params.spring_damping,
            ));
        }
        let all: Vec<usize> = (0..self.system.len()).collect();
        self.environment = Some(Environment::attach(&mut self.system, &self.params, &all));

        self.colliders = vec![
            Collider::floor(0.0),
            Collider::sphere(Vec3::new(20.0, 0.0, 20.0), 20.0),
            Collider::aabb(Vec3::ZERO, Vec3::new(15.0, 15.0, 30.0)),
        ];
        log_reset(self.name(), &self.system, &self.colliders);
    }

    fn update(&mut self) {
        step_constrained(&mut self.system, &self.colliders, &self.params, |_| {});
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
        sync_springs(&mut self.system, &self.params);
    }

    fn frame(&self) -> u64 {
        self.frame
    }
}

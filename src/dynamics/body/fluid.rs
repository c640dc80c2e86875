//! SPH pool with a falling drop inside a box container.

use bevy::log::warn;
use bevy::prelude::*;

use super::{log_reset, Body, Environment};
use crate::dynamics::collider::Collider;
use crate::dynamics::integrator::Integrator;
use crate::dynamics::params::SimParams;
use crate::dynamics::particle::{lattice_box, lattice_sphere, Particle};
use crate::dynamics::solver::{lattice_rest_density, SphKernels, SphSolver};
use crate::dynamics::system::ParticleSystem;

const WATER_COLOR: Color = Color::srgb(0.6, 0.85, 0.92);
const BOUNDARY_COLOR: Color = Color::srgb(0.35, 0.35, 0.4);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FluidConfig {
    /// Center of the container box.
    pub container_center: Vec3,
    pub container_half_extents: Vec3,
    /// Lattice spacing of the spawned particles.
    pub spacing: f32,
    /// Height of the pool resting on the container floor.
    pub pool_height: f32,
    pub drop_center: Vec3,
    /// Zero disables the drop.
    pub drop_radius: f32,
    /// Lay a layer of boundary particles under the container floor.
    pub floor_boundary: bool,
    /// Scale particle mass so the spawn lattice sits exactly at rest density.
    pub calibrate_mass: bool,
}

impl Default for FluidConfig {
    fn default() -> Self {
        Self {
            container_center: Vec3::new(0.0, 0.8, 0.0),
            container_half_extents: Vec3::new(0.6, 0.8, 0.6),
            spacing: 0.1,
            pool_height: 0.3,
            drop_center: Vec3::new(0.0, 1.1, 0.0),
            drop_radius: 0.2,
            floor_boundary: true,
            calibrate_mass: true,
        }
    }
}

impl FluidConfig {
    fn container_min(&self) -> Vec3 {
        self.container_center - self.container_half_extents
    }

    fn container_max(&self) -> Vec3 {
        self.container_center + self.container_half_extents
    }
}

/// SPH fluid driven by one of the solver variants.
pub struct FluidBody {
    config: FluidConfig,
    params: SimParams,
    system: ParticleSystem,
    colliders: Vec<Collider>,
    environment: Option<Environment>,
    solver: Option<SphSolver>,
    integrator: Integrator,
    frame: u64,
}

impl FluidBody {
    pub fn new(config: FluidConfig) -> Self {
        Self {
            config,
            params: SimParams::fluid(),
            system: ParticleSystem::new(),
            colliders: Vec::new(),
            environment: None,
            solver: None,
            integrator: Integrator::SymplecticEuler,
            frame: 0,
        }
    }

    pub fn config(&self) -> &FluidConfig {
        &self.config
    }

    pub fn solver(&self) -> Option<&SphSolver> {
        self.solver.as_ref()
    }

    /// Integrator used by the compressible variant. Pressure and viscosity
    /// reach it as forces, so Verlet works too.
    pub fn with_integrator(mut self, integrator: Integrator) -> Self {
        self.integrator = integrator;
        self
    }

    /// Mass of one lattice particle.
    fn particle_mass(&self) -> f32 {
        let spacing = self.config.spacing;
        let nominal = self.params.sph.rest_density * spacing.powi(3);
        if !self.config.calibrate_mass {
            return nominal;
        }
        let kernels = SphKernels::new(self.params.sph.smoothing_radius);
        let unit_density = lattice_rest_density(spacing, 1.0, &kernels);
        if unit_density > 0.0 {
            self.params.sph.rest_density / unit_density
        } else {
            nominal
        }
    }

    fn spawn_fluid(&mut self, mass: f32) {
        let config = self.config;
        let s = config.spacing;
        let inset = Vec3::splat(0.5 * s);
        let lo = config.container_min() + inset;
        let hi = Vec3::new(
            config.container_max().x - 0.5 * s,
            (config.container_min().y + config.pool_height).min(config.container_max().y),
            config.container_max().z - 0.5 * s,
        );
        if hi.cmpgt(lo).all() {
            for p in lattice_box(0.5 * (lo + hi), 0.5 * (hi - lo), s) {
                self.add_fluid(p, mass);
            }
        }
        if config.drop_radius > 0.0 {
            for p in lattice_sphere(config.drop_center, config.drop_radius, s) {
                self.add_fluid(p, mass);
            }
        }
    }

    fn add_fluid(&mut self, position: Vec3, mass: f32) {
        self.system.add_particle(
            Particle::new(position)
                .with_mass(mass)
                .with_radius(0.5 * self.config.spacing)
                .with_color(WATER_COLOR),
        );
    }

    fn spawn_floor(&mut self, mass: f32) {
        let config = self.config;
        let s = config.spacing;
        let min = config.container_min();
        let max = config.container_max();
        let center = Vec3::new(0.5 * (min.x + max.x), min.y - 0.5 * s, 0.5 * (min.z + max.z));
        let half = Vec3::new(0.5 * (max.x - min.x), 0.0, 0.5 * (max.z - min.z));
        for p in lattice_box(center, half, s) {
            self.system.add_particle(
                Particle::new(p)
                    .with_mass(mass)
                    .with_radius(0.5 * s)
                    .with_color(BOUNDARY_COLOR)
                    .boundary(self.params.boundary_density),
            );
        }
    }
}

impl Body for FluidBody {
    fn name(&self) -> &'static str {
        "fluid"
    }

    fn reset(&mut self, params: &SimParams) {
        self.params = params.validated();
        self.system.clear();
        self.frame = 0;

        if self.config.spacing <= 0.0 {
            warn!("fluid spacing must be positive, using 0.1");
            self.config.spacing = 0.1;
        }
        let mass = self.particle_mass();
        self.spawn_fluid(mass);
        if self.config.floor_boundary {
            self.spawn_floor(mass);
        }

        let fluid: Vec<usize> = self
            .system
            .particles()
            .iter()
            .filter(|p| !p.is_boundary())
            .map(|p| p.id)
            .collect();
        self.environment = Some(Environment::attach(&mut self.system, &self.params, &fluid));
        self.solver = Some(SphSolver::attach(&mut self.system, self.params.sph_settings()));

        self.colliders = vec![Collider::inner_aabb_ray(
            self.config.container_center,
            self.config.container_half_extents,
        )];
        log_reset(self.name(), &self.system, &self.colliders);
    }

    fn update(&mut self) {
        let Some(solver) = self.solver.as_mut() else {
            return;
        };
        let dt = self.params.time_step;
        solver.step(&mut self.system, &self.integrator, dt);
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

    /// Smoothing radius changes need a reset; everything else applies live.
    fn set_params(&mut self, params: &SimParams) {
        self.params = params.validated();
        if let Some(environment) = self.environment {
            environment.sync(&mut self.system, &self.params);
        }
        if let Some(solver) = self.solver.as_mut() {
            let sph = self.params.sph_settings();
            solver.set_viscosity(sph.viscosity);
            solver.set_rest_density(sph.rest_density);
            solver.set_pressure_model(sph.pressure);
            solver.set_variant(sph.variant);
        }
    }

    fn frame(&self) -> u64 {
        self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::solver::SphVariant;

    fn small_config() -> FluidConfig {
        FluidConfig {
            container_center: Vec3::new(0.0, 0.4, 0.0),
            container_half_extents: Vec3::new(0.3, 0.4, 0.3),
            pool_height: 0.2,
            drop_center: Vec3::new(0.0, 0.6, 0.0),
            drop_radius: 0.1,
            ..default()
        }
    }

    fn inside(config: &FluidConfig, p: Vec3) -> bool {
        let tolerance = Vec3::splat(1e-3);
        p.cmpge(config.container_min() - tolerance).all()
            && p.cmple(config.container_max() + tolerance).all()
    }

    #[test]
    fn test_reset_spawns_pool_drop_and_floor() {
        let mut body = FluidBody::new(small_config());
        body.initialize(&SimParams::fluid());
        let particles = body.system().particles();

        let boundary = particles.iter().filter(|p| p.is_boundary()).count();
        // 7 x 7 floor layer under a 0.6 wide container.
        assert_eq!(boundary, 49);
        assert!(particles.len() > boundary);
        assert!(particles
            .iter()
            .filter(|p| !p.is_boundary())
            .all(|p| inside(body.config(), p.position)));
        assert!(particles.iter().all(|p| p.mass == particles[0].mass));
    }

    #[test]
    fn test_fluid_stays_in_container() {
        for variant in [
            SphVariant::Compressible,
            SphVariant::WeaklyCompressible,
            SphVariant::Iterative { iterations: 2 },
        ] {
            let mut params = SimParams::fluid();
            params.sph.variant = variant;
            let mut body = FluidBody::new(small_config());
            body.initialize(&params);
            let floor: Vec<Vec3> = body
                .system()
                .particles()
                .iter()
                .filter(|p| p.is_boundary())
                .map(|p| p.position)
                .collect();

            for _ in 0..50 {
                body.update();
            }

            let particles = body.system().particles();
            for p in particles.iter().filter(|p| !p.is_boundary()) {
                assert!(p.position.is_finite(), "{variant:?}");
                assert!(inside(body.config(), p.position), "{variant:?} leaked {:?}", p.position);
            }
            let after: Vec<Vec3> = particles
                .iter()
                .filter(|p| p.is_boundary())
                .map(|p| p.position)
                .collect();
            assert_eq!(floor, after);
        }
    }

    #[test]
    fn test_set_params_reaches_solver() {
        let mut body = FluidBody::new(small_config());
        body.initialize(&SimParams::fluid());
        body.set_params(&SimParams::fluid().with_viscosity(0.2).with_rest_density(900.0));

        let settings = body.solver().map(|s| *s.settings());
        assert_eq!(settings.map(|s| s.viscosity), Some(0.2));
        assert_eq!(settings.map(|s| s.rest_density), Some(900.0));
    }

    #[test]
    fn test_calibrated_mass_matches_lattice() {
        let body = FluidBody::new(small_config());
        let nominal = 1000.0 * 0.1f32.powi(3);
        let mass = body.particle_mass();
        // Poly6 overestimates lattice density by about one percent at h = 2 dx.
        assert!(mass < nominal && mass > 0.95 * nominal, "mass {mass}");
    }
}

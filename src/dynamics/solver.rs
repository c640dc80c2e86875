//! Smoothed particle hydrodynamics.
//!
//! Density is estimated with the poly6 kernel, pressure gradients with either
//! the spiky or the cubic spline kernel, and viscosity with the viscosity
//! Laplacian. Three orderings are available:
//!
//! - [`SphVariant::Compressible`]: densities, pressures and forces once, then a
//!   regular integrator step with the pressure and viscosity forces attached to
//!   the system, so position-only integrators such as Verlet see viscosity too.
//! - [`SphVariant::WeaklyCompressible`]: external forces and viscosity go into
//!   velocity first, then the pressure acceleration updates velocity and
//!   position directly.
//! - [`SphVariant::Iterative`]: like the weakly compressible ordering, but the
//!   pressure correction is re-evaluated at predicted positions a fixed
//!   number of times before the final position update.
//!
//! The neighbor structure is built once per frame from the positions at the
//! start of the frame, for every variant.

use std::f32::consts::PI;

use bevy::log::{debug, warn};
use bevy::prelude::*;

use super::force::{Force, ForceId, SphForce};
use super::integrator::Integrator;
use super::particle::Particle;
use super::spatial::SpatialHash;
use super::system::ParticleSystem;

const MIN_DISTANCE: f32 = 1e-6;

/// SPH kernels for a fixed smoothing radius, with precomputed coefficients.
///
/// Every kernel is exactly zero outside `[0, h]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SphKernels {
    h: f32,
    h_sq: f32,
    poly6_coeff: f32,
    spiky_grad_coeff: f32,
    viscosity_laplacian_coeff: f32,
    cubic_coeff: f32,
}

impl SphKernels {
    pub fn new(h: f32) -> Self {
        let h2 = h * h;
        let h3 = h2 * h;
        let h6 = h3 * h3;
        let h9 = h6 * h3;
        Self {
            h,
            h_sq: h2,
            poly6_coeff: 315.0 / (64.0 * PI * h9),
            spiky_grad_coeff: -45.0 / (PI * h6),
            viscosity_laplacian_coeff: 45.0 / (PI * h6),
            cubic_coeff: 8.0 / (PI * h3),
        }
    }

    pub fn smoothing_radius(&self) -> f32 {
        self.h
    }

    /// Poly6 kernel. W(r, h) = (315 / 64πh⁹) (h² - r²)³
    #[inline]
    pub fn poly6(&self, r: f32) -> f32 {
        if !(0.0..=self.h).contains(&r) {
            return 0.0;
        }
        let diff = self.h_sq - r * r;
        self.poly6_coeff * diff * diff * diff
    }

    /// Gradient of the spiky kernel with respect to `r = x_i - x_j`.
    /// ∇W = -(45 / πh⁶) (h - |r|)² r̂
    #[inline]
    pub fn spiky_gradient(&self, r: Vec3) -> Vec3 {
        let len = r.length();
        if len >= self.h || len < MIN_DISTANCE {
            return Vec3::ZERO;
        }
        let diff = self.h - len;
        self.spiky_grad_coeff * diff * diff * (r / len)
    }

    /// Cubic spline kernel with compact support `h`.
    #[inline]
    pub fn cubic_spline(&self, r: f32) -> f32 {
        if !(0.0..=self.h).contains(&r) {
            return 0.0;
        }
        let q = r / self.h;
        if q <= 0.5 {
            self.cubic_coeff * (6.0 * (q * q * q - q * q) + 1.0)
        } else {
            let t = 1.0 - q;
            self.cubic_coeff * 2.0 * t * t * t
        }
    }

    /// Gradient of the cubic spline with respect to `r = x_i - x_j`.
    #[inline]
    pub fn cubic_spline_gradient(&self, r: Vec3) -> Vec3 {
        let len = r.length();
        if len >= self.h || len < MIN_DISTANCE {
            return Vec3::ZERO;
        }
        let q = len / self.h;
        let dw_dr = if q <= 0.5 {
            self.cubic_coeff * (18.0 * q * q - 12.0 * q) / self.h
        } else {
            let t = 1.0 - q;
            -self.cubic_coeff * 6.0 * t * t / self.h
        };
        dw_dr * (r / len)
    }

    /// Laplacian of the viscosity kernel. ∇²W = (45 / πh⁶) (h - r)
    #[inline]
    pub fn viscosity_laplacian(&self, r: f32) -> f32 {
        if !(0.0..=self.h).contains(&r) {
            return 0.0;
        }
        self.viscosity_laplacian_coeff * (self.h - r)
    }

    #[inline]
    pub fn gradient(&self, kernel: GradientKernel, r: Vec3) -> Vec3 {
        match kernel {
            GradientKernel::Spiky => self.spiky_gradient(r),
            GradientKernel::CubicSpline => self.cubic_spline_gradient(r),
        }
    }
}

/// Equation of state turning density into pressure.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PressureModel {
    /// `p = c² (ρ - ρ₀)`
    Linear { speed_of_sound: f32 },
    /// `p = max(0, k (ρ / ρ₀ - 1))`
    StateEquation { stiffness: f32 },
}

impl Default for PressureModel {
    fn default() -> Self {
        PressureModel::StateEquation { stiffness: 1000.0 }
    }
}

impl PressureModel {
    #[inline]
    pub fn pressure(&self, density: f32, rest_density: f32) -> f32 {
        match *self {
            PressureModel::Linear { speed_of_sound } => {
                speed_of_sound * speed_of_sound * (density - rest_density)
            }
            PressureModel::StateEquation { stiffness } => {
                if rest_density <= 0.0 {
                    return 0.0;
                }
                (stiffness * (density / rest_density - 1.0)).max(0.0)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GradientKernel {
    #[default]
    Spiky,
    CubicSpline,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SphVariant {
    Compressible,
    WeaklyCompressible,
    Iterative { iterations: u32 },
}

impl Default for SphVariant {
    fn default() -> Self {
        SphVariant::WeaklyCompressible
    }
}

/// SPH solver configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SphSettings {
    /// Smoothing radius `h`.
    pub smoothing_radius: f32,
    /// Rest density ρ₀.
    pub rest_density: f32,
    /// Kinematic viscosity.
    pub viscosity: f32,
    pub pressure: PressureModel,
    pub gradient: GradientKernel,
    pub variant: SphVariant,
}

impl Default for SphSettings {
    fn default() -> Self {
        Self {
            smoothing_radius: 0.2,
            rest_density: 1000.0,
            viscosity: 0.01,
            pressure: PressureModel::default(),
            gradient: GradientKernel::Spiky,
            variant: SphVariant::default(),
        }
    }
}

/// Density a particle sees at the center of an infinite cubic lattice.
///
/// Used to pick a rest density that makes a freshly spawned block start
/// without pressure.
pub fn lattice_rest_density(spacing: f32, mass: f32, kernels: &SphKernels) -> f32 {
    if spacing <= 0.0 {
        return 0.0;
    }
    let h = kernels.smoothing_radius();
    let reach = (h / spacing).ceil() as i32;
    let mut density = 0.0;
    for i in -reach..=reach {
        for j in -reach..=reach {
            for k in -reach..=reach {
                let r = Vec3::new(i as f32, j as f32, k as f32).length() * spacing;
                density += mass * kernels.poly6(r);
            }
        }
    }
    density
}

/// SPH solver bound to one particle system.
#[derive(Clone, Debug)]
pub struct SphSolver {
    settings: SphSettings,
    kernels: SphKernels,
    hash: SpatialHash,
    force: ForceId,
}

impl SphSolver {
    /// Attach a solver to `system`, registering an SPH force over every fluid particle.
    ///
    /// Call after the particles have been added.
    pub fn attach(system: &mut ParticleSystem, mut settings: SphSettings) -> Self {
        if settings.smoothing_radius <= 0.0 {
            warn!(
                "non-positive smoothing radius {}, using 1.0",
                settings.smoothing_radius
            );
            settings.smoothing_radius = 1.0;
        }
        let fluid: Vec<usize> = system
            .particles()
            .iter()
            .filter(|p| !p.is_boundary())
            .map(|p| p.id)
            .collect();
        let force = system.add_force(Force::Sph(SphForce::new(fluid)));
        Self {
            settings,
            kernels: SphKernels::new(settings.smoothing_radius),
            hash: SpatialHash::new(settings.smoothing_radius, system.len()),
            force,
        }
    }

    pub fn settings(&self) -> &SphSettings {
        &self.settings
    }

    pub fn kernels(&self) -> &SphKernels {
        &self.kernels
    }

    pub fn force_id(&self) -> ForceId {
        self.force
    }

    pub fn set_viscosity(&mut self, viscosity: f32) {
        self.settings.viscosity = viscosity;
    }

    pub fn set_rest_density(&mut self, rest_density: f32) {
        self.settings.rest_density = rest_density;
    }

    pub fn set_pressure_model(&mut self, pressure: PressureModel) {
        self.settings.pressure = pressure;
    }

    pub fn set_variant(&mut self, variant: SphVariant) {
        self.settings.variant = variant;
    }

    /// Rebuild neighbors and compute densities and pressures at the current
    /// positions. Returns the pressure acceleration of every particle.
    pub fn evaluate(&mut self, system: &mut ParticleSystem) -> Vec<Vec3> {
        let positions = system.positions();
        self.hash.rebuild(&positions);
        self.hash.query_all(&positions, self.kernels.smoothing_radius());
        self.update_densities(system.particles_mut(), &positions);
        self.pressure_accelerations(system.particles(), &positions)
    }

    /// Advance the fluid by one frame.
    pub fn step(&mut self, system: &mut ParticleSystem, integrator: &Integrator, dt: f32) {
        if dt <= 0.0 || system.is_empty() {
            return;
        }

        match self.settings.variant {
            SphVariant::Compressible => {
                let pressure = self.evaluate(system);
                let viscosity = self.viscosity_accelerations(system.particles());
                let total: Vec<Vec3> =
                    pressure.iter().zip(&viscosity).map(|(a, b)| *a + *b).collect();
                self.assign_sph_force(system, &total);
                integrator.step(system, dt);
            }
            SphVariant::WeaklyCompressible => {
                self.assign_sph_force(system, &[]);
                let external = system.accelerations();
                let pressure = self.evaluate(system);
                self.apply_viscosity(system.particles_mut(), dt);
                let particles = system.particles_mut();
                for ((p, a_ext), a_p) in particles.iter_mut().zip(&external).zip(&pressure) {
                    if p.is_immovable() {
                        continue;
                    }
                    p.velocity += dt * (*a_ext + *a_p);
                }
                advance_positions(particles, dt);
            }
            SphVariant::Iterative { iterations } => {
                self.assign_sph_force(system, &[]);
                let external = system.accelerations();
                let positions = system.positions();
                self.hash.rebuild(&positions);
                self.hash.query_all(&positions, self.kernels.smoothing_radius());
                self.update_densities(system.particles_mut(), &positions);
                self.apply_viscosity(system.particles_mut(), dt);

                let particles = system.particles_mut();
                for (p, a_ext) in particles.iter_mut().zip(&external) {
                    if !p.is_immovable() {
                        p.velocity += dt * *a_ext;
                    }
                }
                let base: Vec<Vec3> = particles.iter().map(|p| p.velocity).collect();
                for _ in 0..iterations.max(1) {
                    let predicted: Vec<Vec3> = particles
                        .iter()
                        .map(|p| p.position + dt * p.velocity)
                        .collect();
                    self.update_densities(particles, &predicted);
                    let pressure = self.pressure_accelerations(particles, &predicted);
                    for ((p, v), a_p) in particles.iter_mut().zip(&base).zip(&pressure) {
                        if !p.is_immovable() {
                            p.velocity = *v + dt * *a_p;
                        }
                    }
                }
                advance_positions(particles, dt);
            }
        }

        debug!(
            "sph frame: {} particles, {} pairs, density error {:.4}",
            system.len(),
            self.hash.pair_count(),
            self.average_density_error(system.particles())
        );
    }

    /// Mean relative deviation from rest density over fluid particles.
    pub fn average_density_error(&self, particles: &[Particle]) -> f32 {
        let rest = self.settings.rest_density;
        if rest <= 0.0 {
            return 0.0;
        }
        let (sum, count) = particles
            .iter()
            .filter(|p| !p.is_boundary())
            .fold((0.0, 0usize), |(sum, count), p| {
                (sum + (p.density / rest - 1.0).abs(), count + 1)
            });
        if count == 0 {
            0.0
        } else {
            sum / count as f32
        }
    }

    /// Densities and pressures of fluid particles at `positions`.
    /// Boundary particles keep their fixed density.
    fn update_densities(&self, particles: &mut [Particle], positions: &[Vec3]) {
        let self_weight = self.kernels.poly6(0.0);
        for i in 0..particles.len() {
            if particles[i].is_boundary() {
                continue;
            }
            let mut density = particles[i].mass * self_weight;
            for &j in self.hash.neighbors(i) {
                let r = positions[i].distance(positions[j]);
                density += particles[j].mass * self.kernels.poly6(r);
            }
            let p = &mut particles[i];
            p.density = density;
            p.pressure = self
                .settings
                .pressure
                .pressure(density, self.settings.rest_density);
        }
    }

    /// Symmetric pressure acceleration between fluid particles, one-sided
    /// against boundary particles.
    fn pressure_accelerations(&self, particles: &[Particle], positions: &[Vec3]) -> Vec<Vec3> {
        let kernel = self.settings.gradient;
        particles
            .iter()
            .enumerate()
            .map(|(i, pi)| {
                if pi.is_boundary() || pi.density <= 0.0 {
                    return Vec3::ZERO;
                }
                let term_i = pi.pressure / (pi.density * pi.density);
                let mut acceleration = Vec3::ZERO;
                for &j in self.hash.neighbors(i) {
                    let pj = &particles[j];
                    let grad = self.kernels.gradient(kernel, positions[i] - positions[j]);
                    let weight = if pj.is_boundary() {
                        2.0 * term_i
                    } else if pj.density > 0.0 {
                        term_i + pj.pressure / (pj.density * pj.density)
                    } else {
                        continue;
                    };
                    acceleration -= pj.mass * weight * grad;
                }
                acceleration
            })
            .collect()
    }

    /// Add the viscosity term straight into velocity.
    fn apply_viscosity(&self, particles: &mut [Particle], dt: f32) {
        let accelerations = self.viscosity_accelerations(particles);
        for (p, a) in particles.iter_mut().zip(accelerations) {
            p.velocity += dt * a;
        }
    }

    /// Viscosity acceleration of every particle, zero for immovable ones.
    fn viscosity_accelerations(&self, particles: &[Particle]) -> Vec<Vec3> {
        let nu = self.settings.viscosity;
        let mut accelerations = vec![Vec3::ZERO; particles.len()];
        if nu == 0.0 {
            return accelerations;
        }
        for i in 0..particles.len() {
            if particles[i].is_immovable() {
                continue;
            }
            let mut laplacian = Vec3::ZERO;
            for &j in self.hash.neighbors(i) {
                let pj = &particles[j];
                if pj.density <= 0.0 {
                    continue;
                }
                let r = particles[i].position.distance(pj.position);
                laplacian += pj.mass / pj.density
                    * (pj.velocity - particles[i].velocity)
                    * self.kernels.viscosity_laplacian(r);
            }
            accelerations[i] = nu * laplacian;
        }
        accelerations
    }

    /// Store `mass * acceleration` in the attached SPH force; an empty slice clears it.
    fn assign_sph_force(&self, system: &mut ParticleSystem, accelerations: &[Vec3]) {
        let masses: Vec<f32> = system.particles().iter().map(|p| p.mass).collect();
        let Some(sph) = system.force_mut(self.force).and_then(Force::as_sph_mut) else {
            return;
        };
        sph.clear_forces();
        for (slot, &i) in sph.particles.iter().enumerate() {
            if let (Some(&a), Some(&m)) = (accelerations.get(i), masses.get(i)) {
                sph.forces[slot] = m * a;
            }
        }
    }
}

/// Explicit position update shared by the weakly compressible variants.
fn advance_positions(particles: &mut [Particle], dt: f32) {
    for p in particles.iter_mut() {
        if p.is_immovable() {
            continue;
        }
        p.prev_position = p.position;
        p.position += dt * p.velocity;
    }
}

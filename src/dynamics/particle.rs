//! Particle records and lattice spawning helpers.
//!
//! A [`Particle`] is plain data. Everything that moves it lives elsewhere:
//! forces accumulate into [`Particle::force`], integrators advance
//! `position`/`velocity`, and colliders and constraints correct them.

use bevy::prelude::*;

/// Role of a particle in an SPH body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParticleKind {
    /// Regular, integrated particle.
    #[default]
    Fluid,
    /// Fixed-density particle representing solid geometry. Never integrated.
    Boundary,
}

/// Default render hint for new particles.
pub const DEFAULT_PARTICLE_COLOR: Color = Color::WHITE;

/// Upper bound on the points a lattice spawner reserves up front.
const MAX_LATTICE_RESERVE: usize = 1 << 16;

/// A point mass.
#[derive(Clone, Debug, PartialEq)]
pub struct Particle {
    /// Stable index inside the owning system.
    pub id: usize,
    pub position: Vec3,
    /// Position at the previous step. Together with `position` this encodes
    /// the implicit velocity Verlet integration works with.
    pub prev_position: Vec3,
    pub velocity: Vec3,
    /// Force accumulator, reset before every force evaluation.
    pub force: Vec3,
    pub mass: f32,
    pub density: f32,
    pub pressure: f32,
    pub radius: f32,
    /// Remaining lifetime in seconds for pooled emitter particles.
    pub life: f32,
    /// Render hint, never read by the simulation.
    pub color: Color,
    /// Pinned particles are never moved by integrators, constraints or colliders.
    pub locked: bool,
    pub kind: ParticleKind,
    /// `(column, row)` inside a cloth mesh, used for self-collision rest distances.
    pub grid_coord: Option<UVec2>,
}

impl Default for Particle {
    fn default() -> Self {
        Self {
            id: 0,
            position: Vec3::ZERO,
            prev_position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            force: Vec3::ZERO,
            mass: 1.0,
            density: 0.0,
            pressure: 0.0,
            radius: 1.0,
            life: 0.0,
            color: DEFAULT_PARTICLE_COLOR,
            locked: false,
            kind: ParticleKind::Fluid,
            grid_coord: None,
        }
    }
}

impl Particle {
    /// Create a particle at rest at `position`.
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            prev_position: position,
            ..default()
        }
    }

    /// Create a particle moving with `velocity`, with `prev_position` set so
    /// that a Verlet step sees the same velocity.
    pub fn launched(position: Vec3, velocity: Vec3, dt: f32) -> Self {
        Self {
            position,
            prev_position: position - dt * velocity,
            velocity,
            ..default()
        }
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn with_life(mut self, life: f32) -> Self {
        self.life = life;
        self
    }

    pub fn with_grid_coord(mut self, column: u32, row: u32) -> Self {
        self.grid_coord = Some(UVec2::new(column, row));
        self
    }

    /// Turn this particle into a locked SPH boundary particle with a fixed density.
    pub fn boundary(mut self, density: f32) -> Self {
        self.kind = ParticleKind::Boundary;
        self.density = density;
        self.locked = true;
        self
    }

    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    /// Inverse mass, zero for anything that must not move.
    ///
    /// Locked particles, infinite masses and non-positive masses all map to 0.
    #[inline]
    pub fn inv_mass(&self) -> f32 {
        if self.locked || !self.mass.is_finite() || self.mass <= 0.0 {
            0.0
        } else {
            1.0 / self.mass
        }
    }

    #[inline]
    pub fn is_immovable(&self) -> bool {
        self.inv_mass() == 0.0
    }

    #[inline]
    pub fn is_boundary(&self) -> bool {
        self.kind == ParticleKind::Boundary
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.life > 0.0
    }

    /// Velocity implied by the two stored positions.
    #[inline]
    pub fn implicit_velocity(&self, dt: f32) -> Vec3 {
        if dt <= 0.0 {
            return Vec3::ZERO;
        }
        (self.position - self.prev_position) / dt
    }
}

/// Generate lattice points filling an axis-aligned box.
///
/// Points start at the minimum corner and step by `spacing` while they stay
/// inside the box.
pub fn lattice_box(center: Vec3, half_extents: Vec3, spacing: f32) -> Vec<Vec3> {
    if !(spacing > 0.0 && spacing.is_finite()) {
        return Vec::new();
    }
    // Nudge before flooring so 1.0 / 0.1 style ratios keep their last row.
    let counts =
        ((2.0 * half_extents / spacing + Vec3::splat(1e-4)).floor() + Vec3::ONE).max(Vec3::ZERO);
    if counts.min_element() < 1.0 {
        return Vec::new();
    }
    let min = center - half_extents;
    let mut positions = Vec::with_capacity(lattice_reserve(counts));
    for i in 0..counts.x as u32 {
        for j in 0..counts.y as u32 {
            for k in 0..counts.z as u32 {
                positions.push(min + Vec3::new(i as f32, j as f32, k as f32) * spacing);
            }
        }
    }
    positions
}

/// Points to reserve for a lattice of `counts`, saturating instead of
/// overflowing and capped so huge boxes grow the buffer on demand.
fn lattice_reserve(counts: Vec3) -> usize {
    let total = counts.x as usize;
    total
        .saturating_mul(counts.y as usize)
        .saturating_mul(counts.z as usize)
        .min(MAX_LATTICE_RESERVE)
}

/// Generate lattice points inside a sphere.
pub fn lattice_sphere(center: Vec3, radius: f32, spacing: f32) -> Vec<Vec3> {
    lattice_box(center, Vec3::splat(radius), spacing)
        .into_iter()
        .filter(|p| p.distance_squared(center) <= radius * radius)
        .collect()
}

/// GPU-compatible particle layout, 16-byte aligned rows.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuParticle {
    /// Position (xyz) + radius (w).
    pub position_radius: [f32; 4],
    /// Velocity (xyz) + density (w).
    pub velocity_density: [f32; 4],
    /// Linear color (rgba).
    pub color: [f32; 4],
    /// Bit 0: locked, bit 1: boundary.
    pub flags: u32,
    pub _padding: [u32; 3],
}

impl GpuParticle {
    pub const LOCKED: u32 = 1;
    pub const BOUNDARY: u32 = 1 << 1;

    pub fn position(&self) -> Vec3 {
        Vec3::from_slice(&self.position_radius[..3])
    }

    pub fn velocity(&self) -> Vec3 {
        Vec3::from_slice(&self.velocity_density[..3])
    }
}

impl From<&Particle> for GpuParticle {
    fn from(p: &Particle) -> Self {
        let color = p.color.to_linear();
        let mut flags = 0;
        if p.locked {
            flags |= Self::LOCKED;
        }
        if p.is_boundary() {
            flags |= Self::BOUNDARY;
        }
        Self {
            position_radius: [p.position.x, p.position.y, p.position.z, p.radius],
            velocity_density: [p.velocity.x, p.velocity.y, p.velocity.z, p.density],
            color: [color.red, color.green, color.blue, color.alpha],
            flags,
            _padding: [0; 3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launched_sets_previous_position() {
        let p = Particle::launched(Vec3::new(0.0, 1.0, 0.0), Vec3::new(2.0, 0.0, 0.0), 0.5);
        assert_eq!(p.prev_position, Vec3::new(-1.0, 1.0, 0.0));
        assert_eq!(p.implicit_velocity(0.5), Vec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_inv_mass_sentinels() {
        assert_eq!(Particle::new(Vec3::ZERO).with_mass(4.0).inv_mass(), 0.25);
        assert!(Particle::new(Vec3::ZERO).locked().is_immovable());
        assert!(Particle::new(Vec3::ZERO).with_mass(f32::INFINITY).is_immovable());
        assert!(Particle::new(Vec3::ZERO).with_mass(0.0).is_immovable());
    }

    #[test]
    fn test_boundary_particle_is_locked() {
        let p = Particle::new(Vec3::ZERO).boundary(1000.0);
        assert!(p.is_boundary());
        assert!(p.locked);
        assert_eq!(p.density, 1000.0);
    }

    #[test]
    fn test_lattice_box_counts() {
        let positions = lattice_box(Vec3::ZERO, Vec3::splat(0.5), 0.5);
        assert_eq!(positions.len(), 27);
        assert!(positions.contains(&Vec3::splat(-0.5)));
        assert!(positions.contains(&Vec3::splat(0.5)));
    }

    #[test]
    fn test_lattice_reserve_is_capped() {
        assert_eq!(lattice_reserve(Vec3::new(3.0, 3.0, 3.0)), 27);
        assert_eq!(lattice_reserve(Vec3::splat(1.0e9)), MAX_LATTICE_RESERVE);
        assert_eq!(lattice_reserve(Vec3::splat(f32::INFINITY)), MAX_LATTICE_RESERVE);
        assert_eq!(lattice_reserve(Vec3::new(1.0e9, 1.0e9, 0.0)), 0);
    }

    #[test]
    fn test_lattice_box_degenerate_inputs() {
        // A flat box is a single layer.
        assert_eq!(lattice_box(Vec3::ZERO, Vec3::new(1.0, 1.0, 0.0), 0.5).len(), 25);
        assert!(lattice_box(Vec3::ZERO, Vec3::ONE, 0.0).is_empty());
        assert!(lattice_box(Vec3::ZERO, Vec3::ONE, f32::NAN).is_empty());
        assert!(lattice_box(Vec3::ZERO, Vec3::ONE, f32::INFINITY).is_empty());
        assert!(lattice_box(Vec3::ZERO, Vec3::new(1.0e6, 1.0e6, -1.0), 1.0).is_empty());
    }

    #[test]
    fn test_lattice_sphere_stays_inside() {
        let center = Vec3::new(1.0, 2.0, 3.0);
        let positions = lattice_sphere(center, 1.0, 0.25);
        assert!(!positions.is_empty());
        assert!(positions.iter().all(|p| p.distance(center) <= 1.0 + 1e-5));
    }

    #[test]
    fn test_gpu_particle_layout() {
        assert_eq!(std::mem::size_of::<GpuParticle>(), 64);

        let p = Particle::new(Vec3::new(1.0, 2.0, 3.0))
            .with_velocity(Vec3::X)
            .locked();
        let gpu = GpuParticle::from(&p);
        assert_eq!(gpu.position(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(gpu.velocity(), Vec3::X);
        assert_eq!(gpu.flags & GpuParticle::LOCKED, GpuParticle::LOCKED);
        assert_eq!(gpu.flags & GpuParticle::BOUNDARY, 0);
    }
}

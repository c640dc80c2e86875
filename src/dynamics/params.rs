//! Simulation parameters.
//!
//! These parameters are shared by every body. They can be modified at runtime
//! through the Bevy resource system; the plugin pushes changes into the active
//! body through [`Body::set_params`](super::body::Body::set_params).

use bevy::log::warn;
use bevy::prelude::*;

use super::constraint::LengthBand;
use super::force::DragMode;
use super::integrator::DEFAULT_VERLET_DAMPING;
use super::solver::{PressureModel, SphSettings, SphVariant};

/// Point attractor settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlackholeParams {
    pub center: Vec3,
    /// Scaled by 1000 and divided by the cubed distance.
    pub intensity: f32,
}

/// Parameters controlling particle dynamics.
///
/// The defaults describe a hanging cloth. The presets tune the same fields for
/// the other bodies.
#[derive(Resource, Clone, Debug, PartialEq)]
pub struct SimParams {
    /// Length of one external frame in seconds.
    pub time_step: f32,

    /// Integration substeps per frame for constrained bodies.
    /// Typical range: 5 - 20
    pub substeps: u32,

    /// Fraction of normal velocity kept after a collision.
    /// 0.0 = fully inelastic, 1.0 = fully elastic.
    pub restitution: f32,

    /// Fraction of tangential velocity removed by a collision.
    pub friction: f32,

    /// Air drag model applied to every movable particle.
    pub drag: DragMode,

    /// Drag coefficient `c`.
    pub drag_coefficient: f32,

    /// Gravity acceleration vector.
    pub gravity: Vec3,

    /// Constant wind acceleration.
    pub wind: Vec3,

    /// Spring stiffness `ke`.
    pub spring_stiffness: f32,

    /// Spring damping `kd`.
    pub spring_damping: f32,

    /// Spring relaxation passes after every substep.
    pub relaxation_iterations: u32,

    /// Admissible spring length range.
    pub tolerance_band: LengthBand,

    /// Verlet velocity damping `k`. Values below 1 bleed energy.
    pub verlet_damping: f32,

    /// Whether cloth particles collide with each other.
    pub self_collision: bool,

    /// Minimum separation enforced by cloth self-collision.
    pub cloth_thickness: f32,

    /// Velocity averaging applied to self-colliding cloth pairs.
    pub self_collision_friction: f32,

    /// Fixed density assigned to SPH boundary particles.
    pub boundary_density: f32,

    /// SPH kernel, viscosity, rest density, pressure and solver settings.
    pub sph: SphSettings,

    /// Optional point attractor.
    pub blackhole: Option<BlackholeParams>,

    /// Seed for body resets.
    pub seed: u64,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            time_step: 0.01,
            substeps: 10,
            restitution: 0.5,
            friction: 0.1,
            drag: DragMode::None,
            drag_coefficient: 0.015,
            gravity: Vec3::new(0.0, -9.81, 0.0),
            wind: Vec3::ZERO,
            spring_stiffness: 100.0,
            spring_damping: 0.5,
            relaxation_iterations: 10,
            tolerance_band: LengthBand::default(),
            verlet_damping: DEFAULT_VERLET_DAMPING,
            self_collision: false,
            cloth_thickness: 1.0,
            self_collision_friction: 0.0,
            boundary_density: 1000.0,
            sph: SphSettings::default(),
            blackhole: None,
            seed: 1337,
        }
    }
}

impl SimParams {
    /// Hanging cloth with self-collision.
    pub fn cloth() -> Self {
        Self {
            self_collision: true,
            ..Self::default()
        }
    }

    /// Chain anchored at one end.
    pub fn rope() -> Self {
        Self {
            spring_stiffness: 200.0,
            ..Self::default()
        }
    }

    /// Water-like SPH block with a falling drop.
    pub fn fluid() -> Self {
        Self {
            time_step: 0.004,
            substeps: 1,
            restitution: 0.2,
            friction: 0.05,
            sph: SphSettings {
                smoothing_radius: 0.2,
                pressure: PressureModel::StateEquation { stiffness: 50_000.0 },
                variant: SphVariant::WeaklyCompressible,
                ..SphSettings::default()
            },
            ..Self::default()
        }
    }

    /// Pooled particle emitter.
    pub fn fountain() -> Self {
        Self {
            substeps: 1,
            ..Self::default()
        }
    }

    /// Single launches comparing integrators.
    pub fn projectile() -> Self {
        Self {
            substeps: 1,
            restitution: 0.8,
            friction: 0.1,
            ..Self::default()
        }
    }

    pub fn with_time_step(mut self, time_step: f32) -> Self {
        self.time_step = time_step;
        self
    }

    pub fn with_substeps(mut self, substeps: u32) -> Self {
        self.substeps = substeps;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_drag(mut self, drag: DragMode, coefficient: f32) -> Self {
        self.drag = drag;
        self.drag_coefficient = coefficient;
        self
    }

    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_wind(mut self, wind: Vec3) -> Self {
        self.wind = wind;
        self
    }

    pub fn with_springs(mut self, stiffness: f32, damping: f32) -> Self {
        self.spring_stiffness = stiffness;
        self.spring_damping = damping;
        self
    }

    pub fn with_relaxation_iterations(mut self, iterations: u32) -> Self {
        self.relaxation_iterations = iterations;
        self
    }

    pub fn with_self_collision(mut self, enabled: bool) -> Self {
        self.self_collision = enabled;
        self
    }

    pub fn with_viscosity(mut self, viscosity: f32) -> Self {
        self.sph.viscosity = viscosity;
        self
    }

    pub fn with_rest_density(mut self, rest_density: f32) -> Self {
        self.sph.rest_density = rest_density;
        self
    }

    pub fn with_sph(mut self, sph: SphSettings) -> Self {
        self.sph = sph;
        self
    }

    pub fn with_blackhole(mut self, center: Vec3, intensity: f32) -> Self {
        self.blackhole = Some(BlackholeParams { center, intensity });
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Length of one substep.
    pub fn substep_dt(&self) -> f32 {
        self.time_step / self.substeps.max(1) as f32
    }

    pub fn sph_settings(&self) -> SphSettings {
        self.sph
    }

    /// Copy with values that cannot work clamped into range.
    pub fn validated(&self) -> Self {
        let mut params = self.clone();
        if params.substeps == 0 {
            warn!("substeps must be at least 1, clamping");
            params.substeps = 1;
        }
        if params.time_step.is_nan() || params.time_step <= 0.0 {
            warn!("non-positive time step {}, using 0.01", params.time_step);
            params.time_step = 0.01;
        }
        if params.sph.smoothing_radius <= 0.0 {
            warn!(
                "non-positive smoothing radius {}, using 0.2",
                params.sph.smoothing_radius
            );
            params.sph.smoothing_radius = 0.2;
        }
        params
    }
}

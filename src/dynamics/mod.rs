//! Particle dynamics module for Bevy.
//!
//! Point masses are advanced by a choice of explicit integrators or Verlet,
//! coupled by springs and SPH, constrained by spring relaxation and pushed
//! out of static colliders.
//!
//! # Architecture
//!
//! - [`particle`]: particle record, lattice spawners, GPU layout
//! - [`force`]: gravity, wind, drag, blackhole, springs, SPH marker force
//! - [`system`]: particle + force container and phase-space state
//! - [`integrator`]: Euler, symplectic Euler, midpoint, RK2, RK4, Verlet
//! - [`spatial`]: spatial hash for neighbor search
//! - [`constraint`]: spring length relaxation
//! - [`collider`]: planes, spheres, boxes and the snowball shell
//! - [`contact`]: particle-particle collisions
//! - [`solver`]: SPH kernels and the density / pressure solver
//! - [`params`]: simulation parameters and presets
//! - [`body`]: cloth, rope, fluid, fountain, snowball and projectile bodies
//! - [`plugin`]: Bevy plugin
//!
//! # Example
//!
//! ```rust
//! use particula::dynamics::prelude::*;
//!
//! let mut cloth = ClothBody::new(ClothConfig::default());
//! cloth.initialize(&SimParams::cloth());
//! for _ in 0..10 {
//!     cloth.update();
//! }
//! assert!(cloth.system().len() > 0);
//! ```

pub mod body;
pub mod collider;
pub mod constraint;
pub mod contact;
pub mod force;
pub mod integrator;
pub mod params;
pub mod particle;
pub mod plugin;
pub mod solver;
pub mod spatial;
pub mod system;

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::body::*;
    pub use super::collider::*;
    pub use super::constraint::*;
    pub use super::contact::*;
    pub use super::force::*;
    pub use super::integrator::*;
    pub use super::params::*;
    pub use super::particle::*;
    pub use super::plugin::*;
    pub use super::solver::*;
    pub use super::spatial::*;
    pub use super::system::*;
}

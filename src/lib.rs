//! Particula - particle dynamics for Bevy
//!
//! Cloth, ropes, SPH fluids, emitters and projectiles built on one particle
//! system, with interchangeable time integrators.
//!
//! # Features
//!
//! - **Integrators**: Euler, symplectic Euler, midpoint, RK2, RK4 and damped Verlet
//! - **Mass-spring meshes**: stretch, shear and bend springs with length relaxation
//! - **SPH**: compressible, weakly compressible and iterative pressure solvers
//! - **Colliders**: planes, spheres, solid and hollow boxes, snowball shells
//! - **Contacts**: cloth self-collision and free particle collisions via a spatial hash
//! - **Headless**: no window or renderer required; `GpuParticle` exports a
//!   render-ready layout
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use bevy::prelude::*;
//! use particula::prelude::*;
//!
//! fn main() {
//!     let Some(body) = body_by_name("cloth") else {
//!         return;
//!     };
//!     App::new()
//!         .add_plugins(DynamicsPlugin::with_params(preset("cloth")))
//!         .insert_resource(ActiveBody(body))
//!         .add_systems(Update, report)
//!         .run();
//! }
//!
//! fn report(body: Res<ActiveBody>) {
//!     if let Some(p) = body.0.position(0) {
//!         info!("first particle at {p}");
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! Everything lives in [`dynamics`]; see its module docs for the layout.

pub mod dynamics;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::dynamics::prelude::*;
}

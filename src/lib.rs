//! # Gravitas -- N-body gravitational dynamics engine
//!
//! A direct-summation N-body integrator library offering a family of
//! pluggable time-step integrators -- fixed-step leapfrog, Wisdom-Holman
//! mixed-variable symplectic, the PEFRL fourth-order symplectic composition,
//! and the adaptive 15th-order Gauss-Radau predictor-corrector IAS15 -- built
//! around a single owned [`Context`](context::Context) rather than global
//! state.
//!
//! ## Quick Start
//!
//! ```rust
//! use gravitas::prelude::*;
//! use glam::DVec3;
//!
//! let mut ctx = Context::new();
//! ctx.set_integrator(IntegratorKind::Ias15);
//! ctx.set_particles(&[
//!     Particle::new(DVec3::ZERO, DVec3::ZERO, 1.0),
//!     Particle::new(DVec3::new(1.0, 0.0, 0.0), DVec3::new(0.0, 1.0, 0.0), 1e-6),
//! ]).unwrap();
//!
//! ctx.integrate_until(10.0, true).unwrap();
//! ```
//!
//! ## Architecture
//!
//! - [`context`] -- The owned simulation context: scalars, dispatch, `step`/`integrate_until`
//! - [`particle`] -- `Particle` and the `ParticleSet` store
//! - [`gravity`] -- Direct-summation gravity kernel and its MEGNO linearisation
//! - [`kepler`] -- Universal-variable two-body drift shared by Wisdom-Holman
//! - [`integrators`] -- The pluggable `Integrator` trait and its four implementations
//! - [`error`] -- Typed failure modes
//! - [`constants`] -- Default scalar parameters and integrator coefficients

pub mod constants;
pub mod context;
pub mod error;
pub mod gravity;
pub mod integrators;
pub mod kepler;
pub mod particle;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::context::{Context, IntegratorKind};
    pub use crate::error::EngineError;
    pub use crate::particle::{Particle, ParticleSet};
}

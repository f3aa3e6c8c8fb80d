//! The pluggable integrator family: leapfrog, Wisdom-Holman, PEFRL, and IAS15.

pub mod high_order_symplectic;
pub mod ias15;
pub mod leapfrog;
pub mod wisdom_holman;

use crate::error::EngineError;
use crate::particle::Particle;

/// A callback that advances `particles[..].acceleration` to reflect the
/// current positions: the base gravity pass, any variational pass, and any
/// user-registered additional forces, bundled by the engine.
pub type ForceEvaluator<'a> = dyn FnMut(&mut [Particle]) -> Result<(), EngineError> + 'a;

/// Capability every pluggable time-step integrator implements.
///
/// A step is `part1` (pre-kick motion from the current state), an
/// acceleration pass driven by the engine, then `part2` (finalise the step).
/// Multi-stage integrators (PEFRL, IAS15) invoke `evaluate_forces` additional
/// times from within `part2` for their extra force evaluations.
pub trait Integrator {
    /// Advance positions (or Jacobi coordinates) using the state at the start of the step.
    fn part1(&mut self, particles: &mut [Particle], dt: f64);

    /// Finalise the step given the acceleration computed after `part1`.
    ///
    /// `dt` is read as the requested step size and, on return, holds the step
    /// size to request next (unchanged for fixed-step integrators). Returns
    /// the step size actually advanced by, which may differ from the
    /// requested `dt` for integrators with internal step rejection.
    ///
    /// `synchronized` is `true` when the engine needs positions and
    /// velocities to refer to the same instant at the end of this step (the
    /// last step of an `integrate_until` call).
    ///
    /// `truncated` is `true` when the engine shortened `dt` below the
    /// integrator's own natural choice to land exactly on an `integrate_until`
    /// target, rather than `dt` reflecting the integrator's error control (or
    /// a caller-fixed step). Adaptive integrators should advance the state by
    /// `dt` as requested but must not let the shortened value feed their
    /// step-size history, since the engine restores the pre-truncation `dt`
    /// once the target is reached.
    fn part2(
        &mut self,
        particles: &mut [Particle],
        dt: &mut f64,
        synchronized: bool,
        truncated: bool,
        evaluate_forces: &mut ForceEvaluator<'_>,
    ) -> Result<f64, EngineError>;

    /// Force positions and velocities to a common instant without advancing time.
    ///
    /// No-op for integrators that are always synchronised at step boundaries.
    fn synchronize(&mut self, _particles: &mut [Particle]) {}

    /// Update the gravitational constant used internally, for integrators
    /// (Wisdom-Holman) whose Kepler drift needs `G` directly rather than
    /// through an already-scaled acceleration.
    fn set_g(&mut self, _g: f64) {}

    /// Resize internal scratch to track `n` particles, invalidating any
    /// history that depended on particle identity by index.
    fn reallocate(&mut self, n: usize) -> Result<(), EngineError>;

    /// Clear all scratch state, as on an engine [`reset`](crate::context::Context::reset).
    fn reset(&mut self);
}

//! The engine context: scalars, particle store, and integrator dispatch.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::constants::{DEFAULT_DT, DEFAULT_G, DEFAULT_IAS15_EPSILON, DEFAULT_SOFTENING, DEFAULT_T};
use crate::error::EngineError;
use crate::gravity::{all_finite, compute_accelerations, compute_variational_accelerations};
use crate::integrators::high_order_symplectic::HighOrderSymplectic;
use crate::integrators::ias15::Ias15;
use crate::integrators::leapfrog::Leapfrog;
use crate::integrators::wisdom_holman::WisdomHolman;
use crate::integrators::{ForceEvaluator, Integrator};
use crate::particle::{Particle, ParticleSet};

/// Selects which pluggable integrator a [`Context`] dispatches to.
///
/// The numeric discriminants are part of the stable external contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum IntegratorKind {
    /// Adaptive 15th-order Gauss-Radau predictor-corrector.
    Ias15 = 0,
    /// PEFRL fourth-order symplectic composition.
    HighOrderSymplectic = 1,
    /// Jacobi-coordinate mixed-variable symplectic.
    WisdomHolman = 2,
    /// Fixed-step drift-kick-drift.
    Leapfrog = 3,
}

/// Tagged sum of the concrete integrator implementations, dispatched by `match`
/// rather than a `dyn Integrator` trait object.
pub enum IntegratorState {
    /// See [`IntegratorKind::Ias15`].
    Ias15(Ias15),
    /// See [`IntegratorKind::HighOrderSymplectic`].
    HighOrderSymplectic(HighOrderSymplectic),
    /// See [`IntegratorKind::WisdomHolman`].
    WisdomHolman(WisdomHolman),
    /// See [`IntegratorKind::Leapfrog`].
    Leapfrog(Leapfrog),
}

macro_rules! dispatch {
    ($self:expr, $method:ident($($arg:expr),*)) => {
        match $self {
            IntegratorState::Ias15(i) => i.$method($($arg),*),
            IntegratorState::HighOrderSymplectic(i) => i.$method($($arg),*),
            IntegratorState::WisdomHolman(i) => i.$method($($arg),*),
            IntegratorState::Leapfrog(i) => i.$method($($arg),*),
        }
    };
}

impl Integrator for IntegratorState {
    fn part1(&mut self, particles: &mut [Particle], dt: f64) {
        dispatch!(self, part1(particles, dt))
    }

    fn part2(
        &mut self,
        particles: &mut [Particle],
        dt: &mut f64,
        synchronized: bool,
        truncated: bool,
        evaluate_forces: &mut ForceEvaluator<'_>,
    ) -> Result<f64, EngineError> {
        dispatch!(self, part2(particles, dt, synchronized, truncated, evaluate_forces))
    }

    fn synchronize(&mut self, particles: &mut [Particle]) {
        dispatch!(self, synchronize(particles))
    }

    fn set_g(&mut self, g: f64) {
        dispatch!(self, set_g(g))
    }

    fn reallocate(&mut self, n: usize) -> Result<(), EngineError> {
        dispatch!(self, reallocate(n))
    }

    fn reset(&mut self) {
        dispatch!(self, reset())
    }
}

/// Owns the particle store, integrator scratch, and scalar configuration for
/// one independent simulation.
pub struct Context {
    /// Current simulation time.
    pub t: f64,
    /// Current (or, for fixed-step integrators, fixed) step size.
    pub dt: f64,
    /// Stopping time for the in-progress `integrate_until`, if any.
    pub tmax: f64,
    /// Gravitational constant.
    pub g: f64,
    /// Plummer softening length.
    pub softening: f64,
    /// IAS15 target per-step accuracy. Ignored by the other integrators.
    pub epsilon: f64,
    /// `true` when positions and velocities refer to the same instant.
    pub integrator_synchronized: bool,
    /// Wall-clock seconds the most recent `step` call took.
    pub timing: f64,

    particles: ParticleSet,
    integrator_kind: IntegratorKind,
    integrator: IntegratorState,
    additional_forces: Option<Box<dyn FnMut(&mut [Particle]) + Send>>,
    rng: ChaCha8Rng,
    seed: u64,
    /// `false` until the first force evaluation of the current particle set
    /// has run. Integrators whose `part1` consumes `particles[..].acceleration`
    /// (Wisdom-Holman) need it primed before their very first `part1` call,
    /// since the engine otherwise only computes it between `part1` and `part2`.
    forces_primed: bool,
}

impl Context {
    /// A fresh context with default scalars, IAS15 selected, and no particles.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// A fresh context whose PRNG is seeded deterministically, for reproducible tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            t: DEFAULT_T,
            dt: DEFAULT_DT,
            tmax: 0.0,
            g: DEFAULT_G,
            softening: DEFAULT_SOFTENING,
            epsilon: DEFAULT_IAS15_EPSILON,
            integrator_synchronized: true,
            timing: 0.0,
            particles: ParticleSet::new(),
            integrator_kind: IntegratorKind::Ias15,
            integrator: IntegratorState::Ias15(Ias15::new(DEFAULT_IAS15_EPSILON)),
            additional_forces: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
            forces_primed: false,
        }
    }

    /// Restore default scalars, drop all particles and integrator scratch,
    /// and re-seed the PRNG from the context's original seed.
    pub fn reset(&mut self) {
        self.t = DEFAULT_T;
        self.dt = DEFAULT_DT;
        self.tmax = 0.0;
        self.g = DEFAULT_G;
        self.softening = DEFAULT_SOFTENING;
        self.epsilon = DEFAULT_IAS15_EPSILON;
        self.integrator_synchronized = true;
        self.timing = 0.0;
        self.particles.clear();
        self.integrator.reset();
        self.additional_forces = None;
        self.rng = ChaCha8Rng::seed_from_u64(self.seed);
        self.forces_primed = false;
        info!("context reset");
    }

    /// Mutable access to the context's PRNG, e.g. for a caller's own initial-condition generator.
    pub fn rng_mut(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// Replace the particle store (deep copy), clearing any variational particles
    /// and reallocating integrator scratch to match.
    pub fn set_particles(&mut self, particles: &[Particle]) -> Result<(), EngineError> {
        self.particles.set_particles(particles)?;
        self.integrator.reallocate(self.particles.len())?;
        self.forces_primed = false;
        Ok(())
    }

    /// Set how many leading particles contribute mass to gravity; `None` means all physical particles.
    pub fn set_n_active(&mut self, n_active: Option<usize>) {
        self.particles.set_n_active(n_active);
    }

    /// Append a MEGNO variational shadow particle.
    pub fn push_variational(&mut self, particle: Particle) -> Result<(), EngineError> {
        self.particles.push_variational(particle)?;
        self.integrator.reallocate(self.particles.len())
    }

    /// Switch the active integrator, constructing fresh scratch sized to the current particle count.
    pub fn set_integrator(&mut self, kind: IntegratorKind) {
        if kind == self.integrator_kind {
            return;
        }
        self.integrator_kind = kind;
        self.integrator = match kind {
            IntegratorKind::Ias15 => IntegratorState::Ias15(Ias15::new(self.epsilon)),
            IntegratorKind::HighOrderSymplectic => IntegratorState::HighOrderSymplectic(HighOrderSymplectic),
            IntegratorKind::WisdomHolman => {
                let mut wh = WisdomHolman::new();
                wh.set_g(self.g);
                IntegratorState::WisdomHolman(wh)
            }
            IntegratorKind::Leapfrog => IntegratorState::Leapfrog(Leapfrog),
        };
        if let Err(err) = self.integrator.reallocate(self.particles.len()) {
            debug!(?err, "failed to preallocate scratch for newly selected integrator");
        }
    }

    /// Which integrator is currently selected.
    pub fn integrator_kind(&self) -> IntegratorKind {
        self.integrator_kind
    }

    /// Register (or clear, with `None`) the additional-force callback invoked
    /// after the base gravity pass on every force evaluation.
    pub fn set_additional_forces(&mut self, callback: Option<Box<dyn FnMut(&mut [Particle]) + Send>>) {
        self.additional_forces = callback;
    }

    /// Borrow a single particle by index.
    pub fn particle(&self, index: usize) -> Option<&Particle> {
        self.particles.get(index)
    }

    /// Borrow every particle, physical then variational.
    pub fn particles(&self) -> &[Particle] {
        self.particles.as_slice()
    }

    /// Total particle count, physical and variational.
    pub fn n(&self) -> usize {
        self.particles.len()
    }

    /// Number of mass-contributing particles.
    pub fn n_active(&self) -> usize {
        self.particles.n_active()
    }

    /// Number of variational (MEGNO) particles.
    pub fn n_megno(&self) -> usize {
        self.particles.n_megno()
    }

    /// Advance exactly one integrator step.
    pub fn step(&mut self) -> Result<(), EngineError> {
        self.step_inner(self.integrator_synchronized, false)
    }

    /// Advance until `t >= t_target`. When `exact_finish` is set, the final
    /// step is shortened to land exactly on `t_target`, and `dt` is restored
    /// to its pre-truncation value before returning.
    ///
    /// A no-op (never moves `t` backward) once `t_target` has already been
    /// reached or passed. Because an adaptive integrator's truncated final
    /// step can itself be rejected and re-accepted at less than the full
    /// remaining distance (IAS15 under a close encounter), this keeps
    /// re-truncating and stepping -- rather than assuming one step suffices --
    /// until `t` has actually reached `t_target`.
    pub fn integrate_until(&mut self, t_target: f64, exact_finish: bool) -> Result<(), EngineError> {
        if self.particles.is_empty() {
            return Err(EngineError::NoParticles);
        }
        if t_target <= self.t {
            return Ok(());
        }
        self.tmax = t_target;
        let mut dt_before_truncation = self.dt;
        let mut truncated = false;

        while self.t < self.tmax {
            let remaining = self.tmax - self.t;
            let is_last = self.dt >= remaining;
            let truncate_this_step = exact_finish && is_last;

            if truncate_this_step {
                if !truncated {
                    dt_before_truncation = self.dt;
                    truncated = true;
                }
                self.dt = remaining;
            }

            self.step_inner(is_last, truncate_this_step)?;
        }

        if truncated {
            self.t = self.tmax;
            self.dt = dt_before_truncation;
        }
        Ok(())
    }

    fn step_inner(&mut self, synchronized: bool, truncated: bool) -> Result<(), EngineError> {
        if self.particles.is_empty() {
            return Err(EngineError::NoParticles);
        }

        let start = std::time::Instant::now();

        self.integrator.set_g(self.g);

        let g = self.g;
        let softening = self.softening;
        let n_active = self.particles.n_active();
        let n_physical = self.particles.n_physical();
        let n_megno = self.particles.n_megno();

        let mut additional_forces = self.additional_forces.take();
        let mut evaluate_forces = |particles: &mut [Particle]| -> Result<(), EngineError> {
            compute_accelerations(particles, g, softening, n_active, n_physical);
            if n_megno > 0 {
                let shadow_of: Vec<usize> = (0..n_megno).collect();
                compute_variational_accelerations(particles, g, softening, n_active, n_physical, &shadow_of);
            }
            if let Some(callback) = additional_forces.as_mut() {
                callback(particles);
            }
            if !all_finite(particles) {
                return Err(EngineError::NonFiniteState);
            }
            Ok(())
        };

        // Integrators whose `part1` reads `particles[..].acceleration` (Wisdom-
        // Holman's leading half-kick) need it populated before their very first
        // `part1` call; every later call is primed by the previous step's own
        // evaluate_forces pass, which ran at the positions `part1` starts from.
        if !self.forces_primed {
            evaluate_forces(self.particles.as_mut_slice())?;
            self.forces_primed = true;
        }

        self.integrator.part1(self.particles.as_mut_slice(), self.dt);

        evaluate_forces(self.particles.as_mut_slice())?;

        let mut dt = self.dt;
        let dt_used = self.integrator.part2(
            self.particles.as_mut_slice(),
            &mut dt,
            synchronized,
            truncated,
            &mut evaluate_forces,
        )?;
        self.dt = dt;
        self.additional_forces = additional_forces;

        if synchronized {
            self.integrator.synchronize(self.particles.as_mut_slice());
        }

        self.t += dt_used;
        self.timing = start.elapsed().as_secs_f64();
        Ok(())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    fn plummer_pair() -> Vec<Particle> {
        vec![
            Particle::new(DVec3::new(1.0, 0.0, 0.0), DVec3::new(0.0, 1.0, 0.0), 1.0),
            Particle::new(DVec3::ZERO, DVec3::ZERO, 1.0),
        ]
    }

    #[test]
    fn test_step_fails_with_no_particles() {
        let mut ctx = Context::new();
        assert!(matches!(ctx.step(), Err(EngineError::NoParticles)));
    }

    #[test]
    fn test_time_is_monotonic_across_steps() {
        let mut ctx = Context::new();
        ctx.set_integrator(IntegratorKind::Leapfrog);
        ctx.dt = 0.01;
        ctx.set_particles(&plummer_pair()).unwrap();

        let mut last_t = ctx.t;
        for _ in 0..100 {
            ctx.step().unwrap();
            assert!(ctx.t >= last_t);
            last_t = ctx.t;
        }
    }

    #[test]
    fn test_momentum_conserved_without_additional_forces() {
        let mut ctx = Context::new();
        ctx.set_integrator(IntegratorKind::Leapfrog);
        ctx.dt = 0.001;
        ctx.set_particles(&plummer_pair()).unwrap();

        let momentum = |ctx: &Context| -> DVec3 { ctx.particles().iter().map(|p| p.mass * p.velocity).sum() };
        let p0 = momentum(&ctx);

        for _ in 0..500 {
            ctx.step().unwrap();
        }

        let p1 = momentum(&ctx);
        assert!((p1 - p0).length() < 1e-10);
    }

    #[test]
    fn test_exact_finish_lands_on_target_and_restores_dt() {
        let mut ctx = Context::new();
        ctx.set_integrator(IntegratorKind::Leapfrog);
        ctx.dt = 0.03;
        ctx.set_particles(&plummer_pair()).unwrap();

        ctx.integrate_until(1.0, true).unwrap();
        assert_eq!(ctx.t, 1.0);
        assert_eq!(ctx.dt, 0.03);
    }

    #[test]
    fn test_reset_idempotence() {
        let mut ctx = Context::with_seed(42);
        ctx.set_integrator(IntegratorKind::Leapfrog);
        ctx.dt = 0.05;
        ctx.set_particles(&plummer_pair()).unwrap();
        ctx.step().unwrap();

        ctx.reset();
        let after_one_reset = (ctx.t, ctx.dt, ctx.n());
        ctx.reset();
        let after_two_resets = (ctx.t, ctx.dt, ctx.n());
        assert_eq!(after_one_reset, after_two_resets);

        let fresh = Context::with_seed(42);
        assert_eq!(after_two_resets, (fresh.t, fresh.dt, fresh.n()));
    }

    #[test]
    fn test_integrator_switch_mid_run_preserves_state() {
        let mut ctx = Context::new();
        ctx.set_integrator(IntegratorKind::Leapfrog);
        ctx.dt = 0.01;
        ctx.set_particles(&plummer_pair()).unwrap();
        ctx.integrate_until(1.0, false).unwrap();

        let pos_before = ctx.particle(0).unwrap().position;
        ctx.set_integrator(IntegratorKind::Ias15);
        let pos_after = ctx.particle(0).unwrap().position;
        assert_eq!(pos_before, pos_after);

        ctx.integrate_until(2.0, false).unwrap();
        assert!(ctx.t >= 2.0);
    }
}

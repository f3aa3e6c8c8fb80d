//! Wisdom-Holman mixed-variable symplectic integrator.
//!
//! Splits the Hamiltonian, in Jacobi coordinates, into a sum of two-body
//! Kepler problems (one per coordinate, solved exactly via the universal
//! variable) plus an interaction term (solved by a velocity kick). Particle 0
//! is the primary; `eta[i]` is the cumulative mass of particles `0..=i`.
//!
//! This implementation performs the full half-kick/drift/half-kick every
//! step; it does not fold a step's trailing half-kick into the next step's
//! leading half-kick the way WHFast's performance optimisation does, so it is
//! always synchronised and `synchronize` is a no-op.
//!
//! `part1`'s leading half-kick reads `particles[..].acceleration` as it stood
//! at the end of the previous step's force evaluation -- the engine must
//! guarantee this is populated (not left zeroed from construction) before the
//! very first `part1` call of a run.

use glam::DVec3;

use crate::error::EngineError;
use crate::particle::Particle;

use super::{ForceEvaluator, Integrator};

/// Linearly transform inertial position/velocity/acceleration vectors into
/// Jacobi coordinates. Valid for any of the three because the transform is
/// linear in a fixed set of mass weights.
fn inertial_to_jacobi(values: &[DVec3], masses: &[f64], eta: &[f64]) -> Vec<DVec3> {
    let n = values.len();
    let mut out = vec![DVec3::ZERO; n];
    let mut sum = masses[0] * values[0];
    for i in 1..n {
        let com_prev = sum / eta[i - 1];
        out[i] = values[i] - com_prev;
        sum += masses[i] * values[i];
    }
    out[0] = sum / eta[n - 1];
    out
}

/// Inverse of [`inertial_to_jacobi`].
fn jacobi_to_inertial(values: &[DVec3], masses: &[f64], eta: &[f64]) -> Vec<DVec3> {
    let n = values.len();
    let mut correction = DVec3::ZERO;
    for i in 1..n {
        correction += (masses[i] / eta[i]) * values[i];
    }
    let v0 = values[0] - correction;

    let mut out = vec![DVec3::ZERO; n];
    out[0] = v0;
    let mut com = v0;
    for i in 1..n {
        out[i] = values[i] + com;
        com += (masses[i] / eta[i]) * values[i];
    }
    out
}

/// Apply the interaction-force half-kick to every non-primary Jacobi
/// coordinate: the total Jacobi acceleration minus the two-body Kepler
/// acceleration belonging to that coordinate's own `mu_i`.
fn half_kick(jvel: &mut [DVec3], jaccel: &[DVec3], jpos: &[DVec3], masses: &[f64], eta: &[f64], g: f64, dt_half: f64) {
    for i in 1..jvel.len() {
        let mu_i = g * masses[0] * eta[i] / eta[i - 1];
        let r = jpos[i].length();
        if r == 0.0 {
            continue;
        }
        let a_kepler = jpos[i] * (-mu_i / (r * r * r));
        let a_interaction = jaccel[i] - a_kepler;
        jvel[i] += a_interaction * dt_half;
    }
}

/// Jacobi-coordinate mixed-variable symplectic integrator.
#[derive(Clone, Debug, Default)]
pub struct WisdomHolman {
    /// Gravitational constant, kept in sync with the engine via [`Integrator::set_g`].
    g: f64,
    /// Cumulative mass `eta[i] = sum_{k<=i} m_k`.
    eta: Vec<f64>,
    /// Masses captured at the start of the current step's `part1`.
    masses: Vec<f64>,
    /// Jacobi positions, held between `part1` and `part2`.
    jacobi_pos: Vec<DVec3>,
    /// Jacobi velocities, held between `part1` and `part2`.
    jacobi_vel: Vec<DVec3>,
}

impl WisdomHolman {
    /// A fresh integrator with `G = 1`.
    pub fn new() -> Self {
        Self {
            g: 1.0,
            ..Default::default()
        }
    }

    fn recompute_eta(&mut self) {
        let n = self.masses.len();
        self.eta.resize(n, 0.0);
        self.eta[0] = self.masses[0];
        for i in 1..n {
            self.eta[i] = self.eta[i - 1] + self.masses[i];
        }
    }
}

impl Integrator for WisdomHolman {
    fn set_g(&mut self, g: f64) {
        self.g = g;
    }

    fn part1(&mut self, particles: &mut [Particle], dt: f64) {
        let n = particles.len();
        self.masses = particles.iter().map(|p| p.mass).collect();
        self.recompute_eta();

        let positions: Vec<DVec3> = particles.iter().map(|p| p.position).collect();
        let velocities: Vec<DVec3> = particles.iter().map(|p| p.velocity).collect();
        let accelerations: Vec<DVec3> = particles.iter().map(|p| p.acceleration).collect();

        let mut jpos = inertial_to_jacobi(&positions, &self.masses, &self.eta);
        let mut jvel = inertial_to_jacobi(&velocities, &self.masses, &self.eta);
        let jaccel = inertial_to_jacobi(&accelerations, &self.masses, &self.eta);

        half_kick(&mut jvel, &jaccel, &jpos, &self.masses, &self.eta, self.g, 0.5 * dt);

        // The system centre of mass (coordinate 0) drifts freely.
        jpos[0] += jvel[0] * dt;
        for i in 1..n {
            let mu_i = self.g * self.masses[0] * self.eta[i] / self.eta[i - 1];
            if let Some((r_new, v_new)) = crate::kepler::drift(jpos[i], jvel[i], mu_i, dt, 50) {
                jpos[i] = r_new;
                jvel[i] = v_new;
            }
        }

        let inertial_positions = jacobi_to_inertial(&jpos, &self.masses, &self.eta);
        for (p, pos) in particles.iter_mut().zip(inertial_positions) {
            p.position = pos;
        }

        self.jacobi_pos = jpos;
        self.jacobi_vel = jvel;
    }

    fn part2(
        &mut self,
        particles: &mut [Particle],
        dt: &mut f64,
        _synchronized: bool,
        _truncated: bool,
        _evaluate_forces: &mut ForceEvaluator<'_>,
    ) -> Result<f64, EngineError> {
        let step = *dt;
        let accelerations: Vec<DVec3> = particles.iter().map(|p| p.acceleration).collect();
        let jaccel = inertial_to_jacobi(&accelerations, &self.masses, &self.eta);

        half_kick(
            &mut self.jacobi_vel,
            &jaccel,
            &self.jacobi_pos,
            &self.masses,
            &self.eta,
            self.g,
            0.5 * step,
        );

        let inertial_velocities = jacobi_to_inertial(&self.jacobi_vel, &self.masses, &self.eta);
        for (p, v) in particles.iter_mut().zip(inertial_velocities) {
            p.velocity = v;
        }

        Ok(step)
    }

    fn reallocate(&mut self, n: usize) -> Result<(), EngineError> {
        self.eta
            .try_reserve(n.saturating_sub(self.eta.len()))
            .map_err(|_| EngineError::AllocationFailure { n })?;
        self.eta.clear();
        self.masses.clear();
        self.jacobi_pos.clear();
        self.jacobi_vel.clear();
        Ok(())
    }

    fn reset(&mut self) {
        self.eta.clear();
        self.masses.clear();
        self.jacobi_pos.clear();
        self.jacobi_vel.clear();
    }
}

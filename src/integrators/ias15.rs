//! IAS15: Everhart's 15th-order adaptive Gauss-Radau predictor-corrector.
//!
//! Approximates the acceleration of each particle across a step as a degree-7
//! polynomial in the fractional step time `s in [0,1]`:
//! `a(s) = a0 + b[0]*s + b[1]*s^2 + ... + b[6]*s^7`. The seven free
//! coefficients are found by sampling the acceleration at the seven
//! Gauss-Radau nodes `h[1..7]` and iterating a predictor-corrector loop to a
//! fixed point, following Everhart (1985) and the Gauss-Radau IAS15 scheme
//! used by REBOUND's `integrator_ias15.c`.

use glam::DVec3;
use tracing::{debug, trace, warn};

use crate::constants::{
    IAS15_H, IAS15_MAX_DT_GROWTH, IAS15_MAX_ITERATIONS, IAS15_MAX_REJECTIONS, IAS15_STAGES,
};
use crate::error::EngineError;
use crate::particle::Particle;

use super::{ForceEvaluator, Integrator};

/// Seven-coefficient acceleration polynomial state per Cartesian vector.
type Coeffs = [DVec3; IAS15_STAGES];

const ZERO_COEFFS: Coeffs = [DVec3::ZERO; IAS15_STAGES];

/// Evaluate position and velocity at fractional step time `s` from the
/// acceleration polynomial `a0 + sum b[k] s^{k+1}`, by closed-form double and
/// single quadrature (Horner form, highest order first).
fn predict_state(x0: DVec3, v0: DVec3, a0: DVec3, b: &Coeffs, dt: f64, s: f64) -> (DVec3, DVec3) {
    let mut v_acc = b[6] / 8.0;
    for k in (0..6).rev() {
        v_acc = v_acc * s + b[k] / (k as f64 + 2.0);
    }
    let v = v0 + dt * s * (a0 + s * v_acc);

    let mut x_acc = b[6] / 72.0;
    for k in (0..6).rev() {
        let denom = (k as f64 + 2.0) * (k as f64 + 3.0);
        x_acc = x_acc * s + b[k] / denom;
    }
    let x = x0 + dt * s * (v0 + dt * s * (a0 * 0.5 + s * x_acc));

    (x, v)
}

/// Newton divided differences of `samples` (index 0 is `a0` at `s=0`, index
/// `n` is the acceleration at `s = IAS15_H[n]`), giving the 7 Everhart
/// `g`-coefficients.
fn divided_differences(samples: &[DVec3; 8]) -> Coeffs {
    let mut g = ZERO_COEFFS;
    let mut current = *samples;
    for order in 1..=7 {
        let mut next = [DVec3::ZERO; 8];
        for i in 0..(8 - order) {
            let denom = IAS15_H[i + order] - IAS15_H[i];
            next[i] = (current[i + 1] - current[i]) / denom;
        }
        g[order - 1] = next[0];
        current = next;
    }
    g
}

/// Build the change-of-basis matrix from the Newton divided-difference basis
/// (`phi_m(s) = prod_{j=1}^{m} (s - h[j])`) to the monomial basis, by
/// explicit polynomial multiplication. `phi[m][k]` is the coefficient of
/// `s^k` in `phi_m(s)`.
fn build_phi() -> [[f64; 7]; 7] {
    let mut phi = [[0.0; 7]; 7];
    phi[0][0] = 1.0;
    for m in 1..7 {
        let hm = IAS15_H[m];
        let prev = phi[m - 1];
        let mut cur = [0.0; 7];
        for k in 0..7 {
            let mut v = -hm * prev[k];
            if k >= 1 {
                v += prev[k - 1];
            }
            cur[k] = v;
        }
        phi[m] = cur;
    }
    phi
}

/// Convert Everhart `g`-coefficients to the monomial `b`-coefficients via the
/// precomputed basis-change matrix.
fn g_to_b(phi: &[[f64; 7]; 7], g: &Coeffs) -> Coeffs {
    let mut b = ZERO_COEFFS;
    for k in 0..7 {
        let mut acc = DVec3::ZERO;
        for (m, gm) in g.iter().enumerate() {
            acc += *gm * phi[m][k];
        }
        b[k] = acc;
    }
    b
}

/// Predict this step's initial `b` from the previous step's `e`, rescaled by
/// `q = dt_new / dt_prev`. A Taylor shift of the degree-7 polynomial plus a
/// rescale of its argument; the binomial coefficients come from the shift.
fn predict_b(e: &Coeffs, q: f64) -> Coeffs {
    let q2 = q * q;
    let q3 = q2 * q;
    let q4 = q3 * q;
    let q5 = q4 * q;
    let q6 = q5 * q;
    let q7 = q6 * q;
    [
        q * (e[0] + 2.0 * e[1] + 3.0 * e[2] + 4.0 * e[3] + 5.0 * e[4] + 6.0 * e[5] + 7.0 * e[6]),
        q2 * (e[1] + 3.0 * e[2] + 6.0 * e[3] + 10.0 * e[4] + 15.0 * e[5] + 21.0 * e[6]),
        q3 * (e[2] + 4.0 * e[3] + 10.0 * e[4] + 20.0 * e[5] + 35.0 * e[6]),
        q4 * (e[3] + 5.0 * e[4] + 15.0 * e[5] + 35.0 * e[6]),
        q5 * (e[4] + 6.0 * e[5] + 21.0 * e[6]),
        q6 * (e[5] + 7.0 * e[6]),
        q7 * e[6],
    ]
}

/// Adaptive Gauss-Radau integrator state, scaling as `O(N)` in particle count.
pub struct Ias15 {
    /// Target per-step accuracy.
    pub epsilon: f64,
    phi: [[f64; 7]; 7],
    b: Vec<Coeffs>,
    e: Vec<Coeffs>,
    b_prev: Vec<Coeffs>,
    csb: Vec<Coeffs>,
    g: Vec<Coeffs>,
    last_dt: f64,
    has_prediction: bool,
}

impl Ias15 {
    /// A fresh integrator targeting the given per-step accuracy.
    pub fn new(epsilon: f64) -> Self {
        Self {
            epsilon,
            phi: build_phi(),
            b: Vec::new(),
            e: Vec::new(),
            b_prev: Vec::new(),
            csb: Vec::new(),
            g: Vec::new(),
            last_dt: 0.0,
            has_prediction: false,
        }
    }
}

impl Default for Ias15 {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_IAS15_EPSILON)
    }
}

impl Integrator for Ias15 {
    fn part1(&mut self, _particles: &mut [Particle], _dt: f64) {
        // IAS15 is implicit; no pre-kick drift happens before the gravity
        // pass the engine runs between part1 and part2.
    }

    fn part2(
        &mut self,
        particles: &mut [Particle],
        dt: &mut f64,
        _synchronized: bool,
        truncated: bool,
        evaluate_forces: &mut ForceEvaluator<'_>,
    ) -> Result<f64, EngineError> {
        let n = particles.len();
        if self.b.len() != n {
            self.reallocate(n)?;
        }

        let x0: Vec<DVec3> = particles.iter().map(|p| p.position).collect();
        let v0: Vec<DVec3> = particles.iter().map(|p| p.velocity).collect();
        let a0: Vec<DVec3> = particles.iter().map(|p| p.acceleration).collect();

        let mut dt_try = *dt;
        let mut rejections = 0u32;

        loop {
            if self.has_prediction && self.last_dt != 0.0 {
                let q = dt_try / self.last_dt;
                for i in 0..n {
                    self.b[i] = predict_b(&self.e[i], q);
                }
            } else {
                for i in 0..n {
                    self.b[i] = ZERO_COEFFS;
                }
            }

            let mut converged = false;
            for iteration in 0..IAS15_MAX_ITERATIONS {
                for i in 0..n {
                    self.b_prev[i] = self.b[i];
                }

                let mut samples: Vec<[DVec3; 8]> = vec![[DVec3::ZERO; 8]; n];
                for i in 0..n {
                    samples[i][0] = a0[i];
                }

                for node in 1..=IAS15_STAGES {
                    let s = IAS15_H[node];
                    for i in 0..n {
                        let (x, v) = predict_state(x0[i], v0[i], a0[i], &self.b[i], dt_try, s);
                        particles[i].position = x;
                        particles[i].velocity = v;
                    }
                    evaluate_forces(particles)?;
                    if !crate::gravity::all_finite(particles) {
                        return Err(EngineError::NonFiniteState);
                    }
                    for i in 0..n {
                        samples[i][node] = particles[i].acceleration;
                    }
                }

                for i in 0..n {
                    particles[i].position = x0[i];
                    particles[i].velocity = v0[i];
                }

                let mut max_db6 = 0.0_f64;
                let mut max_a = 0.0_f64;
                for i in 0..n {
                    self.g[i] = divided_differences(&samples[i]);
                    let b_i = g_to_b(&self.phi, &self.g[i]);
                    for k in 0..IAS15_STAGES {
                        let delta = b_i[k] - self.b[i][k];
                        let y = delta - self.csb[i][k];
                        let t = self.b[i][k] + y;
                        self.csb[i][k] = (t - self.b[i][k]) - y;
                        self.b[i][k] = t;
                    }
                    max_db6 = max_db6.max((self.b[i][6] - self.b_prev[i][6]).length());
                    for sample in samples[i].iter() {
                        max_a = max_a.max(sample.length());
                    }
                }

                trace!(iteration, max_db6, max_a, "ias15 predictor-corrector iteration");
                if max_a == 0.0 || max_db6 / max_a < 1e-16 {
                    converged = true;
                    break;
                }
            }

            if !converged {
                debug!("ias15 predictor-corrector did not converge within iteration budget");
            }

            let mut max_b6 = 0.0_f64;
            let mut max_a = 0.0_f64;
            for i in 0..n {
                max_b6 = max_b6.max(self.b[i][6].length());
                max_a = max_a.max(a0[i].length());
            }
            let err = if max_a > 0.0 { max_b6 / max_a } else { 0.0 };

            let dt_new = if err > 0.0 {
                dt_try * (self.epsilon / err).powf(1.0 / 7.0)
            } else {
                dt_try * IAS15_MAX_DT_GROWTH
            };
            let dt_new = dt_new.min(dt_try * IAS15_MAX_DT_GROWTH);

            if err > self.epsilon && dt_new / dt_try < 0.95 {
                rejections += 1;
                if rejections >= IAS15_MAX_REJECTIONS {
                    return Err(EngineError::IntegratorDiverged { attempts: rejections });
                }
                warn!(rejections, err, dt_try, dt_new, "ias15 step rejected");
                dt_try = dt_new;
                continue;
            }

            for i in 0..n {
                let (x1, v1) = predict_state(x0[i], v0[i], a0[i], &self.b[i], dt_try, 1.0);
                particles[i].position = x1;
                particles[i].velocity = v1;
            }

            // A truncated step's `dt_try` is an artifact of the caller landing
            // exactly on an `integrate_until` target, not this integrator's own
            // error control; feeding it into `e`/`last_dt` would corrupt the
            // step-size prediction for the step after the caller restores the
            // pre-truncation `dt`. Leave the history as of the last natural step.
            if !truncated {
                for i in 0..n {
                    self.e[i] = self.b[i];
                }
                self.last_dt = dt_try;
                self.has_prediction = true;
            }

            *dt = dt_new;
            return Ok(dt_try);
        }
    }

    fn reallocate(&mut self, n: usize) -> Result<(), EngineError> {
        for v in [&mut self.b, &mut self.e, &mut self.b_prev, &mut self.csb, &mut self.g] {
            v.try_reserve(n.saturating_sub(v.len()))
                .map_err(|_| EngineError::AllocationFailure { n })?;
            v.clear();
            v.resize(n, ZERO_COEFFS);
        }
        self.has_prediction = false;
        self.last_dt = 0.0;
        Ok(())
    }

    fn reset(&mut self) {
        self.b.clear();
        self.e.clear();
        self.b_prev.clear();
        self.csb.clear();
        self.g.clear();
        self.has_prediction = false;
        self.last_dt = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gravity::compute_accelerations;

    fn two_body_energy(particles: &[Particle]) -> f64 {
        let kinetic: f64 = particles.iter().map(|p| 0.5 * p.mass * p.velocity.length_squared()).sum();
        let r = (particles[0].position - particles[1].position).length();
        kinetic - particles[0].mass * particles[1].mass / r
    }

    #[test]
    fn test_phi_matrix_reproduces_node_values() {
        // phi_m(h[m]) must be zero for m >= 1, since h[m] is one of phi_m's roots.
        let phi = build_phi();
        for m in 1..7 {
            let s = IAS15_H[m];
            let mut value = 0.0;
            for k in (0..7).rev() {
                value = value * s + phi[m][k];
            }
            assert!(value.abs() < 1e-9, "phi_{m}({s}) should vanish, got {value}");
        }
    }

    #[test]
    fn test_circular_orbit_conserves_energy() {
        let mut particles = vec![
            Particle::new(DVec3::ZERO, DVec3::ZERO, 1.0),
            Particle::new(DVec3::new(1.0, 0.0, 0.0), DVec3::new(0.0, 1.0, 0.0), 1e-6),
        ];
        compute_accelerations(&mut particles, 1.0, 0.0, 2, 2);
        let e0 = two_body_energy(&particles);

        let mut integrator = Ias15::new(1e-9);
        let mut dt = 0.05;
        let mut t = 0.0;
        let tmax = std::f64::consts::PI * 4.0;

        while t < tmax {
            let step_dt = dt.min(tmax - t);
            let mut local_dt = step_dt;
            let step_used = integrator
                .part2(&mut particles, &mut local_dt, false, false, &mut |p| {
                    compute_accelerations(p, 1.0, 0.0, 2, 2);
                    Ok(())
                })
                .unwrap();
            t += step_used;
            dt = local_dt;
        }

        let e1 = two_body_energy(&particles);
        assert!((e1 - e0).abs() / e0.abs() < 1e-8);
    }

    #[test]
    fn test_reallocate_invalidates_prediction() {
        let mut integrator = Ias15::new(1e-9);
        integrator.reallocate(2).unwrap();
        integrator.has_prediction = true;
        integrator.reallocate(3).unwrap();
        assert!(!integrator.has_prediction);
    }

    #[test]
    fn test_truncated_step_does_not_corrupt_step_size_history() {
        let mut particles = vec![
            Particle::new(DVec3::ZERO, DVec3::ZERO, 1.0),
            Particle::new(DVec3::new(1.0, 0.0, 0.0), DVec3::new(0.0, 1.0, 0.0), 1e-6),
        ];
        compute_accelerations(&mut particles, 1.0, 0.0, 2, 2);

        let mut integrator = Ias15::new(1e-9);
        let mut dt = 0.05;
        integrator
            .part2(&mut particles, &mut dt, false, false, &mut |p| {
                compute_accelerations(p, 1.0, 0.0, 2, 2);
                Ok(())
            })
            .unwrap();

        let last_dt_before = integrator.last_dt;
        let e_before = integrator.e.clone();

        // A truncated step: the caller has shrunk dt below the natural value
        // to land exactly on an `integrate_until` target.
        let mut truncated_dt = 0.001;
        integrator
            .part2(&mut particles, &mut truncated_dt, true, true, &mut |p| {
                compute_accelerations(p, 1.0, 0.0, 2, 2);
                Ok(())
            })
            .unwrap();

        assert_eq!(integrator.last_dt, last_dt_before);
        assert_eq!(integrator.e, e_before);
    }
}

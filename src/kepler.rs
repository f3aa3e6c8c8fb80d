//! Universal-variable two-body (Kepler) drift, shared by the Wisdom-Holman integrator.
//!
//! Works uniformly across elliptic, parabolic, and hyperbolic orbits via the
//! Stumpff functions `c2`/`c3`, avoiding the usual case split on eccentricity.

use glam::DVec3;

/// Stumpff function `c2`: `(1 - cos(sqrt(psi))) / psi` for `psi > 0`, continued
/// analytically through `psi = 0` and to `psi < 0` via `cosh`.
pub fn c2(psi: f64) -> f64 {
    if psi.abs() < 1e-6 {
        // Series expansion near psi = 0 to avoid cancellation.
        return 0.5 - psi / 24.0 + psi * psi / 720.0;
    }
    if psi > 0.0 {
        let sqrt_psi = psi.sqrt();
        (1.0 - sqrt_psi.cos()) / psi
    } else {
        let sqrt_neg_psi = (-psi).sqrt();
        (sqrt_neg_psi.cosh() - 1.0) / (-psi)
    }
}

/// Stumpff function `c3`: `(sqrt(psi) - sin(sqrt(psi))) / psi^{3/2}` for `psi > 0`.
pub fn c3(psi: f64) -> f64 {
    if psi.abs() < 1e-6 {
        return 1.0 / 6.0 - psi / 120.0 + psi * psi / 5040.0;
    }
    if psi > 0.0 {
        let sqrt_psi = psi.sqrt();
        (sqrt_psi - sqrt_psi.sin()) / (psi * sqrt_psi)
    } else {
        let sqrt_neg_psi = (-psi).sqrt();
        (sqrt_neg_psi.sinh() - sqrt_neg_psi) / (-psi * sqrt_neg_psi)
    }
}

/// Advance a relative two-body state `(r0, v0)` orbiting a mass with
/// gravitational parameter `mu` by `dt`, via Newton iteration on the universal
/// anomaly. Returns `None` if the iteration fails to converge within the
/// budget (the caller should fall back to a smaller step).
pub fn drift(r0: DVec3, v0: DVec3, mu: f64, dt: f64, max_iter: u32) -> Option<(DVec3, DVec3)> {
    if dt == 0.0 {
        return Some((r0, v0));
    }

    let sqrt_mu = mu.sqrt();
    let r0_norm = r0.length();
    let dot_r0v0 = r0.dot(v0);
    let alpha = 2.0 / r0_norm - v0.length_squared() / mu;

    let mut xi = initial_xi_guess(r0_norm, dot_r0v0, sqrt_mu, alpha, dt);

    let mut converged = false;
    let mut r_norm = r0_norm;
    let mut c2_psi = 0.5;
    let mut c3_psi = 1.0 / 6.0;

    for _ in 0..max_iter {
        let psi = xi * xi * alpha;
        c2_psi = c2(psi);
        c3_psi = c3(psi);

        r_norm = xi * xi * c2_psi + dot_r0v0 / sqrt_mu * xi * (1.0 - psi * c3_psi) + r0_norm * (1.0 - psi * c2_psi);

        let f_xi = sqrt_mu * dt
            - xi.powi(3) * c3_psi
            - dot_r0v0 / sqrt_mu * xi * xi * c2_psi
            - r0_norm * xi * (1.0 - psi * c3_psi);

        let delta_xi = f_xi / r_norm;
        xi += delta_xi;

        if delta_xi.abs() < 1e-10 * xi.abs().max(1.0) {
            converged = true;
            break;
        }
    }

    if !converged || !r_norm.is_finite() {
        return None;
    }

    let psi = xi * xi * alpha;
    let f = 1.0 - xi * xi / r0_norm * c2_psi;
    let g = dt - xi.powi(3) / sqrt_mu * c3_psi;
    let gdot = 1.0 - xi * xi / r_norm * c2_psi;
    let fdot = sqrt_mu / (r_norm * r0_norm) * xi * (psi * c3_psi - 1.0);

    let r = f * r0 + g * v0;
    let v = fdot * r0 + gdot * v0;
    Some((r, v))
}

fn initial_xi_guess(r0_norm: f64, dot_r0v0: f64, sqrt_mu: f64, alpha: f64, dt: f64) -> f64 {
    if alpha > 1e-10 {
        sqrt_mu * dt * alpha
    } else if alpha < -1e-10 {
        dt.signum()
            * (-1.0 / alpha).sqrt()
            * (-2.0 * sqrt_mu * sqrt_mu * alpha * dt
                / (dot_r0v0 + dt.signum() * (-sqrt_mu * sqrt_mu / alpha).sqrt() * (1.0 - r0_norm * alpha)))
                .abs()
                .ln()
    } else {
        sqrt_mu * dt / r0_norm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_drift_one_period_returns_to_start() {
        let mu = 1.0;
        let r0 = DVec3::new(1.0, 0.0, 0.0);
        let v0 = DVec3::new(0.0, 1.0, 0.0); // circular orbit, period 2*pi
        let period = 2.0 * PI;

        let (r1, v1) = drift(r0, v0, mu, period, 50).expect("should converge");
        assert_relative_eq!(r1.x, r0.x, epsilon = 1e-8);
        assert_relative_eq!(r1.y, r0.y, epsilon = 1e-8);
        assert_relative_eq!(v1.x, v0.x, epsilon = 1e-8);
        assert_relative_eq!(v1.y, v0.y, epsilon = 1e-8);
    }

    #[test]
    fn test_drift_quarter_period_circular() {
        let mu = 1.0;
        let r0 = DVec3::new(1.0, 0.0, 0.0);
        let v0 = DVec3::new(0.0, 1.0, 0.0);

        let (r1, _v1) = drift(r0, v0, mu, PI / 2.0, 50).expect("should converge");
        assert_relative_eq!(r1.x, 0.0, epsilon = 1e-7);
        assert_relative_eq!(r1.y, 1.0, epsilon = 1e-7);
    }
}

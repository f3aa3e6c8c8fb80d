//! Direct-summation gravity kernel and its linearisation for MEGNO.

use glam::DVec3;

use crate::particle::Particle;

/// Compute `a_i = G * sum_j m_j (r_j - r_i) / (|r_j - r_i|^2 + eps^2)^{3/2}` for
/// every physical particle, writing into `acceleration`. Particles at index
/// `>= n_active` contribute nothing (test particles); all physical particles
/// (even test particles) receive an acceleration.
///
/// Variational (shadow) particles, i.e. indices `>= n_physical`, are left untouched;
/// call [`compute_variational_accelerations`] for those.
pub fn compute_accelerations(particles: &mut [Particle], g: f64, softening: f64, n_active: usize, n_physical: usize) {
    let eps2 = softening * softening;

    for i in 0..n_physical {
        let mut acc = DVec3::ZERO;
        let pos_i = particles[i].position;
        for j in 0..n_active {
            if i == j {
                continue;
            }
            let dr = particles[j].position - pos_i;
            let r2 = dr.length_squared() + eps2;
            let inv_r3 = r2.powf(-1.5);
            acc += dr * (g * particles[j].mass * inv_r3);
        }
        particles[i].acceleration = acc;
    }
}

/// Compute the linearised (tangent-space) acceleration of each variational
/// shadow particle, following the physical particle it tracks.
///
/// `shadow_of[k]` gives the physical index the `k`-th shadow particle (at
/// index `n_physical + k` in `particles`) is attached to. The shadow
/// acceleration is the contraction of the gravitational tidal tensor at the
/// physical configuration with the shadow's displacement, linearised about
/// the physical trajectory.
pub fn compute_variational_accelerations(
    particles: &mut [Particle],
    g: f64,
    softening: f64,
    n_active: usize,
    n_physical: usize,
    shadow_of: &[usize],
) {
    let eps2 = softening * softening;

    for (k, &target) in shadow_of.iter().enumerate() {
        let shadow_index = n_physical + k;
        let dx = particles[shadow_index].position;
        let pos_target = particles[target].position;

        let mut acc = DVec3::ZERO;
        for j in 0..n_active {
            if j == target {
                continue;
            }
            let dr = particles[j].position - pos_target;
            let r2 = dr.length_squared() + eps2;
            let r = r2.sqrt();
            let inv_r3 = r2.powf(-1.5);
            let inv_r5 = inv_r3 / r2;

            // Own contribution: displacement of this pair's relative shadow state.
            let ddx = dx - shadow_displacement(particles, j, n_physical, shadow_of);
            let dr_dot_ddx = dr.dot(ddx);

            acc += ddx * (g * particles[j].mass * inv_r3) * -1.0
                + dr * (3.0 * g * particles[j].mass * dr_dot_ddx * inv_r5);
        }
        particles[shadow_index].acceleration = acc;
    }
}

/// The shadow displacement tracking physical particle `phys_index`, or zero if
/// that particle has no shadow (i.e. is not being tracked variationally).
fn shadow_displacement(particles: &[Particle], phys_index: usize, n_physical: usize, shadow_of: &[usize]) -> DVec3 {
    shadow_of
        .iter()
        .position(|&t| t == phys_index)
        .map(|k| particles[n_physical + k].position)
        .unwrap_or(DVec3::ZERO)
}

/// `true` if every particle in `particles` has finite position, velocity, and acceleration.
pub fn all_finite(particles: &[Particle]) -> bool {
    particles.iter().all(Particle::is_finite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn two_body_acceleration_is_newtonian() {
        let mut particles = vec![
            Particle::new(DVec3::new(-0.5, 0.0, 0.0), DVec3::ZERO, 1.0),
            Particle::new(DVec3::new(0.5, 0.0, 0.0), DVec3::ZERO, 1.0),
        ];
        compute_accelerations(&mut particles, 1.0, 0.0, 2, 2);

        // Equal masses 1 apart at distance 1: |a| = G*m/r^2 = 1.
        assert_relative_eq!(particles[0].acceleration.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(particles[1].acceleration.x, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_particle_beyond_n_active_does_not_perturb_others() {
        let mut particles = vec![
            Particle::new(DVec3::ZERO, DVec3::ZERO, 1.0),
            Particle::new(DVec3::new(1.0, 0.0, 0.0), DVec3::ZERO, 1000.0),
        ];
        compute_accelerations(&mut particles, 1.0, 0.0, 1, 2);

        // Particle 1 (index >= n_active) contributes no gravity to particle 0.
        assert_relative_eq!(particles[0].acceleration.length(), 0.0, epsilon = 1e-12);
        // But it still receives an acceleration toward particle 0.
        assert!(particles[1].acceleration.x < 0.0);
    }

    #[test]
    fn softening_bounds_close_encounter_acceleration() {
        let mut particles = vec![
            Particle::new(DVec3::ZERO, DVec3::ZERO, 1.0),
            Particle::new(DVec3::new(1e-6, 0.0, 0.0), DVec3::ZERO, 1.0),
        ];
        compute_accelerations(&mut particles, 1.0, 0.1, 2, 2);
        assert!(particles[0].acceleration.length().is_finite());
        assert!(particles[0].acceleration.length() < 100.0);
    }
}

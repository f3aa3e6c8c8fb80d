//! Fixed-step drift-kick-drift leapfrog.

use crate::error::EngineError;
use crate::particle::Particle;

use super::{ForceEvaluator, Integrator};

/// Second-order symplectic drift-kick-drift integrator. No error control and
/// no internal scratch beyond bookkeeping; always synchronised between steps.
#[derive(Clone, Copy, Debug, Default)]
pub struct Leapfrog;

impl Integrator for Leapfrog {
    fn part1(&mut self, particles: &mut [Particle], dt: f64) {
        for p in particles.iter_mut() {
            p.position += p.velocity * (0.5 * dt);
        }
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
        for p in particles.iter_mut() {
            p.velocity += p.acceleration * step;
            p.position += p.velocity * (0.5 * step);
        }
        Ok(step)
    }

    fn reallocate(&mut self, _n: usize) -> Result<(), EngineError> {
        Ok(())
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gravity::compute_accelerations;
    use glam::DVec3;

    #[test]
    fn test_leapfrog_conserves_energy_two_body() {
        let mut particles = vec![
            Particle::new(DVec3::new(1.0, 0.0, 0.0), DVec3::new(0.0, 1.0, 0.0), 1.0),
            Particle::new(DVec3::ZERO, DVec3::ZERO, 1.0),
        ];
        let mut integrator = Leapfrog;
        let dt = 0.001;

        let energy = |particles: &[Particle]| -> f64 {
            let kinetic: f64 = particles.iter().map(|p| 0.5 * p.mass * p.velocity.length_squared()).sum();
            let r = (particles[0].position - particles[1].position).length();
            kinetic - particles[0].mass * particles[1].mass / r
        };

        compute_accelerations(&mut particles, 1.0, 0.0, 2, 2);
        let e0 = energy(&particles);

        for _ in 0..2000 {
            integrator.part1(&mut particles, dt);
            compute_accelerations(&mut particles, 1.0, 0.0, 2, 2);
            let mut step_dt = dt;
            integrator
                .part2(&mut particles, &mut step_dt, false, false, &mut |_| Ok(()))
                .unwrap();
        }

        let e1 = energy(&particles);
        assert!((e1 - e0).abs() / e0.abs() < 1e-4);
    }
}

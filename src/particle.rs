//! The particle record and the store that owns a simulation's particles.

use glam::DVec3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single point mass, or (when appended past the physical particles of a
/// store) a linearised MEGNO shadow particle sharing the same layout.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Particle {
    /// Position.
    pub position: DVec3,
    /// Velocity.
    pub velocity: DVec3,
    /// Acceleration, recomputed every step; not part of the persistent state.
    pub acceleration: DVec3,
    /// Mass. Unused (but retained for layout uniformity) on shadow particles.
    pub mass: f64,
}

impl Particle {
    /// Build a particle at rest at the origin with the given mass.
    pub fn new(position: DVec3, velocity: DVec3, mass: f64) -> Self {
        Self {
            position,
            velocity,
            acceleration: DVec3::ZERO,
            mass,
        }
    }

    /// `true` if every component of position, velocity, and acceleration is finite.
    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.velocity.is_finite() && self.acceleration.is_finite()
    }
}

impl Default for Particle {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            velocity: DVec3::ZERO,
            acceleration: DVec3::ZERO,
            mass: 0.0,
        }
    }
}

/// The ordered collection of particles owned by an engine [`Context`](crate::context::Context).
///
/// Layout: indices `[0, n_active)` are massive particles contributing to gravity,
/// `[n_active, n - n_megno)` are massless test particles, and the last `n_megno`
/// entries are variational shadow particles (see [`Self::n_megno`]).
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParticleSet {
    particles: Vec<Particle>,
    /// Number of particles that contribute mass to gravity. `None` means "all physical particles".
    n_active: Option<usize>,
    /// Number of variational (MEGNO shadow) particles appended after the physical ones.
    n_megno: usize,
}

impl ParticleSet {
    /// An empty particle set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of particles, physical and variational.
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    /// `true` if there are no particles at all.
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Number of physical particles contributing mass to gravity.
    ///
    /// Resolves `n_active == None` to every physical (non-variational) particle.
    pub fn n_active(&self) -> usize {
        self.n_active.unwrap_or(self.particles.len() - self.n_megno)
    }

    /// Set the number of mass-contributing particles, or `None` for "all physical particles".
    pub fn set_n_active(&mut self, n_active: Option<usize>) {
        self.n_active = n_active;
    }

    /// Number of variational (MEGNO) particles appended after the physical ones.
    pub fn n_megno(&self) -> usize {
        self.n_megno
    }

    /// Number of physical (non-variational) particles.
    pub fn n_physical(&self) -> usize {
        self.particles.len() - self.n_megno
    }

    /// Replace the contents of the set with `particles`, clearing any variational particles.
    ///
    /// Fallible: reallocating the backing storage can fail under memory pressure.
    pub fn set_particles(&mut self, particles: &[Particle]) -> Result<(), crate::error::EngineError> {
        self.particles.clear();
        self.particles
            .try_reserve(particles.len())
            .map_err(|_| crate::error::EngineError::AllocationFailure { n: particles.len() })?;
        self.particles.extend_from_slice(particles);
        self.n_megno = 0;
        Ok(())
    }

    /// Append a variational shadow particle, incrementing [`Self::n_megno`].
    pub fn push_variational(&mut self, particle: Particle) -> Result<(), crate::error::EngineError> {
        self.particles
            .try_reserve(1)
            .map_err(|_| crate::error::EngineError::AllocationFailure { n: self.particles.len() + 1 })?;
        self.particles.push(particle);
        self.n_megno += 1;
        Ok(())
    }

    /// Drop every particle and reset `n_active`/`n_megno`.
    pub fn clear(&mut self) {
        self.particles.clear();
        self.n_active = None;
        self.n_megno = 0;
    }

    /// Borrow a single particle by index.
    pub fn get(&self, index: usize) -> Option<&Particle> {
        self.particles.get(index)
    }

    /// All particles, physical then variational.
    pub fn as_slice(&self) -> &[Particle] {
        &self.particles
    }

    /// All particles, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    /// `true` if every particle's state is finite.
    pub fn all_finite(&self) -> bool {
        self.particles.iter().all(Particle::is_finite)
    }
}

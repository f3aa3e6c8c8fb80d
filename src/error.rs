//! Error types surfaced by the engine.

/// Failure modes that can arise while stepping or integrating the engine.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// `step` or `integrate_until` was called with no particles loaded.
    #[error("no particles loaded")]
    NoParticles,

    /// Growing a particle store or integrator workspace to accommodate `n`
    /// particles failed to allocate.
    #[error("failed to allocate workspace for {n} particles")]
    AllocationFailure {
        /// The particle count the allocation was sized for.
        n: usize,
    },

    /// A position, velocity, or acceleration component became non-finite
    /// (NaN or infinite) during a step.
    #[error("non-finite state encountered during integration")]
    NonFiniteState,

    /// IAS15 failed to converge its predictor-corrector loop, or exhausted
    /// its step-rejection budget without finding an acceptable step.
    #[error("integrator failed to converge after {attempts} attempts")]
    IntegratorDiverged {
        /// Number of predictor-corrector iterations or step rejections attempted.
        attempts: u32,
    },
}

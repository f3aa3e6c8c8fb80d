//! Default scalar parameters for a freshly constructed or reset [`Context`](crate::context::Context).

/// Default fixed or initial step size.
pub const DEFAULT_DT: f64 = 0.01;

/// Default initial simulation time.
pub const DEFAULT_T: f64 = 0.0;

/// Default gravitational constant (geometric units: `G = 1`).
pub const DEFAULT_G: f64 = 1.0;

/// Default Plummer softening length (unsoftened).
pub const DEFAULT_SOFTENING: f64 = 0.0;

/// Default IAS15 target accuracy per step.
pub const DEFAULT_IAS15_EPSILON: f64 = 1e-9;

/// Upper bound on the factor by which IAS15 may grow its step size in one step.
pub const IAS15_MAX_DT_GROWTH: f64 = 4.0;

/// Maximum predictor-corrector iterations per IAS15 step before giving up.
pub const IAS15_MAX_ITERATIONS: u32 = 12;

/// Maximum consecutive step rejections before IAS15 reports divergence.
pub const IAS15_MAX_REJECTIONS: u32 = 100;

/// Number of Gauss-Radau substeps (excluding the step start) used by IAS15.
pub const IAS15_STAGES: usize = 7;

/// Gauss-Radau spacing on `[0, 1]`, `h[0] == 0` is the step start.
pub const IAS15_H: [f64; 8] = [
    0.0,
    0.056_262_560_536_922_15,
    0.180_240_691_736_892_36,
    0.352_624_717_113_169_6,
    0.547_153_626_330_555_4,
    0.734_210_177_215_410_5,
    0.885_320_946_839_095_8,
    0.977_520_613_561_287_5,
];

/// PEFRL composition coefficients (Omelyan, Mryglod & Folk, 2002).
pub mod pefrl {
    /// Leading/trailing drift fraction.
    pub const XI: f64 = 0.178_617_895_844_809_1;
    /// Outer drift fraction.
    pub const LAMBDA: f64 = -0.212_341_831_062_605_4;
    /// Kick fraction.
    pub const CHI: f64 = -0.066_264_582_669_818_5;
}

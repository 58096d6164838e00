//! Exponential moving average
//!
//! First-order smoothing applied to every sensed quantity before it reaches
//! the loops or the software protection checks.

/// Smoothing factor used for all sensed quantities in the reference design
pub const DEFAULT_ALPHA: f32 = 0.01;

/// Exponential moving average `out += alpha * (sample - out)`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AverageFilter {
    alpha: f32,
    out: f32,
}

impl AverageFilter {
    /// Create a filter with output starting at zero.
    ///
    /// `alpha` is clamped to `(0, 1]`; a non-positive value would freeze the
    /// output forever.
    #[must_use]
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: clamp_alpha(alpha),
            out: 0.0,
        }
    }

    /// Feed one sample and return the updated average
    pub fn step(&mut self, sample: f32) -> f32 {
        self.out += self.alpha * (sample - self.out);
        self.out
    }

    /// Change smoothing; the current output is kept
    pub fn configure(&mut self, alpha: f32) {
        self.alpha = clamp_alpha(alpha);
    }

    /// Zero the output
    pub fn reset(&mut self) {
        self.out = 0.0;
    }

    /// Current average
    #[must_use]
    pub const fn output(&self) -> f32 {
        self.out
    }

    /// Current smoothing factor
    #[must_use]
    pub const fn alpha(&self) -> f32 {
        self.alpha
    }
}

impl Default for AverageFilter {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

fn clamp_alpha(alpha: f32) -> f32 {
    if alpha.is_finite() && alpha > 0.0 {
        alpha.min(1.0)
    } else {
        f32::MIN_POSITIVE
    }
}

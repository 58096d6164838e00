//! Loop compensator
//!
//! Third-order IIR compensator in direct form with three input and three
//! output history taps:
//!
//! ```text
//! y[n] = b0·e[n] + b1·e[n-1] + b2·e[n-2] + b3·e[n-3]
//!                - a1·y[n-1] - a2·y[n-2] - a3·y[n-3]
//! ```
//!
//! A 2-pole-2-zero design simply leaves `a3` and `b3` at zero. Arithmetic is
//! `f64` so integrating designs (pole at z = 1) do not drift from rounding.
//! The compensator never clamps its output; saturation is the caller's job.

/// Coefficient set for [`Compensator`]
///
/// Denominator is normalized so that `a0 = 1`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompensatorCoefficients {
    /// Output history coefficients `[a1, a2, a3]`
    pub a: [f64; 3],
    /// Input coefficients `[b0, b1, b2, b3]`
    pub b: [f64; 4],
}

/// Reason a coefficient set was rejected
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoefficientError {
    /// A coefficient is NaN or infinite
    NonFinite,
    /// Every numerator coefficient is zero; the loop would have no gain
    ZeroNumerator,
}

impl core::fmt::Display for CoefficientError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NonFinite => write!(f, "compensator coefficient is not finite"),
            Self::ZeroNumerator => write!(f, "compensator numerator is all zero"),
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for CoefficientError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::NonFinite => defmt::write!(f, "NonFinite"),
            Self::ZeroNumerator => defmt::write!(f, "ZeroNumerator"),
        }
    }
}

impl CompensatorCoefficients {
    /// Voltage loop, power flowing primary to secondary
    pub const VOLTAGE_PRIM_TO_SEC: Self = Self::new(
        [-1.728_489_503_7, 0.728_489_503_7, 0.0],
        [4.828_013_058_4, 0.149_327_746_9, -4.678_679_259_3, 0.0],
    );

    /// Voltage loop, power flowing secondary to primary
    pub const VOLTAGE_SEC_TO_PRIM: Self = Self::new(
        [-0.482_906_014_0, -0.517_093_986_0, 0.0],
        [1.343_662_073_2, -0.348_862_495_9, -0.539_671_381_5, 0.0],
    );

    /// Current loop tuned for a resistive load bank
    pub const CURRENT_RESISTIVE_LOAD: Self = Self::new(
        [-1.827_739_600_9, 0.827_739_600_9, 0.0],
        [1.250_003_617_2, 0.215_318_887_6, -1.034_671_507_1, 0.0],
    );

    /// Current loop tuned for a battery emulator on the secondary
    pub const CURRENT_BATTERY_EMULATION: Self = Self::new(
        [0.034_187_972_0, -0.766_801_781_6, -0.267_386_190_3],
        [
            1.343_662_073_2,
            0.345_937_081_3,
            -0.720_066_080_0,
            -0.279_060_825_8,
        ],
    );

    /// Build a coefficient set from `[a1, a2, a3]` and `[b0, b1, b2, b3]`
    #[must_use]
    pub const fn new(a: [f64; 3], b: [f64; 4]) -> Self {
        Self { a, b }
    }

    /// Check that the set is usable.
    ///
    /// # Errors
    ///
    /// Returns [`CoefficientError`] for non-finite values or an all-zero
    /// numerator.
    pub fn validate(&self) -> Result<(), CoefficientError> {
        if self.a.iter().chain(self.b.iter()).any(|c| !c.is_finite()) {
            return Err(CoefficientError::NonFinite);
        }
        if self.b.iter().all(|&c| c == 0.0) {
            return Err(CoefficientError::ZeroNumerator);
        }
        Ok(())
    }
}

/// Compensator state for one control loop
#[derive(Clone, Copy, Debug)]
pub struct Compensator {
    coeffs: CompensatorCoefficients,
    /// e[n-1], e[n-2], e[n-3]
    inputs: [f64; 3],
    /// y[n-1], y[n-2], y[n-3]
    outputs: [f64; 3],
}

impl Compensator {
    /// Create a compensator with zeroed history
    #[must_use]
    pub const fn new(coeffs: CompensatorCoefficients) -> Self {
        Self {
            coeffs,
            inputs: [0.0; 3],
            outputs: [0.0; 3],
        }
    }

    /// Run one step on `error` and shift the history by one sample
    pub fn step(&mut self, error: f64) -> f64 {
        let CompensatorCoefficients { a, b } = self.coeffs;
        let [e1, e2, e3] = self.inputs;
        let [y1, y2, y3] = self.outputs;

        let output = b[0] * error + b[1] * e1 + b[2] * e2 + b[3] * e3
            - a[0] * y1
            - a[1] * y2
            - a[2] * y3;

        self.inputs = [error, e1, e2];
        self.outputs = [output, y1, y2];
        output
    }

    /// Zero the history; coefficients are kept
    pub fn reset(&mut self) {
        self.inputs = [0.0; 3];
        self.outputs = [0.0; 3];
    }

    /// Clamp the most recent output to `min..=max` and store the clamped
    /// value as history, so an integrating design stops winding up while
    /// saturated.
    pub fn saturate(&mut self, min: f64, max: f64) -> f64 {
        let clamped = self.outputs[0].clamp(min, max);
        self.outputs[0] = clamped;
        clamped
    }

    /// Most recent output
    #[must_use]
    pub const fn last_output(&self) -> f64 {
        self.outputs[0]
    }

    /// Active coefficient set
    #[must_use]
    pub const fn coefficients(&self) -> &CompensatorCoefficients {
        &self.coeffs
    }
}

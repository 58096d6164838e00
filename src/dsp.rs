//! Digital Signal Processing
//!
//! Filter primitives for the control chain:
//! - Three-history IIR compensator for the voltage and current loops
//! - Exponential moving average for sensed quantities
//! - Reference slew limiter

pub mod average;
pub mod compensator;
pub mod slew;

pub use average::AverageFilter;
pub use compensator::{CoefficientError, Compensator, CompensatorCoefficients};
pub use slew::SlewLimiter;

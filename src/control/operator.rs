//! Operator handle
//!
//! The only way application code changes a running session. Every call is a
//! handful of atomic stores, so it is safe from any context.

use core::sync::atomic::Ordering;

use super::shared::SessionShared;
use crate::protection::TripCause;
use crate::rectification::SrMode;
use crate::types::{LoopState, Measurements};

/// Setpoint refused by the operator handle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputError {
    /// Value is NaN or infinite
    NotFinite,
    /// Value is negative where only magnitudes make sense
    Negative,
}

impl core::fmt::Display for InputError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFinite => write!(f, "value is not finite"),
            Self::Negative => write!(f, "value is negative"),
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for InputError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::NotFinite => defmt::write!(f, "NotFinite"),
            Self::Negative => defmt::write!(f, "Negative"),
        }
    }
}

fn non_negative(value: f32) -> Result<f32, InputError> {
    if !value.is_finite() {
        Err(InputError::NotFinite)
    } else if value < 0.0 {
        Err(InputError::Negative)
    } else {
        Ok(value)
    }
}

/// Application-side view of a session
#[derive(Clone, Copy, Debug)]
pub struct OperatorHandle<'a> {
    shared: &'a SessionShared,
}

impl<'a> OperatorHandle<'a> {
    /// Wrap the shared state of a session
    #[must_use]
    pub const fn new(shared: &'a SessionShared) -> Self {
        Self { shared }
    }

    /// Request an SR mode; the control tier applies it on its next run
    pub fn command_sr_mode(&self, mode: SrMode) {
        self.shared
            .inputs
            .sr_command
            .store(mode.as_raw(), Ordering::Release);
    }

    /// Ask the monitor tier to clear the latched trip.
    ///
    /// Returns the cause being acknowledged, or [`TripCause::None`] when
    /// nothing is latched. The clear only happens if the latch still holds
    /// that cause and no fault line is asserted.
    pub fn request_trip_clear(&self) -> TripCause {
        let cause = self.shared.trip.state();
        if cause.is_tripped() {
            self.shared
                .inputs
                .trip_clear_request
                .store(cause.as_raw(), Ordering::Release);
        }
        cause
    }

    /// Hand the period to the compensator
    pub fn request_close_loop(&self) {
        self.shared
            .inputs
            .close_loop_request
            .store(true, Ordering::Release);
    }

    /// Target voltage of the regulated bus
    ///
    /// # Errors
    ///
    /// Rejects negative or non-finite values.
    pub fn set_voltage_reference(&self, volts: f32) -> Result<(), InputError> {
        let volts = non_negative(volts)?;
        self.shared.inputs.voltage_reference_volts.store(volts);
        Ok(())
    }

    /// Target secondary current
    ///
    /// # Errors
    ///
    /// Rejects non-finite values.
    pub fn set_current_reference(&self, amps: f32) -> Result<(), InputError> {
        if !amps.is_finite() {
            return Err(InputError::NotFinite);
        }
        self.shared.inputs.current_reference_amps.store(amps);
        Ok(())
    }

    /// Switching frequency while the loop is open. Unusable values are
    /// stored as given; the control tier rejects them and keeps the previous
    /// command.
    pub fn set_open_loop_frequency(&self, hz: f32) {
        self.shared.inputs.open_loop_hz.store(hz);
    }

    /// Bridge-to-bridge phase shift
    ///
    /// # Errors
    ///
    /// Rejects non-finite values.
    pub fn set_phase_shift_ns(&self, ns: f32) -> Result<(), InputError> {
        if !ns.is_finite() {
            return Err(InputError::NotFinite);
        }
        self.shared.inputs.phase_shift_ns.store(ns);
        Ok(())
    }

    /// Rising and falling dead time
    ///
    /// # Errors
    ///
    /// Rejects negative or non-finite values; neither edge is changed.
    pub fn set_deadband_ns(&self, rising: f32, falling: f32) -> Result<(), InputError> {
        let rising = non_negative(rising)?;
        let falling = non_negative(falling)?;
        self.shared.inputs.deadband_rising_ns.store(rising);
        self.shared.inputs.deadband_falling_ns.store(falling);
        Ok(())
    }

    /// Latched trip cause
    #[must_use]
    pub fn trip_state(&self) -> TripCause {
        self.shared.trip.state()
    }

    /// Latest filtered measurements
    #[must_use]
    pub fn measurements(&self) -> Measurements {
        self.shared.measurements.load()
    }

    /// Whether the compensator drives the period
    #[must_use]
    pub fn loop_state(&self) -> LoopState {
        self.shared.loop_state()
    }

    /// SR mode the stage is running
    #[must_use]
    pub fn sr_mode(&self) -> SrMode {
        self.shared.sr_active()
    }
}

//! Monitor tier
//!
//! Runs at the slow control rate (~10 kHz). Turns raw ADC samples into
//! filtered physical measurements, slews the regulated reference, derives
//! dead-band ticks from the operator setpoints, handles trip-clear requests
//! and polls every fault source.

use core::sync::atomic::Ordering;

use super::shared::SessionShared;
use crate::config::{CalibrationSet, ConverterConfig, SensorScales};
use crate::dsp::{AverageFilter, SlewLimiter};
use crate::hal::{RawSamples, SafeOutput, SensorFrontEnd};
use crate::modulation::ModulationCalculator;
use crate::protection::{FaultLines, TripCause, TripLimits};
use crate::types::{Bridge, ControlMode, Measurements};

/// One averaging filter per sensed channel
#[derive(Clone, Copy, Debug)]
struct ChannelFilters {
    i_primary: AverageFilter,
    i_primary_tank: AverageFilter,
    i_secondary: AverageFilter,
    v_primary: AverageFilter,
    v_secondary: AverageFilter,
}

impl ChannelFilters {
    fn new(alpha: f32) -> Self {
        Self {
            i_primary: AverageFilter::new(alpha),
            i_primary_tank: AverageFilter::new(alpha),
            i_secondary: AverageFilter::new(alpha),
            v_primary: AverageFilter::new(alpha),
            v_secondary: AverageFilter::new(alpha),
        }
    }

    /// Calibrate and filter; result stays in per-unit
    fn step(&mut self, raw: &RawSamples, cal: &CalibrationSet) -> RawSamples {
        RawSamples {
            i_primary: self.i_primary.step(cal.i_primary.apply(raw.i_primary)),
            i_primary_tank: self
                .i_primary_tank
                .step(cal.i_primary_tank.apply(raw.i_primary_tank)),
            i_secondary: self.i_secondary.step(cal.i_secondary.apply(raw.i_secondary)),
            v_primary: self.v_primary.step(cal.v_primary.apply(raw.v_primary)),
            v_secondary: self.v_secondary.step(cal.v_secondary.apply(raw.v_secondary)),
        }
    }
}

fn to_physical(pu: &RawSamples, scales: &SensorScales) -> Measurements {
    Measurements {
        v_primary_volts: pu.v_primary * scales.v_primary_volts,
        v_secondary_volts: pu.v_secondary * scales.v_secondary_volts,
        i_primary_amps: pu.i_primary * scales.i_primary_amps,
        i_primary_tank_amps: pu.i_primary_tank * scales.i_primary_tank_amps,
        i_secondary_amps: pu.i_secondary * scales.i_secondary_amps,
    }
}

/// Sensing, reference shaping and protection
#[derive(Debug)]
pub struct MonitorTier<'a> {
    shared: &'a SessionShared,
    mode: ControlMode,
    regulated_bridge: Bridge,
    calibration: CalibrationSet,
    scales: SensorScales,
    filters: ChannelFilters,
    reference: SlewLimiter,
    limits: TripLimits,
    protection_enabled: bool,
    calculator: ModulationCalculator,
    safe_forced: bool,
}

impl<'a> MonitorTier<'a> {
    /// Build the tier for `config`
    #[must_use]
    pub fn new(shared: &'a SessionShared, config: &ConverterConfig) -> Self {
        let rate = match config.mode {
            ControlMode::Voltage => config.slew.volts_per_second,
            ControlMode::Current => config.slew.amps_per_second,
        };
        Self {
            shared,
            mode: config.mode,
            regulated_bridge: config.direction.rectifying_bridge(),
            calibration: config.calibration,
            scales: config.scales,
            filters: ChannelFilters::new(config.average_alpha),
            reference: SlewLimiter::new(rate, config.monitor_tier_hz),
            limits: config.trip_limits,
            protection_enabled: config.protection_enabled,
            calculator: super::calculator_for(config),
            safe_forced: false,
        }
    }

    /// Slew-limited reference in physical units
    #[must_use]
    pub const fn reference(&self) -> f32 {
        self.reference.current()
    }

    /// One monitor period. Returns the cause latched by this run, if any.
    pub fn run<H: SensorFrontEnd + SafeOutput + ?Sized>(&mut self, hal: &mut H) -> Option<TripCause> {
        let raw = hal.read_raw_samples();
        let filtered = self.filters.step(&raw, &self.calibration);
        let measurements = to_physical(&filtered, &self.scales);
        self.shared.measurements.store(&measurements);

        self.update_reference(&filtered);
        self.update_deadband();

        let lines = hal.read_fault_lines() | self.limits.check(&measurements);
        self.process_trip_clear(&lines, hal);

        let latched = if self.protection_enabled {
            self.shared.trip.poll_fault_sources(&lines)
        } else {
            None
        };

        if self.shared.trip.is_tripped() && !self.safe_forced {
            hal.force_safe_output();
            self.safe_forced = true;
        }
        latched
    }

    fn regulated_scale(&self) -> f32 {
        match self.mode {
            ControlMode::Voltage => self.scales.voltage_of(self.regulated_bridge),
            ControlMode::Current => self.scales.i_secondary_amps,
        }
    }

    fn update_reference(&mut self, filtered: &RawSamples) {
        let inputs = &self.shared.inputs;
        let (target, feedback_pu) = match (self.mode, self.regulated_bridge) {
            (ControlMode::Voltage, Bridge::Secondary) => {
                (inputs.voltage_reference_volts.load(), filtered.v_secondary)
            }
            (ControlMode::Voltage, Bridge::Primary) => {
                (inputs.voltage_reference_volts.load(), filtered.v_primary)
            }
            (ControlMode::Current, _) => (inputs.current_reference_amps.load(), filtered.i_secondary),
        };

        // Held at zero while tripped; ramps up from zero after a clear.
        let reference = if self.shared.trip.is_tripped() {
            self.reference.set_current(0.0);
            0.0
        } else {
            self.reference.step_toward(target)
        };

        let signals = &self.shared.signals;
        signals.reference_pu.store(reference / self.regulated_scale());
        signals.feedback_pu.store(feedback_pu);
    }

    fn update_deadband(&self) {
        let (_, max_period) = self.calculator.period_tick_limits();
        let inputs = &self.shared.inputs;
        let signals = &self.shared.signals;
        signals.deadband_rising_ticks.store(
            self.calculator
                .deadband_ticks(inputs.deadband_rising_ns.load(), max_period),
            Ordering::Relaxed,
        );
        signals.deadband_falling_ticks.store(
            self.calculator
                .deadband_ticks(inputs.deadband_falling_ns.load(), max_period),
            Ordering::Relaxed,
        );
    }

    fn process_trip_clear<H: SafeOutput + ?Sized>(&mut self, lines: &FaultLines, hal: &mut H) {
        let requested = TripCause::from_raw(
            self.shared
                .inputs
                .trip_clear_request
                .swap(TripCause::None.as_raw(), Ordering::AcqRel),
        );
        if !requested.is_tripped() {
            return;
        }
        if self.protection_enabled && lines.any() {
            warn!("trip clear refused, fault still asserted: {}", requested);
            return;
        }
        if self.shared.trip.clear(requested) {
            self.reference.set_current(0.0);
            hal.clear_safe_output();
            self.safe_forced = false;
        }
    }
}

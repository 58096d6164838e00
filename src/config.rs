//! Converter configuration and reference-design constants
//!
//! Values describing the reference CLLC power stage are collected here as
//! constants. [`ConverterConfig`] gathers everything a control session needs
//! and is validated once before any modulation is armed.

use crate::dsp::average::DEFAULT_ALPHA;
use crate::dsp::compensator::{CoefficientError, CompensatorCoefficients};
use crate::modulation::TimerTiming;
use crate::protection::TripLimits;
use crate::types::{Bridge, ControlMode, CurrentLoopSetup, ExecutionCore, PowerFlowDirection};

/// PWM timer clock (120 MHz)
pub const TIMER_CLOCK_HZ: u32 = 120_000_000;

/// Nominal switching frequency at the tank resonance
pub const NOMINAL_SWITCHING_HZ: f32 = 200_000.0;

/// Lowest switching frequency the modulation may command
pub const MIN_SWITCHING_HZ: f32 = 100_000.0;

/// Highest switching frequency the modulation may command
pub const MAX_SWITCHING_HZ: f32 = 400_000.0;

/// Control tier rate
pub const CONTROL_TIER_HZ: f32 = 120_000.0;

/// Monitor tier rate
pub const MONITOR_TIER_HZ: f32 = 10_000.0;

/// Background supervisor tick period in milliseconds
pub const BACKGROUND_TICK_MS: u64 = 10;

/// Default dead time on both edges
pub const DEADBAND_NS: f32 = 200.0;

/// Phase compensation applied to the rectifier on SR mode changes
pub const SR_PHASE_COMPENSATION_NS: f32 = 81.0;

/// Duty of the bridge switching the tank
pub const DRIVING_BRIDGE_DUTY: f32 = 0.5;

/// Duty of the rectifying bridge
pub const RECTIFIER_BRIDGE_DUTY: f32 = 0.45;

/// Nominal secondary bus voltage
pub const NOMINAL_V_SECONDARY_VOLTS: f32 = 350.0;

/// Nominal primary bus voltage
pub const NOMINAL_V_PRIMARY_VOLTS: f32 = 400.0;

/// Default voltage reference ramp rate (V/s)
pub const VOLTAGE_SLEW_VOLTS_PER_S: f32 = 100.0;

/// Default current reference ramp rate (A/s)
pub const CURRENT_SLEW_AMPS_PER_S: f32 = 10.0;

/// Full-scale values of the sensing chain (physical value at 1.0 pu)
pub mod sense {
    //! Full-scale sense ranges of the reference power stage

    /// Primary bus voltage
    pub const V_PRIMARY_VOLTS: f32 = 508.685;

    /// Secondary bus voltage. The secondary chain is conditioned to its
    /// optimal range, so 1.0 pu is 450 V rather than the sensor's absolute
    /// full scale. Measurements and the voltage reference share this base.
    pub const V_SECONDARY_VOLTS: f32 = 450.0;

    /// Primary bridge current
    pub const I_PRIMARY_AMPS: f32 = 55.0;

    /// Secondary bridge current
    pub const I_SECONDARY_AMPS: f32 = 33.951;

    /// Primary tank current
    pub const I_PRIMARY_TANK_AMPS: f32 = 34.375;
}

/// Protection limits of the reference power stage
pub mod trip {
    //! Trip limits

    /// Primary bridge current
    pub const I_PRIMARY_AMPS: f32 = 30.0;

    /// Secondary bridge current
    pub const I_SECONDARY_AMPS: f32 = 30.0;

    /// Primary tank current
    pub const I_PRIMARY_TANK_AMPS: f32 = 30.0;

    /// Secondary bus voltage
    pub const V_SECONDARY_VOLTS: f32 = 450.0;
}

/// Linear correction of one ADC channel in per-unit
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorCalibration {
    /// Subtracted from the raw sample (mid-scale for bipolar channels)
    pub offset_pu: f32,
    /// Gain correction
    pub slope: f32,
    /// Offset correction after gain
    pub intercept: f32,
}

impl SensorCalibration {
    /// Unipolar channel with no correction
    pub const IDENTITY: Self = Self::new(0.0, 1.0, 0.0);

    /// Build a calibration
    #[must_use]
    pub const fn new(offset_pu: f32, slope: f32, intercept: f32) -> Self {
        Self {
            offset_pu,
            slope,
            intercept,
        }
    }

    /// `(raw - offset) * slope + intercept`
    #[must_use]
    pub fn apply(&self, raw_pu: f32) -> f32 {
        (raw_pu - self.offset_pu) * self.slope + self.intercept
    }
}

/// Calibration of every sensed channel
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibrationSet {
    /// Primary bridge current
    pub i_primary: SensorCalibration,
    /// Primary tank current
    pub i_primary_tank: SensorCalibration,
    /// Secondary bridge current
    pub i_secondary: SensorCalibration,
    /// Primary bus voltage
    pub v_primary: SensorCalibration,
    /// Secondary bus voltage
    pub v_secondary: SensorCalibration,
}

impl Default for CalibrationSet {
    fn default() -> Self {
        Self {
            i_primary: SensorCalibration::new(0.5, 1.023_31, -0.019_34),
            i_primary_tank: SensorCalibration::new(0.5, 0.954_55, 0.009_197),
            i_secondary: SensorCalibration::new(0.5, 0.882_981, -0.000_26),
            v_primary: SensorCalibration::IDENTITY,
            v_secondary: SensorCalibration::IDENTITY,
        }
    }
}

/// Physical value at 1.0 pu for each channel
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorScales {
    /// Primary bus voltage
    pub v_primary_volts: f32,
    /// Secondary bus voltage
    pub v_secondary_volts: f32,
    /// Primary bridge current
    pub i_primary_amps: f32,
    /// Secondary bridge current
    pub i_secondary_amps: f32,
    /// Primary tank current
    pub i_primary_tank_amps: f32,
}

impl SensorScales {
    /// Full-scale voltage of the bus on `bridge`
    #[must_use]
    pub const fn voltage_of(&self, bridge: Bridge) -> f32 {
        match bridge {
            Bridge::Primary => self.v_primary_volts,
            Bridge::Secondary => self.v_secondary_volts,
        }
    }

    fn all_positive(&self) -> bool {
        [
            self.v_primary_volts,
            self.v_secondary_volts,
            self.i_primary_amps,
            self.i_secondary_amps,
            self.i_primary_tank_amps,
        ]
        .iter()
        .all(|v| v.is_finite() && *v > 0.0)
    }
}

impl Default for SensorScales {
    fn default() -> Self {
        Self {
            v_primary_volts: sense::V_PRIMARY_VOLTS,
            v_secondary_volts: sense::V_SECONDARY_VOLTS,
            i_primary_amps: sense::I_PRIMARY_AMPS,
            i_secondary_amps: sense::I_SECONDARY_AMPS,
            i_primary_tank_amps: sense::I_PRIMARY_TANK_AMPS,
        }
    }
}

/// Compensator coefficient sets available to a session
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompensatorPresets {
    /// Voltage loop, primary to secondary
    pub voltage_prim_to_sec: CompensatorCoefficients,
    /// Voltage loop, secondary to primary
    pub voltage_sec_to_prim: CompensatorCoefficients,
    /// Current loop, resistive load
    pub current_resistive_load: CompensatorCoefficients,
    /// Current loop, battery emulation
    pub current_battery_emulation: CompensatorCoefficients,
}

impl CompensatorPresets {
    fn validate(&self) -> Result<(), CoefficientError> {
        self.voltage_prim_to_sec.validate()?;
        self.voltage_sec_to_prim.validate()?;
        self.current_resistive_load.validate()?;
        self.current_battery_emulation.validate()
    }
}

impl Default for CompensatorPresets {
    fn default() -> Self {
        Self {
            voltage_prim_to_sec: CompensatorCoefficients::VOLTAGE_PRIM_TO_SEC,
            voltage_sec_to_prim: CompensatorCoefficients::VOLTAGE_SEC_TO_PRIM,
            current_resistive_load: CompensatorCoefficients::CURRENT_RESISTIVE_LOAD,
            current_battery_emulation: CompensatorCoefficients::CURRENT_BATTERY_EMULATION,
        }
    }
}

/// Reference ramp rates
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlewRates {
    /// Voltage reference (V/s)
    pub volts_per_second: f32,
    /// Current reference (A/s)
    pub amps_per_second: f32,
}

impl Default for SlewRates {
    fn default() -> Self {
        Self {
            volts_per_second: VOLTAGE_SLEW_VOLTS_PER_S,
            amps_per_second: CURRENT_SLEW_AMPS_PER_S,
        }
    }
}

/// Configuration errors, detected before a session is built
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A switching frequency is zero, negative or not finite
    ZeroSwitchingFrequency,
    /// Minimum switching frequency above maximum
    InvertedFrequencyRange,
    /// Nominal switching frequency outside the min/max range
    NominalOutOfRange,
    /// Timer clock is zero
    ZeroTimerClock,
    /// Timer alignment or resolution unusable
    InvalidTimerTiming,
    /// Averaging factor outside `(0, 1]`
    InvalidAlpha,
    /// Compensator coefficients rejected
    MalformedCoefficients(CoefficientError),
    /// A sense full-scale value is not strictly positive
    NonPositiveScale,
    /// A trip limit is not strictly positive
    NonPositiveLimit,
    /// A tier rate is zero or not finite
    ZeroTierRate,
    /// Monitor tier configured faster than the control tier
    TierRateOrder,
    /// Duty outside `0.0..=1.0`
    InvalidDuty,
    /// Dead time or phase compensation negative or not finite
    InvalidTiming,
    /// Slew rate not strictly positive
    InvalidSlewRate,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ZeroSwitchingFrequency => write!(f, "switching frequency must be positive"),
            Self::InvertedFrequencyRange => write!(f, "minimum switching frequency above maximum"),
            Self::NominalOutOfRange => write!(f, "nominal switching frequency outside range"),
            Self::ZeroTimerClock => write!(f, "timer clock is zero"),
            Self::InvalidTimerTiming => write!(f, "timer alignment or resolution invalid"),
            Self::InvalidAlpha => write!(f, "averaging factor outside (0, 1]"),
            Self::MalformedCoefficients(e) => write!(f, "{e}"),
            Self::NonPositiveScale => write!(f, "sense full-scale must be positive"),
            Self::NonPositiveLimit => write!(f, "trip limit must be positive"),
            Self::ZeroTierRate => write!(f, "tier rate must be positive"),
            Self::TierRateOrder => write!(f, "monitor tier faster than control tier"),
            Self::InvalidDuty => write!(f, "duty outside 0..1"),
            Self::InvalidTiming => write!(f, "dead time or phase compensation invalid"),
            Self::InvalidSlewRate => write!(f, "slew rate must be positive"),
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for ConfigError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::MalformedCoefficients(e) => defmt::write!(f, "MalformedCoefficients({})", e),
            other => defmt::write!(f, "{=str}", other.name()),
        }
    }
}

impl ConfigError {
    #[cfg(feature = "embedded")]
    const fn name(self) -> &'static str {
        match self {
            Self::ZeroSwitchingFrequency => "ZeroSwitchingFrequency",
            Self::InvertedFrequencyRange => "InvertedFrequencyRange",
            Self::NominalOutOfRange => "NominalOutOfRange",
            Self::ZeroTimerClock => "ZeroTimerClock",
            Self::InvalidTimerTiming => "InvalidTimerTiming",
            Self::InvalidAlpha => "InvalidAlpha",
            Self::MalformedCoefficients(_) => "MalformedCoefficients",
            Self::NonPositiveScale => "NonPositiveScale",
            Self::NonPositiveLimit => "NonPositiveLimit",
            Self::ZeroTierRate => "ZeroTierRate",
            Self::TierRateOrder => "TierRateOrder",
            Self::InvalidDuty => "InvalidDuty",
            Self::InvalidTiming => "InvalidTiming",
            Self::InvalidSlewRate => "InvalidSlewRate",
        }
    }
}

impl From<CoefficientError> for ConfigError {
    fn from(e: CoefficientError) -> Self {
        Self::MalformedCoefficients(e)
    }
}

/// Everything a control session needs, fixed for its lifetime
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConverterConfig {
    /// Power flow direction
    pub direction: PowerFlowDirection,
    /// Regulated quantity
    pub mode: ControlMode,
    /// Where the update tier runs
    pub core: ExecutionCore,
    /// Load attached to the secondary, selects the current-loop tuning
    pub current_loop_setup: CurrentLoopSetup,
    /// PWM timer parameters
    pub timing: TimerTiming,
    /// Nominal switching frequency
    pub nominal_switching_hz: f32,
    /// Lowest switching frequency
    pub min_switching_hz: f32,
    /// Highest switching frequency
    pub max_switching_hz: f32,
    /// Control tier rate
    pub control_tier_hz: f32,
    /// Monitor tier rate
    pub monitor_tier_hz: f32,
    /// Rising-edge dead time at start
    pub deadband_rising_ns: f32,
    /// Falling-edge dead time at start
    pub deadband_falling_ns: f32,
    /// Duty of the driving bridge
    pub driving_duty: f32,
    /// Duty of the rectifying bridge
    pub rectifier_duty: f32,
    /// Compensator coefficient sets
    pub compensators: CompensatorPresets,
    /// Sense full-scale values
    pub scales: SensorScales,
    /// Sense calibrations
    pub calibration: CalibrationSet,
    /// Reference ramp rates
    pub slew: SlewRates,
    /// Averaging factor for every sensed channel
    pub average_alpha: f32,
    /// Software trip limits
    pub trip_limits: TripLimits,
    /// Trip on faults; disabled only for open-loop bench work
    pub protection_enabled: bool,
    /// Rectifier phase compensation applied on SR mode changes
    pub sr_phase_compensation_ns: f32,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            direction: PowerFlowDirection::default(),
            mode: ControlMode::default(),
            core: ExecutionCore::default(),
            current_loop_setup: CurrentLoopSetup::default(),
            timing: TimerTiming::default(),
            nominal_switching_hz: NOMINAL_SWITCHING_HZ,
            min_switching_hz: MIN_SWITCHING_HZ,
            max_switching_hz: MAX_SWITCHING_HZ,
            control_tier_hz: CONTROL_TIER_HZ,
            monitor_tier_hz: MONITOR_TIER_HZ,
            deadband_rising_ns: DEADBAND_NS,
            deadband_falling_ns: DEADBAND_NS,
            driving_duty: DRIVING_BRIDGE_DUTY,
            rectifier_duty: RECTIFIER_BRIDGE_DUTY,
            compensators: CompensatorPresets::default(),
            scales: SensorScales::default(),
            calibration: CalibrationSet::default(),
            slew: SlewRates::default(),
            average_alpha: DEFAULT_ALPHA,
            trip_limits: TripLimits::default(),
            protection_enabled: true,
            sr_phase_compensation_ns: SR_PHASE_COMPENSATION_NS,
        }
    }
}

impl ConverterConfig {
    /// Reference design running in `direction` and `mode`
    #[must_use]
    pub fn reference(direction: PowerFlowDirection, mode: ControlMode) -> Self {
        Self {
            direction,
            mode,
            ..Self::default()
        }
    }

    /// Check every field.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let freqs = [
            self.nominal_switching_hz,
            self.min_switching_hz,
            self.max_switching_hz,
        ];
        if freqs.iter().any(|f| !f.is_finite() || *f <= 0.0) {
            return Err(ConfigError::ZeroSwitchingFrequency);
        }
        if self.min_switching_hz > self.max_switching_hz {
            return Err(ConfigError::InvertedFrequencyRange);
        }
        if self.nominal_switching_hz < self.min_switching_hz
            || self.nominal_switching_hz > self.max_switching_hz
        {
            return Err(ConfigError::NominalOutOfRange);
        }
        if self.timing.clock_hz == 0 {
            return Err(ConfigError::ZeroTimerClock);
        }
        if !self.timing.is_valid() {
            return Err(ConfigError::InvalidTimerTiming);
        }
        if !(self.average_alpha > 0.0 && self.average_alpha <= 1.0) {
            return Err(ConfigError::InvalidAlpha);
        }
        self.compensators.validate()?;
        if !self.scales.all_positive() {
            return Err(ConfigError::NonPositiveScale);
        }
        if !self.trip_limits.is_valid() {
            return Err(ConfigError::NonPositiveLimit);
        }
        let rates = [self.control_tier_hz, self.monitor_tier_hz];
        if rates.iter().any(|r| !r.is_finite() || *r <= 0.0) {
            return Err(ConfigError::ZeroTierRate);
        }
        if self.monitor_tier_hz > self.control_tier_hz {
            return Err(ConfigError::TierRateOrder);
        }
        let duties = [self.driving_duty, self.rectifier_duty];
        if duties.iter().any(|d| !(0.0..=1.0).contains(d)) {
            return Err(ConfigError::InvalidDuty);
        }
        let times = [
            self.deadband_rising_ns,
            self.deadband_falling_ns,
            self.sr_phase_compensation_ns,
        ];
        if times.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(ConfigError::InvalidTiming);
        }
        let slews = [self.slew.volts_per_second, self.slew.amps_per_second];
        if slews.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(ConfigError::InvalidSlewRate);
        }
        Ok(())
    }

    /// Coefficients for the configured mode, direction and load
    #[must_use]
    pub const fn active_coefficients(&self) -> CompensatorCoefficients {
        match (self.mode, self.direction, self.current_loop_setup) {
            (ControlMode::Voltage, PowerFlowDirection::PrimaryToSecondary, _) => {
                self.compensators.voltage_prim_to_sec
            }
            (ControlMode::Voltage, PowerFlowDirection::SecondaryToPrimary, _) => {
                self.compensators.voltage_sec_to_prim
            }
            (ControlMode::Current, _, CurrentLoopSetup::ResistiveLoad) => {
                self.compensators.current_resistive_load
            }
            (ControlMode::Current, _, CurrentLoopSetup::BatteryEmulation) => {
                self.compensators.current_battery_emulation
            }
        }
    }

    /// Initial `(primary, secondary)` duties for the configured direction
    #[must_use]
    pub const fn initial_duties(&self) -> (f32, f32) {
        match self.direction {
            PowerFlowDirection::PrimaryToSecondary => (self.driving_duty, self.rectifier_duty),
            PowerFlowDirection::SecondaryToPrimary => (self.rectifier_duty, self.driving_duty),
        }
    }

    /// Allowed per-unit period range `(min, max)` relative to nominal
    #[must_use]
    pub fn period_pu_range(&self) -> (f32, f32) {
        (
            self.nominal_switching_hz / self.max_switching_hz,
            self.nominal_switching_hz / self.min_switching_hz,
        )
    }

    /// Nominal voltage of the regulated bus, used as the default target
    #[must_use]
    pub const fn nominal_output_volts(&self) -> f32 {
        match self.direction.rectifying_bridge() {
            Bridge::Primary => NOMINAL_V_PRIMARY_VOLTS,
            Bridge::Secondary => NOMINAL_V_SECONDARY_VOLTS,
        }
    }
}

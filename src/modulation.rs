//! Modulation Calculator
//!
//! Converts per-unit and nanosecond control outputs into integer timer ticks
//! for the resonant bridges.
//!
//! All tick values are in timer sub-tick units: with a plain timer one unit
//! is one clock cycle, with high-resolution PWM the lower `sub_tick_bits`
//! carry the fractional part. Out-of-range inputs are clamped, never
//! wrapped; an unusable period is rejected and the previous command is kept.

/// Timer parameters needed to convert time into compare values
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerTiming {
    /// Timer input clock
    pub clock_hz: u32,
    /// Fractional bits below one clock cycle (0 for a plain timer)
    pub sub_tick_bits: u32,
    /// Duty and period values are truncated to a multiple of this (power of two)
    pub duty_alignment: u32,
    /// Dead-band values are truncated to a multiple of this (power of two)
    pub deadband_alignment: u32,
    /// Dead-band generator clock relative to the timer clock
    pub deadband_multiplier: u32,
    /// Up-down counting; the period register holds half a switching period
    pub up_down_count: bool,
}

impl TimerTiming {
    /// Plain up-counting timer, one tick per clock cycle
    #[must_use]
    pub const fn plain(clock_hz: u32) -> Self {
        Self {
            clock_hz,
            sub_tick_bits: 0,
            duty_alignment: 1,
            deadband_alignment: 1,
            deadband_multiplier: 1,
            up_down_count: false,
        }
    }

    /// High-resolution up-down PWM used on the reference power stage
    #[must_use]
    pub const fn high_resolution(clock_hz: u32) -> Self {
        Self {
            clock_hz,
            sub_tick_bits: 16,
            duty_alignment: 256,
            deadband_alignment: 512,
            deadband_multiplier: 2,
            up_down_count: true,
        }
    }

    /// Sub-ticks per clock cycle
    #[must_use]
    pub fn sub_ticks_per_cycle(&self) -> f64 {
        f64::from(1u32 << self.sub_tick_bits.min(24))
    }

    /// Whether every field can be used to compute ticks
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.clock_hz > 0
            && self.sub_tick_bits <= 24
            && self.duty_alignment.is_power_of_two()
            && self.deadband_alignment.is_power_of_two()
            && self.deadband_multiplier > 0
    }
}

impl Default for TimerTiming {
    fn default() -> Self {
        Self::high_resolution(crate::config::TIMER_CLOCK_HZ)
    }
}

/// Control outputs before conversion to ticks
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModulationSetpoint {
    /// Switching period relative to the nominal period
    pub period_pu: f32,
    /// Primary bridge duty, 0.0..=1.0
    pub duty_primary: f32,
    /// Secondary bridge duty, 0.0..=1.0
    pub duty_secondary: f32,
    /// Phase between the bridges
    pub phase_shift_ns: f32,
    /// Rising-edge dead time
    pub deadband_rising_ns: f32,
    /// Falling-edge dead time
    pub deadband_falling_ns: f32,
}

/// Timer compare values for one switching period
///
/// Immutable once published; consumed by the period-synchronous tier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModulationCommand {
    /// Period register value
    pub period_ticks: u32,
    /// Primary bridge compare A
    pub duty_primary_a: u32,
    /// Primary bridge compare B, `period - a`
    pub duty_primary_b: u32,
    /// Secondary bridge compare A
    pub duty_secondary_a: u32,
    /// Secondary bridge compare B, `period - a`
    pub duty_secondary_b: u32,
    /// Signed bridge-to-bridge phase
    pub phase_shift_ticks: i32,
    /// Rising-edge dead-band
    pub deadband_rising_ticks: u32,
    /// Falling-edge dead-band
    pub deadband_falling_ticks: u32,
}

#[cfg(feature = "embedded")]
impl defmt::Format for ModulationCommand {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "period={} prim={}/{} sec={}/{} phase={} db={}/{}",
            self.period_ticks,
            self.duty_primary_a,
            self.duty_primary_b,
            self.duty_secondary_a,
            self.duty_secondary_b,
            self.phase_shift_ticks,
            self.deadband_rising_ticks,
            self.deadband_falling_ticks
        );
    }
}

/// Reason a setpoint could not be converted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModulationError {
    /// Period or switching frequency is zero, negative or not finite
    InvalidPeriod,
    /// A duty, phase or dead-band value is not finite
    NonFiniteSetpoint,
}

impl core::fmt::Display for ModulationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidPeriod => write!(f, "switching period is not usable"),
            Self::NonFiniteSetpoint => write!(f, "modulation setpoint is not finite"),
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for ModulationError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::InvalidPeriod => defmt::write!(f, "InvalidPeriod"),
            Self::NonFiniteSetpoint => defmt::write!(f, "NonFiniteSetpoint"),
        }
    }
}

/// Per-unit to tick converter with range limits
#[derive(Clone, Copy, Debug)]
pub struct ModulationCalculator {
    timing: TimerTiming,
    nominal_hz: f32,
    min_period_ticks: u32,
    max_period_ticks: u32,
    last: ModulationCommand,
}

impl ModulationCalculator {
    /// Create a calculator for the switching range `min_hz..=max_hz`.
    ///
    /// The range is assumed validated by the caller (see
    /// [`ConverterConfig::validate`](crate::config::ConverterConfig::validate)).
    #[must_use]
    pub fn new(timing: TimerTiming, nominal_hz: f32, min_hz: f32, max_hz: f32) -> Self {
        let min_period_ticks = raw_period_ticks(&timing, max_hz);
        let max_period_ticks = raw_period_ticks(&timing, min_hz).max(min_period_ticks);
        Self {
            timing,
            nominal_hz,
            min_period_ticks,
            max_period_ticks,
            last: ModulationCommand::default(),
        }
    }

    /// Timer parameters in use
    #[must_use]
    pub const fn timing(&self) -> &TimerTiming {
        &self.timing
    }

    /// Shortest and longest allowed period register values
    #[must_use]
    pub const fn period_tick_limits(&self) -> (u32, u32) {
        (self.min_period_ticks, self.max_period_ticks)
    }

    /// Period register value for a switching frequency, clamped to range
    ///
    /// # Errors
    ///
    /// [`ModulationError::InvalidPeriod`] for zero, negative or non-finite
    /// frequencies.
    pub fn period_ticks_for_frequency(&self, switching_hz: f32) -> Result<u32, ModulationError> {
        if !switching_hz.is_finite() || switching_hz <= 0.0 {
            return Err(ModulationError::InvalidPeriod);
        }
        Ok(raw_period_ticks(&self.timing, switching_hz)
            .clamp(self.min_period_ticks, self.max_period_ticks))
    }

    /// Period register value for a per-unit period (1.0 = nominal)
    ///
    /// # Errors
    ///
    /// [`ModulationError::InvalidPeriod`] for zero, negative or non-finite
    /// input.
    pub fn period_ticks(&self, period_pu: f32) -> Result<u32, ModulationError> {
        if !period_pu.is_finite() || period_pu <= 0.0 {
            return Err(ModulationError::InvalidPeriod);
        }
        self.period_ticks_for_frequency(self.nominal_hz / period_pu)
    }

    /// Compare pair `(a, period - a)` for `duty` of `period_ticks`
    #[must_use]
    pub fn duty_ticks(&self, period_ticks: u32, duty: f32) -> (u32, u32) {
        let duty = f64::from(duty.clamp(0.0, 1.0));
        let a = round_ticks(f64::from(period_ticks) * duty).min(period_ticks);
        let a = align_down(a, self.timing.duty_alignment);
        (a, period_ticks - a)
    }

    /// Dead-band register value, limited to half the period
    #[must_use]
    pub fn deadband_ticks(&self, deadband_ns: f32, period_ticks: u32) -> u32 {
        let ns = f64::from(deadband_ns.max(0.0));
        let ticks = round_ticks(
            ns * 1e-9
                * f64::from(self.timing.clock_hz)
                * f64::from(self.timing.deadband_multiplier)
                * self.timing.sub_ticks_per_cycle(),
        );
        self.limit_deadband(ticks, period_ticks)
    }

    /// Clamp already-computed dead-band ticks to half of `period_ticks`
    #[must_use]
    pub const fn limit_deadband(&self, deadband_ticks: u32, period_ticks: u32) -> u32 {
        let ticks = if deadband_ticks < period_ticks / 2 {
            deadband_ticks
        } else {
            period_ticks / 2
        };
        align_down(ticks, self.timing.deadband_alignment)
    }

    /// Signed phase shift, limited to one period either way
    #[must_use]
    pub fn phase_shift_ticks(&self, phase_ns: f32, period_ticks: u32) -> i32 {
        let ticks = libm::round(
            f64::from(phase_ns)
                * 1e-9
                * f64::from(self.timing.clock_hz)
                * self.timing.sub_ticks_per_cycle(),
        );
        let limit = f64::from(period_ticks.min(i32::MAX as u32));
        ticks.clamp(-limit, limit) as i32
    }

    /// Convert a full setpoint without touching the stored command
    ///
    /// # Errors
    ///
    /// See [`ModulationError`].
    pub fn compute(&self, setpoint: &ModulationSetpoint) -> Result<ModulationCommand, ModulationError> {
        let period_ticks = self.period_ticks(setpoint.period_pu)?;
        let finite = [
            setpoint.duty_primary,
            setpoint.duty_secondary,
            setpoint.phase_shift_ns,
            setpoint.deadband_rising_ns,
            setpoint.deadband_falling_ns,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite {
            return Err(ModulationError::NonFiniteSetpoint);
        }

        let (duty_primary_a, duty_primary_b) = self.duty_ticks(period_ticks, setpoint.duty_primary);
        let (duty_secondary_a, duty_secondary_b) =
            self.duty_ticks(period_ticks, setpoint.duty_secondary);

        Ok(ModulationCommand {
            period_ticks,
            duty_primary_a,
            duty_primary_b,
            duty_secondary_a,
            duty_secondary_b,
            phase_shift_ticks: self.phase_shift_ticks(setpoint.phase_shift_ns, period_ticks),
            deadband_rising_ticks: self.deadband_ticks(setpoint.deadband_rising_ns, period_ticks),
            deadband_falling_ticks: self.deadband_ticks(setpoint.deadband_falling_ns, period_ticks),
        })
    }

    /// Convert `setpoint` and store the result.
    ///
    /// On error the previous command is kept and returned unchanged.
    pub fn update(&mut self, setpoint: &ModulationSetpoint) -> &ModulationCommand {
        match self.compute(setpoint) {
            Ok(cmd) => self.last = cmd,
            Err(e) => warn!("modulation setpoint rejected: {}", e),
        }
        &self.last
    }

    /// Most recently accepted command
    #[must_use]
    pub const fn last(&self) -> &ModulationCommand {
        &self.last
    }

    /// Compare value arming the period-synchronous interrupt `lead_ticks`
    /// clock cycles before the counter turns around.
    ///
    /// An up-down period register already holds half a switching period, so
    /// it is used as is. An up-counting period is halved.
    #[must_use]
    pub fn update_trigger_ticks(&self, period_ticks: u32, lead_ticks: u32) -> u32 {
        let cycles = period_ticks >> self.timing.sub_tick_bits.min(24);
        let turnaround = if self.timing.up_down_count {
            cycles
        } else {
            cycles / 2
        };
        turnaround.saturating_sub(lead_ticks)
    }
}

fn raw_period_ticks(timing: &TimerTiming, switching_hz: f32) -> u32 {
    let mut ticks =
        f64::from(timing.clock_hz) * timing.sub_ticks_per_cycle() / f64::from(switching_hz);
    if timing.up_down_count {
        ticks /= 2.0;
    }
    align_down(round_ticks(ticks), timing.duty_alignment)
}

fn round_ticks(value: f64) -> u32 {
    libm::round(value).clamp(0.0, f64::from(u32::MAX)) as u32
}

const fn align_down(value: u32, alignment: u32) -> u32 {
    if alignment <= 1 {
        value
    } else {
        value & !(alignment - 1)
    }
}

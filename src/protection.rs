//! Protection
//!
//! Trip latch shared by every tier, fault-line polling in fixed priority
//! order, software limit checks on filtered measurements, and the helper that
//! turns a limit into comparator DAC thresholds.
//!
//! The latch is a single `AtomicU8`. It leaves [`TripCause::None`] only
//! through a compare-and-set, so when two sources race the first one wins
//! and the later one is ignored. Clearing is also a compare-and-set against
//! the cause the operator acknowledged, so a trip latched in between is never
//! lost.

use core::sync::atomic::{AtomicU8, Ordering};

#[cfg(feature = "embedded")]
use micromath::F32Ext;

use crate::types::Measurements;

/// Why the power stage was shut down
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TripCause {
    /// Not tripped
    #[default]
    None = 0,
    /// Primary bridge current above limit
    PrimaryOvercurrent = 1,
    /// Secondary bridge current above limit
    SecondaryOvercurrent = 2,
    /// Primary resonant tank current above limit
    PrimaryTankOvercurrent = 3,
    /// Secondary bus voltage above limit
    SecondaryVoltage = 4,
    /// Gate driver reported a fault
    GateDriverFault = 5,
}

impl TripCause {
    /// Decode a latch value. Unknown values decode as a gate-driver fault so
    /// a corrupted latch never reads as healthy.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::None,
            1 => Self::PrimaryOvercurrent,
            2 => Self::SecondaryOvercurrent,
            3 => Self::PrimaryTankOvercurrent,
            4 => Self::SecondaryVoltage,
            _ => Self::GateDriverFault,
        }
    }

    /// Raw latch value
    #[must_use]
    pub const fn as_raw(self) -> u8 {
        self as u8
    }

    /// Anything other than [`TripCause::None`]
    #[must_use]
    pub const fn is_tripped(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Short label for logs and status output
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::PrimaryOvercurrent => "primary overcurrent",
            Self::SecondaryOvercurrent => "secondary overcurrent",
            Self::PrimaryTankOvercurrent => "primary tank overcurrent",
            Self::SecondaryVoltage => "secondary overvoltage",
            Self::GateDriverFault => "gate driver fault",
        }
    }
}

impl core::fmt::Display for TripCause {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for TripCause {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=str}", self.label());
    }
}

/// Snapshot of every fault source, hardware comparators and software checks
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FaultLines {
    /// Primary current comparator
    pub primary_overcurrent: bool,
    /// Secondary current comparator
    pub secondary_overcurrent: bool,
    /// Primary tank current comparator
    pub primary_tank_overcurrent: bool,
    /// Secondary voltage comparator
    pub secondary_voltage: bool,
    /// Gate driver fault input
    pub gate_driver_fault: bool,
}

impl FaultLines {
    /// No line asserted
    pub const CLEAR: Self = Self {
        primary_overcurrent: false,
        secondary_overcurrent: false,
        primary_tank_overcurrent: false,
        secondary_voltage: false,
        gate_driver_fault: false,
    };

    /// Highest-priority asserted line, if any
    #[must_use]
    pub const fn first_asserted(&self) -> Option<TripCause> {
        if self.primary_overcurrent {
            Some(TripCause::PrimaryOvercurrent)
        } else if self.secondary_overcurrent {
            Some(TripCause::SecondaryOvercurrent)
        } else if self.primary_tank_overcurrent {
            Some(TripCause::PrimaryTankOvercurrent)
        } else if self.secondary_voltage {
            Some(TripCause::SecondaryVoltage)
        } else if self.gate_driver_fault {
            Some(TripCause::GateDriverFault)
        } else {
            None
        }
    }

    /// Any line asserted
    #[must_use]
    pub const fn any(&self) -> bool {
        self.first_asserted().is_some()
    }

    /// Whether the line for `cause` is asserted
    #[must_use]
    pub const fn is_asserted(&self, cause: TripCause) -> bool {
        match cause {
            TripCause::None => false,
            TripCause::PrimaryOvercurrent => self.primary_overcurrent,
            TripCause::SecondaryOvercurrent => self.secondary_overcurrent,
            TripCause::PrimaryTankOvercurrent => self.primary_tank_overcurrent,
            TripCause::SecondaryVoltage => self.secondary_voltage,
            TripCause::GateDriverFault => self.gate_driver_fault,
        }
    }
}

impl core::ops::BitOr for FaultLines {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            primary_overcurrent: self.primary_overcurrent | rhs.primary_overcurrent,
            secondary_overcurrent: self.secondary_overcurrent | rhs.secondary_overcurrent,
            primary_tank_overcurrent: self.primary_tank_overcurrent | rhs.primary_tank_overcurrent,
            secondary_voltage: self.secondary_voltage | rhs.secondary_voltage,
            gate_driver_fault: self.gate_driver_fault | rhs.gate_driver_fault,
        }
    }
}

/// Latched trip state shared across tiers
#[derive(Debug, Default)]
pub struct TripLatch {
    state: AtomicU8,
}

impl TripLatch {
    /// Create an untripped latch
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(TripCause::None.as_raw()),
        }
    }

    /// Latch `cause` if nothing is latched yet.
    ///
    /// Returns `true` when this call latched. Setting [`TripCause::None`]
    /// is a no-op.
    pub fn set_trip(&self, cause: TripCause) -> bool {
        if !cause.is_tripped() {
            return false;
        }
        self.state
            .compare_exchange(
                TripCause::None.as_raw(),
                cause.as_raw(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Currently latched cause
    #[must_use]
    pub fn state(&self) -> TripCause {
        TripCause::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Whether any cause is latched
    #[must_use]
    pub fn is_tripped(&self) -> bool {
        self.state().is_tripped()
    }

    /// Latch the highest-priority asserted line.
    ///
    /// Returns the cause only when this poll performed the latch.
    pub fn poll_fault_sources(&self, lines: &FaultLines) -> Option<TripCause> {
        let cause = lines.first_asserted()?;
        if self.set_trip(cause) {
            error!("trip latched: {}", cause);
            Some(cause)
        } else {
            None
        }
    }

    /// Clear the latch if it still holds `expected`.
    ///
    /// Returns `true` when the latch went back to [`TripCause::None`].
    pub fn clear(&self, expected: TripCause) -> bool {
        if !expected.is_tripped() {
            return false;
        }
        let cleared = self
            .state
            .compare_exchange(
                expected.as_raw(),
                TripCause::None.as_raw(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if cleared {
            info!("trip cleared: {}", expected);
        }
        cleared
    }
}

/// Software trip limits applied to filtered measurements
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TripLimits {
    /// Primary bridge current magnitude
    pub i_primary_amps: f32,
    /// Secondary bridge current magnitude
    pub i_secondary_amps: f32,
    /// Primary tank current magnitude
    pub i_primary_tank_amps: f32,
    /// Secondary bus voltage
    pub v_secondary_volts: f32,
}

impl TripLimits {
    /// Lines asserted by `m`. Currents compare by magnitude.
    #[must_use]
    pub fn check(&self, m: &Measurements) -> FaultLines {
        FaultLines {
            primary_overcurrent: m.i_primary_amps.abs() > self.i_primary_amps,
            secondary_overcurrent: m.i_secondary_amps.abs() > self.i_secondary_amps,
            primary_tank_overcurrent: m.i_primary_tank_amps.abs() > self.i_primary_tank_amps,
            secondary_voltage: m.v_secondary_volts > self.v_secondary_volts,
            gate_driver_fault: false,
        }
    }

    /// Every limit strictly positive and finite
    #[must_use]
    pub fn is_valid(&self) -> bool {
        [
            self.i_primary_amps,
            self.i_secondary_amps,
            self.i_primary_tank_amps,
            self.v_secondary_volts,
        ]
        .iter()
        .all(|v| v.is_finite() && *v > 0.0)
    }
}

impl Default for TripLimits {
    fn default() -> Self {
        use crate::config::trip;
        Self {
            i_primary_amps: trip::I_PRIMARY_AMPS,
            i_secondary_amps: trip::I_SECONDARY_AMPS,
            i_primary_tank_amps: trip::I_PRIMARY_TANK_AMPS,
            v_secondary_volts: trip::V_SECONDARY_VOLTS,
        }
    }
}

/// 12-bit comparator DAC window around mid-scale
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComparatorThresholds {
    /// Trips when the sense signal rises above this code
    pub high: u16,
    /// Trips when the sense signal falls below this code
    pub low: u16,
}

impl ComparatorThresholds {
    /// Mid-scale code for a bipolar sense channel
    pub const MID_SCALE: u16 = 2048;

    /// Window `2048 ± limit * 2048 / max_sense`, saturated to the DAC range
    #[must_use]
    pub fn for_limit(limit: f32, max_sense: f32) -> Self {
        let span = if max_sense > 0.0 && limit.is_finite() {
            (limit.abs() * f32::from(Self::MID_SCALE) / max_sense).round()
        } else {
            0.0
        };
        let span = span.clamp(0.0, f32::from(Self::MID_SCALE)) as u16;
        Self {
            high: (Self::MID_SCALE + span).min(4095),
            low: Self::MID_SCALE - span,
        }
    }
}

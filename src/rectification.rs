//! Synchronous Rectification
//!
//! Edge-triggered arbitration between the SR mode the operator commands and
//! the mode the power stage is actually running. The state machine acts once
//! per change; repeated checks with an unchanged command do nothing.

use crate::hal::RectifierDriver;
use crate::types::Bridge;

/// Rectifier gating mode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SrMode {
    /// Rectifier switches at a fixed duty
    FixedDuty = 0,
    /// Rectifier gates follow the sensed current
    #[default]
    Active = 1,
    /// Any other command. Adopted and pins re-mapped, trip qualification
    /// left alone.
    Transitioning = 2,
}

impl SrMode {
    /// Decode a commanded value; unknown values become `Transitioning`
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::FixedDuty,
            1 => Self::Active,
            _ => Self::Transitioning,
        }
    }

    /// Raw command value
    #[must_use]
    pub const fn as_raw(self) -> u8 {
        self as u8
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for SrMode {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::FixedDuty => defmt::write!(f, "FixedDuty"),
            Self::Active => defmt::write!(f, "Active"),
            Self::Transitioning => defmt::write!(f, "Transitioning"),
        }
    }
}

/// What a detected change did
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SrTransition {
    /// Mode before the change
    pub from: SrMode,
    /// Mode after the change
    pub to: SrMode,
    /// Phase shift the caller must apply, if any
    pub phase_shift_ns: Option<f32>,
}

/// Commanded-vs-active SR mode tracker
#[derive(Clone, Copy, Debug)]
pub struct SrStateMachine {
    active: SrMode,
    bridge: Bridge,
    phase_compensation_ns: f32,
}

impl SrStateMachine {
    /// Start in active mode on `bridge`, matching the pin setup at power-up
    #[must_use]
    pub const fn new(bridge: Bridge, phase_compensation_ns: f32) -> Self {
        Self {
            active: SrMode::Active,
            bridge,
            phase_compensation_ns,
        }
    }

    /// Mode the stage is running
    #[must_use]
    pub const fn active(&self) -> SrMode {
        self.active
    }

    /// Bridge acting as rectifier
    #[must_use]
    pub const fn bridge(&self) -> Bridge {
        self.bridge
    }

    /// Apply `commanded` if it differs from the active mode.
    ///
    /// `Active` and `FixedDuty` reconfigure trip qualification on the SR
    /// bridge and request the phase compensation. Every change re-maps the
    /// PWM pins.
    pub fn check<D: RectifierDriver + ?Sized>(
        &mut self,
        commanded: SrMode,
        driver: &mut D,
    ) -> Option<SrTransition> {
        if commanded == self.active {
            return None;
        }

        let phase_shift_ns = match commanded {
            SrMode::Active | SrMode::FixedDuty => {
                driver.reconfigure_synchronous_rectification(commanded, self.bridge);
                Some(self.phase_compensation_ns)
            }
            SrMode::Transitioning => None,
        };

        let from = self.active;
        self.active = commanded;
        driver.remap_pwm_pins(commanded);
        info!("SR mode {} -> {} on {}", from, commanded, self.bridge);

        Some(SrTransition {
            from,
            to: commanded,
            phase_shift_ns,
        })
    }
}

//! Shared types used across the control core
//!
//! Domain enums that parameterize a control session. All of them are fixed
//! for the lifetime of one session; changing any of them means building a
//! new session.

/// Direction of power transfer through the resonant tank
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PowerFlowDirection {
    /// Primary bridge drives, secondary bridge rectifies
    #[default]
    PrimaryToSecondary,
    /// Secondary bridge drives, primary bridge rectifies
    SecondaryToPrimary,
}

impl PowerFlowDirection {
    /// Bridge that switches the resonant tank
    #[must_use]
    pub const fn driving_bridge(self) -> Bridge {
        match self {
            Self::PrimaryToSecondary => Bridge::Primary,
            Self::SecondaryToPrimary => Bridge::Secondary,
        }
    }

    /// Bridge acting as synchronous rectifier
    #[must_use]
    pub const fn rectifying_bridge(self) -> Bridge {
        match self {
            Self::PrimaryToSecondary => Bridge::Secondary,
            Self::SecondaryToPrimary => Bridge::Primary,
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for PowerFlowDirection {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::PrimaryToSecondary => defmt::write!(f, "PRIM->SEC"),
            Self::SecondaryToPrimary => defmt::write!(f, "SEC->PRIM"),
        }
    }
}

/// Regulated quantity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ControlMode {
    /// Regulate the output voltage of the receiving bridge
    #[default]
    Voltage,
    /// Regulate the secondary current
    Current,
}

#[cfg(feature = "embedded")]
impl defmt::Format for ControlMode {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Voltage => defmt::write!(f, "CV"),
            Self::Current => defmt::write!(f, "CC"),
        }
    }
}

/// One of the two full bridges around the tank
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bridge {
    /// High-voltage side
    Primary,
    /// Low-voltage / battery side
    Secondary,
}

#[cfg(feature = "embedded")]
impl defmt::Format for Bridge {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Primary => defmt::write!(f, "PRIM"),
            Self::Secondary => defmt::write!(f, "SEC"),
        }
    }
}

/// Where the period-synchronous update tier executes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ExecutionCore {
    /// Main CPU interrupt
    #[default]
    Main,
    /// Control-law offload accelerator
    Accelerator,
}

impl ExecutionCore {
    /// Timer ticks between the update interrupt and the period boundary.
    ///
    /// Fixed hardware latency compensation, not a tuning knob.
    #[must_use]
    pub const fn update_lead_ticks(self) -> u32 {
        match self {
            Self::Main => 27,
            Self::Accelerator => 20,
        }
    }
}

/// Load the secondary is connected to; selects the current-loop tuning
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CurrentLoopSetup {
    /// Resistive load bank
    #[default]
    ResistiveLoad,
    /// Source/sink emulating a battery
    BatteryEmulation,
}

/// Whether the compensator drives the modulation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LoopState {
    /// Period follows the open-loop frequency reference
    #[default]
    Open,
    /// Period follows the compensator output
    Closed,
}

#[cfg(feature = "embedded")]
impl defmt::Format for LoopState {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Open => defmt::write!(f, "OPEN"),
            Self::Closed => defmt::write!(f, "CLOSED"),
        }
    }
}

/// Filtered physical measurements published by the monitor tier
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Measurements {
    /// Primary bus voltage
    pub v_primary_volts: f32,
    /// Secondary bus voltage
    pub v_secondary_volts: f32,
    /// Primary bridge current
    pub i_primary_amps: f32,
    /// Primary resonant tank current
    pub i_primary_tank_amps: f32,
    /// Secondary bridge current
    pub i_secondary_amps: f32,
}

#[cfg(feature = "embedded")]
impl defmt::Format for Measurements {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "Vp={}V Vs={}V Ip={}A Itank={}A Is={}A",
            self.v_primary_volts,
            self.v_secondary_volts,
            self.i_primary_amps,
            self.i_primary_tank_amps,
            self.i_secondary_amps
        );
    }
}

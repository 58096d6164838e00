//! Hardware Abstraction Layer
//!
//! The control core never touches registers. Each tier reaches the power
//! stage through one of the traits below; a board support crate implements
//! them over its PWM, ADC and comparator peripherals.
//!
//! | Trait | Used by | Purpose |
//! |-------|---------|---------|
//! | [`ModulationOutput`] | update tier | compare registers, interrupt re-arm |
//! | [`RectifierDriver`] | control tier | SR trip qualification, pin mapping |
//! | [`SensorFrontEnd`] | monitor tier | ADC results, comparator status |
//! | [`SafeOutput`] | monitor tier | force / release the outputs |

use crate::modulation::ModulationCommand;
use crate::protection::FaultLines;
use crate::rectification::SrMode;
use crate::types::Bridge;

/// Latest ADC results, per-unit of full scale (0.0..=1.0)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RawSamples {
    /// Primary bridge current
    pub i_primary: f32,
    /// Primary resonant tank current
    pub i_primary_tank: f32,
    /// Secondary bridge current
    pub i_secondary: f32,
    /// Primary bus voltage
    pub v_primary: f32,
    /// Secondary bus voltage
    pub v_secondary: f32,
}

/// Sensing chain
pub trait SensorFrontEnd {
    /// Most recent conversion of every channel
    fn read_raw_samples(&mut self) -> RawSamples;

    /// Comparator and gate-driver fault status
    fn read_fault_lines(&mut self) -> FaultLines;
}

/// PWM compare registers
pub trait ModulationOutput {
    /// Load one period's worth of compare values
    fn write_modulation(&mut self, command: &ModulationCommand);

    /// Move the update-tier interrupt to `ticks` into the period
    fn set_update_trigger(&mut self, ticks: u32);
}

/// Synchronous rectifier gating
pub trait RectifierDriver {
    /// Reconfigure trip qualification on `bridge` for `mode`
    fn reconfigure_synchronous_rectification(&mut self, mode: SrMode, bridge: Bridge);

    /// Route the rectifier PWM outputs for `mode`
    fn remap_pwm_pins(&mut self, mode: SrMode);
}

/// Output shutdown
pub trait SafeOutput {
    /// Force every gate low
    fn force_safe_output(&mut self);

    /// Release the forced state after a trip clear
    fn clear_safe_output(&mut self);
}

/// A single board object implementing every interface
pub trait PowerStageHal: SensorFrontEnd + ModulationOutput + RectifierDriver + SafeOutput {}

impl<T> PowerStageHal for T where T: SensorFrontEnd + ModulationOutput + RectifierDriver + SafeOutput {}

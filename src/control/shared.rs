//! State shared between tiers
//!
//! Every field is an atomic so any tier, at any priority, may read or write
//! it without a lock. Floats travel as their bit pattern in an `AtomicU32`.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use super::mailbox::CommandMailbox;
use crate::protection::{TripCause, TripLatch};
use crate::rectification::SrMode;
use crate::types::{LoopState, Measurements};

/// `f32` stored as bits in an `AtomicU32`
#[derive(Debug, Default)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    /// Holds `0.0`
    #[must_use]
    pub const fn zero() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Create with an initial value
    #[must_use]
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    /// Load the value
    #[must_use]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Store a value
    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Operator requests and setpoints
#[derive(Debug)]
pub struct OperatorInputs {
    /// Commanded SR mode (raw)
    pub sr_command: AtomicU8,
    /// Cause the operator acknowledged for clearing (raw, 0 = no request)
    pub trip_clear_request: AtomicU8,
    /// Close-loop request, consumed by the control tier
    pub close_loop_request: AtomicBool,
    /// Voltage target of the regulated bus
    pub voltage_reference_volts: AtomicF32,
    /// Secondary current target
    pub current_reference_amps: AtomicF32,
    /// Switching frequency used while the loop is open
    pub open_loop_hz: AtomicF32,
    /// Bridge-to-bridge phase
    pub phase_shift_ns: AtomicF32,
    /// Rising-edge dead time
    pub deadband_rising_ns: AtomicF32,
    /// Falling-edge dead time
    pub deadband_falling_ns: AtomicF32,
}

/// Values produced by the monitor tier for the control tier
#[derive(Debug)]
pub struct LoopSignals {
    /// Slew-limited reference of the regulated quantity (pu)
    pub reference_pu: AtomicF32,
    /// Averaged feedback of the regulated quantity (pu)
    pub feedback_pu: AtomicF32,
    /// Dead-band ticks derived from the operator setpoints
    pub deadband_rising_ticks: AtomicU32,
    /// Dead-band ticks derived from the operator setpoints
    pub deadband_falling_ticks: AtomicU32,
}

/// Filtered measurements in physical units
#[derive(Debug)]
pub struct PublishedMeasurements {
    v_primary_volts: AtomicF32,
    v_secondary_volts: AtomicF32,
    i_primary_amps: AtomicF32,
    i_primary_tank_amps: AtomicF32,
    i_secondary_amps: AtomicF32,
}

impl PublishedMeasurements {
    const fn new() -> Self {
        Self {
            v_primary_volts: AtomicF32::zero(),
            v_secondary_volts: AtomicF32::zero(),
            i_primary_amps: AtomicF32::zero(),
            i_primary_tank_amps: AtomicF32::zero(),
            i_secondary_amps: AtomicF32::zero(),
        }
    }

    /// Publish a new set. Fields are individually atomic; a reader may see a
    /// mix of two consecutive sets, which is fine for status use.
    pub fn store(&self, m: &Measurements) {
        self.v_primary_volts.store(m.v_primary_volts);
        self.v_secondary_volts.store(m.v_secondary_volts);
        self.i_primary_amps.store(m.i_primary_amps);
        self.i_primary_tank_amps.store(m.i_primary_tank_amps);
        self.i_secondary_amps.store(m.i_secondary_amps);
    }

    /// Latest published set
    #[must_use]
    pub fn load(&self) -> Measurements {
        Measurements {
            v_primary_volts: self.v_primary_volts.load(),
            v_secondary_volts: self.v_secondary_volts.load(),
            i_primary_amps: self.i_primary_amps.load(),
            i_primary_tank_amps: self.i_primary_tank_amps.load(),
            i_secondary_amps: self.i_secondary_amps.load(),
        }
    }
}

/// Everything the tiers and the operator exchange
///
/// `const`-constructible so it can live in a `static` on target.
#[derive(Debug)]
pub struct SessionShared {
    /// Latest complete modulation command
    pub mailbox: CommandMailbox,
    /// Trip latch
    pub trip: TripLatch,
    /// Operator side
    pub inputs: OperatorInputs,
    /// Monitor tier to control tier
    pub signals: LoopSignals,
    /// Filtered measurements
    pub measurements: PublishedMeasurements,
    /// SR mode the stage is running (raw)
    pub sr_active: AtomicU8,
    /// Set while the compensator drives the period
    pub loop_closed: AtomicBool,
}

impl SessionShared {
    /// Everything zeroed, loop open, SR active
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mailbox: CommandMailbox::new(),
            trip: TripLatch::new(),
            inputs: OperatorInputs {
                sr_command: AtomicU8::new(SrMode::Active.as_raw()),
                trip_clear_request: AtomicU8::new(TripCause::None.as_raw()),
                close_loop_request: AtomicBool::new(false),
                voltage_reference_volts: AtomicF32::zero(),
                current_reference_amps: AtomicF32::zero(),
                open_loop_hz: AtomicF32::zero(),
                phase_shift_ns: AtomicF32::zero(),
                deadband_rising_ns: AtomicF32::zero(),
                deadband_falling_ns: AtomicF32::zero(),
            },
            signals: LoopSignals {
                reference_pu: AtomicF32::zero(),
                feedback_pu: AtomicF32::zero(),
                deadband_rising_ticks: AtomicU32::new(0),
                deadband_falling_ticks: AtomicU32::new(0),
            },
            measurements: PublishedMeasurements::new(),
            sr_active: AtomicU8::new(SrMode::Active.as_raw()),
            loop_closed: AtomicBool::new(false),
        }
    }

    /// Current loop state
    #[must_use]
    pub fn loop_state(&self) -> LoopState {
        if self.loop_closed.load(Ordering::Acquire) {
            LoopState::Closed
        } else {
            LoopState::Open
        }
    }

    /// SR mode the stage is running
    #[must_use]
    pub fn sr_active(&self) -> SrMode {
        SrMode::from_raw(self.sr_active.load(Ordering::Acquire))
    }
}

impl Default for SessionShared {
    fn default() -> Self {
        Self::new()
    }
}

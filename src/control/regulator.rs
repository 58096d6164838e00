//! Control tier
//!
//! Runs at the control rate. Checks the SR command, runs the compensator of
//! the configured loop (or follows the open-loop frequency), converts the
//! result into timer ticks and publishes it for the update tier.

use core::sync::atomic::Ordering;

use super::shared::SessionShared;
use crate::config::ConverterConfig;
use crate::dsp::Compensator;
use crate::hal::RectifierDriver;
use crate::modulation::{ModulationCalculator, ModulationCommand, ModulationSetpoint};
use crate::rectification::{SrMode, SrStateMachine};
use crate::types::{ControlMode, LoopState};

/// Compensator, SR state and modulation for one session
#[derive(Debug)]
pub struct ControlTier<'a> {
    shared: &'a SessionShared,
    mode: ControlMode,
    compensator: Compensator,
    calculator: ModulationCalculator,
    sr: SrStateMachine,
    loop_state: LoopState,
    reset_pending: bool,
    nominal_hz: f32,
    period_pu_limits: (f32, f32),
    duties: (f32, f32),
}

impl<'a> ControlTier<'a> {
    /// Build the tier for `config`
    #[must_use]
    pub fn new(shared: &'a SessionShared, config: &ConverterConfig) -> Self {
        Self {
            shared,
            mode: config.mode,
            compensator: Compensator::new(config.active_coefficients()),
            calculator: super::calculator_for(config),
            sr: SrStateMachine::new(
                config.direction.rectifying_bridge(),
                config.sr_phase_compensation_ns,
            ),
            loop_state: LoopState::Open,
            reset_pending: false,
            nominal_hz: config.nominal_switching_hz,
            period_pu_limits: config.period_pu_range(),
            duties: config.initial_duties(),
        }
    }

    /// Open or closed
    #[must_use]
    pub const fn loop_state(&self) -> LoopState {
        self.loop_state
    }

    /// Regulated quantity
    #[must_use]
    pub const fn mode(&self) -> ControlMode {
        self.mode
    }

    /// Loop compensator
    #[must_use]
    pub const fn compensator(&self) -> &Compensator {
        &self.compensator
    }

    /// SR arbitration state
    #[must_use]
    pub const fn synchronous_rectification(&self) -> &SrStateMachine {
        &self.sr
    }

    /// One control period.
    ///
    /// Returns the published command, or `None` when tripped or when the
    /// setpoint was rejected and the previous command stays in force.
    pub fn run<H: RectifierDriver + ?Sized>(&mut self, hal: &mut H) -> Option<ModulationCommand> {
        self.check_synchronous_rectification(hal);

        if self.shared.trip.is_tripped() {
            self.reset_pending = true;
            return None;
        }
        if self.reset_pending {
            self.compensator.reset();
            self.reset_pending = false;
        }
        self.update_loop_state();

        let period_pu = match self.loop_state {
            LoopState::Closed => self.run_compensator(),
            LoopState::Open => self.nominal_hz / self.shared.inputs.open_loop_hz.load(),
        };

        let inputs = &self.shared.inputs;
        let setpoint = ModulationSetpoint {
            period_pu,
            duty_primary: self.duties.0,
            duty_secondary: self.duties.1,
            phase_shift_ns: inputs.phase_shift_ns.load(),
            deadband_rising_ns: 0.0,
            deadband_falling_ns: 0.0,
        };

        match self.calculator.compute(&setpoint) {
            Ok(mut command) => {
                let signals = &self.shared.signals;
                command.deadband_rising_ticks = self.calculator.limit_deadband(
                    signals.deadband_rising_ticks.load(Ordering::Relaxed),
                    command.period_ticks,
                );
                command.deadband_falling_ticks = self.calculator.limit_deadband(
                    signals.deadband_falling_ticks.load(Ordering::Relaxed),
                    command.period_ticks,
                );
                self.shared.mailbox.publish(&command);
                Some(command)
            }
            Err(e) => {
                warn!("control setpoint rejected, holding previous command: {}", e);
                None
            }
        }
    }

    fn check_synchronous_rectification<H: RectifierDriver + ?Sized>(&mut self, hal: &mut H) {
        let commanded = SrMode::from_raw(self.shared.inputs.sr_command.load(Ordering::Acquire));
        if let Some(transition) = self.sr.check(commanded, hal) {
            if let Some(ns) = transition.phase_shift_ns {
                self.shared.inputs.phase_shift_ns.store(ns);
            }
            self.shared
                .sr_active
                .store(transition.to.as_raw(), Ordering::Release);
        }
    }

    fn update_loop_state(&mut self) {
        let requested = self
            .shared
            .inputs
            .close_loop_request
            .swap(false, Ordering::AcqRel);
        if requested && self.loop_state == LoopState::Open {
            self.compensator.reset();
            self.loop_state = LoopState::Closed;
            self.shared.loop_closed.store(true, Ordering::Release);
            info!("loop closed ({})", self.mode);
        }
    }

    fn run_compensator(&mut self) -> f32 {
        let signals = &self.shared.signals;
        let error = signals.reference_pu.load() - signals.feedback_pu.load();
        let (min, max) = self.period_pu_limits;
        self.compensator.step(f64::from(error));
        self.compensator.saturate(f64::from(min), f64::from(max)) as f32
    }
}

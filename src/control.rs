//! Control Loop Orchestrator
//!
//! A session is split into three tiers and an operator handle:
//!
//! ```text
//!  priority   tier                rate              owns
//!  ────────   ─────────────────   ───────────────   ──────────────────────────
//!  highest    UpdateTier          once per period   nothing (reads mailbox)
//!             ControlTier         control rate      compensator, SR state
//!             MonitorTier         ~10 kHz           filters, slew, safe flag
//!  lowest     OperatorHandle      background        nothing (writes inputs)
//! ```
//!
//! Tier-private state lives in the tier structs, so a tier can only be
//! mutated from the context that runs it. Everything exchanged between tiers
//! sits in [`SessionShared`] as atomics; the modulation command travels
//! through a double-buffered [`CommandMailbox`].

pub mod mailbox;
pub mod monitor;
pub mod operator;
pub mod regulator;
pub mod shared;
pub mod update;

pub use mailbox::CommandMailbox;
pub use monitor::MonitorTier;
pub use operator::{InputError, OperatorHandle};
pub use regulator::ControlTier;
pub use shared::{AtomicF32, SessionShared};
pub use update::UpdateTier;

use core::sync::atomic::Ordering;

use crate::config::{ConfigError, ConverterConfig};
use crate::modulation::{ModulationCalculator, ModulationSetpoint};

pub(crate) fn calculator_for(config: &ConverterConfig) -> ModulationCalculator {
    ModulationCalculator::new(
        config.timing,
        config.nominal_switching_hz,
        config.min_switching_hz,
        config.max_switching_hz,
    )
}

/// Validate `config` and load its starting values into `shared`.
///
/// Seeds the operator inputs (open-loop frequency at nominal, dead times,
/// nominal output voltage) and publishes the first command so the update
/// tier has something valid to write. Use this directly when `shared` is a
/// `static`; [`ControlSession::new`] calls it for owned sessions.
///
/// # Errors
///
/// Returns the [`ConfigError`] from [`ConverterConfig::validate`]; `shared`
/// is left untouched.
pub fn prime(shared: &SessionShared, config: &ConverterConfig) -> Result<(), ConfigError> {
    config.validate()?;

    let inputs = &shared.inputs;
    inputs.open_loop_hz.store(config.nominal_switching_hz);
    inputs.deadband_rising_ns.store(config.deadband_rising_ns);
    inputs.deadband_falling_ns.store(config.deadband_falling_ns);
    inputs.voltage_reference_volts.store(config.nominal_output_volts());
    inputs.phase_shift_ns.store(0.0);

    let calculator = calculator_for(config);
    let (duty_primary, duty_secondary) = config.initial_duties();
    let setpoint = ModulationSetpoint {
        period_pu: 1.0,
        duty_primary,
        duty_secondary,
        phase_shift_ns: 0.0,
        deadband_rising_ns: config.deadband_rising_ns,
        deadband_falling_ns: config.deadband_falling_ns,
    };
    // Nominal period is inside the validated range, so this cannot fail.
    if let Ok(command) = calculator.compute(&setpoint) {
        shared
            .signals
            .deadband_rising_ticks
            .store(command.deadband_rising_ticks, Ordering::Relaxed);
        shared
            .signals
            .deadband_falling_ticks
            .store(command.deadband_falling_ticks, Ordering::Relaxed);
        shared.mailbox.publish(&command);
    }

    info!(
        "session primed: {} {} {}",
        config.direction,
        config.mode,
        config.nominal_switching_hz
    );
    Ok(())
}

/// Tiers and operator handle of one session
#[derive(Debug)]
pub struct SessionParts<'a> {
    /// Period-synchronous register writer
    pub update: UpdateTier<'a>,
    /// Compensator and modulation
    pub control: ControlTier<'a>,
    /// Sensing and protection
    pub monitor: MonitorTier<'a>,
    /// Application-side handle
    pub operator: OperatorHandle<'a>,
}

/// Owned control session
///
/// Direction, mode and every other configuration value are fixed for the
/// lifetime of the session.
#[derive(Debug)]
pub struct ControlSession {
    config: ConverterConfig,
    shared: SessionShared,
}

impl ControlSession {
    /// Validate `config` and build a session.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an invalid configuration; no modulation
    /// is ever produced from it.
    pub fn new(config: ConverterConfig) -> Result<Self, ConfigError> {
        let shared = SessionShared::new();
        if let Err(e) = prime(&shared, &config) {
            error!("configuration rejected: {}", e);
            return Err(e);
        }
        Ok(Self { config, shared })
    }

    /// Split into tiers. Each tier must run in exactly one context.
    #[must_use]
    pub fn split(&self) -> SessionParts<'_> {
        SessionParts {
            update: UpdateTier::new(&self.shared, &self.config),
            control: ControlTier::new(&self.shared, &self.config),
            monitor: MonitorTier::new(&self.shared, &self.config),
            operator: self.operator(),
        }
    }

    /// Additional operator handle
    #[must_use]
    pub const fn operator(&self) -> OperatorHandle<'_> {
        OperatorHandle::new(&self.shared)
    }

    /// Session configuration
    #[must_use]
    pub const fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Shared state
    #[must_use]
    pub const fn shared(&self) -> &SessionShared {
        &self.shared
    }
}

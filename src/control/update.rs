//! Update tier
//!
//! Runs once per PWM period, just before the period boundary. Copies the
//! latest complete command into the compare registers and re-arms itself.
//! Writes nothing while a trip is latched.

use super::shared::SessionShared;
use crate::config::ConverterConfig;
use crate::hal::ModulationOutput;
use crate::modulation::ModulationCalculator;

/// Period-synchronous register writer
#[derive(Debug)]
pub struct UpdateTier<'a> {
    shared: &'a SessionShared,
    calculator: ModulationCalculator,
    lead_ticks: u32,
}

impl<'a> UpdateTier<'a> {
    /// Build the tier for `config`
    #[must_use]
    pub fn new(shared: &'a SessionShared, config: &ConverterConfig) -> Self {
        Self {
            shared,
            calculator: super::calculator_for(config),
            lead_ticks: config.core.update_lead_ticks(),
        }
    }

    /// Clock cycles between the interrupt and the counter turnaround
    #[must_use]
    pub const fn lead_ticks(&self) -> u32 {
        self.lead_ticks
    }

    /// One period's work. Returns `true` when registers were written.
    pub fn run<H: ModulationOutput + ?Sized>(&mut self, hal: &mut H) -> bool {
        if self.shared.trip.is_tripped() {
            return false;
        }
        let command = self.shared.mailbox.latest();
        hal.write_modulation(&command);
        hal.set_update_trigger(
            self.calculator
                .update_trigger_ticks(command.period_ticks, self.lead_ticks),
        );
        true
    }
}

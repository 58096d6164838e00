//! Double-buffered command hand-off
//!
//! The control tier publishes into the slot the update tier is not reading,
//! then bumps a generation counter. The update tier reads the slot the
//! counter points at and retries if the counter moved while it was reading,
//! so it only ever sees a command from a completed publish.

use core::sync::atomic::{fence, AtomicI32, AtomicU32, Ordering};

use crate::modulation::ModulationCommand;

#[derive(Debug)]
struct Slot {
    period_ticks: AtomicU32,
    duty_primary_a: AtomicU32,
    duty_primary_b: AtomicU32,
    duty_secondary_a: AtomicU32,
    duty_secondary_b: AtomicU32,
    phase_shift_ticks: AtomicI32,
    deadband_rising_ticks: AtomicU32,
    deadband_falling_ticks: AtomicU32,
}

impl Slot {
    const fn new() -> Self {
        Self {
            period_ticks: AtomicU32::new(0),
            duty_primary_a: AtomicU32::new(0),
            duty_primary_b: AtomicU32::new(0),
            duty_secondary_a: AtomicU32::new(0),
            duty_secondary_b: AtomicU32::new(0),
            phase_shift_ticks: AtomicI32::new(0),
            deadband_rising_ticks: AtomicU32::new(0),
            deadband_falling_ticks: AtomicU32::new(0),
        }
    }

    fn store(&self, c: &ModulationCommand) {
        self.period_ticks.store(c.period_ticks, Ordering::Relaxed);
        self.duty_primary_a.store(c.duty_primary_a, Ordering::Relaxed);
        self.duty_primary_b.store(c.duty_primary_b, Ordering::Relaxed);
        self.duty_secondary_a.store(c.duty_secondary_a, Ordering::Relaxed);
        self.duty_secondary_b.store(c.duty_secondary_b, Ordering::Relaxed);
        self.phase_shift_ticks.store(c.phase_shift_ticks, Ordering::Relaxed);
        self.deadband_rising_ticks
            .store(c.deadband_rising_ticks, Ordering::Relaxed);
        self.deadband_falling_ticks
            .store(c.deadband_falling_ticks, Ordering::Relaxed);
    }

    fn load(&self) -> ModulationCommand {
        ModulationCommand {
            period_ticks: self.period_ticks.load(Ordering::Relaxed),
            duty_primary_a: self.duty_primary_a.load(Ordering::Relaxed),
            duty_primary_b: self.duty_primary_b.load(Ordering::Relaxed),
            duty_secondary_a: self.duty_secondary_a.load(Ordering::Relaxed),
            duty_secondary_b: self.duty_secondary_b.load(Ordering::Relaxed),
            phase_shift_ticks: self.phase_shift_ticks.load(Ordering::Relaxed),
            deadband_rising_ticks: self.deadband_rising_ticks.load(Ordering::Relaxed),
            deadband_falling_ticks: self.deadband_falling_ticks.load(Ordering::Relaxed),
        }
    }
}

/// Single-writer, single-reader command mailbox
#[derive(Debug)]
pub struct CommandMailbox {
    slots: [Slot; 2],
    generation: AtomicU32,
}

impl CommandMailbox {
    /// Empty mailbox; reads return an all-zero command until the first publish
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [Slot::new(), Slot::new()],
            generation: AtomicU32::new(0),
        }
    }

    /// Publish a complete command. Only one context may publish.
    pub fn publish(&self, command: &ModulationCommand) {
        let next = self.generation.load(Ordering::Relaxed).wrapping_add(1);
        fence(Ordering::Release);
        self.slots[(next & 1) as usize].store(command);
        self.generation.store(next, Ordering::Release);
    }

    /// Latest completely published command
    #[must_use]
    pub fn latest(&self) -> ModulationCommand {
        loop {
            let before = self.generation.load(Ordering::Acquire);
            let command = self.slots[(before & 1) as usize].load();
            fence(Ordering::Acquire);
            if self.generation.load(Ordering::Relaxed) == before {
                return command;
            }
        }
    }

    /// Number of publishes so far (wrapping)
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }
}

impl Default for CommandMailbox {
    fn default() -> Self {
        Self::new()
    }
}

//! Background supervisor
//!
//! Lowest-priority housekeeping. Each tick runs one task, alternating the
//! A task with one of the B tasks in rotation:
//!
//! ```text
//! A → B1 → A → B2 → A → B3 → A → B1 → …
//! ```
//!
//! - **A**: watch the trip latch and record every new trip
//! - **B1**: report measurements
//! - **B2**: report loop and SR state
//! - **B3**: heartbeat

use heapless::HistoryBuffer;

use crate::control::OperatorHandle;
use crate::protection::TripCause;

/// Trips kept in the history
pub const TRIP_HISTORY_LEN: usize = 8;

/// Background task slots
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackgroundTask {
    /// Trip watch, every other tick
    A,
    /// Measurement report
    B1,
    /// Loop status report
    B2,
    /// Heartbeat
    B3,
}

impl BackgroundTask {
    const fn next_b(self) -> Self {
        match self {
            Self::B1 => Self::B2,
            Self::B2 => Self::B3,
            Self::A | Self::B3 => Self::B1,
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for BackgroundTask {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::A => defmt::write!(f, "A"),
            Self::B1 => defmt::write!(f, "B1"),
            Self::B2 => defmt::write!(f, "B2"),
            Self::B3 => defmt::write!(f, "B3"),
        }
    }
}

/// One entry of the trip history
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TripRecord {
    /// What tripped
    pub cause: TripCause,
    /// Supervisor tick at which the trip was first seen
    pub tick: u32,
}

/// Background task state machine
pub struct Supervisor {
    next: BackgroundTask,
    pending_b: BackgroundTask,
    tick: u32,
    last_trip: TripCause,
    history: HistoryBuffer<TripRecord, TRIP_HISTORY_LEN>,
    trip_count: u32,
    heartbeat: bool,
}

impl Supervisor {
    /// Start with the A task
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: BackgroundTask::A,
            pending_b: BackgroundTask::B1,
            tick: 0,
            last_trip: TripCause::None,
            history: HistoryBuffer::new(),
            trip_count: 0,
            heartbeat: false,
        }
    }

    /// Run the next task and return which one ran
    pub fn tick(&mut self, operator: &OperatorHandle<'_>) -> BackgroundTask {
        let task = self.next;
        match task {
            BackgroundTask::A => {
                self.watch_trip(operator);
                self.next = self.pending_b;
            }
            BackgroundTask::B1 => {
                let m = operator.measurements();
                debug!("measurements: {}", m);
            }
            BackgroundTask::B2 => {
                debug!(
                    "loop {} sr {} trip {}",
                    operator.loop_state(),
                    operator.sr_mode(),
                    operator.trip_state()
                );
            }
            BackgroundTask::B3 => {
                self.heartbeat = !self.heartbeat;
                trace!("heartbeat {}", self.heartbeat);
            }
        }
        if task != BackgroundTask::A {
            self.pending_b = task.next_b();
            self.next = BackgroundTask::A;
        }
        self.tick = self.tick.wrapping_add(1);
        task
    }

    fn watch_trip(&mut self, operator: &OperatorHandle<'_>) {
        let state = operator.trip_state();
        if state == self.last_trip {
            return;
        }
        if state.is_tripped() {
            self.history.write(TripRecord {
                cause: state,
                tick: self.tick,
            });
            self.trip_count = self.trip_count.saturating_add(1);
            warn!("supervisor saw trip: {}", state);
        } else {
            info!("supervisor saw trip clear");
        }
        self.last_trip = state;
    }

    /// Recorded trips, oldest first
    pub fn trip_history(&self) -> impl Iterator<Item = &TripRecord> {
        self.history.oldest_ordered()
    }

    /// Most recent recorded trip
    #[must_use]
    pub fn last_recorded_trip(&self) -> Option<&TripRecord> {
        self.history.recent()
    }

    /// Trips seen since start, including ones dropped from the history
    #[must_use]
    pub const fn trip_count(&self) -> u32 {
        self.trip_count
    }

    /// Heartbeat output, toggled by B3
    #[must_use]
    pub const fn heartbeat(&self) -> bool {
        self.heartbeat
    }

    /// Task that will run on the next tick
    #[must_use]
    pub const fn next_task(&self) -> BackgroundTask {
        self.next
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Drive `supervisor` from a periodic ticker forever
#[cfg(feature = "embedded")]
pub async fn run_background(supervisor: &mut Supervisor, operator: OperatorHandle<'_>) -> ! {
    use embassy_time::{Duration, Ticker};

    let mut ticker = Ticker::every(Duration::from_millis(crate::config::BACKGROUND_TICK_MS));
    loop {
        supervisor.tick(&operator);
        ticker.next().await;
    }
}

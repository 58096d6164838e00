//! Reference slew limiter
//!
//! Bounds how fast a reference may move per control tick so a setpoint change
//! turns into a ramp. References start at zero, which doubles as soft start.

/// Move `current` toward `target` by at most `max_rate * dt`.
///
/// When the remaining gap is within one step the result snaps exactly to
/// `target`, so the limiter never dithers around the setpoint. The sign of
/// `max_rate` is ignored.
#[must_use]
pub fn step(current: f32, target: f32, max_rate: f32, dt: f32) -> f32 {
    limit(current, target, max_rate * dt)
}

fn limit(current: f32, target: f32, max_delta: f32) -> f32 {
    let max_delta = max_delta.abs();
    let delta = target - current;
    if delta.abs() <= max_delta {
        target
    } else if delta > 0.0 {
        current + max_delta
    } else {
        current - max_delta
    }
}

/// Slew limiter evaluated at a fixed tick rate
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlewLimiter {
    current: f32,
    max_delta: f32,
}

impl SlewLimiter {
    /// Create a limiter allowing `max_rate_per_second` units/s when stepped
    /// at `tick_hz`. A zero tick rate yields a limiter that never moves.
    #[must_use]
    pub fn new(max_rate_per_second: f32, tick_hz: f32) -> Self {
        let max_delta = if tick_hz > 0.0 {
            (max_rate_per_second / tick_hz).abs()
        } else {
            0.0
        };
        Self::per_tick(max_delta)
    }

    /// Create a limiter with the per-tick delta given directly
    #[must_use]
    pub const fn per_tick(max_delta: f32) -> Self {
        Self {
            current: 0.0,
            max_delta,
        }
    }

    /// Advance one tick toward `target`
    pub fn step_toward(&mut self, target: f32) -> f32 {
        self.current = limit(self.current, target, self.max_delta);
        self.current
    }

    /// Jump to `value` without slewing
    pub fn set_current(&mut self, value: f32) {
        self.current = value;
    }

    /// Current limited value
    #[must_use]
    pub const fn current(&self) -> f32 {
        self.current
    }

    /// Largest change allowed per tick
    #[must_use]
    pub const fn max_delta(&self) -> f32 {
        self.max_delta
    }
}

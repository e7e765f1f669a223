//! Repeating on/off pattern anchored to a window start.

use crate::config::ConfigError;
use crate::time::{Instant, Level, Millis};

/// `pulse_ms` high, `pause_ms` low, repeated until `total_ms` has passed
/// since `window_start`.
///
/// A pulse that would start before the window closes still begins, and is cut
/// short at the window end.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PulseTrain {
    window_start: Instant,
    pulse_ms: Millis,
    pause_ms: Millis,
    total_ms: Millis,
}

impl PulseTrain {
    /// Builds a train, rejecting a zero-length pulse.
    pub fn new(
        window_start: Instant,
        pulse_ms: Millis,
        pause_ms: Millis,
        total_ms: Millis,
    ) -> Result<Self, ConfigError> {
        Self::check(pulse_ms, pause_ms)?;
        Ok(Self {
            window_start,
            pulse_ms,
            pause_ms,
            total_ms,
        })
    }

    /// One uninterrupted pulse of `width_ms`.
    #[must_use]
    pub const fn single(window_start: Instant, width_ms: Millis) -> Self {
        Self {
            window_start,
            pulse_ms: width_ms,
            pause_ms: 0,
            total_ms: width_ms,
        }
    }

    /// Validates pulse and pause lengths without building a train.
    pub const fn check(pulse_ms: Millis, pause_ms: Millis) -> Result<(), ConfigError> {
        if pulse_ms == 0 {
            return Err(ConfigError::InvalidPulseTrain { pulse_ms, pause_ms });
        }
        Ok(())
    }

    #[must_use]
    pub const fn window_start(&self) -> Instant {
        self.window_start
    }

    /// Instant the window closes.
    #[must_use]
    pub const fn window_end(&self) -> Instant {
        self.window_start.wrapping_add(self.total_ms)
    }

    /// Level the train calls for at `now`.
    #[must_use]
    pub fn level_at(&self, now: Instant) -> Level {
        let Ok(offset) = Millis::try_from(now.offset_from(self.window_start)) else {
            return Level::Low;
        };
        if offset >= self.total_ms {
            return Level::Low;
        }
        let period = self.pulse_ms.saturating_add(self.pause_ms);
        Level::from_active(offset % period < self.pulse_ms)
    }

    /// Same as [`PulseTrain::level_at`]; named for use from channel ticks.
    #[must_use]
    pub fn tick(&self, now: Instant) -> Level {
        self.level_at(now)
    }

    /// Returns `true` once the window has closed.
    #[must_use]
    pub fn is_exhausted(&self, now: Instant) -> bool {
        now.has_reached(self.window_end())
    }

    /// Number of rising edges inside the window.
    #[must_use]
    pub const fn pulse_count(&self) -> u32 {
        let period = self.pulse_ms.saturating_add(self.pause_ms);
        if period == 0 {
            return 0;
        }
        self.total_ms.div_ceil(period)
    }
}

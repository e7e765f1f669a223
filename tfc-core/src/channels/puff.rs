//! Air-puff valve channel.

use super::pulse::PulseTrain;
use crate::config::{AirPuffConfig, ConfigError};
use crate::time::{Instant, Level, Millis};

/// Puff train armed relative to a trial start.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PuffChannel {
    start_offset_ms: Millis,
    pulse_ms: Millis,
    pause_ms: Millis,
    total_ms: Millis,
    train: Option<PulseTrain>,
}

impl PuffChannel {
    pub const fn new(config: &AirPuffConfig) -> Result<Self, ConfigError> {
        if let Err(error) = PulseTrain::check(config.pulse_ms, config.pause_ms) {
            return Err(error);
        }
        Ok(Self {
            start_offset_ms: config.start_ms,
            pulse_ms: config.pulse_ms,
            pause_ms: config.pause_ms,
            total_ms: config.total_ms,
            train: None,
        })
    }

    /// Schedules the puff train for the trial that started at `trial_start`.
    pub fn arm(&mut self, trial_start: Instant) {
        let window_start = trial_start.wrapping_add(self.start_offset_ms);
        self.train =
            PulseTrain::new(window_start, self.pulse_ms, self.pause_ms, self.total_ms).ok();
    }

    pub fn disarm(&mut self) {
        self.train = None;
    }

    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.train.is_some()
    }

    /// Valve level at `now`; low whenever disarmed.
    #[must_use]
    pub fn tick(&self, now: Instant) -> Level {
        self.train.map_or(Level::Low, |train| train.level_at(now))
    }

    /// Returns `true` once an armed train has played out.
    #[must_use]
    pub fn is_exhausted(&self, now: Instant) -> bool {
        self.train.is_some_and(|train| train.is_exhausted(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RigConfig;

    #[test]
    fn armed_train_is_offset_from_trial_start() {
        let config = RigConfig::defaults();
        let mut puff = PuffChannel::new(&config.air_puff).expect("valid puff");
        let trial_start = Instant::from_millis(10_000);

        assert_eq!(puff.tick(Instant::from_millis(55_000)), Level::Low);
        puff.arm(trial_start);

        assert_eq!(puff.tick(Instant::from_millis(54_999)), Level::Low);
        assert_eq!(puff.tick(Instant::from_millis(55_000)), Level::High);
        assert_eq!(puff.tick(Instant::from_millis(55_200)), Level::Low);
        assert_eq!(puff.tick(Instant::from_millis(59_800)), Level::High);
        assert!(puff.is_exhausted(Instant::from_millis(60_000)));

        puff.disarm();
        assert_eq!(puff.tick(Instant::from_millis(59_800)), Level::Low);
    }
}

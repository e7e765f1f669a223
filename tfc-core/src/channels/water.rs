//! Water reward valve.

use crate::config::RewardConfig;
use crate::time::{Instant, Level, Millis};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WaterState {
    Idle,
    Dispensing,
}

/// Opens the valve for `dispense_ms` once enough licks land in the window,
/// then refuses to reopen until `timeout_ms` after the previous opening.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WaterChannel {
    licks_to_dispense: u8,
    dispense_ms: Millis,
    timeout_ms: Millis,
    enabled: bool,
    state: WaterState,
    last_dispense_start: Option<Instant>,
    dispenses: u32,
}

impl WaterChannel {
    #[must_use]
    pub const fn new(config: &RewardConfig, enabled: bool) -> Self {
        Self {
            licks_to_dispense: config.licks_to_dispense,
            dispense_ms: config.dispense_ms,
            timeout_ms: config.timeout_ms,
            enabled,
            state: WaterState::Idle,
            last_dispense_start: None,
            dispenses: 0,
        }
    }

    /// Advances the valve. Returns `true` when a dispense starts on this tick.
    pub fn tick(&mut self, now: Instant, lick_count: usize) -> bool {
        match self.state {
            WaterState::Idle => {
                let enough_licks = lick_count >= usize::from(self.licks_to_dispense);
                let rested = self
                    .last_dispense_start
                    .is_none_or(|start| now.elapsed_since(start) >= self.timeout_ms);
                if self.enabled && enough_licks && rested {
                    self.state = WaterState::Dispensing;
                    self.last_dispense_start = Some(now);
                    self.dispenses = self.dispenses.wrapping_add(1);
                    return true;
                }
            }
            WaterState::Dispensing => {
                let done = self
                    .last_dispense_start
                    .is_none_or(|start| now.elapsed_since(start) >= self.dispense_ms);
                if done {
                    self.state = WaterState::Idle;
                }
            }
        }
        false
    }

    /// Closes the valve. The lockout from the last opening still applies.
    pub fn force_idle(&mut self) {
        self.state = WaterState::Idle;
    }

    #[must_use]
    pub const fn state(&self) -> WaterState {
        self.state
    }

    #[must_use]
    pub const fn level(&self) -> Level {
        Level::from_active(matches!(self.state, WaterState::Dispensing))
    }

    /// Number of times the valve has opened.
    #[must_use]
    pub const fn dispenses(&self) -> u32 {
        self.dispenses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RigConfig;

    fn channel() -> WaterChannel {
        WaterChannel::new(&RigConfig::defaults().reward, true)
    }

    #[test]
    fn dispenses_for_configured_time_then_locks_out() {
        let mut water = channel();

        assert!(!water.tick(Instant::from_millis(0), 1));
        assert!(water.tick(Instant::from_millis(10), 2));
        assert_eq!(water.level(), Level::High);

        assert!(!water.tick(Instant::from_millis(209), 2));
        assert_eq!(water.state(), WaterState::Dispensing);
        assert!(!water.tick(Instant::from_millis(210), 2));
        assert_eq!(water.state(), WaterState::Idle);

        assert!(!water.tick(Instant::from_millis(709), 5));
        assert!(water.tick(Instant::from_millis(710), 2));
        assert_eq!(water.dispenses(), 2);
    }

    #[test]
    fn disabled_valve_never_opens() {
        let mut water = WaterChannel::new(&RigConfig::defaults().reward, false);
        assert!(!water.tick(Instant::ZERO, 10));
        assert_eq!(water.level(), Level::Low);
    }

    #[test]
    fn forced_idle_keeps_lockout() {
        let mut water = channel();
        assert!(water.tick(Instant::ZERO, 2));

        water.force_idle();

        assert_eq!(water.level(), Level::Low);
        assert!(!water.tick(Instant::from_millis(300), 2));
        assert!(water.tick(Instant::from_millis(700), 2));
    }
}

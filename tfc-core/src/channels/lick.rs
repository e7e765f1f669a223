//! Lick sensor debouncing and the sliding lick-count window.

use heapless::Deque;

use crate::config::RewardConfig;
use crate::time::{EdgeDetector, Instant, Level, Millis};

/// Largest number of accepted licks the sliding window can hold.
pub const LICK_WINDOW_CAPACITY: usize = 32;

/// Turns raw sensor samples into accepted licks.
///
/// A lick is a rising edge at least `lick_timeout_ms` after the previous
/// accepted lick. [`LickDebouncer::count`] reports accepted licks younger
/// than `window_ms`.
#[derive(Clone, Debug)]
pub struct LickDebouncer {
    lick_timeout_ms: Millis,
    window_ms: Millis,
    edges: EdgeDetector,
    last_accepted: Option<Instant>,
    recent: Deque<Instant, LICK_WINDOW_CAPACITY>,
}

impl LickDebouncer {
    #[must_use]
    pub const fn new(lick_timeout_ms: Millis, window_ms: Millis) -> Self {
        Self {
            lick_timeout_ms,
            window_ms,
            edges: EdgeDetector::new(),
            last_accepted: None,
            recent: Deque::new(),
        }
    }

    #[must_use]
    pub const fn from_config(config: &RewardConfig) -> Self {
        Self::new(config.lick_timeout_ms, config.lick_count_window_ms)
    }

    /// Feeds one sensor sample. Returns `true` when it is an accepted lick.
    pub fn on_raw_sample(&mut self, now: Instant, raw_active: bool) -> bool {
        self.prune(now);

        if !self.edges.rising(Level::from_active(raw_active)) {
            return false;
        }
        if let Some(last) = self.last_accepted
            && now.elapsed_since(last) < self.lick_timeout_ms
        {
            return false;
        }

        self.last_accepted = Some(now);
        if self.recent.is_full() {
            self.recent.pop_front();
        }
        // Capacity was just ensured above.
        let _ = self.recent.push_back(now);
        true
    }

    /// Accepted licks inside the window ending at the last sample.
    #[must_use]
    pub fn count(&self) -> usize {
        self.recent.len()
    }

    /// Accepted licks inside the window ending at `now`.
    pub fn count_at(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.recent.len()
    }

    /// Time of the most recent accepted lick.
    #[must_use]
    pub const fn last_accepted(&self) -> Option<Instant> {
        self.last_accepted
    }

    /// Forgets every lick and the edge history.
    pub fn reset(&mut self) {
        self.edges.reset();
        self.last_accepted = None;
        self.recent.clear();
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.recent.front() {
            if now.elapsed_since(*oldest) < self.window_ms {
                break;
            }
            self.recent.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(debouncer: &mut LickDebouncer, samples: &[(u32, bool)]) -> usize {
        samples
            .iter()
            .filter(|(millis, active)| debouncer.on_raw_sample(Instant::from_millis(*millis), *active))
            .count()
    }

    #[test]
    fn edges_inside_the_timeout_are_ignored() {
        let mut debouncer = LickDebouncer::new(100, 1_000);
        let accepted = feed(
            &mut debouncer,
            &[
                (0, true),
                (10, false),
                (50, true),
                (60, false),
                (250, true),
                (260, false),
            ],
        );

        assert_eq!(accepted, 2);
        assert_eq!(debouncer.count(), 2);
        assert_eq!(debouncer.last_accepted(), Some(Instant::from_millis(250)));
    }

    #[test]
    fn held_sensor_counts_once() {
        let mut debouncer = LickDebouncer::new(100, 1_000);
        let accepted = feed(&mut debouncer, &[(0, true), (200, true), (400, true)]);
        assert_eq!(accepted, 1);
    }

    #[test]
    fn licks_age_out_of_the_window() {
        let mut debouncer = LickDebouncer::new(100, 1_000);
        feed(&mut debouncer, &[(0, true), (1, false), (500, true), (501, false)]);

        assert_eq!(debouncer.count_at(Instant::from_millis(999)), 2);
        assert_eq!(debouncer.count_at(Instant::from_millis(1_000)), 1);
        assert_eq!(debouncer.count_at(Instant::from_millis(1_500)), 0);
    }

    #[test]
    fn reset_clears_history() {
        let mut debouncer = LickDebouncer::new(100, 1_000);
        feed(&mut debouncer, &[(0, true)]);
        debouncer.reset();

        assert_eq!(debouncer.count(), 0);
        assert!(debouncer.on_raw_sample(Instant::from_millis(10), true));
    }
}

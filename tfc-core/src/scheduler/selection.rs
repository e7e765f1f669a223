//! Random draws made by the scheduler.

use rand::{Rng, RngCore};

use crate::config::RigConfig;
use crate::time::Millis;
use crate::trial::{TrialSelection, TrialTypeId};

/// Draws the next inter-trial interval, uniform over the inclusive bounds.
pub fn draw_interval<R: RngCore>(config: &RigConfig, rng: &mut R) -> Millis {
    let (min_ms, max_ms) = config.interval_bounds();
    if min_ms >= max_ms {
        return min_ms;
    }
    rng.random_range(min_ms..=max_ms)
}

/// Picks trial types according to a [`TrialSelection`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TrialPicker {
    cursor: usize,
}

impl TrialPicker {
    #[must_use]
    pub const fn new() -> Self {
        Self { cursor: 0 }
    }

    /// Restarts a fixed schedule from its first entry.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Next trial type, or `None` for an empty list.
    pub fn next<R: RngCore>(
        &mut self,
        selection: &TrialSelection,
        rng: &mut R,
    ) -> Option<TrialTypeId> {
        match *selection {
            TrialSelection::Uniform(types) => {
                if types.is_empty() {
                    return None;
                }
                types.get(rng.random_range(0..types.len())).copied()
            }
            TrialSelection::Schedule(types) => {
                let picked = types.get(self.cursor % types.len().max(1)).copied();
                self.cursor = self.cursor.wrapping_add(1);
                picked
            }
            TrialSelection::Ratio {
                positive,
                negative,
                positive_percent,
            } => {
                if rng.random_range(0..100_u8) < positive_percent {
                    Some(positive)
                } else {
                    Some(negative)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    #[test]
    fn intervals_stay_within_bounds() {
        let config = RigConfig::defaults();
        let mut rng = SmallRng::seed_from_u64(7);
        let mut lowest = Millis::MAX;
        let mut highest = 0;

        for _ in 0..10_000 {
            let interval = draw_interval(&config, &mut rng);
            assert!((60_000..=300_000).contains(&interval), "{interval}");
            lowest = lowest.min(interval);
            highest = highest.max(interval);
        }

        // The draw should spread across most of the range.
        assert!(lowest < 70_000);
        assert!(highest > 290_000);
    }

    #[test]
    fn debug_interval_is_fixed() {
        let mut config = RigConfig::defaults();
        config.debug.enabled = true;
        let mut rng = SmallRng::seed_from_u64(1);

        for _ in 0..16 {
            assert_eq!(draw_interval(&config, &mut rng), config.debug.inter_trial_wait_ms);
        }
    }

    #[test]
    fn schedule_repeats_in_order() {
        const ORDER: [TrialTypeId; 2] = [TrialTypeId::PuffPositive, TrialTypeId::NoPuffNoSignal];
        let mut picker = TrialPicker::new();
        let mut rng = SmallRng::seed_from_u64(3);
        let selection = TrialSelection::Schedule(&ORDER);

        let picked: heapless::Vec<TrialTypeId, 5> = (0..5)
            .filter_map(|_| picker.next(&selection, &mut rng))
            .collect();

        assert_eq!(
            picked.as_slice(),
            &[ORDER[0], ORDER[1], ORDER[0], ORDER[1], ORDER[0]]
        );
    }

    #[test]
    fn ratio_approximates_configured_share() {
        let selection = TrialSelection::Ratio {
            positive: TrialTypeId::PuffPositive,
            negative: TrialTypeId::NoPuffNegative,
            positive_percent: 80,
        };
        let mut picker = TrialPicker::new();
        let mut rng = SmallRng::seed_from_u64(11);

        let positives = (0..10_000)
            .filter(|_| picker.next(&selection, &mut rng) == Some(TrialTypeId::PuffPositive))
            .count();

        assert!((7_600..=8_400).contains(&positives), "{positives}");
    }

    #[test]
    fn empty_lists_yield_nothing() {
        let mut picker = TrialPicker::new();
        let mut rng = SmallRng::seed_from_u64(0);
        assert_eq!(picker.next(&TrialSelection::Uniform(&[]), &mut rng), None);
        assert_eq!(picker.next(&TrialSelection::Schedule(&[]), &mut rng), None);
    }
}

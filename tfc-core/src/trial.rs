//! Trial-type catalog.
//!
//! The set of trial types is closed and fixed at build time. The scheduler
//! only ever refers to entries by [`TrialTypeId`]; labels exist for the
//! logging layer and for configuration files.

use core::fmt;

/// Which conditioned stimulus a trial presents.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SignalKind {
    /// CS+, the cue paired with the outcome.
    Positive,
    /// CS-, the unpaired cue.
    Negative,
}

/// Identifier for each catalog entry. Discriminants are the numeric IDs
/// written to session logs; 0 to 3 keep the order of the original rig tables.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TrialTypeId {
    NoPuffNegative = 0,
    PuffPositive = 1,
    PuffNegative = 2,
    NoPuffPositive = 3,
    PuffNoSignal = 4,
    NoPuffNoSignal = 5,
}

/// Number of entries in [`TRIAL_TYPES`].
pub const TRIAL_TYPE_COUNT: usize = 6;

impl TrialTypeId {
    /// Deterministic index for lookups into [`TRIAL_TYPES`].
    #[must_use]
    pub const fn as_index(self) -> usize {
        match self {
            TrialTypeId::NoPuffNegative => 0,
            TrialTypeId::PuffPositive => 1,
            TrialTypeId::PuffNegative => 2,
            TrialTypeId::NoPuffPositive => 3,
            TrialTypeId::PuffNoSignal => 4,
            TrialTypeId::NoPuffNoSignal => 5,
        }
    }

    /// Attempts to construct a [`TrialTypeId`] from a numeric ID.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(TrialTypeId::NoPuffNegative),
            1 => Some(TrialTypeId::PuffPositive),
            2 => Some(TrialTypeId::PuffNegative),
            3 => Some(TrialTypeId::NoPuffPositive),
            4 => Some(TrialTypeId::PuffNoSignal),
            5 => Some(TrialTypeId::NoPuffNoSignal),
            _ => None,
        }
    }

    /// Looks up an entry by its log label.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        TRIAL_TYPES
            .iter()
            .find(|entry| entry.label == label)
            .map(|entry| entry.id)
    }

    /// Looks up a label written by the first generation of rig headers, which
    /// named outcomes after water instead of the air puff.
    #[must_use]
    pub fn from_legacy_label(label: &str) -> Option<Self> {
        LEGACY_LABELS
            .iter()
            .find(|(legacy, _)| *legacy == label)
            .map(|(_, id)| *id)
    }

    /// Returns the full catalog entry.
    #[must_use]
    pub const fn trial_type(self) -> TrialType {
        TRIAL_TYPES[self.as_index()]
    }

    /// Returns the log label for this entry.
    #[must_use]
    pub const fn label(self) -> &'static str {
        self.trial_type().label
    }
}

impl fmt::Display for TrialTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Immutable description of what a trial delivers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TrialType {
    pub id: TrialTypeId,
    pub label: &'static str,
    pub delivers_airpuff: bool,
    pub signal: SignalKind,
    pub has_signal: bool,
}

impl TrialType {
    const fn new(
        id: TrialTypeId,
        label: &'static str,
        delivers_airpuff: bool,
        signal: SignalKind,
        has_signal: bool,
    ) -> Self {
        Self {
            id,
            label,
            delivers_airpuff,
            signal,
            has_signal,
        }
    }

    /// Returns the cue to play, if the trial has one.
    #[must_use]
    pub const fn cue(&self) -> Option<SignalKind> {
        if self.has_signal {
            Some(self.signal)
        } else {
            None
        }
    }
}

/// Old header labels and the entries they select.
pub const LEGACY_LABELS: [(&str, TrialTypeId); 2] = [
    ("no_water_CS-", TrialTypeId::NoPuffNegative),
    ("water_CS+", TrialTypeId::PuffPositive),
];

/// Compile-time catalog of every trial type.
pub const TRIAL_TYPES: [TrialType; TRIAL_TYPE_COUNT] = [
    TrialType::new(
        TrialTypeId::NoPuffNegative,
        "no_puff_CS-",
        false,
        SignalKind::Negative,
        true,
    ),
    TrialType::new(
        TrialTypeId::PuffPositive,
        "puff_CS+",
        true,
        SignalKind::Positive,
        true,
    ),
    TrialType::new(
        TrialTypeId::PuffNegative,
        "puff_CS-",
        true,
        SignalKind::Negative,
        true,
    ),
    TrialType::new(
        TrialTypeId::NoPuffPositive,
        "no_puff_CS+",
        false,
        SignalKind::Positive,
        true,
    ),
    TrialType::new(
        TrialTypeId::PuffNoSignal,
        "puff_no_signal",
        true,
        SignalKind::Positive,
        false,
    ),
    TrialType::new(
        TrialTypeId::NoPuffNoSignal,
        "no_puff_no_signal",
        false,
        SignalKind::Negative,
        false,
    ),
];

/// How the scheduler picks the next trial type.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TrialSelection {
    /// Uniform draw over the listed entries.
    Uniform(&'static [TrialTypeId]),
    /// Fixed order, repeated from the start once exhausted.
    Schedule(&'static [TrialTypeId]),
    /// `positive` with probability `positive_percent`, otherwise `negative`.
    Ratio {
        positive: TrialTypeId,
        negative: TrialTypeId,
        positive_percent: u8,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_ids_and_labels_are_unique() {
        for (index, entry) in TRIAL_TYPES.iter().enumerate() {
            assert_eq!(entry.id.as_index(), index);
            assert_eq!(TrialTypeId::from_index(index), Some(entry.id));
            assert_eq!(TrialTypeId::from_label(entry.label), Some(entry.id));
            for other in &TRIAL_TYPES[index + 1..] {
                assert_ne!(entry.label, other.label);
            }
        }
        assert_eq!(TrialTypeId::from_index(TRIAL_TYPE_COUNT), None);
    }

    #[test]
    fn legacy_labels_keep_their_cue() {
        for (legacy, id) in LEGACY_LABELS {
            assert_eq!(TrialTypeId::from_label(legacy), None);
            assert_eq!(TrialTypeId::from_legacy_label(legacy), Some(id));
            let expected = if legacy.ends_with("CS+") {
                SignalKind::Positive
            } else {
                SignalKind::Negative
            };
            assert_eq!(id.trial_type().cue(), Some(expected));
            assert_eq!(legacy.starts_with("water"), id.trial_type().delivers_airpuff);
        }
    }

    #[test]
    fn labels_describe_their_fields() {
        for entry in &TRIAL_TYPES {
            assert_eq!(entry.label.starts_with("puff"), entry.delivers_airpuff);
            match entry.cue() {
                Some(SignalKind::Positive) => assert!(entry.label.ends_with("CS+")),
                Some(SignalKind::Negative) => assert!(entry.label.ends_with("CS-")),
                None => assert!(entry.label.ends_with("no_signal")),
            }
        }
    }
}

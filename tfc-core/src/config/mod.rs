//! Rig configuration.
//!
//! One explicit, versioned [`RigConfig`] replaces the rig/trial header tables.
//! It is built once at startup (from [`RigConfig::defaults`], optionally
//! patched by [`apply_overrides`]), validated, and then borrowed by the trial
//! scheduler for the lifetime of the session. Nothing reads it as ambient
//! global state.

use core::fmt;

use crate::channels::lick::LICK_WINDOW_CAPACITY;
use crate::channels::pulse::PulseTrain;
use crate::channels::sync::RigRole;
use crate::channels::tone::{ToneCarrier, ToneEnvelope, ToneSettings};
use crate::time::Millis;
use crate::trial::{TrialSelection, TrialTypeId};

pub mod overrides;

pub use overrides::{OverrideError, OverrideErrorKind, apply_overrides};

/// Layout version of [`RigConfig`]. Bump when fields change meaning.
pub const CONFIG_VERSION: u16 = 1;

/// Trials per session.
pub const DEFAULT_NUMBER_OF_TRIALS: u16 = 6;
/// Shortest inter-trial interval.
pub const DEFAULT_MIN_ITI_MS: Millis = 60_000;
/// Longest inter-trial interval.
pub const DEFAULT_MAX_ITI_MS: Millis = 300_000;
/// Length of one trial, measured from trial start.
pub const DEFAULT_TRIAL_DURATION_MS: Millis = 50_000;
/// Quiet period after the last trial before the rig re-arms.
pub const DEFAULT_POST_LAST_TRIAL_INTERVAL_MS: Millis = 60_000;
/// Share of CS+ trials under the default ratio selection.
pub const DEFAULT_CS_PLUS_PERCENT: u8 = 80;

/// Fixed inter-trial interval used in debug mode.
pub const DEFAULT_DEBUG_ITI_MS: Millis = 5_000;

/// Idle time without a session start before a full reset is requested.
pub const DEFAULT_PERIODIC_RESET_MS: Millis = 300_000;

/// Longest gap between ticks that still counts as on time while a timed line
/// is active.
pub const DEFAULT_LATE_TICK_MS: Millis = 10;

/// Width of the primary's sync pulse.
pub const DEFAULT_SYNC_PULSE_MS: Millis = 500;
/// Latency compensation added by the follower to the observed edge.
pub const DEFAULT_SYNC_OFFSET_MS: Millis = 250;
/// How long a follower waits for the sync edge before free-running.
pub const DEFAULT_SYNC_MAX_WAIT_MS: Millis = DEFAULT_MAX_ITI_MS + 10_000;

/// Valve open time per reward.
pub const DEFAULT_WATER_DISPENSE_MS: Millis = 200;
/// Minimum spacing between reward starts.
pub const DEFAULT_WATER_TIMEOUT_MS: Millis = 700;
/// Licks inside the counting window needed to trigger a reward.
pub const DEFAULT_LICKS_TO_DISPENSE: u8 = 2;
/// Minimum spacing between accepted licks.
pub const DEFAULT_LICK_TIMEOUT_MS: Millis = 100;
/// Age after which an accepted lick stops counting.
pub const DEFAULT_LICK_COUNT_WINDOW_MS: Millis = 1_000;

/// Air-puff train onset, relative to trial start.
pub const DEFAULT_AIR_PUFF_START_MS: Millis = 45_000;
/// Width of each puff.
pub const DEFAULT_AIR_PUFF_PULSE_MS: Millis = 200;
/// Gap between puffs.
pub const DEFAULT_AIR_PUFF_PAUSE_MS: Millis = 1_000;
/// Total length of the puff train.
pub const DEFAULT_AIR_PUFF_TOTAL_MS: Millis = 5_000;

/// Cue onset, relative to trial start.
pub const DEFAULT_AUDITORY_START_MS: Millis = 15_000;
/// Cue offset, relative to trial start.
pub const DEFAULT_AUDITORY_STOP_MS: Millis = 35_000;
/// CS+ carrier frequency.
pub const DEFAULT_POSITIVE_FREQUENCY_HZ: u32 = 5_000;
/// CS- carrier frequency.
pub const DEFAULT_NEGATIVE_FREQUENCY_HZ: u32 = 2_000;
/// CS- tone burst length.
pub const DEFAULT_NEGATIVE_PULSE_MS: Millis = 1_000;
/// CS- burst repetition period.
pub const DEFAULT_NEGATIVE_CYCLE_MS: Millis = 2_000;
/// Duty cycle fed into the software-PWM half-period computation.
pub const DEFAULT_TONE_DUTY_PERCENT: u8 = 75;

/// Reasons a configuration is rejected.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    UnsupportedVersion(u16),
    NoTrials,
    InvalidIntervalRange { min_ms: Millis, max_ms: Millis },
    ZeroDuration(&'static str),
    InvalidPulseTrain { pulse_ms: Millis, pause_ms: Millis },
    InvalidFrequency { frequency_hz: u32 },
    FrequencyTooHigh { frequency_hz: u32 },
    FrequencyNotRepresentable { frequency_hz: u32, achieved_hz: u32 },
    InvalidDutyCycle(u8),
    InvalidTonePattern { pulse_ms: Millis, cycle_ms: Millis },
    InvalidAuditoryWindow { start_ms: Millis, stop_ms: Millis },
    InvalidLickThreshold,
    WaterTimeoutShorterThanDispense { timeout_ms: Millis, dispense_ms: Millis },
    LickWindowTooLarge { required: u32, capacity: usize },
    EmptyTrialSelection,
    InvalidRatio(u8),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnsupportedVersion(version) => {
                write!(f, "unsupported config version {version} (expected {CONFIG_VERSION})")
            }
            ConfigError::NoTrials => f.write_str("session must contain at least one trial"),
            ConfigError::InvalidIntervalRange { min_ms, max_ms } => {
                write!(f, "inter-trial interval range {min_ms}..={max_ms} ms is empty")
            }
            ConfigError::ZeroDuration(name) => write!(f, "{name} must be non-zero"),
            ConfigError::InvalidPulseTrain { pulse_ms, pause_ms } => {
                write!(f, "pulse train {pulse_ms} ms on / {pause_ms} ms off has no pulse")
            }
            ConfigError::InvalidFrequency { frequency_hz } => {
                write!(f, "tone frequency {frequency_hz} Hz must be positive")
            }
            ConfigError::FrequencyTooHigh { frequency_hz } => write!(
                f,
                "tone frequency {frequency_hz} Hz is too high for a millisecond software carrier"
            ),
            ConfigError::FrequencyNotRepresentable {
                frequency_hz,
                achieved_hz,
            } => write!(
                f,
                "software carrier cannot produce {frequency_hz} Hz (nearest is {achieved_hz} Hz)"
            ),
            ConfigError::InvalidDutyCycle(duty) => {
                write!(f, "duty cycle {duty}% must be within 1-100")
            }
            ConfigError::InvalidTonePattern { pulse_ms, cycle_ms } => write!(
                f,
                "tone burst {pulse_ms} ms does not fit a {cycle_ms} ms cycle"
            ),
            ConfigError::InvalidAuditoryWindow { start_ms, stop_ms } => {
                write!(f, "auditory window {start_ms}..{stop_ms} ms is empty")
            }
            ConfigError::InvalidLickThreshold => {
                f.write_str("water dispense lick threshold must be at least 1")
            }
            ConfigError::WaterTimeoutShorterThanDispense {
                timeout_ms,
                dispense_ms,
            } => write!(
                f,
                "water timeout {timeout_ms} ms is shorter than dispense time {dispense_ms} ms"
            ),
            ConfigError::LickWindowTooLarge { required, capacity } => write!(
                f,
                "lick window needs {required} slots but only {capacity} are available"
            ),
            ConfigError::EmptyTrialSelection => f.write_str("trial selection lists no trial types"),
            ConfigError::InvalidRatio(percent) => {
                write!(f, "CS+ ratio {percent}% exceeds 100%")
            }
        }
    }
}

/// Trial count, pacing and trial-type selection.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SessionConfig {
    pub number_of_trials: u16,
    pub min_iti_ms: Millis,
    pub max_iti_ms: Millis,
    pub trial_duration_ms: Millis,
    pub post_last_trial_interval_ms: Millis,
    pub selection: TrialSelection,
}

/// Bench-testing shortcuts.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DebugConfig {
    pub enabled: bool,
    /// Replaces the random inter-trial interval while `enabled`.
    pub inter_trial_wait_ms: Millis,
}

/// Training-session switches.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TrainingConfig {
    pub enabled: bool,
    /// Training trials deliver water even when rewards are otherwise off.
    pub rewarded: bool,
}

/// Primary/follower synchronization.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SyncConfig {
    pub role: RigRole,
    pub pulse_ms: Millis,
    pub offset_ms: Millis,
    pub max_wait_ms: Millis,
}

/// Lick detection and water delivery.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RewardConfig {
    pub water_available: bool,
    pub dispense_ms: Millis,
    /// Measured from the start of the previous dispense, not its end.
    pub timeout_ms: Millis,
    pub licks_to_dispense: u8,
    pub lick_timeout_ms: Millis,
    pub lick_count_window_ms: Millis,
}

/// Air-puff train timing.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AirPuffConfig {
    pub enabled: bool,
    pub start_ms: Millis,
    pub pulse_ms: Millis,
    pub pause_ms: Millis,
    pub total_ms: Millis,
}

/// Cue window and the two tone channels.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AuditoryConfig {
    pub enabled: bool,
    pub start_ms: Millis,
    pub stop_ms: Millis,
    pub positive: ToneSettings,
    pub negative: ToneSettings,
}

impl AuditoryConfig {
    /// Length of the cue window.
    #[must_use]
    pub const fn window_ms(&self) -> Millis {
        self.stop_ms.saturating_sub(self.start_ms)
    }
}

/// Complete rig configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RigConfig {
    pub version: u16,
    pub session: SessionConfig,
    pub debug: DebugConfig,
    pub training: TrainingConfig,
    pub periodic_reset_ms: Millis,
    /// Tick gaps longer than this are reported while a puff or tone is active.
    pub late_tick_ms: Millis,
    pub sync: SyncConfig,
    pub reward: RewardConfig,
    pub air_puff: AirPuffConfig,
    pub auditory: AuditoryConfig,
}

impl RigConfig {
    /// Configuration matching the values the rig shipped with.
    #[must_use]
    pub const fn defaults() -> Self {
        Self {
            version: CONFIG_VERSION,
            session: SessionConfig {
                number_of_trials: DEFAULT_NUMBER_OF_TRIALS,
                min_iti_ms: DEFAULT_MIN_ITI_MS,
                max_iti_ms: DEFAULT_MAX_ITI_MS,
                trial_duration_ms: DEFAULT_TRIAL_DURATION_MS,
                post_last_trial_interval_ms: DEFAULT_POST_LAST_TRIAL_INTERVAL_MS,
                selection: TrialSelection::Ratio {
                    positive: TrialTypeId::PuffPositive,
                    negative: TrialTypeId::NoPuffNegative,
                    positive_percent: DEFAULT_CS_PLUS_PERCENT,
                },
            },
            debug: DebugConfig {
                enabled: false,
                inter_trial_wait_ms: DEFAULT_DEBUG_ITI_MS,
            },
            training: TrainingConfig {
                enabled: false,
                rewarded: true,
            },
            periodic_reset_ms: DEFAULT_PERIODIC_RESET_MS,
            late_tick_ms: DEFAULT_LATE_TICK_MS,
            sync: SyncConfig {
                role: RigRole::Primary,
                pulse_ms: DEFAULT_SYNC_PULSE_MS,
                offset_ms: DEFAULT_SYNC_OFFSET_MS,
                max_wait_ms: DEFAULT_SYNC_MAX_WAIT_MS,
            },
            reward: RewardConfig {
                water_available: false,
                dispense_ms: DEFAULT_WATER_DISPENSE_MS,
                timeout_ms: DEFAULT_WATER_TIMEOUT_MS,
                licks_to_dispense: DEFAULT_LICKS_TO_DISPENSE,
                lick_timeout_ms: DEFAULT_LICK_TIMEOUT_MS,
                lick_count_window_ms: DEFAULT_LICK_COUNT_WINDOW_MS,
            },
            air_puff: AirPuffConfig {
                enabled: true,
                start_ms: DEFAULT_AIR_PUFF_START_MS,
                pulse_ms: DEFAULT_AIR_PUFF_PULSE_MS,
                pause_ms: DEFAULT_AIR_PUFF_PAUSE_MS,
                total_ms: DEFAULT_AIR_PUFF_TOTAL_MS,
            },
            auditory: AuditoryConfig {
                enabled: true,
                start_ms: DEFAULT_AUDITORY_START_MS,
                stop_ms: DEFAULT_AUDITORY_STOP_MS,
                positive: ToneSettings {
                    frequency_hz: DEFAULT_POSITIVE_FREQUENCY_HZ,
                    duty_percent: DEFAULT_TONE_DUTY_PERCENT,
                    carrier: ToneCarrier::Hardware,
                    envelope: ToneEnvelope::Continuous,
                },
                negative: ToneSettings {
                    frequency_hz: DEFAULT_NEGATIVE_FREQUENCY_HZ,
                    duty_percent: DEFAULT_TONE_DUTY_PERCENT,
                    carrier: ToneCarrier::Hardware,
                    envelope: ToneEnvelope::Pulsed {
                        pulse_ms: DEFAULT_NEGATIVE_PULSE_MS,
                        cycle_ms: DEFAULT_NEGATIVE_CYCLE_MS,
                    },
                },
            },
        }
    }

    /// Defaults for the follower rig of a primary/follower pair.
    #[must_use]
    pub const fn secondary_defaults() -> Self {
        let mut config = Self::defaults();
        config.sync.role = RigRole::Secondary;
        config
    }

    /// Checks every field the channels depend on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(self.version));
        }

        let session = &self.session;
        if session.number_of_trials == 0 {
            return Err(ConfigError::NoTrials);
        }
        if session.min_iti_ms > session.max_iti_ms {
            return Err(ConfigError::InvalidIntervalRange {
                min_ms: session.min_iti_ms,
                max_ms: session.max_iti_ms,
            });
        }
        if session.trial_duration_ms == 0 {
            return Err(ConfigError::ZeroDuration("TRIAL_DURATION"));
        }
        validate_selection(&session.selection)?;

        if self.periodic_reset_ms == 0 {
            return Err(ConfigError::ZeroDuration("RIG_PERIODIC_RESET_TIME"));
        }
        if self.late_tick_ms == 0 {
            return Err(ConfigError::ZeroDuration("LATE_TICK_BOUND"));
        }
        if self.sync.pulse_ms == 0 {
            return Err(ConfigError::ZeroDuration("SECONDARY_PIN_PAUSE"));
        }

        self.validate_reward()?;

        let puff = &self.air_puff;
        PulseTrain::check(puff.pulse_ms, puff.pause_ms)?;

        let auditory = &self.auditory;
        if auditory.stop_ms <= auditory.start_ms {
            return Err(ConfigError::InvalidAuditoryWindow {
                start_ms: auditory.start_ms,
                stop_ms: auditory.stop_ms,
            });
        }
        auditory.positive.validate()?;
        auditory.negative.validate()?;

        Ok(())
    }

    fn validate_reward(&self) -> Result<(), ConfigError> {
        let reward = &self.reward;
        if reward.dispense_ms == 0 {
            return Err(ConfigError::ZeroDuration("WATER_DISPENSE_TIME"));
        }
        if reward.timeout_ms < reward.dispense_ms {
            return Err(ConfigError::WaterTimeoutShorterThanDispense {
                timeout_ms: reward.timeout_ms,
                dispense_ms: reward.dispense_ms,
            });
        }
        if reward.licks_to_dispense == 0 {
            return Err(ConfigError::InvalidLickThreshold);
        }
        if reward.lick_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration("LICK_TIMEOUT"));
        }

        // One accepted lick per timeout, plus the one at the window edge.
        let required = reward.lick_count_window_ms / reward.lick_timeout_ms + 1;
        if usize::try_from(required).map_or(true, |slots| slots > LICK_WINDOW_CAPACITY) {
            return Err(ConfigError::LickWindowTooLarge {
                required,
                capacity: LICK_WINDOW_CAPACITY,
            });
        }
        Ok(())
    }

    /// Inclusive bounds for the next inter-trial interval draw.
    #[must_use]
    pub const fn interval_bounds(&self) -> (Millis, Millis) {
        if self.debug.enabled {
            (self.debug.inter_trial_wait_ms, self.debug.inter_trial_wait_ms)
        } else {
            (self.session.min_iti_ms, self.session.max_iti_ms)
        }
    }

    /// Returns `true` when the water valve may open at all.
    #[must_use]
    pub const fn reward_enabled(&self) -> bool {
        self.reward.water_available || (self.training.enabled && self.training.rewarded)
    }
}

impl Default for RigConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

fn validate_selection(selection: &TrialSelection) -> Result<(), ConfigError> {
    match selection {
        TrialSelection::Uniform(entries) | TrialSelection::Schedule(entries) => {
            if entries.is_empty() {
                Err(ConfigError::EmptyTrialSelection)
            } else {
                Ok(())
            }
        }
        TrialSelection::Ratio {
            positive_percent, ..
        } => {
            if *positive_percent > 100 {
                Err(ConfigError::InvalidRatio(*positive_percent))
            } else {
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(RigConfig::defaults().validate(), Ok(()));
        assert_eq!(RigConfig::secondary_defaults().validate(), Ok(()));
    }

    #[test]
    fn inverted_interval_range_is_rejected() {
        let mut config = RigConfig::defaults();
        config.session.min_iti_ms = 10_000;
        config.session.max_iti_ms = 5_000;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidIntervalRange {
                min_ms: 10_000,
                max_ms: 5_000
            })
        );
    }

    #[test]
    fn zero_frequency_fails_fast() {
        let mut config = RigConfig::defaults();
        config.auditory.negative.frequency_hz = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidFrequency { frequency_hz: 0 })
        );
    }

    #[test]
    fn late_tick_bound_must_be_positive() {
        let mut config = RigConfig::defaults();
        config.late_tick_ms = 0;

        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroDuration("LATE_TICK_BOUND"))
        );
    }

    #[test]
    fn software_tone_off_the_millisecond_grid_is_rejected() {
        let mut config = RigConfig::defaults();
        config.auditory.negative.carrier = ToneCarrier::SoftwarePwm;
        config.auditory.negative.frequency_hz = 300;

        assert_eq!(
            config.validate(),
            Err(ConfigError::FrequencyNotRepresentable {
                frequency_hz: 300,
                achieved_hz: 500
            })
        );
    }

    #[test]
    fn lick_window_must_fit_the_ring() {
        let mut config = RigConfig::defaults();
        config.reward.lick_timeout_ms = 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::LickWindowTooLarge { .. })
        ));
    }

    #[test]
    fn debug_mode_pins_the_interval() {
        let mut config = RigConfig::defaults();
        assert_eq!(config.interval_bounds(), (60_000, 300_000));
        config.debug.enabled = true;
        assert_eq!(config.interval_bounds(), (5_000, 5_000));
    }

    #[test]
    fn training_rewards_override_global_switch() {
        let mut config = RigConfig::defaults();
        assert!(!config.reward_enabled());
        config.training.enabled = true;
        assert!(config.reward_enabled());
        config.training.rewarded = false;
        assert!(!config.reward_enabled());
    }
}

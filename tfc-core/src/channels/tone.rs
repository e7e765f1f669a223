//! Auditory cue channel.
//!
//! A tone is a carrier gated by an envelope. The envelope is either on for the
//! whole auditory window or a [`PulseTrain`] of `pulse_ms` out of every
//! `cycle_ms`. The carrier comes from a hardware timer when the board has one
//! on the pin, otherwise the channel toggles the line itself every half
//! period.

use super::LineDrive;
use super::pulse::PulseTrain;
use crate::config::ConfigError;
use crate::time::{Instant, Level, Millis};

/// Largest accepted gap between the requested and the produced software
/// carrier frequency.
pub const SOFTWARE_FREQUENCY_TOLERANCE_HZ: u32 = 1;

/// Where the square wave comes from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ToneCarrier {
    /// Timer output; the driver receives [`LineDrive::Tone`].
    Hardware,
    /// Toggled from the tick loop; the driver receives plain levels.
    SoftwarePwm,
}

/// On/off shape of the cue within its window.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ToneEnvelope {
    Continuous,
    Pulsed { pulse_ms: Millis, cycle_ms: Millis },
}

impl ToneEnvelope {
    /// Replaces the on-time, turning a continuous envelope into a pulsed one.
    #[must_use]
    pub const fn with_pulse_ms(self, pulse_ms: Millis) -> Self {
        match self {
            ToneEnvelope::Continuous => ToneEnvelope::Pulsed {
                pulse_ms,
                cycle_ms: pulse_ms,
            },
            ToneEnvelope::Pulsed { cycle_ms, .. } => ToneEnvelope::Pulsed { pulse_ms, cycle_ms },
        }
    }

    /// Replaces the cycle length, turning a continuous envelope into a pulsed one.
    #[must_use]
    pub const fn with_cycle_ms(self, cycle_ms: Millis) -> Self {
        match self {
            ToneEnvelope::Continuous => ToneEnvelope::Pulsed {
                pulse_ms: cycle_ms,
                cycle_ms,
            },
            ToneEnvelope::Pulsed { pulse_ms, .. } => ToneEnvelope::Pulsed { pulse_ms, cycle_ms },
        }
    }

    fn train(self, window_start: Instant, window_ms: Millis) -> PulseTrain {
        let single = PulseTrain::single(window_start, window_ms);
        match self {
            ToneEnvelope::Continuous => single,
            ToneEnvelope::Pulsed { pulse_ms, cycle_ms } => PulseTrain::new(
                window_start,
                pulse_ms,
                cycle_ms.saturating_sub(pulse_ms),
                window_ms,
            )
            .unwrap_or(single),
        }
    }
}

/// Static description of one cue.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ToneSettings {
    pub frequency_hz: u32,
    /// Scales the software half period; `50` lands within a hertz of `frequency_hz`.
    pub duty_percent: u8,
    pub carrier: ToneCarrier,
    pub envelope: ToneEnvelope,
}

impl ToneSettings {
    /// Software PWM half period in whole milliseconds.
    ///
    /// The same half period is used for the high and the low phase, so the
    /// duty setting shifts the carrier frequency rather than its duty.
    #[must_use]
    pub const fn half_period_ms(&self) -> Millis {
        if self.frequency_hz == 0 {
            return 0;
        }
        10 * self.duty_percent as u32 / self.frequency_hz
    }

    /// Rejects settings that cannot produce an audible cue.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.frequency_hz == 0 {
            return Err(ConfigError::InvalidFrequency {
                frequency_hz: self.frequency_hz,
            });
        }
        if self.duty_percent == 0 || self.duty_percent > 100 {
            return Err(ConfigError::InvalidDutyCycle(self.duty_percent));
        }
        if let ToneEnvelope::Pulsed { pulse_ms, cycle_ms } = self.envelope
            && (pulse_ms == 0 || pulse_ms > cycle_ms)
        {
            return Err(ConfigError::InvalidTonePattern { pulse_ms, cycle_ms });
        }
        if !matches!(self.carrier, ToneCarrier::SoftwarePwm) {
            return Ok(());
        }
        let balanced_half_ms = 500 / self.frequency_hz;
        if balanced_half_ms == 0 || self.half_period_ms() == 0 {
            return Err(ConfigError::FrequencyTooHigh {
                frequency_hz: self.frequency_hz,
            });
        }
        // At duty 50 the carrier runs at exactly 500 / half cycles per second.
        let error_scaled = 500u32.abs_diff(self.frequency_hz * balanced_half_ms);
        if error_scaled > SOFTWARE_FREQUENCY_TOLERANCE_HZ * balanced_half_ms {
            return Err(ConfigError::FrequencyNotRepresentable {
                frequency_hz: self.frequency_hz,
                achieved_hz: (1_000 + balanced_half_ms) / (2 * balanced_half_ms),
            });
        }
        Ok(())
    }
}

/// Runtime state for one tone output.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ToneChannel {
    settings: ToneSettings,
    envelope: Option<PulseTrain>,
    carrier_level: Level,
    last_toggle: Option<Instant>,
}

impl ToneChannel {
    pub const fn new(settings: ToneSettings) -> Result<Self, ConfigError> {
        if let Err(error) = settings.validate() {
            return Err(error);
        }
        Ok(Self {
            settings,
            envelope: None,
            carrier_level: Level::Low,
            last_toggle: None,
        })
    }

    #[must_use]
    pub const fn settings(&self) -> &ToneSettings {
        &self.settings
    }

    /// Schedules the cue for `window_ms` starting at `window_start`.
    pub fn activate(&mut self, window_start: Instant, window_ms: Millis) {
        self.envelope = Some(self.settings.envelope.train(window_start, window_ms));
        self.reset_carrier();
    }

    /// Cancels any scheduled or sounding cue.
    pub fn deactivate(&mut self) {
        self.envelope = None;
        self.reset_carrier();
    }

    /// Returns `true` while a cue is scheduled, even if not yet sounding.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.envelope.is_some()
    }

    /// Returns `true` while the envelope is on.
    #[must_use]
    pub fn is_sounding(&self, now: Instant) -> bool {
        self.envelope
            .is_some_and(|envelope| envelope.level_at(now).is_high())
    }

    /// Advances the carrier and returns what the line should do at `now`.
    pub fn tick(&mut self, now: Instant) -> LineDrive {
        if !self.is_sounding(now) {
            self.reset_carrier();
            return LineDrive::Low;
        }

        match self.settings.carrier {
            ToneCarrier::Hardware => LineDrive::Tone {
                frequency_hz: self.settings.frequency_hz,
            },
            ToneCarrier::SoftwarePwm => {
                match self.last_toggle {
                    None => {
                        self.carrier_level = Level::High;
                        self.last_toggle = Some(now);
                    }
                    Some(last) if now.elapsed_since(last) >= self.settings.half_period_ms() => {
                        self.carrier_level = !self.carrier_level;
                        self.last_toggle = Some(now);
                    }
                    Some(_) => {}
                }
                self.carrier_level.into()
            }
        }
    }

    fn reset_carrier(&mut self) {
        self.carrier_level = Level::Low;
        self.last_toggle = None;
    }
}

//! Text overrides for [`RigConfig`].
//!
//! Operators tune a rig by listing `KEY = value` lines using the constant names
//! from the rig headers (`MIN_ITI`, `AIR_PUFF_START_TIME`, ...). C declarations
//! (`const long MIN_ITI = 60000;`) and `#define KEY VALUE` lines are accepted as
//! well, so an existing `trial.h` can be fed in unchanged. `//` starts a
//! comment; other preprocessor lines are skipped.

use core::fmt;

use winnow::ascii::{dec_uint, digit1, space0, space1};
use winnow::combinator::{alt, delimited, opt, preceded};
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::{take_till, take_while};

use super::RigConfig;
use crate::channels::sync::RigRole;
use crate::trial::{TrialSelection, TrialTypeId};

/// Keys from the original headers that have no runtime effect here.
const IGNORED_KEYS: [&str; 7] = [
    "BAUD_RATE",
    "AUDITORY_BUFFER",
    "POSITIVE_DURATION",
    "N_DEBUG_CYCLES",
    "DEBUG_CYCLE_DURATION",
    "DEBUG_TEST_SECONDARY",
    "CONFIG_VERSION",
];

/// Failure while applying an override line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct OverrideError<'a> {
    /// 1-based line number.
    pub line: usize,
    pub kind: OverrideErrorKind<'a>,
}

/// What went wrong on an override line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OverrideErrorKind<'a> {
    /// The line is not an assignment.
    Syntax,
    /// The key names no known setting.
    UnknownKey(&'a str),
    /// The value does not fit the setting named by the key.
    InvalidValue(&'a str),
}

impl fmt::Display for OverrideError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            OverrideErrorKind::Syntax => write!(f, "line {}: expected KEY = value", self.line),
            OverrideErrorKind::UnknownKey(key) => {
                write!(f, "line {}: unknown setting `{key}`", self.line)
            }
            OverrideErrorKind::InvalidValue(key) => {
                write!(f, "line {}: invalid value for `{key}`", self.line)
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Value<'a> {
    Flag(bool),
    Number(u32),
    Percent(u32),
    Label(&'a str),
}

/// Applies every override in `text` to `config`.
///
/// Returns the number of settings changed. The config is not validated here;
/// call [`RigConfig::validate`] once all overrides are in.
pub fn apply_overrides<'a>(
    text: &'a str,
    config: &mut RigConfig,
) -> Result<usize, OverrideError<'a>> {
    let mut applied = 0;
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let code = raw.split("//").next().unwrap_or_default().trim();
        let parsed = if code.is_empty() {
            None
        } else if code.starts_with("#define") {
            // Bare `#define NAME` guards carry no setting.
            define.parse(code).transpose()
        } else if code.starts_with('#') {
            None
        } else {
            Some(assignment.parse(code))
        };

        let Some(parsed) = parsed else {
            continue;
        };
        let (key, value) = parsed.map_err(|_| OverrideError {
            line,
            kind: OverrideErrorKind::Syntax,
        })?;

        if IGNORED_KEYS.contains(&key) {
            continue;
        }
        apply(config, key, value).map_err(|kind| OverrideError { line, kind })?;
        applied += 1;
    }
    Ok(applied)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_label_char(c: char) -> bool {
    is_ident_char(c) || c == '+' || c == '-'
}

fn define<'a>(input: &mut &'a str) -> Result<Option<(&'a str, Value<'a>)>, ContextError> {
    preceded(
        ("#define", space1),
        (
            take_while(1.., is_ident_char),
            opt(preceded(space1, value)),
            space0,
        ),
    )
    .map(|(key, value, _)| value.map(|value| (key, value)))
    .parse_next(input)
}

fn assignment<'a>(input: &mut &'a str) -> Result<(&'a str, Value<'a>), ContextError> {
    let target = take_till(1.., '=').parse_next(input)?;
    ('=', space0).parse_next(input)?;
    let value = value.parse_next(input)?;
    (space0, opt(';'), space0).parse_next(input)?;

    match declared_name(target) {
        Some(key) => Ok((key, value)),
        None => Err(ContextError::new()),
    }
}

/// Extracts the setting name from `KEY` or `const <type...> KEY`.
fn declared_name(target: &str) -> Option<&str> {
    let mut words = target.split_whitespace();
    let name = words.next_back()?.trim_start_matches('*');
    match words.next() {
        None | Some("const") => {}
        Some(_) => return None,
    }
    if !name.is_empty() && name.chars().all(is_ident_char) {
        Some(name)
    } else {
        None
    }
}

fn value<'a>(input: &mut &'a str) -> Result<Value<'a>, ContextError> {
    alt((
        "true".value(Value::Flag(true)),
        "false".value(Value::Flag(false)),
        ratio.map(Value::Percent),
        dec_uint::<_, u32, _>.map(Value::Number),
        delimited('"', take_while(1.., is_label_char), '"').map(Value::Label),
        take_while(1.., is_label_char).map(Value::Label),
    ))
    .parse_next(input)
}

/// `0.8` style ratios, kept to hundredths.
fn ratio(input: &mut &str) -> Result<u32, ContextError> {
    let (whole, fraction) =
        (dec_uint::<_, u32, _>, preceded('.', digit1)).parse_next(input)?;
    let mut digits = fraction.bytes().map(|digit| u32::from(digit - b'0'));
    let tenths = digits.next().unwrap_or(0);
    let hundredths = digits.next().unwrap_or(0);
    Ok(whole
        .saturating_mul(100)
        .saturating_add(tenths * 10 + hundredths))
}

fn apply<'a>(
    config: &mut RigConfig,
    key: &'a str,
    value: Value<'a>,
) -> Result<(), OverrideErrorKind<'a>> {
    let invalid = OverrideErrorKind::InvalidValue(key);
    let millis = || number(value).ok_or(invalid);
    let switch = || flag(value).ok_or(invalid);

    match key {
        "NUMBER_OF_TRIALS" => {
            config.session.number_of_trials = narrow(value).ok_or(invalid)?;
        }
        "MIN_ITI" => config.session.min_iti_ms = millis()?,
        "MAX_ITI" => config.session.max_iti_ms = millis()?,
        "TRIAL_DURATION" => config.session.trial_duration_ms = millis()?,
        "POST_LAST_TRIAL_INTERVAL" => config.session.post_last_trial_interval_ms = millis()?,
        "TRIAL_TYPE_1" => {
            let negative = trial_type(value).ok_or(invalid)?;
            config.session.selection = match config.session.selection {
                TrialSelection::Ratio {
                    positive,
                    positive_percent,
                    ..
                } => TrialSelection::Ratio {
                    positive,
                    negative,
                    positive_percent,
                },
                _ => TrialSelection::Ratio {
                    positive: TrialTypeId::PuffPositive,
                    negative,
                    positive_percent: super::DEFAULT_CS_PLUS_PERCENT,
                },
            };
        }
        "TRIAL_TYPE_2" => {
            let positive = trial_type(value).ok_or(invalid)?;
            config.session.selection = match config.session.selection {
                TrialSelection::Ratio {
                    negative,
                    positive_percent,
                    ..
                } => TrialSelection::Ratio {
                    positive,
                    negative,
                    positive_percent,
                },
                _ => TrialSelection::Ratio {
                    positive,
                    negative: TrialTypeId::NoPuffNegative,
                    positive_percent: super::DEFAULT_CS_PLUS_PERCENT,
                },
            };
        }
        "CS_PLUS_RATIO" => {
            let percent = percent(value).ok_or(invalid)?;
            if let TrialSelection::Ratio {
                positive_percent, ..
            } = &mut config.session.selection
            {
                *positive_percent = percent;
            } else {
                return Err(invalid);
            }
        }
        "DEBUGGING" => config.debug.enabled = switch()?,
        "INTER_TRIAL_DEBUG_WAIT_INTERVAL" => config.debug.inter_trial_wait_ms = millis()?,
        "IS_TRAINING" => config.training.enabled = switch()?,
        "TRAINING_TRIALS_ARE_REWARDED" => config.training.rewarded = switch()?,
        "RIG_PERIODIC_RESET_TIME" => config.periodic_reset_ms = millis()?,
        "LATE_TICK_BOUND" => config.late_tick_ms = millis()?,
        "IS_PRIMARY_RIG" => {
            config.sync.role = if switch()? {
                RigRole::Primary
            } else {
                RigRole::Secondary
            };
        }
        "SECONDARY_PIN_PAUSE" => config.sync.pulse_ms = millis()?,
        "SECONDARY_RIG_PAUSE_OFFSET" => config.sync.offset_ms = millis()?,
        "SECONDARY_MAX_WAIT" => config.sync.max_wait_ms = millis()?,
        "WATER_REWARD_AVAILABLE" => config.reward.water_available = switch()?,
        "WATER_DISPENSE_TIME" => config.reward.dispense_ms = millis()?,
        "WATER_TIMEOUT" => config.reward.timeout_ms = millis()?,
        "WATER_DISPENSE_ON_NUMBER_LICKS" => {
            config.reward.licks_to_dispense = narrow(value).ok_or(invalid)?;
        }
        "LICK_TIMEOUT" => config.reward.lick_timeout_ms = millis()?,
        "LICK_COUNT_TIMEOUT" => config.reward.lick_count_window_ms = millis()?,
        "USING_AIR_PUFFS" => config.air_puff.enabled = switch()?,
        "AIR_PUFF_START_TIME" => config.air_puff.start_ms = millis()?,
        "AIR_PUFF_DURATION" => config.air_puff.pulse_ms = millis()?,
        "INTER_PUFF_PAUSE_TIME" => config.air_puff.pause_ms = millis()?,
        "AIR_PUFF_TOTAL_TIME" => config.air_puff.total_ms = millis()?,
        "USING_AUDITORY_CUES" => config.auditory.enabled = switch()?,
        "AUDITORY_START" => config.auditory.start_ms = millis()?,
        "AUDITORY_STOP" => config.auditory.stop_ms = millis()?,
        "POSITIVE_FREQUENCY" => config.auditory.positive.frequency_hz = millis()?,
        "NEGATIVE_FREQUENCY" => config.auditory.negative.frequency_hz = millis()?,
        "NEGATIVE_PULSE_DURATION" => {
            config.auditory.negative.envelope = config
                .auditory
                .negative
                .envelope
                .with_pulse_ms(millis()?);
        }
        "NEGATIVE_CYCLE_DURATION" => {
            config.auditory.negative.envelope = config
                .auditory
                .negative
                .envelope
                .with_cycle_ms(millis()?);
        }
        "TONE_DUTY_CYCLE" => {
            let duty = narrow(value).ok_or(invalid)?;
            config.auditory.positive.duty_percent = duty;
            config.auditory.negative.duty_percent = duty;
        }
        _ => return Err(OverrideErrorKind::UnknownKey(key)),
    }
    Ok(())
}

fn number(value: Value<'_>) -> Option<u32> {
    match value {
        Value::Number(number) => Some(number),
        _ => None,
    }
}

fn narrow<T: TryFrom<u32>>(value: Value<'_>) -> Option<T> {
    number(value).and_then(|number| T::try_from(number).ok())
}

fn flag(value: Value<'_>) -> Option<bool> {
    match value {
        Value::Flag(flag) => Some(flag),
        Value::Number(0) => Some(false),
        Value::Number(1) => Some(true),
        _ => None,
    }
}

fn percent(value: Value<'_>) -> Option<u8> {
    let percent = match value {
        Value::Percent(percent) => percent,
        Value::Number(whole @ (0 | 1)) => whole * 100,
        _ => return None,
    };
    u8::try_from(percent).ok().filter(|percent| *percent <= 100)
}

fn trial_type(value: Value<'_>) -> Option<TrialTypeId> {
    match value {
        Value::Label(label) => {
            TrialTypeId::from_label(label).or_else(|| TrialTypeId::from_legacy_label(label))
        }
        Value::Number(id) => usize::try_from(id).ok().and_then(TrialTypeId::from_index),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::tone::ToneEnvelope;

    #[test]
    fn plain_assignments_override_defaults() {
        let mut config = RigConfig::defaults();
        let text = "MIN_ITI = 1000\nMAX_ITI=2000 // shorter for bench runs\n\nDEBUGGING = true\n";

        let applied = apply_overrides(text, &mut config).expect("overrides should apply");

        assert_eq!(applied, 3);
        assert_eq!(config.session.min_iti_ms, 1_000);
        assert_eq!(config.session.max_iti_ms, 2_000);
        assert!(config.debug.enabled);
    }

    #[test]
    fn header_declarations_are_accepted() {
        let mut config = RigConfig::defaults();
        let text = r#"
#ifndef TRIAL
#define TRIAL
#define CS_PLUS_RATIO 0.5
const bool IS_PRIMARY_RIG = false;
const long TRIAL_DURATION = 40000;
const char* TRIAL_TYPE_1 = "puff_CS-";
const int NEGATIVE_PULSE_DURATION = 500;
const int BAUD_RATE = 9600;
#endif
"#;

        apply_overrides(text, &mut config).expect("header should parse");

        assert_eq!(config.sync.role, RigRole::Secondary);
        assert_eq!(config.session.trial_duration_ms, 40_000);
        assert_eq!(
            config.session.selection,
            TrialSelection::Ratio {
                positive: TrialTypeId::PuffPositive,
                negative: TrialTypeId::PuffNegative,
                positive_percent: 50,
            }
        );
        assert_eq!(
            config.auditory.negative.envelope,
            ToneEnvelope::Pulsed {
                pulse_ms: 500,
                cycle_ms: 2_000
            }
        );
    }

    #[test]
    fn bare_defines_are_skipped() {
        let mut config = RigConfig::defaults();
        let text = "#ifndef RIG\n#define RIG\n#define MIN_ITI 2000\n#endif\n";

        assert_eq!(apply_overrides(text, &mut config), Ok(1));
        assert_eq!(config.session.min_iti_ms, 2_000);

        let error = apply_overrides("#define MIN_ITI 2000 3000", &mut config)
            .expect_err("trailing tokens");
        assert_eq!(error.kind, OverrideErrorKind::Syntax);
    }

    #[test]
    fn unknown_keys_report_their_line() {
        let mut config = RigConfig::defaults();
        let error = apply_overrides("MIN_ITI = 10\nPUFF_COLOR = 3\n", &mut config)
            .expect_err("unknown key should be rejected");

        assert_eq!(error.line, 2);
        assert_eq!(error.kind, OverrideErrorKind::UnknownKey("PUFF_COLOR"));
    }

    #[test]
    fn mistyped_values_are_rejected() {
        let mut config = RigConfig::defaults();
        let error = apply_overrides("WATER_TIMEOUT = true", &mut config)
            .expect_err("flag is not a duration");
        assert_eq!(error.kind, OverrideErrorKind::InvalidValue("WATER_TIMEOUT"));

        let error = apply_overrides("MIN_ITI 60000", &mut config)
            .expect_err("missing equals sign");
        assert_eq!(error.kind, OverrideErrorKind::Syntax);

        let error = apply_overrides("CS_PLUS_RATIO = 1.5", &mut config)
            .expect_err("ratio above one");
        assert_eq!(error.kind, OverrideErrorKind::InvalidValue("CS_PLUS_RATIO"));
    }
}

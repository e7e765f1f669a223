//! Rig configuration and the glue between embassy time and the core clock.
//!
//! The firmware boots with a compiled-in [`RigConfig`]; a follower rig is
//! built with the `secondary` feature. Everything here is portable so the
//! host build can exercise it without a time driver.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use tfc_core::channels::{DigitalInput, InputSample};
use tfc_core::config::RigConfig;
use tfc_core::time::{Instant, Level};

/// Configuration the rig runs with.
#[cfg(not(feature = "secondary"))]
pub static RIG_CONFIG: RigConfig = RigConfig::defaults();

/// Configuration the rig runs with.
#[cfg(feature = "secondary")]
pub static RIG_CONFIG: RigConfig = RigConfig::secondary_defaults();

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Truncates an embassy instant to the wrapping 32-bit millisecond counter.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn to_rig_instant(instant: embassy_time::Instant) -> Instant {
    Instant::from_millis(instant.as_millis() as u32)
}

/// [`Clock`](tfc_core::time::Clock) backed by the embassy time driver.
#[derive(Copy, Clone, Debug, Default)]
pub struct EmbassyClock;

#[cfg(target_os = "none")]
impl tfc_core::time::Clock for EmbassyClock {
    fn now(&self) -> Instant {
        to_rig_instant(embassy_time::Instant::now())
    }
}

/// Seed for the session RNG: FNV-1a over the device UID and the trigger time.
#[must_use]
pub fn session_seed(uid: &[u8; 12], trigger: embassy_time::Instant) -> u64 {
    uid.iter()
        .chain(trigger.as_micros().to_le_bytes().iter())
        .fold(FNV_OFFSET, |seed, byte| {
            (seed ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
        })
}

/// Digital inputs sampled once per loop iteration.
///
/// `sync` is only wired on follower rigs.
pub struct InputPins<I> {
    pub lick: I,
    pub session_button: I,
    pub sync: Option<I>,
}

impl<I: DigitalInput> InputPins<I> {
    pub fn sample(&mut self) -> InputSample {
        InputSample {
            lick: self.lick.read(),
            sync: self.sync.as_mut().map_or(Level::Low, DigitalInput::read),
            session_trigger: self.session_button.read(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedInput(Level);

    impl DigitalInput for FixedInput {
        fn read(&mut self) -> Level {
            self.0
        }
    }

    #[test]
    fn rig_instant_wraps_like_hardware_counter() {
        let later = embassy_time::Instant::from_millis(u64::from(u32::MAX) + 11);
        assert_eq!(to_rig_instant(later), Instant::from_millis(10));
        assert_eq!(
            to_rig_instant(embassy_time::Instant::from_millis(1_234)),
            Instant::from_millis(1_234)
        );
    }

    #[test]
    fn seed_depends_on_uid_and_trigger_time() {
        let uid = [7_u8; 12];
        let mut other_uid = uid;
        other_uid[11] = 8;
        let at = embassy_time::Instant::from_micros(5_000);

        assert_eq!(session_seed(&uid, at), session_seed(&uid, at));
        assert_ne!(
            session_seed(&uid, at),
            session_seed(&uid, embassy_time::Instant::from_micros(5_001))
        );
        assert_ne!(session_seed(&uid, at), session_seed(&other_uid, at));
    }

    #[test]
    fn unwired_sync_reads_low() {
        let mut pins = InputPins {
            lick: FixedInput(Level::High),
            session_button: FixedInput(Level::Low),
            sync: None,
        };

        assert_eq!(
            pins.sample(),
            InputSample {
                lick: Level::High,
                ..InputSample::IDLE
            }
        );

        pins.sync = Some(FixedInput(Level::High));
        assert_eq!(pins.sample().sync, Level::High);
    }

    #[test]
    fn compiled_config_is_valid() {
        assert_eq!(RIG_CONFIG.validate(), Ok(()));
    }
}

//! Output lines, driver seam and the per-stimulus channel state machines.
//!
//! Channels never touch hardware. Each one turns the current [`Instant`](crate::time::Instant) into a
//! desired [`LineDrive`]; the scheduler pushes those through an
//! [`OutputLatch`] which forwards only changes to the [`RigDriver`]. The
//! firmware implements the driver over GPIO and timer PWM, the emulator over a
//! recording stub.

use crate::time::Level;

pub mod lick;
pub mod pulse;
pub mod puff;
pub mod sync;
pub mod tone;
pub mod water;

pub use lick::{LICK_WINDOW_CAPACITY, LickDebouncer};
pub use pulse::PulseTrain;
pub use puff::PuffChannel;
pub use sync::{LinkError, RigRole, SecondaryLink, SyncEvent};
pub use tone::{ToneCarrier, ToneChannel, ToneEnvelope, ToneSettings};
pub use water::{WaterChannel, WaterState};

/// Number of entries in [`ALL_LINES`].
pub const OUTPUT_LINE_COUNT: usize = 5;

/// Logical output lines driven by the rig.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputLine {
    TonePositive,
    ToneNegative,
    AirPuff,
    Water,
    Sync,
}

impl OutputLine {
    /// Deterministic index for lookups into [`ALL_LINES`].
    #[must_use]
    pub const fn as_index(self) -> usize {
        match self {
            OutputLine::TonePositive => 0,
            OutputLine::ToneNegative => 1,
            OutputLine::AirPuff => 2,
            OutputLine::Water => 3,
            OutputLine::Sync => 4,
        }
    }

    /// Attempts to construct an [`OutputLine`] from a raw index.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(OutputLine::TonePositive),
            1 => Some(OutputLine::ToneNegative),
            2 => Some(OutputLine::AirPuff),
            3 => Some(OutputLine::Water),
            4 => Some(OutputLine::Sync),
            _ => None,
        }
    }

    /// Returns the board metadata for this line.
    #[must_use]
    pub const fn info(self) -> LineInfo {
        ALL_LINES[self.as_index()]
    }
}

impl core::fmt::Display for OutputLine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.info().name)
    }
}

/// How a line is routed on the rig.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LineInfo {
    pub line: OutputLine,
    pub name: &'static str,
    /// Pin number on the legacy Arduino shield, kept for wiring notes.
    pub legacy_pin: u8,
    /// Pin on the STM32 rig board.
    pub mcu_pin: &'static str,
}

impl LineInfo {
    const fn new(line: OutputLine, name: &'static str, legacy_pin: u8, mcu_pin: &'static str) -> Self {
        Self {
            line,
            name,
            legacy_pin,
            mcu_pin,
        }
    }
}

/// Compile-time catalog of every output line.
pub const ALL_LINES: [LineInfo; OUTPUT_LINE_COUNT] = [
    LineInfo::new(OutputLine::TonePositive, "tone+", 10, "PA6"),
    LineInfo::new(OutputLine::ToneNegative, "tone-", 9, "PA0"),
    LineInfo::new(OutputLine::AirPuff, "air-puff", 4, "PB3"),
    LineInfo::new(OutputLine::Water, "water", 5, "PB4"),
    LineInfo::new(OutputLine::Sync, "sync", 6, "PB5"),
];

/// What a line should be doing right now.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LineDrive {
    Low,
    High,
    /// Square wave produced by a hardware timer.
    Tone { frequency_hz: u32 },
}

impl LineDrive {
    /// Returns `true` unless the line is held low.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, LineDrive::Low)
    }
}

impl From<Level> for LineDrive {
    fn from(level: Level) -> Self {
        match level {
            Level::Low => LineDrive::Low,
            Level::High => LineDrive::High,
        }
    }
}

/// Abstraction over the physical output drivers.
pub trait RigDriver {
    /// Applies the requested drive to the line.
    fn drive(&mut self, line: OutputLine, drive: LineDrive);

    /// Forces every output line low.
    fn release_all(&mut self);
}

/// Rig driver that performs no hardware interaction.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopRigDriver;

impl NoopRigDriver {
    /// Creates a new no-op rig driver.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl RigDriver for NoopRigDriver {
    fn drive(&mut self, _: OutputLine, _: LineDrive) {}

    fn release_all(&mut self) {}
}

/// Single push-pull output pin.
pub trait DigitalOutput {
    fn set(&mut self, level: Level);
}

/// Single input pin.
pub trait DigitalInput {
    fn read(&mut self) -> Level;
}

/// Hardware square-wave generator bound to one pin.
pub trait ToneGenerator {
    fn start(&mut self, frequency_hz: u32);
    fn stop(&mut self);
}

/// [`RigDriver`] assembled from per-pin capabilities.
///
/// Tone lines accept both plain levels (software PWM) and hardware tones.
/// Rigs without a sync wire pass `None`.
pub struct PinDriver<O, TP, TN> {
    pub air_puff: O,
    pub water: O,
    pub sync: Option<O>,
    pub tone_positive: TP,
    pub tone_negative: TN,
}

impl<O, TP, TN> PinDriver<O, TP, TN>
where
    O: DigitalOutput,
    TP: DigitalOutput + ToneGenerator,
    TN: DigitalOutput + ToneGenerator,
{
    fn drive_tone<T: DigitalOutput + ToneGenerator>(pin: &mut T, drive: LineDrive) {
        match drive {
            LineDrive::Tone { frequency_hz } => pin.start(frequency_hz),
            LineDrive::High => {
                pin.stop();
                pin.set(Level::High);
            }
            LineDrive::Low => {
                pin.stop();
                pin.set(Level::Low);
            }
        }
    }

    fn level(drive: LineDrive) -> Level {
        Level::from_active(drive.is_active())
    }
}

impl<O, TP, TN> RigDriver for PinDriver<O, TP, TN>
where
    O: DigitalOutput,
    TP: DigitalOutput + ToneGenerator,
    TN: DigitalOutput + ToneGenerator,
{
    fn drive(&mut self, line: OutputLine, drive: LineDrive) {
        match line {
            OutputLine::TonePositive => Self::drive_tone(&mut self.tone_positive, drive),
            OutputLine::ToneNegative => Self::drive_tone(&mut self.tone_negative, drive),
            OutputLine::AirPuff => self.air_puff.set(Self::level(drive)),
            OutputLine::Water => self.water.set(Self::level(drive)),
            OutputLine::Sync => {
                if let Some(sync) = self.sync.as_mut() {
                    sync.set(Self::level(drive));
                }
            }
        }
    }

    fn release_all(&mut self) {
        for info in &ALL_LINES {
            self.drive(info.line, LineDrive::Low);
        }
    }
}

/// Last value written to each line; forwards only changes to the driver.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct OutputLatch {
    // `None` until the first write so power-on state is always overwritten.
    written: [Option<LineDrive>; OUTPUT_LINE_COUNT],
    writes: u32,
}

impl OutputLatch {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            written: [None; OUTPUT_LINE_COUNT],
            writes: 0,
        }
    }

    /// Writes `drive` if it differs from what the line last received.
    /// Returns `true` when the driver was called.
    pub fn apply<D: RigDriver>(&mut self, driver: &mut D, line: OutputLine, drive: LineDrive) -> bool {
        let slot = &mut self.written[line.as_index()];
        if *slot == Some(drive) {
            return false;
        }
        *slot = Some(drive);
        self.writes = self.writes.wrapping_add(1);
        driver.drive(line, drive);
        true
    }

    /// Drives every line low. Lines already low are left alone.
    pub fn force_all_low<D: RigDriver>(&mut self, driver: &mut D) {
        for info in &ALL_LINES {
            self.apply(driver, info.line, LineDrive::Low);
        }
    }

    /// Last drive written to `line`, if any.
    #[must_use]
    pub fn current(&self, line: OutputLine) -> Option<LineDrive> {
        self.written[line.as_index()]
    }

    /// Returns `true` when the line was last driven to anything but low.
    #[must_use]
    pub fn is_active(&self, line: OutputLine) -> bool {
        self.current(line).is_some_and(LineDrive::is_active)
    }

    /// Total driver calls issued through this latch.
    #[must_use]
    pub const fn writes(&self) -> u32 {
        self.writes
    }
}

/// One sample of every digital input.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct InputSample {
    pub lick: Level,
    pub sync: Level,
    pub session_trigger: Level,
}

impl InputSample {
    /// All inputs low.
    pub const IDLE: Self = Self {
        lick: Level::Low,
        sync: Level::Low,
        session_trigger: Level::Low,
    };
}

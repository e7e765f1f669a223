//! Millisecond time base shared by every channel.
//!
//! The rig runs off a free-running 32-bit millisecond counter that wraps after
//! roughly 49.7 days. [`Instant`] keeps that wrapping behaviour explicit so the
//! same arithmetic is valid on the MCU and in host tests.

use core::ops::Not;

/// Duration expressed in whole milliseconds.
pub type Millis = u32;

/// Point on the wrapping millisecond counter.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Instant(u32);

impl Instant {
    /// Counter value at power-on.
    pub const ZERO: Self = Self(0);

    /// Wraps a raw counter reading.
    #[must_use]
    pub const fn from_millis(millis: u32) -> Self {
        Self(millis)
    }

    /// Returns the raw counter reading.
    #[must_use]
    pub const fn as_millis(self) -> u32 {
        self.0
    }

    /// Returns the instant `millis` after `self`, wrapping with the counter.
    #[must_use]
    pub const fn wrapping_add(self, millis: Millis) -> Self {
        Self(self.0.wrapping_add(millis))
    }

    /// Milliseconds elapsed from `earlier` to `self`.
    ///
    /// Only meaningful when `earlier` is not after `self`; a later `earlier`
    /// yields a huge value rather than a negative one.
    #[must_use]
    pub const fn elapsed_since(self, earlier: Self) -> Millis {
        self.0.wrapping_sub(earlier.0)
    }

    /// Signed offset of `self` relative to `origin`.
    ///
    /// Negative when `self` precedes `origin`. Correct for any pair of instants
    /// less than `i32::MAX` milliseconds apart.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn offset_from(self, origin: Self) -> i32 {
        // two's-complement reinterpretation of the wrapped difference
        self.0.wrapping_sub(origin.0) as i32
    }

    /// Returns `true` once `self` has reached `deadline`.
    #[must_use]
    pub const fn has_reached(self, deadline: Self) -> bool {
        self.offset_from(deadline) >= 0
    }
}

/// Source of the current time. Implemented over the hardware counter on the
/// MCU and over a virtual counter in the emulator.
pub trait Clock {
    /// Returns the current counter value.
    fn now(&self) -> Instant;
}

/// Logic level of a digital line.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Level {
    #[default]
    Low,
    High,
}

impl Level {
    /// Returns `true` for [`Level::High`].
    #[must_use]
    pub const fn is_high(self) -> bool {
        matches!(self, Level::High)
    }

    /// Converts an "active" flag into a level.
    #[must_use]
    pub const fn from_active(active: bool) -> Self {
        if active { Level::High } else { Level::Low }
    }
}

impl Not for Level {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

impl From<bool> for Level {
    fn from(value: bool) -> Self {
        Level::from_active(value)
    }
}

/// Reports low-to-high transitions in a sampled signal.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct EdgeDetector {
    previous: Level,
}

impl EdgeDetector {
    /// Creates a detector that treats the line as initially low.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            previous: Level::Low,
        }
    }

    /// Feeds one sample; returns `true` when it completes a rising edge.
    pub fn rising(&mut self, sample: Level) -> bool {
        let rose = !self.previous.is_high() && sample.is_high();
        self.previous = sample;
        rose
    }

    /// Forgets the previous sample.
    pub fn reset(&mut self) {
        self.previous = Level::Low;
    }
}

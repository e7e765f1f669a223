//! Primary/secondary trial alignment over a single wire.
//!
//! The primary raises the sync line for `pulse_ms` at every trial start. A
//! secondary waits for that rising edge during its inter-trial interval and
//! starts its own trial `offset_ms` later. If no edge arrives within
//! `max_wait_ms` the secondary falls back to its own interval and reports the
//! link as degraded.

use core::fmt;

use super::pulse::PulseTrain;
use crate::config::SyncConfig;
use crate::time::{EdgeDetector, Instant, Level, Millis};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RigRole {
    Primary,
    Secondary,
}

impl fmt::Display for RigRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RigRole::Primary => f.write_str("primary"),
            RigRole::Secondary => f.write_str("secondary"),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LinkError {
    /// The operation belongs to the other role.
    WrongRole,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Outcome of waiting for the primary.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SyncEvent {
    /// Edge seen; the local trial should begin at `trial_start`.
    Edge { trial_start: Instant },
    /// No edge within the maximum wait.
    TimedOut,
}

/// Either end of the sync wire, depending on [`RigRole`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SecondaryLink {
    role: RigRole,
    pulse_ms: Millis,
    offset_ms: Millis,
    max_wait_ms: Millis,
    pulse: Option<PulseTrain>,
    wait_started: Option<Instant>,
    edges: EdgeDetector,
    degraded: bool,
    observed_at: Option<Instant>,
}

impl SecondaryLink {
    #[must_use]
    pub const fn new(config: &SyncConfig) -> Self {
        Self {
            role: config.role,
            pulse_ms: config.pulse_ms,
            offset_ms: config.offset_ms,
            max_wait_ms: config.max_wait_ms,
            pulse: None,
            wait_started: None,
            edges: EdgeDetector::new(),
            degraded: false,
            observed_at: None,
        }
    }

    #[must_use]
    pub const fn role(&self) -> RigRole {
        self.role
    }

    /// Starts the sync pulse. Primary only.
    pub fn signal(&mut self, now: Instant) -> Result<(), LinkError> {
        if self.role != RigRole::Primary {
            return Err(LinkError::WrongRole);
        }
        self.pulse = Some(PulseTrain::single(now, self.pulse_ms));
        Ok(())
    }

    /// Level of the outgoing sync line at `now`.
    pub fn tick(&mut self, now: Instant) -> Level {
        let Some(pulse) = self.pulse else {
            return Level::Low;
        };
        if pulse.is_exhausted(now) {
            self.pulse = None;
            return Level::Low;
        }
        pulse.level_at(now)
    }

    /// Starts listening for the primary's edge. Secondary only.
    pub fn begin_wait(&mut self, now: Instant) {
        if self.role == RigRole::Secondary {
            self.wait_started = Some(now);
            self.degraded = false;
        }
    }

    #[must_use]
    pub const fn is_waiting(&self) -> bool {
        self.wait_started.is_some()
    }

    /// Records an observed edge and returns when the local trial should start.
    pub fn on_edge(&mut self, now: Instant) -> Instant {
        self.observed_at = Some(now);
        self.wait_started = None;
        now.wrapping_add(self.offset_ms)
    }

    /// Samples the incoming sync line while waiting.
    pub fn poll(&mut self, now: Instant, raw: Level) -> Option<SyncEvent> {
        if self.role != RigRole::Secondary {
            return None;
        }
        let rose = self.edges.rising(raw);
        let started = self.wait_started?;

        if rose {
            return Some(SyncEvent::Edge {
                trial_start: self.on_edge(now),
            });
        }
        if now.elapsed_since(started) >= self.max_wait_ms {
            self.wait_started = None;
            self.degraded = true;
            return Some(SyncEvent::TimedOut);
        }
        None
    }

    /// Returns `true` when the last wait ended without an edge.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// When the last edge was seen.
    #[must_use]
    pub const fn observed_at(&self) -> Option<Instant> {
        self.observed_at
    }

    /// Drops any outgoing pulse and pending wait.
    pub fn release(&mut self) {
        self.pulse = None;
        self.wait_started = None;
    }
}

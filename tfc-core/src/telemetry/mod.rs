//! Session event log shared by firmware and host targets.
//!
//! The scheduler records every state change and output activation into a
//! fixed-size ring. Consumers (the firmware log task, the emulator printer)
//! keep their own read cursor and drain new records with
//! [`TelemetryRecorder::unread_since`]; records overwritten before they were
//! read are reported through [`TelemetryRecorder::dropped_since`].

use core::fmt;

use heapless::HistoryBuf;

use crate::channels::OutputLine;
use crate::time::{Instant, Millis};
use crate::trial::TrialTypeId;

/// Identifier used when tracking emitted telemetry events.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 128;

/// Discriminated telemetry events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RigEventKind {
    SessionStarted,
    IntervalStarted,
    TrialStarted,
    TrialEnded,
    SessionComplete,
    LineActivated(OutputLine),
    LineReleased(OutputLine),
    LickAccepted,
    SyncSent,
    SyncObserved,
    SyncDegraded,
    /// A tick arrived later than the configured bound while a timed line was on.
    TickLate,
    ResetRequested,
}

impl fmt::Display for RigEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RigEventKind::SessionStarted => f.write_str("session-started"),
            RigEventKind::IntervalStarted => f.write_str("interval-started"),
            RigEventKind::TrialStarted => f.write_str("trial-started"),
            RigEventKind::TrialEnded => f.write_str("trial-ended"),
            RigEventKind::SessionComplete => f.write_str("session-complete"),
            RigEventKind::LineActivated(line) => write!(f, "line-activated {line}"),
            RigEventKind::LineReleased(line) => write!(f, "line-released {line}"),
            RigEventKind::LickAccepted => f.write_str("lick-accepted"),
            RigEventKind::SyncSent => f.write_str("sync-sent"),
            RigEventKind::SyncObserved => f.write_str("sync-observed"),
            RigEventKind::SyncDegraded => f.write_str("sync-degraded"),
            RigEventKind::TickLate => f.write_str("tick-late"),
            RigEventKind::ResetRequested => f.write_str("reset-requested"),
        }
    }
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryPayload {
    /// No additional metadata accompanies the event.
    None,
    Trial { index: u16, trial_type: TrialTypeId },
    Interval { duration_ms: Millis },
    Lick { count: u8 },
    Sync { trial_start: Instant },
}

impl fmt::Display for TelemetryPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryPayload::None => Ok(()),
            TelemetryPayload::Trial { index, trial_type } => write!(f, "{trial_type} #{index}"),
            TelemetryPayload::Interval { duration_ms } => write!(f, "{duration_ms}ms"),
            TelemetryPayload::Lick { count } => write!(f, "count={count}"),
            TelemetryPayload::Sync { trial_start } => {
                write!(f, "start={}ms", trial_start.as_millis())
            }
        }
    }
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TelemetryRecord {
    pub id: EventId,
    pub timestamp: Instant,
    pub event: RigEventKind,
    pub details: TelemetryPayload,
}

impl fmt::Display for TelemetryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.event)?;
        if self.details != TelemetryPayload::None {
            write!(f, " {}", self.details)?;
        }
        write!(f, " t={}ms", self.timestamp.as_millis())
    }
}

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> {
    ring: HistoryBuf<TelemetryRecord, CAPACITY>,
    next_event_id: EventId,
}

impl<const CAPACITY: usize> TelemetryRecorder<CAPACITY> {
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Records an event with the supplied payload.
    pub fn record(
        &mut self,
        event: RigEventKind,
        details: TelemetryPayload,
        timestamp: Instant,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details,
        });

        id
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> impl DoubleEndedIterator<Item = &TelemetryRecord> + '_ {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<&TelemetryRecord> {
        self.ring.recent()
    }

    /// Returns the number of records currently stored.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when no telemetry records are stored.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Identifier the next record will receive.
    #[must_use]
    pub const fn next_event_id(&self) -> EventId {
        self.next_event_id
    }

    /// Records with an id at or after `cursor`, oldest first.
    ///
    /// Pass the previous [`TelemetryRecorder::next_event_id`] as the cursor.
    pub fn unread_since(&self, cursor: EventId) -> impl Iterator<Item = &TelemetryRecord> + '_ {
        let next = self.next_event_id;
        let backlog = next.wrapping_sub(cursor);
        self.ring
            .oldest_ordered()
            .filter(move |record| next.wrapping_sub(record.id) <= backlog)
    }

    /// Records written after `cursor` that the ring has already overwritten.
    #[must_use]
    pub fn dropped_since(&self, cursor: EventId) -> u32 {
        let backlog = self.next_event_id.wrapping_sub(cursor);
        let retained = u32::try_from(self.ring.len()).unwrap_or(u32::MAX);
        backlog.saturating_sub(retained)
    }

    /// Counts stored records matching `event`.
    pub fn count(&self, event: RigEventKind) -> usize {
        self.ring
            .oldest_ordered()
            .filter(|record| record.event == event)
            .count()
    }
}

impl<const CAPACITY: usize> Default for TelemetryRecorder<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(millis: u32) -> Instant {
        Instant::from_millis(millis)
    }

    #[test]
    fn recorder_assigns_sequential_ids() {
        let mut recorder: TelemetryRecorder<4> = TelemetryRecorder::new();
        let first = recorder.record(RigEventKind::SessionStarted, TelemetryPayload::None, at(0));
        let second = recorder.record(
            RigEventKind::IntervalStarted,
            TelemetryPayload::Interval { duration_ms: 60_000 },
            at(0),
        );

        assert_eq!((first, second), (0, 1));
        assert_eq!(recorder.len(), 2);
        assert_eq!(
            recorder.latest().map(|record| record.event),
            Some(RigEventKind::IntervalStarted)
        );
    }

    #[test]
    fn cursor_drains_only_new_records_and_counts_overwrites() {
        let mut recorder: TelemetryRecorder<4> = TelemetryRecorder::new();
        for millis in 0..3 {
            recorder.record(RigEventKind::LickAccepted, TelemetryPayload::None, at(millis));
        }
        let cursor = recorder.next_event_id();
        assert_eq!(recorder.unread_since(cursor).count(), 0);

        for millis in 3..9 {
            recorder.record(RigEventKind::LickAccepted, TelemetryPayload::None, at(millis));
        }

        let unread: heapless::Vec<EventId, 4> =
            recorder.unread_since(cursor).map(|record| record.id).collect();
        assert_eq!(unread.as_slice(), &[5, 6, 7, 8]);
        assert_eq!(recorder.dropped_since(cursor), 2);
    }

    #[test]
    fn records_render_for_logs() {
        let record = TelemetryRecord {
            id: 7,
            timestamp: at(120_000),
            event: RigEventKind::TrialStarted,
            details: TelemetryPayload::Trial {
                index: 2,
                trial_type: TrialTypeId::PuffPositive,
            },
        };
        let mut rendered: heapless::String<64> = heapless::String::new();
        fmt::write(&mut rendered, format_args!("{record}")).expect("fits");

        assert_eq!(rendered.as_str(), "trial-started puff_CS+ #2 t=120000ms");
    }
}

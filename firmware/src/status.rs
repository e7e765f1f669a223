#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared status storage for the firmware target.
//!
//! The rig task publishes a few lock-free cells after every tick so other
//! contexts (the status log, a debugger) can read a [`StatusSnapshot`]
//! without borrowing the scheduler.

use portable_atomic::{AtomicBool, AtomicU8, AtomicU16, AtomicU32, Ordering};
use tfc_core::channels::OutputLine;
use tfc_core::scheduler::{SchedulerState, TickReport};

const PHASE_AWAITING: u8 = 0;
const PHASE_INTERVAL: u8 = 1;
const PHASE_TRIAL: u8 = 2;
const PHASE_COMPLETE: u8 = 3;
const PHASE_RESET: u8 = 4;

/// Bitmask of active output lines (bit == `OutputLine::as_index`).
static ACTIVE_LINES: AtomicU8 = AtomicU8::new(0);
/// Number of trials started in the current session.
static TRIAL_INDEX: AtomicU16 = AtomicU16::new(0);
/// Licks inside the counting window, saturated at `u8::MAX`.
static LICK_COUNT: AtomicU8 = AtomicU8::new(0);
static PHASE: AtomicU8 = AtomicU8::new(PHASE_AWAITING);
/// Set while a follower runs on its own interval after a missed sync edge.
static DEGRADED_SYNC: AtomicBool = AtomicBool::new(false);
static RESET_REQUESTED: AtomicBool = AtomicBool::new(false);
/// Late ticks this session while a puff or tone was on.
static LATE_TICKS: AtomicU32 = AtomicU32::new(0);

/// Coarse scheduler phase, without the timing payload.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RigPhase {
    AwaitingSession,
    InterTrialInterval,
    Trial,
    SessionComplete,
    ResetRequested,
}

impl RigPhase {
    const fn encode(self) -> u8 {
        match self {
            RigPhase::AwaitingSession => PHASE_AWAITING,
            RigPhase::InterTrialInterval => PHASE_INTERVAL,
            RigPhase::Trial => PHASE_TRIAL,
            RigPhase::SessionComplete => PHASE_COMPLETE,
            RigPhase::ResetRequested => PHASE_RESET,
        }
    }

    const fn decode(raw: u8) -> Self {
        match raw {
            PHASE_INTERVAL => RigPhase::InterTrialInterval,
            PHASE_TRIAL => RigPhase::Trial,
            PHASE_COMPLETE => RigPhase::SessionComplete,
            PHASE_RESET => RigPhase::ResetRequested,
            _ => RigPhase::AwaitingSession,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            RigPhase::AwaitingSession => "awaiting-session",
            RigPhase::InterTrialInterval => "inter-trial-interval",
            RigPhase::Trial => "trial",
            RigPhase::SessionComplete => "session-complete",
            RigPhase::ResetRequested => "reset-requested",
        }
    }
}

impl From<SchedulerState> for RigPhase {
    fn from(state: SchedulerState) -> Self {
        match state {
            SchedulerState::AwaitingSession { .. } => RigPhase::AwaitingSession,
            SchedulerState::InterTrialInterval { .. } => RigPhase::InterTrialInterval,
            SchedulerState::Trial { .. } => RigPhase::Trial,
            SchedulerState::SessionComplete { .. } => RigPhase::SessionComplete,
            SchedulerState::ResetRequested => RigPhase::ResetRequested,
        }
    }
}

/// Point-in-time copy of the published status cells.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StatusSnapshot {
    pub phase: RigPhase,
    pub active_lines: u8,
    pub trial_index: u16,
    pub lick_count: u8,
    pub degraded_sync: bool,
    pub reset_requested: bool,
    pub late_ticks: u32,
}

impl StatusSnapshot {
    #[must_use]
    pub const fn is_line_active(&self, line: OutputLine) -> bool {
        self.active_lines & (1 << line.as_index()) != 0
    }
}

/// Publishes the outcome of one scheduler tick.
pub fn record_tick(report: &TickReport, active_lines: u8, trial_index: u16, lick_count: usize) {
    PHASE.store(RigPhase::from(report.state).encode(), Ordering::Relaxed);
    ACTIVE_LINES.store(active_lines, Ordering::Relaxed);
    TRIAL_INDEX.store(trial_index, Ordering::Relaxed);
    LICK_COUNT.store(
        u8::try_from(lick_count).unwrap_or(u8::MAX),
        Ordering::Relaxed,
    );
    DEGRADED_SYNC.store(report.degraded_sync, Ordering::Relaxed);
    LATE_TICKS.store(report.late_ticks, Ordering::Relaxed);
    if report.reset_requested {
        RESET_REQUESTED.store(true, Ordering::Relaxed);
    }
}

/// Returns `true` once the watchdog has asked for a restart.
pub fn reset_requested() -> bool {
    RESET_REQUESTED.load(Ordering::Relaxed)
}

/// Builds a [`StatusSnapshot`] from the stored cells.
pub fn snapshot() -> StatusSnapshot {
    StatusSnapshot {
        phase: RigPhase::decode(PHASE.load(Ordering::Relaxed)),
        active_lines: ACTIVE_LINES.load(Ordering::Relaxed),
        trial_index: TRIAL_INDEX.load(Ordering::Relaxed),
        lick_count: LICK_COUNT.load(Ordering::Relaxed),
        degraded_sync: DEGRADED_SYNC.load(Ordering::Relaxed),
        reset_requested: reset_requested(),
        late_ticks: LATE_TICKS.load(Ordering::Relaxed),
    }
}

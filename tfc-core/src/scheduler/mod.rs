//! Session state machine that composes the channels.
//!
//! The outer loop calls [`TrialScheduler::tick`] as often as it can. Each tick
//! handles, in this order: the session trigger edge, the sync link, the lick
//! sensor, the water valve, the positive tone, the negative tone and the puff
//! valve. Nothing inside a tick waits.
//!
//! ```text
//! AwaitingSession --trigger--> InterTrialInterval <--+
//!       ^    |                        |               |
//!       |    +--watchdog--> ResetRequested            |
//!       |                             v               |
//! SessionComplete <--last trial-- Trial --trial end---+
//! ```

use core::fmt;

use rand::RngCore;

use crate::channels::{
    ALL_LINES, InputSample, LickDebouncer, LineDrive, OUTPUT_LINE_COUNT, OutputLatch, OutputLine,
    PuffChannel, RigDriver, RigRole, SecondaryLink, SyncEvent, ToneChannel, WaterChannel,
};
use crate::config::{ConfigError, RigConfig};
use crate::telemetry::{RigEventKind, TelemetryPayload, TelemetryRecorder};
use crate::time::{Clock, EdgeDetector, Instant, Millis};
use crate::trial::{SignalKind, TrialTypeId};

pub mod selection;

pub use selection::{TrialPicker, draw_interval};

/// Scheduler lifecycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SchedulerState {
    /// No session; the periodic-reset watchdog runs from `since`.
    AwaitingSession { since: Instant },
    InterTrialInterval {
        started_at: Instant,
        duration_ms: Millis,
    },
    Trial {
        started_at: Instant,
        trial_type: TrialTypeId,
    },
    /// Last trial done; holds for the post-last-trial interval.
    SessionComplete { completed_at: Instant },
    /// Watchdog fired. Terminal until the device restarts.
    ResetRequested,
}

impl SchedulerState {
    /// Returns `true` while a session is in progress.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(
            self,
            SchedulerState::InterTrialInterval { .. } | SchedulerState::Trial { .. }
        )
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::AwaitingSession { .. } => f.write_str("awaiting-session"),
            SchedulerState::InterTrialInterval { .. } => f.write_str("inter-trial-interval"),
            SchedulerState::Trial { .. } => f.write_str("trial"),
            SchedulerState::SessionComplete { .. } => f.write_str("session-complete"),
            SchedulerState::ResetRequested => f.write_str("reset-requested"),
        }
    }
}

/// Reasons a session cannot be started.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SessionError {
    AlreadyRunning,
    ResetPending,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::AlreadyRunning => f.write_str("session already running"),
            SessionError::ResetPending => f.write_str("device reset pending"),
        }
    }
}

/// Summary of one tick for the outer loop.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TickReport {
    pub state: SchedulerState,
    /// The watchdog fired; the caller must restart the device.
    pub reset_requested: bool,
    /// The current interval gave up waiting for the primary.
    pub degraded_sync: bool,
    pub trial: Option<TrialTypeId>,
    /// Late ticks seen this session while a puff or tone line was active.
    pub late_ticks: u32,
}

/// Lines whose pulse timing suffers when a tick is late.
const TIMED_LINES: [OutputLine; 3] = [
    OutputLine::AirPuff,
    OutputLine::TonePositive,
    OutputLine::ToneNegative,
];

/// Drives one rig through sessions of trials.
pub struct TrialScheduler<'a, D, R> {
    config: &'a RigConfig,
    driver: D,
    rng: R,
    latch: OutputLatch,
    active: [bool; OUTPUT_LINE_COUNT],
    tone_positive: ToneChannel,
    tone_negative: ToneChannel,
    puff: PuffChannel,
    licks: LickDebouncer,
    water: WaterChannel,
    link: SecondaryLink,
    picker: TrialPicker,
    trigger: EdgeDetector,
    state: SchedulerState,
    trial_index: u16,
    session_start: Option<Instant>,
    next_interval_ms: Millis,
    pending_start: Option<Instant>,
    degraded_syncs: u16,
    last_tick: Option<Instant>,
    late_ticks: u32,
}

impl<'a, D, R> TrialScheduler<'a, D, R>
where
    D: RigDriver,
    R: RngCore,
{
    /// Validates `config`, builds every channel and drives all lines low.
    pub fn new(config: &'a RigConfig, mut driver: D, rng: R, now: Instant) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut latch = OutputLatch::new();
        latch.force_all_low(&mut driver);

        Ok(Self {
            config,
            driver,
            rng,
            latch,
            active: [false; OUTPUT_LINE_COUNT],
            tone_positive: ToneChannel::new(config.auditory.positive)?,
            tone_negative: ToneChannel::new(config.auditory.negative)?,
            puff: PuffChannel::new(&config.air_puff)?,
            licks: LickDebouncer::from_config(&config.reward),
            water: WaterChannel::new(&config.reward, config.reward_enabled()),
            link: SecondaryLink::new(&config.sync),
            picker: TrialPicker::new(),
            trigger: EdgeDetector::new(),
            state: SchedulerState::AwaitingSession { since: now },
            trial_index: 0,
            session_start: None,
            next_interval_ms: config.session.min_iti_ms,
            pending_start: None,
            degraded_syncs: 0,
            last_tick: None,
            late_ticks: 0,
        })
    }

    /// Reads the clock and ticks.
    pub fn poll<C: Clock, const N: usize>(
        &mut self,
        clock: &C,
        inputs: InputSample,
        telemetry: &mut TelemetryRecorder<N>,
    ) -> TickReport {
        self.tick(clock.now(), inputs, telemetry)
    }

    /// Advances every channel to `now`.
    pub fn tick<const N: usize>(
        &mut self,
        now: Instant,
        inputs: InputSample,
        telemetry: &mut TelemetryRecorder<N>,
    ) -> TickReport {
        self.check_tick_gap(now, telemetry);
        let triggered = self.trigger.rising(inputs.session_trigger);
        self.advance(now, inputs, triggered, telemetry);

        if self.state != SchedulerState::ResetRequested {
            self.drive_outputs(now, inputs, telemetry);
        }

        TickReport {
            state: self.state,
            reset_requested: self.state == SchedulerState::ResetRequested,
            degraded_sync: self.link.is_degraded(),
            trial: self.current_trial(),
            late_ticks: self.late_ticks,
        }
    }

    /// Starts a session now, as if the trigger had fired.
    pub fn start_session<const N: usize>(
        &mut self,
        now: Instant,
        telemetry: &mut TelemetryRecorder<N>,
    ) -> Result<(), SessionError> {
        match self.state {
            SchedulerState::InterTrialInterval { .. } | SchedulerState::Trial { .. } => {
                return Err(SessionError::AlreadyRunning);
            }
            SchedulerState::ResetRequested => return Err(SessionError::ResetPending),
            SchedulerState::AwaitingSession { .. } | SchedulerState::SessionComplete { .. } => {}
        }

        self.trial_index = 0;
        self.degraded_syncs = 0;
        self.late_ticks = 0;
        self.session_start = Some(now);
        self.picker.rewind();
        self.licks.reset();
        telemetry.record(RigEventKind::SessionStarted, TelemetryPayload::None, now);

        let duration_ms = draw_interval(self.config, &mut self.rng);
        self.begin_interval(now, duration_ms, telemetry);
        Ok(())
    }

    /// Stops every channel and forces every line low.
    ///
    /// Unconditional with respect to channel phase. The driver is told to
    /// release every pin even when the latch already holds it low, so a pin
    /// that drifted from the latch is still pulled down. Repeated calls leave
    /// the latch and the telemetry untouched.
    pub fn deactivate_all<const N: usize>(
        &mut self,
        now: Instant,
        telemetry: &mut TelemetryRecorder<N>,
    ) {
        self.tone_positive.deactivate();
        self.tone_negative.deactivate();
        self.puff.disarm();
        self.water.force_idle();
        self.link.release();
        self.latch.force_all_low(&mut self.driver);
        self.driver.release_all();

        for info in &ALL_LINES {
            let slot = &mut self.active[info.line.as_index()];
            if *slot {
                *slot = false;
                telemetry.record(
                    RigEventKind::LineReleased(info.line),
                    TelemetryPayload::None,
                    now,
                );
            }
        }
    }

    /// Counts a late tick when the gap since the previous one exceeds the
    /// bound while a timed line was left on across it.
    fn check_tick_gap<const N: usize>(&mut self, now: Instant, telemetry: &mut TelemetryRecorder<N>) {
        let Some(last) = self.last_tick.replace(now) else {
            return;
        };
        let gap_ms = now.elapsed_since(last);
        if gap_ms <= self.config.late_tick_ms {
            return;
        }
        if TIMED_LINES.iter().any(|line| self.active[line.as_index()]) {
            self.late_ticks = self.late_ticks.saturating_add(1);
            telemetry.record(
                RigEventKind::TickLate,
                TelemetryPayload::Interval { duration_ms: gap_ms },
                now,
            );
        }
    }

    fn advance<const N: usize>(
        &mut self,
        now: Instant,
        inputs: InputSample,
        triggered: bool,
        telemetry: &mut TelemetryRecorder<N>,
    ) {
        // Sampled every tick so the edge detector never sees a stale level.
        let sync_event = self.link.poll(now, inputs.sync);

        match self.state {
            SchedulerState::AwaitingSession { since } => {
                if triggered {
                    // Only fails while running or after a reset request.
                    let _ = self.start_session(now, telemetry);
                } else if now.elapsed_since(since) >= self.config.periodic_reset_ms {
                    self.request_reset(now, telemetry);
                }
            }
            SchedulerState::SessionComplete { completed_at } => {
                if triggered {
                    let _ = self.start_session(now, telemetry);
                } else if now.elapsed_since(completed_at)
                    >= self.config.session.post_last_trial_interval_ms
                {
                    self.state = SchedulerState::AwaitingSession { since: now };
                }
            }
            SchedulerState::InterTrialInterval {
                started_at,
                duration_ms,
            } => {
                if let Some(trial_start) =
                    self.interval_elapsed(now, sync_event, started_at, duration_ms, telemetry)
                {
                    self.begin_trial(trial_start, now, telemetry);
                }
            }
            SchedulerState::Trial { started_at, .. } => {
                if now.elapsed_since(started_at) >= self.config.session.trial_duration_ms {
                    self.end_trial(now, telemetry);
                }
            }
            SchedulerState::ResetRequested => {}
        }
    }

    /// Returns the trial start once the interval is over.
    fn interval_elapsed<const N: usize>(
        &mut self,
        now: Instant,
        sync_event: Option<SyncEvent>,
        started_at: Instant,
        duration_ms: Millis,
        telemetry: &mut TelemetryRecorder<N>,
    ) -> Option<Instant> {
        let own_interval_done = now.elapsed_since(started_at) >= duration_ms;
        if self.link.role() == RigRole::Primary {
            return own_interval_done.then_some(now);
        }

        match sync_event {
            Some(SyncEvent::Edge { trial_start }) => {
                self.pending_start = Some(trial_start);
                telemetry.record(
                    RigEventKind::SyncObserved,
                    TelemetryPayload::Sync { trial_start },
                    now,
                );
            }
            Some(SyncEvent::TimedOut) => {
                self.degraded_syncs = self.degraded_syncs.saturating_add(1);
                telemetry.record(RigEventKind::SyncDegraded, TelemetryPayload::None, now);
            }
            None => {}
        }

        if let Some(trial_start) = self.pending_start {
            if now.has_reached(trial_start) {
                self.pending_start = None;
                return Some(trial_start);
            }
            return None;
        }
        if self.link.is_waiting() {
            return None;
        }
        own_interval_done.then_some(now)
    }

    fn begin_interval<const N: usize>(
        &mut self,
        now: Instant,
        duration_ms: Millis,
        telemetry: &mut TelemetryRecorder<N>,
    ) {
        self.state = SchedulerState::InterTrialInterval {
            started_at: now,
            duration_ms,
        };
        self.pending_start = None;
        self.link.begin_wait(now);
        telemetry.record(
            RigEventKind::IntervalStarted,
            TelemetryPayload::Interval { duration_ms },
            now,
        );
    }

    fn begin_trial<const N: usize>(
        &mut self,
        started_at: Instant,
        now: Instant,
        telemetry: &mut TelemetryRecorder<N>,
    ) {
        let trial_type = self
            .picker
            .next(&self.config.session.selection, &mut self.rng)
            .unwrap_or(TrialTypeId::NoPuffNoSignal);
        self.next_interval_ms = draw_interval(self.config, &mut self.rng);
        self.state = SchedulerState::Trial {
            started_at,
            trial_type,
        };
        telemetry.record(
            RigEventKind::TrialStarted,
            TelemetryPayload::Trial {
                index: self.trial_index,
                trial_type,
            },
            now,
        );

        if self.link.signal(now).is_ok() {
            telemetry.record(RigEventKind::SyncSent, TelemetryPayload::None, now);
        }

        let entry = trial_type.trial_type();
        let auditory = &self.config.auditory;
        if auditory.enabled
            && let Some(cue) = entry.cue()
        {
            let window_start = started_at.wrapping_add(auditory.start_ms);
            match cue {
                SignalKind::Positive => self.tone_positive.activate(window_start, auditory.window_ms()),
                SignalKind::Negative => self.tone_negative.activate(window_start, auditory.window_ms()),
            }
        }
        if self.config.air_puff.enabled && entry.delivers_airpuff {
            self.puff.arm(started_at);
        }
    }

    fn end_trial<const N: usize>(&mut self, now: Instant, telemetry: &mut TelemetryRecorder<N>) {
        let finished = self.current_trial();
        self.deactivate_all(now, telemetry);
        if let Some(trial_type) = finished {
            telemetry.record(
                RigEventKind::TrialEnded,
                TelemetryPayload::Trial {
                    index: self.trial_index,
                    trial_type,
                },
                now,
            );
        }

        self.trial_index = self.trial_index.saturating_add(1);
        if self.trial_index >= self.config.session.number_of_trials {
            self.state = SchedulerState::SessionComplete { completed_at: now };
            telemetry.record(RigEventKind::SessionComplete, TelemetryPayload::None, now);
        } else {
            self.begin_interval(now, self.next_interval_ms, telemetry);
        }
    }

    fn request_reset<const N: usize>(&mut self, now: Instant, telemetry: &mut TelemetryRecorder<N>) {
        self.deactivate_all(now, telemetry);
        self.state = SchedulerState::ResetRequested;
        telemetry.record(RigEventKind::ResetRequested, TelemetryPayload::None, now);
    }

    fn drive_outputs<const N: usize>(
        &mut self,
        now: Instant,
        inputs: InputSample,
        telemetry: &mut TelemetryRecorder<N>,
    ) {
        let sync = self.link.tick(now);
        self.apply_line(OutputLine::Sync, sync.into(), sync.is_high(), now, telemetry);

        let running = self.state.is_running();
        if self.licks.on_raw_sample(now, inputs.lick.is_high()) && running {
            let count = u8::try_from(self.licks.count()).unwrap_or(u8::MAX);
            telemetry.record(RigEventKind::LickAccepted, TelemetryPayload::Lick { count }, now);
        }

        if matches!(self.state, SchedulerState::Trial { .. }) {
            self.water.tick(now, self.licks.count());
        } else {
            self.water.force_idle();
        }
        let water = self.water.level();
        self.apply_line(OutputLine::Water, water.into(), water.is_high(), now, telemetry);

        let positive = self.tone_positive.tick(now);
        let sounding = self.tone_positive.is_sounding(now);
        self.apply_line(OutputLine::TonePositive, positive, sounding, now, telemetry);

        let negative = self.tone_negative.tick(now);
        let sounding = self.tone_negative.is_sounding(now);
        self.apply_line(OutputLine::ToneNegative, negative, sounding, now, telemetry);

        let puff = self.puff.tick(now);
        self.apply_line(OutputLine::AirPuff, puff.into(), puff.is_high(), now, telemetry);
    }

    fn apply_line<const N: usize>(
        &mut self,
        line: OutputLine,
        drive: LineDrive,
        active: bool,
        now: Instant,
        telemetry: &mut TelemetryRecorder<N>,
    ) {
        self.latch.apply(&mut self.driver, line, drive);

        let slot = &mut self.active[line.as_index()];
        if *slot != active {
            *slot = active;
            let event = if active {
                RigEventKind::LineActivated(line)
            } else {
                RigEventKind::LineReleased(line)
            };
            telemetry.record(event, TelemetryPayload::None, now);
        }
    }

    #[must_use]
    pub const fn state(&self) -> SchedulerState {
        self.state
    }

    #[must_use]
    pub const fn config(&self) -> &RigConfig {
        self.config
    }

    /// Zero-based index of the current trial; equals the number of completed
    /// trials between trials.
    #[must_use]
    pub const fn trial_index(&self) -> u16 {
        self.trial_index
    }

    #[must_use]
    pub const fn current_trial(&self) -> Option<TrialTypeId> {
        match self.state {
            SchedulerState::Trial { trial_type, .. } => Some(trial_type),
            _ => None,
        }
    }

    /// When the trial in progress began.
    #[must_use]
    pub const fn trial_start(&self) -> Option<Instant> {
        match self.state {
            SchedulerState::Trial { started_at, .. } => Some(started_at),
            _ => None,
        }
    }

    #[must_use]
    pub const fn session_start(&self) -> Option<Instant> {
        self.session_start
    }

    /// Interval that will follow the current trial.
    #[must_use]
    pub const fn next_interval_ms(&self) -> Millis {
        self.next_interval_ms
    }

    /// Intervals this session that gave up waiting for the primary.
    #[must_use]
    pub const fn degraded_syncs(&self) -> u16 {
        self.degraded_syncs
    }

    /// Ticks this session that arrived late while a puff or tone was active.
    #[must_use]
    pub const fn late_ticks(&self) -> u32 {
        self.late_ticks
    }

    #[must_use]
    pub fn lick_count(&self) -> usize {
        self.licks.count()
    }

    #[must_use]
    pub const fn water_dispenses(&self) -> u32 {
        self.water.dispenses()
    }

    #[must_use]
    pub const fn outputs(&self) -> &OutputLatch {
        &self.latch
    }

    /// Bit per [`OutputLine`] index, set while the line is active.
    #[must_use]
    pub fn active_mask(&self) -> u8 {
        self.active
            .iter()
            .enumerate()
            .filter(|(_, active)| **active)
            .fold(0, |mask, (index, _)| mask | (1 << index))
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Lets the caller reseed between sessions.
    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;
    use crate::channels::NoopRigDriver;

    type Recorder = TelemetryRecorder<64>;

    fn at(millis: u32) -> Instant {
        Instant::from_millis(millis)
    }

    fn trigger() -> InputSample {
        InputSample {
            session_trigger: crate::time::Level::High,
            ..InputSample::IDLE
        }
    }

    #[test]
    fn trigger_starts_session_with_interval() {
        let config = RigConfig::defaults();
        let mut telemetry = Recorder::new();
        let mut scheduler =
            TrialScheduler::new(&config, NoopRigDriver, SmallRng::seed_from_u64(1), at(0))
                .expect("valid config");

        let report = scheduler.tick(at(10), trigger(), &mut telemetry);

        let SchedulerState::InterTrialInterval { started_at, duration_ms } = report.state else {
            panic!("expected interval, got {:?}", report.state);
        };
        assert_eq!(started_at, at(10));
        assert!((60_000..=300_000).contains(&duration_ms));
        assert_eq!(telemetry.count(RigEventKind::SessionStarted), 1);
        assert_eq!(
            scheduler.start_session(at(20), &mut telemetry),
            Err(SessionError::AlreadyRunning)
        );
    }

    #[test]
    fn held_trigger_does_not_restart() {
        let config = RigConfig::defaults();
        let mut telemetry = Recorder::new();
        let mut scheduler =
            TrialScheduler::new(&config, NoopRigDriver, SmallRng::seed_from_u64(1), at(0))
                .expect("valid config");

        scheduler.tick(at(0), trigger(), &mut telemetry);
        scheduler.tick(at(1), trigger(), &mut telemetry);

        assert_eq!(telemetry.count(RigEventKind::SessionStarted), 1);
    }

    #[test]
    fn watchdog_requests_reset_without_trigger() {
        let config = RigConfig::defaults();
        let mut telemetry = Recorder::new();
        let mut scheduler =
            TrialScheduler::new(&config, NoopRigDriver, SmallRng::seed_from_u64(1), at(0))
                .expect("valid config");

        let before = scheduler.tick(at(config.periodic_reset_ms - 1), InputSample::IDLE, &mut telemetry);
        assert!(!before.reset_requested);

        let after = scheduler.tick(at(config.periodic_reset_ms), InputSample::IDLE, &mut telemetry);
        assert!(after.reset_requested);
        assert_eq!(
            scheduler.start_session(at(config.periodic_reset_ms + 1), &mut telemetry),
            Err(SessionError::ResetPending)
        );
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let mut config = RigConfig::defaults();
        config.auditory.positive.frequency_hz = 0;

        let result = TrialScheduler::new(&config, NoopRigDriver, SmallRng::seed_from_u64(1), at(0));

        assert!(matches!(
            result,
            Err(ConfigError::InvalidFrequency { frequency_hz: 0 })
        ));
    }
}

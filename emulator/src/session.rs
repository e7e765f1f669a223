use std::fmt;
use std::io::{self, Write};
use std::ops::Range;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use tfc_core::channels::{InputSample, LineDrive, OUTPUT_LINE_COUNT, OutputLine, RigDriver};
use tfc_core::config::{ConfigError, RigConfig};
use tfc_core::scheduler::{SchedulerState, TrialScheduler};
use tfc_core::telemetry::{
    EventId, RigEventKind, TELEMETRY_RING_CAPACITY, TelemetryPayload, TelemetryRecorder,
};
use tfc_core::time::{Clock, Instant, Level, Millis};
use tfc_core::trial::{SignalKind, TRIAL_TYPE_COUNT, TRIAL_TYPES};

/// Raw contact length of one synthetic lick.
const CONTACT_MS: Millis = 20;
/// Contact bounce that follows each lick, relative to its onset.
const BOUNCE_MS: Range<Millis> = 25..28;

/// Knobs that shape the synthetic inputs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SessionOptions {
    pub seed: u64,
    /// Spacing between lick onsets while a CS+ cue sounds; 0 disables licking.
    pub lick_interval_ms: Millis,
    /// Feed a synthetic primary's sync pulses into the sync input.
    pub primary_pulses: bool,
}

/// Millisecond counter advanced by the session loop.
#[derive(Clone, Copy, Debug, Default)]
struct VirtualClock {
    now: Instant,
}

impl VirtualClock {
    fn advance(&mut self) {
        self.now = self.now.wrapping_add(1);
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Instant {
        self.now
    }
}

/// Driver that only counts activations per line.
#[derive(Debug, Default)]
pub struct HostDriver {
    high: [bool; OUTPUT_LINE_COUNT],
    activations: [u32; OUTPUT_LINE_COUNT],
}

impl HostDriver {
    pub fn activations(&self, line: OutputLine) -> u32 {
        self.activations[line.as_index()]
    }
}

impl RigDriver for HostDriver {
    fn drive(&mut self, line: OutputLine, drive: LineDrive) {
        let index = line.as_index();
        let active = drive.is_active();
        if active && !self.high[index] {
            self.activations[index] += 1;
        }
        self.high[index] = active;
    }

    fn release_all(&mut self) {
        self.high = [false; OUTPUT_LINE_COUNT];
    }
}

/// Lick sensor that fires at a fixed interval while the CS+ cue window is open.
#[derive(Clone, Copy, Debug)]
struct SyntheticLicker {
    interval_ms: Millis,
}

impl SyntheticLicker {
    /// Raw sensor level `elapsed` into the cue window.
    fn level(self, elapsed: Millis) -> Level {
        if self.interval_ms == 0 {
            return Level::Low;
        }
        let phase = elapsed % self.interval_ms;
        Level::from_active(phase < CONTACT_MS || BOUNCE_MS.contains(&phase))
    }
}

/// Sync pulses of a primary rig running the same configuration.
#[derive(Clone, Copy, Debug)]
struct PrimaryPulses {
    first_ms: Millis,
    period_ms: Millis,
    pulse_ms: Millis,
}

impl PrimaryPulses {
    fn for_config(config: &RigConfig) -> Self {
        let (interval_ms, _) = config.interval_bounds();
        Self {
            first_ms: interval_ms,
            period_ms: interval_ms + config.session.trial_duration_ms,
            pulse_ms: config.sync.pulse_ms,
        }
    }

    fn level(self, now: Millis) -> Level {
        if now < self.first_ms || self.period_ms == 0 {
            return Level::Low;
        }
        Level::from_active((now - self.first_ms) % self.period_ms < self.pulse_ms)
    }
}

/// How a run ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionOutcome {
    /// Every trial ran and the rig re-armed.
    Completed,
    /// The idle watchdog fired.
    ResetRequested,
    /// The virtual time budget ran out.
    TimedOut,
}

/// Totals printed after a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SessionSummary {
    pub outcome: SessionOutcome,
    pub elapsed_ms: Millis,
    pub trials_by_type: [u16; TRIAL_TYPE_COUNT],
    pub puff_pulses: u32,
    pub water_dispenses: u32,
    pub accepted_licks: u32,
    pub degraded_syncs: u16,
    pub late_ticks: u32,
}

impl SessionSummary {
    pub fn trials(&self) -> u16 {
        self.trials_by_type.iter().sum()
    }
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "session {:?} after {}ms: {} trials",
            self.outcome,
            self.elapsed_ms,
            self.trials()
        )?;
        for (entry, count) in TRIAL_TYPES.iter().zip(self.trials_by_type) {
            if count > 0 {
                writeln!(f, "  {:<16} {count}", entry.label)?;
            }
        }
        writeln!(f, "  puff pulses      {}", self.puff_pulses)?;
        writeln!(f, "  water dispenses  {}", self.water_dispenses)?;
        writeln!(f, "  accepted licks   {}", self.accepted_licks)?;
        writeln!(f, "  degraded syncs   {}", self.degraded_syncs)?;
        write!(f, "  late ticks       {}", self.late_ticks)
    }
}

/// One emulated rig running a single session on a virtual clock.
pub struct Session<'a> {
    scheduler: TrialScheduler<'a, HostDriver, SmallRng>,
    telemetry: TelemetryRecorder<TELEMETRY_RING_CAPACITY>,
    cursor: EventId,
    clock: VirtualClock,
    licker: SyntheticLicker,
    primary: Option<PrimaryPulses>,
    trials_by_type: [u16; TRIAL_TYPE_COUNT],
    accepted_licks: u32,
}

impl<'a> Session<'a> {
    pub fn new(config: &'a RigConfig, options: SessionOptions) -> Result<Self, ConfigError> {
        let clock = VirtualClock::default();
        let scheduler = TrialScheduler::new(
            config,
            HostDriver::default(),
            SmallRng::seed_from_u64(options.seed),
            clock.now(),
        )?;

        Ok(Self {
            scheduler,
            telemetry: TelemetryRecorder::new(),
            cursor: 0,
            clock,
            licker: SyntheticLicker {
                interval_ms: options.lick_interval_ms,
            },
            primary: options
                .primary_pulses
                .then(|| PrimaryPulses::for_config(config)),
            trials_by_type: [0; TRIAL_TYPE_COUNT],
            accepted_licks: 0,
        })
    }

    /// Upper bound on virtual time for one session.
    fn budget_ms(config: &RigConfig) -> Millis {
        let (_, max_interval) = config.interval_bounds();
        let per_trial = u64::from(max_interval)
            + u64::from(config.session.trial_duration_ms)
            + u64::from(config.sync.max_wait_ms);
        let total = per_trial * u64::from(config.session.number_of_trials)
            + u64::from(config.session.post_last_trial_interval_ms)
            + 1;
        Millis::try_from(total).unwrap_or(Millis::MAX)
    }

    /// Starts the session at time zero and ticks until the rig re-arms,
    /// printing every telemetry record to `out`.
    pub fn run<W: Write>(&mut self, out: &mut W) -> io::Result<SessionSummary> {
        let config = *self.scheduler.config();
        self.scheduler
            .start_session(self.clock.now(), &mut self.telemetry)
            .map_err(|err| io::Error::other(err.to_string()))?;
        self.print_new(out)?;

        let budget = Self::budget_ms(&config);
        let outcome = loop {
            if self.clock.now().as_millis() >= budget {
                break SessionOutcome::TimedOut;
            }

            let inputs = self.sample_inputs(&config);
            let report = self
                .scheduler
                .poll(&self.clock, inputs, &mut self.telemetry);
            self.print_new(out)?;

            if report.reset_requested {
                let now = self.clock.now();
                self.scheduler.deactivate_all(now, &mut self.telemetry);
                self.print_new(out)?;
                break SessionOutcome::ResetRequested;
            }
            if matches!(report.state, SchedulerState::AwaitingSession { .. }) {
                break SessionOutcome::Completed;
            }
            self.clock.advance();
        };

        Ok(self.summary(outcome))
    }

    fn sample_inputs(&self, config: &RigConfig) -> InputSample {
        let now = self.clock.now();
        let sync = self
            .primary
            .map_or(Level::Low, |primary| primary.level(now.as_millis()));

        let mut lick = Level::Low;
        if let (Some(trial), Some(started)) =
            (self.scheduler.current_trial(), self.scheduler.trial_start())
        {
            let cue = trial.trial_type().cue();
            let elapsed = now.elapsed_since(started);
            let window = config.auditory.start_ms..config.auditory.stop_ms;
            if cue == Some(SignalKind::Positive) && window.contains(&elapsed) {
                lick = self.licker.level(elapsed - config.auditory.start_ms);
            }
        }

        InputSample {
            lick,
            sync,
            session_trigger: Level::Low,
        }
    }

    fn print_new<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        let dropped = self.telemetry.dropped_since(self.cursor);
        if dropped > 0 {
            writeln!(out, "[{:>9}] dropped {dropped} records", "")?;
        }

        for record in self.telemetry.unread_since(self.cursor) {
            match (record.event, record.details) {
                (RigEventKind::TrialStarted, TelemetryPayload::Trial { trial_type, .. }) => {
                    self.trials_by_type[trial_type.as_index()] += 1;
                }
                (RigEventKind::LickAccepted, _) => self.accepted_licks += 1,
                _ => {}
            }
            writeln!(out, "[{:>9}] {record}", record.timestamp.as_millis())?;
        }
        self.cursor = self.telemetry.next_event_id();
        Ok(())
    }

    fn summary(&self, outcome: SessionOutcome) -> SessionSummary {
        SessionSummary {
            outcome,
            elapsed_ms: self.clock.now().as_millis(),
            trials_by_type: self.trials_by_type,
            puff_pulses: self.scheduler.driver().activations(OutputLine::AirPuff),
            water_dispenses: self.scheduler.water_dispenses(),
            accepted_licks: self.accepted_licks,
            degraded_syncs: self.scheduler.degraded_syncs(),
            late_ticks: self.scheduler.late_ticks(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tfc_core::trial::{TrialSelection, TrialTypeId};

    const PUFF_ONLY: [TrialTypeId; 1] = [TrialTypeId::PuffPositive];
    const NEGATIVE_ONLY: [TrialTypeId; 1] = [TrialTypeId::NoPuffNegative];

    fn bench_config(trials: u16) -> RigConfig {
        let mut config = RigConfig::defaults();
        config.debug.enabled = true;
        config.session.number_of_trials = trials;
        config.session.post_last_trial_interval_ms = 1_000;
        config.session.selection = TrialSelection::Schedule(&PUFF_ONLY);
        config
    }

    fn options(lick_interval_ms: Millis) -> SessionOptions {
        SessionOptions {
            seed: 1,
            lick_interval_ms,
            primary_pulses: false,
        }
    }

    #[test]
    fn debug_session_runs_every_trial() {
        let config = bench_config(2);
        let mut session = Session::new(&config, options(0)).expect("valid config");
        let mut out = Vec::new();

        let summary = session.run(&mut out).expect("run");

        assert_eq!(summary.outcome, SessionOutcome::Completed);
        assert_eq!(summary.trials(), 2);
        assert_eq!(summary.trials_by_type[TrialTypeId::PuffPositive.as_index()], 2);
        // 5 000 ms train of 200 ms puffs every 1 200 ms.
        assert_eq!(summary.puff_pulses, 10);
        assert_eq!(summary.accepted_licks, 0);
        assert_eq!(summary.water_dispenses, 0);

        let transcript = String::from_utf8(out).expect("utf8");
        assert!(transcript.contains("trial-started puff_CS+ #0"));
        assert!(transcript.contains("session-complete"));
    }

    #[test]
    fn licks_during_cue_earn_water() {
        let mut config = bench_config(1);
        config.reward.water_available = true;
        let mut session = Session::new(&config, options(250)).expect("valid config");

        let summary = session.run(&mut io::sink()).expect("run");

        // One onset every 250 ms across the 20 s cue; bounces are rejected.
        assert_eq!(summary.accepted_licks, 80);
        assert!((20..=30).contains(&summary.water_dispenses), "{summary}");
    }

    #[test]
    fn negative_cue_trials_draw_no_licks() {
        let mut config = bench_config(1);
        config.session.selection = TrialSelection::Schedule(&NEGATIVE_ONLY);
        config.reward.water_available = true;
        let mut session = Session::new(&config, options(250)).expect("valid config");

        let summary = session.run(&mut io::sink()).expect("run");

        assert_eq!(summary.accepted_licks, 0);
        assert_eq!(summary.puff_pulses, 0);
    }

    #[test]
    fn follower_tracks_primary_pulses() {
        let mut config = bench_config(2);
        config.sync = RigConfig::secondary_defaults().sync;
        let mut session = Session::new(
            &config,
            SessionOptions {
                primary_pulses: true,
                ..options(0)
            },
        )
        .expect("valid config");
        let mut out = Vec::new();

        let summary = session.run(&mut out).expect("run");

        assert_eq!(summary.outcome, SessionOutcome::Completed);
        assert_eq!(summary.trials(), 2);
        assert_eq!(summary.degraded_syncs, 0);
        assert_eq!(summary.late_ticks, 0);
        let transcript = String::from_utf8(out).expect("utf8");
        assert!(transcript.contains("sync-observed start=5250ms"));
    }

    #[test]
    fn synthetic_licker_bounces_after_contact() {
        let licker = SyntheticLicker { interval_ms: 250 };
        let high: Vec<Millis> = (0..250)
            .filter(|elapsed| licker.level(*elapsed).is_high())
            .collect();

        assert_eq!(high.len(), 23);
        assert_eq!(high.first().copied(), Some(0));
        assert_eq!(high.last().copied(), Some(27));
        assert_eq!(SyntheticLicker { interval_ms: 0 }.level(0), Level::Low);
    }
}

use rand::SeedableRng;
use rand::rngs::SmallRng;

use tfc_core::channels::{InputSample, LineDrive, NoopRigDriver, OutputLine};
use tfc_core::config::RigConfig;
use tfc_core::scheduler::{SchedulerState, TrialScheduler};
use tfc_core::telemetry::{RigEventKind, TelemetryPayload, TelemetryRecorder};
use tfc_core::time::{Instant, Level};
use tfc_core::trial::{TrialSelection, TrialTypeId};

const NO_PUFF: [TrialTypeId; 1] = [TrialTypeId::NoPuffNoSignal];

fn follower_config() -> RigConfig {
    let mut config = RigConfig::secondary_defaults();
    config.debug.enabled = true;
    config.session.number_of_trials = 2;
    config.session.selection = TrialSelection::Schedule(&NO_PUFF);
    config
}

fn inputs(millis: u32, sync_high: impl Fn(u32) -> bool) -> InputSample {
    InputSample {
        sync: Level::from_active(sync_high(millis)),
        session_trigger: Level::from_active(millis == 0),
        ..InputSample::IDLE
    }
}

fn trial_started_at(telemetry: &TelemetryRecorder<128>) -> Vec<u32> {
    telemetry
        .oldest_first()
        .filter(|record| record.event == RigEventKind::TrialStarted)
        .map(|record| record.timestamp.as_millis())
        .collect()
}

#[test]
fn follower_starts_offset_after_primary_edge() {
    let config = follower_config();
    let mut telemetry = TelemetryRecorder::<128>::new();
    let mut scheduler =
        TrialScheduler::new(&config, NoopRigDriver, SmallRng::seed_from_u64(8), Instant::ZERO)
            .expect("valid config");

    // Primary pulse well before the follower's own interval would expire.
    let pulse = |millis: u32| (2_000..2_500).contains(&millis);
    for millis in 0..3_000 {
        scheduler.tick(Instant::from_millis(millis), inputs(millis, pulse), &mut telemetry);
    }

    assert_eq!(trial_started_at(&telemetry), vec![2_250]);
    assert_eq!(scheduler.trial_start(), Some(Instant::from_millis(2_250)));
    let observed = telemetry
        .oldest_first()
        .find(|record| record.event == RigEventKind::SyncObserved)
        .map(|record| (record.timestamp.as_millis(), record.details));
    assert_eq!(
        observed,
        Some((
            2_000,
            TelemetryPayload::Sync {
                trial_start: Instant::from_millis(2_250)
            }
        ))
    );
    assert_eq!(scheduler.degraded_syncs(), 0);
    // Followers never drive the sync line.
    assert_eq!(telemetry.count(RigEventKind::SyncSent), 0);
    assert_eq!(
        scheduler.outputs().current(OutputLine::Sync),
        Some(LineDrive::Low)
    );
}

#[test]
fn follower_falls_back_to_own_interval_after_max_wait() {
    let mut config = follower_config();
    config.sync.max_wait_ms = 8_000;
    let mut telemetry = TelemetryRecorder::<128>::new();
    let mut scheduler =
        TrialScheduler::new(&config, NoopRigDriver, SmallRng::seed_from_u64(8), Instant::ZERO)
            .expect("valid config");

    let mut degraded_at = None;
    for millis in 0..8_001 {
        let report =
            scheduler.tick(Instant::from_millis(millis), inputs(millis, |_| false), &mut telemetry);
        if report.degraded_sync && degraded_at.is_none() {
            degraded_at = Some(millis);
        }
    }

    // Own interval (5 000) already elapsed, so the trial starts on the timeout.
    assert_eq!(degraded_at, Some(8_000));
    assert_eq!(trial_started_at(&telemetry), vec![8_000]);
    assert_eq!(scheduler.degraded_syncs(), 1);
    assert_eq!(telemetry.count(RigEventKind::SyncDegraded), 1);
}

#[test]
fn primary_pulses_sync_line_at_trial_start() {
    let mut config = follower_config();
    config.sync = RigConfig::defaults().sync;
    let mut telemetry = TelemetryRecorder::<128>::new();
    let mut scheduler =
        TrialScheduler::new(&config, NoopRigDriver, SmallRng::seed_from_u64(8), Instant::ZERO)
            .expect("valid config");

    let mut high = Vec::new();
    for millis in 0..6_000 {
        scheduler.tick(Instant::from_millis(millis), inputs(millis, |_| false), &mut telemetry);
        if scheduler.outputs().is_active(OutputLine::Sync) {
            high.push(millis);
        }
    }

    assert_eq!(high.first().copied(), Some(5_000));
    assert_eq!(high.last().copied(), Some(5_499));
    assert_eq!(high.len(), 500);
    assert_eq!(telemetry.count(RigEventKind::SyncSent), 1);
    assert!(matches!(scheduler.state(), SchedulerState::Trial { .. }));
}

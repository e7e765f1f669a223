use rand::SeedableRng;
use rand::rngs::SmallRng;

use tfc_core::channels::{InputSample, LineDrive, NoopRigDriver, OutputLine};
use tfc_core::config::RigConfig;
use tfc_core::scheduler::TrialScheduler;
use tfc_core::telemetry::{RigEventKind, TelemetryRecorder};
use tfc_core::time::{Instant, Level};
use tfc_core::trial::{TrialSelection, TrialTypeId};

const NO_PUFF: [TrialTypeId; 1] = [TrialTypeId::NoPuffNoSignal];

/// Raw sensor contacts last this long.
const CONTACT_MS: u32 = 5;

fn reward_config() -> RigConfig {
    let mut config = RigConfig::defaults();
    config.debug.enabled = true;
    config.session.number_of_trials = 1;
    config.session.selection = TrialSelection::Schedule(&NO_PUFF);
    config.reward.water_available = true;
    config
}

fn sample(millis: u32, licks: &[u32]) -> InputSample {
    let touching = licks
        .iter()
        .any(|start| (*start..*start + CONTACT_MS).contains(&millis));
    InputSample {
        lick: Level::from_active(touching),
        session_trigger: Level::from_active(millis == 0),
        ..InputSample::IDLE
    }
}

/// Runs one session and returns the instants the water line switched.
fn water_transitions(config: &RigConfig, licks: &[u32], until: u32) -> Vec<(u32, bool)> {
    let mut telemetry = TelemetryRecorder::<512>::new();
    let mut scheduler = TrialScheduler::new(
        config,
        NoopRigDriver,
        SmallRng::seed_from_u64(4),
        Instant::ZERO,
    )
    .expect("valid config");

    let mut transitions = Vec::new();
    let mut previous = false;
    for millis in 0..until {
        scheduler.tick(Instant::from_millis(millis), sample(millis, licks), &mut telemetry);
        let open = scheduler.outputs().current(OutputLine::Water) == Some(LineDrive::High);
        if open != previous {
            transitions.push((millis, open));
            previous = open;
        }
    }
    transitions
}

#[test]
fn licks_open_valve_and_timeout_blocks_reopening() {
    let config = reward_config();
    let trial = config.debug.inter_trial_wait_ms;
    // 150 falls inside the lick timeout and is not counted.
    let licks = [100, 150, 300, 400, 600].map(|at| trial + at);

    let transitions = water_transitions(&config, &licks, trial + 1_500);

    assert_eq!(
        transitions,
        vec![
            (trial + 300, true),
            (trial + 500, false),
            (trial + 1_000, true),
            (trial + 1_200, false),
        ]
    );
}

#[test]
fn licks_during_the_interval_do_not_dispense() {
    let config = reward_config();
    let licks = [1_000, 1_200, 1_400, 1_600];

    let transitions = water_transitions(&config, &licks, config.debug.inter_trial_wait_ms);

    assert!(transitions.is_empty());
}

#[test]
fn training_rewards_even_without_water_switch() {
    let mut config = reward_config();
    config.reward.water_available = false;
    let trial = config.debug.inter_trial_wait_ms;
    let licks = [trial + 100, trial + 300];

    assert!(water_transitions(&config, &licks, trial + 1_000).is_empty());

    config.training.enabled = true;
    config.training.rewarded = true;
    assert_eq!(
        water_transitions(&config, &licks, trial + 1_000),
        vec![(trial + 300, true), (trial + 500, false)]
    );
}

#[test]
fn accepted_licks_are_logged_with_window_count() {
    let config = reward_config();
    let trial = config.debug.inter_trial_wait_ms;
    let licks = [trial + 100, trial + 150, trial + 300];
    let mut telemetry = TelemetryRecorder::<512>::new();
    let mut scheduler = TrialScheduler::new(
        &config,
        NoopRigDriver,
        SmallRng::seed_from_u64(4),
        Instant::ZERO,
    )
    .expect("valid config");

    for millis in 0..trial + 400 {
        scheduler.tick(Instant::from_millis(millis), sample(millis, &licks), &mut telemetry);
    }

    assert_eq!(telemetry.count(RigEventKind::LickAccepted), 2);
    assert_eq!(scheduler.lick_count(), 2);
    assert_eq!(scheduler.water_dispenses(), 1);
}

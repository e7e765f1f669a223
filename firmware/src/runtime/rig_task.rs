use cortex_m::peripheral::SCB;
use embassy_futures::yield_now;
use embassy_stm32::peripherals::{TIM2, TIM3};
use embassy_stm32::uid;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tfc_core::scheduler::TrialScheduler;
use tfc_core::telemetry::{TELEMETRY_RING_CAPACITY, TelemetryRecorder};
use tfc_core::time::{Clock, EdgeDetector};

use crate::hw::{RigInputs, RigPins};
use crate::rig::{EmbassyClock, RIG_CONFIG, session_seed};
use crate::status;
use crate::telemetry::{self, TelemetryDrain};

/// Runs the scheduler forever, one tick per executor turn.
#[embassy_executor::task]
pub async fn run(pins: RigPins<'static, TIM3, TIM2>, mut inputs: RigInputs<'static>) -> ! {
    let clock = EmbassyClock;
    let rng = SmallRng::seed_from_u64(session_seed(uid::uid(), embassy_time::Instant::now()));
    let mut recorder = TelemetryRecorder::<TELEMETRY_RING_CAPACITY>::new();
    let mut drain = TelemetryDrain::new();
    let mut button = EdgeDetector::new();

    let mut scheduler = match TrialScheduler::new(&RIG_CONFIG, pins, rng, clock.now()) {
        Ok(scheduler) => scheduler,
        Err(error) => {
            telemetry::emit_config_error(error);
            loop {
                core::future::pending::<()>().await;
            }
        }
    };

    let mut last_trial = scheduler.trial_index();
    loop {
        let sample = inputs.sample();
        if button.rising(sample.session_trigger) && !scheduler.state().is_running() {
            let seed = session_seed(uid::uid(), embassy_time::Instant::now());
            *scheduler.rng_mut() = SmallRng::seed_from_u64(seed);
        }

        let now = clock.now();
        let report = scheduler.tick(now, sample, &mut recorder);
        status::record_tick(
            &report,
            scheduler.active_mask(),
            scheduler.trial_index(),
            scheduler.lick_count(),
        );
        drain.drain(&recorder);

        if scheduler.trial_index() != last_trial {
            last_trial = scheduler.trial_index();
            telemetry::emit_status(&status::snapshot());
        }

        if report.reset_requested {
            scheduler.deactivate_all(now, &mut recorder);
            drain.drain(&recorder);
            SCB::sys_reset();
        }

        yield_now().await;
    }
}

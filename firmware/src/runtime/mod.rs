use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Input, Level, Output, OutputType, Pull, Speed};
use embassy_stm32::time::Hertz;
use embassy_stm32::timer::low_level::CountingMode;
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};
use tfc_core::channels::{PinDriver, RigRole};

use crate::hw::{GpioInput, GpioOutput, PwmTone, RigInputs};
use crate::rig::RIG_CONFIG;

mod rig_task;

/// Carrier the tone timers idle at until the first cue sets its own.
const IDLE_TONE_HZ: u32 = 1_000;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        PA6,
        PB3,
        PB4,
        PB5,
        PB6,
        PB7,
        TIM2,
        TIM3,
        ..
    } = hal::init(config);

    let tone_positive = SimplePwm::new(
        TIM3,
        Some(PwmPin::new(PA6, OutputType::PushPull)),
        None,
        None,
        None,
        Hertz(IDLE_TONE_HZ),
        CountingMode::EdgeAlignedUp,
    );
    let tone_negative = SimplePwm::new(
        TIM2,
        Some(PwmPin::new(PA0, OutputType::PushPull)),
        None,
        None,
        None,
        Hertz(IDLE_TONE_HZ),
        CountingMode::EdgeAlignedUp,
    );

    let (sync_out, sync_in) = match RIG_CONFIG.sync.role {
        RigRole::Primary => (
            Some(GpioOutput::new(Output::new(PB5, Level::Low, Speed::Low))),
            None,
        ),
        RigRole::Secondary => (None, Some(GpioInput::new(Input::new(PB5, Pull::Down)))),
    };

    let pins = PinDriver {
        air_puff: GpioOutput::new(Output::new(PB3, Level::Low, Speed::Low)),
        water: GpioOutput::new(Output::new(PB4, Level::Low, Speed::Low)),
        sync: sync_out,
        tone_positive: PwmTone::new(tone_positive),
        tone_negative: PwmTone::new(tone_negative),
    };
    let inputs = RigInputs {
        lick: GpioInput::new(Input::new(PB6, Pull::Down)),
        session_button: GpioInput::new(Input::new(PB7, Pull::Down)),
        sync: sync_in,
    };

    spawner
        .spawn(rig_task::run(pins, inputs))
        .expect("failed to spawn rig task");

    core::future::pending::<()>().await;
}

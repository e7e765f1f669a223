//! Embassy bindings for the rig's pins and timers.
//!
//! Pin map (STM32G0B1):
//!
//! | line          | pin  | peripheral |
//! |---------------|------|------------|
//! | tone+         | PA6  | TIM3 CH1   |
//! | tone-         | PA0  | TIM2 CH1   |
//! | air-puff      | PB3  | GPIO out   |
//! | water         | PB4  | GPIO out   |
//! | sync          | PB5  | GPIO out on the primary, pulled-down input on a follower |
//! | lick sensor   | PB6  | pulled-down input |
//! | session button| PB7  | pulled-down input |

use embassy_stm32::gpio::{Input, Level as PinLevel, Output};
use embassy_stm32::time::Hertz;
use embassy_stm32::timer::GeneralInstance4Channel;
use embassy_stm32::timer::simple_pwm::SimplePwm;
use tfc_core::channels::{DigitalInput, DigitalOutput, PinDriver, ToneGenerator};
use tfc_core::time::Level;

use crate::rig::InputPins;

/// Output side of the rig as the scheduler sees it.
pub type RigPins<'d, TP, TN> = PinDriver<GpioOutput<'d>, PwmTone<'d, TP>, PwmTone<'d, TN>>;

/// Input side of the rig.
pub type RigInputs<'d> = InputPins<GpioInput<'d>>;

/// Push-pull output pin.
pub struct GpioOutput<'d> {
    pin: Output<'d>,
}

impl<'d> GpioOutput<'d> {
    pub fn new(pin: Output<'d>) -> Self {
        Self { pin }
    }
}

impl DigitalOutput for GpioOutput<'_> {
    fn set(&mut self, level: Level) {
        self.pin.set_level(PinLevel::from(level.is_high()));
    }
}

/// Input pin, sampled without debouncing (the core debounces licks).
pub struct GpioInput<'d> {
    pin: Input<'d>,
}

impl<'d> GpioInput<'d> {
    pub fn new(pin: Input<'d>) -> Self {
        Self { pin }
    }
}

impl DigitalInput for GpioInput<'_> {
    fn read(&mut self) -> Level {
        Level::from_active(self.pin.is_high())
    }
}

/// Tone output on channel 1 of a general-purpose timer.
///
/// Runs a 50 % hardware carrier for [`ToneGenerator`] and pins the compare
/// register fully on or off when the core toggles the line in software.
pub struct PwmTone<'d, T: GeneralInstance4Channel> {
    pwm: SimplePwm<'d, T>,
}

impl<'d, T: GeneralInstance4Channel> PwmTone<'d, T> {
    /// Takes ownership of the timer with its output held low.
    pub fn new(mut pwm: SimplePwm<'d, T>) -> Self {
        let mut channel = pwm.ch1();
        channel.set_duty_cycle_fully_off();
        channel.enable();
        Self { pwm }
    }
}

impl<T: GeneralInstance4Channel> ToneGenerator for PwmTone<'_, T> {
    fn start(&mut self, frequency_hz: u32) {
        self.pwm.set_frequency(Hertz(frequency_hz));
        self.pwm.ch1().set_duty_cycle_fraction(1, 2);
    }

    fn stop(&mut self) {
        self.pwm.ch1().set_duty_cycle_fully_off();
    }
}

impl<T: GeneralInstance4Channel> DigitalOutput for PwmTone<'_, T> {
    fn set(&mut self, level: Level) {
        let mut channel = self.pwm.ch1();
        match level {
            Level::High => channel.set_duty_cycle_fully_on(),
            Level::Low => channel.set_duty_cycle_fully_off(),
        }
    }
}

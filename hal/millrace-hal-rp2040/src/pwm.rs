//! PWM slices as motor counters and time source
//!
//! The RP2040 has eight PWM slices with two outputs each. Motor `n` is
//! driven from GPIO `n`, which the pin mux ties to slice `n / 2`, output A
//! for even and B for odd pins. Slice 7 also times the control loop: its
//! wrap interrupt counts periods into [`OVERFLOWS`].

use embassy_rp::interrupt::InterruptExt;
use embassy_rp::pwm::{Config as PwmConfig, Pwm};
use embassy_rp::{interrupt, pac};
use fixed::types::U12F4;
use millrace_core::pwm::PwmChannel;
use millrace_core::MOTOR_COUNT;
use millrace_hal::pwm::{CounterTiming, PwmBank, PwmOutput, TickSource};
use portable_atomic::{AtomicU32, Ordering};

use crate::pins::MotorPwmPeripherals;

pub const SLICE_COUNT: usize = 8;

/// Slice whose wraps are counted for time keeping
pub const TIME_SLICE: usize = 7;

/// 125 MHz system clock, 16-bit counters, 8-bit integer divider
pub const TIMING: CounterTiming = CounterTiming {
    clock_hz: 125_000_000,
    max_top: u16::MAX,
    max_divider: u8::MAX,
};

/// Motor channel to slice output mapping
pub static CHANNELS: [PwmChannel; MOTOR_COUNT] = channel_table();

const fn channel_table() -> [PwmChannel; MOTOR_COUNT] {
    let mut table = [PwmChannel::new(0, PwmOutput::A); MOTOR_COUNT];
    let mut gpio = 0;
    while gpio < MOTOR_COUNT {
        let output = if gpio % 2 == 0 { PwmOutput::A } else { PwmOutput::B };
        table[gpio] = PwmChannel::new((gpio / 2) as u8, output);
        gpio += 1;
    }
    table
}

/// Wraps of the time slice counted by [`on_counter_wrap`]
pub static OVERFLOWS: AtomicU32 = AtomicU32::new(0);

/// Body of the `PWM_IRQ_WRAP` handler
///
/// Only counts a wrap that is still flagged, so a wrap already acknowledged
/// by [`SliceTicks::acknowledge_wrap`] is not counted twice.
pub fn on_counter_wrap() {
    if pac::PWM.ints().read().ch(TIME_SLICE) {
        pac::PWM.intr().write(|w| w.set_ch(TIME_SLICE, true));
        OVERFLOWS.fetch_add(1, Ordering::Relaxed);
    }
}

/// Unmask the time slice's wrap interrupt
pub fn enable_wrap_interrupt() {
    pac::PWM.intr().write(|w| w.set_ch(TIME_SLICE, true));
    pac::PWM.inte().modify(|w| w.set_ch(TIME_SLICE, true));
    // SAFETY: the handler only touches the PWM flag registers and an atomic
    unsafe { interrupt::PWM_IRQ_WRAP.enable() };
}

/// The eight slices driving the motor outputs
pub struct Rp2040PwmBank {
    slices: [Pwm<'static>; SLICE_COUNT],
    configs: [PwmConfig; SLICE_COUNT],
}

impl Rp2040PwmBank {
    /// Take the slices and motor pins; every output starts at 0 % duty
    pub fn new(p: MotorPwmPeripherals) -> Self {
        let idle = PwmConfig::default();
        let slices = [
            Pwm::new_output_ab(p.slice0, p.pin0, p.pin1, idle.clone()),
            Pwm::new_output_ab(p.slice1, p.pin2, p.pin3, idle.clone()),
            Pwm::new_output_ab(p.slice2, p.pin4, p.pin5, idle.clone()),
            Pwm::new_output_ab(p.slice3, p.pin6, p.pin7, idle.clone()),
            Pwm::new_output_ab(p.slice4, p.pin8, p.pin9, idle.clone()),
            Pwm::new_output_ab(p.slice5, p.pin10, p.pin11, idle.clone()),
            Pwm::new_output_ab(p.slice6, p.pin12, p.pin13, idle.clone()),
            Pwm::new_output_a(p.slice7, p.pin14, idle.clone()),
        ];
        let configs = core::array::from_fn(|_| idle.clone());
        Self { slices, configs }
    }

    fn apply(&mut self, counter: usize) {
        self.slices[counter].set_config(&self.configs[counter]);
    }
}

impl PwmBank for Rp2040PwmBank {
    fn counter_count(&self) -> usize {
        SLICE_COUNT
    }

    fn reconfigure(&mut self, counter: usize, divider: u8, top: u16) {
        let Some(config) = self.configs.get_mut(counter) else {
            return;
        };
        config.divider = U12F4::from_num(divider.max(1));
        config.top = top;
        self.apply(counter);
        pac::PWM.ch(counter).ctr().write(|w| w.set_ctr(0));
    }

    fn set_compare(&mut self, counter: usize, output: PwmOutput, compare: u16) {
        let Some(config) = self.configs.get_mut(counter) else {
            return;
        };
        match output {
            PwmOutput::A => config.compare_a = compare,
            PwmOutput::B => config.compare_b = compare,
        }
        self.apply(counter);
    }
}

/// Live view of the time slice counter
///
/// Only meaningful once [`enable_wrap_interrupt`] has been called.
pub struct SliceTicks {
    _private: (),
}

impl SliceTicks {
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for SliceTicks {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource for SliceTicks {
    fn counter(&self) -> u16 {
        pac::PWM.ch(TIME_SLICE).ctr().read().ctr()
    }

    fn wrap_pending(&self) -> bool {
        pac::PWM.intr().read().ch(TIME_SLICE)
    }

    fn overflows(&self) -> u32 {
        OVERFLOWS.load(Ordering::Relaxed)
    }

    fn acknowledge_wrap(&mut self) {
        pac::PWM.intr().write(|w| w.set_ch(TIME_SLICE, true));
    }
}

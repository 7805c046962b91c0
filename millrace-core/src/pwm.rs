//! Shared-frequency PWM engine
//!
//! Every motor channel is one compare output of a hardware counter. All
//! counters run at the same frequency, so a frequency change reprograms the
//! whole bank and then rewrites each channel's compare value from its
//! remembered permille duty.
//!
//! One counter also serves as the [`TimeBase`] source; frequency changes go
//! through [`TimeBase::begin_epoch`] so elapsed time stays continuous.

use millrace_hal::pwm::{CounterTiming, PwmBank, PwmOutput, TickSource};

use crate::config::PwmLimits;
use crate::timebase::TimeBase;
use crate::{MAX_DUTY, MOTOR_COUNT};

/// Binding of one motor channel to a counter output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PwmChannel {
    pub counter: u8,
    pub output: PwmOutput,
}

impl PwmChannel {
    pub const fn new(counter: u8, output: PwmOutput) -> Self {
        Self { counter, output }
    }
}

/// Divider and top value for one frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CounterSettings {
    pub divider: u8,
    pub top: u16,
}

/// Pick the smallest divider that lets one period fit the counter
///
/// Returns `None` for 0 Hz. Frequencies too low for the largest divider get
/// the longest period the hardware supports.
pub fn compute_settings(timing: &CounterTiming, hz: u32) -> Option<CounterSettings> {
    if hz == 0 {
        return None;
    }
    let max_counts = timing.max_top as u32 + 1;
    let max_divider = timing.max_divider.max(1);

    let divider = (1..=max_divider)
        .find(|&d| timing.clock_hz / (d as u32).saturating_mul(hz) <= max_counts)
        .unwrap_or(max_divider);
    let counts = (timing.clock_hz / (divider as u32).saturating_mul(hz)).min(max_counts);
    let top = counts.saturating_sub(1).max(1) as u16;

    Some(CounterSettings { divider, top })
}

/// Compare value for a permille duty; never exceeds `top`
pub fn compare_for(duty: u16, top: u16) -> u16 {
    (duty.min(MAX_DUTY) as u32 * top as u32 / MAX_DUTY as u32) as u16
}

/// PWM engine over a bank of shared counters
pub struct PwmEngine<B: PwmBank> {
    bank: B,
    timing: CounterTiming,
    limits: PwmLimits,
    channels: &'static [PwmChannel; MOTOR_COUNT],
    /// Permille duty per channel
    duties: [u16; MOTOR_COUNT],
    frequency_hz: u32,
    settings: CounterSettings,
}

impl<B: PwmBank> PwmEngine<B> {
    pub fn new(
        bank: B,
        timing: CounterTiming,
        limits: PwmLimits,
        channels: &'static [PwmChannel; MOTOR_COUNT],
    ) -> Self {
        let settings = compute_settings(&timing, limits.default_hz).unwrap_or(CounterSettings {
            divider: 1,
            top: timing.max_top,
        });
        Self {
            bank,
            timing,
            limits,
            channels,
            duties: [0; MOTOR_COUNT],
            frequency_hz: limits.default_hz,
            settings,
        }
    }

    /// Put every counter into PWM mode at the default frequency, all
    /// outputs at zero duty
    pub fn initialize<T: TickSource>(&mut self, timebase: &mut TimeBase<T>) {
        self.duties = [0; MOTOR_COUNT];
        let hz = self.limits.default_hz;
        self.set_global_frequency(hz, timebase);
    }

    /// Reprogram every counter to `hz`, clamped to the configured limits
    ///
    /// Returns the frequency actually applied, or `None` if `hz` is 0 (the
    /// bank is left untouched).
    pub fn set_global_frequency<T: TickSource>(
        &mut self,
        hz: u32,
        timebase: &mut TimeBase<T>,
    ) -> Option<u32> {
        let hz = self.limits.clamp(hz)?;
        let settings = compute_settings(&self.timing, hz)?;

        let bank = &mut self.bank;
        let channels = self.channels;
        let duties = &self.duties;
        timebase.begin_epoch(settings.divider, settings.top, || {
            for counter in 0..bank.counter_count() {
                bank.reconfigure(counter, settings.divider, settings.top);
            }
            for (channel, &duty) in channels.iter().zip(duties.iter()) {
                bank.set_compare(
                    channel.counter as usize,
                    channel.output,
                    compare_for(duty, settings.top),
                );
            }
        });

        self.settings = settings;
        self.frequency_hz = hz;
        Some(hz)
    }

    /// Set one channel's duty in permille, clamped to 1000
    ///
    /// Returns the duty applied. Unknown channels are ignored.
    pub fn set_duty(&mut self, motor: usize, duty: u16) -> u16 {
        let Some(&channel) = self.channels.get(motor) else {
            return 0;
        };
        let duty = duty.min(MAX_DUTY);
        self.duties[motor] = duty;

        let compare = compare_for(duty, self.settings.top);
        let bank = &mut self.bank;
        critical_section::with(|_| {
            bank.set_compare(channel.counter as usize, channel.output, compare);
        });
        duty
    }

    pub fn duty(&self, motor: usize) -> u16 {
        self.duties.get(motor).copied().unwrap_or(0)
    }

    pub fn frequency_hz(&self) -> u32 {
        self.frequency_hz
    }

    pub fn settings(&self) -> CounterSettings {
        self.settings
    }

    pub fn bank(&self) -> &B {
        &self.bank
    }
}

//! Multiplexed current sensor bank
//!
//! Four select lines pick one of sixteen analog inputs (a CD74HC4067 or
//! similar). Motor `n` sits on multiplexer channel `n`. After switching
//! channels the bank waits for the input to settle before converting.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use millrace_core::config::CurrentSenseConfig;
use millrace_core::traits::{CurrentSense, UNREADABLE_MA};
use millrace_core::MOTOR_COUNT;
use millrace_hal::adc::AnalogInput;

use super::acs712::{Acs712, EmaFilter};

/// Channels addressable through four select lines
pub const MUX_CHANNELS: usize = 16;

/// Current sensors for every motor behind one multiplexer and ADC
pub struct MuxCurrentBank<S, A, D> {
    /// Select lines, least significant first
    select: [S; 4],
    adc: A,
    delay: D,
    settle_us: u32,
    sensor: Acs712,
    /// Filtered sensor voltage per motor, in mV
    filters: [EmaFilter; MOTOR_COUNT],
}

impl<S, A, D> MuxCurrentBank<S, A, D>
where
    S: OutputPin,
    A: AnalogInput,
    D: DelayNs,
{
    pub fn new(select: [S; 4], adc: A, delay: D, config: &CurrentSenseConfig) -> Self {
        Self {
            select,
            adc,
            delay,
            settle_us: config.settle_us,
            sensor: Acs712::from_config(config),
            filters: [EmaFilter::new(config.filter_alpha_permille); MOTOR_COUNT],
        }
    }

    fn select_channel(&mut self, channel: usize) -> Option<()> {
        for (bit, pin) in self.select.iter_mut().enumerate() {
            if channel & (1 << bit) != 0 {
                pin.set_high().ok()?;
            } else {
                pin.set_low().ok()?;
            }
        }
        Some(())
    }

    /// Convert one channel, in mV
    fn sample(&mut self, channel: usize) -> Option<u32> {
        self.select_channel(channel)?;
        self.delay.delay_us(self.settle_us);
        let raw = self.adc.read_raw().ok()?;
        Some(self.sensor.millivolts(raw, self.adc.full_scale()))
    }

    pub fn sensor(&self) -> &Acs712 {
        &self.sensor
    }
}

impl<S, A, D> CurrentSense for MuxCurrentBank<S, A, D>
where
    S: OutputPin,
    A: AnalogInput,
    D: DelayNs,
{
    fn read_milliamps(&mut self, channel: usize) -> u16 {
        if channel >= MOTOR_COUNT {
            return 0;
        }

        // A failed conversion trips the overcurrent interlock and leaves
        // the filter alone
        match self.sample(channel) {
            Some(mv) => {
                let filtered = self.filters[channel].update(mv);
                self.sensor.milliamps(filtered)
            }
            None => UNREADABLE_MA,
        }
    }
}

//! Blocking ADC input
//!
//! The RP2040 ADC is 12-bit. Conversions take 2 µs, so the control loop
//! reads it synchronously.

use embassy_rp::adc::{self, Adc, Blocking, Channel};
use embassy_rp::gpio::Pull;
use millrace_hal::adc::AnalogInput;

use crate::pins::AnalogPeripherals;

/// One ADC channel on a dedicated converter
pub struct AdcInput {
    adc: Adc<'static, Blocking>,
    channel: Channel<'static>,
}

impl AdcInput {
    pub fn new(p: AnalogPeripherals) -> Self {
        Self {
            adc: Adc::new_blocking(p.adc, adc::Config::default()),
            channel: Channel::new_pin(p.input, Pull::None),
        }
    }
}

impl AnalogInput for AdcInput {
    type Error = adc::Error;

    fn read_raw(&mut self) -> Result<u16, adc::Error> {
        self.adc.blocking_read(&mut self.channel)
    }

    fn full_scale(&self) -> u16 {
        4096
    }
}

//! Register map
//!
//! Two flat regions of 16-bit registers. Holding registers are written by
//! the master and read by the control logic; input registers are written by
//! the control logic and only read by the master.
//!
//! Master writes also set a per-address flag so that a write which repeats
//! the current value is still seen by the bridge's diff pass.

use millrace_protocol::RegisterStore;

use crate::config::{DeviceConfig, RegisterLayout, REGISTER_SPACE};
use crate::MOTOR_COUNT;

/// Temperature register value of a disconnected probe
pub const TEMPERATURE_DISCONNECTED: i16 = i16::MIN;

const FLAG_WORDS: usize = REGISTER_SPACE.div_ceil(32);

/// Holding and input register storage
pub struct RegisterMap {
    holding: [u16; REGISTER_SPACE],
    input: [u16; REGISTER_SPACE],
    /// Holding addresses written by the master since last taken
    written: [u32; FLAG_WORDS],
    layout: RegisterLayout,
}

impl RegisterMap {
    pub fn new(layout: RegisterLayout) -> Self {
        Self {
            holding: [0; REGISTER_SPACE],
            input: [0; REGISTER_SPACE],
            written: [0; FLAG_WORDS],
            layout,
        }
    }

    pub fn layout(&self) -> &RegisterLayout {
        &self.layout
    }

    /// Write the boot-time holding defaults and mark every reading as
    /// not yet available
    pub fn load_defaults(&mut self, config: &DeviceConfig) {
        let l = self.layout;
        let t = &config.thresholds;

        for motor in 0..MOTOR_COUNT {
            self.set_holding(l.duty(motor), 0);
            self.set_input(l.current(motor), 0);
            self.set_input_i16(l.temperature(motor), TEMPERATURE_DISCONNECTED);
        }
        self.set_holding(l.global_frequency, config.pwm.default_hz.min(u16::MAX as u32) as u16);
        self.set_holding_i16(l.motor_temp_critical, t.motor_temp_critical);
        self.set_holding_i16(l.motor_temp_warning, t.motor_temp_warning);
        self.set_holding(l.motor_current_critical, t.motor_current_critical);
        self.set_holding_i16(l.air_temp_low, t.air_temp_low);
        self.set_holding_i16(l.air_temp_high, t.air_temp_high);
        self.set_holding_i16(l.water_temp_low, t.water_temp_low);
        self.set_holding_i16(l.water_temp_high, t.water_temp_high);
        self.set_holding(l.start_stop, 1);

        self.set_input_i16(l.air_temperature, TEMPERATURE_DISCONNECTED);
        self.set_input_i16(l.water_temperature, TEMPERATURE_DISCONNECTED);
        self.written = [0; FLAG_WORDS];
    }

    /// Holding register value; addresses outside the space read as 0
    pub fn holding(&self, address: u16) -> u16 {
        self.holding.get(address as usize).copied().unwrap_or(0)
    }

    pub fn holding_i16(&self, address: u16) -> i16 {
        self.holding(address) as i16
    }

    /// Internal holding write; does not count as a master write
    pub fn set_holding(&mut self, address: u16, value: u16) {
        if let Some(slot) = self.holding.get_mut(address as usize) {
            *slot = value;
        }
    }

    pub fn set_holding_i16(&mut self, address: u16, value: i16) {
        self.set_holding(address, value as u16);
    }

    pub fn input(&self, address: u16) -> u16 {
        self.input.get(address as usize).copied().unwrap_or(0)
    }

    pub fn input_i16(&self, address: u16) -> i16 {
        self.input(address) as i16
    }

    pub fn set_input(&mut self, address: u16, value: u16) {
        if let Some(slot) = self.input.get_mut(address as usize) {
            *slot = value;
        }
    }

    pub fn set_input_i16(&mut self, address: u16, value: i16) {
        self.set_input(address, value as u16);
    }

    /// Publish a 64-bit value across four input registers, low word first
    pub fn publish_u64(&mut self, base: u16, value: u64) {
        for word in 0..4u16 {
            self.set_input(base + word, (value >> (16 * word)) as u16);
        }
    }

    /// Whether the master wrote `address` since the last call, clearing
    /// the flag
    pub fn take_written(&mut self, address: u16) -> bool {
        let index = address as usize;
        if index >= REGISTER_SPACE {
            return false;
        }
        let (word, bit) = (index / 32, index % 32);
        let set = self.written[word] & (1 << bit) != 0;
        self.written[word] &= !(1 << bit);
        set
    }
}

impl RegisterStore for RegisterMap {
    fn holding(&self, address: u16) -> Option<u16> {
        self.holding.get(address as usize).copied()
    }

    fn input(&self, address: u16) -> Option<u16> {
        self.input.get(address as usize).copied()
    }

    fn write_holding(&mut self, address: u16, value: u16) -> bool {
        let index = address as usize;
        match self.holding.get_mut(index) {
            Some(slot) => {
                *slot = value;
                self.written[index / 32] |= 1 << (index % 32);
                true
            }
            None => false,
        }
    }
}

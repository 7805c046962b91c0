//! Register address layout
//!
//! Every register the controller exposes is located through this table, so a
//! deployment can move blocks around without touching control logic.

use heapless::Vec;

use crate::devices::Device;
use crate::MOTOR_COUNT;

/// Number of addresses in each register region (0..REGISTER_SPACE)
pub const REGISTER_SPACE: usize = 1000;

/// Layout validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LayoutError {
    /// Block starting at this address runs past the register space
    OutOfRange(u16),
    /// Block starting at this address overlaps another block
    Overlap(u16),
}

/// Addresses of every holding and input register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegisterLayout {
    // Holding registers
    /// First of `MOTOR_COUNT` commanded duty registers (permille)
    pub duty_base: u16,
    /// Shared PWM frequency (Hz)
    pub global_frequency: u16,
    /// Motor temperature critical limit (centi-°C)
    pub motor_temp_critical: u16,
    /// Motor current critical limit (mA)
    pub motor_current_critical: u16,
    /// Motor temperature warning limit (centi-°C)
    pub motor_temp_warning: u16,
    /// 0 = emergency stop, 1 = reset time epoch
    pub start_stop: u16,
    /// First of four manual actuator commands (fan, mixer, dispenser, pump)
    pub device_command_base: u16,
    pub air_temp_low: u16,
    pub air_temp_high: u16,
    pub water_temp_low: u16,
    pub water_temp_high: u16,

    // Input registers
    /// First of `MOTOR_COUNT` measured currents (mA)
    pub current_base: u16,
    /// First of `MOTOR_COUNT` measured temperatures (centi-°C)
    pub temperature_base: u16,
    /// First of `MOTOR_COUNT` status codes
    pub status_base: u16,
    /// Four words of elapsed milliseconds, low word first
    pub time_base: u16,
    /// First of four actuator state echoes
    pub device_state_base: u16,
    pub air_temperature: u16,
    pub water_temperature: u16,
    /// Number of times the bus stack was reinitialised
    pub recovery_count: u16,
}

impl Default for RegisterLayout {
    fn default() -> Self {
        Self {
            duty_base: 0,
            global_frequency: 100,
            motor_temp_critical: 500,
            motor_current_critical: 501,
            motor_temp_warning: 502,
            start_stop: 900,
            device_command_base: 911,
            air_temp_low: 921,
            air_temp_high: 922,
            water_temp_low: 931,
            water_temp_high: 932,

            current_base: 200,
            temperature_base: 300,
            status_base: 400,
            time_base: 901,
            device_state_base: 911,
            air_temperature: 920,
            water_temperature: 930,
            recovery_count: 940,
        }
    }
}

impl RegisterLayout {
    pub const fn duty(&self, motor: usize) -> u16 {
        self.duty_base + motor as u16
    }

    pub const fn current(&self, motor: usize) -> u16 {
        self.current_base + motor as u16
    }

    pub const fn temperature(&self, motor: usize) -> u16 {
        self.temperature_base + motor as u16
    }

    pub const fn status(&self, motor: usize) -> u16 {
        self.status_base + motor as u16
    }

    pub const fn device_command(&self, device: Device) -> u16 {
        self.device_command_base + device.index() as u16
    }

    pub const fn device_state(&self, device: Device) -> u16 {
        self.device_state_base + device.index() as u16
    }

    /// Check that every block fits the register space and that no two
    /// blocks in the same region overlap
    pub fn validate(&self) -> Result<(), LayoutError> {
        let motors = MOTOR_COUNT as u16;
        let holding = [
            (self.duty_base, motors),
            (self.global_frequency, 1),
            (self.motor_temp_critical, 1),
            (self.motor_current_critical, 1),
            (self.motor_temp_warning, 1),
            (self.start_stop, 1),
            (self.device_command_base, Device::ALL.len() as u16),
            (self.air_temp_low, 1),
            (self.air_temp_high, 1),
            (self.water_temp_low, 1),
            (self.water_temp_high, 1),
        ];
        let input = [
            (self.current_base, motors),
            (self.temperature_base, motors),
            (self.status_base, motors),
            (self.time_base, 4),
            (self.device_state_base, Device::ALL.len() as u16),
            (self.air_temperature, 1),
            (self.water_temperature, 1),
            (self.recovery_count, 1),
        ];
        check_blocks(&holding)?;
        check_blocks(&input)
    }
}

fn check_blocks(blocks: &[(u16, u16)]) -> Result<(), LayoutError> {
    let mut seen: Vec<(u32, u32), 16> = Vec::new();
    for &(start, len) in blocks {
        let begin = start as u32;
        let end = begin + len as u32;
        if end > REGISTER_SPACE as u32 {
            return Err(LayoutError::OutOfRange(start));
        }
        if seen.iter().any(|&(b, e)| begin < e && b < end) {
            return Err(LayoutError::Overlap(start));
        }
        seen.push((begin, end))
            .map_err(|_| LayoutError::OutOfRange(start))?;
    }
    Ok(())
}

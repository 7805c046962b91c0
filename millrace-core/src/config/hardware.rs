//! Hardware configuration types
//!
//! Pin assignments, probe addressing and current sensor calibration. Motor
//! outputs and the bus UART pins are fixed by the board and do not appear
//! here.

use crate::MOTOR_COUNT;

/// One-wire ROM code (family, 6-byte serial, CRC)
pub type RomCode = [u8; 8];

/// Pin configuration with optional inversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinConfig {
    /// GPIO pin number (0-29 for RP2040)
    pub pin: u8,
    /// Pin is active-low (inverted)
    pub inverted: bool,
}

impl PinConfig {
    pub const fn new(pin: u8) -> Self {
        Self {
            pin,
            inverted: false,
        }
    }

    /// Create an inverted (active-low) pin
    pub const fn inverted(pin: u8) -> Self {
        Self {
            pin,
            inverted: true,
        }
    }
}

/// Temperature probe addressing on the shared one-wire bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProbeConfig {
    /// One-wire data pin
    pub bus_pin: u8,
    /// Probe per motor; `None` leaves that motor in sensor fault
    pub motor_roms: [Option<RomCode>; MOTOR_COUNT],
    pub air_rom: Option<RomCode>,
    pub water_rom: Option<RomCode>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            bus_pin: 19,
            motor_roms: [None; MOTOR_COUNT],
            air_rom: None,
            water_rom: None,
        }
    }
}

/// Multiplexed Hall-effect current sensing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CurrentSenseConfig {
    /// ADC input carrying the multiplexer output
    pub adc_pin: u8,
    /// Multiplexer channel select lines, least significant first
    pub select_pins: [u8; 4],
    /// Settling time after switching channel (µs)
    pub settle_us: u32,
    /// ADC reference voltage (mV)
    pub reference_mv: u16,
    /// Sensor output at zero current (mV, after any divider)
    pub zero_offset_mv: u16,
    /// Sensor sensitivity (mV per A, after any divider)
    pub millivolts_per_amp: u16,
    /// Exponential filter weight of a new sample (permille)
    pub filter_alpha_permille: u16,
}

impl Default for CurrentSenseConfig {
    fn default() -> Self {
        Self {
            adc_pin: 26,
            select_pins: [20, 21, 22, 23],
            settle_us: 10,
            reference_mv: 3300,
            zero_offset_mv: 1650,
            millivolts_per_amp: 185,
            filter_alpha_permille: 150,
        }
    }
}

/// Board wiring not fixed by the PCB
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HardwareConfig {
    /// RS-485 transceiver driver enable
    pub de_pin: PinConfig,
    pub fan_pin: PinConfig,
    pub mixer_pin: PinConfig,
    pub dispenser_pin: PinConfig,
    pub pump_pin: PinConfig,
    pub probes: ProbeConfig,
    pub current: CurrentSenseConfig,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            de_pin: PinConfig::new(18),
            fan_pin: PinConfig::new(24),
            mixer_pin: PinConfig::new(25),
            dispenser_pin: PinConfig::new(27),
            pump_pin: PinConfig::new(28),
            probes: ProbeConfig::default(),
            current: CurrentSenseConfig::default(),
        }
    }
}

impl HardwareConfig {
    /// Every configured GPIO, for conflict checks
    pub fn used_pins(&self) -> [u8; 11] {
        let c = &self.current;
        [
            self.de_pin.pin,
            self.fan_pin.pin,
            self.mixer_pin.pin,
            self.dispenser_pin.pin,
            self.pump_pin.pin,
            self.probes.bus_pin,
            c.adc_pin,
            c.select_pins[0],
            c.select_pins[1],
            c.select_pins[2],
            c.select_pins[3],
        ]
    }

    /// First pin assigned twice, if any
    pub fn duplicate_pin(&self) -> Option<u8> {
        let pins = self.used_pins();
        pins.iter()
            .enumerate()
            .find(|&(i, pin)| pins[i + 1..].contains(pin))
            .map(|(_, &pin)| pin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_wiring_has_no_conflicts() {
        assert_eq!(HardwareConfig::default().duplicate_pin(), None);
    }

    #[test]
    fn test_duplicate_pin_detected() {
        let config = HardwareConfig {
            pump_pin: PinConfig::new(19),
            ..HardwareConfig::default()
        };
        assert_eq!(config.duplicate_pin(), Some(19));
    }

    #[test]
    fn test_inverted_pin() {
        let pin = PinConfig::inverted(24);
        assert!(pin.inverted);
        assert_eq!(pin.pin, 24);
    }
}

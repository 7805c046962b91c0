//! Simple TOML parser for device configuration
//!
//! This is a minimal, allocation-free parser that handles only the subset
//! needed for `device.toml`. It does NOT support the full TOML language.
//!
//! Supported features:
//! - Key = value pairs (string, integer)
//! - [section] headers
//! - Single-line arrays of strings: select = ["gpio20", "gpio21"]
//! - Comments (# ...)
//!
//! Full syntax checking happens in build.rs; this parser only has to
//! recover the values.

use millrace_core::config::{
    DeviceConfig, HardwareConfig, LayoutError, PinConfig, RomCode, ThresholdPolicy,
};
use millrace_core::MOTOR_COUNT;
use millrace_drivers::onewire::crc8;

/// Parse error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    /// Invalid section header
    InvalidSection,
    /// Invalid value type or out-of-range value
    InvalidValue,
    /// Too many items in an array
    TooManyItems,
    /// Invalid pin string
    InvalidPin,
    /// Probe address not 16 hex digits or failing its CRC
    InvalidRom,
    /// Register blocks leave the address space or overlap
    InvalidLayout(LayoutError),
    /// GPIO assigned to two functions
    DuplicatePin(u8),
}

/// Current parsing context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Root,
    Modbus,
    Registers,
    Thresholds,
    Pwm,
    Schedule,
    Pins,
    Probes,
    Current,
}

/// Everything `device.toml` describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FirmwareConfig {
    pub device: DeviceConfig,
    pub hardware: HardwareConfig,
}

/// Parse TOML configuration
///
/// Keys missing from the file keep their defaults. The result is checked
/// as a whole: register layout, pin conflicts and frequency limits.
pub fn parse_config(input: &str) -> Result<FirmwareConfig, ParseError> {
    let mut config = FirmwareConfig::default();
    let mut section = Section::Root;

    for line in input.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            section = parse_section_header(&line[1..line.len() - 1])?;
            continue;
        }

        if let Some((key, value)) = parse_key_value(line) {
            apply_value(section, key, value, &mut config)?;
        }
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &FirmwareConfig) -> Result<(), ParseError> {
    let device = &config.device;
    device
        .registers
        .validate()
        .map_err(ParseError::InvalidLayout)?;

    if let Some(pin) = config.hardware.duplicate_pin() {
        return Err(ParseError::DuplicatePin(pin));
    }

    let pwm = &device.pwm;
    if pwm.min_hz == 0 || pwm.min_hz > pwm.default_hz || pwm.default_hz > pwm.max_hz {
        return Err(ParseError::InvalidValue);
    }

    let schedule = &device.schedule;
    if schedule.motor_batch == 0 || schedule.motor_batch > MOTOR_COUNT {
        return Err(ParseError::InvalidValue);
    }

    if device.modbus.slave_id == 0 || device.modbus.slave_id > 247 {
        return Err(ParseError::InvalidValue);
    }

    Ok(())
}

fn parse_section_header(header: &str) -> Result<Section, ParseError> {
    match header.trim() {
        "modbus" => Ok(Section::Modbus),
        "registers" => Ok(Section::Registers),
        "thresholds" => Ok(Section::Thresholds),
        "pwm" => Ok(Section::Pwm),
        "schedule" => Ok(Section::Schedule),
        "pins" => Ok(Section::Pins),
        "probes" => Ok(Section::Probes),
        "current" => Ok(Section::Current),
        _ => Err(ParseError::InvalidSection),
    }
}

/// Parse key = value, ignoring inline comments
fn parse_key_value(line: &str) -> Option<(&str, &str)> {
    let eq_pos = line.find('=')?;
    let key = line[..eq_pos].trim();
    let value = line[eq_pos + 1..].trim();

    // Remove inline comments
    let value = if let Some(hash_pos) = value.find('#') {
        // Make sure # is not inside a string
        let quote_count = value[..hash_pos].matches('"').count();
        if quote_count % 2 == 0 {
            value[..hash_pos].trim()
        } else {
            value
        }
    } else {
        value
    };

    if key.is_empty() || value.is_empty() {
        return None;
    }

    Some((key, value))
}

/// Parse a string value (removes quotes)
fn parse_string(value: &str) -> &str {
    if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
        &value[1..value.len() - 1]
    } else {
        // Allow unquoted strings for simple values
        value
    }
}

/// Parse an integer value
fn parse_int<T: core::str::FromStr>(value: &str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidValue)
}

/// Parse a pin string like "gpio18" or "!gpio24"
fn parse_pin(value: &str) -> Result<PinConfig, ParseError> {
    let value = parse_string(value);
    let (inverted, s) = match value.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, value),
    };

    let number = s.strip_prefix("gpio").ok_or(ParseError::InvalidPin)?;
    let pin: u8 = number.parse().map_err(|_| ParseError::InvalidPin)?;
    if pin >= 30 {
        return Err(ParseError::InvalidPin);
    }

    Ok(PinConfig { pin, inverted })
}

/// Parse an array of four pins like ["gpio20", "gpio21", "gpio22", "gpio23"]
fn parse_pin_array(value: &str) -> Result<[u8; 4], ParseError> {
    let inner = value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .ok_or(ParseError::InvalidValue)?;

    let mut pins = [0u8; 4];
    let mut count = 0;
    for item in inner.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let slot = pins.get_mut(count).ok_or(ParseError::TooManyItems)?;
        *slot = parse_pin(item)?.pin;
        count += 1;
    }

    if count != pins.len() {
        return Err(ParseError::InvalidValue);
    }
    Ok(pins)
}

/// Parse a probe ROM code like "02-1C-B8-01-00-00-00-A2", or "none"
fn parse_rom(value: &str) -> Result<Option<RomCode>, ParseError> {
    let value = parse_string(value);
    if value == "none" {
        return Ok(None);
    }

    let mut rom = [0u8; 8];
    let mut nibbles = 0;
    for c in value.chars().filter(|&c| c != '-') {
        let digit = c.to_digit(16).ok_or(ParseError::InvalidRom)? as u8;
        let byte = rom.get_mut(nibbles / 2).ok_or(ParseError::InvalidRom)?;
        *byte = *byte << 4 | digit;
        nibbles += 1;
    }

    if nibbles != 16 || crc8(&rom[..7]) != rom[7] {
        return Err(ParseError::InvalidRom);
    }
    Ok(Some(rom))
}

fn parse_policy(value: &str) -> Result<ThresholdPolicy, ParseError> {
    match parse_string(value) {
        "band" => Ok(ThresholdPolicy::Band),
        "upper_only" => Ok(ThresholdPolicy::UpperOnly),
        _ => Err(ParseError::InvalidValue),
    }
}

/// Apply a parsed value to the appropriate config field
fn apply_value(
    section: Section,
    key: &str,
    value: &str,
    config: &mut FirmwareConfig,
) -> Result<(), ParseError> {
    let device = &mut config.device;
    let hardware = &mut config.hardware;

    match section {
        Section::Root => {}
        Section::Modbus => {
            let m = &mut device.modbus;
            match key {
                "slave_id" => m.slave_id = parse_int(value)?,
                "baudrate" => m.baudrate = parse_int(value)?,
                "max_errors" => m.max_errors = parse_int(value)?,
                _ => {} // Ignore unknown keys
            }
        }
        Section::Registers => {
            let r = &mut device.registers;
            let field = match key {
                "duty_base" => &mut r.duty_base,
                "global_frequency" => &mut r.global_frequency,
                "motor_temp_critical" => &mut r.motor_temp_critical,
                "motor_current_critical" => &mut r.motor_current_critical,
                "motor_temp_warning" => &mut r.motor_temp_warning,
                "start_stop" => &mut r.start_stop,
                "device_command_base" => &mut r.device_command_base,
                "air_temp_low" => &mut r.air_temp_low,
                "air_temp_high" => &mut r.air_temp_high,
                "water_temp_low" => &mut r.water_temp_low,
                "water_temp_high" => &mut r.water_temp_high,
                "current_base" => &mut r.current_base,
                "temperature_base" => &mut r.temperature_base,
                "status_base" => &mut r.status_base,
                "time_base" => &mut r.time_base,
                "device_state_base" => &mut r.device_state_base,
                "air_temperature" => &mut r.air_temperature,
                "water_temperature" => &mut r.water_temperature,
                "recovery_count" => &mut r.recovery_count,
                _ => return Ok(()),
            };
            *field = parse_int(value)?;
        }
        Section::Thresholds => {
            let t = &mut device.thresholds;
            match key {
                "motor_temp_critical" => t.motor_temp_critical = parse_int(value)?,
                "motor_temp_warning" => t.motor_temp_warning = parse_int(value)?,
                "motor_current_critical" => t.motor_current_critical = parse_int(value)?,
                "air_temp_low" => t.air_temp_low = parse_int(value)?,
                "air_temp_high" => t.air_temp_high = parse_int(value)?,
                "water_temp_low" => t.water_temp_low = parse_int(value)?,
                "water_temp_high" => t.water_temp_high = parse_int(value)?,
                "policy" => device.actuator_policy = parse_policy(value)?,
                _ => {}
            }
        }
        Section::Pwm => {
            let p = &mut device.pwm;
            match key {
                "default_hz" => p.default_hz = parse_int(value)?,
                "min_hz" => p.min_hz = parse_int(value)?,
                "max_hz" => p.max_hz = parse_int(value)?,
                _ => {}
            }
        }
        Section::Schedule => {
            let s = &mut device.schedule;
            match key {
                "motor_period_ms" => s.motor_period_ms = parse_int(value)?,
                "motor_batch" => s.motor_batch = parse_int(value)?,
                "temperature_period_ms" => s.temperature_period_ms = parse_int(value)?,
                _ => {}
            }
        }
        Section::Pins => match key {
            "de" => hardware.de_pin = parse_pin(value)?,
            "fan" => hardware.fan_pin = parse_pin(value)?,
            "mixer" => hardware.mixer_pin = parse_pin(value)?,
            "dispenser" => hardware.dispenser_pin = parse_pin(value)?,
            "pump" => hardware.pump_pin = parse_pin(value)?,
            _ => {}
        },
        Section::Probes => {
            let p = &mut hardware.probes;
            match key {
                "bus" => p.bus_pin = parse_pin(value)?.pin,
                "air" => p.air_rom = parse_rom(value)?,
                "water" => p.water_rom = parse_rom(value)?,
                _ => {
                    let Some(index) = key.strip_prefix("motor") else {
                        return Ok(());
                    };
                    let index: usize = parse_int(index)?;
                    let slot = p.motor_roms.get_mut(index).ok_or(ParseError::TooManyItems)?;
                    *slot = parse_rom(value)?;
                }
            }
        }
        Section::Current => {
            let c = &mut hardware.current;
            match key {
                "adc" => c.adc_pin = parse_pin(value)?.pin,
                "select" => c.select_pins = parse_pin_array(value)?,
                "settle_us" => c.settle_us = parse_int(value)?,
                "reference_mv" => c.reference_mv = parse_int(value)?,
                "zero_offset_mv" => c.zero_offset_mv = parse_int(value)?,
                "millivolts_per_amp" => c.millivolts_per_amp = parse_int(value)?,
                "filter_alpha_permille" => c.filter_alpha_permille = parse_int(value)?,
                _ => {}
            }
        }
    }

    Ok(())
}

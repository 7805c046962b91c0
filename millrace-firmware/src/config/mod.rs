//! Configuration loading and parsing
//!
//! The device configuration is compiled into the firmware from
//! `device.toml` and parsed at boot by a custom no_std parser.

pub mod toml;

use defmt::*;

pub use toml::{parse_config, FirmwareConfig, ParseError};

/// Embedded configuration (compiled into firmware)
/// Edit device.toml and rebuild to customize
pub const EMBEDDED_CONFIG: &str = include_str!("../../device.toml");

/// Parse the embedded configuration, falling back to defaults
///
/// build.rs has already validated the file, so a failure here means the
/// runtime parser and the build check disagree.
pub fn load() -> FirmwareConfig {
    match parse_config(EMBEDDED_CONFIG) {
        Ok(config) => {
            info!(
                "Loaded device.toml: slave {} @ {} baud, {} Hz PWM",
                config.device.modbus.slave_id,
                config.device.modbus.baudrate,
                config.device.pwm.default_hz
            );
            config
        }
        Err(e) => {
            error!("device.toml rejected: {:?}, using defaults", e);
            FirmwareConfig::default()
        }
    }
}

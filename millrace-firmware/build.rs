//! Build script for millrace-firmware
//!
//! - Sets up linker search paths for memory.x
//! - Validates device.toml at compile time

use std::collections::BTreeMap;
use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Register addresses are 0-999
const REGISTER_SPACE: i64 = 1000;

const MOTOR_COUNT: i64 = 15;

/// GPIOs with a fixed function: motor PWM 0-14, UART 16/17, ADC 26
const RESERVED_PINS: u32 = 0x7FFF | 1 << 16 | 1 << 17 | 1 << 26;

const BAUD_RATES: [i64; 8] = [1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];

/// Holding register blocks: key, default, length
const HOLDING_BLOCKS: [(&str, i64, i64); 11] = [
    ("duty_base", 0, MOTOR_COUNT),
    ("global_frequency", 100, 1),
    ("motor_temp_critical", 500, 1),
    ("motor_current_critical", 501, 1),
    ("motor_temp_warning", 502, 1),
    ("start_stop", 900, 1),
    ("device_command_base", 911, 4),
    ("air_temp_low", 921, 1),
    ("air_temp_high", 922, 1),
    ("water_temp_low", 931, 1),
    ("water_temp_high", 932, 1),
];

/// Input register blocks: key, default, length
const INPUT_BLOCKS: [(&str, i64, i64); 8] = [
    ("current_base", 200, MOTOR_COUNT),
    ("temperature_base", 300, MOTOR_COUNT),
    ("status_base", 400, MOTOR_COUNT),
    ("time_base", 901, 4),
    ("device_state_base", 911, 4),
    ("air_temperature", 920, 1),
    ("water_temperature", 930, 1),
    ("recovery_count", 940, 1),
];

fn main() {
    setup_linker();
    validate_config();
}

/// Set up linker search paths and scripts for memory.x
fn setup_linker() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    // Copy memory.x to the output directory
    let memory_x = include_bytes!("memory.x");
    let mut f = File::create(out_dir.join("memory.x")).unwrap();
    f.write_all(memory_x).unwrap();

    // Tell rustc where to find memory.x
    println!("cargo:rustc-link-search={}", out_dir.display());

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tlink-rp.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");

    // Re-run if memory.x changes
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");
}

/// Validate device.toml configuration at compile time
fn validate_config() {
    println!("cargo:rerun-if-changed=device.toml");

    let config_path = Path::new("device.toml");

    if !config_path.exists() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: device.toml not found!                                   ║\n\
            ║                                                                  ║\n\
            ║  The firmware embeds a device.toml configuration file.           ║\n\
            ║  Please create one in the millrace-firmware directory.           ║\n\
            ╚══════════════════════════════════════════════════════════════════╝\n"
        );
    }

    let config_content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Failed to read device.toml                               ║\n\
                ║                                                                  ║\n\
                ║  Error: {:<56} ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                e
            );
        }
    };

    let config: toml::Value = match toml::from_str(&config_content) {
        Ok(value) => value,
        Err(e) => {
            let error_msg = e.to_string();
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Invalid TOML syntax in device.toml                       ║\n\
                ╠══════════════════════════════════════════════════════════════════╣\n\
                ║                                                                  ║\n\
                {}\n\
                ║                                                                  ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                format_error_lines(&error_msg)
            );
        }
    };

    validate_required_sections(&config);

    let mut errors = Vec::new();
    validate_modbus(&config, &mut errors);
    validate_registers(&config, &mut errors);
    validate_thresholds(&config, &mut errors);
    validate_pwm(&config, &mut errors);
    validate_schedule(&config, &mut errors);
    validate_pins(&config, &mut errors);
    validate_probes(&config, &mut errors);
    report("Invalid values in device.toml", &errors);

    println!("cargo:warning=device.toml validated successfully");
}

/// Format error message lines with box drawing
fn format_error_lines(msg: &str) -> String {
    msg.lines()
        .map(|line| {
            let truncated = if line.len() > 64 {
                format!("{}...", &line[..61])
            } else {
                line.to_string()
            };
            format!("║  {:<64} ║", truncated)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Panic with every collected error in one box
fn report(title: &str, errors: &[String]) {
    if errors.is_empty() {
        return;
    }
    panic!(
        "\n\
        ╔══════════════════════════════════════════════════════════════════╗\n\
        ║  ERROR: {:<56} ║\n\
        ╠══════════════════════════════════════════════════════════════════╣\n\
        {}\n\
        ╚══════════════════════════════════════════════════════════════════╝\n",
        title,
        errors
            .iter()
            .map(|e| format!("║  • {:<62} ║", e))
            .collect::<Vec<_>>()
            .join("\n")
    );
}

fn validate_required_sections(config: &toml::Value) {
    let errors: Vec<String> = ["modbus", "registers", "pins", "probes", "current"]
        .iter()
        .filter(|name| config.get(**name).and_then(|v| v.as_table()).is_none())
        .map(|name| format!("Missing [{}] section", name))
        .collect();
    report("Missing required sections in device.toml", &errors);
}

/// Integer at `section.key`, or `default` when absent
fn int_or(config: &toml::Value, section: &str, key: &str, default: i64, errors: &mut Vec<String>) -> i64 {
    match config.get(section).and_then(|s| s.get(key)) {
        None => default,
        Some(value) => value.as_integer().unwrap_or_else(|| {
            errors.push(format!("[{}] {} must be an integer", section, key));
            default
        }),
    }
}

fn check_range(errors: &mut Vec<String>, section: &str, key: &str, value: i64, min: i64, max: i64) {
    if value < min || value > max {
        errors.push(format!("[{}] {} = {} outside {}..={}", section, key, value, min, max));
    }
}

fn validate_modbus(config: &toml::Value, errors: &mut Vec<String>) {
    let slave_id = int_or(config, "modbus", "slave_id", 1, errors);
    check_range(errors, "modbus", "slave_id", slave_id, 1, 247);

    let baudrate = int_or(config, "modbus", "baudrate", 9600, errors);
    if !BAUD_RATES.contains(&baudrate) {
        errors.push(format!("[modbus] baudrate {} is not a standard rate", baudrate));
    }

    let max_errors = int_or(config, "modbus", "max_errors", 10, errors);
    check_range(errors, "modbus", "max_errors", max_errors, 1, 255);
}

/// Register blocks must fit the address space and not overlap within one space
fn validate_registers(config: &toml::Value, errors: &mut Vec<String>) {
    if let Some(table) = config.get("registers").and_then(|v| v.as_table()) {
        for key in table.keys() {
            let known = HOLDING_BLOCKS
                .iter()
                .chain(INPUT_BLOCKS.iter())
                .any(|(name, _, _)| name == key);
            if !known {
                errors.push(format!("[registers] unknown key {}", key));
            }
        }
    }

    for (space, blocks) in [("holding", &HOLDING_BLOCKS[..]), ("input", &INPUT_BLOCKS[..])] {
        let mut seen: Vec<(&str, i64, i64)> = Vec::new();
        for &(key, default, len) in blocks {
            let start = int_or(config, "registers", key, default, errors);
            let end = start + len;
            if start < 0 || end > REGISTER_SPACE {
                errors.push(format!("[registers] {} block {}..{} outside 0..1000", key, start, end));
                continue;
            }
            if let Some((other, _, _)) = seen.iter().find(|&&(_, b, e)| start < e && b < end) {
                errors.push(format!("[registers] {} overlaps {} ({} registers)", key, other, space));
            }
            seen.push((key, start, end));
        }
    }
}

/// Temperature in hundredths of a degree, within the DS18B20 range
fn temperature(config: &toml::Value, key: &str, default: i64, errors: &mut Vec<String>) -> i64 {
    let value = int_or(config, "thresholds", key, default, errors);
    check_range(errors, "thresholds", key, value, -5500, 12500);
    value
}

fn validate_thresholds(config: &toml::Value, errors: &mut Vec<String>) {
    let critical = temperature(config, "motor_temp_critical", 6000, errors);
    let warning = temperature(config, "motor_temp_warning", 5000, errors);
    if warning >= critical {
        errors.push("[thresholds] motor_temp_warning must be below motor_temp_critical".into());
    }

    let current = int_or(config, "thresholds", "motor_current_critical", 900, errors);
    check_range(errors, "thresholds", "motor_current_critical", current, 1, 65535);

    for probe in ["air", "water"] {
        let low = temperature(config, &format!("{}_temp_low", probe), 5000, errors);
        let high = temperature(config, &format!("{}_temp_high", probe), 6000, errors);
        if low >= high {
            errors.push(format!("[thresholds] {}_temp_low must be below {}_temp_high", probe, probe));
        }
    }

    if let Some(policy) = config.get("thresholds").and_then(|s| s.get("policy")) {
        match policy.as_str() {
            Some("band") | Some("upper_only") => {}
            _ => errors.push("[thresholds] policy must be \"band\" or \"upper_only\"".into()),
        }
    }
}

fn validate_pwm(config: &toml::Value, errors: &mut Vec<String>) {
    let min = int_or(config, "pwm", "min_hz", 100, errors);
    let default = int_or(config, "pwm", "default_hz", 1000, errors);
    let max = int_or(config, "pwm", "max_hz", 30_000, errors);
    check_range(errors, "pwm", "min_hz", min, 1, 1_000_000);
    check_range(errors, "pwm", "max_hz", max, 1, 1_000_000);
    if !(min <= default && default <= max) {
        errors.push(format!("[pwm] need min_hz <= default_hz <= max_hz ({} / {} / {})", min, default, max));
    }
}

fn validate_schedule(config: &toml::Value, errors: &mut Vec<String>) {
    let motor = int_or(config, "schedule", "motor_period_ms", 500, errors);
    check_range(errors, "schedule", "motor_period_ms", motor, 1, 60_000);
    let batch = int_or(config, "schedule", "motor_batch", 3, errors);
    check_range(errors, "schedule", "motor_batch", batch, 1, MOTOR_COUNT);
    let temperature = int_or(config, "schedule", "temperature_period_ms", 1000, errors);
    check_range(errors, "schedule", "temperature_period_ms", temperature, 1, 60_000);
}

/// Parse "gpioNN" or "!gpioNN" into a pin number
fn parse_pin(value: &str) -> Option<u32> {
    value.trim_start_matches('!').strip_prefix("gpio")?.parse().ok()
}

fn validate_pins(config: &toml::Value, errors: &mut Vec<String>) {
    let mut owners: BTreeMap<u32, String> = BTreeMap::new();
    let mut claim = |name: String, value: Option<&toml::Value>, errors: &mut Vec<String>| {
        let Some(value) = value else {
            return;
        };
        let Some(pin) = value.as_str().and_then(parse_pin) else {
            errors.push(format!("{} is not a pin like \"gpio18\"", name));
            return;
        };
        if pin >= 30 {
            errors.push(format!("{} = gpio{} does not exist", name, pin));
        } else if RESERVED_PINS & (1 << pin) != 0 {
            errors.push(format!("{} = gpio{} is reserved (motor PWM or UART)", name, pin));
        } else if let Some(owner) = owners.insert(pin, name.clone()) {
            errors.push(format!("gpio{} used by both {} and {}", pin, owner, name));
        }
    };

    let pins = config.get("pins");
    for key in ["de", "fan", "mixer", "dispenser", "pump"] {
        claim(format!("[pins] {}", key), pins.and_then(|s| s.get(key)), errors);
    }
    claim(
        "[probes] bus".into(),
        config.get("probes").and_then(|s| s.get("bus")),
        errors,
    );

    let current = config.get("current");
    match current.and_then(|s| s.get("select")).map(|v| v.as_array()) {
        None => {}
        Some(Some(select)) if select.len() == 4 => {
            for (i, value) in select.iter().enumerate() {
                claim(format!("[current] select[{}]", i), Some(value), errors);
            }
        }
        Some(_) => errors.push("[current] select must list exactly 4 pins".into()),
    }

    if let Some(adc) = current.and_then(|s| s.get("adc")) {
        if adc.as_str().and_then(parse_pin) != Some(26) {
            errors.push("[current] adc must be gpio26".into());
        }
    }
}

/// Parse a 1-Wire ROM code written as 16 hex digits, dashes allowed
fn parse_rom(value: &str) -> Option<[u8; 8]> {
    let digits: String = value.chars().filter(|&c| c != '-').collect();
    if digits.len() != 16 || !digits.is_ascii() {
        return None;
    }
    let mut rom = [0u8; 8];
    for (i, byte) in rom.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&digits[2 * i..2 * i + 2], 16).ok()?;
    }
    Some(rom)
}

/// Dallas/Maxim CRC-8
fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |mut crc, &byte| {
        let mut byte = byte;
        for _ in 0..8 {
            let mix = (crc ^ byte) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            byte >>= 1;
        }
        crc
    })
}

fn validate_probes(config: &toml::Value, errors: &mut Vec<String>) {
    let Some(probes) = config.get("probes").and_then(|v| v.as_table()) else {
        return;
    };

    let mut seen: BTreeMap<[u8; 8], &str> = BTreeMap::new();
    for (key, value) in probes {
        if key == "bus" {
            continue;
        }
        let slot = match key.strip_prefix("motor") {
            Some(n) => n.parse::<i64>().is_ok_and(|n| (0..MOTOR_COUNT).contains(&n)),
            None => key == "air" || key == "water",
        };
        if !slot {
            errors.push(format!("[probes] unknown probe slot {}", key));
            continue;
        }

        let Some(text) = value.as_str() else {
            errors.push(format!("[probes] {} must be a string", key));
            continue;
        };
        if text == "none" {
            continue;
        }
        let Some(rom) = parse_rom(text) else {
            errors.push(format!("[probes] {} = \"{}\" is not a ROM code", key, text));
            continue;
        };
        if crc8(&rom[..7]) != rom[7] {
            errors.push(format!("[probes] {} ROM code fails its CRC", key));
        } else if let Some(other) = seen.insert(rom, key.as_str()) {
            errors.push(format!("[probes] {} and {} share a ROM code", other, key));
        }
    }
}

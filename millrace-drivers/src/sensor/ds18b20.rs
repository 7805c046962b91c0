//! DS18B20 one-wire temperature probe
//!
//! All probes share one bus and are addressed by ROM code. A conversion is
//! started with CONVERT T and read back from the scratchpad once the
//! resolution-dependent conversion time has passed; the driver never waits
//! on the bus for it.
//!
//! Scratchpad layout:
//!
//! | Byte | Content |
//! |------|---------|
//! | 0-1  | temperature, 1/16 °C, little-endian two's complement |
//! | 2-3  | alarm high / low |
//! | 4    | configuration (resolution) |
//! | 5-7  | reserved |
//! | 8    | CRC-8 of bytes 0-7 |

use core::cell::RefCell;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use millrace_core::config::RomCode;
use millrace_core::traits::{SensorError, TemperatureProbe};

use crate::onewire::{crc8, OneWire, OneWireError};

const CONVERT_T: u8 = 0x44;
const READ_SCRATCHPAD: u8 = 0xBE;
const WRITE_SCRATCHPAD: u8 = 0x4E;

/// Alarm registers written alongside the configuration (unused)
const ALARM_HIGH: u8 = 0x4B;
const ALARM_LOW: u8 = 0x46;

/// Measuring range in centi-°C
const MIN_CENTI: i32 = -5500;
const MAX_CENTI: i32 = 12500;

/// Conversion resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Resolution {
    /// 0.5 °C
    Bits9,
    /// 0.25 °C
    #[default]
    Bits10,
    /// 0.125 °C
    Bits11,
    /// 0.0625 °C
    Bits12,
}

impl Resolution {
    /// Worst-case conversion time from the datasheet
    pub const fn conversion_ms(self) -> u32 {
        match self {
            Resolution::Bits9 => 94,
            Resolution::Bits10 => 188,
            Resolution::Bits11 => 375,
            Resolution::Bits12 => 750,
        }
    }

    /// Configuration register value
    const fn config_byte(self) -> u8 {
        (self.undefined_bits() ^ 0x03) << 5 | 0x1F
    }

    /// Low bits of the raw reading that are undefined at this resolution
    const fn undefined_bits(self) -> u8 {
        match self {
            Resolution::Bits9 => 3,
            Resolution::Bits10 => 2,
            Resolution::Bits11 => 1,
            Resolution::Bits12 => 0,
        }
    }
}

impl From<OneWireError> for SensorError {
    fn from(e: OneWireError) -> Self {
        match e {
            OneWireError::NoPresence => SensorError::NotPresent,
            OneWireError::BusFault => SensorError::BusFault,
            OneWireError::CrcMismatch => SensorError::CrcMismatch,
        }
    }
}

/// One DS18B20 on a shared bus
pub struct Ds18b20<'a, P, D> {
    bus: &'a RefCell<OneWire<P, D>>,
    /// `None` when no probe is fitted at this position
    rom: Option<RomCode>,
    resolution: Resolution,
    requested_at_ms: Option<u32>,
}

impl<'a, P, D> Ds18b20<'a, P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    pub fn new(bus: &'a RefCell<OneWire<P, D>>, rom: Option<RomCode>, resolution: Resolution) -> Self {
        Self {
            bus,
            rom,
            resolution,
            requested_at_ms: None,
        }
    }

    pub fn rom(&self) -> Option<&RomCode> {
        self.rom.as_ref()
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Address this probe and run `f` on the bus
    fn transaction<R>(
        &self,
        f: impl FnOnce(&mut OneWire<P, D>) -> Result<R, OneWireError>,
    ) -> Result<R, SensorError> {
        let rom = self.rom.ok_or(SensorError::NotPresent)?;
        let mut bus = self.bus.try_borrow_mut().map_err(|_| SensorError::BusFault)?;
        bus.select(Some(&rom))?;
        Ok(f(&mut bus)?)
    }

    /// Validate a scratchpad and convert its reading to centi-°C
    fn decode(&self, pad: &[u8; 9]) -> Result<i16, SensorError> {
        // A released bus reads all ones
        if pad.iter().all(|&b| b == 0xFF) {
            return Err(SensorError::NotPresent);
        }
        if crc8(&pad[..8]) != pad[8] {
            return Err(SensorError::CrcMismatch);
        }

        let mask = !((1i16 << self.resolution.undefined_bits()) - 1);
        let raw = i16::from_le_bytes([pad[0], pad[1]]) & mask;
        // 1/16 °C to 1/100 °C
        let centi = raw as i32 * 25 / 4;
        if !(MIN_CENTI..=MAX_CENTI).contains(&centi) {
            return Err(SensorError::OutOfRange);
        }
        Ok(centi as i16)
    }
}

impl<P, D> TemperatureProbe for Ds18b20<'_, P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    fn begin(&mut self) -> Result<(), SensorError> {
        let config = self.resolution.config_byte();
        self.transaction(|bus| bus.write_bytes(&[WRITE_SCRATCHPAD, ALARM_HIGH, ALARM_LOW, config]))
    }

    fn request_conversion(&mut self, now_ms: u32) -> Result<(), SensorError> {
        self.transaction(|bus| bus.write_byte(CONVERT_T))?;
        self.requested_at_ms = Some(now_ms);
        Ok(())
    }

    fn is_conversion_complete(&mut self, now_ms: u32) -> bool {
        self.requested_at_ms
            .is_some_and(|at| now_ms.wrapping_sub(at) >= self.resolution.conversion_ms())
    }

    fn read_centi_celsius(&mut self) -> Result<i16, SensorError> {
        let mut pad = [0u8; 9];
        self.transaction(|bus| {
            bus.write_byte(READ_SCRATCHPAD)?;
            bus.read_bytes(&mut pad)
        })?;
        self.decode(&pad)
    }

    fn min_conversion_interval_ms(&self) -> u32 {
        self.resolution.conversion_ms()
    }
}

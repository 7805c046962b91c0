//! Bit-banged one-wire bus master
//!
//! The bus is a single open-drain line with a pull-up. The master starts
//! every time slot by pulling the line low; devices answer by holding it
//! low during the sample window. Slot timing is tight (a read is sampled
//! 15 µs after the slot starts), so each slot runs inside a critical
//! section. Recovery time between slots is spent outside it.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use millrace_core::config::RomCode;

/// Address the single device on the bus
pub const SKIP_ROM: u8 = 0xCC;
/// Address one device by ROM code
pub const MATCH_ROM: u8 = 0x55;
/// Read the ROM code of the single device on the bus
pub const READ_ROM: u8 = 0x33;

/// One-wire bus errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OneWireError {
    /// No device answered the reset pulse
    NoPresence,
    /// Line stuck low or the pin reported an error
    BusFault,
    /// ROM code failed its checksum
    CrcMismatch,
}

/// Dallas/Maxim CRC-8 (polynomial x^8 + x^5 + x^4 + 1, reflected)
///
/// Running it over data followed by its CRC yields 0.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        let mut byte = byte;
        for _ in 0..8 {
            let mix = (crc ^ byte) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            byte >>= 1;
        }
    }
    crc
}

/// One-wire master over an open-drain pin
///
/// `set_low` pulls the line down, `set_high` releases it to the pull-up.
pub struct OneWire<P, D> {
    pin: P,
    delay: D,
}

impl<P, D> OneWire<P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    /// Create a bus master; the line is released immediately
    pub fn new(mut pin: P, delay: D) -> Self {
        let _ = pin.set_high();
        Self { pin, delay }
    }

    fn drive_low(&mut self) -> Result<(), OneWireError> {
        self.pin.set_low().map_err(|_| OneWireError::BusFault)
    }

    fn release(&mut self) -> Result<(), OneWireError> {
        self.pin.set_high().map_err(|_| OneWireError::BusFault)
    }

    fn line_low(&mut self) -> Result<bool, OneWireError> {
        self.pin.is_low().map_err(|_| OneWireError::BusFault)
    }

    /// Issue a reset pulse and wait for a presence pulse
    pub fn reset(&mut self) -> Result<(), OneWireError> {
        self.release()?;
        if self.line_low()? {
            return Err(OneWireError::BusFault);
        }

        self.drive_low()?;
        self.delay.delay_us(480);
        let present = critical_section::with(|_| {
            self.release()?;
            self.delay.delay_us(70);
            self.line_low()
        })?;
        self.delay.delay_us(410);

        if present {
            Ok(())
        } else {
            Err(OneWireError::NoPresence)
        }
    }

    fn write_bit(&mut self, bit: bool) -> Result<(), OneWireError> {
        let (low_us, recovery_us) = if bit { (6, 64) } else { (60, 10) };
        critical_section::with(|_| {
            self.drive_low()?;
            self.delay.delay_us(low_us);
            self.release()
        })?;
        self.delay.delay_us(recovery_us);
        Ok(())
    }

    fn read_bit(&mut self) -> Result<bool, OneWireError> {
        let bit = critical_section::with(|_| {
            self.drive_low()?;
            self.delay.delay_us(6);
            self.release()?;
            self.delay.delay_us(9);
            self.line_low().map(|low| !low)
        })?;
        self.delay.delay_us(55);
        Ok(bit)
    }

    /// Write one byte, least significant bit first
    pub fn write_byte(&mut self, byte: u8) -> Result<(), OneWireError> {
        for bit in 0..8 {
            self.write_bit(byte & (1 << bit) != 0)?;
        }
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), OneWireError> {
        bytes.iter().try_for_each(|&byte| self.write_byte(byte))
    }

    /// Read one byte, least significant bit first
    pub fn read_byte(&mut self) -> Result<u8, OneWireError> {
        let mut byte = 0;
        for bit in 0..8 {
            if self.read_bit()? {
                byte |= 1 << bit;
            }
        }
        Ok(byte)
    }

    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), OneWireError> {
        for byte in buf.iter_mut() {
            *byte = self.read_byte()?;
        }
        Ok(())
    }

    /// Reset the bus and address one device, or every device when `rom`
    /// is `None`
    pub fn select(&mut self, rom: Option<&RomCode>) -> Result<(), OneWireError> {
        self.reset()?;
        match rom {
            Some(rom) => {
                self.write_byte(MATCH_ROM)?;
                self.write_bytes(rom)
            }
            None => self.write_byte(SKIP_ROM),
        }
    }

    /// Read the ROM code of the only device on the bus
    ///
    /// With several devices attached their answers collide and the
    /// checksum fails.
    pub fn read_rom(&mut self) -> Result<RomCode, OneWireError> {
        self.reset()?;
        self.write_byte(READ_ROM)?;
        let mut rom = [0u8; 8];
        self.read_bytes(&mut rom)?;
        if crc8(&rom[..7]) != rom[7] {
            return Err(OneWireError::CrcMismatch);
        }
        Ok(rom)
    }
}

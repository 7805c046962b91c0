//! Serial line abstractions
//!
//! The fieldbus runs half-duplex over RS-485. Frame boundaries are found by
//! the line itself (inter-frame silence), so the trait hands out whole frames.

/// Frame-oriented serial line
pub trait SerialLine {
    /// Error type for line operations
    type Error;

    /// (Re)initialise the line with the given settings
    ///
    /// Discards any partially received frame.
    fn configure(&mut self, config: &SerialConfig) -> Result<(), Self::Error>;

    /// Poll for a complete received frame
    ///
    /// Never blocks. Returns `Ok(Some(len))` with the frame copied into
    /// `buf`, `Ok(None)` if no complete frame is available, or an error if
    /// the line reported a fault (parity, overrun, oversized frame).
    fn poll_frame(&mut self, buf: &mut [u8]) -> Result<Option<usize>, Self::Error>;

    /// Transmit a frame and return once the line is released
    fn send(&mut self, frame: &[u8]) -> Result<(), Self::Error>;
}

/// Serial line configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SerialConfig {
    /// Baud rate in bits per second
    pub baudrate: u32,
    /// Number of data bits (typically 8)
    pub data_bits: DataBits,
    /// Parity mode
    pub parity: Parity,
    /// Number of stop bits
    pub stop_bits: StopBits,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baudrate: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::Even,
            stop_bits: StopBits::One,
        }
    }
}

impl SerialConfig {
    /// 8 data bits, even parity, one stop bit at the given baud rate
    pub const fn even_parity(baudrate: u32) -> Self {
        Self {
            baudrate,
            data_bits: DataBits::Eight,
            parity: Parity::Even,
            stop_bits: StopBits::One,
        }
    }

    /// Bits on the wire per character, including start and stop bits
    pub fn bits_per_char(&self) -> u32 {
        let data = match self.data_bits {
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        };
        let parity = match self.parity {
            Parity::None => 0,
            Parity::Even | Parity::Odd => 1,
        };
        let stop = match self.stop_bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        };
        1 + data + parity + stop
    }
}

/// Number of data bits per character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataBits {
    Seven,
    Eight,
}

/// Parity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopBits {
    One,
    Two,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_8e1() {
        let config = SerialConfig::default();
        assert_eq!(config.baudrate, 9600);
        assert_eq!(config.parity, Parity::Even);
        assert_eq!(config.bits_per_char(), 11);
    }

    #[test]
    fn test_bits_per_char_without_parity() {
        let config = SerialConfig {
            parity: Parity::None,
            ..SerialConfig::even_parity(19200)
        };
        assert_eq!(config.bits_per_char(), 10);
    }
}

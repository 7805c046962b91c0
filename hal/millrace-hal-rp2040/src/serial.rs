//! RS-485 line over a buffered UART
//!
//! The UART interrupt fills a receive ring; [`Rs485Line::poll_frame`]
//! drains it without blocking, stamps the bytes with the embassy clock and
//! lets a [`FrameAssembler`] find frame boundaries by silence. Transmission
//! raises the transceiver's driver-enable line for the duration of the
//! frame.

use embassy_rp::uart;
use embassy_time::Instant;
use embedded_hal::digital::OutputPin;
use embedded_io::{Read, ReadReady, Write};
use millrace_hal::serial::{DataBits, Parity, SerialConfig, SerialLine, StopBits};
use millrace_protocol::{FrameAssembler, FrameError};

/// Serial line errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SerialError {
    /// Settings differ from those the UART was brought up with
    Unsupported,
    /// UART reported parity, framing, break or overrun
    Port,
    /// Received data did not form a frame
    Frame(FrameError),
    /// Driver-enable pin could not be switched
    Pin,
}

/// UART settings matching a line configuration
pub fn uart_config(config: &SerialConfig) -> uart::Config {
    let mut out = uart::Config::default();
    out.baudrate = config.baudrate;
    out.data_bits = match config.data_bits {
        DataBits::Seven => uart::DataBits::DataBits7,
        DataBits::Eight => uart::DataBits::DataBits8,
    };
    out.parity = match config.parity {
        Parity::None => uart::Parity::ParityNone,
        Parity::Even => uart::Parity::ParityEven,
        Parity::Odd => uart::Parity::ParityOdd,
    };
    out.stop_bits = match config.stop_bits {
        StopBits::One => uart::StopBits::STOP1,
        StopBits::Two => uart::StopBits::STOP2,
    };
    out
}

/// Half-duplex RS-485 line
///
/// The UART keeps the settings it was created with; [`SerialLine::configure`]
/// only restarts frame reception and rejects different settings.
pub struct Rs485Line<U, P> {
    port: U,
    driver_enable: P,
    settings: SerialConfig,
    assembler: FrameAssembler,
}

impl<U, P> Rs485Line<U, P>
where
    U: Read + ReadReady + Write,
    P: OutputPin,
{
    /// Wrap a UART already running at `settings`
    pub fn new(port: U, mut driver_enable: P, settings: SerialConfig) -> Self {
        let _ = driver_enable.set_low();
        Self {
            port,
            driver_enable,
            settings,
            assembler: FrameAssembler::for_line(settings.baudrate, settings.bits_per_char()),
        }
    }

    /// Move everything the UART has buffered into the assembler
    fn drain(&mut self) -> Result<(), SerialError> {
        let mut chunk = [0u8; 32];
        while self.port.read_ready().map_err(|_| SerialError::Port)? {
            let n = self.port.read(&mut chunk).map_err(|_| SerialError::Port)?;
            let now = Instant::now().as_micros();
            for &byte in &chunk[..n] {
                self.assembler.push(byte, now);
            }
            if n == 0 {
                break;
            }
        }
        Ok(())
    }
}

impl<U, P> SerialLine for Rs485Line<U, P>
where
    U: Read + ReadReady + Write,
    P: OutputPin,
{
    type Error = SerialError;

    fn configure(&mut self, config: &SerialConfig) -> Result<(), SerialError> {
        if *config != self.settings {
            return Err(SerialError::Unsupported);
        }
        self.driver_enable.set_low().map_err(|_| SerialError::Pin)?;
        // Stale bytes belong to the frame that failed
        let _ = self.drain();
        self.assembler = FrameAssembler::for_line(config.baudrate, config.bits_per_char());
        Ok(())
    }

    fn poll_frame(&mut self, buf: &mut [u8]) -> Result<Option<usize>, SerialError> {
        if let Err(e) = self.drain() {
            self.assembler.reset();
            return Err(e);
        }
        self.assembler
            .take_frame(Instant::now().as_micros(), buf)
            .map_err(SerialError::Frame)
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), SerialError> {
        self.driver_enable.set_high().map_err(|_| SerialError::Pin)?;
        let written = self
            .port
            .write_all(frame)
            .and_then(|()| self.port.flush())
            .map_err(|_| SerialError::Port);
        // Release the bus even if the write failed
        self.driver_enable.set_low().map_err(|_| SerialError::Pin)?;
        written
    }
}

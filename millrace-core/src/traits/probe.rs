//! Temperature probe trait
//!
//! Probes convert asynchronously: a conversion is requested, and the result
//! becomes readable some time later. The control loop never blocks waiting
//! for a conversion.

/// Errors that can occur with temperature sensing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// No probe answered (or none is configured)
    NotPresent,
    /// Conversions repeatedly failed to complete
    Disconnected,
    /// Scratchpad checksum mismatch
    CrcMismatch,
    /// Bus held low or otherwise unusable
    BusFault,
    /// Reading out of the probe's measuring range
    OutOfRange,
}

/// Trait for asynchronously converting temperature probes
pub trait TemperatureProbe {
    /// Prepare the probe (resolution, presence check)
    fn begin(&mut self) -> Result<(), SensorError>;

    /// Start a conversion
    fn request_conversion(&mut self, now_ms: u32) -> Result<(), SensorError>;

    /// Whether the last requested conversion has finished
    fn is_conversion_complete(&mut self, now_ms: u32) -> bool;

    /// Read the converted temperature in hundredths of a degree Celsius
    fn read_centi_celsius(&mut self) -> Result<i16, SensorError>;

    /// Shortest time between two conversion requests
    fn min_conversion_interval_ms(&self) -> u32;
}

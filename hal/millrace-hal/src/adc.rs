//! Analog input abstraction

/// Single-ended analog input
pub trait AnalogInput {
    /// Error type for conversions
    type Error;

    /// Perform one blocking conversion and return the raw code
    fn read_raw(&mut self) -> Result<u16, Self::Error>;

    /// Largest code the converter can return plus one (4096 for 12-bit)
    fn full_scale(&self) -> u16;
}

//! Motor current sensing trait

/// Reading reported for a channel whose sensor could not be sampled
pub const UNREADABLE_MA: u16 = u16::MAX;

/// Trait for a bank of motor current sensors
///
/// Readings are already filtered. A channel that cannot be read reports
/// [`UNREADABLE_MA`], which is at or above any overcurrent limit.
pub trait CurrentSense {
    /// Read the current of one motor channel in milliamps
    fn read_milliamps(&mut self, channel: usize) -> u16;
}

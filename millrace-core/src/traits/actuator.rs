//! On/off actuator trait

/// Trait for switched outputs (fan, mixer, dispenser, pump)
///
/// Implementations drive a relay, MOSFET or SSR.
pub trait Actuator {
    /// Switch the output on or off
    fn set_on(&mut self, on: bool);

    /// Check if the output is currently on
    fn is_on(&self) -> bool;
}

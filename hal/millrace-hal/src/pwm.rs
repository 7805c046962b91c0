//! PWM counter abstractions
//!
//! PWM hardware on small microcontrollers is organised as a handful of
//! counters, each driving one or more compare outputs. Every output on a
//! counter shares its period, so the period is a property of the counter,
//! not of the output.

/// Compare output of a hardware counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PwmOutput {
    A,
    B,
}

/// Clock characteristics shared by every counter in a bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CounterTiming {
    /// Counter input clock before division, in Hz
    pub clock_hz: u32,
    /// Largest programmable top value
    pub max_top: u16,
    /// Largest integer clock divider
    pub max_divider: u8,
}

/// A bank of PWM counters
pub trait PwmBank {
    /// Number of hardware counters in the bank
    fn counter_count(&self) -> usize;

    /// Reprogram one counter's clock divider and top value
    ///
    /// Implementations must restart the counter from zero so that every
    /// counter in the bank begins the new period in phase.
    fn reconfigure(&mut self, counter: usize, divider: u8, top: u16);

    /// Write the compare value of one output
    fn set_compare(&mut self, counter: usize, output: PwmOutput, compare: u16);
}

/// Free-running counter used as a time source
///
/// The counter wraps at the end of every PWM period. An interrupt handler
/// increments a wrap tally; the tally and the live counter together
/// describe elapsed time.
pub trait TickSource {
    /// Current counter value
    fn counter(&self) -> u16;

    /// Whether the counter has wrapped but the wrap interrupt has not run yet
    fn wrap_pending(&self) -> bool;

    /// Number of wraps counted by the interrupt handler
    fn overflows(&self) -> u32;

    /// Clear a pending wrap without counting it
    ///
    /// Called after the counter has been restarted, when the caller has
    /// already accounted for the pending wrap itself.
    fn acknowledge_wrap(&mut self);
}

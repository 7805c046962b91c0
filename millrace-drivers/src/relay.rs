//! GPIO relay output
//!
//! Switches an auxiliary load (fan, mixer, dispenser, pump) through a relay,
//! SSR or MOSFET driven from one GPIO pin.

use embedded_hal::digital::{OutputPin, PinState};
use millrace_core::traits::Actuator;

/// Relay driven by a GPIO pin
///
/// The pin can be configured as active-high (default) or active-low.
pub struct GpioRelay<P> {
    pin: P,
    /// If true, relay ON = pin LOW
    inverted: bool,
    /// Last state successfully written to the pin
    on: bool,
}

impl<P: OutputPin> GpioRelay<P> {
    /// Create a relay output, switched off
    ///
    /// # Arguments
    /// - `pin`: The GPIO pin to control
    /// - `inverted`: If true, the relay is ON when the pin is LOW (active-low boards)
    pub fn new(pin: P, inverted: bool) -> Self {
        let mut relay = Self {
            pin,
            inverted,
            on: false,
        };
        relay.set_on(false);
        relay
    }

    pub fn new_active_high(pin: P) -> Self {
        Self::new(pin, false)
    }

    pub fn new_active_low(pin: P) -> Self {
        Self::new(pin, true)
    }
}

impl<P: OutputPin> Actuator for GpioRelay<P> {
    fn set_on(&mut self, on: bool) {
        let level = PinState::from(on != self.inverted);
        if self.pin.set_state(level).is_ok() {
            self.on = on;
        }
    }

    fn is_on(&self) -> bool {
        self.on
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::digital::ErrorType;

    /// Mock GPIO pin for testing
    struct MockPin {
        high: bool,
        broken: bool,
    }

    impl MockPin {
        fn new() -> Self {
            Self {
                high: false,
                broken: false,
            }
        }
    }

    #[derive(Debug)]
    struct PinFault;

    impl embedded_hal::digital::Error for PinFault {
        fn kind(&self) -> embedded_hal::digital::ErrorKind {
            embedded_hal::digital::ErrorKind::Other
        }
    }

    impl ErrorType for MockPin {
        type Error = PinFault;
    }

    impl OutputPin for MockPin {
        fn set_low(&mut self) -> Result<(), PinFault> {
            if self.broken {
                return Err(PinFault);
            }
            self.high = false;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), PinFault> {
            if self.broken {
                return Err(PinFault);
            }
            self.high = true;
            Ok(())
        }
    }

    #[test]
    fn test_active_high_relay() {
        let mut relay = GpioRelay::new_active_high(MockPin::new());

        assert!(!relay.is_on());
        assert!(!relay.pin.high);

        relay.set_on(true);
        assert!(relay.is_on());
        assert!(relay.pin.high);

        relay.set_on(false);
        assert!(!relay.is_on());
        assert!(!relay.pin.high);
    }

    #[test]
    fn test_active_low_relay() {
        let mut relay = GpioRelay::new_active_low(MockPin::new());

        // Off means the pin idles high
        assert!(!relay.is_on());
        assert!(relay.pin.high);

        relay.set_on(true);
        assert!(relay.is_on());
        assert!(!relay.pin.high);
    }

    #[test]
    fn test_failed_write_keeps_state() {
        let mut relay = GpioRelay::new_active_high(MockPin::new());
        relay.pin.broken = true;

        relay.set_on(true);
        assert!(!relay.is_on());
    }

    #[test]
    fn test_actuator_trait() {
        fn cycle<A: Actuator>(a: &mut A) {
            assert!(!a.is_on());
            a.set_on(true);
            assert!(a.is_on());
        }

        let mut relay = GpioRelay::new_active_high(MockPin::new());
        cycle(&mut relay);
    }
}

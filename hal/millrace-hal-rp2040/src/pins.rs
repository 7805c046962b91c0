//! Board peripheral split and config-driven pin allocation
//!
//! Pins with a fixed hardware function are handed out as typed
//! peripherals: GPIO 0-14 carry the motor PWM outputs, GPIO 16/17 the
//! RS-485 UART and GPIO 26 the current-sense ADC input. Every other GPIO
//! goes into a [`PinBank`] and is taken by number, so relay, driver-enable,
//! one-wire and multiplexer pins come from `device.toml`.

use embassy_rp::gpio::AnyPin;
use embassy_rp::peripherals;
use embassy_rp::{Peri, Peripherals};

/// Number of user GPIOs on the RP2040
pub const GPIO_COUNT: usize = 30;

/// GPIOs claimed by typed peripherals (bit n = GPIO n)
pub const RESERVED_PINS: u32 = 0x7FFF | 1 << 16 | 1 << 17 | 1 << 26;

/// Error when requesting a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinError {
    /// Pin number out of range (0-29 valid)
    InvalidPin,
    /// Pin already taken
    AlreadyTaken,
    /// Pin reserved for a fixed function
    Reserved,
}

/// Pin bank that holds the general-purpose GPIOs and hands them out by number
pub struct PinBank {
    pins: [Option<Peri<'static, AnyPin>>; GPIO_COUNT],
}

impl PinBank {
    /// Take a pin by number
    pub fn take(&mut self, pin: u8) -> Result<Peri<'static, AnyPin>, PinError> {
        if pin as usize >= GPIO_COUNT {
            return Err(PinError::InvalidPin);
        }
        if RESERVED_PINS & (1 << pin) != 0 {
            return Err(PinError::Reserved);
        }
        self.pins[pin as usize].take().ok_or(PinError::AlreadyTaken)
    }

    /// Check if a pin is available
    pub fn is_available(&self, pin: u8) -> bool {
        self.pins.get(pin as usize).is_some_and(Option::is_some)
    }
}

/// Slices and pins of the fifteen motor outputs
pub struct MotorPwmPeripherals {
    pub slice0: Peri<'static, peripherals::PWM_SLICE0>,
    pub slice1: Peri<'static, peripherals::PWM_SLICE1>,
    pub slice2: Peri<'static, peripherals::PWM_SLICE2>,
    pub slice3: Peri<'static, peripherals::PWM_SLICE3>,
    pub slice4: Peri<'static, peripherals::PWM_SLICE4>,
    pub slice5: Peri<'static, peripherals::PWM_SLICE5>,
    pub slice6: Peri<'static, peripherals::PWM_SLICE6>,
    pub slice7: Peri<'static, peripherals::PWM_SLICE7>,
    pub pin0: Peri<'static, peripherals::PIN_0>,
    pub pin1: Peri<'static, peripherals::PIN_1>,
    pub pin2: Peri<'static, peripherals::PIN_2>,
    pub pin3: Peri<'static, peripherals::PIN_3>,
    pub pin4: Peri<'static, peripherals::PIN_4>,
    pub pin5: Peri<'static, peripherals::PIN_5>,
    pub pin6: Peri<'static, peripherals::PIN_6>,
    pub pin7: Peri<'static, peripherals::PIN_7>,
    pub pin8: Peri<'static, peripherals::PIN_8>,
    pub pin9: Peri<'static, peripherals::PIN_9>,
    pub pin10: Peri<'static, peripherals::PIN_10>,
    pub pin11: Peri<'static, peripherals::PIN_11>,
    pub pin12: Peri<'static, peripherals::PIN_12>,
    pub pin13: Peri<'static, peripherals::PIN_13>,
    pub pin14: Peri<'static, peripherals::PIN_14>,
}

/// UART0 and its pins
pub struct SerialPeripherals {
    pub uart: Peri<'static, peripherals::UART0>,
    pub tx: Peri<'static, peripherals::PIN_16>,
    pub rx: Peri<'static, peripherals::PIN_17>,
}

/// ADC and the current-sense input
pub struct AnalogPeripherals {
    pub adc: Peri<'static, peripherals::ADC>,
    pub input: Peri<'static, peripherals::PIN_26>,
}

/// Everything the firmware needs, split by function
pub struct Board {
    pub pins: PinBank,
    pub motor_pwm: MotorPwmPeripherals,
    pub serial: SerialPeripherals,
    pub analog: AnalogPeripherals,
}

impl Board {
    pub fn split(p: Peripherals) -> Self {
        let pins = PinBank {
            pins: [
                None, None, None, None, None, None, None, None,
                None, None, None, None, None, None, None,
                Some(p.PIN_15.into()),
                None,
                None,
                Some(p.PIN_18.into()),
                Some(p.PIN_19.into()),
                Some(p.PIN_20.into()),
                Some(p.PIN_21.into()),
                Some(p.PIN_22.into()),
                Some(p.PIN_23.into()),
                Some(p.PIN_24.into()),
                Some(p.PIN_25.into()),
                None,
                Some(p.PIN_27.into()),
                Some(p.PIN_28.into()),
                Some(p.PIN_29.into()),
            ],
        };

        Self {
            pins,
            motor_pwm: MotorPwmPeripherals {
                slice0: p.PWM_SLICE0,
                slice1: p.PWM_SLICE1,
                slice2: p.PWM_SLICE2,
                slice3: p.PWM_SLICE3,
                slice4: p.PWM_SLICE4,
                slice5: p.PWM_SLICE5,
                slice6: p.PWM_SLICE6,
                slice7: p.PWM_SLICE7,
                pin0: p.PIN_0,
                pin1: p.PIN_1,
                pin2: p.PIN_2,
                pin3: p.PIN_3,
                pin4: p.PIN_4,
                pin5: p.PIN_5,
                pin6: p.PIN_6,
                pin7: p.PIN_7,
                pin8: p.PIN_8,
                pin9: p.PIN_9,
                pin10: p.PIN_10,
                pin11: p.PIN_11,
                pin12: p.PIN_12,
                pin13: p.PIN_13,
                pin14: p.PIN_14,
            },
            serial: SerialPeripherals {
                uart: p.UART0,
                tx: p.PIN_16,
                rx: p.PIN_17,
            },
            analog: AnalogPeripherals {
                adc: p.ADC,
                input: p.PIN_26,
            },
        }
    }
}

//! RP2040-specific HAL for the motor controller firmware
//!
//! This crate provides RP2040 implementations of the shared
//! `millrace-hal` traits:
//!
//! - PWM slices as motor counters, slice 7 doubling as the time source
//! - RS-485 line over a buffered UART with a driver-enable pin
//! - Blocking ADC input for current sensing
//! - Peripheral split and config-driven GPIO allocation

#![no_std]

pub mod adc;
pub mod pins;
pub mod pwm;
pub mod serial;

pub use adc::AdcInput;
pub use pins::{Board, PinBank, PinError};
pub use pwm::{Rp2040PwmBank, SliceTicks, CHANNELS, TIMING};
pub use serial::{Rs485Line, SerialError};

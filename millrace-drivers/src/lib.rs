//! Hardware driver implementations
//!
//! This crate provides concrete implementations of the traits defined
//! in millrace-core for the controller's peripherals:
//!
//! - One-wire bus master (bit-banged over an open-drain pin)
//! - DS18B20 temperature probes sharing that bus
//! - ACS712 current conversion behind a 16:1 analog multiplexer
//! - GPIO relay outputs for the auxiliary actuators

#![no_std]
#![deny(unsafe_code)]

pub mod current;
pub mod onewire;
pub mod relay;
pub mod sensor;

pub use current::{Acs712, EmaFilter, MuxCurrentBank};
pub use onewire::{OneWire, OneWireError};
pub use relay::GpioRelay;
pub use sensor::{Ds18b20, Resolution};

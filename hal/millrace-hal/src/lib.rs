//! Millrace Hardware Abstraction Layer
//!
//! This crate defines the hardware seams of the motor controller so that
//! the control logic in `millrace-core` can run against real silicon or
//! against host-side simulations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Application (millrace-firmware)        │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  millrace-core / millrace-drivers       │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  millrace-hal (this crate - traits)     │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//!             ┌───────────────┐
//!             │ millrace-hal- │
//!             │    rp2040     │
//!             └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`pwm::PwmBank`] - Shared-counter PWM hardware
//! - [`pwm::TickSource`] - Free-running counter plus wrap tally used for time keeping
//! - [`serial::SerialLine`] - Frame-oriented half-duplex serial line
//! - [`adc::AnalogInput`] - Single-ended analog input

#![no_std]
#![deny(unsafe_code)]

pub mod adc;
pub mod pwm;
pub mod serial;

// Re-export key traits at crate root for convenience
pub use adc::AnalogInput;
pub use pwm::{CounterTiming, PwmBank, PwmOutput, TickSource};
pub use serial::{SerialConfig, SerialLine};

//! Board-agnostic control logic for the Millrace motor controller
//!
//! This crate contains all application logic that does not depend on
//! specific hardware implementations:
//!
//! - Hardware abstraction traits (temperature probe, actuator, current sense)
//! - Monotonic time base built on a PWM counter
//! - Shared-frequency PWM engine for 15 motor outputs
//! - Register map and Modbus bridge with change dispatch
//! - Per-motor thermal and overcurrent protection
//! - Auxiliary actuator policy (fan, mixer, dispenser, pump)
//! - Cooperative orchestrator tying the above together
//! - Configuration type definitions

#![no_std]
#![deny(unsafe_code)]

pub mod bridge;
pub mod config;
pub mod devices;
pub mod pwm;
pub mod registers;
pub mod safety;
pub mod system;
pub mod timebase;
pub mod traits;

/// Number of motor channels
pub const MOTOR_COUNT: usize = 15;

/// Full-scale duty in permille
pub const MAX_DUTY: u16 = 1000;

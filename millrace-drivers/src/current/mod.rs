//! Motor current sensing
//!
//! Each motor has a Hall-effect current sensor. The sensor outputs sit
//! behind a 16:1 analog multiplexer feeding one ADC input.

pub mod acs712;
pub mod mux;

pub use acs712::{Acs712, EmaFilter};
pub use mux::MuxCurrentBank;

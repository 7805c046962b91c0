//! Firmware tasks
//!
//! The whole controller runs as one cooperative loop on the main task.

pub mod control;

pub use control::control_loop;

//! Motor protection
//!
//! Per-motor thermal and overcurrent interlocks, and the conversion
//! bookkeeping for the temperature probes that feed them.

pub mod motor;
pub mod probe;

pub use motor::{classify, MotorLimits, MotorSafety, MotorStatus};
pub use probe::{ProbeMonitor, MAX_MISSED_CONVERSIONS};

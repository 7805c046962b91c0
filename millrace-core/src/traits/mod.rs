//! Hardware abstraction traits
//!
//! These traits define the interface between the control logic and the
//! board-specific drivers.

pub mod actuator;
pub mod current;
pub mod probe;

pub use actuator::Actuator;
pub use current::{CurrentSense, UNREADABLE_MA};
pub use probe::{SensorError, TemperatureProbe};

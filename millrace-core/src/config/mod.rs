//! Configuration types
//!
//! Board-agnostic configuration structures. The firmware fills these from
//! the embedded `device.toml`; every type has a default matching the
//! reference deployment.

pub mod device;
pub mod hardware;
pub mod layout;

pub use device::*;
pub use hardware::*;
pub use layout::*;

//! Modbus RTU slave subset
//!
//! This crate implements the part of Modbus RTU the motor controller speaks:
//! register reads and writes against a flat 16-bit register space, answered
//! by a single slave address.
//!
//! # Frame Overview
//!
//! ```text
//! ┌─────────┬──────────┬─────────────┬──────────┐
//! │ ADDRESS │ FUNCTION │ DATA        │ CRC-16   │
//! │ 1B      │ 1B       │ 0–252B      │ 2B (LE)  │
//! └─────────┴──────────┴─────────────┴──────────┘
//! ```
//!
//! Supported function codes:
//!
//! | Code | Name |
//! |------|------|
//! | 0x03 | Read Holding Registers |
//! | 0x04 | Read Input Registers |
//! | 0x06 | Write Single Register |
//! | 0x10 | Write Multiple Registers |
//!
//! Frames are delimited on the wire by 3.5 character times of silence;
//! [`rtu::FrameAssembler`] turns a timestamped byte stream into frames.

#![no_std]
#![deny(unsafe_code)]

pub mod adu;
pub mod crc;
pub mod pdu;
pub mod rtu;
pub mod slave;

pub use adu::{Adu, FrameError, BROADCAST_ADDRESS, MAX_ADU_SIZE};
pub use crc::crc16;
pub use pdu::{ExceptionCode, FunctionCode, Request};
pub use rtu::FrameAssembler;
pub use slave::{RegisterStore, Reply, Slave};

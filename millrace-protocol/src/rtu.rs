//! RTU frame delimiting
//!
//! RTU has no start or end markers: a frame ends when the line has been
//! silent for 3.5 character times. Above 19200 baud the silent interval is
//! fixed at 1750 µs.

use heapless::Vec;

use crate::adu::{FrameError, MAX_ADU_SIZE};

/// Fixed inter-frame silence used above 19200 baud
pub const FAST_SILENCE_US: u32 = 1750;

/// Inter-frame silence (3.5 character times) for a line setting
pub fn frame_silence_us(baudrate: u32, bits_per_char: u32) -> u32 {
    if baudrate > 19_200 {
        return FAST_SILENCE_US;
    }
    let baudrate = baudrate.max(1) as u64;
    // 3.5 chars = 7/2 chars, rounded up
    let numerator = 7 * bits_per_char as u64 * 1_000_000;
    let denominator = 2 * baudrate;
    numerator.div_ceil(denominator) as u32
}

/// Collects received bytes into frames using inter-frame silence
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    buffer: Vec<u8, MAX_ADU_SIZE>,
    last_byte_us: u64,
    silence_us: u32,
    overrun: bool,
}

impl FrameAssembler {
    /// Create an assembler for the given silent interval
    pub fn new(silence_us: u32) -> Self {
        Self {
            buffer: Vec::new(),
            last_byte_us: 0,
            silence_us,
            overrun: false,
        }
    }

    /// Create an assembler for a line setting
    pub fn for_line(baudrate: u32, bits_per_char: u32) -> Self {
        Self::new(frame_silence_us(baudrate, bits_per_char))
    }

    /// Discard any partial frame
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.overrun = false;
    }

    /// Whether bytes of an unfinished frame are buffered
    pub fn is_receiving(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Record a received byte
    pub fn push(&mut self, byte: u8, now_us: u64) {
        if self.buffer.push(byte).is_err() {
            self.overrun = true;
        }
        self.last_byte_us = now_us;
    }

    /// Hand out the buffered frame once the line has gone quiet
    ///
    /// Returns `Ok(None)` while the frame may still be growing.
    pub fn take_frame(&mut self, now_us: u64, out: &mut [u8]) -> Result<Option<usize>, FrameError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        if now_us.saturating_sub(self.last_byte_us) < self.silence_us as u64 {
            return Ok(None);
        }

        if self.overrun {
            self.reset();
            return Err(FrameError::Overrun);
        }

        let len = self.buffer.len();
        if out.len() < len {
            self.reset();
            return Err(FrameError::BufferTooSmall);
        }
        out[..len].copy_from_slice(&self.buffer);
        self.reset();
        Ok(Some(len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_at_9600_8e1() {
        // 11 bits per char, 3.5 chars = 38.5 bits = 4010.4 µs
        assert_eq!(frame_silence_us(9600, 11), 4011);
    }

    #[test]
    fn test_silence_fixed_above_19200() {
        assert_eq!(frame_silence_us(115_200, 11), FAST_SILENCE_US);
    }

    #[test]
    fn test_frame_released_after_silence() {
        let mut assembler = FrameAssembler::new(4000);
        let mut out = [0u8; MAX_ADU_SIZE];

        for (i, &b) in [0x01u8, 0x03, 0x00, 0x00].iter().enumerate() {
            assembler.push(b, 1000 + i as u64 * 1146);
        }
        let last = 1000 + 3 * 1146;

        assert_eq!(assembler.take_frame(last + 100, &mut out), Ok(None));
        assert!(assembler.is_receiving());
        assert_eq!(assembler.take_frame(last + 4000, &mut out), Ok(Some(4)));
        assert_eq!(&out[..4], &[0x01, 0x03, 0x00, 0x00]);
        assert!(!assembler.is_receiving());
    }

    #[test]
    fn test_overrun_reported_once() {
        let mut assembler = FrameAssembler::new(10);
        let mut out = [0u8; MAX_ADU_SIZE];

        for _ in 0..MAX_ADU_SIZE + 5 {
            assembler.push(0xAA, 0);
        }
        assert_eq!(assembler.take_frame(100, &mut out), Err(FrameError::Overrun));
        assert_eq!(assembler.take_frame(200, &mut out), Ok(None));
    }
}

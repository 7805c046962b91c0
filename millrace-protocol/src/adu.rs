//! Application data unit (RTU framing) encoding and decoding
//!
//! Frame format:
//! - ADDRESS (1 byte): slave address, 0 = broadcast
//! - PDU (1-253 bytes): function code followed by function data
//! - CRC (2 bytes): CRC-16/MODBUS over ADDRESS and PDU, low byte first

use heapless::Vec;

use crate::crc::crc16;

/// Largest RTU frame on the wire
pub const MAX_ADU_SIZE: usize = 256;

/// Smallest valid frame: address, function code, CRC
pub const MIN_ADU_SIZE: usize = 4;

/// Writes sent to this address are applied by every slave and never answered
pub const BROADCAST_ADDRESS: u8 = 0;

/// Errors that can occur during frame decoding or encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Fewer bytes than the smallest valid frame
    TooShort,
    /// More bytes than fit in one frame
    TooLong,
    /// CRC mismatch
    CrcMismatch,
    /// Receiver dropped bytes while the frame was arriving
    Overrun,
    /// Buffer too small for encoding
    BufferTooSmall,
}

/// A decoded frame, borrowing the receive buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adu<'a> {
    /// Slave address the frame was sent to
    pub address: u8,
    /// Function code and data
    pub pdu: &'a [u8],
}

impl<'a> Adu<'a> {
    /// Decode and CRC-check a complete frame
    pub fn decode(frame: &'a [u8]) -> Result<Self, FrameError> {
        if frame.len() < MIN_ADU_SIZE {
            return Err(FrameError::TooShort);
        }
        if frame.len() > MAX_ADU_SIZE {
            return Err(FrameError::TooLong);
        }

        let (body, crc_bytes) = frame.split_at(frame.len() - 2);
        let received = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
        if crc16(body) != received {
            return Err(FrameError::CrcMismatch);
        }

        Ok(Self {
            address: body[0],
            pdu: &body[1..],
        })
    }

    /// Whether this frame was sent to every slave
    pub fn is_broadcast(&self) -> bool {
        self.address == BROADCAST_ADDRESS
    }

    /// Encode a frame into a byte buffer
    ///
    /// Returns the number of bytes written
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, FrameError> {
        let body_len = 1 + self.pdu.len();
        let frame_len = body_len + 2;
        if frame_len > MAX_ADU_SIZE {
            return Err(FrameError::TooLong);
        }
        if buffer.len() < frame_len {
            return Err(FrameError::BufferTooSmall);
        }

        buffer[0] = self.address;
        buffer[1..body_len].copy_from_slice(self.pdu);
        let crc = crc16(&buffer[..body_len]);
        buffer[body_len..frame_len].copy_from_slice(&crc.to_le_bytes());

        Ok(frame_len)
    }

    /// Encode this frame into a heapless Vec
    pub fn encode_to_vec(&self) -> Result<Vec<u8, MAX_ADU_SIZE>, FrameError> {
        let mut buffer = [0u8; MAX_ADU_SIZE];
        let len = self.encode(&mut buffer)?;
        let mut vec = Vec::new();
        vec.extend_from_slice(&buffer[..len])
            .map_err(|_| FrameError::BufferTooSmall)?;
        Ok(vec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_known_request() {
        let frame = [0x01, 0x03, 0x00, 0x00, 0x00, 0x0A, 0xC5, 0xCD];
        let adu = Adu::decode(&frame).unwrap();
        assert_eq!(adu.address, 1);
        assert_eq!(adu.pdu, &[0x03, 0x00, 0x00, 0x00, 0x0A]);
        assert!(!adu.is_broadcast());
    }

    #[test]
    fn test_decode_rejects_bad_crc() {
        let frame = [0x01, 0x03, 0x00, 0x00, 0x00, 0x0A, 0xC5, 0xCE];
        assert_eq!(Adu::decode(&frame), Err(FrameError::CrcMismatch));
    }

    #[test]
    fn test_decode_rejects_short_frame() {
        assert_eq!(Adu::decode(&[0x01, 0x03, 0x00]), Err(FrameError::TooShort));
    }

    #[test]
    fn test_encode_appends_crc_low_byte_first() {
        let adu = Adu {
            address: 0x01,
            pdu: &[0x03, 0x00, 0x00, 0x00, 0x01],
        };
        let encoded = adu.encode_to_vec().unwrap();
        assert_eq!(&encoded[..], &[0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0A]);
    }

    #[test]
    fn test_encode_buffer_too_small() {
        let adu = Adu {
            address: 0x01,
            pdu: &[0x03, 0x00, 0x00, 0x00, 0x01],
        };
        let mut buffer = [0u8; 4];
        assert_eq!(adu.encode(&mut buffer), Err(FrameError::BufferTooSmall));
    }

    proptest! {
        #[test]
        fn prop_single_bit_error_is_detected(
            pdu in proptest::collection::vec(any::<u8>(), 1..64),
            bit in 0usize..512,
        ) {
            let adu = Adu { address: 7, pdu: &pdu };
            let mut encoded = adu.encode_to_vec().unwrap();
            let bit = bit % (encoded.len() * 8);
            encoded[bit / 8] ^= 1 << (bit % 8);
            prop_assert_eq!(Adu::decode(&encoded), Err(FrameError::CrcMismatch));
        }
    }
}

//! Slave request executor
//!
//! Decodes a request frame, applies it to a [`RegisterStore`] and encodes the
//! response. The store is the only state the slave touches.

use crate::adu::{Adu, FrameError};
use crate::pdu::{ExceptionCode, Request};

/// Largest PDU that fits in an RTU frame
pub const MAX_PDU_SIZE: usize = 253;

/// Register space exposed to the master
///
/// `None` / `false` means the address is outside the register space; the
/// slave answers such requests with Illegal Data Address.
pub trait RegisterStore {
    /// Read a holding register
    fn holding(&self, address: u16) -> Option<u16>;

    /// Read an input register
    fn input(&self, address: u16) -> Option<u16>;

    /// Write a holding register on behalf of the master
    fn write_holding(&mut self, address: u16, value: u16) -> bool;
}

/// Outcome of handling one valid frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reply {
    /// Frame addressed to another slave
    Ignored,
    /// Broadcast applied, nothing to send
    Broadcast,
    /// Response of the given length is ready in the output buffer
    Respond(usize),
}

/// Modbus RTU slave bound to one address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slave {
    address: u8,
}

impl Slave {
    /// Create a slave answering to `address` (1-247)
    pub const fn new(address: u8) -> Self {
        Self { address }
    }

    /// Slave address
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Handle one received frame
    ///
    /// Returns `Err` only when the frame itself is corrupt. Requests that
    /// are well-formed on the wire but invalid for this slave produce an
    /// exception response instead.
    pub fn handle<S: RegisterStore>(
        &self,
        frame: &[u8],
        store: &mut S,
        out: &mut [u8],
    ) -> Result<Reply, FrameError> {
        let adu = Adu::decode(frame)?;
        let broadcast = adu.is_broadcast();
        if !broadcast && adu.address != self.address {
            return Ok(Reply::Ignored);
        }

        let mut pdu = [0u8; MAX_PDU_SIZE];
        let result = match Request::parse(adu.pdu) {
            // Broadcast reads have nobody to answer to
            Ok(request) if broadcast && !request.is_write() => return Ok(Reply::Broadcast),
            Ok(request) => execute(&request, store, &mut pdu),
            Err(code) => Err(code),
        };

        if broadcast {
            return Ok(Reply::Broadcast);
        }

        let pdu_len = match result {
            Ok(len) => len,
            Err(code) => {
                pdu[0] = adu.pdu[0] | 0x80;
                pdu[1] = code as u8;
                2
            }
        };

        let response = Adu {
            address: self.address,
            pdu: &pdu[..pdu_len],
        };
        Ok(Reply::Respond(response.encode(out)?))
    }
}

/// Register addresses `start..start + count`, or Illegal Data Address if the
/// range runs past the end of the 16-bit space
fn span(start: u16, count: u16) -> Result<impl Iterator<Item = u16>, ExceptionCode> {
    let end = start as u32 + count as u32;
    if end > u16::MAX as u32 + 1 {
        return Err(ExceptionCode::IllegalDataAddress);
    }
    Ok((start as u32..end).map(|a| a as u16))
}

fn execute<S: RegisterStore>(
    request: &Request<'_>,
    store: &mut S,
    pdu: &mut [u8; MAX_PDU_SIZE],
) -> Result<usize, ExceptionCode> {
    pdu[0] = request.function() as u8;

    match *request {
        Request::ReadHolding { start, count } | Request::ReadInput { start, count } => {
            let holding = matches!(request, Request::ReadHolding { .. });
            pdu[1] = (count * 2) as u8;
            for (i, address) in span(start, count)?.enumerate() {
                let value = if holding {
                    store.holding(address)
                } else {
                    store.input(address)
                }
                .ok_or(ExceptionCode::IllegalDataAddress)?;
                pdu[2 + i * 2..4 + i * 2].copy_from_slice(&value.to_be_bytes());
            }
            Ok(2 + count as usize * 2)
        }
        Request::WriteSingle { address, value } => {
            if !store.write_holding(address, value) {
                return Err(ExceptionCode::IllegalDataAddress);
            }
            pdu[1..3].copy_from_slice(&address.to_be_bytes());
            pdu[3..5].copy_from_slice(&value.to_be_bytes());
            Ok(5)
        }
        Request::WriteMultiple {
            start,
            count,
            values,
        } => {
            // Validate the whole range before touching anything
            for address in span(start, count)? {
                if store.holding(address).is_none() {
                    return Err(ExceptionCode::IllegalDataAddress);
                }
            }
            for (address, bytes) in span(start, count)?.zip(values.chunks_exact(2)) {
                store.write_holding(address, u16::from_be_bytes([bytes[0], bytes[1]]));
            }
            pdu[1..3].copy_from_slice(&start.to_be_bytes());
            pdu[3..5].copy_from_slice(&count.to_be_bytes());
            Ok(5)
        }
    }
}

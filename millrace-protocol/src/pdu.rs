//! Protocol data units for the supported function codes

/// Most registers a single read may return
pub const MAX_READ_QUANTITY: u16 = 125;

/// Most registers a single multi-register write may carry
pub const MAX_WRITE_QUANTITY: u16 = 123;

/// Function codes understood by the slave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FunctionCode {
    ReadHoldingRegisters = 0x03,
    ReadInputRegisters = 0x04,
    WriteSingleRegister = 0x06,
    WriteMultipleRegisters = 0x10,
}

impl FunctionCode {
    /// Look up a function code byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x03 => Some(Self::ReadHoldingRegisters),
            0x04 => Some(Self::ReadInputRegisters),
            0x06 => Some(Self::WriteSingleRegister),
            0x10 => Some(Self::WriteMultipleRegisters),
            _ => None,
        }
    }
}

/// Exception codes returned to the master
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ExceptionCode {
    /// Function code not supported
    IllegalFunction = 0x01,
    /// Register address outside the register space
    IllegalDataAddress = 0x02,
    /// Malformed request body or quantity out of range
    IllegalDataValue = 0x03,
}

/// A parsed request PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    ReadHolding { start: u16, count: u16 },
    ReadInput { start: u16, count: u16 },
    WriteSingle { address: u16, value: u16 },
    /// Values are big-endian register words, `count * 2` bytes
    WriteMultiple { start: u16, count: u16, values: &'a [u8] },
}

fn word(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

impl<'a> Request<'a> {
    /// Parse a request PDU (function code first)
    pub fn parse(pdu: &'a [u8]) -> Result<Self, ExceptionCode> {
        let (&code, data) = pdu.split_first().ok_or(ExceptionCode::IllegalFunction)?;
        let function = FunctionCode::from_byte(code).ok_or(ExceptionCode::IllegalFunction)?;

        match function {
            FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
                if data.len() != 4 {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                let start = word(data, 0);
                let count = word(data, 2);
                if count == 0 || count > MAX_READ_QUANTITY {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                if function == FunctionCode::ReadHoldingRegisters {
                    Ok(Self::ReadHolding { start, count })
                } else {
                    Ok(Self::ReadInput { start, count })
                }
            }
            FunctionCode::WriteSingleRegister => {
                if data.len() != 4 {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                Ok(Self::WriteSingle {
                    address: word(data, 0),
                    value: word(data, 2),
                })
            }
            FunctionCode::WriteMultipleRegisters => {
                if data.len() < 5 {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                let start = word(data, 0);
                let count = word(data, 2);
                let byte_count = data[4] as usize;
                let values = &data[5..];
                if count == 0
                    || count > MAX_WRITE_QUANTITY
                    || byte_count != count as usize * 2
                    || values.len() != byte_count
                {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                Ok(Self::WriteMultiple {
                    start,
                    count,
                    values,
                })
            }
        }
    }

    /// Function code of this request
    pub fn function(&self) -> FunctionCode {
        match self {
            Self::ReadHolding { .. } => FunctionCode::ReadHoldingRegisters,
            Self::ReadInput { .. } => FunctionCode::ReadInputRegisters,
            Self::WriteSingle { .. } => FunctionCode::WriteSingleRegister,
            Self::WriteMultiple { .. } => FunctionCode::WriteMultipleRegisters,
        }
    }

    /// Whether this request modifies registers
    pub fn is_write(&self) -> bool {
        matches!(self, Self::WriteSingle { .. } | Self::WriteMultiple { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_read_holding() {
        let request = Request::parse(&[0x03, 0x00, 0x64, 0x00, 0x02]).unwrap();
        assert_eq!(request, Request::ReadHolding { start: 100, count: 2 });
        assert!(!request.is_write());
    }

    #[test]
    fn test_parse_write_single() {
        let request = Request::parse(&[0x06, 0x00, 0x03, 0x03, 0xE8]).unwrap();
        assert_eq!(
            request,
            Request::WriteSingle {
                address: 3,
                value: 1000
            }
        );
        assert!(request.is_write());
    }

    #[test]
    fn test_parse_write_multiple() {
        let pdu = [0x10, 0x00, 0x00, 0x00, 0x02, 0x04, 0x01, 0xF4, 0x00, 0x64];
        let request = Request::parse(&pdu).unwrap();
        match request {
            Request::WriteMultiple {
                start,
                count,
                values,
            } => {
                assert_eq!(start, 0);
                assert_eq!(count, 2);
                assert_eq!(values, &[0x01, 0xF4, 0x00, 0x64]);
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_unknown_function() {
        assert_eq!(
            Request::parse(&[0x2B, 0x0E, 0x01, 0x00]),
            Err(ExceptionCode::IllegalFunction)
        );
    }

    #[test]
    fn test_read_quantity_limits() {
        assert_eq!(
            Request::parse(&[0x04, 0x00, 0x00, 0x00, 0x00]),
            Err(ExceptionCode::IllegalDataValue)
        );
        assert_eq!(
            Request::parse(&[0x04, 0x00, 0x00, 0x00, 126]),
            Err(ExceptionCode::IllegalDataValue)
        );
        assert!(Request::parse(&[0x04, 0x00, 0x00, 0x00, 125]).is_ok());
    }

    #[test]
    fn test_write_multiple_byte_count_mismatch() {
        let pdu = [0x10, 0x00, 0x00, 0x00, 0x02, 0x03, 0x01, 0xF4, 0x00];
        assert_eq!(Request::parse(&pdu), Err(ExceptionCode::IllegalDataValue));
    }

    #[test]
    fn test_truncated_body() {
        assert_eq!(
            Request::parse(&[0x06, 0x00, 0x03]),
            Err(ExceptionCode::IllegalDataValue)
        );
    }
}

//! # APDU Codecs
//!
//! ISO 7816-4 short-form command and response units.
//!
//! ## Command Cases
//!
//! | Case | Layout                           |
//! |------|----------------------------------|
//! | 1    | `CLA INS P1 P2`                  |
//! | 2    | `CLA INS P1 P2 Le`               |
//! | 3    | `CLA INS P1 P2 Lc data`          |
//! | 4    | `CLA INS P1 P2 Lc data Le`       |
//!
//! An encoded Le of `00` means 256. Extended lengths are not supported.

use thiserror::Error;

/// Normal processing.
pub const SW_SUCCESS: u16 = 0x9000;
/// File or application not found.
pub const SW_FILE_NOT_FOUND: u16 = 0x6A82;

/// INS byte of SELECT.
pub const INS_SELECT: u8 = 0xA4;

/// Errors raised while decoding or encoding an APDU.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApduError {
    /// Fewer bytes than the smallest valid unit.
    #[error("APDU too short: {len} bytes")]
    TooShort {
        /// Bytes supplied
        len: usize,
    },

    /// Lc does not match the number of bytes that follow.
    #[error("Lc of {lc} does not match {len}-byte APDU")]
    LengthMismatch {
        /// Declared data length
        lc: usize,
        /// Total APDU length
        len: usize,
    },

    /// Extended-length encoding (Lc = 00 followed by data).
    #[error("extended-length APDUs are not supported")]
    ExtendedLength,

    /// The field does not fit a short-form encoding.
    #[error("{field} of {value} does not fit a short APDU")]
    FieldTooLarge {
        /// Lc or Le
        field: &'static str,
        /// Offending value
        value: usize,
    },
}

/// A command unit sent to the card.
///
/// # Examples
///
/// ```
/// use melcard::apdu::CommandApdu;
///
/// let select = CommandApdu::from_bytes(&[0x00, 0xA4, 0x04, 0x00, 0x02, 0xA0, 0x00, 0x00]).unwrap();
/// assert_eq!(select.ins, 0xA4);
/// assert_eq!(select.data, vec![0xA0, 0x00]);
/// assert_eq!(select.le, Some(256));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandApdu {
    /// Class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// Parameter 1
    pub p1: u8,
    /// Parameter 2
    pub p2: u8,
    /// Command data (Lc = its length)
    pub data: Vec<u8>,
    /// Expected response length, 1..=256
    pub le: Option<u16>,
}

impl CommandApdu {
    /// A case 1 command.
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: None,
        }
    }

    /// Sets the command data.
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Sets the expected response length.
    pub fn with_le(mut self, le: u16) -> Self {
        self.le = Some(le);
        self
    }

    /// `CLA INS P1 P2`.
    pub fn header(&self) -> [u8; 4] {
        [self.cla, self.ins, self.p1, self.p2]
    }

    /// Decodes a short-form command.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ApduError> {
        if bytes.len() < 4 {
            return Err(ApduError::TooShort { len: bytes.len() });
        }
        let mut command = Self::new(bytes[0], bytes[1], bytes[2], bytes[3]);
        let body = &bytes[4..];

        match body.len() {
            0 => {}
            1 => command.le = Some(decode_le(body[0])),
            _ => {
                let lc = body[0] as usize;
                if lc == 0 {
                    return Err(ApduError::ExtendedLength);
                }
                let rest = &body[1..];
                if rest.len() == lc {
                    command.data = rest.to_vec();
                } else if rest.len() == lc + 1 {
                    command.data = rest[..lc].to_vec();
                    command.le = Some(decode_le(rest[lc]));
                } else {
                    return Err(ApduError::LengthMismatch {
                        lc,
                        len: bytes.len(),
                    });
                }
            }
        }
        Ok(command)
    }

    /// Encodes as a short-form command.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ApduError> {
        let mut bytes = self.header().to_vec();
        if !self.data.is_empty() {
            if self.data.len() > 255 {
                return Err(ApduError::FieldTooLarge {
                    field: "Lc",
                    value: self.data.len(),
                });
            }
            bytes.push(self.data.len() as u8);
            bytes.extend_from_slice(&self.data);
        }
        if let Some(le) = self.le {
            match le {
                1..=255 => bytes.push(le as u8),
                256 => bytes.push(0),
                _ => {
                    return Err(ApduError::FieldTooLarge {
                        field: "Le",
                        value: le as usize,
                    })
                }
            }
        }
        Ok(bytes)
    }
}

fn decode_le(byte: u8) -> u16 {
    if byte == 0 {
        256
    } else {
        byte as u16
    }
}

/// A response unit returned by the card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseApdu {
    /// Response data
    pub data: Vec<u8>,
    /// Status word (SW1 << 8 | SW2)
    pub sw: u16,
}

impl ResponseApdu {
    /// A response carrying only a status word.
    pub fn new(sw: u16) -> Self {
        Self {
            data: Vec::new(),
            sw,
        }
    }

    /// Sets the response data.
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// First status byte.
    pub fn sw1(&self) -> u8 {
        (self.sw >> 8) as u8
    }

    /// Second status byte.
    pub fn sw2(&self) -> u8 {
        self.sw as u8
    }

    /// True for 0x9000.
    pub fn is_success(&self) -> bool {
        self.sw == SW_SUCCESS
    }

    /// Decodes `data SW1 SW2`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ApduError> {
        if bytes.len() < 2 {
            return Err(ApduError::TooShort { len: bytes.len() });
        }
        let (data, sw) = bytes.split_at(bytes.len() - 2);
        Ok(Self {
            data: data.to_vec(),
            sw: u16::from_be_bytes([sw[0], sw[1]]),
        })
    }

    /// Encodes as `data SW1 SW2`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.data.clone();
        bytes.extend_from_slice(&self.sw.to_be_bytes());
        bytes
    }
}

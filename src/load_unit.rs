//! # Application Load Units
//!
//! Parses the ALU image format an applet is delivered in.
//!
//! ## Layout
//!
//! ```text
//! offset 0   8-byte header (ignored)
//! offset 8   segment 1: [len: u16 BE][code]
//!            segment 2: [len: u16 BE][static data]
//!            segment 3: [len: u16 BE][directory record]
//!            segment 4: [len: u16 BE][FCI record]
//! ```
//!
//! Code and static data are required. An image may end after the static
//! segment; the directory and FCI then default to empty.

use crate::tlv::{self, TAG_AID};
use thiserror::Error;

/// Offset of the first segment.
pub const SEGMENT_START: usize = 8;

/// Segment index of the code.
pub const CODE_SEGMENT: usize = 1;
/// Segment index of the static data.
pub const STATIC_SEGMENT: usize = 2;
/// Segment index of the directory record.
pub const DIRECTORY_SEGMENT: usize = 3;
/// Segment index of the FCI record.
pub const FCI_SEGMENT: usize = 4;

/// Errors raised while parsing a load unit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The image is shorter than its header.
    #[error("load unit header truncated: {len} bytes")]
    HeaderTruncated {
        /// Image length
        len: usize,
    },

    /// A segment's length prefix or payload runs past the end of the image.
    #[error("segment {index} truncated at offset {offset}: {needed} bytes needed, {available} available")]
    Truncated {
        /// Segment index (1-based)
        index: usize,
        /// Offset of the segment's length prefix
        offset: usize,
        /// Bytes required
        needed: usize,
        /// Bytes remaining
        available: usize,
    },

    /// A required segment is absent.
    #[error("segment {index} missing")]
    MissingSegment {
        /// Segment index (1-based)
        index: usize,
    },

    /// The applet does not fit the memory reserved for it.
    #[error("{what} of {len} bytes does not fit ({available} bytes available)")]
    TooLarge {
        /// "code" or "static data"
        what: &'static str,
        /// Segment length
        len: usize,
        /// Room left
        available: usize,
    },
}

/// Returns segment `index` (1-based) of an image.
///
/// Returns `Ok(None)` if the image ends cleanly before the segment.
///
/// # Examples
///
/// ```
/// use melcard::load_unit::segment;
///
/// let mut image = vec![0u8; 8];
/// image.extend_from_slice(&[0x00, 0x01, 0x04]); // code: EXIT
/// image.extend_from_slice(&[0x00, 0x02, 0xAA, 0xBB]); // static
///
/// assert_eq!(segment(&image, 1).unwrap(), Some(&[0x04][..]));
/// assert_eq!(segment(&image, 2).unwrap(), Some(&[0xAA, 0xBB][..]));
/// assert_eq!(segment(&image, 3).unwrap(), None);
/// ```
pub fn segment(image: &[u8], index: usize) -> Result<Option<&[u8]>, LoadError> {
    if image.len() < SEGMENT_START {
        return Err(LoadError::HeaderTruncated { len: image.len() });
    }

    let mut offset = SEGMENT_START;
    for current in 1..=index {
        let remaining = image.len() - offset;
        if remaining == 0 {
            return Ok(None);
        }
        if remaining < 2 {
            return Err(LoadError::Truncated {
                index: current,
                offset,
                needed: 2,
                available: remaining,
            });
        }
        let len = u16::from_be_bytes([image[offset], image[offset + 1]]) as usize;
        if remaining - 2 < len {
            return Err(LoadError::Truncated {
                index: current,
                offset,
                needed: len + 2,
                available: remaining,
            });
        }
        let payload = &image[offset + 2..offset + 2 + len];
        if current == index {
            return Ok(Some(payload));
        }
        offset += 2 + len;
    }
    Ok(None)
}

/// A parsed application load unit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadUnit {
    /// MEL code
    pub code: Vec<u8>,
    /// Initial static data
    pub static_data: Vec<u8>,
    /// Directory record (BER-TLV, usually an `61` application template)
    pub directory: Vec<u8>,
    /// File control information returned on SELECT
    pub fci: Vec<u8>,
}

impl LoadUnit {
    /// Parses an image.
    pub fn parse(image: &[u8]) -> Result<Self, LoadError> {
        let required = |index| -> Result<Vec<u8>, LoadError> {
            segment(image, index)?
                .map(<[u8]>::to_vec)
                .ok_or(LoadError::MissingSegment { index })
        };
        let optional = |index| -> Result<Vec<u8>, LoadError> {
            Ok(segment(image, index)?.unwrap_or_default().to_vec())
        };

        Ok(Self {
            code: required(CODE_SEGMENT)?,
            static_data: required(STATIC_SEGMENT)?,
            directory: optional(DIRECTORY_SEGMENT)?,
            fci: optional(FCI_SEGMENT)?,
        })
    }

    /// Builds an image with a zeroed header.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut image = vec![0u8; SEGMENT_START];
        for payload in [&self.code, &self.static_data, &self.directory, &self.fci] {
            image.extend_from_slice(&(payload.len() as u16).to_be_bytes());
            image.extend_from_slice(payload);
        }
        image
    }

    /// Application identifier from the directory record, if any.
    pub fn aid(&self) -> Option<&[u8]> {
        tlv::find(&self.directory, TAG_AID)
    }
}

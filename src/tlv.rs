//! # BER-TLV
//!
//! Minimal BER-TLV support for FCI responses and application directories:
//! one- and two-byte tags, lengths up to `0x82 xx xx`.

use thiserror::Error;

/// FCI template tag.
pub const TAG_FCI: u16 = 0x6F;
/// Application template tag (directory records).
pub const TAG_APPLICATION: u16 = 0x61;
/// Application identifier tag.
pub const TAG_AID: u16 = 0x4F;

/// Errors raised while decoding TLV data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TlvError {
    /// The data ended inside a tag, length or value.
    #[error("TLV truncated at offset {offset}")]
    Truncated {
        /// Offset of the element being decoded
        offset: usize,
    },

    /// A length form other than short, `81` or `82`.
    #[error("unsupported TLV length byte 0x{byte:02X}")]
    UnsupportedLength {
        /// First length byte
        byte: u8,
    },
}

/// One decoded element borrowing its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    /// Tag, one or two bytes
    pub tag: u16,
    /// Value bytes
    pub value: &'a [u8],
}

impl Tlv<'_> {
    /// True if the tag marks a constructed element.
    pub fn is_constructed(&self) -> bool {
        let first = if self.tag > 0xFF {
            (self.tag >> 8) as u8
        } else {
            self.tag as u8
        };
        first & 0x20 != 0
    }
}

/// Encodes one element.
///
/// # Examples
///
/// ```
/// use melcard::tlv::{encode, TAG_FCI};
///
/// assert_eq!(encode(TAG_FCI, &[]), vec![0x6F, 0x00]);
/// assert_eq!(encode(0x84, &[0xA0, 0x00]), vec![0x84, 0x02, 0xA0, 0x00]);
/// ```
pub fn encode(tag: u16, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 5);
    if tag > 0xFF {
        out.extend_from_slice(&tag.to_be_bytes());
    } else {
        out.push(tag as u8);
    }
    match value.len() {
        len @ 0..=0x7F => out.push(len as u8),
        len @ 0x80..=0xFF => out.extend_from_slice(&[0x81, len as u8]),
        len => {
            out.push(0x82);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        }
    }
    out.extend_from_slice(value);
    out
}

/// Decodes the element at the start of `bytes`, returning it and the rest.
pub fn decode(bytes: &[u8]) -> Result<(Tlv<'_>, &[u8]), TlvError> {
    decode_at(bytes, 0)
}

fn decode_at(bytes: &[u8], base: usize) -> Result<(Tlv<'_>, &[u8]), TlvError> {
    let truncated = TlvError::Truncated { offset: base };
    let (&first, mut rest) = bytes.split_first().ok_or(truncated.clone())?;

    let mut tag = first as u16;
    if first & 0x1F == 0x1F {
        let (&second, after) = rest.split_first().ok_or(truncated.clone())?;
        tag = (tag << 8) | second as u16;
        rest = after;
    }

    let (&len_byte, after) = rest.split_first().ok_or(truncated.clone())?;
    rest = after;
    let len = match len_byte {
        0x00..=0x7F => len_byte as usize,
        0x81 => {
            let (&len, after) = rest.split_first().ok_or(truncated.clone())?;
            rest = after;
            len as usize
        }
        0x82 => {
            if rest.len() < 2 {
                return Err(truncated);
            }
            let len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
            rest = &rest[2..];
            len
        }
        byte => return Err(TlvError::UnsupportedLength { byte }),
    };

    if rest.len() < len {
        return Err(truncated);
    }
    let (value, rest) = rest.split_at(len);
    Ok((Tlv { tag, value }, rest))
}

/// Decodes a sequence of sibling elements.
pub fn decode_all(mut bytes: &[u8]) -> Result<Vec<Tlv<'_>>, TlvError> {
    let total = bytes.len();
    let mut elements = Vec::new();
    while !bytes.is_empty() {
        let (element, rest) = decode_at(bytes, total - bytes.len())?;
        elements.push(element);
        bytes = rest;
    }
    Ok(elements)
}

/// Finds the first element with `tag`, descending into constructed elements.
///
/// Malformed data yields `None`.
pub fn find(bytes: &[u8], tag: u16) -> Option<&[u8]> {
    let elements = decode_all(bytes).ok()?;
    for element in elements {
        if element.tag == tag {
            return Some(element.value);
        }
        if element.is_constructed() {
            if let Some(value) = find(element.value, tag) {
                return Some(value);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_lengths() {
        let value = vec![0xAB; 0x90];
        let encoded = encode(0x53, &value);
        assert_eq!(&encoded[..3], &[0x53, 0x81, 0x90]);
        let (tlv, rest) = decode(&encoded).unwrap();
        assert_eq!(tlv.value, &value[..]);
        assert!(rest.is_empty());

        let value = vec![0; 0x123];
        let encoded = encode(0x53, &value);
        assert_eq!(&encoded[..4], &[0x53, 0x82, 0x01, 0x23]);
    }

    #[test]
    fn test_two_byte_tag() {
        let encoded = encode(0x9F38, &[0x01]);
        assert_eq!(encoded, vec![0x9F, 0x38, 0x01, 0x01]);
        let (tlv, _) = decode(&encoded).unwrap();
        assert_eq!(tlv.tag, 0x9F38);
    }

    #[test]
    fn test_truncated() {
        assert_eq!(decode(&[]), Err(TlvError::Truncated { offset: 0 }));
        assert_eq!(decode(&[0x4F, 0x03, 0x01]), Err(TlvError::Truncated { offset: 0 }));
        assert_eq!(
            decode_all(&[0x4F, 0x00, 0x50]),
            Err(TlvError::Truncated { offset: 2 })
        );
        assert_eq!(
            decode(&[0x4F, 0x83, 0, 0, 0]),
            Err(TlvError::UnsupportedLength { byte: 0x83 })
        );
    }

    #[test]
    fn test_find_nested_aid() {
        // 61 { 4F A0000001, 50 "AP" }
        let directory = [
            0x61, 0x0A, 0x4F, 0x04, 0xA0, 0x00, 0x00, 0x01, 0x50, 0x02, b'A', b'P',
        ];
        assert_eq!(find(&directory, TAG_AID), Some(&[0xA0, 0x00, 0x00, 0x01][..]));
        assert_eq!(find(&directory, 0x50), Some(&b"AP"[..]));
        assert_eq!(find(&directory, 0x84), None);
        assert_eq!(find(&[0x61, 0x05], TAG_AID), None);
    }
}

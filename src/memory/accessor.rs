//! Bounds-checked windows into memory segments.

use super::{MemoryError, SegmentKind};

/// Accessor id used for code fetches (never traced).
pub const CODE_ID: &str = "code";
/// Accessor id of the static data area.
pub const STATIC_ID: &str = "S";
/// Accessor id of the dynamic (stack) area.
pub const DYNAMIC_ID: &str = "D";
/// Accessor id of the public area.
pub const PUBLIC_ID: &str = "P";

/// A named window `[base, base + len)` into one segment.
///
/// Accessors do not own memory. They are created by
/// [`MemoryManager::accessor`](super::MemoryManager::accessor) and passed back to
/// the manager for every operation, which translates local offsets and enforces
/// `offset + length <= len`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accessor {
    id: &'static str,
    segment: SegmentKind,
    base: usize,
    len: usize,
}

impl Accessor {
    pub(crate) fn new(id: &'static str, segment: SegmentKind, base: usize, len: usize) -> Self {
        Self {
            id,
            segment,
            base,
            len,
        }
    }

    /// Symbolic id ("code", "S", "D", "P", ...).
    pub fn id(&self) -> &'static str {
        self.id
    }

    /// Segment this window looks into.
    pub fn segment(&self) -> SegmentKind {
        self.segment
    }

    /// Segment offset of local offset 0.
    pub fn base(&self) -> usize {
        self.base
    }

    /// Window length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true for a zero-length window.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Validates a local range and returns its segment offset.
    pub(crate) fn translate(&self, offset: u16, len: usize) -> Result<usize, MemoryError> {
        let start = offset as usize;
        if start + len > self.len {
            return Err(MemoryError::AccessViolation {
                id: self.id,
                offset,
                len,
                window: self.len,
            });
        }
        Ok(self.base + start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_adds_base() {
        let acc = Accessor::new(STATIC_ID, SegmentKind::Nvram, 0x100, 0x20);
        assert_eq!(acc.translate(0x10, 4), Ok(0x110));
        assert_eq!(acc.translate(0x1F, 1), Ok(0x11F));
    }

    #[test]
    fn test_translate_rejects_overrun() {
        let acc = Accessor::new(PUBLIC_ID, SegmentKind::Ram, 0, 0x20);
        assert_eq!(
            acc.translate(0x1F, 2),
            Err(MemoryError::AccessViolation {
                id: PUBLIC_ID,
                offset: 0x1F,
                len: 2,
                window: 0x20,
            })
        );
    }

    #[test]
    fn test_zero_length_at_end_is_allowed() {
        let acc = Accessor::new(DYNAMIC_ID, SegmentKind::Ram, 0, 8);
        assert_eq!(acc.translate(8, 0), Ok(8));
    }
}

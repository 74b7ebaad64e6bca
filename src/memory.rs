//! # Memory Segments
//!
//! This module provides the card's physical memory model: one fixed-length
//! [`MemorySegment`] per memory class (ROM, RAM, NVRAM), owned by a
//! [`MemoryManager`] that hands out bounds-checked [`Accessor`] windows.
//!
//! ## Design Principles
//!
//! - **Segments own bytes**: an accessor is only a window descriptor, so several
//!   accessors may alias one segment without sharing ownership
//! - **Errors, not garbage**: every out-of-window access is a
//!   [`MemoryError::AccessViolation`] and performs no mutation
//! - **Transactions**: TRANSACTIONABLE segments snapshot overwritten bytes while a
//!   transaction is open and replay them last-in-first-out on abort
//! - **Tracing**: operations on TRACE segments are appended to a shared
//!   [`TraceLog`] (code fetches excepted)

pub mod accessor;
pub mod trace;

pub use accessor::{Accessor, CODE_ID, DYNAMIC_ID, PUBLIC_ID, STATIC_ID};
pub use trace::{TraceLog, TraceOp, TraceRecord};

use serde::{Deserialize, Serialize};
use std::ops::BitOr;
use thiserror::Error;

/// Memory class of a segment.
///
/// The discriminants are the segment ids used on the wire and in traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SegmentKind {
    /// Mask/read-only memory holding applet code.
    Rom = 0,
    /// Volatile working memory holding the dynamic and public areas.
    Ram = 1,
    /// Non-volatile memory holding applet static data.
    Nvram = 2,
}

impl SegmentKind {
    /// All segment kinds in id order.
    pub const ALL: [SegmentKind; 3] = [SegmentKind::Rom, SegmentKind::Ram, SegmentKind::Nvram];

    /// Index of this kind inside the manager's segment array.
    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

/// Segment flag bitset (READ_ONLY=1, TRANSACTIONABLE=2, TRACE=4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SegmentFlags(u8);

impl SegmentFlags {
    /// Writes through accessors are rejected.
    pub const READ_ONLY: SegmentFlags = SegmentFlags(1);
    /// Writes are journaled while a transaction is open.
    pub const TRANSACTIONABLE: SegmentFlags = SegmentFlags(2);
    /// Accessor operations are recorded in the trace log.
    pub const TRACE: SegmentFlags = SegmentFlags(4);

    /// No flags set.
    pub const fn empty() -> Self {
        SegmentFlags(0)
    }

    /// Builds a flag set from raw bits, dropping unknown bits.
    pub const fn from_bits_truncate(bits: u8) -> Self {
        SegmentFlags(bits & 0x07)
    }

    /// Raw bit value.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if every bit of `other` is set in `self`.
    pub const fn contains(self, other: SegmentFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SegmentFlags {
    type Output = SegmentFlags;

    fn bitor(self, rhs: SegmentFlags) -> SegmentFlags {
        SegmentFlags(self.0 | rhs.0)
    }
}

/// Errors raised by segment and accessor operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// An accessor operation fell outside its window.
    #[error("access violation on '{id}': offset 0x{offset:04X} + {len} exceeds window of {window} bytes")]
    AccessViolation {
        /// Symbolic id of the accessor
        id: &'static str,
        /// Local offset requested
        offset: u16,
        /// Number of bytes requested
        len: usize,
        /// Length of the accessor window
        window: usize,
    },

    /// A write was attempted on a READ_ONLY segment.
    #[error("segment {kind:?} is read-only")]
    ReadOnly {
        /// Segment that rejected the write
        kind: SegmentKind,
    },

    /// A raw segment operation or window definition exceeded the segment length.
    #[error("segment {kind:?} overrun: offset 0x{offset:X} + {len} exceeds {size} bytes")]
    SegmentOverrun {
        /// Segment addressed
        kind: SegmentKind,
        /// Segment offset requested
        offset: usize,
        /// Number of bytes requested
        len: usize,
        /// Total segment length
        size: usize,
    },
}

/// One journaled write: where it happened and what it overwrote.
#[derive(Debug, Clone, PartialEq, Eq)]
struct UndoEntry {
    offset: usize,
    prior: Vec<u8>,
}

/// A fixed-length byte buffer for one memory class.
///
/// # Examples
///
/// ```
/// use melcard::memory::{MemorySegment, SegmentFlags, SegmentKind};
///
/// let mut nvram = MemorySegment::new(SegmentKind::Nvram, 64, SegmentFlags::TRANSACTIONABLE);
/// nvram.write(0, &[1, 2, 3]).unwrap();
///
/// nvram.begin_transaction();
/// nvram.write(1, &[0xFF]).unwrap();
/// nvram.end_transaction(false);
///
/// assert_eq!(nvram.read(0, 3).unwrap(), &[1, 2, 3]);
/// ```
#[derive(Debug, Clone)]
pub struct MemorySegment {
    kind: SegmentKind,
    flags: SegmentFlags,
    data: Vec<u8>,
    /// `Some` while a transaction is open.
    undo_log: Option<Vec<UndoEntry>>,
}

impl MemorySegment {
    /// Creates a zero-filled segment.
    pub fn new(kind: SegmentKind, len: usize, flags: SegmentFlags) -> Self {
        Self {
            kind,
            flags,
            data: vec![0; len],
            undo_log: None,
        }
    }

    /// Segment memory class.
    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    /// Segment flags.
    pub fn flags(&self) -> SegmentFlags {
        self.flags
    }

    /// Segment length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true for a zero-length segment.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true while a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.undo_log.is_some()
    }

    fn check(&self, offset: usize, len: usize) -> Result<(), MemoryError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err(MemoryError::SegmentOverrun {
                kind: self.kind,
                offset,
                len,
                size: self.data.len(),
            }),
        }
    }

    /// Reads `len` bytes at a segment offset.
    pub fn read(&self, offset: usize, len: usize) -> Result<&[u8], MemoryError> {
        self.check(offset, len)?;
        Ok(&self.data[offset..offset + len])
    }

    /// Writes bytes at a segment offset, journaling them if a transaction is open.
    ///
    /// Fails with [`MemoryError::ReadOnly`] on READ_ONLY segments.
    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), MemoryError> {
        if self.flags.contains(SegmentFlags::READ_ONLY) {
            return Err(MemoryError::ReadOnly { kind: self.kind });
        }
        self.check(offset, bytes.len())?;
        self.journal(offset, bytes.len());
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Moves `len` bytes inside the segment (overlapping ranges allowed).
    pub fn copy_within(&mut self, from: usize, to: usize, len: usize) -> Result<(), MemoryError> {
        if self.flags.contains(SegmentFlags::READ_ONLY) {
            return Err(MemoryError::ReadOnly { kind: self.kind });
        }
        self.check(from, len)?;
        self.check(to, len)?;
        self.journal(to, len);
        self.data.copy_within(from..from + len, to);
        Ok(())
    }

    /// Installs an image at a segment offset.
    ///
    /// Bypasses READ_ONLY and the transaction journal; used when applets are
    /// loaded onto the card.
    pub fn load(&mut self, offset: usize, bytes: &[u8]) -> Result<(), MemoryError> {
        self.check(offset, bytes.len())?;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn journal(&mut self, offset: usize, len: usize) {
        if !self.flags.contains(SegmentFlags::TRANSACTIONABLE) || len == 0 {
            return;
        }
        if let Some(log) = self.undo_log.as_mut() {
            log.push(UndoEntry {
                offset,
                prior: self.data[offset..offset + len].to_vec(),
            });
        }
    }

    /// Opens a transaction, discarding any pending undo log.
    pub fn begin_transaction(&mut self) {
        self.undo_log = Some(Vec::new());
    }

    /// Closes the open transaction.
    ///
    /// With `commit == false` the journal is replayed newest first, so that
    /// overlapping writes end with the oldest snapshot in place. With
    /// `commit == true` the journal is dropped.
    pub fn end_transaction(&mut self, commit: bool) {
        let Some(log) = self.undo_log.take() else {
            return;
        };
        if commit {
            return;
        }
        for entry in log.into_iter().rev() {
            let end = entry.offset + entry.prior.len();
            self.data[entry.offset..end].copy_from_slice(&entry.prior);
        }
    }
}

/// Owner of the card's three segments and the shared trace log.
///
/// All accessor operations go through the manager so that bounds checks and
/// trace recording happen in one place.
///
/// # Examples
///
/// ```
/// use melcard::memory::{MemoryManager, SegmentKind};
///
/// let mut memory = MemoryManager::with_sizes(0x100, 0x100, 0x100);
/// let public = memory.accessor("P", SegmentKind::Ram, 0x80, 0x80).unwrap();
///
/// memory.write_bytes(&public, 0x10, &[0xCA, 0xFE]).unwrap();
/// assert_eq!(memory.read_bytes(&public, 0x10, 2).unwrap(), vec![0xCA, 0xFE]);
///
/// // Out-of-window access is an error, never clamped
/// assert!(memory.read_bytes(&public, 0x7F, 2).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct MemoryManager {
    segments: [MemorySegment; 3],
    trace: TraceLog,
}

impl MemoryManager {
    /// Creates a manager from explicit segments.
    pub fn new(rom: MemorySegment, ram: MemorySegment, nvram: MemorySegment) -> Self {
        Self {
            segments: [rom, ram, nvram],
            trace: TraceLog::default(),
        }
    }

    /// Creates a manager with the standard flag layout.
    ///
    /// - ROM: READ_ONLY
    /// - RAM: TRACE
    /// - NVRAM: TRANSACTIONABLE | TRACE
    pub fn with_sizes(rom: usize, ram: usize, nvram: usize) -> Self {
        Self::new(
            MemorySegment::new(SegmentKind::Rom, rom, SegmentFlags::READ_ONLY),
            MemorySegment::new(SegmentKind::Ram, ram, SegmentFlags::TRACE),
            MemorySegment::new(
                SegmentKind::Nvram,
                nvram,
                SegmentFlags::TRANSACTIONABLE | SegmentFlags::TRACE,
            ),
        )
    }

    /// Returns the segment of the given kind.
    pub fn segment(&self, kind: SegmentKind) -> &MemorySegment {
        &self.segments[kind.index()]
    }

    /// Returns the segment of the given kind mutably.
    pub fn segment_mut(&mut self, kind: SegmentKind) -> &mut MemorySegment {
        &mut self.segments[kind.index()]
    }

    /// Defines a named window into a segment.
    ///
    /// Fails with [`MemoryError::SegmentOverrun`] if the window does not fit.
    pub fn accessor(
        &self,
        id: &'static str,
        kind: SegmentKind,
        base: usize,
        len: usize,
    ) -> Result<Accessor, MemoryError> {
        self.segment(kind).check(base, len)?;
        Ok(Accessor::new(id, kind, base, len))
    }

    /// The shared trace log.
    pub fn trace(&self) -> &TraceLog {
        &self.trace
    }

    /// Clears the shared trace log.
    pub fn clear_trace(&mut self) {
        self.trace.clear();
    }

    fn traced(&self, acc: &Accessor) -> bool {
        acc.id() != CODE_ID && self.segment(acc.segment()).flags().contains(SegmentFlags::TRACE)
    }

    fn record(&mut self, acc: &Accessor, record: TraceRecord) {
        if self.traced(acc) {
            self.trace.push(record);
        }
    }

    /// Reads through an accessor without recording a trace entry.
    ///
    /// Used by debugging views (disassembly, status inspection) that must not
    /// disturb the trace.
    pub fn peek(&self, acc: &Accessor, offset: u16, len: usize) -> Result<&[u8], MemoryError> {
        let at = acc.translate(offset, len)?;
        self.segment(acc.segment()).read(at, len)
    }

    /// Reads one byte through an accessor.
    pub fn read_byte(&mut self, acc: &Accessor, offset: u16) -> Result<u8, MemoryError> {
        Ok(self.read_bytes(acc, offset, 1)?[0])
    }

    /// Reads `len` bytes through an accessor.
    pub fn read_bytes(
        &mut self,
        acc: &Accessor,
        offset: u16,
        len: usize,
    ) -> Result<Vec<u8>, MemoryError> {
        let at = acc.translate(offset, len)?;
        let bytes = self.segment(acc.segment()).read(at, len)?.to_vec();
        self.record(
            acc,
            TraceRecord::new(TraceOp::Read, acc.id(), offset, len).with_value(&bytes),
        );
        Ok(bytes)
    }

    /// Reads a big-endian word through an accessor.
    pub fn read_word(&mut self, acc: &Accessor, offset: u16) -> Result<u16, MemoryError> {
        let bytes = self.read_bytes(acc, offset, 2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Writes bytes through an accessor.
    pub fn write_bytes(
        &mut self,
        acc: &Accessor,
        offset: u16,
        bytes: &[u8],
    ) -> Result<(), MemoryError> {
        let at = acc.translate(offset, bytes.len())?;
        self.segment_mut(acc.segment()).write(at, bytes)?;
        self.record(
            acc,
            TraceRecord::new(TraceOp::Write, acc.id(), offset, bytes.len()).with_value(bytes),
        );
        Ok(())
    }

    /// Writes a big-endian word through an accessor.
    pub fn write_word(&mut self, acc: &Accessor, offset: u16, value: u16) -> Result<(), MemoryError> {
        self.write_bytes(acc, offset, &value.to_be_bytes())
    }

    /// Zero-fills `len` bytes through an accessor.
    pub fn zero_bytes(&mut self, acc: &Accessor, offset: u16, len: usize) -> Result<(), MemoryError> {
        let at = acc.translate(offset, len)?;
        self.segment_mut(acc.segment()).write(at, &vec![0; len])?;
        self.record(acc, TraceRecord::new(TraceOp::Zero, acc.id(), offset, len));
        Ok(())
    }

    /// Copies `len` bytes between two offsets of one accessor window.
    pub fn copy_bytes(
        &mut self,
        acc: &Accessor,
        from: u16,
        to: u16,
        len: usize,
    ) -> Result<(), MemoryError> {
        let src = acc.translate(from, len)?;
        let dst = acc.translate(to, len)?;
        let segment = self.segment_mut(acc.segment());
        segment.copy_within(src, dst, len)?;
        let copied = segment.read(dst, len)?.to_vec();
        self.record(
            acc,
            TraceRecord::new(TraceOp::Copy, acc.id(), from, len)
                .with_addr2(to)
                .with_value(&copied),
        );
        Ok(())
    }

    /// Opens a transaction on a segment.
    pub fn begin_transaction(&mut self, kind: SegmentKind) {
        self.segment_mut(kind).begin_transaction();
    }

    /// Commits (`true`) or rolls back (`false`) the open transaction on a segment.
    pub fn end_transaction(&mut self, kind: SegmentKind, commit: bool) {
        self.segment_mut(kind).end_transaction(commit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_contains() {
        let flags = SegmentFlags::TRANSACTIONABLE | SegmentFlags::TRACE;
        assert!(flags.contains(SegmentFlags::TRACE));
        assert!(!flags.contains(SegmentFlags::READ_ONLY));
        assert_eq!(flags.bits(), 6);
        assert_eq!(SegmentFlags::from_bits_truncate(0xFF).bits(), 7);
    }

    #[test]
    fn test_read_only_segment_rejects_writes() {
        let mut rom = MemorySegment::new(SegmentKind::Rom, 16, SegmentFlags::READ_ONLY);
        assert_eq!(
            rom.write(0, &[1]),
            Err(MemoryError::ReadOnly {
                kind: SegmentKind::Rom
            })
        );

        // Image loading bypasses the flag
        rom.load(0, &[0xAA]).unwrap();
        assert_eq!(rom.read(0, 1).unwrap(), &[0xAA]);
    }

    #[test]
    fn test_rollback_overlapping_writes_restores_original() {
        let mut seg = MemorySegment::new(SegmentKind::Nvram, 8, SegmentFlags::TRANSACTIONABLE);
        seg.write(0, &[1, 2, 3, 4]).unwrap();

        seg.begin_transaction();
        seg.write(0, &[9, 9]).unwrap();
        seg.write(1, &[8, 8, 8]).unwrap();
        seg.end_transaction(false);

        assert_eq!(seg.read(0, 4).unwrap(), &[1, 2, 3, 4]);
        assert!(!seg.in_transaction());
    }

    #[test]
    fn test_writes_outside_transaction_are_not_journaled() {
        let mut seg = MemorySegment::new(SegmentKind::Nvram, 4, SegmentFlags::TRANSACTIONABLE);
        seg.write(0, &[5]).unwrap();
        seg.end_transaction(false);
        assert_eq!(seg.read(0, 1).unwrap(), &[5]);
    }

    #[test]
    fn test_non_transactionable_segment_ignores_rollback() {
        let mut seg = MemorySegment::new(SegmentKind::Ram, 4, SegmentFlags::empty());
        seg.begin_transaction();
        seg.write(0, &[7]).unwrap();
        seg.end_transaction(false);
        assert_eq!(seg.read(0, 1).unwrap(), &[7]);
    }

    #[test]
    fn test_accessor_window_must_fit_segment() {
        let memory = MemoryManager::with_sizes(16, 16, 16);
        assert!(memory.accessor("D", SegmentKind::Ram, 8, 8).is_ok());
        assert!(matches!(
            memory.accessor("D", SegmentKind::Ram, 8, 9),
            Err(MemoryError::SegmentOverrun { .. })
        ));
    }

    #[test]
    fn test_code_accessor_is_not_traced() {
        let mut memory = MemoryManager::new(
            MemorySegment::new(SegmentKind::Rom, 16, SegmentFlags::TRACE),
            MemorySegment::new(SegmentKind::Ram, 16, SegmentFlags::TRACE),
            MemorySegment::new(SegmentKind::Nvram, 16, SegmentFlags::empty()),
        );
        let code = memory.accessor(CODE_ID, SegmentKind::Rom, 0, 16).unwrap();
        let dynamic = memory.accessor(DYNAMIC_ID, SegmentKind::Ram, 0, 16).unwrap();

        memory.read_byte(&code, 0).unwrap();
        assert!(memory.trace().is_empty());

        memory.write_bytes(&dynamic, 2, &[0x11]).unwrap();
        memory.copy_bytes(&dynamic, 2, 3, 1).unwrap();
        let records = memory.trace().records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].op, TraceOp::Copy);
        assert_eq!(records[1].addr2, Some(3));
        assert_eq!(records[1].value.as_deref(), Some(&[0x11][..]));
    }

    #[test]
    fn test_untraced_segment_records_nothing() {
        let mut memory = MemoryManager::new(
            MemorySegment::new(SegmentKind::Rom, 4, SegmentFlags::READ_ONLY),
            MemorySegment::new(SegmentKind::Ram, 4, SegmentFlags::empty()),
            MemorySegment::new(SegmentKind::Nvram, 4, SegmentFlags::empty()),
        );
        let ram = memory.accessor("D", SegmentKind::Ram, 0, 4).unwrap();
        memory.zero_bytes(&ram, 0, 4).unwrap();
        assert!(memory.trace().is_empty());
    }
}

//! Accessor operation trace for debugging playback.

use serde::Serialize;

/// Kind of accessor operation recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TraceOp {
    /// `read_byte` / `read_bytes`
    Read,
    /// `write_bytes`
    Write,
    /// `zero_bytes`
    Zero,
    /// `copy_bytes`
    Copy,
}

/// One recorded accessor operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceRecord {
    /// Operation performed
    pub op: TraceOp,
    /// Accessor id
    pub id: &'static str,
    /// Local offset (source offset for copies)
    pub addr: u16,
    /// Number of bytes
    pub len: usize,
    /// Destination offset for copies
    pub addr2: Option<u16>,
    /// Bytes observed (reads, copies) or written (writes)
    pub value: Option<Vec<u8>>,
}

impl TraceRecord {
    pub(crate) fn new(op: TraceOp, id: &'static str, addr: u16, len: usize) -> Self {
        Self {
            op,
            id,
            addr,
            len,
            addr2: None,
            value: None,
        }
    }

    pub(crate) fn with_addr2(mut self, addr2: u16) -> Self {
        self.addr2 = Some(addr2);
        self
    }

    pub(crate) fn with_value(mut self, value: &[u8]) -> Self {
        self.value = Some(value.to_vec());
        self
    }
}

/// Append-only log shared by every accessor of a memory manager.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TraceLog {
    records: Vec<TraceRecord>,
}

impl TraceLog {
    pub(crate) fn push(&mut self, record: TraceRecord) {
        self.records.push(record);
    }

    /// Recorded operations, oldest first.
    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drops every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

//! Concise DCF (Device Configuration File) binary codec.
//!
//! Wire layout: a 4-byte little-endian entry count, followed by `count`
//! entries of `{ UNSIGNED16 index, UNSIGNED8 subindex, UNSIGNED32 size,
//! size value bytes }`. The boot process walks a node's stream entry by
//! entry and pushes each one into the remote dictionary via SDO.
//!
//! An index field of zero is treated as an in-band end-of-stream marker.
//! This is a known limitation of the format: a legitimate object index
//! 0x0000 cannot be encoded.

use crate::hal::CanError;
use crate::types::{C_DCF_MAX_NODES, C_DCF_MAX_STREAM_SIZE, NodeId};
use alloc::vec::Vec;

/// Byte offset of the first entry (right after the count header).
pub const DCF_HEADER_SIZE: usize = 4;

/// A single decoded configuration entry. Values are at most 4 bytes and are
/// carried little-endian packed in `value` together with their byte `size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DcfEntry {
    pub index: u16,
    pub subindex: u8,
    pub size: u32,
    pub value: u32,
}

impl DcfEntry {
    /// The entry's value as the exact bytes that were (or will be) encoded.
    pub fn value_bytes(&self) -> [u8; 4] {
        self.value.to_le_bytes()
    }
}

/// One node's Concise DCF byte stream with a fixed capacity of
/// [`C_DCF_MAX_STREAM_SIZE`] bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcfStream {
    data: Vec<u8>,
}

impl Default for DcfStream {
    fn default() -> Self {
        Self::new()
    }
}

impl DcfStream {
    /// Creates an empty stream holding only a zero entry count.
    pub fn new() -> Self {
        let mut data = Vec::with_capacity(64);
        data.extend_from_slice(&0u32.to_le_bytes());
        Self { data }
    }

    /// Wraps raw stream bytes, e.g. received from a configuration tool.
    /// Rejects buffers too short for the count header or over capacity.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CanError> {
        if bytes.len() < DCF_HEADER_SIZE {
            return Err(CanError::MalformedDcf);
        }
        if bytes.len() > C_DCF_MAX_STREAM_SIZE {
            return Err(CanError::DcfCapacityExceeded);
        }
        Ok(Self {
            data: bytes.to_vec(),
        })
    }

    /// The raw stream bytes, count header included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The declared number of entries.
    pub fn entry_count(&self) -> u32 {
        // Constructors guarantee the 4-byte header is present.
        u32::from_le_bytes([self.data[0], self.data[1], self.data[2], self.data[3]])
    }

    /// Appends one entry at the current tail and rewrites the leading count,
    /// so the count always matches the entries actually materialised.
    ///
    /// Rejects a value outside 1-4 bytes and any append that would push the
    /// stream past its fixed capacity, leaving the stream unchanged.
    pub fn append_entry(
        &mut self,
        index: u16,
        subindex: u8,
        value_bytes: &[u8],
    ) -> Result<(), CanError> {
        if value_bytes.is_empty() || value_bytes.len() > 4 {
            return Err(CanError::TypeMismatch);
        }
        // index (2) + subindex (1) + size (4) + value
        let needed = 7 + value_bytes.len();
        if self.data.len() + needed > C_DCF_MAX_STREAM_SIZE {
            return Err(CanError::DcfCapacityExceeded);
        }

        self.data.extend_from_slice(&index.to_le_bytes());
        self.data.push(subindex);
        self.data
            .extend_from_slice(&(value_bytes.len() as u32).to_le_bytes());
        self.data.extend_from_slice(value_bytes);

        let count = self.entry_count() + 1;
        self.data[0..4].copy_from_slice(&count.to_le_bytes());
        Ok(())
    }

    /// Drops all entries and zeroes the count field.
    pub fn clear(&mut self) {
        self.data.truncate(DCF_HEADER_SIZE);
        self.data[0..4].copy_from_slice(&0u32.to_le_bytes());
    }

    /// A bounds-checked reader positioned at the first entry.
    pub fn reader(&self) -> DcfReader<'_> {
        DcfReader::new(&self.data)
    }
}

/// Bounds-checked cursor over a Concise DCF byte stream.
///
/// Never reads past the end of the buffer: a truncated field yields
/// [`CanError::MalformedDcf`] instead.
#[derive(Debug, Clone)]
pub struct DcfReader<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> DcfReader<'a> {
    /// Positions a reader at the first entry of `data` (past the header).
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            cursor: DCF_HEADER_SIZE,
        }
    }

    /// Resumes a reader at a previously saved [`Self::cursor`] position.
    pub fn resume(data: &'a [u8], cursor: usize) -> Self {
        Self { data, cursor }
    }

    /// Current byte offset, to be saved across asynchronous waits.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CanError> {
        let end = self.cursor.checked_add(len).ok_or(CanError::MalformedDcf)?;
        if end > self.data.len() {
            return Err(CanError::MalformedDcf);
        }
        let bytes = &self.data[self.cursor..end];
        self.cursor = end;
        Ok(bytes)
    }

    /// Decodes the next entry.
    ///
    /// Returns `Ok(None)` on the in-band end marker (index field 0),
    /// `Err(MalformedDcf)` on a truncated field or a size outside 1-4.
    /// A stream shorter than the count header is malformed as well.
    pub fn next_entry(&mut self) -> Result<Option<DcfEntry>, CanError> {
        if self.cursor < DCF_HEADER_SIZE {
            return Err(CanError::MalformedDcf);
        }
        let index_bytes = self.take(2)?;
        let index = u16::from_le_bytes([index_bytes[0], index_bytes[1]]);
        if index == 0 {
            return Ok(None);
        }

        let subindex = self.take(1)?[0];
        let size_bytes = self.take(4)?;
        let size = u32::from_le_bytes([size_bytes[0], size_bytes[1], size_bytes[2], size_bytes[3]]);
        if !(1..=4).contains(&size) {
            return Err(CanError::MalformedDcf);
        }

        let value_bytes = self.take(size as usize)?;
        let mut value: u32 = 0;
        for (i, byte) in value_bytes.iter().enumerate() {
            value |= (*byte as u32) << (8 * i);
        }

        Ok(Some(DcfEntry {
            index,
            subindex,
            size,
            value,
        }))
    }
}

/// A fixed-capacity table of per-node Concise DCF streams, populated once
/// before the boot process starts and read-only during it.
#[derive(Debug, Default)]
pub struct DcfSet {
    nodes: Vec<(NodeId, DcfStream)>,
}

impl DcfSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes with a stream in the set.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds an empty stream for `node` and returns it for population.
    /// Rejects a duplicate node and a full table ([`C_DCF_MAX_NODES`]).
    pub fn add_node(&mut self, node: NodeId) -> Result<&mut DcfStream, CanError> {
        if self.nodes.len() >= C_DCF_MAX_NODES || self.stream(node).is_some() {
            return Err(CanError::DcfNodeTable);
        }
        self.nodes.push((node, DcfStream::new()));
        let last = self.nodes.len() - 1;
        Ok(&mut self.nodes[last].1)
    }

    /// The stream configured for `node`, if any.
    pub fn stream(&self, node: NodeId) -> Option<&DcfStream> {
        self.nodes
            .iter()
            .find(|(id, _)| *id == node)
            .map(|(_, stream)| stream)
    }

    pub fn stream_mut(&mut self, node: NodeId) -> Option<&mut DcfStream> {
        self.nodes
            .iter_mut()
            .find(|(id, _)| *id == node)
            .map(|(_, stream)| stream)
    }

    /// Drops every node's stream.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}

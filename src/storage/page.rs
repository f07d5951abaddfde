//! Slotted page - a 4KB byte array holding a slot directory and tuple data
//!
//! Layout:
//!
//! ```text
//! +----------------+-----------------------+------------+----------------+
//! | header (4 B)   | slot directory  -->   | free space |  <-- tuples    |
//! +----------------+-----------------------+------------+----------------+
//! 0                4                     lower        free_ptr        4096
//! ```
//!
//! The slot directory grows forward from the header, the tuple region grows
//! backward from the end of the page, and free space is exactly the gap
//! between them. The two regions never overlap: an insertion that would
//! close the gap below zero is rejected and the page is left byte-for-byte
//! unchanged.

use crate::storage::constants::{PageId, PAGE_HEADER_SIZE, PAGE_SIZE, SLOT_SIZE};
use crate::types::{decode_tuple, encode_tuple, Schema, Value};
use bytemuck::{Pod, Zeroable};

/// Page header - exactly 4 bytes at the beginning of each page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C, packed(1))]
pub struct PageHeaderData {
    /// Number of slot-directory entries, live and tombstoned
    pub slot_count: u16,
    /// Offset of the first tuple byte; tuples grow down toward the directory
    pub free_ptr: u16,
}

/// One slot-directory entry locating a tuple within the page.
///
/// A tombstone keeps its offset but has `length == 0`, so the byte region it
/// used to address stays reachable for undo restoration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C, packed(1))]
pub struct Slot {
    /// Offset of the tuple's first byte
    pub offset: u16,
    /// Tuple byte length; 0 marks a tombstone
    pub length: u16,
}

impl Slot {
    /// True if this slot is a tombstone (deleted or relocated tuple)
    pub fn is_tombstone(&self) -> bool {
        self.length == 0
    }
}

/// Page - fixed-size unit of on-disk storage with slotted tuple layout.
///
/// The backing buffer is exclusively owned by whichever caller holds the
/// page; there is no implicit sharing.
#[repr(C, align(4096))]
pub struct Page {
    buffer: [u8; PAGE_SIZE],
    id: PageId,
}

impl Page {
    /// Create a new empty (zeroed) page with an initialized header
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(id: PageId) -> Self {
        let mut page = Self {
            buffer: [0; PAGE_SIZE],
            id,
        };
        *page.header_mut() = PageHeaderData {
            slot_count: 0,
            free_ptr: PAGE_SIZE as u16,
        };
        page
    }

    /// Hydrate a page from raw bytes read off disk
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_bytes(id: PageId, bytes: [u8; PAGE_SIZE]) -> Self {
        let mut page = Self { buffer: bytes, id };
        // An all-zero buffer is a never-written page; give it a valid header.
        if page.header().free_ptr == 0 {
            *page.header_mut() = PageHeaderData {
                slot_count: 0,
                free_ptr: PAGE_SIZE as u16,
            };
        }
        page
    }

    /// The page's number within its database file
    pub fn id(&self) -> PageId {
        self.id
    }

    /// Get page header (read-only)
    pub fn header(&self) -> PageHeaderData {
        bytemuck::pod_read_unaligned(&self.buffer[..PAGE_HEADER_SIZE])
    }

    fn header_mut(&mut self) -> &mut PageHeaderData {
        bytemuck::from_bytes_mut(&mut self.buffer[..PAGE_HEADER_SIZE])
    }

    /// Number of slot-directory entries, including tombstones
    pub fn slot_count(&self) -> u16 {
        self.header().slot_count
    }

    /// Number of live (non-tombstone) tuples
    #[allow(clippy::cast_possible_truncation)]
    pub fn live_count(&self) -> u16 {
        (0..self.slot_count())
            .filter(|&i| self.slot(i).is_some_and(|s| s.length > 0))
            .count() as u16
    }

    /// Free space: the gap between the slot directory and the tuple region
    pub fn free_space(&self) -> usize {
        let header = self.header();
        let lower = PAGE_HEADER_SIZE + header.slot_count as usize * SLOT_SIZE;
        (header.free_ptr as usize).saturating_sub(lower)
    }

    /// True if a tuple of `len` encoded bytes (plus its slot entry) fits
    pub fn can_fit(&self, len: usize) -> bool {
        len > 0 && self.free_space() >= len + SLOT_SIZE
    }

    /// Read a slot-directory entry.
    ///
    /// The header is untrusted on-disk data: a recycled page carries a
    /// free-list pointer where its header used to be, so the claimed slot
    /// count can exceed what the buffer holds. Entries past the buffer are
    /// out of range, not a panic.
    pub fn slot(&self, index: u16) -> Option<Slot> {
        if index >= self.header().slot_count {
            return None;
        }
        let start = PAGE_HEADER_SIZE + index as usize * SLOT_SIZE;
        if start + SLOT_SIZE > PAGE_SIZE {
            return None;
        }
        Some(bytemuck::pod_read_unaligned(
            &self.buffer[start..start + SLOT_SIZE],
        ))
    }

    fn set_slot(&mut self, index: u16, slot: Slot) {
        let start = PAGE_HEADER_SIZE + index as usize * SLOT_SIZE;
        self.buffer[start..start + SLOT_SIZE].copy_from_slice(bytemuck::bytes_of(&slot));
    }

    /// Insert an encoded tuple, returning its new slot index.
    ///
    /// Returns `None` without mutating the page if the tuple (plus one slot
    /// entry) does not fit, or if `bytes` is empty - a zero-length tuple
    /// would be indistinguishable from a tombstone.
    #[allow(clippy::cast_possible_truncation)]
    pub fn insert_raw(&mut self, bytes: &[u8]) -> Option<u16> {
        if !self.can_fit(bytes.len()) {
            return None;
        }

        let header = self.header();
        let index = header.slot_count;
        let offset = header.free_ptr - bytes.len() as u16;

        self.buffer[offset as usize..header.free_ptr as usize].copy_from_slice(bytes);
        self.set_slot(
            index,
            Slot {
                offset,
                length: bytes.len() as u16,
            },
        );

        let header = self.header_mut();
        header.slot_count += 1;
        header.free_ptr = offset;

        Some(index)
    }

    /// Serialize and insert a tuple, returning its new slot index.
    ///
    /// Returns `None` without mutating the page if there is not enough free
    /// space. Capacity exhaustion is a normal outcome, not an error.
    pub fn insert_tuple(&mut self, values: &[Value]) -> Option<u16> {
        self.insert_raw(&encode_tuple(values))
    }

    /// Raw encoded bytes of the tuple at `index`, or `None` for tombstones,
    /// out-of-range slots, and slots whose claimed region falls outside the
    /// buffer (garbage directory bytes on a recycled page)
    pub fn get_raw(&self, index: u16) -> Option<&[u8]> {
        let slot = self.slot(index)?;
        if slot.is_tombstone() {
            return None;
        }
        let start = slot.offset as usize;
        let end = start + slot.length as usize;
        if end > PAGE_SIZE {
            return None;
        }
        Some(&self.buffer[start..end])
    }

    /// Deserialize the tuple at `index` using the schema's column types.
    ///
    /// Returns `None` for tombstones, out-of-range slots, and images that do
    /// not decode under the schema.
    pub fn get_tuple(&self, index: u16, schema: &Schema) -> Option<Vec<Value>> {
        decode_tuple(self.get_raw(index)?, schema).ok()
    }

    /// Iterate over live tuples in slot order.
    ///
    /// The iterator is finite and restartable: calling this again yields a
    /// fresh pass over the page.
    pub fn tuples<'a>(
        &'a self,
        schema: &'a Schema,
    ) -> impl Iterator<Item = (u16, Vec<Value>)> + 'a {
        (0..self.slot_count()).filter_map(move |index| {
            let values = self.get_tuple(index, schema)?;
            Some((index, values))
        })
    }

    /// Mark the slot at `index` as a tombstone.
    ///
    /// The freed bytes are not compacted or reclaimed. Returns `false` if
    /// the slot is out of range or already tombstoned.
    pub fn delete_tuple(&mut self, index: u16) -> bool {
        match self.slot(index) {
            Some(slot) if !slot.is_tombstone() => {
                self.set_slot(
                    index,
                    Slot {
                        offset: slot.offset,
                        length: 0,
                    },
                );
                true
            }
            _ => false,
        }
    }

    /// Overwrite the tuple at `index` in place with a new encoded image.
    ///
    /// Only admitted when the new image is no longer than the current one;
    /// a growing tuple is the caller's delete-and-reinsert problem. Returns
    /// `false` without mutating the page otherwise.
    #[allow(clippy::cast_possible_truncation)]
    pub fn update_raw(&mut self, index: u16, bytes: &[u8]) -> bool {
        match self.slot(index) {
            Some(slot)
                if !slot.is_tombstone() && !bytes.is_empty() && bytes.len() <= slot.length as usize =>
            {
                let start = slot.offset as usize;
                self.buffer[start..start + bytes.len()].copy_from_slice(bytes);
                self.set_slot(
                    index,
                    Slot {
                        offset: slot.offset,
                        length: bytes.len() as u16,
                    },
                );
                true
            }
            _ => false,
        }
    }

    /// Serialize and overwrite the tuple at `index` in place
    pub fn update_tuple(&mut self, index: u16, values: &[Value]) -> bool {
        self.update_raw(index, &encode_tuple(values))
    }

    /// Re-materialize a slot's previous image at its retained offset.
    ///
    /// This is the undo hook: it reverses both `delete_tuple` (tombstones
    /// keep their offset) and in-place `update_raw` (updates only shrink, so
    /// the old, possibly longer image still fits the region it originally
    /// occupied). The caller asserts that `bytes` is the image this slot
    /// held before the mutation being undone; deletes never compact, so the
    /// target region is intact. Returns `false` if the slot is out of range
    /// or the image cannot be placed.
    #[allow(clippy::cast_possible_truncation)]
    pub fn restore_raw(&mut self, index: u16, bytes: &[u8]) -> bool {
        match self.slot(index) {
            Some(slot) if !bytes.is_empty() => {
                let start = slot.offset as usize;
                if start + bytes.len() > PAGE_SIZE {
                    return false;
                }
                self.buffer[start..start + bytes.len()].copy_from_slice(bytes);
                self.set_slot(
                    index,
                    Slot {
                        offset: slot.offset,
                        length: bytes.len() as u16,
                    },
                );
                true
            }
            _ => false,
        }
    }

    /// Get raw page buffer (read-only)
    pub fn raw(&self) -> &[u8] {
        &self.buffer
    }

    /// Get raw page buffer (mutable)
    pub fn raw_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let header = self.header();
        f.debug_struct("Page")
            .field("id", &self.id)
            .field("slot_count", &{ header.slot_count })
            .field("free_ptr", &{ header.free_ptr })
            .field("free_space", &self.free_space())
            .finish_non_exhaustive()
    }
}

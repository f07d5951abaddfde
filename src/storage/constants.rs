//! Storage constants and fundamental identifier types

use serde::{Deserialize, Serialize};

/// Page size in bytes - must be power of 2 and >= 4KB
pub const PAGE_SIZE: usize = 4096;

/// Page header size in bytes: slot count (2) + free-space pointer (2)
pub const PAGE_HEADER_SIZE: usize = 4;

/// Size of one slot-directory entry: tuple offset (2) + tuple length (2)
pub const SLOT_SIZE: usize = 4;

/// Usable space in a page after the header
pub const PAGE_USABLE_SIZE: usize = PAGE_SIZE - PAGE_HEADER_SIZE;

/// Reserved database-file header region preceding the page area.
///
/// Its first 4 bytes (file offset 0) hold the free-list head page number as
/// a signed 32-bit little-endian integer, -1 meaning the list is empty.
pub const DB_HEADER_SIZE: usize = 4096;

/// On-disk sentinel for "no next free page" / empty free list
pub const FREE_LIST_EMPTY: i32 = -1;

/// Page ID type - a page number unique within one database file
pub type PageId = u32;

/// Log sequence number: the byte offset of a record within its log file
pub type Lsn = u64;

/// Sentinel LSN marking the start of a transaction's prevLSN chain
pub const INVALID_LSN: Lsn = Lsn::MAX;

/// Transaction ID type
pub type TxnId = u64;

/// Record identifier: the address of one tuple within the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rid {
    /// Page holding the tuple
    pub page_id: PageId,
    /// Slot index within the page
    pub slot: u16,
}

impl Rid {
    /// Create a record identifier
    pub fn new(page_id: PageId, slot: u16) -> Self {
        Self { page_id, slot }
    }
}

impl std::fmt::Display for Rid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.page_id, self.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_constants() {
        assert_eq!(PAGE_SIZE, 4096);
        assert_eq!(PAGE_HEADER_SIZE, 4);
        assert_eq!(SLOT_SIZE, 4);
        assert_eq!(PAGE_HEADER_SIZE + PAGE_USABLE_SIZE, PAGE_SIZE);
    }

    #[test]
    fn test_page_size_is_power_of_two() {
        assert!(PAGE_SIZE.is_power_of_two());
    }

    #[test]
    fn test_db_header_precedes_page_area() {
        // Page n lives at DB_HEADER_SIZE + n * PAGE_SIZE; the header region
        // must be large enough for the free-list head word.
        assert!(DB_HEADER_SIZE >= 4);
    }

    #[test]
    fn test_rid_identity() {
        let a = Rid::new(3, 7);
        let b = Rid::new(3, 7);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "(3, 7)");
    }

    #[test]
    fn test_invalid_lsn_is_not_a_file_offset() {
        // Real LSNs are file byte offsets; the sentinel must be unreachable.
        assert_eq!(INVALID_LSN, u64::MAX);
    }
}

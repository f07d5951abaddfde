//! Slate - page-organized storage and transaction engine
//!
//! Slate is the storage and transaction substrate of a relational database:
//! - Fixed-size, slotted 4 KiB pages with tuple-level operations
//! - A disk manager mapping pages into a single file, recycling freed pages
//!   through an intrusive on-disk free list
//! - A write-ahead log that forces every record durable before returning
//! - A local transaction lifecycle with physical undo on abort
//! - A two-phase-commit coordinator over independent per-database engines
//!
//! Isolation between concurrent transactions is deliberately out of scope;
//! callers that need it must layer locking or versioning on top.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

// Core modules
pub mod common;
pub mod storage;
pub mod txn;
pub mod types;
pub mod wal;

// Re-exports for convenience
pub use common::{Error, Result};
pub use storage::constants::{Lsn, PageId, Rid, PAGE_SIZE};
pub use storage::disk::DiskManager;
pub use storage::page::Page;
pub use txn::coordinator::{Coordinator, EngineParticipant, Participant};
pub use txn::engine::Engine;
pub use txn::transaction::{Transaction, TxnStatus};
pub use wal::log_manager::LogManager;
pub use wal::record::LogRecord;

/// Version information
pub const VERSION_MAJOR: u32 = 0;
/// Version information
pub const VERSION_MINOR: u32 = 1;
/// Version information
pub const VERSION_PATCH: u32 = 0;
/// Version string
pub const VERSION: &str = "0.1.0";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "0.1.0");
        assert_eq!(VERSION_MAJOR, 0);
        assert_eq!(VERSION_MINOR, 1);
        assert_eq!(VERSION_PATCH, 0);
    }
}

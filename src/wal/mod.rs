//! Write-ahead log: record model and the append-only log manager

pub mod log_manager;
pub mod record;

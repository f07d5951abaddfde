//! Storage layer: slotted pages and the per-file disk manager

pub mod constants;
pub mod disk;
pub mod page;

//! Transaction layer: local lifecycle, participant engines, and the
//! two-phase-commit coordinator

pub mod coordinator;
pub mod engine;
pub mod transaction;

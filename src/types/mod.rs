//! Column, schema and value model shared by pages and the write-ahead log
//!
//! The tuple wire encoding defined here is the single serialization used for
//! both page-resident tuples and WAL payload images, so log records can be
//! replayed against the same (de)serialization the pages use.

pub mod schema;
pub mod value;

pub use schema::{Column, DataType, Schema};
pub use value::{decode_tuple, encode_tuple, encoded_len, Value};

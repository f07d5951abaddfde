//! Table schema: column names and types

use serde::{Deserialize, Serialize};

/// Column data types supported by the storage core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    /// 64-bit signed integer, 8 bytes fixed-width on disk
    Int,
    /// Boolean, 1 byte on disk
    Bool,
    /// Variable-length string, length-prefixed on disk (u32 length + bytes)
    Varchar,
}

/// A single column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Column data type
    pub data_type: DataType,
}

impl Column {
    /// Create a new column definition
    pub fn new<S: Into<String>>(name: S, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// An ordered set of columns describing one tuple layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Columns in tuple order
    pub columns: Vec<Column>,
}

impl Schema {
    /// Create a schema from an ordered column list
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True if the schema has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

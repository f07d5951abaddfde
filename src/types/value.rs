//! Tuple values and the on-disk tuple encoding
//!
//! Layout rules (little-endian throughout):
//! - `Int` is 8 bytes fixed-width
//! - `Bool` is 1 byte (0 or 1)
//! - `Varchar` is a u32 byte length followed by the raw UTF-8 bytes
//!
//! Decoding is schema-driven: the column types say how many bytes to take,
//! so the encoding carries no per-value type tags.

use crate::common::{Error, Result};
use crate::types::schema::{DataType, Schema};
use serde::{Deserialize, Serialize};

/// A single column value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// 64-bit signed integer
    Int(i64),
    /// Boolean
    Bool(bool),
    /// Variable-length string
    Varchar(String),
}

impl Value {
    /// The data type this value belongs to
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int(_) => DataType::Int,
            Value::Bool(_) => DataType::Bool,
            Value::Varchar(_) => DataType::Varchar,
        }
    }
}

/// Encoded byte length of one value
pub fn encoded_len(value: &Value) -> usize {
    match value {
        Value::Int(_) => 8,
        Value::Bool(_) => 1,
        Value::Varchar(s) => 4 + s.len(),
    }
}

/// Encode a tuple into its on-disk byte form
#[allow(clippy::cast_possible_truncation)]
pub fn encode_tuple(values: &[Value]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.iter().map(encoded_len).sum());
    for value in values {
        match value {
            Value::Int(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Value::Bool(v) => buf.push(u8::from(*v)),
            Value::Varchar(s) => {
                buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
                buf.extend_from_slice(s.as_bytes());
            }
        }
    }
    buf
}

/// Decode a tuple from its on-disk byte form using the schema's column types
///
/// # Errors
///
/// Returns `Error::Corruption` if the bytes are truncated, carry invalid
/// UTF-8 in a varchar, or leave trailing garbage after the last column.
pub fn decode_tuple(bytes: &[u8], schema: &Schema) -> Result<Vec<Value>> {
    let mut values = Vec::with_capacity(schema.len());
    let mut pos = 0usize;

    for column in &schema.columns {
        match column.data_type {
            DataType::Int => {
                let end = pos
                    .checked_add(8)
                    .filter(|&end| end <= bytes.len())
                    .ok_or_else(|| truncated(&column.name))?;
                let raw: [u8; 8] = bytes[pos..end]
                    .try_into()
                    .map_err(|_| truncated(&column.name))?;
                values.push(Value::Int(i64::from_le_bytes(raw)));
                pos = end;
            }
            DataType::Bool => {
                let byte = *bytes.get(pos).ok_or_else(|| truncated(&column.name))?;
                values.push(Value::Bool(byte != 0));
                pos += 1;
            }
            DataType::Varchar => {
                let end = pos
                    .checked_add(4)
                    .filter(|&end| end <= bytes.len())
                    .ok_or_else(|| truncated(&column.name))?;
                let raw: [u8; 4] = bytes[pos..end]
                    .try_into()
                    .map_err(|_| truncated(&column.name))?;
                let len = u32::from_le_bytes(raw) as usize;
                pos = end;

                let end = pos
                    .checked_add(len)
                    .filter(|&end| end <= bytes.len())
                    .ok_or_else(|| truncated(&column.name))?;
                let text = std::str::from_utf8(&bytes[pos..end]).map_err(|_| {
                    Error::corruption(format!(
                        "invalid UTF-8 in varchar column '{}'",
                        column.name
                    ))
                })?;
                values.push(Value::Varchar(text.to_string()));
                pos = end;
            }
        }
    }

    if pos != bytes.len() {
        return Err(Error::corruption(format!(
            "tuple carries {} trailing bytes past the last column",
            bytes.len() - pos
        )));
    }

    Ok(values)
}

fn truncated(column: &str) -> Error {
    Error::corruption(format!("tuple truncated in column '{column}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::schema::Column;

    fn test_schema() -> Schema {
        Schema::new(vec![
            Column::new("id", DataType::Int),
            Column::new("name", DataType::Varchar),
            Column::new("active", DataType::Bool),
        ])
    }

    #[test]
    fn test_round_trip() {
        let schema = test_schema();
        let tuple = vec![
            Value::Int(-42),
            Value::Varchar("hello".to_string()),
            Value::Bool(true),
        ];

        let bytes = encode_tuple(&tuple);
        assert_eq!(bytes.len(), 8 + 4 + 5 + 1);

        let decoded = decode_tuple(&bytes, &schema).unwrap();
        assert_eq!(decoded, tuple);
    }

    #[test]
    fn test_varchar_length_prefix() {
        let bytes = encode_tuple(&[Value::Varchar("abc".to_string())]);
        assert_eq!(&bytes[0..4], &3u32.to_le_bytes());
        assert_eq!(&bytes[4..], b"abc");
    }

    #[test]
    fn test_empty_varchar() {
        let schema = Schema::new(vec![Column::new("s", DataType::Varchar)]);
        let tuple = vec![Value::Varchar(String::new())];
        let bytes = encode_tuple(&tuple);
        assert_eq!(bytes.len(), 4);
        assert_eq!(decode_tuple(&bytes, &schema).unwrap(), tuple);
    }

    #[test]
    fn test_truncated_input_rejected() {
        let schema = test_schema();
        let bytes = encode_tuple(&[
            Value::Int(1),
            Value::Varchar("hello".to_string()),
            Value::Bool(false),
        ]);

        let err = decode_tuple(&bytes[..bytes.len() - 1], &schema).unwrap_err();
        assert!(err.is_corruption());

        let err = decode_tuple(&bytes[..4], &schema).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let schema = Schema::new(vec![Column::new("id", DataType::Int)]);
        let mut bytes = encode_tuple(&[Value::Int(7)]);
        bytes.push(0xFF);

        let err = decode_tuple(&bytes, &schema).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_encoded_len_matches_encoding() {
        let tuple = vec![
            Value::Int(0),
            Value::Varchar("four".to_string()),
            Value::Bool(false),
        ];
        let total: usize = tuple.iter().map(encoded_len).sum();
        assert_eq!(total, encode_tuple(&tuple).len());
    }
}

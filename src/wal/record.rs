//! Log record model and its on-disk wire format
//!
//! Every record is framed as (all little-endian):
//!
//! ```text
//! [total_len: u32][crc: u32][txn_id: u64][prev_lsn: u64][kind: u8][payload]
//! ```
//!
//! `total_len` is the full record length including the length field itself;
//! `crc` is a CRC-32 of everything after the crc field. Payload fields use
//! the same rules as the page tuple encoding: fixed-width numerics, tuple
//! images prefixed with a u32 byte length - so log payloads can be replayed
//! through the exact (de)serialization the pages use.

use crate::common::{Error, Result};
use crate::storage::constants::{Lsn, PageId, Rid, TxnId};
use crc32fast::Hasher;

/// Byte length of the fixed framing before the kind tag
pub const RECORD_HEADER_SIZE: usize = 4 + 4 + 8 + 8;

/// Smallest possible record: framing plus a kind tag and no payload
pub const MIN_RECORD_SIZE: usize = RECORD_HEADER_SIZE + 1;

const KIND_BEGIN: u8 = 1;
const KIND_INSERT: u8 = 2;
const KIND_DELETE: u8 = 3;
const KIND_UPDATE: u8 = 4;
const KIND_COMMIT: u8 = 5;
const KIND_ABORT: u8 = 6;

/// A single write-ahead log entry.
///
/// Insert and delete carry the tuple image involved; update carries both the
/// before and after images, which is what the undo walk needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// Transaction started
    Begin,
    /// Transaction committed
    Commit,
    /// Transaction aborted
    Abort,
    /// A tuple was inserted
    Insert {
        /// Location of the new tuple
        rid: Rid,
        /// Encoded tuple image
        tuple: Vec<u8>,
    },
    /// A tuple was tombstoned
    Delete {
        /// Location of the deleted tuple
        rid: Rid,
        /// Encoded image at the time of deletion (the undo image)
        tuple: Vec<u8>,
    },
    /// A tuple was overwritten in place
    Update {
        /// Location of the updated tuple
        rid: Rid,
        /// Encoded image before the update (the undo image)
        old_tuple: Vec<u8>,
        /// Encoded image after the update
        new_tuple: Vec<u8>,
    },
}

impl LogRecord {
    fn kind(&self) -> u8 {
        match self {
            LogRecord::Begin => KIND_BEGIN,
            LogRecord::Insert { .. } => KIND_INSERT,
            LogRecord::Delete { .. } => KIND_DELETE,
            LogRecord::Update { .. } => KIND_UPDATE,
            LogRecord::Commit => KIND_COMMIT,
            LogRecord::Abort => KIND_ABORT,
        }
    }

    fn encode_payload(&self, buf: &mut Vec<u8>) {
        match self {
            LogRecord::Begin | LogRecord::Commit | LogRecord::Abort => {}
            LogRecord::Insert { rid, tuple } | LogRecord::Delete { rid, tuple } => {
                encode_rid(buf, *rid);
                encode_image(buf, tuple);
            }
            LogRecord::Update {
                rid,
                old_tuple,
                new_tuple,
            } => {
                encode_rid(buf, *rid);
                encode_image(buf, old_tuple);
                encode_image(buf, new_tuple);
            }
        }
    }
}

/// A record decoded out of the log, together with its framing fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    /// Full on-disk length of the record, length field included
    pub total_len: usize,
    /// Owning transaction
    pub txn_id: TxnId,
    /// LSN of the owning transaction's previous record
    pub prev_lsn: Lsn,
    /// The record itself
    pub record: LogRecord,
}

/// Serialize a record with its framing
#[allow(clippy::cast_possible_truncation)]
pub fn encode_record(txn_id: TxnId, prev_lsn: Lsn, record: &LogRecord) -> Vec<u8> {
    let mut payload = Vec::new();
    record.encode_payload(&mut payload);

    let total_len = (MIN_RECORD_SIZE + payload.len()) as u32;

    let mut body = Vec::with_capacity(total_len as usize - 8);
    body.extend_from_slice(&txn_id.to_le_bytes());
    body.extend_from_slice(&prev_lsn.to_le_bytes());
    body.push(record.kind());
    body.extend_from_slice(&payload);

    let mut hasher = Hasher::new();
    hasher.update(&body);
    let crc = hasher.finalize();

    let mut buf = Vec::with_capacity(total_len as usize);
    buf.extend_from_slice(&total_len.to_le_bytes());
    buf.extend_from_slice(&crc.to_le_bytes());
    buf.extend_from_slice(&body);
    buf
}

/// Deserialize the record at the start of `buf`.
///
/// # Errors
///
/// Returns `Error::Corruption` on truncation, an invalid length, a CRC
/// mismatch, or an unknown kind tag.
pub fn decode_record(buf: &[u8]) -> Result<DecodedRecord> {
    if buf.len() < MIN_RECORD_SIZE {
        return Err(Error::corruption("log record truncated before framing"));
    }

    let total_len = u32::from_le_bytes(buf[0..4].try_into().expect("4-byte slice")) as usize;
    if total_len < MIN_RECORD_SIZE || total_len > buf.len() {
        return Err(Error::corruption(format!(
            "log record length {total_len} out of bounds"
        )));
    }

    let stored_crc = u32::from_le_bytes(buf[4..8].try_into().expect("4-byte slice"));
    let body = &buf[8..total_len];

    let mut hasher = Hasher::new();
    hasher.update(body);
    if hasher.finalize() != stored_crc {
        return Err(Error::corruption("log record CRC mismatch"));
    }

    let txn_id = TxnId::from_le_bytes(body[0..8].try_into().expect("8-byte slice"));
    let prev_lsn = Lsn::from_le_bytes(body[8..16].try_into().expect("8-byte slice"));
    let kind = body[16];
    let payload = &body[17..];

    let record = match kind {
        KIND_BEGIN => expect_empty(payload, LogRecord::Begin)?,
        KIND_COMMIT => expect_empty(payload, LogRecord::Commit)?,
        KIND_ABORT => expect_empty(payload, LogRecord::Abort)?,
        KIND_INSERT => {
            let (rid, rest) = decode_rid(payload)?;
            let (tuple, rest) = decode_image(rest)?;
            expect_empty(rest, LogRecord::Insert { rid, tuple })?
        }
        KIND_DELETE => {
            let (rid, rest) = decode_rid(payload)?;
            let (tuple, rest) = decode_image(rest)?;
            expect_empty(rest, LogRecord::Delete { rid, tuple })?
        }
        KIND_UPDATE => {
            let (rid, rest) = decode_rid(payload)?;
            let (old_tuple, rest) = decode_image(rest)?;
            let (new_tuple, rest) = decode_image(rest)?;
            expect_empty(
                rest,
                LogRecord::Update {
                    rid,
                    old_tuple,
                    new_tuple,
                },
            )?
        }
        other => {
            return Err(Error::corruption(format!(
                "unknown log record kind {other}"
            )))
        }
    };

    Ok(DecodedRecord {
        total_len,
        txn_id,
        prev_lsn,
        record,
    })
}

fn expect_empty(rest: &[u8], record: LogRecord) -> Result<LogRecord> {
    if rest.is_empty() {
        Ok(record)
    } else {
        Err(Error::corruption(format!(
            "log record carries {} trailing payload bytes",
            rest.len()
        )))
    }
}

fn encode_rid(buf: &mut Vec<u8>, rid: Rid) {
    buf.extend_from_slice(&rid.page_id.to_le_bytes());
    buf.extend_from_slice(&rid.slot.to_le_bytes());
}

fn decode_rid(buf: &[u8]) -> Result<(Rid, &[u8])> {
    if buf.len() < 6 {
        return Err(Error::corruption("log payload truncated in rid"));
    }
    let page_id = PageId::from_le_bytes(buf[0..4].try_into().expect("4-byte slice"));
    let slot = u16::from_le_bytes(buf[4..6].try_into().expect("2-byte slice"));
    Ok((Rid::new(page_id, slot), &buf[6..]))
}

#[allow(clippy::cast_possible_truncation)]
fn encode_image(buf: &mut Vec<u8>, image: &[u8]) {
    buf.extend_from_slice(&(image.len() as u32).to_le_bytes());
    buf.extend_from_slice(image);
}

fn decode_image(buf: &[u8]) -> Result<(Vec<u8>, &[u8])> {
    if buf.len() < 4 {
        return Err(Error::corruption("log payload truncated in image length"));
    }
    let len = u32::from_le_bytes(buf[0..4].try_into().expect("4-byte slice")) as usize;
    let rest = &buf[4..];
    if rest.len() < len {
        return Err(Error::corruption("log payload truncated in image bytes"));
    }
    Ok((rest[..len].to_vec(), &rest[len..]))
}

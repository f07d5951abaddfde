//! Append-only log manager with forced durability
//!
//! The log manager owns one log file and sequences every append through a
//! single critical section: the record's LSN is the durable byte length of
//! the file immediately before the append, and the file is synced to stable
//! storage before `append` returns. That ordering is the write-ahead
//! contract the rest of the engine depends on - a data page must never be
//! made durable reflecting an operation whose log record is not.

use crate::common::{Error, Result};
use crate::storage::constants::{Lsn, TxnId};
use crate::wal::record::{decode_record, encode_record, LogRecord, MIN_RECORD_SIZE};
use parking_lot::Mutex;
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

struct LogInner {
    file: File,
    /// Durable byte length of the log; the LSN the next record will get
    next_lsn: Lsn,
}

/// The write-ahead log manager for one log file
pub struct LogManager {
    path: PathBuf,
    inner: Mutex<LogInner>,
}

/// One entry yielded by a forward scan of the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Where the record lives in the file
    pub lsn: Lsn,
    /// Owning transaction
    pub txn_id: TxnId,
    /// The owning transaction's previous record
    pub prev_lsn: Lsn,
    /// The record itself
    pub record: LogRecord,
}

impl LogManager {
    /// Open the log file, creating it and its parent directories if absent.
    ///
    /// The next LSN is the current file length, so appends continue exactly
    /// where a previous process left off.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be created or inspected.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let next_lsn = file.metadata()?.len();
        log::debug!("opened log file {path:?} at LSN {next_lsn}");

        Ok(Self {
            path,
            inner: Mutex::new(LogInner { file, next_lsn }),
        })
    }

    /// Path of the underlying log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durable byte length of the log (the LSN the next record will get)
    pub fn durable_len(&self) -> Lsn {
        self.inner.lock().next_lsn
    }

    /// Append a record and force it durable before returning.
    ///
    /// The assigned LSN equals the durable log size immediately before the
    /// record is written; appends are serialized so LSN assignment and
    /// file-length advancement never race.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the write or sync fails; the record must
    /// not be considered durable in that case.
    pub fn append(&self, txn_id: TxnId, prev_lsn: Lsn, record: &LogRecord) -> Result<Lsn> {
        let bytes = encode_record(txn_id, prev_lsn, record);

        let mut inner = self.inner.lock();
        let lsn = inner.next_lsn;

        inner.file.seek(SeekFrom::Start(lsn))?;
        inner.file.write_all(&bytes)?;
        inner.file.sync_all()?;

        inner.next_lsn = lsn + bytes.len() as Lsn;
        log::trace!("appended {record:?} for txn {txn_id} at LSN {lsn}");
        Ok(lsn)
    }

    /// Read the record at `lsn`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an LSN past the durable tail and
    /// [`Error::Corruption`] if the bytes there do not decode.
    pub fn read_record(&self, lsn: Lsn) -> Result<LogEntry> {
        let mut inner = self.inner.lock();
        if lsn >= inner.next_lsn {
            return Err(Error::invalid_input(format!(
                "LSN {lsn} is past the durable log tail {}",
                inner.next_lsn
            )));
        }

        inner.file.seek(SeekFrom::Start(lsn))?;
        let mut len_buf = [0u8; 4];
        inner.file.read_exact(&mut len_buf)?;
        let total_len = u32::from_le_bytes(len_buf) as usize;
        if total_len < MIN_RECORD_SIZE || lsn + total_len as Lsn > inner.next_lsn {
            return Err(Error::corruption(format!(
                "log record at LSN {lsn} has invalid length {total_len}"
            )));
        }

        let mut buf = vec![0u8; total_len];
        buf[0..4].copy_from_slice(&len_buf);
        inner.file.read_exact(&mut buf[4..])?;

        let decoded = decode_record(&buf)?;
        Ok(LogEntry {
            lsn,
            txn_id: decoded.txn_id,
            prev_lsn: decoded.prev_lsn,
            record: decoded.record,
        })
    }

    /// Scan the log forward from the beginning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corruption`] if any record fails to decode - the
    /// log is not trusted past the first bad record.
    pub fn scan(&self) -> Result<Vec<LogEntry>> {
        let mut inner = self.inner.lock();
        let len = inner.next_lsn;

        inner.file.seek(SeekFrom::Start(0))?;
        let mut bytes = vec![0u8; usize::try_from(len).map_err(|_| Error::io("log too large"))?];
        inner.file.read_exact(&mut bytes)?;
        drop(inner);

        let mut entries = Vec::new();
        let mut pos = 0usize;
        while pos < bytes.len() {
            let decoded = decode_record(&bytes[pos..])?;
            entries.push(LogEntry {
                lsn: pos as Lsn,
                txn_id: decoded.txn_id,
                prev_lsn: decoded.prev_lsn,
                record: decoded.record,
            });
            pos += decoded.total_len;
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::test_utils::TempDir;
    use crate::storage::constants::{Rid, INVALID_LSN};

    #[test]
    fn test_lsn_is_prior_byte_length() {
        let dir = TempDir::new().unwrap();
        let wal = LogManager::open(dir.file_path("test.wal")).unwrap();

        let first = wal.append(1, INVALID_LSN, &LogRecord::Begin).unwrap();
        assert_eq!(first, 0);

        let second = wal.append(1, first, &LogRecord::Commit).unwrap();
        assert_eq!(second, wal.read_record(first).unwrap().lsn + 25);
        assert_eq!(wal.durable_len(), second + 25);
    }

    #[test]
    fn test_read_back_by_lsn() {
        let dir = TempDir::new().unwrap();
        let wal = LogManager::open(dir.file_path("test.wal")).unwrap();

        let record = LogRecord::Insert {
            rid: Rid::new(2, 0),
            tuple: vec![1, 2, 3, 4],
        };
        let lsn = wal.append(9, INVALID_LSN, &record).unwrap();

        let entry = wal.read_record(lsn).unwrap();
        assert_eq!(entry.txn_id, 9);
        assert_eq!(entry.prev_lsn, INVALID_LSN);
        assert_eq!(entry.record, record);
    }

    #[test]
    fn test_read_past_tail_rejected() {
        let dir = TempDir::new().unwrap();
        let wal = LogManager::open(dir.file_path("test.wal")).unwrap();

        assert!(wal.read_record(0).is_err());
        wal.append(1, INVALID_LSN, &LogRecord::Begin).unwrap();
        assert!(wal.read_record(1_000_000).is_err());
    }

    #[test]
    fn test_reopen_continues_lsn_sequence() {
        let dir = TempDir::new().unwrap();
        let path = dir.file_path("test.wal");

        let first_len;
        {
            let wal = LogManager::open(&path).unwrap();
            wal.append(1, INVALID_LSN, &LogRecord::Begin).unwrap();
            first_len = wal.durable_len();
        }

        let wal = LogManager::open(&path).unwrap();
        assert_eq!(wal.durable_len(), first_len);

        let lsn = wal.append(1, 0, &LogRecord::Commit).unwrap();
        assert_eq!(lsn, first_len);
    }

    #[test]
    fn test_scan_returns_all_records_in_order() {
        let dir = TempDir::new().unwrap();
        let wal = LogManager::open(dir.file_path("test.wal")).unwrap();

        let begin = wal.append(5, INVALID_LSN, &LogRecord::Begin).unwrap();
        let insert = wal
            .append(
                5,
                begin,
                &LogRecord::Insert {
                    rid: Rid::new(0, 0),
                    tuple: vec![7; 8],
                },
            )
            .unwrap();
        wal.append(5, insert, &LogRecord::Commit).unwrap();

        let entries = wal.scan().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].record, LogRecord::Begin);
        assert_eq!(entries[1].prev_lsn, begin);
        assert_eq!(entries[2].record, LogRecord::Commit);
        assert_eq!(entries[2].txn_id, 5);
    }
}

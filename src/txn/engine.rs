//! One participant's storage stack: disk manager, log manager and
//! transaction manager for a single database
//!
//! Every data mutation follows the write-ahead ordering: the log record is
//! appended (and forced durable) first, chained to the transaction's
//! previous record, and only then is the mutation applied to the page.
//! Page write-back is not ordered against commit; the log carries the redo
//! information.
//!
//! No isolation is provided here: concurrent transactions mutating the same
//! page are not protected from one another. That is a documented property
//! of the core, not an oversight.

use crate::common::{Error, Result};
use crate::storage::constants::{PageId, Rid, INVALID_LSN};
use crate::storage::disk::DiskManager;
use crate::storage::page::Page;
use crate::txn::transaction::{Transaction, TransactionManager, TxnStatus};
use crate::types::{encode_tuple, Value};
use crate::wal::log_manager::LogManager;
use crate::wal::record::LogRecord;
use std::path::Path;

/// A local database engine: the unit a distributed coordinator treats as
/// one opaque participant.
pub struct Engine {
    name: String,
    disk: DiskManager,
    wal: LogManager,
    txns: TransactionManager,
}

impl Engine {
    /// Open (or create) an engine from its database and log file paths
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if either file cannot be opened.
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(name: &str, db_path: P, wal_path: Q) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            disk: DiskManager::open(db_path)?,
            wal: LogManager::open(wal_path)?,
            txns: TransactionManager::new(1),
        })
    }

    /// Open an engine with conventional file names inside `dir`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if either file cannot be opened.
    pub fn open_in<P: AsRef<Path>>(name: &str, dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        Self::open(
            name,
            dir.join(format!("{name}.db")),
            dir.join(format!("{name}.wal")),
        )
    }

    /// Engine name (used in coordinator logging)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The engine's disk manager
    pub fn disk(&self) -> &DiskManager {
        &self.disk
    }

    /// The engine's log manager
    pub fn wal(&self) -> &LogManager {
        &self.wal
    }

    /// The engine's transaction manager
    pub fn txns(&self) -> &TransactionManager {
        &self.txns
    }

    /// Begin a transaction: allocate a fresh id and write its BEGIN record
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the BEGIN record cannot be made durable.
    pub fn begin(&self) -> Result<Transaction> {
        let id = self.txns.begin_id();
        let lsn = self.wal.append(id, INVALID_LSN, &LogRecord::Begin)?;
        log::debug!("[{}] begin txn {id}", self.name);
        Ok(Transaction::new(id, lsn))
    }

    /// Allocate a page for tuple placement
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on file errors.
    pub fn allocate_page(&self) -> Result<PageId> {
        self.disk.allocate_page()
    }

    /// Read a page (callers scanning tuples go through this)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on file errors.
    pub fn read_page(&self, page_id: PageId) -> Result<Page> {
        self.disk.read_page(page_id)
    }

    /// Insert a tuple into `page_id` under `txn`.
    ///
    /// Returns `Ok(None)` if the page lacks free space - a normal outcome
    /// the caller handles by trying another page, never an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionState`] if `txn` is not active, or
    /// [`Error::Io`] on log/page I/O failure.
    pub fn insert(
        &self,
        txn: &mut Transaction,
        page_id: PageId,
        values: &[Value],
    ) -> Result<Option<Rid>> {
        txn.check_active()?;

        let image = encode_tuple(values);
        let mut page = self.disk.read_page(page_id)?;
        if !page.can_fit(image.len()) {
            return Ok(None);
        }

        // The slot an insert lands in is always the next directory entry,
        // so the rid can be logged before the page is touched.
        let rid = Rid::new(page_id, page.slot_count());
        let lsn = self.wal.append(
            txn.id(),
            txn.last_lsn(),
            &LogRecord::Insert {
                rid,
                tuple: image.clone(),
            },
        )?;
        txn.chain(lsn);

        let slot = page
            .insert_raw(&image)
            .ok_or_else(|| Error::internal("insert failed after capacity check"))?;
        debug_assert_eq!(slot, rid.slot);
        self.disk.write_page(&page)?;

        Ok(Some(rid))
    }

    /// Tombstone the tuple at `rid` under `txn`.
    ///
    /// Returns `Ok(false)` if the slot holds no live tuple.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionState`] if `txn` is not active, or
    /// [`Error::Io`] on log/page I/O failure.
    pub fn delete(&self, txn: &mut Transaction, rid: Rid) -> Result<bool> {
        txn.check_active()?;

        let mut page = self.disk.read_page(rid.page_id)?;
        let Some(old) = page.get_raw(rid.slot).map(<[u8]>::to_vec) else {
            return Ok(false);
        };

        let lsn = self.wal.append(
            txn.id(),
            txn.last_lsn(),
            &LogRecord::Delete { rid, tuple: old },
        )?;
        txn.chain(lsn);

        page.delete_tuple(rid.slot);
        self.disk.write_page(&page)?;
        Ok(true)
    }

    /// Overwrite the tuple at `rid` in place under `txn`.
    ///
    /// Returns `Ok(false)` if the slot holds no live tuple or the new image
    /// is larger than the current one (the caller's delete-and-reinsert
    /// problem - in-place updates only shrink).
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionState`] if `txn` is not active, or
    /// [`Error::Io`] on log/page I/O failure.
    pub fn update(&self, txn: &mut Transaction, rid: Rid, values: &[Value]) -> Result<bool> {
        txn.check_active()?;

        let mut page = self.disk.read_page(rid.page_id)?;
        let Some(old) = page.get_raw(rid.slot).map(<[u8]>::to_vec) else {
            return Ok(false);
        };
        let new = encode_tuple(values);
        if new.is_empty() || new.len() > old.len() {
            return Ok(false);
        }

        let lsn = self.wal.append(
            txn.id(),
            txn.last_lsn(),
            &LogRecord::Update {
                rid,
                old_tuple: old,
                new_tuple: new.clone(),
            },
        )?;
        txn.chain(lsn);

        if !page.update_raw(rid.slot, &new) {
            return Err(Error::internal("in-place update failed after size check"));
        }
        self.disk.write_page(&page)?;
        Ok(true)
    }

    /// Vote to commit: flush the transaction's chain and mark it Prepared.
    ///
    /// Every append is already forced durable, so the durable promise is
    /// the chain itself; prepare validates and records the transition.
    /// On failure the transaction remains abortable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionState`] if the transaction is not Active.
    pub fn prepare(&self, txn: &mut Transaction) -> Result<()> {
        txn.transition(TxnStatus::Prepared)?;
        log::debug!("[{}] txn {} prepared", self.name, txn.id());
        Ok(())
    }

    /// Commit: force a COMMIT record and mark the transaction Committed.
    ///
    /// Legal from Prepared (2PC) and directly from Active (local-only).
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionState`] on an illegal transition, or
    /// [`Error::Io`] if the COMMIT record cannot be made durable (the
    /// transaction is then still in its prior state).
    pub fn commit(&self, txn: &mut Transaction) -> Result<()> {
        txn.check_transition(TxnStatus::Committed)?;

        let lsn = self
            .wal
            .append(txn.id(), txn.last_lsn(), &LogRecord::Commit)?;
        txn.chain(lsn);
        txn.transition(TxnStatus::Committed)?;
        self.txns.finish(txn.id());

        log::debug!("[{}] txn {} committed", self.name, txn.id());
        Ok(())
    }

    /// Abort: physically undo the transaction's page mutations, write an
    /// ABORT record, and mark it Aborted.
    ///
    /// The undo walk follows the prevLSN chain backward from the last
    /// record, reversing each mutation with the before-images the log
    /// carries: inserts are tombstoned, deletes restored, updates rolled
    /// back to their old image in place. Update-after-insert chains unwind
    /// naturally because the walk runs last-to-first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionState`] on an illegal transition,
    /// [`Error::Io`] on log/page I/O failure, or [`Error::Corruption`] if
    /// the chain does not decode.
    pub fn abort(&self, txn: &mut Transaction) -> Result<()> {
        txn.check_transition(TxnStatus::Aborted)?;

        self.undo_chain(txn)?;

        let lsn = self
            .wal
            .append(txn.id(), txn.last_lsn(), &LogRecord::Abort)?;
        txn.chain(lsn);
        txn.transition(TxnStatus::Aborted)?;
        self.txns.finish(txn.id());

        log::debug!("[{}] txn {} aborted", self.name, txn.id());
        Ok(())
    }

    fn undo_chain(&self, txn: &Transaction) -> Result<()> {
        let mut lsn = txn.last_lsn();
        while lsn != INVALID_LSN {
            let entry = self.wal.read_record(lsn)?;
            if entry.txn_id != txn.id() {
                return Err(Error::corruption(format!(
                    "prevLSN chain of txn {} reached record of txn {} at LSN {lsn}",
                    txn.id(),
                    entry.txn_id
                )));
            }

            match entry.record {
                LogRecord::Insert { rid, .. } => {
                    let mut page = self.disk.read_page(rid.page_id)?;
                    page.delete_tuple(rid.slot);
                    self.disk.write_page(&page)?;
                }
                LogRecord::Delete { rid, tuple } | LogRecord::Update { rid, old_tuple: tuple, .. } => {
                    let mut page = self.disk.read_page(rid.page_id)?;
                    if !page.restore_raw(rid.slot, &tuple) {
                        return Err(Error::corruption(format!(
                            "undo could not restore tuple at {rid}"
                        )));
                    }
                    self.disk.write_page(&page)?;
                }
                LogRecord::Begin => {}
                LogRecord::Commit | LogRecord::Abort => {
                    return Err(Error::corruption(format!(
                        "undo walk of txn {} hit terminal record {:?}",
                        txn.id(),
                        entry.record
                    )));
                }
            }

            lsn = entry.prev_lsn;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::test_utils::TempDir;
    use crate::types::{Column, DataType, Schema};

    fn test_schema() -> Schema {
        Schema::new(vec![
            Column::new("id", DataType::Int),
            Column::new("name", DataType::Varchar),
        ])
    }

    fn tuple(id: i64, name: &str) -> Vec<Value> {
        vec![Value::Int(id), Value::Varchar(name.to_string())]
    }

    #[test]
    fn test_local_commit_flow() {
        let dir = TempDir::new().unwrap();
        let engine = Engine::open_in("db", dir.path()).unwrap();
        let schema = test_schema();

        let mut txn = engine.begin().unwrap();
        let page_id = engine.allocate_page().unwrap();
        let rid = engine
            .insert(&mut txn, page_id, &tuple(1, "alice"))
            .unwrap()
            .unwrap();
        engine.commit(&mut txn).unwrap();

        assert_eq!(txn.status(), TxnStatus::Committed);
        let page = engine.read_page(page_id).unwrap();
        assert_eq!(page.get_tuple(rid.slot, &schema), Some(tuple(1, "alice")));
    }

    #[test]
    fn test_abort_undoes_insert() {
        let dir = TempDir::new().unwrap();
        let engine = Engine::open_in("db", dir.path()).unwrap();
        let schema = test_schema();

        let page_id = engine.allocate_page().unwrap();

        let mut committed = engine.begin().unwrap();
        let kept = engine
            .insert(&mut committed, page_id, &tuple(1, "kept"))
            .unwrap()
            .unwrap();
        engine.commit(&mut committed).unwrap();

        let mut txn = engine.begin().unwrap();
        let gone = engine
            .insert(&mut txn, page_id, &tuple(2, "gone"))
            .unwrap()
            .unwrap();
        engine.abort(&mut txn).unwrap();

        let page = engine.read_page(page_id).unwrap();
        assert_eq!(page.get_tuple(kept.slot, &schema), Some(tuple(1, "kept")));
        assert_eq!(page.get_tuple(gone.slot, &schema), None);
    }

    #[test]
    fn test_abort_undoes_delete_and_update() {
        let dir = TempDir::new().unwrap();
        let engine = Engine::open_in("db", dir.path()).unwrap();
        let schema = test_schema();

        let page_id = engine.allocate_page().unwrap();
        let mut setup = engine.begin().unwrap();
        let a = engine
            .insert(&mut setup, page_id, &tuple(1, "original a"))
            .unwrap()
            .unwrap();
        let b = engine
            .insert(&mut setup, page_id, &tuple(2, "original b"))
            .unwrap()
            .unwrap();
        engine.commit(&mut setup).unwrap();

        let mut txn = engine.begin().unwrap();
        assert!(engine.delete(&mut txn, a).unwrap());
        assert!(engine.update(&mut txn, b, &tuple(2, "patched")).unwrap());
        engine.abort(&mut txn).unwrap();

        let page = engine.read_page(page_id).unwrap();
        assert_eq!(page.get_tuple(a.slot, &schema), Some(tuple(1, "original a")));
        assert_eq!(page.get_tuple(b.slot, &schema), Some(tuple(2, "original b")));
    }

    #[test]
    fn test_insert_capacity_failure_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let engine = Engine::open_in("db", dir.path()).unwrap();

        let page_id = engine.allocate_page().unwrap();
        let mut txn = engine.begin().unwrap();

        let huge = vec![Value::Varchar("y".repeat(8192))];
        assert_eq!(engine.insert(&mut txn, page_id, &huge).unwrap(), None);
        engine.abort(&mut txn).unwrap();
    }

    #[test]
    fn test_mutation_on_finished_transaction_rejected() {
        let dir = TempDir::new().unwrap();
        let engine = Engine::open_in("db", dir.path()).unwrap();

        let page_id = engine.allocate_page().unwrap();
        let mut txn = engine.begin().unwrap();
        engine.commit(&mut txn).unwrap();

        let err = engine
            .insert(&mut txn, page_id, &tuple(1, "late"))
            .unwrap_err();
        assert!(matches!(err, Error::TransactionState(_)));
    }

    #[test]
    fn test_prepared_then_commit() {
        let dir = TempDir::new().unwrap();
        let engine = Engine::open_in("db", dir.path()).unwrap();

        let mut txn = engine.begin().unwrap();
        engine.prepare(&mut txn).unwrap();
        assert_eq!(txn.status(), TxnStatus::Prepared);

        engine.commit(&mut txn).unwrap();
        assert_eq!(txn.status(), TxnStatus::Committed);
    }
}

//! Transaction identity, status machine and the per-engine manager

use crate::common::{Error, Result};
use crate::storage::constants::{Lsn, TxnId};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// Status of a transaction.
///
/// Legal moves: `Active -> Prepared -> {Committed, Aborted}` and
/// `Active -> Aborted`. Prepared is terminal-adjacent: once reached, the
/// outcome is Committed or Aborted and never reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    /// Running; may still log mutations
    Active,
    /// Durably promised to commit if told to (2PC vote yes)
    Prepared,
    /// Terminal: all logged changes are committed
    Committed,
    /// Terminal: all logged changes have been undone
    Aborted,
}

/// A unit of work: a transaction id, its status, and the LSN of its most
/// recently written log record (the head of its prevLSN chain).
#[derive(Debug, Clone)]
pub struct Transaction {
    id: TxnId,
    status: TxnStatus,
    last_lsn: Lsn,
}

impl Transaction {
    pub(crate) fn new(id: TxnId, begin_lsn: Lsn) -> Self {
        Self {
            id,
            status: TxnStatus::Active,
            last_lsn: begin_lsn,
        }
    }

    /// The transaction's id
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Current status
    pub fn status(&self) -> TxnStatus {
        self.status
    }

    /// LSN of the transaction's most recent log record
    pub fn last_lsn(&self) -> Lsn {
        self.last_lsn
    }

    /// Advance the prevLSN chain head after a logged mutation
    pub(crate) fn chain(&mut self, lsn: Lsn) {
        self.last_lsn = lsn;
    }

    /// Check that a status transition is legal without performing it
    pub(crate) fn check_transition(&self, to: TxnStatus) -> Result<()> {
        use TxnStatus::{Aborted, Active, Committed, Prepared};
        let legal = matches!(
            (self.status, to),
            (Active, Prepared)
                | (Active, Committed)
                | (Active, Aborted)
                | (Prepared, Committed)
                | (Prepared, Aborted)
        );
        if legal {
            Ok(())
        } else {
            Err(Error::transaction_state(format!(
                "illegal transition {:?} -> {to:?} for transaction {}",
                self.status, self.id
            )))
        }
    }

    /// Perform a status transition, enforcing legality
    pub(crate) fn transition(&mut self, to: TxnStatus) -> Result<()> {
        self.check_transition(to)?;
        self.status = to;
        Ok(())
    }

    /// Check that the transaction can still log mutations
    pub(crate) fn check_active(&self) -> Result<()> {
        if self.status == TxnStatus::Active {
            Ok(())
        } else {
            Err(Error::transaction_state(format!(
                "transaction {} is {:?}, not Active",
                self.id, self.status
            )))
        }
    }
}

/// Monotonic transaction-id source and active-set bookkeeping for one
/// engine. Designed to be shared across threads.
#[derive(Debug, Default)]
pub struct TransactionManager {
    next_txn_id: AtomicU64,
    active: Mutex<HashSet<TxnId>>,
}

impl TransactionManager {
    /// Create a manager vending ids from `initial_txn_id`
    pub fn new(initial_txn_id: TxnId) -> Self {
        Self {
            next_txn_id: AtomicU64::new(initial_txn_id),
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Allocate a fresh transaction id and mark it active
    pub fn begin_id(&self) -> TxnId {
        let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        self.active.lock().insert(id);
        id
    }

    /// Remove a transaction from the active set once its outcome is durable
    pub fn finish(&self, id: TxnId) {
        self.active.lock().remove(&id);
    }

    /// Number of transactions currently in flight
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// True if the given transaction is still in flight
    pub fn is_active(&self, id: TxnId) -> bool {
        self.active.lock().contains(&id)
    }
}

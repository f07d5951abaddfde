//! Two-phase-commit coordinator over independent participant engines
//!
//! The coordinator executes one distributed operation - a mapping from
//! participant to the operation it must run - as an atomic unit:
//!
//! 1. generate a global transaction identifier;
//! 2. prepare phase: begin a local transaction on each participant, apply
//!    its operation, and ask for a prepare vote; stop at the first failure;
//! 3. decision phase: commit everywhere if every vote was yes, otherwise
//!    abort every participant with a recorded local transaction.
//!
//! No participant commits before all have voted; no participant is told to
//! commit after any negative vote. A commit or abort failure *after* the
//! decision is a fatal inconsistency: it is logged and flips the result to
//! failure, and nothing is retried - this coordinator holds no durable
//! decision log of its own (presumed-nothing 2PC), so such participants are
//! left flagged for manual intervention.

use crate::common::{Error, Result};
use crate::txn::engine::Engine;
use crate::txn::transaction::{Transaction, TxnStatus};
use std::sync::Arc;
use uuid::Uuid;

/// One independent local database engine taking part in a distributed
/// transaction.
///
/// This is the boundary the coordinator drives; the meaning of the
/// operation string belongs to the layer that owns the participant (the
/// SQL executor, for a real engine).
pub trait Participant {
    /// Participant name, for operational logging
    fn name(&self) -> &str;

    /// Begin a local transaction
    ///
    /// # Errors
    ///
    /// Implementations fail if the local BEGIN cannot be made durable.
    fn begin(&self) -> Result<Transaction>;

    /// Apply the assigned operation under the local transaction
    ///
    /// # Errors
    ///
    /// A failure here is a negative prepare vote, not a protocol fault.
    fn execute(&self, txn: &mut Transaction, operation: &str) -> Result<()>;

    /// Vote on committing: make the transaction's effects durable-on-command
    ///
    /// # Errors
    ///
    /// A failure here is a negative vote; the transaction stays abortable.
    fn prepare(&self, txn: &mut Transaction) -> Result<()>;

    /// Commit the local transaction (only after a global commit decision)
    ///
    /// # Errors
    ///
    /// A failure here is a post-decision inconsistency.
    fn commit(&self, txn: &mut Transaction) -> Result<()>;

    /// Abort the local transaction
    ///
    /// # Errors
    ///
    /// A failure after a global abort decision is a post-decision
    /// inconsistency.
    fn abort(&self, txn: &mut Transaction) -> Result<()>;
}

/// Applier closure type: the excluded executor's seam into an [`Engine`]
pub type Applier = dyn Fn(&Engine, &mut Transaction, &str) -> Result<()> + Send + Sync;

/// Adapter binding an [`Engine`] and an applier closure into a
/// [`Participant`].
///
/// The applier interprets the operation string - in a full system that is
/// the SQL executor; in tests it is whatever tuple-level closure the test
/// needs.
pub struct EngineParticipant {
    engine: Arc<Engine>,
    applier: Box<Applier>,
}

impl EngineParticipant {
    /// Wrap an engine and an applier into a participant
    pub fn new<F>(engine: Arc<Engine>, applier: F) -> Self
    where
        F: Fn(&Engine, &mut Transaction, &str) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            engine,
            applier: Box::new(applier),
        }
    }
}

impl Participant for EngineParticipant {
    fn name(&self) -> &str {
        self.engine.name()
    }

    fn begin(&self) -> Result<Transaction> {
        self.engine.begin()
    }

    fn execute(&self, txn: &mut Transaction, operation: &str) -> Result<()> {
        (self.applier)(&self.engine, txn, operation)
    }

    fn prepare(&self, txn: &mut Transaction) -> Result<()> {
        self.engine.prepare(txn)
    }

    fn commit(&self, txn: &mut Transaction) -> Result<()> {
        self.engine.commit(txn)
    }

    fn abort(&self, txn: &mut Transaction) -> Result<()> {
        self.engine.abort(txn)
    }
}

/// Session state for one distributed operation: the global id and the local
/// transactions recorded so far. Held only for the duration of the call -
/// the coordinator keeps no durable state.
struct Session<'a> {
    global_id: Uuid,
    recorded: Vec<(&'a dyn Participant, Transaction)>,
}

/// Drives two-phase commit across a set of participants
#[derive(Debug, Default)]
pub struct Coordinator;

impl Coordinator {
    /// Create a coordinator
    pub fn new() -> Self {
        Self
    }

    /// Execute one distributed operation atomically across `operations`.
    ///
    /// Each entry pairs a participant with the operation it must run.
    /// Returns `true` only if every participant reached Committed;
    /// otherwise participants are left rolled back or, after a
    /// post-decision failure, in an undefined state that has been logged
    /// for manual intervention. The boolean is the only signal surfaced to
    /// the caller; per-participant detail goes to the log.
    pub fn execute_distributed(&self, operations: &[(&dyn Participant, &str)]) -> bool {
        let mut session = Session {
            global_id: Uuid::new_v4(),
            recorded: Vec::with_capacity(operations.len()),
        };
        log::info!(
            "[2pc {}] starting distributed transaction across {} participants",
            session.global_id,
            operations.len()
        );

        let all_prepared = self.run_prepare_phase(&mut session, operations);

        if all_prepared {
            self.commit_all(&mut session)
        } else {
            self.abort_all(&mut session);
            false
        }
    }

    /// Prepare phase: begin, execute and prepare on each participant in
    /// order, stopping at the first failure. Failed participants with a
    /// live local transaction are still recorded so the abort phase can
    /// roll them back.
    fn run_prepare_phase<'a>(
        &self,
        session: &mut Session<'a>,
        operations: &[(&'a dyn Participant, &str)],
    ) -> bool {
        for (participant, operation) in operations {
            let mut txn = match participant.begin() {
                Ok(txn) => txn,
                Err(err) => {
                    log::warn!(
                        "[2pc {}] participant '{}' failed to begin: {err}",
                        session.global_id,
                        participant.name()
                    );
                    return false;
                }
            };

            let vote = participant
                .execute(&mut txn, operation)
                .and_then(|()| participant.prepare(&mut txn));

            match vote {
                Ok(()) => {
                    log::debug!(
                        "[2pc {}] participant '{}' voted prepared (txn {})",
                        session.global_id,
                        participant.name(),
                        txn.id()
                    );
                    session.recorded.push((*participant, txn));
                }
                Err(err) => {
                    log::warn!(
                        "[2pc {}] participant '{}' voted abort: {err}",
                        session.global_id,
                        participant.name()
                    );
                    // Its local transaction exists and must be rolled back.
                    session.recorded.push((*participant, txn));
                    return false;
                }
            }
        }
        true
    }

    /// Commit decision: every vote was yes. A failure here is fatal - the
    /// decision was already made, so the failing participant is logged and
    /// left for manual intervention, never retried.
    fn commit_all(&self, session: &mut Session<'_>) -> bool {
        log::info!("[2pc {}] all participants prepared, committing", session.global_id);

        let mut all_committed = true;
        for (participant, txn) in &mut session.recorded {
            if let Err(err) = participant.commit(txn) {
                let fatal = Error::commit_inconsistency(format!(
                    "participant '{}' failed to commit after the global commit \
                     decision: {err}",
                    participant.name()
                ));
                log::error!(
                    "[2pc {}] FATAL: {fatal}, manual intervention required",
                    session.global_id
                );
                all_committed = false;
            }
        }

        if all_committed {
            log::info!("[2pc {}] committed on all participants", session.global_id);
        }
        all_committed
    }

    /// Abort decision: roll back every recorded local transaction.
    /// Participants never reached have nothing to roll back.
    fn abort_all(&self, session: &mut Session<'_>) {
        log::info!(
            "[2pc {}] aborting {} recorded participants",
            session.global_id,
            session.recorded.len()
        );

        for (participant, txn) in &mut session.recorded {
            if txn.status() == TxnStatus::Aborted {
                continue;
            }
            if let Err(err) = participant.abort(txn) {
                let fatal = Error::commit_inconsistency(format!(
                    "participant '{}' failed to abort after the global abort \
                     decision: {err}",
                    participant.name()
                ));
                log::error!(
                    "[2pc {}] FATAL: {fatal}, manual intervention required",
                    session.global_id
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Error;
    use crate::storage::constants::INVALID_LSN;
    use parking_lot::Mutex;

    /// A participant that records lifecycle calls and can be told to fail
    /// at any step.
    struct MockParticipant {
        name: String,
        fail_on: Option<&'static str>,
        calls: Mutex<Vec<&'static str>>,
        final_status: Mutex<Option<TxnStatus>>,
    }

    impl MockParticipant {
        fn new(name: &str, fail_on: Option<&'static str>) -> Self {
            Self {
                name: name.to_string(),
                fail_on,
                calls: Mutex::new(Vec::new()),
                final_status: Mutex::new(None),
            }
        }

        fn step(&self, step: &'static str) -> Result<()> {
            self.calls.lock().push(step);
            if self.fail_on == Some(step) {
                Err(Error::internal(format!("{} refused to {step}", self.name)))
            } else {
                Ok(())
            }
        }
    }

    impl Participant for MockParticipant {
        fn name(&self) -> &str {
            &self.name
        }

        fn begin(&self) -> Result<Transaction> {
            self.step("begin")?;
            Ok(Transaction::new(1, INVALID_LSN))
        }

        fn execute(&self, _txn: &mut Transaction, _operation: &str) -> Result<()> {
            self.step("execute")
        }

        fn prepare(&self, txn: &mut Transaction) -> Result<()> {
            self.step("prepare")?;
            txn.transition(TxnStatus::Prepared)?;
            Ok(())
        }

        fn commit(&self, txn: &mut Transaction) -> Result<()> {
            self.step("commit")?;
            txn.transition(TxnStatus::Committed)?;
            *self.final_status.lock() = Some(TxnStatus::Committed);
            Ok(())
        }

        fn abort(&self, txn: &mut Transaction) -> Result<()> {
            self.step("abort")?;
            txn.transition(TxnStatus::Aborted)?;
            *self.final_status.lock() = Some(TxnStatus::Aborted);
            Ok(())
        }
    }

    #[test]
    fn test_all_prepare_all_commit() {
        let a = MockParticipant::new("a", None);
        let b = MockParticipant::new("b", None);

        let coordinator = Coordinator::new();
        let ok =
            coordinator.execute_distributed(&[(&a, "op-a"), (&b, "op-b")]);

        assert!(ok);
        assert_eq!(*a.final_status.lock(), Some(TxnStatus::Committed));
        assert_eq!(*b.final_status.lock(), Some(TxnStatus::Committed));
    }

    #[test]
    fn test_prepare_failure_aborts_all_recorded() {
        let a = MockParticipant::new("a", None);
        let b = MockParticipant::new("b", Some("prepare"));
        let c = MockParticipant::new("c", None);

        let coordinator = Coordinator::new();
        let ok = coordinator.execute_distributed(&[(&a, "op"), (&b, "op"), (&c, "op")]);

        assert!(!ok);
        assert_eq!(*a.final_status.lock(), Some(TxnStatus::Aborted));
        assert_eq!(*b.final_status.lock(), Some(TxnStatus::Aborted));
        // c was never reached: no prepare was issued after the failure.
        assert!(c.calls.lock().is_empty());
        assert!(!a.calls.lock().contains(&"commit"));
    }

    #[test]
    fn test_begin_failure_leaves_nothing_to_abort() {
        let a = MockParticipant::new("a", None);
        let b = MockParticipant::new("b", Some("begin"));

        let coordinator = Coordinator::new();
        let ok = coordinator.execute_distributed(&[(&a, "op"), (&b, "op")]);

        assert!(!ok);
        assert_eq!(*a.final_status.lock(), Some(TxnStatus::Aborted));
        assert!(!b.calls.lock().contains(&"abort"));
    }

    #[test]
    fn test_post_decision_commit_failure_is_reported() {
        let a = MockParticipant::new("a", None);
        let b = MockParticipant::new("b", Some("commit"));

        let coordinator = Coordinator::new();
        let ok = coordinator.execute_distributed(&[(&a, "op"), (&b, "op")]);

        // The decision was commit; a committed, b is stuck. The result is
        // failure but no abort is issued after the commit decision.
        assert!(!ok);
        assert_eq!(*a.final_status.lock(), Some(TxnStatus::Committed));
        assert!(!b.calls.lock().contains(&"abort"));
    }

    #[test]
    fn test_empty_participant_set_commits_trivially() {
        let coordinator = Coordinator::new();
        assert!(coordinator.execute_distributed(&[]));
    }
}

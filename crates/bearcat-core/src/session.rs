//! Session controller
//!
//! Owns the view state of one screen: the latest ledger snapshot, the two
//! input buffers, and the current tip. It is driven by two event sources:
//!
//! - the ledger subscription, whose snapshots replace the ledger wholesale
//! - the append → tip pipeline, a spawned task that reports back over a channel
//!
//! ```text
//!            submit (valid amount)         append ok
//!   Idle ─────────────────────────▶ Appending ─────────▶ GeneratingTip
//!    ▲                                  │                      │
//!    │           append failed          │       tip ready      │
//!    └──────────────────────────────────┴──────────────────────┘
//! ```
//!
//! Snapshots are applied in every phase. The tip total is the sum over the
//! snapshot held when the submit began; the new record is not included.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::ai::TipAdvisor;
use crate::error::{Result, ValidationError};
use crate::models::{parse_amount, total_spent, ExpenseRecord, NewExpense, Snapshot};
use crate::store::{LedgerClient, LedgerStore, Subscription};

/// Observable phase of the append workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Appending,
    GeneratingTip,
}

/// View state for one session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// Latest snapshot, in the store's delivery order
    pub ledger: Vec<ExpenseRecord>,
    pub pending_amount: String,
    pub pending_note: String,
    /// Last generated tip or the fallback; empty until the first append
    pub current_tip: String,
}

/// Inputs to the state machine
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Full collection from the subscription
    Snapshot(Snapshot),
    AppendSucceeded {
        submission: u64,
        record: ExpenseRecord,
    },
    AppendFailed {
        submission: u64,
        error: String,
    },
    TipReady {
        submission: u64,
        tip: String,
    },
}

/// What changed after applying an event (for re-rendering)
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    LedgerReplaced { records: usize },
    AppendCommitted(ExpenseRecord),
    AppendFailed(String),
    TipChanged(String),
    /// Event from a submission that is no longer in flight
    Ignored,
}

/// Result of a submit request
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Pipeline spawned; the tip will be based on `total_spent`
    Started { submission: u64, total_spent: f64 },
    /// Amount empty or unparseable; nothing changed
    Invalid(ValidationError),
    /// A previous submission is still in flight
    Busy,
}

/// Root of the append/subscribe/tip workflow
pub struct SessionController {
    store: LedgerClient,
    advisor: TipAdvisor,
    state: SessionState,
    phase: Phase,
    subscription: Subscription,
    subscription_open: bool,
    in_flight: Option<u64>,
    next_submission: u64,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionController {
    /// Subscribe to the ledger and create an empty session
    ///
    /// Fails only if the initial subscription cannot be established.
    pub async fn start(store: LedgerClient, advisor: TipAdvisor) -> Result<Self> {
        let subscription = store.subscribe().await?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        info!(store = %store.describe(), model = %advisor.model(), "session started");

        Ok(Self {
            store,
            advisor,
            state: SessionState::default(),
            phase: Phase::Idle,
            subscription,
            subscription_open: true,
            in_flight: None,
            next_submission: 1,
            events_tx,
            events_rx,
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Sum of amounts in the current snapshot
    pub fn total_spent(&self) -> f64 {
        total_spent(&self.state.ledger)
    }

    pub fn set_amount(&mut self, amount: impl Into<String>) {
        self.state.pending_amount = amount.into();
    }

    pub fn set_note(&mut self, note: impl Into<String>) {
        self.state.pending_note = note.into();
    }

    /// Submit the pending inputs
    ///
    /// Invalid amounts are a silent no-op for the state; the reason is
    /// returned only so a caller can show it.
    pub fn submit(&mut self) -> SubmitOutcome {
        if self.in_flight.is_some() {
            debug!(phase = ?self.phase, "submit ignored while a submission is in flight");
            return SubmitOutcome::Busy;
        }

        let amount = match parse_amount(&self.state.pending_amount) {
            Ok(amount) => amount,
            Err(e) => {
                debug!(input = %self.state.pending_amount, error = %e, "submit skipped");
                return SubmitOutcome::Invalid(e);
            }
        };

        let submission = self.next_submission;
        self.next_submission += 1;

        // Captured now: later snapshots must not leak into this tip
        let total = self.total_spent();
        let expense = NewExpense::new(amount, self.state.pending_note.clone());

        self.in_flight = Some(submission);
        self.phase = Phase::Appending;
        self.spawn_pipeline(submission, expense, total);

        SubmitOutcome::Started {
            submission,
            total_spent: total,
        }
    }

    /// Run append then tip generation on a background task
    ///
    /// The task is never cancelled. If the session is gone by the time it
    /// reports back, the send fails and the result is dropped.
    fn spawn_pipeline(&self, submission: u64, expense: NewExpense, total: f64) {
        let store = self.store.clone();
        let advisor = self.advisor.clone();
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            let record = match store.append(expense).await {
                Ok(record) => record,
                Err(e) => {
                    warn!(submission, error = %e, "failed to append expense");
                    let _ = events.send(SessionEvent::AppendFailed {
                        submission,
                        error: e.to_string(),
                    });
                    return;
                }
            };

            if events
                .send(SessionEvent::AppendSucceeded { submission, record })
                .is_err()
            {
                debug!(submission, "session closed before append completed");
            }

            let tip = advisor.generate_tip(total).await;
            if events
                .send(SessionEvent::TipReady { submission, tip })
                .is_err()
            {
                debug!(submission, "session closed before tip arrived");
            }
        });
    }

    /// Apply one event to the state machine
    pub fn apply(&mut self, event: SessionEvent) -> SessionUpdate {
        match event {
            SessionEvent::Snapshot(records) => {
                let count = records.len();
                self.state.ledger = records;
                SessionUpdate::LedgerReplaced { records: count }
            }
            SessionEvent::AppendSucceeded { submission, record } => {
                if !self.is_current(submission) {
                    return SessionUpdate::Ignored;
                }
                self.state.pending_amount.clear();
                self.state.pending_note.clear();
                self.phase = Phase::GeneratingTip;
                info!(id = %record.id, amount = record.amount, "expense added");
                SessionUpdate::AppendCommitted(record)
            }
            SessionEvent::AppendFailed { submission, error } => {
                if !self.is_current(submission) {
                    return SessionUpdate::Ignored;
                }
                // Inputs are kept so the user can retry
                self.in_flight = None;
                self.phase = Phase::Idle;
                SessionUpdate::AppendFailed(error)
            }
            SessionEvent::TipReady { submission, tip } => {
                if !self.is_current(submission) {
                    return SessionUpdate::Ignored;
                }
                self.state.current_tip = tip.clone();
                self.in_flight = None;
                self.phase = Phase::Idle;
                SessionUpdate::TipChanged(tip)
            }
        }
    }

    fn is_current(&self, submission: u64) -> bool {
        if self.in_flight == Some(submission) {
            true
        } else {
            warn!(submission, in_flight = ?self.in_flight, "dropping stale pipeline event");
            false
        }
    }

    /// Wait for the next snapshot or pipeline event and apply it
    ///
    /// Returns `None` only when the subscription has ended and no
    /// submission is in flight.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        loop {
            if !self.subscription_open && self.in_flight.is_none() {
                return None;
            }

            // Snapshots first: a store that publishes before acking an append
            // is rendered with the new record before its tip
            let event = tokio::select! {
                biased;
                snapshot = self.subscription.next(), if self.subscription_open => match snapshot {
                    Some(records) => SessionEvent::Snapshot(records),
                    None => {
                        debug!("ledger subscription ended");
                        self.subscription_open = false;
                        continue;
                    }
                },
                Some(event) = self.events_rx.recv() => event,
            };

            return Some(self.apply(event));
        }
    }

    /// Stop the subscription and end the session
    pub fn shutdown(self) {
        // Drop does the work
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
        if let Some(submission) = self.in_flight {
            debug!(submission, "session closed with a submission in flight");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::ai::{tip_prompt, AIClient, MockBackend, OpenAICompatibleBackend, FALLBACK_TIP};
    use crate::store::{FirestoreStore, MemoryStore};
    use crate::test_utils::{CompletionBehavior, MockCompletionServer};

    fn record(id: &str, amount: f64, note: &str) -> ExpenseRecord {
        NewExpense::new(amount, note).into_record(id)
    }

    async fn start_with(store: &MemoryStore, mock: &MockBackend) -> SessionController {
        let mut session = SessionController::start(
            LedgerClient::Memory(store.clone()),
            TipAdvisor::new(AIClient::Mock(mock.clone())),
        )
        .await
        .unwrap();
        // Initial snapshot
        next(&mut session).await;
        session
    }

    async fn next(session: &mut SessionController) -> SessionUpdate {
        tokio::time::timeout(Duration::from_secs(5), session.next_update())
            .await
            .expect("session update")
            .expect("session still open")
    }

    /// Pump events until the in-flight tip is applied
    async fn until_tip(session: &mut SessionController) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        loop {
            let update = next(session).await;
            let done = matches!(update, SessionUpdate::TipChanged(_));
            updates.push(update);
            if done {
                return updates;
            }
        }
    }

    #[tokio::test]
    async fn test_initial_state() {
        let store = MemoryStore::new();
        let session = start_with(&store, &MockBackend::new()).await;

        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.state(), &SessionState::default());
    }

    #[tokio::test]
    async fn test_snapshot_replaces_ledger() {
        let store = MemoryStore::new();
        let mut session = start_with(&store, &MockBackend::new()).await;

        let first = vec![record("a", 1.0, ""), record("b", 2.0, "")];
        let second = vec![record("c", 3.0, "")];

        session.apply(SessionEvent::Snapshot(first.clone()));
        assert_eq!(session.state().ledger, first);

        let update = session.apply(SessionEvent::Snapshot(second.clone()));
        assert_eq!(update, SessionUpdate::LedgerReplaced { records: 1 });
        assert_eq!(session.state().ledger, second);

        session.apply(SessionEvent::Snapshot(vec![]));
        assert!(session.state().ledger.is_empty());
    }

    #[tokio::test]
    async fn test_guard_rejects_bad_amounts() {
        let store = MemoryStore::with_records(vec![record("r1", 20.0, "books")]);
        let mock = MockBackend::new();
        let mut session = start_with(&store, &mock).await;
        let ledger_before = session.state().ledger.clone();

        for input in ["", "   ", "abc", "12abc", "NaN", "-4"] {
            session.set_amount(input);
            session.set_note("keep me");

            assert!(matches!(session.submit(), SubmitOutcome::Invalid(_)), "{}", input);
            assert_eq!(session.phase(), Phase::Idle);
            assert_eq!(session.state().pending_amount, input);
            assert_eq!(session.state().pending_note, "keep me");
            assert_eq!(session.state().ledger, ledger_before);
        }

        // Nothing was written and no tip was requested
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.records().len(), 1);
        assert!(mock.prompts().is_empty());
        assert_eq!(session.state().current_tip, "");
    }

    #[tokio::test]
    async fn test_first_expense_uses_zero_total() {
        let store = MemoryStore::new();
        let mock = MockBackend::with_reply("Brew your own coffee.");
        let mut session = start_with(&store, &mock).await;

        session.set_amount("12.50");
        session.set_note("coffee");
        let outcome = session.submit();
        assert_eq!(
            outcome,
            SubmitOutcome::Started {
                submission: 1,
                total_spent: 0.0
            }
        );
        assert_eq!(session.phase(), Phase::Appending);

        let updates = until_tip(&mut session).await;
        assert!(updates.iter().any(|u| matches!(
            u,
            SessionUpdate::AppendCommitted(r) if r.amount == 12.5 && r.note == "coffee"
        )));

        let stored = store.records();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].amount, 12.5);
        assert_eq!(stored[0].note, "coffee");

        assert_eq!(mock.prompts(), vec![tip_prompt(0.0)]);
        assert!(mock.prompts()[0].contains("spent $0.00 this month"));
        assert_eq!(session.state().pending_amount, "");
        assert_eq!(session.state().pending_note, "");
        assert_eq!(session.state().current_tip, "Brew your own coffee.");
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_tip_total_excludes_new_record() {
        let store = MemoryStore::with_records(vec![
            record("r1", 20.0, "books"),
            record("r2", 5.25, "lunch"),
        ]);
        let mock = MockBackend::new();
        let mut session = start_with(&store, &mock).await;

        session.set_amount("100");
        assert!(matches!(
            session.submit(),
            SubmitOutcome::Started { total_spent, .. } if total_spent == 25.25
        ));
        until_tip(&mut session).await;

        assert_eq!(mock.prompts(), vec![tip_prompt(25.25)]);
        assert!(mock.prompts()[0].contains("$25.25"));
    }

    #[tokio::test]
    async fn test_total_captured_when_submit_begins() {
        let store = MemoryStore::with_records(vec![record("r1", 10.0, "")]);
        let mock = MockBackend::new();
        let mut session = start_with(&store, &mock).await;

        session.set_amount("1");
        session.submit();
        // A snapshot arriving mid-flight must not change the tip total
        session.apply(SessionEvent::Snapshot(vec![
            record("r1", 10.0, ""),
            record("x", 500.0, "other device"),
        ]));
        until_tip(&mut session).await;

        assert_eq!(mock.prompts(), vec![tip_prompt(10.0)]);
    }

    #[tokio::test]
    async fn test_append_failure_keeps_inputs() {
        let store = MemoryStore::new();
        store.set_fail_appends(true);
        let mock = MockBackend::new();
        let mut session = start_with(&store, &mock).await;

        session.set_amount("9.99");
        session.set_note("pizza");
        assert!(matches!(session.submit(), SubmitOutcome::Started { .. }));

        let update = next(&mut session).await;
        assert!(matches!(update, SessionUpdate::AppendFailed(_)));
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.state().pending_amount, "9.99");
        assert_eq!(session.state().pending_note, "pizza");
        assert_eq!(session.state().current_tip, "");
        assert!(mock.prompts().is_empty());

        // Manual retry succeeds once the store recovers
        store.set_fail_appends(false);
        assert!(matches!(session.submit(), SubmitOutcome::Started { .. }));
        until_tip(&mut session).await;
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_while_in_flight_is_busy() {
        let store = MemoryStore::new();
        let mut session = start_with(&store, &MockBackend::new()).await;

        session.set_amount("1");
        assert!(matches!(session.submit(), SubmitOutcome::Started { .. }));
        session.set_amount("2");
        assert_eq!(session.submit(), SubmitOutcome::Busy);

        until_tip(&mut session).await;
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn test_tip_replaced_not_accumulated() {
        let store = MemoryStore::new();
        let mut session = start_with(&store, &MockBackend::with_reply("Same tip")).await;

        for amount in ["1", "2"] {
            session.set_amount(amount);
            session.submit();
            until_tip(&mut session).await;
        }
        assert_eq!(session.state().current_tip, "Same tip");
    }

    #[tokio::test]
    async fn test_failing_advisor_sets_fallback() {
        let store = MemoryStore::new();
        let mut session = start_with(&store, &MockBackend::failing()).await;

        session.set_amount("3");
        session.submit();
        until_tip(&mut session).await;

        assert_eq!(session.state().current_tip, FALLBACK_TIP);
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_completion_timeout_still_updates_ledger() {
        let server = MockCompletionServer::start(CompletionBehavior::Delay(
            Duration::from_secs(5),
            "too late".to_string(),
        ))
        .await;
        let backend = OpenAICompatibleBackend::new(&server.url(), "gpt-3.5-turbo")
            .with_timeout(Duration::from_millis(200));

        let store = MemoryStore::new();
        let mut session = SessionController::start(
            LedgerClient::Memory(store.clone()),
            TipAdvisor::new(AIClient::OpenAICompatible(backend)),
        )
        .await
        .unwrap();
        next(&mut session).await;

        session.set_amount("4.50");
        session.submit();
        let updates = until_tip(&mut session).await;

        assert_eq!(session.state().current_tip, FALLBACK_TIP);
        // The snapshot carrying the new record arrives independently of the tip
        let saw_snapshot = updates
            .iter()
            .any(|u| matches!(u, SessionUpdate::LedgerReplaced { records: 1 }));
        if !saw_snapshot {
            assert!(matches!(
                next(&mut session).await,
                SessionUpdate::LedgerReplaced { records: 1 }
            ));
        }
        assert_eq!(session.state().ledger.len(), 1);
        assert_eq!(session.state().ledger[0].amount, 4.5);
    }

    #[tokio::test]
    async fn test_snapshots_from_other_clients() {
        let store = MemoryStore::new();
        let mut session = start_with(&store, &MockBackend::new()).await;

        let other = store.clone();
        let added = other.append(NewExpense::new(7.0, "shared")).await.unwrap();
        assert_eq!(
            next(&mut session).await,
            SessionUpdate::LedgerReplaced { records: 1 }
        );

        other.remove(&added.id);
        assert_eq!(
            next(&mut session).await,
            SessionUpdate::LedgerReplaced { records: 0 }
        );
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_stale_events_are_ignored() {
        let store = MemoryStore::new();
        let mut session = start_with(&store, &MockBackend::new()).await;

        let update = session.apply(SessionEvent::TipReady {
            submission: 42,
            tip: "ghost".to_string(),
        });
        assert_eq!(update, SessionUpdate::Ignored);
        assert_eq!(session.state().current_tip, "");
    }

    #[tokio::test]
    async fn test_shutdown_unsubscribes() {
        let store = MemoryStore::new();
        let session = start_with(&store, &MockBackend::new()).await;
        assert_eq!(store.subscriber_count(), 1);

        session.shutdown();
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_late_pipeline_after_shutdown_is_discarded() {
        let server = MockCompletionServer::start(CompletionBehavior::Delay(
            Duration::from_millis(200),
            "late tip".to_string(),
        ))
        .await;
        let backend = OpenAICompatibleBackend::new(&server.url(), "gpt-3.5-turbo");

        let store = MemoryStore::new();
        let mut session = SessionController::start(
            LedgerClient::Memory(store.clone()),
            TipAdvisor::new(AIClient::OpenAICompatible(backend)),
        )
        .await
        .unwrap();
        next(&mut session).await;

        session.set_amount("8");
        session.submit();
        session.shutdown();

        // The pipeline still runs to completion
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(store.records().len(), 1);
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_start_fails_when_subscription_fails() {
        let store = FirestoreStore::new("http://127.0.0.1:1", "demo");
        let result = SessionController::start(
            LedgerClient::Firestore(store),
            TipAdvisor::new(AIClient::mock()),
        )
        .await;
        assert!(result.is_err());
    }
}

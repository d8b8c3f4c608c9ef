use super::*;
use crate::buffer::BatchOp;
use crate::models::{AgentKind, ChangeKind, ChangePayload, Metadata, SuggestionStatus};
use chrono::Duration;
use std::sync::{Arc, Mutex};

fn user(id: &str) -> UserId {
    UserId::from(id)
}

fn applied(outcome: MutationOutcome) -> ChangeRecord {
    match outcome {
        MutationOutcome::Applied { record } => record,
        MutationOutcome::Buffered { position } => {
            panic!("expected an applied edit, got buffered at {position}")
        }
    }
}

#[test]
fn sequential_inserts_advance_version_and_log() {
    let mut doc = Document::new("");
    let alice = user("alice");

    let first = applied(doc.insert(&alice, 0, "Hello", None).expect("insert hello"));
    let second = applied(doc.insert(&alice, 5, " World", None).expect("insert world"));

    assert_eq!((first.version, second.version), (1, 2));
    assert_eq!(doc.text(), "Hello World");

    let changes = doc.changes_since(0);
    assert_eq!(
        changes.iter().map(|record| record.version).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert_eq!(
        changes
            .iter()
            .map(|record| record.text.clone().unwrap_or_default())
            .collect::<Vec<_>>(),
        vec!["Hello".to_string(), " World".to_string()]
    );
    assert_eq!(doc.changes_since(1).len(), 1);
    assert!(doc.changes_since(2).is_empty());
}

#[test]
fn each_primitive_adds_exactly_one_version() {
    let mut doc = Document::new("abcdef");
    let bob = user("bob");
    doc.insert(&bob, 6, "gh", None).expect("insert");
    doc.delete(&bob, 0, 1).expect("delete");
    let replace = applied(doc.replace(&bob, 0, 2, "BC", None).expect("replace"));
    let batch = applied(
        doc.apply_batch(
            &bob,
            vec![
                BatchOp::Retain { count: 2 },
                BatchOp::Delete { count: 1 },
                BatchOp::Insert {
                    text: "D".to_string(),
                    attrs: None,
                },
            ],
        )
        .expect("batch"),
    );

    assert_eq!(doc.version(), 4);
    assert_eq!(doc.text(), "BCDefgh");
    assert_eq!(replace.kind, ChangeKind::Replace);
    assert_eq!(replace.removed_text.as_deref(), Some("bc"));
    assert_eq!(batch.kind, ChangeKind::Batch);
    assert!(matches!(batch.payload, Some(ChangePayload::Delta(_))));
}

#[test]
fn invalid_edits_change_nothing() {
    let mut doc = Document::new("abc");
    let carol = user("carol");
    assert!(matches!(
        doc.insert(&carol, 4, "x", None),
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        doc.delete(&carol, 2, 5),
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        doc.insert(&user(" "), 0, "x", None),
        Err(EngineError::Validation(_))
    ));
    assert_eq!(doc.version(), 0);
    assert_eq!(doc.text(), "abc");
}

#[test]
fn transaction_commit_produces_single_record() {
    let mut doc = Document::new("01234");
    let owner = user("owner");
    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);
    doc.subscribe(move |record| sink.lock().expect("lock").push(record.version));

    doc.begin_transaction(&owner).expect("begin");
    let a = doc.insert(&owner, 5, "A", None).expect("buffer A");
    let b = doc.insert(&owner, 6, "B", None).expect("buffer B");
    assert!(a.is_buffered() && b.is_buffered());
    assert_eq!(doc.version(), 0);
    assert_eq!(doc.text(), "01234");
    assert!(observed.lock().expect("lock").is_empty());

    let summary = doc.commit_transaction(&owner).expect("commit");
    assert_eq!(summary.op_count, 2);
    assert_eq!(summary.state, TransactionState::Committed);
    let record = summary.record.expect("one record");
    assert_eq!(record.version, 1);
    assert_eq!(record.kind, ChangeKind::Batch);
    assert!(matches!(record.payload, Some(ChangePayload::Transaction(ref ops)) if ops.len() == 2));

    assert_eq!(doc.version(), 1);
    assert_eq!(doc.text(), "01234AB");
    assert_eq!(doc.changes_since(0).len(), 1);
    assert_eq!(*observed.lock().expect("lock"), vec![1]);
    assert!(doc.transaction().is_none());
}

#[test]
fn transaction_rollback_leaves_document_untouched() {
    let mut doc = Document::new("stable");
    let owner = user("owner");
    doc.insert(&owner, 0, ">", None).expect("seed");

    doc.begin_transaction(&owner).expect("begin");
    doc.delete(&owner, 0, 3).expect("buffer delete");
    doc.insert(&owner, 0, "gone", None).expect("buffer insert");
    let summary = doc.rollback_transaction(&owner).expect("rollback");

    assert_eq!(summary.state, TransactionState::RolledBack);
    assert!(summary.record.is_none());
    assert_eq!(doc.version(), 1);
    assert_eq!(doc.text(), ">stable");
}

#[test]
fn transaction_state_errors() {
    let mut doc = Document::new("text");
    let owner = user("owner");
    let other = user("other");

    assert!(matches!(
        doc.commit_transaction(&owner),
        Err(EngineError::InvalidState(_))
    ));
    doc.begin_transaction(&owner).expect("begin");
    assert!(matches!(
        doc.begin_transaction(&other),
        Err(EngineError::InvalidState(_))
    ));
    assert!(matches!(
        doc.commit_transaction(&other),
        Err(EngineError::PermissionDenied(_))
    ));
    assert!(matches!(
        doc.insert(&other, 0, "x", None),
        Err(EngineError::LockConflict(_))
    ));

    let empty = doc.commit_transaction(&owner).expect("empty commit");
    assert!(empty.record.is_none());
    assert_eq!(doc.version(), 0);
}

#[test]
fn buffered_edits_validate_against_projected_length() {
    let mut doc = Document::new("ab");
    let owner = user("owner");
    doc.begin_transaction(&owner).expect("begin");
    doc.insert(&owner, 2, "cd", None).expect("buffer append");
    doc.delete(&owner, 3, 1).expect("delete inside projected text");
    assert!(matches!(
        doc.delete(&owner, 3, 5),
        Err(EngineError::Validation(_))
    ));
    doc.commit_transaction(&owner).expect("commit");
    assert_eq!(doc.text(), "abc");
}

#[test]
fn commit_rechecks_locks_and_stays_open_on_conflict() {
    let mut doc = Document::new("0123456789");
    let owner = user("owner");
    let holder = user("holder");

    doc.begin_transaction(&owner).expect("begin");
    doc.insert(&owner, 2, "x", None).expect("buffer");
    let lock = doc
        .lock_range(&holder, 0, 5, None)
        .expect("locks are independent of transactions");

    assert!(matches!(
        doc.commit_transaction(&owner),
        Err(EngineError::LockConflict(_))
    ));
    assert!(doc.transaction().is_some());
    assert_eq!(doc.text(), "0123456789");

    doc.unlock_range(&lock.lock_id, &holder).expect("unlock");
    doc.commit_transaction(&owner).expect("commit");
    assert_eq!(doc.text(), "01x23456789");
}

#[test]
fn lock_scenario_blocks_only_foreign_users() {
    let mut doc = Document::new("The quick brown fox jumps over");
    let user1 = user("user1");
    let user2 = user("user2");
    let lock = doc.lock_range(&user1, 10, 10, None).expect("lock");

    assert!(matches!(
        doc.insert(&user2, 15, "!", None),
        Err(EngineError::LockConflict(_))
    ));
    assert_eq!(doc.version(), 0);

    doc.insert(&user1, 15, "1", None).expect("owner edit");
    doc.unlock_range(&lock.lock_id, &user1).expect("unlock");
    doc.insert(&user2, 15, "2", None).expect("after unlock");
    assert_eq!(doc.version(), 2);
}

#[test]
fn wider_lock_rejects_overlapping_mutations() {
    let mut doc = Document::new(&"x".repeat(40));
    let a = user("a");
    let b = user("b");
    doc.lock_range(&a, 10, 20, None).expect("lock [10,30)");

    for attempt in [
        doc.delete(&b, 5, 10),
        doc.replace(&b, 29, 3, "yy", None),
        doc.insert(&b, 10, "y", None),
    ] {
        assert!(matches!(attempt, Err(EngineError::LockConflict(_))));
    }
    assert_eq!(doc.text(), "x".repeat(40));

    doc.insert(&b, 30, "tail", None)
        .expect("right after the lock is free");
    doc.delete(&a, 5, 10).expect("owner may edit");
    assert!(matches!(
        doc.unlock_range("lock-missing", &a),
        Err(EngineError::NotFound(_))
    ));
}

#[test]
fn expired_locks_stop_blocking() {
    let mut doc = Document::new("abcdef");
    let lock = doc
        .lock_range(&user("a"), 0, 6, Some(Duration::milliseconds(1)))
        .expect("lock");
    let later = lock.expires_at + Duration::milliseconds(1);
    assert!(doc.expire_lock(&lock.lock_id, later));
    assert!(!doc.expire_lock(&lock.lock_id, later));
    doc.insert(&user("b"), 0, "z", None).expect("free again");
}

#[test]
fn log_is_capped_and_history_is_ascending() {
    let mut doc = Document::new("");
    let writer = user("writer");
    for _ in 0..1_050 {
        doc.insert(&writer, 0, "x", None).expect("insert");
    }
    assert_eq!(doc.version(), 1_050);
    assert_eq!(doc.changes_since(0).len(), 1_000);
    assert_eq!(doc.changes_since(0)[0].version, 51);

    let recent = doc.history(3);
    assert_eq!(
        recent.iter().map(|record| record.version).collect::<Vec<_>>(),
        vec![1_048, 1_049, 1_050]
    );
}

#[test]
fn external_changes_are_versioned_without_touching_buffer() {
    let mut doc = Document::new("typed");
    let record = doc.record_external_change(None, ChangeKind::Insert, 0, 5, Some("typed".into()));
    assert!(record.external);
    assert_eq!(record.user_id, user("external"));
    assert_eq!(record.version, 1);
    assert_eq!(doc.text(), "typed");
}

#[test]
fn panicking_observer_does_not_stop_delivery() {
    let mut doc = Document::new("");
    let hits = Arc::new(Mutex::new(0));
    doc.observe(|_| panic!("observer failure"));
    let counter = Arc::clone(&hits);
    doc.observe(move |_| *counter.lock().expect("lock") += 1);

    doc.insert(&user("a"), 0, "x", None).expect("insert");
    assert_eq!(*hits.lock().expect("lock"), 1);
    assert_eq!(doc.version(), 1);
}

#[test]
fn unobserve_stops_event_delivery() {
    let mut doc = Document::new("");
    let hits = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&hits);
    let id = doc.observe(move |_| *counter.lock().expect("lock") += 1);

    doc.insert(&user("a"), 0, "x", None).expect("first insert");
    assert!(doc.unobserve(id));
    assert!(!doc.unobserve(id));
    doc.insert(&user("a"), 1, "y", None).expect("second insert");
    assert_eq!(*hits.lock().expect("lock"), 1);
}

#[test]
fn suggestions_cannot_be_accepted_inside_own_transaction() {
    let mut doc = Document::new("hello world");
    let editor = user("editor");
    let pending = doc
        .suggest(&user("agent"), 0, 5, "HELLO", Metadata::default())
        .expect("suggest");

    doc.begin_transaction(&editor).expect("begin");
    let err = doc
        .accept_suggestion(&pending.suggestion_id, &editor)
        .expect_err("accept inside transaction");
    assert!(matches!(err, EngineError::InvalidState(_)));
    assert_eq!(doc.transaction().map(|txn| txn.buffered_ops.len()), Some(0));

    let err = doc
        .accept_suggestion(&pending.suggestion_id, &user("other"))
        .expect_err("document reserved by the transaction");
    assert!(matches!(err, EngineError::LockConflict(_)));

    doc.rollback_transaction(&editor).expect("rollback");
    assert_eq!(doc.text(), "hello world");
    assert_eq!(
        doc.suggestion(&pending.suggestion_id).map(|s| s.status),
        Some(SuggestionStatus::Pending)
    );

    doc.accept_suggestion(&pending.suggestion_id, &editor)
        .expect("accept after rollback");
    assert_eq!(doc.text(), "HELLO world");
}

#[test]
fn corrections_are_refused_inside_own_transaction() {
    let mut doc = Document::new("teh cat sat");
    let writer = user("writer");

    doc.begin_transaction(&writer).expect("begin");
    let err = doc
        .apply_correction(&writer, 0, 3, "teh", "thereafter", Vec::new(), Metadata::default())
        .expect_err("apply inside transaction");
    assert!(matches!(err, EngineError::InvalidState(_)));
    doc.rollback_transaction(&writer).expect("rollback");
    assert!(doc.corrections().is_empty());
    assert!(doc.correction_at(0).is_none());

    let applied = doc
        .apply_correction(
            &writer,
            0,
            3,
            "teh",
            "the",
            vec!["then".to_string()],
            Metadata::default(),
        )
        .expect("apply outside transaction");
    let id = applied.correction.correction_id;

    doc.begin_transaction(&writer).expect("begin again");
    assert!(matches!(
        doc.revert_correction(&id, &writer),
        Err(EngineError::InvalidState(_))
    ));
    assert!(matches!(
        doc.switch_to_alternate(&id, 0, &writer),
        Err(EngineError::InvalidState(_))
    ));
    doc.rollback_transaction(&writer).expect("rollback again");

    let live = doc.correction(&id).expect("still tracked");
    assert!(!live.reverted);
    assert_eq!(live.applied_text, "the");
    doc.revert_correction(&id, &writer).expect("revert");
    assert_eq!(doc.text(), "teh cat sat");
}

#[test]
fn huge_positions_are_validation_errors() {
    let mut doc = Document::new("abc");
    let a = user("a");
    assert!(matches!(
        doc.set_selection(&a, usize::MAX, 1),
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        doc.apply_correction(&a, usize::MAX, 1, "x", "y", Vec::new(), Metadata::default()),
        Err(EngineError::Validation(_))
    ));
    assert_eq!(doc.version(), 0);
}

#[test]
fn snapshot_collects_collaboration_state() {
    let mut doc = Document::new("shared text");
    let agent = user("agent");
    doc.announce_presence(&agent, "Agent", AgentKind::Llm)
        .expect("presence");
    doc.set_selection(&agent, 0, 6).expect("selection");
    doc.lock_range(&agent, 0, 6, None).expect("lock");
    doc.suggest(&agent, 7, 4, "words", Metadata::new())
        .expect("suggest");
    let decided = doc
        .suggest(&agent, 0, 6, "common", Metadata::new())
        .expect("suggest");
    doc.reject_suggestion(&decided.suggestion_id, &agent, None)
        .expect("reject");
    doc.annotate(&agent, 0, 6, "adjective", "note")
        .expect("annotate");

    let snapshot = doc.snapshot();
    assert_eq!(snapshot.text, "shared text");
    assert_eq!(snapshot.length, 11);
    assert_eq!(snapshot.locks.len(), 1);
    assert_eq!(snapshot.cursors.len(), 1);
    assert_eq!(snapshot.presence.len(), 1);
    assert_eq!(snapshot.pending_suggestions.len(), 1);
    assert_eq!(snapshot.pending_suggestions[0].status, SuggestionStatus::Pending);
    assert_eq!(snapshot.annotations.len(), 1);
    assert!(snapshot.transaction.is_none());
}

//! End-to-end tests driving a document through the control bus.

mod support;

use coedit_bus::{BusError, Command, EventKind, StreamFilter};
use coedit_core::{DocumentSnapshot, ErrorKind, UserId};
use serde_json::{json, Value};
use support::{recv_event, setup_bus};

fn remote_kind(err: BusError) -> ErrorKind {
    match err {
        BusError::Remote { kind, .. } => kind,
        other => panic!("expected remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn sequential_inserts_round_trip() {
    let client = setup_bus("");
    client
        .run("insert", json!({ "userId": "a", "index": 0, "text": "Hello" }))
        .await
        .expect("insert hello");
    client
        .run("insert", json!({ "userId": "a", "index": 5, "text": " World" }))
        .await
        .expect("insert world");

    let changes = client
        .run("changes-since", json!({ "version": 0 }))
        .await
        .expect("changes");
    let changes = changes.as_array().expect("array");
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0]["version"], 1);
    assert_eq!(changes[1]["version"], 2);
    assert_eq!(changes[0]["text"], "Hello");
    assert_eq!(changes[1]["text"], " World");

    let text = client.run("get-text", Value::Null).await.expect("text");
    assert_eq!(text, json!({ "text": "Hello World", "version": 2 }));
}

#[tokio::test]
async fn lock_conflict_is_reported_with_kind() {
    let client = setup_bus(&"x".repeat(30));
    let lock = client
        .run("lock-range", json!({ "userId": "user1", "index": 10, "length": 10 }))
        .await
        .expect("lock");
    let lock_id = lock["lockId"].as_str().expect("lock id").to_string();

    let err = client
        .run("insert", json!({ "userId": "user2", "index": 15, "text": "!" }))
        .await
        .expect_err("foreign insert");
    assert_eq!(remote_kind(err), ErrorKind::LockConflict);

    client
        .run("insert", json!({ "userId": "user1", "index": 15, "text": "1" }))
        .await
        .expect("owner insert");

    let err = client
        .run("unlock-range", json!({ "userId": "user2", "lockId": lock_id }))
        .await
        .expect_err("non-owner unlock");
    assert_eq!(remote_kind(err), ErrorKind::PermissionDenied);

    client
        .run("unlock-range", json!({ "userId": "user1", "lockId": lock_id }))
        .await
        .expect("unlock");
    client
        .run("insert", json!({ "userId": "user2", "index": 15, "text": "2" }))
        .await
        .expect("insert after unlock");
    let version = client.run("get-version", Value::Null).await.expect("version");
    assert_eq!(version["version"], 2);
}

#[tokio::test]
async fn malformed_requests_do_not_kill_the_channel() {
    let client = setup_bus("abc");
    let err = client
        .run("teleport", Value::Null)
        .await
        .expect_err("unknown command");
    assert_eq!(remote_kind(err), ErrorKind::Validation);

    let err = client
        .run("insert", json!({ "index": "zero" }))
        .await
        .expect_err("bad params");
    assert_eq!(remote_kind(err), ErrorKind::Validation);

    let text = client.run("get-text", Value::Null).await.expect("still alive");
    assert_eq!(text["text"], "abc");
}

#[tokio::test]
async fn transaction_commit_over_the_bus() {
    let client = setup_bus("01234");
    let owner = UserId::from("owner");
    client
        .execute(&Command::BeginTransaction {
            user_id: owner.clone(),
        })
        .await
        .expect("begin");
    let buffered = client
        .run("insert", json!({ "userId": "owner", "index": 5, "text": "A" }))
        .await
        .expect("buffer");
    assert_eq!(buffered["status"], "buffered");
    client
        .run("insert", json!({ "userId": "owner", "index": 6, "text": "B" }))
        .await
        .expect("buffer");

    let summary = client
        .execute(&Command::CommitTransaction { user_id: owner })
        .await
        .expect("commit");
    assert_eq!(summary["opCount"], 2);
    assert_eq!(summary["record"]["version"], 1);

    let text = client.run("get-text", Value::Null).await.expect("text");
    assert_eq!(text["text"], "01234AB");
}

#[tokio::test]
async fn streams_get_initial_state_then_filtered_events() {
    let client = setup_bus("draft");
    let mut all = client
        .register_stream("all", StreamFilter::default())
        .await
        .expect("register all");
    let mut others = client
        .register_stream(
            "others",
            StreamFilter {
                event_kinds: vec![EventKind::Change, EventKind::Suggestion],
                users: None,
                exclude_users: vec![UserId::from("driver")],
            },
        )
        .await
        .expect("register filtered");

    let initial = recv_event(&mut all).await;
    assert_eq!(initial.event_kind, EventKind::InitialState);
    assert_eq!(initial.payload["text"], "draft");
    assert_eq!(recv_event(&mut others).await.event_kind, EventKind::InitialState);

    client
        .run("insert", json!({ "userId": "driver", "index": 5, "text": "!" }))
        .await
        .expect("driver edit");
    client
        .run("set-cursor", json!({ "userId": "human", "index": 0 }))
        .await
        .expect("cursor");
    client
        .run(
            "suggest",
            json!({ "userId": "human", "index": 0, "length": 5, "newText": "final" }),
        )
        .await
        .expect("suggest");

    let kinds = [
        recv_event(&mut all).await.event_kind,
        recv_event(&mut all).await.event_kind,
        recv_event(&mut all).await.event_kind,
    ];
    assert_eq!(kinds, [EventKind::Change, EventKind::Cursor, EventKind::Suggestion]);

    let filtered = recv_event(&mut others).await;
    assert_eq!(filtered.event_kind, EventKind::Suggestion);
    assert_eq!(filtered.payload["newText"], "final");

    client.unregister_stream("all").await.expect("unregister");
    assert!(all.recv().await.is_none());
}

#[tokio::test]
async fn suggestion_and_correction_workflows() {
    let client = setup_bus("I recieve teh mail");
    let suggestion = client
        .run(
            "suggest",
            json!({ "userId": "agent", "index": 14, "length": 4, "newText": "post" }),
        )
        .await
        .expect("suggest");
    let suggestion_id = suggestion["suggestionId"].as_str().expect("id").to_string();

    let accepted = client
        .run(
            "accept-suggestion",
            json!({ "userId": "editor", "suggestionId": suggestion_id }),
        )
        .await
        .expect("accept");
    assert_eq!(accepted["suggestion"]["status"], "accepted");
    let err = client
        .run(
            "reject-suggestion",
            json!({ "userId": "editor", "suggestionId": suggestion_id }),
        )
        .await
        .expect_err("terminal");
    assert_eq!(remote_kind(err), ErrorKind::InvalidState);

    let correction = client
        .run(
            "apply-correction",
            json!({
                "userId": "agent",
                "index": 2,
                "length": 7,
                "original": "recieve",
                "correction": "receive",
                "alternates": ["retrieve"]
            }),
        )
        .await
        .expect("correction");
    let correction_id = correction["correction"]["correctionId"]
        .as_str()
        .expect("id")
        .to_string();
    client
        .run(
            "switch-correction",
            json!({ "userId": "agent", "correctionId": correction_id, "alternateIndex": 0 }),
        )
        .await
        .expect("switch");
    let found = client
        .run("correction-at", json!({ "index": 4 }))
        .await
        .expect("lookup");
    assert_eq!(found["appliedText"], "retrieve");

    client
        .run(
            "revert-correction",
            json!({ "userId": "agent", "correctionId": correction_id }),
        )
        .await
        .expect("revert");
    let text = client.run("get-text", Value::Null).await.expect("text");
    assert_eq!(text["text"], "I recieve teh post");
}

#[tokio::test]
async fn presence_and_annotations() {
    let client = setup_bus("shared");
    client
        .run(
            "announce-presence",
            json!({ "userId": "bot", "displayName": "Bot", "agentKind": "llm" }),
        )
        .await
        .expect("announce");
    let active = client.run("active-users", Value::Null).await.expect("active");
    assert_eq!(active[0]["agentKind"], "llm");

    client
        .run("set-selection", json!({ "userId": "bot", "index": 1, "length": 3 }))
        .await
        .expect("selection");
    let cursors = client.run("get-cursors", Value::Null).await.expect("cursors");
    assert_eq!(cursors[0]["index"], 1);
    assert_eq!(cursors[0]["length"], 3);

    let note = client
        .run(
            "annotate",
            json!({ "userId": "bot", "index": 0, "length": 6, "text": "rename", "kind": "todo" }),
        )
        .await
        .expect("annotate");
    let listed = client
        .run("list-annotations", json!({ "kind": "todo" }))
        .await
        .expect("list");
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    client
        .run(
            "delete-annotation",
            json!({ "annotationId": note["annotationId"] }),
        )
        .await
        .expect("delete");
    let err = client
        .run(
            "delete-annotation",
            json!({ "annotationId": note["annotationId"] }),
        )
        .await
        .expect_err("gone");
    assert_eq!(remote_kind(err), ErrorKind::NotFound);
}

#[tokio::test]
async fn locks_expire_while_the_host_idles() {
    let client = setup_bus("abcdef");
    client
        .run(
            "lock-range",
            json!({ "userId": "a", "index": 0, "length": 6, "durationMs": 50 }),
        )
        .await
        .expect("lock");
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;

    let locks = client.run("list-locks", Value::Null).await.expect("locks");
    assert_eq!(locks, json!([]));
    client
        .run("insert", json!({ "userId": "b", "index": 0, "text": "z" }))
        .await
        .expect("lock no longer blocks");
}

#[tokio::test]
async fn typed_calls_decode_the_result() {
    let client = setup_bus("draft");
    client
        .execute(&Command::Insert {
            user_id: UserId::from("a"),
            index: 5,
            text: "!".to_string(),
            attrs: None,
        })
        .await
        .expect("insert");

    let snapshot: DocumentSnapshot = client
        .call(&Command::Snapshot {})
        .await
        .expect("snapshot decodes");
    assert_eq!(snapshot.version, 1);
    assert_eq!(snapshot.text, "draft!");
    assert!(snapshot.transaction.is_none());
}

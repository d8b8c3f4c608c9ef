//! Client-side correlation: timeouts, late responses and teardown.

use coedit_bus::{
    BusClient, BusError, HostMessage, RequestEnvelope, ResponseEnvelope, StreamFilter,
};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::test(start_paused = true)]
async fn unanswered_request_times_out_and_late_response_is_dropped() {
    let (request_tx, mut request_rx) = mpsc::unbounded_channel::<RequestEnvelope>();
    let (message_tx, message_rx) = mpsc::unbounded_channel::<HostMessage>();
    let client = BusClient::connect(request_tx, message_rx, Duration::from_secs(30));

    let err = client
        .run("get-version", Value::Null)
        .await
        .expect_err("nobody answers");
    assert!(matches!(err, BusError::Timeout { request_id: 1 }));

    let first = request_rx.recv().await.expect("first request reached the host");
    assert_eq!(first.request_id, 1);
    message_tx
        .send(HostMessage::Response(ResponseEnvelope::success(
            1,
            json!({ "version": 0 }),
        )))
        .expect("late response");

    let answer = tokio::spawn(async move {
        let second = request_rx.recv().await.expect("second request");
        assert_eq!(second.request_id, 2);
        message_tx
            .send(HostMessage::Response(ResponseEnvelope::success(
                second.request_id,
                json!({ "version": 7 }),
            )))
            .expect("answer");
        (request_rx, message_tx)
    });

    let value = client
        .run("get-version", Value::Null)
        .await
        .expect("second request resolves");
    assert_eq!(value["version"], 7);
    drop(answer.await.expect("responder"));
}

#[tokio::test]
async fn host_teardown_fails_pending_requests_and_ends_streams() {
    let (request_tx, mut request_rx) = mpsc::unbounded_channel::<RequestEnvelope>();
    let (message_tx, message_rx) = mpsc::unbounded_channel::<HostMessage>();
    let client = BusClient::connect(request_tx, message_rx, Duration::from_secs(30));

    let closer = tokio::spawn(async move {
        let register = request_rx.recv().await.expect("register request");
        assert_eq!(register.command, "register-stream");
        message_tx
            .send(HostMessage::Response(ResponseEnvelope::success(
                register.request_id,
                json!({ "streamId": "watch" }),
            )))
            .expect("register answer");

        let request = request_rx.recv().await.expect("request");
        drop(message_tx);
        request.request_id
    });

    let mut events = client
        .register_stream("watch", StreamFilter::default())
        .await
        .expect("stream registered");

    let err = client
        .run("get-text", Value::Null)
        .await
        .expect_err("channel torn down");
    assert!(matches!(err, BusError::ChannelClosed));
    assert_eq!(closer.await.expect("closer"), 2);

    let ended = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("stream receiver settles");
    assert!(ended.is_none());

    let err = client
        .run("get-text", Value::Null)
        .await
        .expect_err("no driver left");
    assert!(matches!(err, BusError::ChannelClosed));
}

//! Shared integration-test bus bootstrap helpers.

use coedit_bus::{BusClient, BusHost, EventEnvelope};
use coedit_core::{Config, Document, RopeBuffer};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

pub(crate) fn setup_bus(text: &str) -> BusClient {
    let config = Config {
        request_timeout_ms: 5_000,
        ..Config::default()
    };
    let timeout = config.request_timeout();
    let document = Document::with_buffer(RopeBuffer::new(text), config);
    BusClient::from_handle(BusHost::spawn(document), timeout)
}

pub(crate) async fn recv_event(rx: &mut UnboundedReceiver<EventEnvelope>) -> EventEnvelope {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("expected stream event")
        .expect("stream closed")
}

//! Single-task host owning a document and serving bus requests.

use crate::dispatch::dispatch;
use crate::protocol::{
    describe_event, Command, EventEnvelope, EventKind, HostMessage, RequestEnvelope,
    ResponseEnvelope, StreamFilter,
};
use chrono::Utc;
use coedit_core::{Document, DocumentEvent, EngineError, RopeBuffer, TextBuffer};
use serde_json::{json, Value};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info};

// Far-off lock deadlines are re-armed in steps; a timer that fires early finds
// the lock still valid and leaves it alone.
const MAX_TIMER_WAIT: Duration = Duration::from_secs(3600);

/// Channels for talking to a spawned host.
pub struct HostHandle {
    pub request_tx: UnboundedSender<RequestEnvelope>,
    pub message_rx: UnboundedReceiver<HostMessage>,
    pub task: JoinHandle<()>,
}

/// Owns the [`Document`] and every registered event stream.
///
/// All requests are handled one at a time on a single task, so the document
/// never sees concurrent calls. The same task fires lock-expiry timers.
pub struct BusHost<B: TextBuffer = RopeBuffer> {
    document: Document<B>,
    streams: Vec<(String, StreamFilter)>,
    event_rx: UnboundedReceiver<DocumentEvent>,
    outbound: UnboundedSender<HostMessage>,
}

impl<B: TextBuffer + 'static> BusHost<B> {
    pub fn new(mut document: Document<B>, outbound: UnboundedSender<HostMessage>) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        document.observe(move |event| {
            let _ = event_tx.send(event.clone());
        });
        Self {
            document,
            streams: Vec::new(),
            event_rx,
            outbound,
        }
    }

    pub fn document(&self) -> &Document<B> {
        &self.document
    }

    /// Spawn the host on the current tokio runtime.
    ///
    /// # Returns
    /// A [`HostHandle`] with the request sender and outbound message receiver.
    pub fn spawn(document: Document<B>) -> HostHandle {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let host = Self::new(document, message_tx);
        let task = tokio::spawn(host.run(request_rx));
        HostHandle {
            request_tx,
            message_rx,
            task,
        }
    }

    /// Serve requests until the inbound channel closes or nobody listens.
    pub async fn run(mut self, mut requests: UnboundedReceiver<RequestEnvelope>) {
        info!("control bus host started");
        loop {
            let next_expiry = self.document.next_lock_expiry();
            let deadline = next_expiry
                .as_ref()
                .map(|(_, expires_at)| {
                    let wait = expires_at
                        .signed_duration_since(Utc::now())
                        .to_std()
                        .unwrap_or_default()
                        .min(MAX_TIMER_WAIT);
                    Instant::now() + wait
                })
                .unwrap_or_else(Instant::now);

            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => break,
                },
                _ = sleep_until(deadline), if next_expiry.is_some() => {
                    if let Some((lock_id, _)) = next_expiry {
                        self.expire_lock(&lock_id);
                    }
                }
            }

            if self.outbound.is_closed() {
                debug!("control bus outbound channel closed");
                break;
            }
        }
        info!(streams = self.streams.len(), "control bus host stopped");
    }

    fn expire_lock(&mut self, lock_id: &str) {
        if self.document.expire_lock(lock_id, Utc::now()) {
            debug!(lock = lock_id, "lock expired by timer");
        }
    }

    /// Execute one request: reply first, then fan out the events it caused.
    pub fn handle_request(&mut self, request: RequestEnvelope) {
        let request_id = request.request_id;
        let command = match Command::from_request(&request) {
            Ok(command) => command,
            Err(err) => {
                debug!(request_id, command = %request.command, error = %err, "rejected request");
                self.respond(request_id, Err(err));
                return;
            }
        };

        match command {
            Command::RegisterStream { stream_id, filter } => {
                let result = self.register_stream(&stream_id, filter);
                let registered = result.is_ok();
                self.respond(request_id, result);
                if registered {
                    self.send_initial_state(&stream_id);
                }
            }
            Command::UnregisterStream { stream_id } => {
                let result = self.unregister_stream(&stream_id);
                self.respond(request_id, result);
            }
            command => {
                let document = &mut self.document;
                let result = guarded(&request.command, || dispatch(document, command));
                if let Err(err) = &result {
                    debug!(request_id, command = %request.command, error = %err, "command failed");
                }
                self.respond(request_id, result);
            }
        }
        self.flush_events();
    }

    fn respond(&self, request_id: u64, result: Result<Value, EngineError>) {
        self.send(HostMessage::Response(ResponseEnvelope::from_result(
            request_id, result,
        )));
    }

    fn send(&self, message: HostMessage) {
        if self.outbound.send(message).is_err() {
            debug!("dropping host message; outbound channel closed");
        }
    }

    fn register_stream(&mut self, stream_id: &str, filter: StreamFilter) -> Result<Value, EngineError> {
        if stream_id.trim().is_empty() {
            return Err(EngineError::Validation("streamId must not be empty".to_string()));
        }
        if self.streams.iter().any(|(existing, _)| existing == stream_id) {
            return Err(EngineError::InvalidState(format!(
                "stream '{}' is already registered",
                stream_id
            )));
        }
        self.streams.push((stream_id.to_string(), filter));
        debug!(stream = stream_id, "event stream registered");
        Ok(json!({ "streamId": stream_id }))
    }

    fn unregister_stream(&mut self, stream_id: &str) -> Result<Value, EngineError> {
        let before = self.streams.len();
        self.streams.retain(|(existing, _)| existing != stream_id);
        if self.streams.len() == before {
            return Err(EngineError::NotFound(format!("stream '{}'", stream_id)));
        }
        debug!(stream = stream_id, "event stream unregistered");
        Ok(json!({ "streamId": stream_id }))
    }

    fn send_initial_state(&mut self, stream_id: &str) {
        let snapshot = self.document.snapshot();
        match serde_json::to_value(&snapshot) {
            Ok(payload) => self.send(HostMessage::Event(EventEnvelope {
                stream_id: stream_id.to_string(),
                event_kind: EventKind::InitialState,
                payload,
                timestamp: Utc::now(),
            })),
            Err(err) => error!(stream = stream_id, error = %err, "failed to encode snapshot"),
        }
    }

    fn flush_events(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            if self.streams.is_empty() {
                continue;
            }
            let (kind, user, payload) = match describe_event(&event) {
                Ok(described) => described,
                Err(err) => {
                    error!(error = %err, "failed to encode document event");
                    continue;
                }
            };
            let timestamp = Utc::now();
            for (stream_id, filter) in &self.streams {
                if !filter.matches(kind, user) {
                    continue;
                }
                let envelope = EventEnvelope {
                    stream_id: stream_id.clone(),
                    event_kind: kind,
                    payload: payload.clone(),
                    timestamp,
                };
                if self.outbound.send(HostMessage::Event(envelope)).is_err() {
                    return;
                }
            }
        }
    }
}

/// Run one command, turning a panic into a failure response so the host task
/// survives it.
fn guarded<F>(command: &str, run: F) -> Result<Value, EngineError>
where
    F: FnOnce() -> Result<Value, EngineError>,
{
    match catch_unwind(AssertUnwindSafe(run)) {
        Ok(result) => result,
        Err(_) => {
            error!(command, "command panicked; host keeps serving");
            Err(EngineError::InvalidState(format!(
                "command '{}' failed unexpectedly",
                command
            )))
        }
    }
}

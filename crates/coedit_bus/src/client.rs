//! Correlating async client for the control bus.

use crate::error::BusError;
use crate::host::HostHandle;
use crate::protocol::{
    Command, EventEnvelope, HostMessage, RequestEnvelope, RequestId, ResponseEnvelope,
    StreamFilter,
};
use coedit_core::ErrorKind;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

type Responder = oneshot::Sender<Result<Value, BusError>>;

enum DriverCommand {
    Request {
        envelope: RequestEnvelope,
        respond: Responder,
    },
    Forget(RequestId),
    Subscribe {
        stream_id: String,
        events: mpsc::UnboundedSender<EventEnvelope>,
    },
    Unsubscribe(String),
}

/// Driver side of a control bus connection.
///
/// A background task owns the pending-request table and the stream routes; the
/// client only talks to it over a channel, so dropping the client or losing
/// the host fails every pending request with [`BusError::ChannelClosed`].
pub struct BusClient {
    driver: mpsc::UnboundedSender<DriverCommand>,
    next_request_id: AtomicU64,
    timeout: Duration,
}

impl BusClient {
    /// Connect over a pair of raw channels. Must be called inside a tokio
    /// runtime.
    pub fn connect(
        requests: mpsc::UnboundedSender<RequestEnvelope>,
        messages: mpsc::UnboundedReceiver<HostMessage>,
        timeout: Duration,
    ) -> Self {
        let (driver, commands) = mpsc::unbounded_channel();
        tokio::spawn(drive(commands, requests, messages));
        Self {
            driver,
            next_request_id: AtomicU64::new(1),
            timeout,
        }
    }

    /// Connect to an in-process host. The host task keeps running on its own.
    pub fn from_handle(handle: HostHandle, timeout: Duration) -> Self {
        Self::connect(handle.request_tx, handle.message_rx, timeout)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `command` with raw `params` and wait for the correlated response.
    ///
    /// # Errors
    /// - [`BusError::Timeout`] when no response arrives within the deadline.
    /// - [`BusError::ChannelClosed`] when the connection is gone.
    /// - [`BusError::Remote`] when the host reports a failure.
    pub async fn run(&self, command: &str, params: Value) -> Result<Value, BusError> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        self.send_envelope(RequestEnvelope {
            request_id,
            command: command.to_string(),
            params,
        })
        .await
    }

    /// Typed variant of [`BusClient::run`].
    pub async fn execute(&self, command: &Command) -> Result<Value, BusError> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let envelope = RequestEnvelope::from_command(request_id, command).map_err(BusError::Encode)?;
        self.send_envelope(envelope).await
    }

    /// [`BusClient::execute`] and decode the result.
    pub async fn call<T: DeserializeOwned>(&self, command: &Command) -> Result<T, BusError> {
        let value = self.execute(command).await?;
        serde_json::from_value(value).map_err(BusError::Decode)
    }

    async fn send_envelope(&self, envelope: RequestEnvelope) -> Result<Value, BusError> {
        let request_id = envelope.request_id;
        let (respond, response) = oneshot::channel();
        self.driver
            .send(DriverCommand::Request { envelope, respond })
            .map_err(|_| BusError::ChannelClosed)?;

        match tokio::time::timeout(self.timeout, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BusError::ChannelClosed),
            Err(_) => {
                let _ = self.driver.send(DriverCommand::Forget(request_id));
                debug!(request_id, "control bus request timed out");
                Err(BusError::Timeout { request_id })
            }
        }
    }

    /// Register an event stream and return its receiver.
    ///
    /// The receiver is routed before the request goes out so the
    /// `initial-state` event cannot be missed. It ends when the stream is
    /// unregistered or the connection closes.
    pub async fn register_stream(
        &self,
        stream_id: &str,
        filter: StreamFilter,
    ) -> Result<mpsc::UnboundedReceiver<EventEnvelope>, BusError> {
        let (events, receiver) = mpsc::unbounded_channel();
        self.driver
            .send(DriverCommand::Subscribe {
                stream_id: stream_id.to_string(),
                events,
            })
            .map_err(|_| BusError::ChannelClosed)?;

        let registered = self
            .execute(&Command::RegisterStream {
                stream_id: stream_id.to_string(),
                filter,
            })
            .await;
        if let Err(err) = registered {
            let _ = self
                .driver
                .send(DriverCommand::Unsubscribe(stream_id.to_string()));
            return Err(err);
        }
        Ok(receiver)
    }

    pub async fn unregister_stream(&self, stream_id: &str) -> Result<(), BusError> {
        let result = self
            .execute(&Command::UnregisterStream {
                stream_id: stream_id.to_string(),
            })
            .await;
        let _ = self
            .driver
            .send(DriverCommand::Unsubscribe(stream_id.to_string()));
        result.map(|_| ())
    }
}

fn resolve(response: ResponseEnvelope) -> Result<Value, BusError> {
    if response.success {
        return Ok(response.result.unwrap_or(Value::Null));
    }
    Err(BusError::Remote {
        kind: response.error_kind.unwrap_or(ErrorKind::Validation),
        message: response.error.unwrap_or_default(),
    })
}

async fn drive(
    mut commands: mpsc::UnboundedReceiver<DriverCommand>,
    requests: mpsc::UnboundedSender<RequestEnvelope>,
    mut messages: mpsc::UnboundedReceiver<HostMessage>,
) {
    let mut pending: HashMap<RequestId, Responder> = HashMap::new();
    let mut streams: HashMap<String, mpsc::UnboundedSender<EventEnvelope>> = HashMap::new();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(DriverCommand::Request { envelope, respond }) => {
                    let request_id = envelope.request_id;
                    if requests.send(envelope).is_err() {
                        let _ = respond.send(Err(BusError::ChannelClosed));
                        break;
                    }
                    pending.insert(request_id, respond);
                }
                Some(DriverCommand::Forget(request_id)) => {
                    pending.remove(&request_id);
                }
                Some(DriverCommand::Subscribe { stream_id, events }) => {
                    streams.insert(stream_id, events);
                }
                Some(DriverCommand::Unsubscribe(stream_id)) => {
                    streams.remove(&stream_id);
                }
                None => break,
            },
            message = messages.recv() => match message {
                Some(HostMessage::Response(response)) => {
                    match pending.remove(&response.request_id) {
                        Some(respond) => {
                            let _ = respond.send(resolve(response));
                        }
                        None => debug!(
                            request_id = response.request_id,
                            "dropping response for unknown or settled request"
                        ),
                    }
                }
                Some(HostMessage::Event(event)) => match streams.get(&event.stream_id) {
                    Some(route) => {
                        if route.send(event).is_err() {
                            debug!("stream receiver dropped");
                        }
                    }
                    None => debug!(stream = %event.stream_id, "dropping event for unknown stream"),
                },
                None => break,
            },
        }
    }

    for (_, respond) in pending.drain() {
        let _ = respond.send(Err(BusError::ChannelClosed));
    }
    // Remaining queued requests never reached the host.
    commands.close();
    while let Ok(command) = commands.try_recv() {
        if let DriverCommand::Request { respond, .. } = command {
            let _ = respond.send(Err(BusError::ChannelClosed));
        }
    }
    debug!("control bus client driver stopped");
}

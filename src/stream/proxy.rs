use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use futures_util::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::bridge::{EventSink, OutboundMessage};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::http::{Request, Transport};

use super::parser::{SseEvent, SseParser};
use super::{ConnectionId, ConnectionState};

const CONNECT_EVENT: &str = "connect";
const HEARTBEAT_EVENT: &str = "heartbeat";
const BACKOFF_FACTOR: f32 = 1.5;

/// Delays between automatic reconnects: `base * 1.5^(n-1)` for n in 1..=max.
///
/// The budget counts reconnects, not failures: with a max of 5 a stream that never comes
/// up is tried six times (the first connection plus five reconnects) before giving up.
pub fn reconnect_backoff(settings: &Settings) -> ExponentialBackoff {
    let base = settings.reconnect_base_delay();
    let max_times = settings.max_reconnect_attempts as usize;
    let ceiling = base.mul_f32(BACKOFF_FACTOR.powi(max_times.max(1) as i32));
    ExponentialBuilder::default()
        .with_min_delay(base)
        .with_max_delay(ceiling)
        .with_factor(BACKOFF_FACTOR)
        .with_max_times(max_times)
        .build()
}

struct Connection {
    url: String,
    token: String,
    state: ConnectionState,
    attempts: u32,
    cancel: CancellationToken,
}

struct Shared {
    settings: Settings,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn EventSink>,
    connections: Mutex<HashMap<ConnectionId, Connection>>,
}

impl Shared {
    fn connections(&self) -> MutexGuard<'_, HashMap<ConnectionId, Connection>> {
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Emits on behalf of one supervisor run, unless that run has been superseded or closed.
    fn relay(&self, id: &ConnectionId, cancel: &CancellationToken, message: OutboundMessage) {
        let connections = self.connections();
        if cancel.is_cancelled() || !connections.contains_key(id) {
            return;
        }
        self.sink.emit(message);
    }

    fn update(&self, id: &ConnectionId, cancel: &CancellationToken, f: impl FnOnce(&mut Connection)) {
        if cancel.is_cancelled() {
            return;
        }
        if let Some(conn) = self.connections().get_mut(id) {
            f(conn);
        }
    }
}

/// Holds server-push subscriptions on behalf of the UI and relays their events.
pub struct EventStreamProxy {
    shared: Arc<Shared>,
}

impl EventStreamProxy {
    pub fn new(settings: Settings, transport: Arc<dyn Transport>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            shared: Arc::new(Shared {
                settings,
                transport,
                sink,
                connections: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Starts a subscription and returns its id before the handshake completes.
    ///
    /// Reusing an id replaces the earlier subscription. Must be called inside a Tokio runtime.
    pub fn open_connection(&self, url: &str, token: &str, id: Option<ConnectionId>) -> ConnectionId {
        let id = id.unwrap_or_else(ConnectionId::generate);
        let url = self.shared.settings.api_url(url);
        let cancel = CancellationToken::new();
        {
            let mut connections = self.shared.connections();
            if let Some(previous) = connections.remove(&id) {
                log::info!("Replacing event stream {id}");
                previous.cancel.cancel();
            }
            connections.insert(
                id.clone(),
                Connection {
                    url: url.clone(),
                    token: token.to_string(),
                    state: ConnectionState::Connecting,
                    attempts: 0,
                    cancel: cancel.clone(),
                },
            );
        }
        log::info!("Opening event stream {id} to {url}");
        tokio::spawn(supervise(
            Arc::clone(&self.shared),
            id.clone(),
            url,
            token.to_string(),
            cancel,
        ));
        id
    }

    /// Tears the subscription down. Returns `false` when it was already closed.
    pub fn close_connection(&self, id: &ConnectionId) -> bool {
        let mut connections = self.shared.connections();
        match connections.remove(id) {
            Some(conn) => {
                conn.cancel.cancel();
                log::info!("Closed event stream {id}");
                self.shared
                    .sink
                    .emit(OutboundMessage::SseClose { sse_id: id.clone() });
                true
            }
            None => false,
        }
    }

    /// Resets the attempt counter and reconnects immediately, skipping any pending backoff.
    pub fn reconnect(&self, id: &ConnectionId) -> Result<()> {
        let (url, token, cancel) = {
            let mut connections = self.shared.connections();
            let conn = connections
                .get_mut(id)
                .ok_or_else(|| Error::Stream(format!("Unknown event stream {id}")))?;
            conn.cancel.cancel();
            conn.cancel = CancellationToken::new();
            conn.attempts = 0;
            conn.state = ConnectionState::Connecting;
            (conn.url.clone(), conn.token.clone(), conn.cancel.clone())
        };
        log::info!("Manual reconnect of event stream {id}");
        tokio::spawn(supervise(Arc::clone(&self.shared), id.clone(), url, token, cancel));
        Ok(())
    }

    pub fn close_all(&self) {
        let ids: Vec<ConnectionId> = self.shared.connections().keys().cloned().collect();
        for id in ids {
            self.close_connection(&id);
        }
    }

    /// Closed for ids that were never opened or have been closed.
    pub fn state(&self, id: &ConnectionId) -> ConnectionState {
        self.shared
            .connections()
            .get(id)
            .map_or(ConnectionState::Closed, |c| c.state)
    }

    pub fn reconnect_attempts(&self, id: &ConnectionId) -> Option<u32> {
        self.shared.connections().get(id).map(|c| c.attempts)
    }

    pub fn is_connected(&self, id: &ConnectionId) -> bool {
        self.state(id) == ConnectionState::Open
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.shared.connections().keys().cloned().collect()
    }
}

fn event_data(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Owns one run of a subscription: connect, relay, back off, repeat until the budget is spent.
async fn supervise(
    shared: Arc<Shared>,
    id: ConnectionId,
    url: String,
    token: String,
    cancel: CancellationToken,
) {
    let mut backoff = reconnect_backoff(&shared.settings);
    loop {
        shared.update(&id, &cancel, |c| c.state = ConnectionState::Connecting);
        let err = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            err = stream_once(&shared, &id, &url, &token, &cancel, &mut backoff) => err,
        };
        if cancel.is_cancelled() {
            return;
        }

        log::warn!("Event stream {id} error: {err}");
        shared.relay(
            &id,
            &cancel,
            OutboundMessage::SseError {
                sse_id: id.clone(),
                error: err.to_string(),
                fatal: false,
            },
        );

        let Some(delay) = backoff.next() else {
            let max = shared.settings.max_reconnect_attempts;
            log::error!("Event stream {id} gave up after {max} reconnect attempts");
            shared.update(&id, &cancel, |c| c.state = ConnectionState::Errored);
            shared.relay(
                &id,
                &cancel,
                OutboundMessage::SseError {
                    sse_id: id.clone(),
                    error: Error::MaxRetriesExceeded(max).to_string(),
                    fatal: true,
                },
            );
            return;
        };

        let mut attempt = 0;
        shared.update(&id, &cancel, |c| {
            c.attempts += 1;
            attempt = c.attempts;
        });
        log::info!(
            "Reconnecting event stream {id} in {:?} (attempt {attempt}/{})",
            delay,
            shared.settings.max_reconnect_attempts
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Runs one connection until it breaks and returns the reason.
async fn stream_once(
    shared: &Shared,
    id: &ConnectionId,
    url: &str,
    token: &str,
    cancel: &CancellationToken,
    backoff: &mut ExponentialBackoff,
) -> Error {
    let request = Request::get(url)
        .query("token", token)
        .header("Accept", "text/event-stream")
        .header("Cache-Control", "no-cache");
    let handshake = shared.settings.request_timeout();
    let body = match tokio::time::timeout(handshake, shared.transport.open_stream(request)).await {
        Ok(Ok(body)) => body,
        Ok(Err(e)) => return Error::Stream(e.to_string()),
        Err(_) => {
            return Error::Stream(format!(
                "No response from server within {}s",
                handshake.as_secs()
            ))
        }
    };
    let mut chunks = body.chunks;
    let mut parser = SseParser::new();
    let liveness = shared.settings.heartbeat_timeout();

    loop {
        let next = match liveness {
            Some(limit) => match tokio::time::timeout(limit, chunks.next()).await {
                Ok(next) => next,
                Err(_) => {
                    return Error::Stream(format!(
                        "No heartbeat for {}s",
                        limit.as_secs()
                    ))
                }
            },
            None => chunks.next().await,
        };
        let bytes = match next {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => return Error::Stream(e.to_string()),
            None => return Error::Stream("Connection reset by server".to_string()),
        };
        for event in parser.feed(&bytes) {
            relay_event(shared, id, cancel, event, backoff);
        }
    }
}

fn relay_event(
    shared: &Shared,
    id: &ConnectionId,
    cancel: &CancellationToken,
    event: SseEvent,
    backoff: &mut ExponentialBackoff,
) {
    match event.event.as_str() {
        CONNECT_EVENT => {
            log::info!("Event stream {id} connected: {}", event.data);
            *backoff = reconnect_backoff(&shared.settings);
            shared.update(id, cancel, |c| {
                c.state = ConnectionState::Open;
                c.attempts = 0;
            });
            shared.relay(
                id,
                cancel,
                OutboundMessage::SseConnect {
                    sse_id: id.clone(),
                    message: event_data(&event.data),
                },
            );
        }
        name => {
            if name == HEARTBEAT_EVENT {
                log::debug!("Event stream {id} heartbeat");
            } else {
                log::info!("Event stream {id} received {name}");
            }
            shared.relay(
                id,
                cancel,
                OutboundMessage::SseMessage {
                    sse_id: id.clone(),
                    event: event.event.clone(),
                    data: event_data(&event.data),
                },
            );
        }
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket fan-out.
//!
//! The [`ConnectionManager`] is the live tail of the event bus: it
//! tracks per-connection subscription sets and routes each event to the
//! matching sessions. Non-trace events are delivered to connections
//! subscribed to that workflow (or the wildcard); trace events go to
//! every connection. Connections that cannot keep up are dropped; the
//! client reconnects with its cursor and backfills.
//!
//! Per-connection protocol:
//! - client→server: `subscribe`, `unsubscribe`, `subscribe_all`, `pong`
//! - server→client: `event`, `ping`, `backfill_complete`,
//!   `backfill_expired`

use crate::api::AppState;
use amelia_adapters::{Driver, Tracker};
use amelia_core::{Clock, EventId, EventLevel, EventRecord, IdGen, WorkflowId};
use amelia_engine::EventSink;
use amelia_storage::EventStoreError;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Hard cap on backfill size. Clients needing deeper history fall back
/// to the REST events endpoint.
pub const BACKFILL_CAP: usize = 1000;

/// Per-connection outbound queue. A full queue means the client cannot
/// keep up; the connection is dropped and the client re-syncs via
/// backfill on reconnect.
const OUTBOUND_QUEUE: usize = 1024;

#[derive(Debug, Clone)]
pub struct WsSettings {
    pub heartbeat: Duration,
    pub idle_timeout: Duration,
    pub send_timeout: Duration,
}

impl Default for WsSettings {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
            send_timeout: Duration::from_secs(5),
        }
    }
}

/// Client → server frames.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { workflow_id: WorkflowId },
    Unsubscribe { workflow_id: WorkflowId },
    SubscribeAll,
    Pong,
}

/// Server → client frames.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Event { payload: EventRecord },
    Ping,
    BackfillComplete { count: usize },
    BackfillExpired { message: String },
}

#[derive(Default)]
struct SubscriptionSet {
    all: bool,
    ids: HashSet<WorkflowId>,
}

impl SubscriptionSet {
    /// Trace events have wildcard semantics: they are debugging views
    /// and reach every connection.
    fn matches(&self, event: &EventRecord) -> bool {
        event.level == EventLevel::Trace || self.all || self.ids.contains(&event.workflow_id)
    }
}

struct Connection {
    tx: mpsc::Sender<ServerMessage>,
    subs: SubscriptionSet,
}

pub type ConnId = u64;

/// WebSocket session registry. Mutation happens under the registry
/// lock; broadcasts iterate a snapshot of senders so a slow socket
/// never blocks the emitting workflow.
#[derive(Default)]
pub struct ConnectionManager {
    connections: Mutex<HashMap<ConnId, Connection>>,
    next_id: AtomicU64,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> (ConnId, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.connections.lock().insert(
            id,
            Connection {
                tx,
                subs: SubscriptionSet::default(),
            },
        );
        (id, rx)
    }

    pub fn unregister(&self, id: ConnId) {
        self.connections.lock().remove(&id);
    }

    pub fn subscribe(&self, id: ConnId, workflow_id: WorkflowId) {
        if let Some(conn) = self.connections.lock().get_mut(&id) {
            conn.subs.ids.insert(workflow_id);
        }
    }

    pub fn unsubscribe(&self, id: ConnId, workflow_id: &WorkflowId) {
        if let Some(conn) = self.connections.lock().get_mut(&id) {
            conn.subs.ids.remove(workflow_id);
        }
    }

    pub fn subscribe_all(&self, id: ConnId) {
        if let Some(conn) = self.connections.lock().get_mut(&id) {
            conn.subs.all = true;
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Route an event to matching connections. A failed enqueue (full
    /// or closed) marks the connection for removal.
    pub fn broadcast(&self, event: &EventRecord) {
        let targets: Vec<(ConnId, mpsc::Sender<ServerMessage>)> = {
            let connections = self.connections.lock();
            connections
                .iter()
                .filter(|(_, conn)| conn.subs.matches(event))
                .map(|(id, conn)| (*id, conn.tx.clone()))
                .collect()
        };

        let mut stale = Vec::new();
        for (id, tx) in targets {
            let message = ServerMessage::Event {
                payload: event.clone(),
            };
            if tx.try_send(message).is_err() {
                stale.push(id);
            }
        }

        if !stale.is_empty() {
            let mut connections = self.connections.lock();
            for id in stale {
                warn!(conn = id, "dropping unresponsive websocket connection");
                connections.remove(&id);
            }
        }
    }
}

impl EventSink for ConnectionManager {
    fn offer(&self, event: &EventRecord) {
        self.broadcast(event);
    }
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Event-id cursor; replay everything after it before going live.
    pub since: Option<String>,
}

/// `GET /ws/events?since=<event_id>`
pub async fn ws_events<D, T, C, G>(
    State(state): State<AppState<D, T, C, G>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response
where
    D: Driver,
    T: Tracker,
    C: Clock + 'static,
    G: IdGen + 'static,
{
    ws.on_upgrade(move |socket| handle_socket(state, socket, query.since))
}

async fn handle_socket<D, T, C, G>(
    state: AppState<D, T, C, G>,
    socket: WebSocket,
    since: Option<String>,
) where
    D: Driver,
    T: Tracker,
    C: Clock + 'static,
    G: IdGen + 'static,
{
    let (mut sender, mut receiver) = socket.split();

    // Register before backfilling so no event falls between replay and
    // live mode; duplicates are filtered against the backfill horizon.
    let (conn_id, mut rx) = state.manager.register();
    let mut backfill_horizon: Option<(WorkflowId, u64)> = None;

    if let Some(since) = since {
        let cursor = EventId::new(since);
        let resolved = {
            let events = state.events.lock();
            events.resolve_cursor(&cursor).map(|(workflow_id, sequence)| {
                let backlog = events.after_sequence(&workflow_id, sequence, BACKFILL_CAP);
                (workflow_id, backlog)
            })
        };

        match resolved {
            Ok((workflow_id, backlog)) => {
                state.manager.subscribe(conn_id, workflow_id.clone());
                let count = backlog.len();
                let last_sequence = backlog.last().map(|e| e.sequence).unwrap_or(0);
                for event in backlog {
                    if send_json(&mut sender, &ServerMessage::Event { payload: event })
                        .await
                        .is_err()
                    {
                        state.manager.unregister(conn_id);
                        return;
                    }
                }
                backfill_horizon = Some((workflow_id, last_sequence));
                if send_json(&mut sender, &ServerMessage::BackfillComplete { count })
                    .await
                    .is_err()
                {
                    state.manager.unregister(conn_id);
                    return;
                }
            }
            Err(EventStoreError::CursorNotFound(cursor)) => {
                let message = ServerMessage::BackfillExpired {
                    message: format!(
                        "cursor {cursor} is no longer available; clear it and reload"
                    ),
                };
                if send_json(&mut sender, &message).await.is_err() {
                    state.manager.unregister(conn_id);
                    return;
                }
            }
            Err(e) => {
                warn!(error = %e, "backfill failed");
                state.manager.unregister(conn_id);
                return;
            }
        }
    }

    let mut heartbeat = tokio::time::interval(state.ws.heartbeat);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it.
    heartbeat.tick().await;
    let mut last_pong = Instant::now();

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(message) = outbound else { break };
                if let ServerMessage::Event { payload } = &message {
                    if let Some((workflow_id, through)) = &backfill_horizon {
                        if payload.sequence != 0
                            && payload.workflow_id == *workflow_id
                            && payload.sequence <= *through
                        {
                            continue;
                        }
                    }
                }
                let send = tokio::time::timeout(
                    state.ws.send_timeout,
                    send_json(&mut sender, &message),
                )
                .await;
                if !matches!(send, Ok(Ok(()))) {
                    break;
                }
            }

            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Subscribe { workflow_id }) => {
                                state.manager.subscribe(conn_id, workflow_id);
                            }
                            Ok(ClientMessage::Unsubscribe { workflow_id }) => {
                                state.manager.unsubscribe(conn_id, &workflow_id);
                            }
                            Ok(ClientMessage::SubscribeAll) => {
                                state.manager.subscribe_all(conn_id);
                            }
                            Ok(ClientMessage::Pong) => {
                                last_pong = Instant::now();
                            }
                            Err(e) => {
                                debug!(error = %e, "ignoring malformed client frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "websocket receive error");
                        break;
                    }
                }
            }

            _ = heartbeat.tick() => {
                if last_pong.elapsed() > state.ws.idle_timeout {
                    debug!(conn = conn_id, "websocket idle timeout");
                    break;
                }
                let send = tokio::time::timeout(
                    state.ws.send_timeout,
                    send_json(&mut sender, &ServerMessage::Ping),
                )
                .await;
                if !matches!(send, Ok(Ok(()))) {
                    break;
                }
            }
        }
    }

    state.manager.unregister(conn_id);
}

async fn send_json(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).unwrap_or_default();
    sender.send(Message::Text(text)).await
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;

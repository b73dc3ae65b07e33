//! Device command channel.
//!
//! Each scanning device keeps one WebSocket open. The controller is
//! the requesting side: frames are `<id>;<payload>` text messages, the
//! device answers with the same id. Install pushes follow the command
//! frame with one binary frame.

pub mod connection;

pub use connection::WsConnection;

use crate::auth;
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use roverd_core::link::{Communicator, DeviceLink};
use roverd_model::AuthLevel;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Origin → live connection. Implements the link port the job updater
/// drives commands through.
#[derive(Default)]
pub struct WsRegistry {
    connections: DashMap<String, Arc<WsConnection>>,
}

impl std::fmt::Debug for WsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsRegistry")
            .field("connected", &self.connections.len())
            .finish()
    }
}

impl WsRegistry {
    pub fn new() -> Self {
        WsRegistry::default()
    }

    /// Register a fresh connection, closing any stale one for the
    /// same origin.
    pub fn attach(&self, origin: &str, connection: Arc<WsConnection>) {
        if let Some(previous) = self.connections.insert(origin.to_string(), connection) {
            warn!(origin, "replacing stale connection");
            previous.close();
        }
    }

    /// Drop the registration, but only when it still belongs to the
    /// handed connection (a reconnect may have replaced it already).
    pub fn detach(&self, origin: &str, connection: &Arc<WsConnection>) {
        self.connections
            .remove_if(origin, |_, current| Arc::ptr_eq(current, connection));
    }

    pub fn get(&self, origin: &str) -> Option<Arc<WsConnection>> {
        self.connections.get(origin).map(|c| c.clone())
    }
}

impl DeviceLink for WsRegistry {
    fn get_communicator(&self, origin: &str) -> Option<Arc<dyn Communicator>> {
        self.get(origin).map(|c| c as Arc<dyn Communicator>)
    }

    fn set_job_activated(&self, origin: &str) {
        if let Some(connection) = self.get(origin) {
            connection.set_job_active(true);
        }
    }

    fn set_job_deactivated(&self, origin: &str) {
        if let Some(connection) = self.get(origin) {
            connection.set_job_active(false);
        }
    }

    fn is_job_active(&self, origin: &str) -> bool {
        self.get(origin).map(|c| c.job_active()).unwrap_or(false)
    }

    fn force_disconnect(&self, origin: &str) {
        if let Some((_, connection)) = self.connections.remove(origin) {
            info!(origin, "force disconnect");
            connection.close();
        }
    }

    fn connected_origins(&self) -> Vec<String> {
        self.connections.iter().map(|e| e.key().clone()).collect()
    }
}

/// `GET /ws`: authenticate, resolve the origin, upgrade.
pub async fn upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let snapshot = state.mapping.snapshot();
    if let Err(err) = auth::require_basic(&headers, &snapshot, AuthLevel::MitmData) {
        return err.into_response();
    }
    let origin = match auth::origin_from_headers(&headers) {
        Ok(origin) => origin,
        Err(err) => return err.into_response(),
    };
    if snapshot.device(&origin).is_none() {
        return crate::errors::ApiError::forbidden(format!("unknown origin {origin}"))
            .into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(state, origin, socket))
}

async fn handle_socket(state: AppState, origin: String, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let connection = Arc::new(WsConnection::new(origin.clone(), tx));
    state.registry.attach(&origin, connection.clone());
    info!(origin, "device connected");

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => connection.handle_frame(text.as_str()),
            Ok(Message::Binary(_)) => {
                debug!(origin, "unsolicited binary frame dropped");
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    state.registry.detach(&origin, &connection);
    connection.close();
    writer.abort();
    info!(origin, "device disconnected");
}

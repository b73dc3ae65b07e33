//! One device connection: request/response correlation over the
//! `<id>;<payload>` frame protocol and the `Communicator` commands
//! built on it.

use async_trait::async_trait;
use axum::extract::ws::Message;
use dashmap::DashMap;
use roverd_core::error::{CoreError, Result};
use roverd_core::link::Communicator;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Default per-command timeout, seconds.
const COMMAND_TIMEOUT_S: u64 = 30;

pub struct WsConnection {
    origin: String,
    tx: mpsc::UnboundedSender<Message>,
    pending: DashMap<u64, oneshot::Sender<String>>,
    next_id: AtomicU64,
    job_active: AtomicBool,
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection")
            .field("origin", &self.origin)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl WsConnection {
    pub fn new(origin: String, tx: mpsc::UnboundedSender<Message>) -> Self {
        WsConnection {
            origin,
            tx,
            pending: DashMap::new(),
            next_id: AtomicU64::new(1),
            job_active: AtomicBool::new(false),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn set_job_active(&self, active: bool) {
        self.job_active.store(active, Ordering::Relaxed);
    }

    pub fn job_active(&self) -> bool {
        self.job_active.load(Ordering::Relaxed)
    }

    /// Route an inbound `<id>;<payload>` frame to its waiter.
    pub fn handle_frame(&self, frame: &str) {
        let Some((id, payload)) = frame.split_once(';') else {
            warn!(origin = self.origin, "unframed message dropped");
            return;
        };
        let Ok(id) = id.trim().parse::<u64>() else {
            warn!(origin = self.origin, "non-numeric frame id dropped");
            return;
        };
        match self.pending.remove(&id) {
            Some((_, waiter)) => {
                let _ = waiter.send(payload.to_string());
            }
            None => debug!(origin = self.origin, id, "reply with no waiter"),
        }
    }

    /// Ask the device to drop the socket and fail every caller still
    /// waiting for a reply.
    pub fn close(&self) {
        let _ = self.tx.send(Message::Close(None));
        self.pending.clear();
    }

    async fn request(&self, payload: &str, timeout_s: u64) -> Result<String> {
        self.request_inner(payload, None, timeout_s).await
    }

    async fn request_with_data(
        &self,
        payload: &str,
        data: Vec<u8>,
        timeout_s: u64,
    ) -> Result<String> {
        self.request_inner(payload, Some(data), timeout_s).await
    }

    async fn request_inner(
        &self,
        payload: &str,
        data: Option<Vec<u8>>,
        timeout_s: u64,
    ) -> Result<String> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (waiter_tx, waiter_rx) = oneshot::channel();
        self.pending.insert(id, waiter_tx);

        let frame = Message::Text(format!("{id};{payload}").into());
        let sent = self.tx.send(frame).is_ok()
            && match data {
                Some(data) => self.tx.send(Message::Binary(data.into())).is_ok(),
                None => true,
            };
        if !sent {
            self.pending.remove(&id);
            return Err(CoreError::DeviceNotConnected(self.origin.clone()));
        }

        match tokio::time::timeout(Duration::from_secs(timeout_s), waiter_rx).await {
            Ok(Ok(response)) => Ok(response.trim().to_string()),
            Ok(Err(_)) => {
                self.pending.remove(&id);
                Err(CoreError::DeviceNotConnected(self.origin.clone()))
            }
            Err(_) => {
                self.pending.remove(&id);
                Err(CoreError::CommandTimeout(timeout_s))
            }
        }
    }
}

fn is_ok(response: &str) -> bool {
    let head = response.split(':').next().unwrap_or("").trim();
    head.eq_ignore_ascii_case("OK")
}

/// Strip the `OK:` head from an informational reply.
fn ok_payload(response: &str) -> Option<String> {
    if !is_ok(response) {
        return None;
    }
    response
        .split_once(':')
        .map(|(_, rest)| rest.trim().to_string())
        .filter(|rest| !rest.is_empty())
}

#[async_trait]
impl Communicator for WsConnection {
    async fn install_apk(&self, timeout_s: u64, data: Vec<u8>) -> Result<bool> {
        let command = format!("utils install apk {}", data.len());
        let response = self.request_with_data(&command, data, timeout_s).await?;
        Ok(is_ok(&response))
    }

    async fn install_bundle(&self, timeout_s: u64, data: Vec<u8>) -> Result<bool> {
        let command = format!("utils install bundle {}", data.len());
        let response = self.request_with_data(&command, data, timeout_s).await?;
        Ok(is_ok(&response))
    }

    async fn reboot(&self) -> Result<bool> {
        let response = self.request("more reboot now", COMMAND_TIMEOUT_S).await?;
        Ok(is_ok(&response))
    }

    async fn restart_app(&self, package: &str) -> Result<bool> {
        let response = self
            .request(&format!("more restart {package}"), COMMAND_TIMEOUT_S)
            .await?;
        Ok(is_ok(&response))
    }

    async fn stop_app(&self, package: &str) -> Result<bool> {
        let response = self
            .request(&format!("more stop {package}"), COMMAND_TIMEOUT_S)
            .await?;
        Ok(is_ok(&response))
    }

    async fn start_app(&self, package: &str) -> Result<bool> {
        let response = self
            .request(&format!("more start {package}"), COMMAND_TIMEOUT_S)
            .await?;
        Ok(is_ok(&response))
    }

    async fn passthrough(&self, command: &str) -> Result<String> {
        self.request(&format!("passthrough {command}"), COMMAND_TIMEOUT_S)
            .await
    }

    async fn package_version(&self, package: &str) -> Result<Option<String>> {
        let response = self
            .request(&format!("more version {package}"), COMMAND_TIMEOUT_S)
            .await?;
        Ok(ok_payload(&response))
    }

    async fn cpu_abi(&self) -> Result<Option<String>> {
        let response = self.request("more cpuabi", COMMAND_TIMEOUT_S).await?;
        Ok(ok_payload(&response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Device side simulated by a task answering outbound frames.
    fn echo_device(
        mut rx: mpsc::UnboundedReceiver<Message>,
        connection: Arc<WsConnection>,
        reply: impl Fn(&str) -> String + Send + 'static,
    ) {
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Message::Text(text) = message {
                    let (id, payload) = text.as_str().split_once(';').unwrap();
                    let answer = reply(payload);
                    connection.handle_frame(&format!("{id};{answer}"));
                }
            }
        });
    }

    #[tokio::test]
    async fn request_round_trips_by_frame_id() {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Arc::new(WsConnection::new("atv01".to_string(), tx));
        echo_device(rx, connection.clone(), |payload| {
            format!("OK: saw [{payload}]")
        });

        let version = connection.package_version("com.nianticlabs.pokemongo").await.unwrap();
        assert_eq!(
            version.unwrap(),
            "saw [more version com.nianticlabs.pokemongo]"
        );
    }

    #[tokio::test]
    async fn ko_reply_reports_command_failure() {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Arc::new(WsConnection::new("atv01".to_string(), tx));
        echo_device(rx, connection.clone(), |_| "KO: not rooted".to_string());

        assert!(!connection.reboot().await.unwrap());
        assert_eq!(connection.cpu_abi().await.unwrap(), None);
    }

    #[tokio::test]
    async fn closed_channel_reads_as_not_connected() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let connection = WsConnection::new("atv01".to_string(), tx);
        let err = connection.reboot().await.unwrap_err();
        assert!(matches!(err, CoreError::DeviceNotConnected(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_times_out() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let connection = WsConnection::new("atv01".to_string(), tx);
        let err = connection.reboot().await.unwrap_err();
        assert!(matches!(err, CoreError::CommandTimeout(_)));
    }

    #[tokio::test]
    async fn install_sends_binary_frame_after_command() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = Arc::new(WsConnection::new("atv01".to_string(), tx));
        let inner = connection.clone();
        tokio::spawn(async move {
            let Some(Message::Text(text)) = rx.recv().await else {
                panic!("expected command frame");
            };
            let Some(Message::Binary(data)) = rx.recv().await else {
                panic!("expected binary frame");
            };
            assert_eq!(data.len(), 4);
            let (id, payload) = text.as_str().split_once(';').unwrap();
            assert_eq!(payload, "utils install apk 4");
            inner.handle_frame(&format!("{id};OK"));
        });

        assert!(connection.install_apk(60, vec![1, 2, 3, 4]).await.unwrap());
    }
}

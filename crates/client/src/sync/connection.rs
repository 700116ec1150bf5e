//! The session's single push-channel connection.
//!
//! Lifecycle: `Disconnected` → (warm-up delay) → `Connecting` → `Connected`.
//! A failed initial handshake is retried once after `retry_delay`; if that
//! also fails the state becomes `Failed`, which `start` treats like
//! `Disconnected`. Once connected, a dropped connection is handled by the
//! transport reconnect policy (`Reconnecting { attempt }` with exponential
//! backoff) until it either reconnects or gives up and returns to
//! `Disconnected`.
//!
//! Views never open their own connection: they register handlers on the
//! shared [`EventRouter`] and the connection dispatches every incoming frame
//! through it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_channel::mpsc::{unbounded, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use labgate_shared::{ClientFrame, ServerFrame};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::router::EventRouter;
use crate::config::{ClientConfig, ReconnectConfig};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection state for the push channel
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }

    /// No connection and nothing in progress.
    pub fn is_idle(&self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::Failed { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("no credential available")]
    NoCredential,
    #[error("invalid hub url: {0}")]
    Url(String),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("push channel is not connected")]
    NotConnected,
}

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub hub_url: String,
    pub warmup: Duration,
    pub retry_delay: Duration,
    pub reconnect: ReconnectConfig,
}

impl From<&ClientConfig> for ConnectionSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            hub_url: config.hub_url(),
            warmup: config.warmup,
            retry_delay: config.retry_delay,
            reconnect: config.reconnect.clone(),
        }
    }
}

struct Shared {
    settings: ConnectionSettings,
    router: EventRouter,
    state: watch::Sender<ConnectionState>,
    /// Sender for the live connection, `None` while not connected.
    outgoing: Mutex<Option<UnboundedSender<ClientFrame>>>,
    /// Broadcast groups joined on every (re)connect.
    groups: Mutex<Vec<String>>,
    /// Bumped by `stop`. A run task only writes shared state while the epoch
    /// it was started with is still current.
    epoch: Mutex<u64>,
}

impl Shared {
    fn current_epoch(&self) -> u64 {
        *lock(&self.epoch)
    }

    /// Publish `state` for the run task started at `epoch`. Returns `false`
    /// once that task has been stopped.
    fn publish(&self, epoch: u64, state: ConnectionState) -> bool {
        let current = lock(&self.epoch);
        if *current != epoch {
            return false;
        }
        self.state.send_replace(state);
        true
    }

    fn install_sender(&self, epoch: u64, tx: UnboundedSender<ClientFrame>) -> bool {
        let current = lock(&self.epoch);
        if *current != epoch {
            return false;
        }
        *lock(&self.outgoing) = Some(tx);
        true
    }

    fn clear_sender(&self, epoch: u64) {
        let current = lock(&self.epoch);
        if *current == epoch {
            lock(&self.outgoing).take();
        }
    }

    /// Invalidate the running task's epoch and reset to `Disconnected`.
    fn retire(&self) -> bool {
        let mut current = lock(&self.epoch);
        *current += 1;
        lock(&self.outgoing).take();
        let was_active = *self.state.borrow() != ConnectionState::Disconnected;
        self.state.send_replace(ConnectionState::Disconnected);
        was_active
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ConnectionManager {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(settings: ConnectionSettings, router: EventRouter) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                settings,
                router,
                state,
                outgoing: Mutex::new(None),
                groups: Mutex::new(Vec::new()),
                epoch: Mutex::new(0),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.borrow().clone()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn router(&self) -> &EventRouter {
        &self.shared.router
    }

    /// Wait until the state satisfies `pred`, giving up after `timeout`.
    pub async fn wait_for(
        &self,
        pred: impl FnMut(&ConnectionState) -> bool,
        timeout: Duration,
    ) -> Option<ConnectionState> {
        let mut rx = self.state_changes();
        let reached = match tokio::time::timeout(timeout, rx.wait_for(pred)).await {
            Ok(Ok(state)) => Some(state.clone()),
            _ => None,
        };
        reached
    }

    /// Begin connecting with `credential`. Must be called from within a
    /// tokio runtime. A no-op while a connection is already starting or live.
    pub fn start(&self, credential: &str) -> Result<(), ConnectionError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(ConnectionError::NoCredential);
        }
        let url = hub_url_with_token(&self.shared.settings.hub_url, credential)?;

        let mut task = lock(&self.task);
        let running = task.as_ref().is_some_and(|t| !t.is_finished());
        if running || !self.state().is_idle() {
            crate::log_debug!("push channel already started ({:?})", self.state());
            return Ok(());
        }

        crate::log_info!("starting push channel to {}", self.shared.settings.hub_url);
        let epoch = self.shared.current_epoch();
        *task = Some(tokio::spawn(run(self.shared.clone(), url, epoch)));
        Ok(())
    }

    /// Tear the connection down. Safe from any state, including when it was
    /// never started.
    pub fn stop(&self) {
        let mut task = lock(&self.task);
        if self.shared.retire() {
            crate::log_info!("push channel stopped");
        }
        if let Some(task) = task.take() {
            task.abort();
        }
    }

    /// Send a client action over the live connection.
    pub fn invoke(&self, frame: ClientFrame) -> Result<(), ConnectionError> {
        let outgoing = lock(&self.shared.outgoing);
        let Some(tx) = outgoing.as_ref() else {
            return Err(ConnectionError::NotConnected);
        };
        tx.unbounded_send(frame)
            .map_err(|_| ConnectionError::NotConnected)
    }

    /// Join a broadcast group now if connected, and again after every
    /// reconnect.
    pub fn join_group(&self, group: &str) {
        {
            let mut groups = lock(&self.shared.groups);
            if !groups.iter().any(|g| g == group) {
                groups.push(group.to_string());
            }
        }
        match self.invoke(ClientFrame::join_group(group)) {
            Ok(()) => crate::log_debug!("joined group {}", group),
            Err(_) => crate::log_debug!("group {} will be joined on connect", group),
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }
}

/// Append the bearer credential as the `access_token` query parameter.
pub fn hub_url_with_token(hub_url: &str, credential: &str) -> Result<String, ConnectionError> {
    let mut url = url::Url::parse(hub_url).map_err(|e| ConnectionError::Url(e.to_string()))?;
    url.query_pairs_mut().append_pair("access_token", credential);
    Ok(url.to_string())
}

async fn handshake(url: &str) -> Result<WsStream, ConnectionError> {
    connect_async(url)
        .await
        .map(|(ws, _response)| ws)
        .map_err(|e| ConnectionError::Handshake(e.to_string()))
}

async fn run(shared: Arc<Shared>, url: String, epoch: u64) {
    let settings = shared.settings.clone();
    tokio::time::sleep(settings.warmup).await;
    if !shared.publish(epoch, ConnectionState::Connecting) {
        return;
    }

    let mut ws = match handshake(&url).await {
        Ok(ws) => ws,
        Err(first) => {
            crate::log_warn!(
                "push handshake failed: {}; retrying in {:?}",
                first,
                settings.retry_delay
            );
            tokio::time::sleep(settings.retry_delay).await;
            match handshake(&url).await {
                Ok(ws) => ws,
                Err(e) => {
                    crate::log_error!("push channel unavailable: {}", e);
                    shared.publish(
                        epoch,
                        ConnectionState::Failed {
                            reason: e.to_string(),
                        },
                    );
                    return;
                }
            }
        }
    };

    loop {
        if !shared.publish(epoch, ConnectionState::Connected) {
            return;
        }
        crate::log_info!("push channel connected to {}", settings.hub_url);
        pump(&shared, epoch, ws).await;
        shared.clear_sender(epoch);

        match reconnect(&shared, epoch, &url, &settings.reconnect).await {
            Some(next) => ws = next,
            None => {
                shared.publish(epoch, ConnectionState::Disconnected);
                return;
            }
        }
    }
}

async fn reconnect(
    shared: &Shared,
    epoch: u64,
    url: &str,
    policy: &ReconnectConfig,
) -> Option<WsStream> {
    let mut attempt = 0u32;
    while !policy.exhausted(attempt) {
        let reconnecting = ConnectionState::Reconnecting {
            attempt: attempt + 1,
        };
        if !shared.publish(epoch, reconnecting) {
            return None;
        }
        let delay = policy.delay_for_attempt(attempt);
        crate::log_info!(
            "Reconnecting push channel in {}ms (attempt {})",
            delay,
            attempt + 1
        );
        tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        attempt += 1;

        match handshake(url).await {
            Ok(ws) => return Some(ws),
            Err(e) => crate::log_warn!("reconnect attempt {} failed: {}", attempt, e),
        }
    }
    crate::log_error!("push channel gave up after {} reconnect attempts", attempt);
    None
}

/// Shuttle frames until the connection drops or the sender is taken.
async fn pump(shared: &Shared, epoch: u64, ws: WsStream) {
    let (mut write, mut read) = ws.split();
    let (tx, mut rx) = unbounded::<ClientFrame>();

    let groups = lock(&shared.groups).clone();
    for group in groups {
        let _ = tx.unbounded_send(ClientFrame::join_group(&group));
    }
    if !shared.install_sender(epoch, tx) {
        return;
    }

    loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => handle_text(shared, &text),
                Some(Ok(Message::Close(_))) | None => {
                    crate::log_info!("push channel closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    crate::log_error!("push channel read error: {}", e);
                    break;
                }
            },
            outgoing = rx.next() => match outgoing {
                Some(frame) => match serde_json::to_string(&frame) {
                    Ok(json) => {
                        crate::log_debug!("push channel send: {}", json);
                        if let Err(e) = write.send(Message::Text(json.into())).await {
                            crate::log_error!("push channel send failed: {}", e);
                            break;
                        }
                    }
                    Err(e) => crate::log_error!("Serialize failed: {}", e),
                },
                None => break,
            },
        }
    }
}

fn handle_text(shared: &Shared, text: &str) {
    match serde_json::from_str::<ServerFrame>(text) {
        Ok(frame) => {
            crate::log_debug!("push event '{}'", frame.event);
            shared.router.dispatch(&frame.event, frame.payload);
        }
        Err(e) => crate::log_warn!("unparseable push frame: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(hub_url: &str) -> ConnectionSettings {
        ConnectionSettings {
            hub_url: hub_url.to_string(),
            warmup: Duration::ZERO,
            retry_delay: Duration::ZERO,
            reconnect: ReconnectConfig::default(),
        }
    }

    #[test]
    fn token_is_query_encoded() {
        let url = hub_url_with_token("ws://localhost:5000/hubs/access", "a b+c").unwrap();
        assert_eq!(url, "ws://localhost:5000/hubs/access?access_token=a+b%2Bc");
        assert!(matches!(
            hub_url_with_token("not a url", "t"),
            Err(ConnectionError::Url(_))
        ));
    }

    #[test]
    fn failed_counts_as_idle() {
        assert!(ConnectionState::Disconnected.is_idle());
        assert!(ConnectionState::Failed { reason: "x".into() }.is_idle());
        assert!(!ConnectionState::Reconnecting { attempt: 1 }.is_idle());
        assert!(ConnectionState::Reconnecting { attempt: 1 }.is_connecting());
    }

    #[tokio::test]
    async fn blank_credential_is_rejected() {
        let manager = ConnectionManager::new(settings("ws://127.0.0.1:1/hub"), EventRouter::new());
        assert_eq!(manager.start("  "), Err(ConnectionError::NoCredential));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn stop_is_safe_before_start() {
        let manager = ConnectionManager::new(settings("ws://127.0.0.1:1/hub"), EventRouter::new());
        manager.stop();
        manager.stop();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(
            manager.invoke(ClientFrame::join_group("Admins")),
            Err(ConnectionError::NotConnected)
        );
    }

    #[tokio::test]
    async fn stopped_task_cannot_overwrite_state() {
        let mut slow = settings("ws://127.0.0.1:1/hub");
        slow.warmup = Duration::from_secs(60);
        let manager = ConnectionManager::new(slow, EventRouter::new());
        manager.start("token").unwrap();
        let started = manager.shared.current_epoch();
        manager.stop();

        assert!(!manager.shared.publish(started, ConnectionState::Connected));
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        let (tx, _rx) = unbounded::<ClientFrame>();
        assert!(!manager.shared.install_sender(started, tx));
        assert_eq!(
            manager.invoke(ClientFrame::join_group("Admins")),
            Err(ConnectionError::NotConnected)
        );

        manager.start("token").unwrap();
        let restarted = manager.shared.current_epoch();
        assert_ne!(restarted, started);
        assert!(manager.shared.publish(restarted, ConnectionState::Connecting));
        assert_eq!(manager.state(), ConnectionState::Connecting);
        manager.stop();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }
}

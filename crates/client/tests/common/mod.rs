//! Shared fixtures: an in-memory card API and a local push hub.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use futures_util::{SinkExt, StreamExt};
use labgate_client::ResourceApi;
use labgate_shared::{ApiError, Card, CardStatus};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

pub fn card(id: i64, status: CardStatus) -> Card {
    Card {
        id,
        uid: format!("04{id:06X}"),
        user_id: None,
        user_name: Some(format!("user {id}")),
        status,
        created_at: NaiveDate::from_ymd_opt(2024, 5, 10)
            .and_then(|d| d.and_hms_opt(8, 0, 0))
            .unwrap(),
    }
}

pub fn cards(n: i64) -> Vec<Card> {
    (1..=n).map(|id| card(id, CardStatus::Active)).collect()
}

/// Card endpoint backed by a vector. `list` can be gated so a test decides
/// when (and with what) each fetch completes.
#[derive(Default)]
pub struct CardApi {
    pub records: Mutex<Vec<Card>>,
    pub rejected: Mutex<HashSet<i64>>,
    pub deletes: Mutex<Vec<i64>>,
    pub bulk_deletes: AtomicUsize,
    pub lists: AtomicUsize,
    gates: Mutex<VecDeque<oneshot::Receiver<Vec<Card>>>>,
}

impl CardApi {
    pub fn with(records: Vec<Card>) -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(records),
            ..Default::default()
        })
    }

    /// The next `list` call waits for the returned sender.
    pub fn gate(&self) -> oneshot::Sender<Vec<Card>> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().push_back(rx);
        tx
    }
}

#[async_trait]
impl ResourceApi<Card> for CardApi {
    async fn list(&self) -> Result<Vec<Card>, ApiError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        let gate = self.gates.lock().unwrap().pop_front();
        match gate {
            Some(rx) => rx.await.map_err(|_| ApiError::Network("gate dropped".into())),
            None => Ok(self.records.lock().unwrap().clone()),
        }
    }

    async fn get(&self, id: &i64) -> Result<Card, ApiError> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == *id)
            .cloned()
            .ok_or(ApiError::MissingData)
    }

    async fn create(&self, body: &Value) -> Result<Card, ApiError> {
        let card: Card =
            serde_json::from_value(body.clone()).map_err(|e| ApiError::Deserialize(e.to_string()))?;
        self.records.lock().unwrap().push(card.clone());
        Ok(card)
    }

    async fn update(&self, id: &i64, _body: &Value) -> Result<Option<Card>, ApiError> {
        self.get(id).await.map(Some)
    }

    async fn delete(&self, id: &i64) -> Result<(), ApiError> {
        self.deletes.lock().unwrap().push(*id);
        if self.rejected.lock().unwrap().contains(id) {
            return Err(ApiError::Rejected {
                message: "card is in use".into(),
            });
        }
        self.records.lock().unwrap().retain(|c| c.id != *id);
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), ApiError> {
        self.bulk_deletes.fetch_add(1, Ordering::SeqCst);
        self.records.lock().unwrap().clear();
        Ok(())
    }
}

/// A local WebSocket hub that records what clients send and pushes what the
/// test tells it to.
pub struct Hub {
    pub url: String,
    pub uris: mpsc::UnboundedReceiver<String>,
    pub frames: mpsc::UnboundedReceiver<String>,
    pub accepted: Arc<AtomicUsize>,
    push: broadcast::Sender<String>,
    kick: broadcast::Sender<()>,
}

impl Hub {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (uri_tx, uris) = mpsc::unbounded_channel();
        let (frame_tx, frames) = mpsc::unbounded_channel();
        let (push, _) = broadcast::channel::<String>(16);
        let (kick, _) = broadcast::channel::<()>(4);
        let accepted = Arc::new(AtomicUsize::new(0));

        let (push_src, kick_src, counter) = (push.clone(), kick.clone(), accepted.clone());
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let uri_tx = uri_tx.clone();
                let frame_tx = frame_tx.clone();
                let mut push_rx = push_src.subscribe();
                let mut kick_rx = kick_src.subscribe();

                tokio::spawn(async move {
                    let record_uri = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                        let _ = uri_tx.send(req.uri().to_string());
                        Ok(resp)
                    };
                    let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, record_uri).await else {
                        return;
                    };
                    let (mut write, mut read) = ws.split();
                    loop {
                        tokio::select! {
                            msg = read.next() => match msg {
                                Some(Ok(Message::Text(text))) => {
                                    let _ = frame_tx.send(text.as_str().to_owned());
                                }
                                Some(Ok(_)) => {}
                                _ => break,
                            },
                            Ok(json) = push_rx.recv() => {
                                if write.send(Message::Text(json.into())).await.is_err() {
                                    break;
                                }
                            }
                            _ = kick_rx.recv() => {
                                let _ = write.send(Message::Close(None)).await;
                                break;
                            }
                        }
                    }
                });
            }
        });

        Self {
            url: format!("ws://127.0.0.1:{port}/hubs/access"),
            uris,
            frames,
            accepted,
            push,
            kick,
        }
    }

    /// Send a raw frame to every connected client.
    pub fn push(&self, frame: Value) {
        let _ = self.push.send(frame.to_string());
    }

    /// Close every live connection from the server side.
    pub fn kick(&self) {
        let _ = self.kick.send(());
    }

    pub async fn next_frame(&mut self) -> Value {
        let text = within(self.frames.recv()).await.expect("hub channel closed");
        serde_json::from_str(&text).unwrap()
    }

    pub async fn next_uri(&mut self) -> String {
        within(self.uris.recv()).await.expect("hub channel closed")
    }
}

/// Await `fut` for at most two seconds.
pub async fn within<T>(fut: impl std::future::Future<Output = T>) -> T {
    timeout(Duration::from_secs(2), fut)
        .await
        .expect("timed out waiting")
}

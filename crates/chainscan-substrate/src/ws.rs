//! WebSocket JSON-RPC transport.
//!
//! A background task owns the socket. Callers send requests through a
//! command channel and wait on a oneshot for the matching response. There is
//! no reconnect: when the socket drops, every pending request fails and the
//! transport stays closed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::SubstrateError;
use crate::rpc::{JsonRpcRequest, JsonRpcResponse};

type Reply = oneshot::Sender<Result<JsonRpcResponse, SubstrateError>>;
type PendingMap = HashMap<u64, Reply>;

/// Timeouts for the transport.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Upper bound on the TCP + WebSocket handshake.
    pub connect_timeout: Duration,
    /// Upper bound on a single request. `None` waits for as long as the
    /// socket stays open.
    pub request_timeout: Option<Duration>,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: None,
        }
    }
}

/// Command sent from callers to the background WS task.
enum WsCommand {
    Send { req: JsonRpcRequest, tx: Reply },
    /// The caller stopped waiting for this request id.
    Cancel(u64),
    Close,
}

/// WebSocket JSON-RPC transport to one node.
pub struct WsTransport {
    url: String,
    cmd_tx: mpsc::UnboundedSender<WsCommand>,
    closed: Arc<AtomicBool>,
    request_timeout: Option<Duration>,
    next_id: AtomicU64,
}

impl WsTransport {
    /// Connect to `url` and start the background task.
    ///
    /// Fails with [`SubstrateError::Timeout`] if the handshake does not
    /// finish within `config.connect_timeout`.
    pub async fn connect(url: &str, config: &WsConfig) -> Result<Self, SubstrateError> {
        tracing::info!(url, "connecting via WebSocket");
        let (ws_stream, _) = time::timeout(
            config.connect_timeout,
            tokio_tungstenite::connect_async(url),
        )
        .await
        .map_err(|_| SubstrateError::Timeout {
            ms: config.connect_timeout.as_millis() as u64,
        })?
        .map_err(|e| SubstrateError::WebSocket(e.to_string()))?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<WsCommand>();
        let closed = Arc::new(AtomicBool::new(false));
        tokio::spawn(ws_task(url.to_string(), ws_stream, cmd_rx, closed.clone()));

        Ok(Self {
            url: url.to_string(),
            cmd_tx,
            closed,
            request_timeout: config.request_timeout,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns `true` once the socket is gone, locally closed or not.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Send a request and wait for its raw response.
    pub async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, SubstrateError> {
        if self.is_closed() {
            return Err(SubstrateError::Closed);
        }
        let id = req.id;
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(WsCommand::Send { req, tx })
            .map_err(|_| SubstrateError::Closed)?;

        let reply = match self.request_timeout {
            Some(limit) => match time::timeout(limit, rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    let _ = self.cmd_tx.send(WsCommand::Cancel(id));
                    return Err(SubstrateError::Timeout {
                        ms: limit.as_millis() as u64,
                    });
                }
            },
            None => rx.await,
        };
        reply.map_err(|_| SubstrateError::Closed)?
    }

    /// Call `method` and deserialize its result. A `null` result
    /// deserializes into `Option::None` when `T` is an `Option`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, SubstrateError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let resp = self.send(JsonRpcRequest::new(id, method, params)).await?;
        let result = resp.into_result().map_err(SubstrateError::Rpc)?;
        Ok(serde_json::from_value(result)?)
    }

    /// Close the socket. Idempotent; in-flight requests fail with
    /// [`SubstrateError::Closed`].
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.cmd_tx.send(WsCommand::Close);
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("url", &self.url)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Background task that owns the WebSocket connection.
async fn ws_task(
    url: String,
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut cmd_rx: mpsc::UnboundedReceiver<WsCommand>,
    closed: Arc<AtomicBool>,
) {
    let (mut sink, mut stream) = ws_stream.split();
    let mut pending = PendingMap::new();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    None | Some(WsCommand::Close) => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                    Some(WsCommand::Cancel(id)) => {
                        pending.remove(&id);
                    }
                    Some(WsCommand::Send { req, tx }) => {
                        prune_abandoned(&mut pending);
                        let msg = match serde_json::to_string(&req) {
                            Ok(msg) => msg,
                            Err(e) => {
                                let _ = tx.send(Err(e.into()));
                                continue;
                            }
                        };
                        pending.insert(req.id, tx);
                        if let Err(e) = sink.send(Message::Text(msg.into())).await {
                            tracing::warn!(url = %url, error = %e, "WS send failed");
                            break;
                        }
                    }
                }
            }
            msg = stream.next() => {
                match msg {
                    None => break,
                    Some(Err(e)) => {
                        tracing::warn!(url = %url, error = %e, "WS receive error");
                        break;
                    }
                    Some(Ok(Message::Text(text))) => handle_message(text.as_str(), &mut pending),
                    Some(Ok(Message::Close(_))) => break,
                    _ => {}
                }
            }
        }
    }

    closed.store(true, Ordering::Release);
    if !pending.is_empty() {
        tracing::debug!(url = %url, pending = pending.len(), "failing in-flight requests");
    }
    for (_, tx) in pending.drain() {
        let _ = tx.send(Err(SubstrateError::Closed));
    }
    tracing::debug!(url = %url, "WS task finished");
}

/// Drop entries whose caller went away without waiting for the response.
fn prune_abandoned(pending: &mut PendingMap) {
    let before = pending.len();
    pending.retain(|_, tx| !tx.is_closed());
    if pending.len() < before {
        tracing::debug!(pruned = before - pending.len(), "dropped abandoned requests");
    }
}

fn handle_message(text: &str, pending: &mut PendingMap) {
    let resp = match serde_json::from_str::<JsonRpcResponse>(text) {
        Ok(resp) => resp,
        Err(e) => {
            tracing::debug!(error = %e, "ignoring unparseable WS message");
            return;
        }
    };
    // notifications carry no id
    let Some(id) = resp.id else {
        return;
    };
    if let Some(tx) = pending.remove(&id) {
        let _ = tx.send(Ok(resp));
    }
}

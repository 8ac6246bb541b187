//! Per-space WebSocket sessions.
//!
//! Each inbound text message is one query. Its results go out as one text
//! message per record followed by a single [`EOF`] message; the next query
//! is not read until that sentinel has been queued, so results of two
//! queries on one connection never interleave.
//!
//! Outbound messages pass through an [`Outbox`] drained by a writer task.
//! The outbox counts queued-but-unsent bytes; above the configured ceiling
//! the session waits for the writer to drain, and closes the connection if
//! it does not drain in time.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::WebSocketUpgrade;
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Notify};

use crate::error::{HubError, HubResult};

use super::HubState;

/// Terminal sentinel sent after the last record of each query.
pub const EOF: &str = "eof";

/// Prefix of the single record sent when a query fails.
pub const ERROR_PREFIX: &str = "error: ";

pub(crate) async fn upgrade(ws: WebSocketUpgrade, state: Arc<HubState>, id: String) -> Response {
    let max_payload = state.config.max_payload;
    ws.max_message_size(max_payload)
        .max_frame_size(max_payload)
        .on_upgrade(move |socket| run_session(socket, state, id))
}

/// Byte-counting send queue in front of the socket writer.
#[derive(Debug)]
struct Outbox {
    tx: mpsc::UnboundedSender<Message>,
    buffered: Arc<AtomicUsize>,
    drained: Arc<Notify>,
    limit: usize,
    drain_timeout: Duration,
}

impl Outbox {
    fn buffered(&self) -> usize {
        self.buffered.load(Ordering::Acquire)
    }

    /// Queue one text message, first waiting out any backpressure.
    async fn send(&self, text: String) -> HubResult<()> {
        while self.buffered() > self.limit {
            // Register before re-checking so a drain between the two is seen.
            let drained = self.drained.notified();
            if self.buffered() <= self.limit {
                break;
            }
            if self.tx.is_closed() {
                return Err(closed());
            }
            tracing::debug!(buffered = self.buffered(), limit = self.limit, "backpressure: pausing results");
            if tokio::time::timeout(self.drain_timeout, drained).await.is_err() {
                return Err(HubError::Transport {
                    message: format!(
                        "{} buffered bytes did not drain within {:?}",
                        self.buffered(),
                        self.drain_timeout
                    ),
                });
            }
        }

        self.buffered.fetch_add(text.len(), Ordering::AcqRel);
        self.tx.send(Message::Text(text.into())).map_err(|_| closed())
    }
}

fn closed() -> HubError {
    HubError::Transport {
        message: "connection closed".into(),
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
    buffered: Arc<AtomicUsize>,
    drained: Arc<Notify>,
) {
    while let Some(msg) = rx.recv().await {
        let len = match &msg {
            Message::Text(text) => text.as_str().len(),
            _ => 0,
        };
        let sent = sink.send(msg).await;
        buffered.fetch_sub(len, Ordering::AcqRel);
        drained.notify_waiters();
        if let Err(e) = sent {
            tracing::debug!(error = %e, "socket write failed");
            break;
        }
    }
    rx.close();
    drained.notify_waiters();
    let _ = sink.close().await;
}

async fn run_session(socket: WebSocket, state: Arc<HubState>, id: String) {
    tracing::info!(space = %id, "Connected to atomspace");

    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();
    let outbox = Outbox {
        tx,
        buffered: Arc::new(AtomicUsize::new(0)),
        drained: Arc::new(Notify::new()),
        limit: state.config.max_backpressure,
        drain_timeout: state.config.drain_timeout,
    };
    let mut writer = tokio::spawn(write_loop(
        sink,
        rx,
        Arc::clone(&outbox.buffered),
        Arc::clone(&outbox.drained),
    ));

    loop {
        let next = match state.config.idle_timeout {
            Some(idle) => match tokio::time::timeout(idle, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    tracing::info!(space = %id, "idle timeout");
                    break;
                }
            },
            None => stream.next().await,
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                if let Err(e) = answer(&state, &id, text.as_str(), &outbox).await {
                    tracing::warn!(space = %id, error = %e, "closing connection");
                    break;
                }
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::debug!(space = %id, error = %e, "socket read failed");
                break;
            }
        }
    }

    // Dropping the outbox ends the writer once it has flushed. A peer that
    // stops reading gets the drain timeout, then the socket is dropped.
    let drain_timeout = outbox.drain_timeout;
    drop(outbox);
    if tokio::time::timeout(drain_timeout, &mut writer).await.is_err() {
        tracing::warn!(space = %id, "writer did not drain; dropping connection");
        writer.abort();
    }
    tracing::info!(space = %id, "Connection closed to atomspace");
}

/// Run one query and queue its records plus the sentinel.
async fn answer(state: &Arc<HubState>, id: &str, text: &str, outbox: &Outbox) -> HubResult<()> {
    let records = match dispatch(state, id, text).await {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(space = %id, error = %e, "query failed");
            vec![format!("{ERROR_PREFIX}{e}")]
        }
    };
    for record in records {
        outbox.send(record).await?;
    }
    outbox.send(EOF.to_string()).await
}

/// Execute on the blocking pool so a deferred wait never stalls a runtime
/// worker. If the connection goes away meanwhile, the query still runs to
/// completion and its results are dropped.
async fn dispatch(state: &Arc<HubState>, id: &str, text: &str) -> HubResult<Vec<String>> {
    let registry = Arc::clone(&state.registry);
    let wait = state.config.query_timeout;
    let id = id.to_string();
    let text = text.to_string();
    tokio::task::spawn_blocking(move || registry.execute(&id, &text, wait))
        .await
        .map_err(|e| HubError::Transport {
            message: format!("query task failed: {e}"),
        })?
}

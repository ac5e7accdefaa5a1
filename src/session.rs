//! Provider session: the read loop, writer task, and `execute_command`
//! entry point used by the HTTP bridge handler.
//!
//! Two tasks per session: the read loop (this function) is the only reader
//! of the WebSocket, and a dedicated writer task owns the write half and
//! drains an `mpsc` queue. Both register/ping replies (from the read loop)
//! and `execute_command`'s outbound frames enqueue onto that same channel,
//! so the socket is never written from two places at once.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::RelayError,
    obs,
    protocol::{Frame, RegisterPayload},
    registry::Registry,
};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

pub struct ProviderSession {
    registered: AtomicBool,
    pending: Mutex<HashMap<u64, oneshot::Sender<Value>>>,
    next_id: AtomicU64,
    outbound: mpsc::UnboundedSender<Message>,
    cancel: CancellationToken,
}

impl ProviderSession {
    fn new(outbound: mpsc::UnboundedSender<Message>, cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            registered: AtomicBool::new(false),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            outbound,
            cancel,
        })
    }

    /// A session with no backing IO task, for registry unit tests that only
    /// care about identity and the registered flag.
    #[cfg(test)]
    pub fn new_detached() -> Arc<Self> {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self::new(tx, CancellationToken::new())
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// Force this session's transport closed. Wakes the read loop with EOF,
    /// which runs cleanup; for an evicted incumbent, `Registry::unregister`
    /// finds the entry already repointed at the newer session and no-ops.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    fn enqueue(&self, frame: &Frame) -> Result<(), RelayError> {
        let text = serde_json::to_string(frame)
            .map_err(|e| RelayError::Internal(format!("encode frame: {e}")))?;
        self.outbound
            .send(Message::Text(text))
            .map_err(|_| RelayError::Internal("session writer has shut down".into()))
    }

    /// Send `command_name` to the provider and wait for its `response`.
    ///
    /// Returns `Ok(None)` for an unregistered session. The registry never
    /// hands out a session before it registers, so this is defensive, but
    /// the behavior (and the HTTP handler forwarding it as an empty 200) is
    /// preserved deliberately — see DESIGN.md's Open Question resolutions.
    pub async fn execute_command(&self, command_name: &str) -> Result<Option<Value>, RelayError> {
        self.execute_command_with_timeout(command_name, COMMAND_TIMEOUT).await
    }

    /// Same contract as [`Self::execute_command`] with an injectable deadline,
    /// so the timeout-and-close path can be exercised in tests without an
    /// actual 60-second wait.
    async fn execute_command_with_timeout(
        &self,
        command_name: &str,
        timeout: Duration,
    ) -> Result<Option<Value>, RelayError> {
        if !self.is_registered() {
            return Ok(None);
        }

        // Counter starts at 1 and is incremented *before* each outgoing
        // command, so the first command sent carries id=2.
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if let Err(e) = self.enqueue(&Frame::new(command_name, id, None)) {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        tokio::select! {
            result = rx => result
                .map(Some)
                .map_err(|_| RelayError::Internal("session closed before responding".into())),
            _ = tokio::time::sleep(timeout) => {
                self.pending.lock().await.remove(&id);
                self.close();
                Err(RelayError::Timeout)
            }
        }
    }
}

/// Drive one provider WebSocket to completion: spawn the writer task, run
/// the read loop, and clean up the registry entry on exit.
///
/// `shutdown` is the process-wide cancellation token; cancelling it closes
/// this session's transport along with every other live one.
pub async fn run(ws: WebSocket, registry: Arc<Registry>, shutdown: CancellationToken) {
    let (mut sink, mut stream) = ws.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
    let cancel = shutdown.child_token();
    let session = ProviderSession::new(outbound_tx, cancel.clone());

    let writer_cancel = cancel.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_cancel.cancelled() => break,
                maybe_msg = outbound_rx.recv() => {
                    match maybe_msg {
                        Some(msg) => {
                            if sink.send(msg).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
        // Cancellation can race a frame that was enqueued just before it
        // (e.g. the "invalid token" reply sent right before the read loop
        // exits and cancels). Flush anything already queued so the peer
        // sees it before the socket closes.
        while let Ok(msg) = outbound_rx.try_recv() {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    obs::provider_connected();
    let mut bound_code: Option<String> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_text_frame(&text, &session, &registry, &mut bound_code).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Binary/ping/pong frames carry no RPC meaning here.
                    }
                    Some(Err(e)) => {
                        debug!(err = %e, "provider websocket read error");
                        break;
                    }
                }
            }
        }
    }

    cancel.cancel();
    let _ = writer.await;
    obs::provider_disconnected();

    if let Some(code) = bound_code {
        registry.unregister(&code, &session).await;
        info!(code = %code, "provider session ended");
    }
    // Any caller still awaiting a response sees its oneshot dropped with the
    // session — `execute_command` observes `RelayError::Internal`, not a hang.
}

/// Handle one inbound text frame. Returns `false` when the read loop should
/// exit (protocol fault or failed registration).
async fn handle_text_frame(
    text: &str,
    session: &Arc<ProviderSession>,
    registry: &Arc<Registry>,
    bound_code: &mut Option<String>,
) -> bool {
    let incoming: Frame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            debug!(err = %e, "malformed frame, closing session");
            return false;
        }
    };

    match incoming.command.as_str() {
        "register" => {
            let payload: RegisterPayload = incoming
                .data
                .clone()
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_default();

            match registry.register(payload, session.clone()).await {
                Ok(response) => {
                    let data = serde_json::to_value(&response).unwrap_or_default();
                    *bound_code = Some(response.code.clone());
                    session.registered.store(true, Ordering::Release);
                    let _ = session.enqueue(&Frame::response(incoming.id, data));
                    true
                }
                Err(_) => {
                    let _ = session.enqueue(&Frame::response(
                        incoming.id,
                        serde_json::json!({ "error": "invalid token" }),
                    ));
                    false
                }
            }
        }
        "ping" => {
            let _ = session.enqueue(&Frame::pong(incoming.id));
            true
        }
        "response" => {
            let data = incoming.data.clone().unwrap_or(Value::Null);
            let waiter = session.pending.lock().await.remove(&incoming.id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(data);
                }
                None => warn!(id = incoming.id, "no request waiter for response"),
            }
            true
        }
        other => {
            debug!(command = other, "unknown command, ignoring");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered_session() -> (Arc<ProviderSession>, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = ProviderSession::new(tx, CancellationToken::new());
        session.registered.store(true, Ordering::Release);
        (session, rx)
    }

    #[tokio::test]
    async fn unregistered_session_returns_none() {
        let session = ProviderSession::new_detached();
        let result = session.execute_command("ping-app").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn response_frame_resolves_the_matching_waiter() {
        let (session, mut outbound) = registered_session();

        let session_for_call = session.clone();
        let call = tokio::spawn(async move {
            session_for_call.execute_command_with_timeout("ping-app", Duration::from_secs(5)).await
        });

        // Drain the outbound frame execute_command enqueued, extract its id,
        // and feed back the response exactly as the read loop would.
        let Message::Text(text) = outbound.recv().await.unwrap() else { panic!("expected text frame") };
        let sent: Frame = serde_json::from_str(&text).unwrap();
        assert_eq!(sent.id, 2, "counter starts at 1 and is pre-incremented, so the first command is id=2");

        let waiter = session.pending.lock().await.remove(&sent.id).unwrap();
        waiter.send(serde_json::json!({"ok": true})).unwrap();

        let result = call.await.unwrap().unwrap();
        assert_eq!(result, Some(serde_json::json!({"ok": true})));
    }

    #[tokio::test]
    async fn timeout_closes_the_session_and_drops_the_pending_waiter() {
        let (session, mut outbound) = registered_session();

        let result = session
            .execute_command_with_timeout("ping-app", Duration::from_millis(10))
            .await;

        assert!(matches!(result, Err(RelayError::Timeout)));
        assert!(session.cancel.is_cancelled());
        assert!(session.pending.lock().await.is_empty());
        assert!(outbound.recv().await.is_some(), "the request frame was still sent before timing out");
    }
}

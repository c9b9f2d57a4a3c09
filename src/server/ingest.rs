//! WebSocket ingestion endpoint
//!
//! Protocol per connection:
//!
//! ```text
//!   client                          server
//!     │── text: <session id> ──────────►│  register, start worker
//!     │◄────────── REGISTRATION_SUCCESS ─│
//!     │── text: PING ──────────────────►│
//!     │◄──────────────────────── PONG ───│
//!     │── binary: JPEG ────────────────►│  decode → input queue
//!     │── text: DISCONNECT ────────────►│  teardown
//! ```
//!
//! Whatever ends the connection, the session is torn down through
//! [`SessionRegistry::terminate`](crate::registry::SessionRegistry::terminate).

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures_util::FutureExt;

use super::AppState;
use crate::error::{FrameError, HandshakeError};
use crate::media::Frame;
use crate::queue::PutOutcome;
use crate::session::{Session, TeardownReason};
use crate::worker::Worker;

/// Acknowledgement sent after a successful registration
pub const REGISTRATION_ACK: &str = "REGISTRATION_SUCCESS";

/// Longest accepted session id, in bytes
pub const MAX_SESSION_ID_LEN: usize = 128;

const PING: &str = "PING";
const PONG: &str = "PONG";
const DISCONNECT: &str = "DISCONNECT";

/// Build the ingestion router
pub fn router(state: AppState) -> Router {
    Router::new().route("/", get(ws_upgrade)).with_state(state)
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let limit = state.config.max_message_size;
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| handle_connection(socket, peer, state))
}

/// Check a client-supplied session id
pub fn validate_session_id(id: &str) -> Result<(), HandshakeError> {
    if id.is_empty() || id.len() > MAX_SESSION_ID_LEN || id.chars().any(char::is_control) {
        return Err(HandshakeError::InvalidId(id.chars().take(32).collect()));
    }
    Ok(())
}

/// Wait for the session id message
async fn handshake(socket: &mut WebSocket, timeout: Duration) -> Result<String, HandshakeError> {
    let first_message = async {
        loop {
            match socket.recv().await {
                None | Some(Ok(Message::Close(_))) => return Err(HandshakeError::Closed),
                Some(Err(e)) => return Err(HandshakeError::Transport(e)),
                Some(Ok(Message::Text(text))) => {
                    let id = text.as_str();
                    validate_session_id(id)?;
                    return Ok(id.to_string());
                }
                Some(Ok(Message::Binary(_))) => {
                    return Err(HandshakeError::UnexpectedMessage("binary"));
                }
                // Transport-level keepalives before registration
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            }
        }
    };

    tokio::time::timeout(timeout, first_message)
        .await
        .map_err(|_| HandshakeError::Timeout(timeout))?
}

async fn handle_connection(mut socket: WebSocket, peer: SocketAddr, state: AppState) {
    tracing::debug!(peer = %peer, "Camera connected");

    let id = match handshake(&mut socket, state.config.handshake_timeout).await {
        Ok(id) => id,
        Err(e) => {
            tracing::debug!(peer = %peer, error = %e, "Handshake failed");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let session = Session::new(id, state.config.input_capacity, state.config.output_capacity);
    state.registry.register(Arc::clone(&session)).await;
    Worker::spawn(
        Arc::clone(&session),
        state.collaborators.clone(),
        state.config.worker_settings(),
    );

    tracing::info!(
        session = %session.id(),
        instance = session.instance(),
        peer = %peer,
        "Camera registered"
    );

    let reason = if socket.send(Message::Text(REGISTRATION_ACK.into())).await.is_err() {
        TeardownReason::ConnectionLost
    } else {
        match AssertUnwindSafe(serve_session(&mut socket, &session, &state))
            .catch_unwind()
            .await
        {
            Ok(reason) => reason,
            Err(_) => {
                tracing::error!(
                    session = %session.id(),
                    instance = session.instance(),
                    "Connection handler panicked"
                );
                TeardownReason::ConnectionLost
            }
        }
    };

    state.registry.terminate(&session, reason).await;
    let _ = socket.send(Message::Close(None)).await;

    tracing::debug!(
        session = %session.id(),
        instance = session.instance(),
        peer = %peer,
        reason = %reason,
        "Camera connection closed"
    );
}

/// Connection loop after registration
async fn serve_session(
    socket: &mut WebSocket,
    session: &Arc<Session>,
    state: &AppState,
) -> TeardownReason {
    loop {
        let message = tokio::select! {
            // Stopped elsewhere; the stopping call recorded why
            _ = session.cancelled() => {
                return session.teardown_reason().unwrap_or(TeardownReason::Replaced);
            }
            _ = state.shutdown.cancelled() => return TeardownReason::Shutdown,
            message = socket.recv() => message,
        };

        match message {
            None => return TeardownReason::ConnectionLost,
            Some(Err(e)) => {
                tracing::debug!(session = %session.id(), error = %e, "WebSocket error");
                return TeardownReason::ConnectionLost;
            }
            Some(Ok(Message::Close(_))) => return TeardownReason::Disconnect,
            Some(Ok(Message::Text(text))) => {
                session.touch();
                match text.as_str() {
                    PING => {
                        if socket.send(Message::Text(PONG.into())).await.is_err() {
                            return TeardownReason::ConnectionLost;
                        }
                    }
                    DISCONNECT => return TeardownReason::Disconnect,
                    other => {
                        tracing::debug!(
                            session = %session.id(),
                            len = other.len(),
                            "Ignoring unknown text message"
                        );
                    }
                }
            }
            Some(Ok(Message::Binary(data))) => accept_frame(data, session, state).await,
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => session.touch(),
        }
    }
}

/// Decode one binary payload and queue it for the worker
async fn accept_frame(data: Bytes, session: &Session, state: &AppState) {
    let seq = session.stats.record_received();
    let min_len = state.config.min_frame_bytes;

    let decoded = tokio::task::spawn_blocking(move || Frame::decode(&data, min_len))
        .await
        .unwrap_or_else(|e| Err(FrameError::Decode(e.to_string())));

    let image = match decoded {
        Ok(image) => image,
        Err(e) => {
            session.stats.record_rejected();
            tracing::warn!(session = %session.id(), seq, error = %e, "Frame rejected");
            return;
        }
    };

    // This instance only; a successor under the same id is not refreshed
    session.touch();

    match session.input.try_put(Frame::new(image, seq)) {
        PutOutcome::Stored => {}
        PutOutcome::Evicted => {
            session.stats.record_input_eviction();
            tracing::trace!(session = %session.id(), seq, "Input full, oldest frame dropped");
        }
        PutOutcome::Closed => {
            tracing::trace!(session = %session.id(), seq, "Session stopping, frame discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::frame::tests::sample_jpeg;
    use crate::registry::SessionRegistry;
    use crate::server::ServerConfig;
    use crate::worker::Collaborators;
    use tokio_util::sync::CancellationToken;

    fn app_state() -> AppState {
        AppState {
            registry: Arc::new(SessionRegistry::new()),
            config: Arc::new(ServerConfig::default()),
            collaborators: Collaborators::default(),
            shutdown: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_late_frame_on_replaced_session_leaves_successor_idle() {
        let state = app_state();
        let old = Session::new("cam-1", 5, 5);
        let new = Session::new("cam-1", 5, 5);
        state.registry.register(Arc::clone(&old)).await;
        state.registry.register(Arc::clone(&new)).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        accept_frame(sample_jpeg(64, 48), &old, &state).await;

        assert_eq!(old.stats.snapshot().frames_received, 1);
        assert!(old.idle_for() < Duration::from_millis(50));
        assert!(new.idle_for() >= Duration::from_millis(50));
        // Input was closed by the replacement
        assert!(old.input.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_frame_is_not_activity() {
        let state = app_state();
        let session = Session::new("cam-1", 5, 5);
        state.registry.register(Arc::clone(&session)).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        accept_frame(Bytes::from_static(b"tiny"), &session, &state).await;

        let stats = session.stats.snapshot();
        assert_eq!(stats.frames_received, 1);
        assert_eq!(stats.frames_rejected, 1);
        assert!(session.idle_for() >= Duration::from_millis(50));
        assert!(session.input.is_empty());
    }

    #[test]
    fn test_validate_session_id() {
        assert!(validate_session_id("cam-1").is_ok());
        assert!(validate_session_id(&"x".repeat(MAX_SESSION_ID_LEN)).is_ok());

        assert!(matches!(
            validate_session_id(""),
            Err(HandshakeError::InvalidId(_))
        ));
        assert!(validate_session_id(&"x".repeat(MAX_SESSION_ID_LEN + 1)).is_err());
        assert!(validate_session_id("cam\n1").is_err());
    }
}

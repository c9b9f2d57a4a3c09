//! HTTP output relay
//!
//! Routes:
//! - `GET /` plain-text banner
//! - `GET /clients` registered session ids
//! - `GET /status/{id}` session status
//! - `GET /video_feed/{id}` annotated frames as `multipart/x-mixed-replace`
//!
//! Each video feed is a pull loop over the session's output queue. While the
//! camera is quiet the viewer gets a placeholder frame every `relay_poll`, so
//! browsers keep the stream open; after `stall_timeout` without a real frame
//! the stream ends.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use bytes::{BufMut, Bytes, BytesMut};
use serde_json::json;
use tokio::time::Instant;

use super::AppState;
use crate::media::{encode_jpeg, placeholder};
use crate::queue::Recv;
use crate::session::Session;

/// Multipart boundary token
pub const BOUNDARY: &str = "frame";

/// Content type of the video feed response
pub const VIDEO_FEED_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Build the relay router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/clients", get(list_clients))
        .route("/status/{id}", get(session_status))
        .route("/video_feed/{id}", get(video_feed))
        .with_state(state)
}

/// Wrap one JPEG as a multipart part
pub fn multipart_chunk(jpeg: &[u8]) -> Bytes {
    let mut chunk = BytesMut::with_capacity(jpeg.len() + 64);
    chunk.put_slice(b"--");
    chunk.put_slice(BOUNDARY.as_bytes());
    chunk.put_slice(b"\r\nContent-Type: image/jpeg\r\n\r\n");
    chunk.put_slice(jpeg);
    chunk.put_slice(b"\r\n");
    chunk.freeze()
}

async fn running_session(state: &AppState, id: &str) -> Option<Arc<Session>> {
    state
        .registry
        .get(id)
        .await
        .filter(|session| session.is_running())
}

/// GET /: banner
async fn index() -> &'static str {
    "Garud relay server\n"
}

/// GET /clients: registered session ids
async fn list_clients(State(state): State<AppState>) -> Json<serde_json::Value> {
    let ids = state.registry.ids().await;
    Json(json!({ "clients": ids }))
}

/// GET /status/{id}: session status
async fn session_status(Path(id): Path<String>, State(state): State<AppState>) -> Response {
    match running_session(&state, &id).await {
        Some(session) => Json(json!({
            "status": "active",
            "client_id": id,
            "instance": session.instance(),
            "phase": session.phase(),
            "uptime_secs": session.uptime().as_secs(),
            "idle_secs": session.idle_for().as_secs(),
            "stats": session.stats.snapshot(),
        }))
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "inactive", "client_id": id })),
        )
            .into_response(),
    }
}

/// GET /video_feed/{id}: MJPEG stream
async fn video_feed(Path(id): Path<String>, State(state): State<AppState>) -> Response {
    let Some(session) = running_session(&state, &id).await else {
        return StatusCode::NOT_FOUND.into_response();
    };

    tracing::info!(session = %id, instance = session.instance(), "Viewer connected");

    let feed = VideoFeed::new(session, state);
    let stream = futures_util::stream::unfold(feed, |mut feed| async move {
        let chunk = feed.next_chunk().await?;
        Some((Ok::<_, Infallible>(chunk), feed))
    });

    (
        [
            (header::CONTENT_TYPE, VIDEO_FEED_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

/// Pull state for one viewer
struct VideoFeed {
    session: Arc<Session>,
    state: AppState,
    last_frame_at: Instant,
    keepalive: Option<Bytes>,
    frames_sent: u64,
}

impl VideoFeed {
    fn new(session: Arc<Session>, state: AppState) -> Self {
        Self {
            session,
            state,
            last_frame_at: Instant::now(),
            keepalive: None,
            frames_sent: 0,
        }
    }

    /// Next multipart chunk, or `None` when the stream should end
    async fn next_chunk(&mut self) -> Option<Bytes> {
        loop {
            if !self.refresh_session().await {
                self.finish("session gone");
                return None;
            }

            match self.session.output.get(self.state.config.relay_poll).await {
                Recv::Item(frame) => {
                    let quality = self.state.config.jpeg_quality;
                    let encoded =
                        tokio::task::spawn_blocking(move || encode_jpeg(&frame.image, quality))
                            .await;
                    match encoded {
                        Ok(Ok(jpeg)) => {
                            self.last_frame_at = Instant::now();
                            self.frames_sent += 1;
                            return Some(multipart_chunk(&jpeg));
                        }
                        Ok(Err(e)) => {
                            tracing::warn!(session = %self.session.id(), error = %e, "Frame encode failed");
                        }
                        Err(e) => {
                            tracing::error!(session = %self.session.id(), error = %e, "Frame encode task failed");
                        }
                    }
                }
                Recv::End => {
                    // A same-id reconnect replaces the session; follow it
                    if self.follow_successor().await {
                        continue;
                    }
                    self.finish("end of stream");
                    return None;
                }
                Recv::TimedOut => {
                    if self.last_frame_at.elapsed() >= self.state.config.stall_timeout {
                        self.finish("stalled");
                        return None;
                    }
                    if let Some(chunk) = self.keepalive_chunk().await {
                        return Some(chunk);
                    }
                }
            }
        }
    }

    /// Re-resolve the id; switches to a successor instance if there is one
    async fn refresh_session(&mut self) -> bool {
        if self.session.is_running() {
            return true;
        }
        self.follow_successor().await
    }

    async fn follow_successor(&mut self) -> bool {
        match running_session(&self.state, self.session.id()).await {
            Some(current) if current.instance() != self.session.instance() => {
                tracing::info!(
                    session = %current.id(),
                    from = self.session.instance(),
                    to = current.instance(),
                    "Viewer following reconnected session"
                );
                self.session = current;
                true
            }
            _ => false,
        }
    }

    async fn keepalive_chunk(&mut self) -> Option<Bytes> {
        if let Some(chunk) = &self.keepalive {
            return Some(chunk.clone());
        }

        let id = self.session.id().to_string();
        let quality = self.state.config.jpeg_quality;
        let encoded = tokio::task::spawn_blocking(move || encode_jpeg(&placeholder(&id), quality))
            .await
            .ok()?;

        match encoded {
            Ok(jpeg) => {
                let chunk = multipart_chunk(&jpeg);
                self.keepalive = Some(chunk.clone());
                Some(chunk)
            }
            Err(e) => {
                tracing::warn!(session = %self.session.id(), error = %e, "Placeholder encode failed");
                None
            }
        }
    }

    fn finish(&self, why: &'static str) {
        tracing::info!(
            session = %self.session.id(),
            instance = self.session.instance(),
            frames = self.frames_sent,
            why,
            "Viewer stream ended"
        );
    }
}

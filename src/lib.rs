//! Garud: live camera relay with face-recognition annotation
//!
//! Cameras push still frames over a WebSocket; each camera gets a session
//! with its own worker that annotates frames through a pluggable
//! [`FaceMatcher`](recognition::FaceMatcher); viewers pull the annotated
//! frames as an MJPEG stream over HTTP.
//!
//! ```text
//!   camera ──ws──► ingest ──► input queue ──► worker ──► output queue ──► relay ──http──► viewer
//!                    │          (drop-oldest)     │        (drop-oldest)     │
//!                    └──────────── SessionRegistry ◄─────── reaper ──────────┘
//! ```
//!
//! Every queue is small and bounded: a slow stage drops the oldest frames,
//! it never blocks the stage in front of it.
//!
//! # Example
//!
//! ```no_run
//! use garud::{RelayServer, ServerConfig};
//!
//! # async fn run() -> garud::Result<()> {
//! let server = RelayServer::new(ServerConfig::default());
//! server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
//! # }
//! ```

pub mod directory;
pub mod error;
pub mod media;
pub mod notify;
pub mod queue;
pub mod recognition;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;
pub mod worker;

pub use directory::{NoDirectory, OwnerContext, StaticDirectory, UserDirectory};
pub use error::{CollaboratorError, Error, FrameError, HandshakeError, Result, WorkerError};
pub use notify::{AlertGate, LogNotifier, Notifier};
pub use queue::{FrameQueue, PutOutcome, Recv};
pub use recognition::{BoundingBox, Detection, FaceMatcher, Identity, NullMatcher};
pub use registry::{RegistryConfig, SessionRegistry};
pub use server::{RelayServer, ServerConfig};
pub use session::{Session, SessionPhase, TeardownReason};
pub use worker::Collaborators;

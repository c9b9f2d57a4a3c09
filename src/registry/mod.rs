//! Session registry
//!
//! The registry maps each client-supplied session id to its live
//! [`Session`](crate::session::Session) and owns the teardown path. The
//! ingestion endpoint, the output relay and the reaper all go through it.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<SessionRegistry>
//!                   ┌───────────────────────────┐
//!                   │ sessions: HashMap<id,     │
//!                   │   Arc<Session> {          │
//!                   │     input, output,        │
//!                   │     running, worker,      │
//!                   │   }                       │
//!                   │ >                         │
//!                   └─────────────┬─────────────┘
//!                                 │
//!        ┌────────────────────────┼────────────────────────┐
//!        │                        │                        │
//!        ▼                        ▼                        ▼
//!   [Ingestion]              [Relay]                  [Reaper]
//!   register / touch /       get(id) each             list_idle →
//!   terminate                iteration                reap_if_idle
//! ```
//!
//! # Replacement
//!
//! Registering an id that is already live stops the prior instance inside
//! the same critical section. Teardown operations are keyed to the session
//! instance, so a late teardown of a replaced session never removes its
//! successor.

pub mod config;
pub mod reaper;
pub mod store;

pub use config::RegistryConfig;
pub use store::SessionRegistry;

//! Camera session management

pub mod state;

pub use state::{Session, SessionPhase, TeardownReason};

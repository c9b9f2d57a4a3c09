//! Session statistics

pub mod metrics;

pub use metrics::{SessionStats, SessionStatsSnapshot};

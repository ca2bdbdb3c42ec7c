//! Utility functions for session identifiers and timestamps.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Represents a timestamp recorded in the audit trail.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Generates a new time-ordered session identifier (UUID v7).
#[must_use]
pub fn generate_session_id() -> Uuid {
    Uuid::now_v7()
}

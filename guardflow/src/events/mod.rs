//! Guard lifecycle events.
//!
//! A [`Guard`](crate::guard::Guard) reports its progress to an injected
//! [`EventSink`]. Emission goes through [`EventSink::try_emit`] and never fails the
//! session.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use serde::{Deserialize, Serialize};

/// Event types emitted during a guard session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuardEvent {
    /// A session began.
    SessionStarted,
    /// An attempt was validated and appended to the audit trail.
    AttemptCompleted,
    /// A field failure was repaired by a `fix` policy.
    FieldFixed,
    /// A corrective prompt was sent to the backend.
    ReaskRequested,
    /// The session ended with all fields passing.
    SessionSucceeded,
    /// The session ended with a terminal error.
    SessionFailed,
    /// The reask budget ran out.
    SessionExhausted,
}

impl GuardEvent {
    /// Returns the dotted event type name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionStarted => "guard.session.started",
            Self::AttemptCompleted => "guard.attempt.completed",
            Self::FieldFixed => "guard.field.fixed",
            Self::ReaskRequested => "guard.reask.requested",
            Self::SessionSucceeded => "guard.session.succeeded",
            Self::SessionFailed => "guard.session.failed",
            Self::SessionExhausted => "guard.session.exhausted",
        }
    }
}

impl std::fmt::Display for GuardEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_share_prefix() {
        let all = [
            GuardEvent::SessionStarted,
            GuardEvent::AttemptCompleted,
            GuardEvent::FieldFixed,
            GuardEvent::ReaskRequested,
            GuardEvent::SessionSucceeded,
            GuardEvent::SessionFailed,
            GuardEvent::SessionExhausted,
        ];
        for event in all {
            assert!(event.as_str().starts_with("guard."));
        }
        assert_eq!(GuardEvent::ReaskRequested.to_string(), "guard.reask.requested");
    }
}

//! Test assertions for guard sessions.

use crate::guard::{FieldOutcome, GuardSession, SessionStatus};

/// Asserts that the session succeeded.
pub fn assert_succeeded(session: &GuardSession) {
    assert_eq!(
        session.status(),
        SessionStatus::Succeeded,
        "Expected a succeeded session, got {:?}",
        session.status()
    );
}

/// Asserts that the session has the expected status.
pub fn assert_session_status(session: &GuardSession, expected: SessionStatus) {
    assert_eq!(
        session.status(),
        expected,
        "Expected status {:?}, got {:?}",
        expected,
        session.status()
    );
}

/// Asserts the number of attempts in the audit trail.
pub fn assert_attempt_count(session: &GuardSession, expected: usize) {
    assert_eq!(
        session.attempts().len(),
        expected,
        "Expected {} attempt(s), got {}",
        expected,
        session.attempts().len()
    );
}

/// Asserts a field's outcome in attempt `attempt`.
pub fn assert_field_outcome(
    session: &GuardSession,
    attempt: usize,
    field: &str,
    expected: FieldOutcome,
) {
    let result = session
        .attempts()
        .get(attempt)
        .and_then(|a| a.field_result(field))
        .unwrap_or_else(|| panic!("No result for field '{field}' in attempt {attempt}"));
    assert_eq!(
        result.outcome, expected,
        "Expected field '{}' to be {:?} in attempt {}, got {:?}",
        field, expected, attempt, result.outcome
    );
}

/// Asserts that a field's failure reason in attempt `attempt` contains `needle`.
pub fn assert_field_reason_contains(
    session: &GuardSession,
    attempt: usize,
    field: &str,
    needle: &str,
) {
    let reason = session
        .attempts()
        .get(attempt)
        .and_then(|a| a.field_result(field))
        .and_then(|r| r.reason())
        .unwrap_or_else(|| panic!("No failure reason for field '{field}' in attempt {attempt}"));
    assert!(
        reason.contains(needle),
        "Expected reason for '{field}' to contain '{needle}', got '{reason}'"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;
    use serde_json::json;

    #[test]
    fn test_assertions_on_fixed_session() {
        let guard = Guard::builder(default_registry())
            .use_validator("lower-case", json!(null), None, OnFail::Fix)
            .build()
            .unwrap();
        let outcome = guard.validate("HELLO").unwrap();
        let session = outcome.session();

        assert_succeeded(session);
        assert_session_status(session, SessionStatus::Succeeded);
        assert_attempt_count(session, 1);
        assert_field_outcome(session, 0, "output", FieldOutcome::Fixed);
        assert_field_reason_contains(session, 0, "output", "not lower case");
    }

    #[test]
    #[should_panic(expected = "Expected 2 attempt(s), got 1")]
    fn test_attempt_count_mismatch_panics() {
        let guard = Guard::builder(default_registry()).build().unwrap();
        let outcome = guard.validate("anything").unwrap();
        assert_attempt_count(outcome.session(), 2);
    }
}

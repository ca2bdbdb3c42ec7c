//! Testing utilities for guarded generation.
//!
//! This module provides:
//! - Scripted and failing generation backends
//! - Assertions over guard sessions and attempts

mod assertions;
mod mocks;

pub use assertions::{
    assert_attempt_count, assert_field_outcome, assert_field_reason_contains,
    assert_session_status, assert_succeeded,
};
pub use mocks::{FailingBackend, ScriptedBackend};

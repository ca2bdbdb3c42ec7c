//! The guard and its session machinery.
//!
//! This module provides:
//! - `Guard` and its fluent `GuardBuilder`
//! - The per-call `GuardSession` audit trail
//! - Failure action dispatch
//! - Corrective prompts and the bounded `ReaskController`

mod backoff;
mod builder;
mod dispatcher;
mod executor;
mod reask;
mod session;


pub use backoff::{BackoffConfig, BackoffStrategy, JitterStrategy};
pub use builder::GuardBuilder;
pub use dispatcher::{decide, evaluate_candidate, evaluate_field, Decision, Evaluation};
pub use executor::{Guard, ValidationOutcome};
pub use reask::{build_corrective_prompt, FailingField, ReaskController};
pub use session::{
    Attempt, FailureKind, FieldOutcome, FieldResult, GuardSession, SessionStatus,
};

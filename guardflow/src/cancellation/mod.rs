//! Cooperative cancellation for guard sessions.
//!
//! A session checks its token before every generation call and while waiting out a
//! reask backoff. In-flight backend calls are not interrupted.

mod token;

pub use token::CancellationToken;

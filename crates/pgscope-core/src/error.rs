// SPDX-FileCopyrightText: 2026 pgscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for pgscope.

use thiserror::Error;

use crate::types::HandleState;

/// Boxed driver error carried as the cause of a wrapped failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A SQL statement failed on a connection handle.
///
/// Carries the handle identifier, the statement, and its parameters so the
/// failure can be diagnosed without inspecting driver internals. The original
/// driver error is preserved as [`std::error::Error::source`].
#[derive(Debug, Error)]
#[error("error on query {handle_id} {statement}, params: {}", format_params(.params))]
pub struct QueryError {
    /// Identifier of the handle that issued the statement.
    pub handle_id: String,
    /// The statement text as sent to the driver.
    pub statement: String,
    /// Positional parameters bound to the statement.
    pub params: Vec<serde_json::Value>,
    /// The driver error.
    #[source]
    pub cause: BoxError,
}

impl QueryError {
    pub fn new(
        handle_id: impl Into<String>,
        statement: impl Into<String>,
        params: &[serde_json::Value],
        cause: impl Into<BoxError>,
    ) -> Self {
        Self {
            handle_id: handle_id.into(),
            statement: statement.into(),
            params: params.to_vec(),
            cause: cause.into(),
        }
    }
}

fn format_params(params: &[serde_json::Value]) -> String {
    serde_json::Value::Array(params.to_vec()).to_string()
}

/// An operation was attempted on a handle in a state that does not allow it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {operation} on connection {handle_id} in state {state}")]
pub struct InvalidStateError {
    /// Identifier of the handle.
    pub handle_id: String,
    /// The rejected operation (`begin`, `query`, `commit`).
    pub operation: &'static str,
    /// The state the handle was in.
    pub state: HandleState,
}

/// The primary error type used across pgscope crates.
#[derive(Debug, Error)]
pub enum PgScopeError {
    /// A statement failed in the driver.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Operation not permitted in the handle's current state.
    #[error(transparent)]
    InvalidState(#[from] InvalidStateError),

    /// Pool construction or connection checkout failed.
    #[error("pool error: {source}")]
    Pool { source: BoxError },

    /// A table or schema name failed identifier validation.
    #[error("invalid identifier `{identifier}`")]
    InvalidIdentifier { identifier: String },

    /// Configuration errors (invalid TOML, missing fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PgScopeError {
    /// Returns the wrapped [`QueryError`], if this is a query failure.
    pub fn as_query(&self) -> Option<&QueryError> {
        match self {
            PgScopeError::Query(e) => Some(e),
            _ => None,
        }
    }

    /// Returns true for [`PgScopeError::InvalidState`].
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, PgScopeError::InvalidState(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn query_error_message_has_context() {
        let err = QueryError::new(
            "h-1",
            "SELECT * FROM users WHERE id = $1",
            &[serde_json::json!(7)],
            std::io::Error::other("connection reset"),
        );
        let msg = err.to_string();
        assert!(msg.contains("h-1"));
        assert!(msg.contains("SELECT * FROM users"));
        assert!(msg.contains("[7]"));
    }

    #[test]
    fn query_error_preserves_cause() {
        let err = PgScopeError::from(QueryError::new(
            "h-2",
            "COMMIT",
            &[],
            std::io::Error::other("boom"),
        ));
        let cause = err.source().expect("driver cause");
        assert_eq!(cause.to_string(), "boom");
        assert_eq!(err.as_query().map(|q| q.statement.as_str()), Some("COMMIT"));
    }

    #[test]
    fn invalid_state_display() {
        let err = PgScopeError::from(InvalidStateError {
            handle_id: "h-3".into(),
            operation: "query",
            state: HandleState::Released,
        });
        assert!(err.is_invalid_state());
        assert_eq!(
            err.to_string(),
            "cannot query on connection h-3 in state Released"
        );
    }
}

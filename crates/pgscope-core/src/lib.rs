// SPDX-FileCopyrightText: 2026 pgscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for pgscope.
//!
//! Defines the error taxonomy, the shared row and state types, and the trait
//! seams between the connection registry and its collaborators: the database
//! driver below it and the transaction orchestrator above it.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{BoxError, InvalidStateError, PgScopeError, QueryError};
pub use types::{HandleState, Notice, PoolStatus, QueryResult, Row, TransactionId};

pub use traits::{
    ConnectionSource, PhysicalConnection, PoolConnector, StorageClient, StorageClientFactory,
    TransactionOrchestrator, TransactionService,
};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn handle_state_round_trips_through_strings() {
        use std::str::FromStr;

        let states = [
            HandleState::Idle,
            HandleState::InTransaction,
            HandleState::Committed,
            HandleState::RolledBack,
            HandleState::Released,
        ];
        for state in states {
            let parsed = HandleState::from_str(&state.to_string()).expect("should parse back");
            assert_eq!(state, parsed);
        }
    }

    #[test]
    fn terminal_states() {
        assert!(!HandleState::Idle.is_terminal());
        assert!(!HandleState::InTransaction.is_terminal());
        assert!(HandleState::Committed.is_terminal());
        assert!(HandleState::RolledBack.is_terminal());
        assert!(HandleState::Released.is_terminal());
    }

    #[test]
    fn column_strings_skips_non_strings() {
        let mut a = Row::new();
        a.insert("column_name".into(), serde_json::json!("name"));
        let mut b = Row::new();
        b.insert("column_name".into(), serde_json::Value::Null);
        let mut c = Row::new();
        c.insert("other".into(), serde_json::json!("x"));

        let result = QueryResult::new(vec![a, b, c]);
        assert_eq!(result.column_strings("column_name"), vec!["name"]);
    }

    #[test]
    fn all_trait_seams_are_exported() {
        fn _assert_physical<T: PhysicalConnection>() {}
        fn _assert_source<T: ConnectionSource>() {}
        fn _assert_connector<T: PoolConnector>() {}
        fn _assert_client<T: StorageClient>() {}
        fn _assert_factory<T: StorageClientFactory>() {}
        fn _assert_service<T: TransactionService>() {}
        fn _assert_orchestrator<T: TransactionOrchestrator>() {}
    }

    proptest! {
        #[test]
        fn transaction_id_display_is_identity(s in ".*") {
            let id = TransactionId::from(s.as_str());
            prop_assert_eq!(id.to_string(), s.clone());
            prop_assert_eq!(id.as_str(), s.as_str());
        }
    }
}

// SPDX-FileCopyrightText: 2026 pgscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the driver seam, the registry, and the lifecycle adapter.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Caller-supplied key correlating one logical transaction across lifecycle calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub String);

impl TransactionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(s: &str) -> Self {
        TransactionId(s.to_string())
    }
}

impl From<String> for TransactionId {
    fn from(s: String) -> Self {
        TransactionId(s)
    }
}

/// A single result row: column name to decoded value, in select-list order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Rows returned by a statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// Collects the string values of `column` across all rows, skipping
    /// rows where it is missing or not a string.
    pub fn column_strings(&self, column: &str) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.get(column))
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }
}

/// Logical transaction state of a connection handle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum HandleState {
    /// Just acquired; no transaction open.
    Idle,
    /// `BEGIN` issued and not yet finished.
    InTransaction,
    /// `COMMIT` succeeded.
    Committed,
    /// `ROLLBACK` issued.
    RolledBack,
    /// Physical connection returned to the pool.
    Released,
}

impl HandleState {
    /// Committed, rolled back, or released.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            HandleState::Committed | HandleState::RolledBack | HandleState::Released
        )
    }
}

/// A server notice raised on a connection (e.g. `RAISE NOTICE`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub severity: String,
    pub message: String,
}

/// Point-in-time pool occupancy, as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStatus {
    /// Open connections, idle or checked out.
    pub size: u32,
    /// Open connections currently idle.
    pub idle: u32,
}

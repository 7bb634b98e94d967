// SPDX-FileCopyrightText: 2026 pgscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Catalog lookups issued through a connection handle. Stateless and uncached.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;

use pgscope_core::{PgScopeError, Row};

use crate::handle::ConnectionHandle;

const TABLE_COLUMNS_SQL: &str = "SELECT column_name::text AS column_name, \
            column_default::text AS column_default \
     FROM information_schema.columns \
     WHERE table_schema = $1 AND table_name = $2 \
     ORDER BY ordinal_position";

const UNIQUE_KEY_SQL: &str = "SELECT i.indexrelid::regclass::text AS index_name, \
            a.attname::text AS attname \
     FROM pg_index i \
     JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
     WHERE i.indrelid = $1::text::regclass \
       AND i.indisunique \
       AND NOT i.indisprimary \
     ORDER BY index_name, array_position(i.indkey::int2[], a.attnum)";

/// Plain or schema-qualified unquoted identifier.
static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*(\.[A-Za-z_][A-Za-z0-9_$]*)?$").unwrap()
});

/// Columns of `table` in the handle's schema that a client may write explicitly.
pub async fn list_writable_columns(
    handle: &ConnectionHandle,
    table: &str,
) -> Result<Vec<String>, PgScopeError> {
    list_writable_columns_in(handle, handle.schema(), table).await
}

/// Columns of `schema.table` whose default is absent or not computed by a
/// function call, in declaration order.
///
/// A serial `id` (`nextval('users_id_seq'::regclass)`) or a `now()` stamp is
/// left out; `'active'::text` or `NULL::timestamp` defaults are kept.
pub async fn list_writable_columns_in(
    handle: &ConnectionHandle,
    schema: &str,
    table: &str,
) -> Result<Vec<String>, PgScopeError> {
    let result = handle
        .query(TABLE_COLUMNS_SQL, &[json!(schema), json!(table)])
        .await?;

    Ok(result
        .rows
        .iter()
        .filter(|row| !is_computed_default(text(row, "column_default")))
        .filter_map(|row| text(row, "column_name").map(str::to_string))
        .collect())
}

/// Columns of the first unique, non-primary index on `table`, joined by `,`.
/// Empty when the table has no such index.
///
/// `table` must be a plain or schema-qualified unquoted identifier; it is
/// checked before any statement is sent, then bound as a parameter.
pub async fn unique_key_columns(
    handle: &ConnectionHandle,
    table: &str,
) -> Result<String, PgScopeError> {
    if !is_valid_identifier(table) {
        return Err(PgScopeError::InvalidIdentifier {
            identifier: table.to_string(),
        });
    }

    let result = handle.query(UNIQUE_KEY_SQL, &[json!(table)]).await?;
    let first_index = result.rows.first().and_then(|row| text(row, "index_name"));

    Ok(result
        .rows
        .iter()
        .take_while(|row| text(row, "index_name") == first_index)
        .filter_map(|row| text(row, "attname"))
        .collect::<Vec<_>>()
        .join(","))
}

/// Mirrors `column_default LIKE '%(%)'`: an opening parenthesis somewhere
/// before a closing one at the very end.
pub fn is_computed_default(default: Option<&str>) -> bool {
    match default {
        Some(d) => d
            .strip_suffix(')')
            .is_some_and(|head| head.contains('(')),
        None => false,
    }
}

/// True for `table` or `schema.table` made of unquoted identifier characters.
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

fn text<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    row.get(column).and_then(|v| v.as_str())
}

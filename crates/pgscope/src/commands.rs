// SPDX-FileCopyrightText: 2026 pgscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `columns`, `unique-key`, `query`, and `config` subcommands.

use std::sync::Arc;

use serde_json::Value;

use pgscope_config::PgScopeConfig;
use pgscope_core::{PgScopeError, QueryResult, StorageClientFactory, TransactionId};
use pgscope_storage::{
    list_writable_columns_in, pg_client_factory, register_in_transaction_service,
    ConnectionRegistry, TransactionProcessor,
};

/// Print the writable columns of `table`, one per line.
pub async fn run_columns(
    config: &PgScopeConfig,
    table: &str,
    schema: Option<&str>,
) -> Result<(), PgScopeError> {
    let registry = pg_client_factory(config.pool.clone());
    let columns = writable_columns(&registry, table, schema).await;
    registry.release_all().await;

    for column in columns? {
        println!("{column}");
    }
    Ok(())
}

async fn writable_columns(
    registry: &ConnectionRegistry,
    table: &str,
    schema: Option<&str>,
) -> Result<Vec<String>, PgScopeError> {
    let handle = registry.acquire(&lookup_id()).await?;
    let schema = schema.unwrap_or(handle.schema());
    list_writable_columns_in(&handle, schema, table).await
}

/// Print the comma-joined unique key of `table`, or nothing if it has none.
pub async fn run_unique_key(config: &PgScopeConfig, table: &str) -> Result<(), PgScopeError> {
    let registry = pg_client_factory(config.pool.clone());
    let key = unique_key(&registry, table).await;
    registry.release_all().await;

    let key = key?;
    if key.is_empty() {
        eprintln!("{table}: no unique non-primary index");
    } else {
        println!("{key}");
    }
    Ok(())
}

async fn unique_key(registry: &ConnectionRegistry, table: &str) -> Result<String, PgScopeError> {
    let client = registry.client(&lookup_id()).await?;
    client.table_unique_key(table).await
}

/// Run `sql` in its own transaction and print the rows as a JSON array.
pub async fn run_query(
    config: &PgScopeConfig,
    sql: &str,
    raw_params: &[String],
    rollback: bool,
) -> Result<(), PgScopeError> {
    let params = parse_params(raw_params);
    let registry = pg_client_factory(config.pool.clone());
    let result = query_in_transaction(registry, sql, &params, rollback).await?;

    let rendered = serde_json::to_string_pretty(&result.rows)
        .map_err(|e| PgScopeError::Internal(format!("cannot render rows: {e}")))?;
    println!("{rendered}");
    Ok(())
}

/// Runs one statement between start and succeed (or fail, when `rollback`
/// is set or the statement errors).
pub async fn query_in_transaction(
    registry: Arc<ConnectionRegistry>,
    sql: &str,
    params: &[Value],
    rollback: bool,
) -> Result<QueryResult, PgScopeError> {
    let processor = TransactionProcessor::new();
    register_in_transaction_service(registry.clone(), &processor);
    let id = TransactionId::from(format!("cli-{}", uuid::Uuid::new_v4()));

    processor.start(&id).await?;
    let result = match registry.client(&id).await {
        Ok(client) => client.query(sql, params).await,
        Err(e) => Err(e),
    };

    match (&result, rollback) {
        (Ok(_), false) => processor.succeed(&id).await?,
        (Ok(_), true) => {
            processor.fail(&id).await?;
            tracing::info!(transaction_id = %id, "rolled back on request");
        }
        (Err(_), _) => {
            if let Err(e) = processor.fail(&id).await {
                tracing::warn!(transaction_id = %id, error = %e, "rollback after failed statement failed");
            }
        }
    }
    result
}

/// Each value is parsed as JSON; anything that is not valid JSON is bound as text.
pub fn parse_params(raw: &[String]) -> Vec<Value> {
    raw.iter()
        .map(|p| serde_json::from_str(p).unwrap_or_else(|_| Value::String(p.clone())))
        .collect()
}

/// Print the effective configuration as TOML with secrets masked.
pub fn run_config(config: &PgScopeConfig) -> Result<(), PgScopeError> {
    print!("{}", render_config(config)?);
    Ok(())
}

fn render_config(config: &PgScopeConfig) -> Result<String, PgScopeError> {
    toml::to_string_pretty(&config.redacted())
        .map_err(|e| PgScopeError::Config(format!("cannot render config: {e}")))
}

fn lookup_id() -> TransactionId {
    TransactionId::from(format!("lookup-{}", uuid::Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgscope_config::PoolConfig;
    use pgscope_storage::PoolInitializer;
    use pgscope_test_utils::{row, MockConnector, MockPool};
    use serde_json::json;

    fn mock_registry(pool: &MockPool) -> Arc<ConnectionRegistry> {
        let connector = Arc::new(MockConnector::new(pool.clone()));
        Arc::new(ConnectionRegistry::new(
            Arc::new(PoolInitializer::new(connector)),
            PoolConfig::default(),
        ))
    }

    #[test]
    fn params_fall_back_to_text() {
        let raw = vec![
            "42".to_string(),
            "true".to_string(),
            "null".to_string(),
            "\"quoted\"".to_string(),
            "ada@example.com".to_string(),
            "{\"k\": [1, 2]}".to_string(),
        ];
        assert_eq!(
            parse_params(&raw),
            vec![
                json!(42),
                json!(true),
                Value::Null,
                json!("quoted"),
                json!("ada@example.com"),
                json!({"k": [1, 2]}),
            ]
        );
    }

    #[test]
    fn config_output_masks_password() {
        let mut config = PgScopeConfig::default();
        config.pool.password = Some("s3cret".into());
        config.pool.url = Some("postgres://app:s3cret@db/main".into());

        let rendered = render_config(&config).unwrap();
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("[pool]"));
        assert!(rendered.contains("postgres://app:********@db/main"));
    }

    #[tokio::test]
    async fn query_commits_by_default() {
        let pool = MockPool::new();
        pool.respond("FROM users", vec![row(&[("name", json!("ada"))])]);
        let registry = mock_registry(&pool);

        let result = query_in_transaction(registry.clone(), "SELECT name FROM users", &[], false)
            .await
            .unwrap();
        assert_eq!(result.column_strings("name"), vec!["ada"]);
        assert_eq!(pool.count("COMMIT"), 1);
        assert_eq!(pool.count("ROLLBACK"), 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn query_rolls_back_on_request_or_error() {
        let pool = MockPool::new();
        pool.fail_on("FROM missing");
        let registry = mock_registry(&pool);

        query_in_transaction(registry.clone(), "DELETE FROM users", &[], true)
            .await
            .unwrap();
        assert!(query_in_transaction(registry.clone(), "SELECT * FROM missing", &[], false)
            .await
            .is_err());

        assert_eq!(pool.count("ROLLBACK"), 2);
        assert_eq!(pool.count("COMMIT"), 0);
        assert_eq!(pool.open_connections(), 0);
    }

    #[tokio::test]
    async fn columns_honour_schema_override() {
        let pool = MockPool::new();
        pool.respond(
            "information_schema.columns",
            vec![row(&[("column_name", json!("sku")), ("column_default", Value::Null)])],
        );
        let registry = mock_registry(&pool);

        let columns = writable_columns(&registry, "items", Some("inventory"))
            .await
            .unwrap();
        registry.release_all().await;

        assert_eq!(columns, vec!["sku"]);
        assert_eq!(pool.executed()[0].params, vec![json!("inventory"), json!("items")]);
        assert_eq!(pool.open_connections(), 0);
    }

    #[tokio::test]
    async fn unique_key_lookup_rejects_bad_names() {
        let pool = MockPool::new();
        let registry = mock_registry(&pool);

        let err = unique_key(&registry, "users; drop").await.unwrap_err();
        registry.release_all().await;
        assert!(matches!(err, PgScopeError::InvalidIdentifier { .. }));
        assert!(pool.executed().is_empty());
    }
}

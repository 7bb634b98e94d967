// SPDX-FileCopyrightText: 2026 pgscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tests against a real server. Skipped unless `TEST_PGSCOPE_DATABASE_URL`
//! points at a database the tests may create tables in.

use pgscope_config::PoolConfig;
use pgscope_core::{StorageClientFactory, TransactionId, TransactionService};
use pgscope_storage::{pg_client_factory, PgTransactionService};
use serde_json::json;

fn live_config() -> Option<PoolConfig> {
    let url = std::env::var("TEST_PGSCOPE_DATABASE_URL").ok()?;
    Some(PoolConfig {
        url: Some(url),
        max_connections: 4,
        ..PoolConfig::default()
    })
}

#[tokio::test]
async fn commit_and_introspect_on_live_server() {
    let Some(config) = live_config() else {
        eprintln!("TEST_PGSCOPE_DATABASE_URL not set, skipping");
        return;
    };
    let registry = pg_client_factory(config);
    let service = PgTransactionService::new(registry.clone());
    let id = TransactionId::from(uuid::Uuid::new_v4().to_string());

    service.on_start(&id).await.unwrap();
    let client = registry.client(&id).await.unwrap();
    client
        .query(
            "CREATE TABLE IF NOT EXISTS pgscope_live_users (
                id serial PRIMARY KEY,
                email text NOT NULL UNIQUE,
                name text,
                created_at timestamp DEFAULT NULL
            )",
            &[],
        )
        .await
        .unwrap();
    client
        .query(
            "INSERT INTO pgscope_live_users (email, name) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            &[json!("ada@example.com"), json!("Ada")],
        )
        .await
        .unwrap();

    let columns = client.table_columns("pgscope_live_users").await.unwrap();
    assert_eq!(columns, vec!["email", "name", "created_at"]);
    let key = client.table_unique_key("pgscope_live_users").await.unwrap();
    assert_eq!(key, "email");

    let rows = client
        .query(
            "SELECT id, name, created_at FROM pgscope_live_users WHERE email = $1",
            &[json!("ada@example.com")],
        )
        .await
        .unwrap();
    assert_eq!(rows.rows[0]["name"], json!("Ada"));
    assert!(rows.rows[0]["id"].is_i64());
    assert!(rows.rows[0]["created_at"].is_null());

    service.on_success(&id).await.unwrap();
    assert!(registry.is_empty());
}

#[tokio::test]
async fn rollback_discards_writes_on_live_server() {
    let Some(config) = live_config() else {
        eprintln!("TEST_PGSCOPE_DATABASE_URL not set, skipping");
        return;
    };
    let registry = pg_client_factory(config);
    let service = PgTransactionService::new(registry.clone());
    let table = format!("pgscope_live_{}", uuid::Uuid::new_v4().simple());
    let id = TransactionId::from("rollback");

    service.on_start(&id).await.unwrap();
    let client = registry.client(&id).await.unwrap();
    client
        .query(&format!("CREATE TABLE {table} (v int)"), &[])
        .await
        .unwrap();
    service.on_fail(&id).await.unwrap();

    let check = TransactionId::from("check");
    let client = registry.client(&check).await.unwrap();
    let rows = client
        .query("SELECT to_regclass($1)::text AS found", &[json!(table)])
        .await
        .unwrap();
    assert!(rows.rows[0]["found"].is_null());
    registry.release(&check).await;
}

#[tokio::test]
async fn parameters_take_server_inferred_types_on_live_server() {
    let Some(config) = live_config() else {
        eprintln!("TEST_PGSCOPE_DATABASE_URL not set, skipping");
        return;
    };
    let registry = pg_client_factory(config);
    let service = PgTransactionService::new(registry.clone());
    let table = format!("pgscope_live_{}", uuid::Uuid::new_v4().simple());
    let id = TransactionId::from(uuid::Uuid::new_v4().to_string());

    service.on_start(&id).await.unwrap();
    let client = registry.client(&id).await.unwrap();
    client
        .query(
            &format!("CREATE TABLE {table} (id int, at timestamptz, amount numeric, tags text[])"),
            &[],
        )
        .await
        .unwrap();
    client
        .query(
            &format!("INSERT INTO {table} (id, at, amount, tags) VALUES ($1, now(), $2, $3)"),
            &[json!(null), json!("12.50"), json!(["a", "b"])],
        )
        .await
        .unwrap();

    let rows = client
        .query(
            &format!("SELECT id, amount, tags FROM {table} WHERE at < $1"),
            &[json!("2999-01-01T00:00:00Z")],
        )
        .await
        .unwrap();
    assert_eq!(rows.rows.len(), 1);
    assert!(rows.rows[0]["id"].is_null());
    assert_eq!(rows.rows[0]["amount"], json!("12.50"));
    assert_eq!(rows.rows[0]["tags"], json!(["a", "b"]));

    service.on_fail(&id).await.unwrap();
    assert!(registry.is_empty());
}

#[tokio::test]
async fn unmapped_column_type_is_an_error_on_live_server() {
    let Some(config) = live_config() else {
        eprintln!("TEST_PGSCOPE_DATABASE_URL not set, skipping");
        return;
    };
    let registry = pg_client_factory(config);
    let id = TransactionId::from("unmapped");
    let client = registry.client(&id).await.unwrap();

    let err = client
        .query("SELECT interval '1 day' AS span", &[])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("SELECT interval"), "{err}");
    let cause = std::error::Error::source(&err).map(|c| c.to_string()).unwrap_or_default();
    assert!(cause.contains("INTERVAL"), "{cause}");

    let rows = client
        .query("SELECT (interval '1 day')::text AS span", &[])
        .await
        .unwrap();
    assert_eq!(rows.rows[0]["span"], json!("1 day"));
    registry.release(&id).await;
}

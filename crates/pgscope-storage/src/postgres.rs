// SPDX-FileCopyrightText: 2026 pgscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! sqlx-backed Postgres driver.
//!
//! Parameters are bound from JSON values, converted to the types the server
//! infers for them, and result rows are decoded back to JSON by column type.
//! `numeric` values decode to strings. Column types without a mapping here
//! (`interval`, `inet`, ranges, ...) fail the statement; cast them to `text`.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{json, Value};
use sqlx::pool::PoolConnection;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{
    PgArguments, PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgStatement, PgTypeInfo,
    PgTypeKind, Postgres,
};
use sqlx::query::Query;
use sqlx::types::{Decimal, Json};
use sqlx::{
    Column as _, Either, Executor as _, Row as _, Statement as _, TypeInfo as _, ValueRef as _,
};
use tracing::debug;

use pgscope_config::model::PoolConfig;
use pgscope_core::{
    BoxError, ConnectionSource, Notice, PgScopeError, PhysicalConnection, PoolConnector,
    PoolStatus, Row,
};

/// Builds a [`PgSource`] from pool configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgConnector;

impl PgConnector {
    pub fn new() -> Self {
        Self
    }
}

/// Connection options from `config`: the URL when set, discrete fields otherwise.
pub fn connect_options(config: &PoolConfig) -> Result<PgConnectOptions, PgScopeError> {
    let options = match &config.url {
        Some(url) => PgConnectOptions::from_str(url)
            .map_err(|e| PgScopeError::Config(format!("invalid pool.url: {e}")))?,
        None => {
            let options = PgConnectOptions::new()
                .host(&config.host)
                .port(config.port)
                .username(&config.user)
                .database(&config.database);
            match &config.password {
                Some(password) => options.password(password),
                None => options,
            }
        }
    };
    Ok(options.application_name(&config.application_name))
}

/// Pool sizing and timeouts from `config`. An idle timeout of 0 keeps idle
/// connections open indefinitely.
pub fn pool_options(config: &PoolConfig) -> PgPoolOptions {
    let idle_timeout =
        (config.idle_timeout_secs > 0).then(|| Duration::from_secs(config.idle_timeout_secs));
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(idle_timeout)
}

#[async_trait]
impl PoolConnector for PgConnector {
    async fn build(&self, config: &PoolConfig) -> Result<Arc<dyn ConnectionSource>, PgScopeError> {
        let options = connect_options(config)?;
        let pool = pool_options(config)
            .connect_with(options)
            .await
            .map_err(|e| PgScopeError::Pool {
                source: Box::new(e),
            })?;
        Ok(Arc::new(PgSource::new(pool)))
    }
}

/// A [`PgPool`] exposed as a [`ConnectionSource`].
#[derive(Debug, Clone)]
pub struct PgSource {
    pool: PgPool,
}

impl PgSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ConnectionSource for PgSource {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn connect(&self) -> Result<Box<dyn PhysicalConnection>, PgScopeError> {
        let conn = self.pool.acquire().await.map_err(|e| PgScopeError::Pool {
            source: Box::new(e),
        })?;
        Ok(Box::new(PgConnection { conn: Some(conn) }))
    }

    fn status(&self) -> PoolStatus {
        PoolStatus {
            size: self.pool.size(),
            idle: self.pool.num_idle() as u32,
        }
    }
}

/// One pooled Postgres connection. Dropping it returns it to the pool.
pub struct PgConnection {
    conn: Option<PoolConnection<Postgres>>,
}

#[async_trait]
impl PhysicalConnection for PgConnection {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, BoxError> {
        let Some(conn) = self.conn.as_mut() else {
            return Err("connection already returned to the pool".into());
        };

        let rows = if params.is_empty() {
            sqlx::query(sql).fetch_all(&mut **conn).await?
        } else {
            // The server infers each parameter's type at prepare time; values
            // are converted to that type before binding.
            let statement = (&mut **conn).prepare(sql).await?;
            let types = parameter_types(&statement);
            let mut query = statement.query();
            for (i, param) in params.iter().enumerate() {
                let pg_type = types.get(i).map(String::as_str).unwrap_or("TEXT");
                query = PgParam::from_json(i + 1, param, pg_type)?.bind(query);
            }
            query.fetch_all(&mut **conn).await?
        };

        rows.iter()
            .map(|row| decode_row(row).map_err(BoxError::from))
            .collect()
    }

    async fn release(&mut self) -> Result<(), BoxError> {
        drop(self.conn.take());
        Ok(())
    }

    /// sqlx relays notices through its `sqlx::postgres::notice` log target
    /// and keeps none on the connection.
    fn take_notices(&mut self) -> Vec<Notice> {
        Vec::new()
    }
}

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

fn parameter_types(statement: &PgStatement<'_>) -> Vec<String> {
    match statement.parameters() {
        Some(Either::Left(types)) => types.iter().map(|t| t.name().to_string()).collect(),
        _ => Vec::new(),
    }
}

/// A JSON parameter converted to the type the server inferred for it.
#[derive(Debug, Clone, PartialEq)]
enum PgParam {
    Bool(Option<bool>),
    Int2(Option<i16>),
    Int4(Option<i32>),
    Int8(Option<i64>),
    Float4(Option<f32>),
    Float8(Option<f64>),
    Numeric(Option<Decimal>),
    Uuid(Option<uuid::Uuid>),
    Timestamptz(Option<DateTime<Utc>>),
    Timestamp(Option<NaiveDateTime>),
    Date(Option<NaiveDate>),
    Time(Option<NaiveTime>),
    Json(Option<Value>),
    Text(Option<String>),
    BoolArray(Option<Vec<Option<bool>>>),
    Int4Array(Option<Vec<Option<i32>>>),
    Int8Array(Option<Vec<Option<i64>>>),
    Float8Array(Option<Vec<Option<f64>>>),
    NumericArray(Option<Vec<Option<Decimal>>>),
    UuidArray(Option<Vec<Option<uuid::Uuid>>>),
    TextArray(Option<Vec<Option<String>>>),
}

impl PgParam {
    /// Converts parameter `$position` to `pg_type`. Strings are parsed the way
    /// the server would parse an untyped literal; types without a conversion
    /// here are sent as text.
    fn from_json(position: usize, param: &Value, pg_type: &str) -> Result<Self, BoxError> {
        let at = Position { position, pg_type };
        let param = match pg_type {
            "BOOL" => Self::Bool(at.scalar(param, |s| s.parse::<bool>())?),
            "INT2" => Self::Int2(at.scalar(param, |s| s.parse::<i16>())?),
            "INT4" => Self::Int4(at.scalar(param, |s| s.parse::<i32>())?),
            "INT8" => Self::Int8(at.scalar(param, |s| s.parse::<i64>())?),
            "FLOAT4" => Self::Float4(at.scalar(param, |s| s.parse::<f32>())?),
            "FLOAT8" => Self::Float8(at.scalar(param, |s| s.parse::<f64>())?),
            "NUMERIC" => Self::Numeric(at.scalar(param, parse_decimal)?),
            "UUID" => Self::Uuid(at.scalar(param, uuid::Uuid::parse_str)?),
            "TIMESTAMPTZ" => Self::Timestamptz(at.scalar(param, parse_timestamptz)?),
            "TIMESTAMP" => Self::Timestamp(at.scalar(param, parse_timestamp)?),
            "DATE" => Self::Date(at.scalar(param, NaiveDate::from_str)?),
            "TIME" => Self::Time(at.scalar(param, NaiveTime::from_str)?),
            "JSON" | "JSONB" => Self::Json(at.json(param)?),
            "BOOL[]" => Self::BoolArray(at.array(param, |s| s.parse::<bool>())?),
            "INT4[]" => Self::Int4Array(at.array(param, |s| s.parse::<i32>())?),
            "INT8[]" => Self::Int8Array(at.array(param, |s| s.parse::<i64>())?),
            "FLOAT8[]" => Self::Float8Array(at.array(param, |s| s.parse::<f64>())?),
            "NUMERIC[]" => Self::NumericArray(at.array(param, parse_decimal)?),
            "UUID[]" => Self::UuidArray(at.array(param, uuid::Uuid::parse_str)?),
            "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => {
                Self::TextArray(at.array(param, |s| Ok::<_, Infallible>(s.to_string()))?)
            }
            _ => Self::Text(param_text(param)),
        };
        Ok(param)
    }

    fn bind(self, query: PgQuery<'_>) -> PgQuery<'_> {
        match self {
            Self::Bool(v) => query.bind(v),
            Self::Int2(v) => query.bind(v),
            Self::Int4(v) => query.bind(v),
            Self::Int8(v) => query.bind(v),
            Self::Float4(v) => query.bind(v),
            Self::Float8(v) => query.bind(v),
            Self::Numeric(v) => query.bind(v),
            Self::Uuid(v) => query.bind(v),
            Self::Timestamptz(v) => query.bind(v),
            Self::Timestamp(v) => query.bind(v),
            Self::Date(v) => query.bind(v),
            Self::Time(v) => query.bind(v),
            Self::Json(v) => query.bind(v.map(Json)),
            Self::Text(v) => query.bind(v),
            Self::BoolArray(v) => query.bind(v),
            Self::Int4Array(v) => query.bind(v),
            Self::Int8Array(v) => query.bind(v),
            Self::Float8Array(v) => query.bind(v),
            Self::NumericArray(v) => query.bind(v),
            Self::UuidArray(v) => query.bind(v),
            Self::TextArray(v) => query.bind(v),
        }
    }
}

struct Position<'a> {
    position: usize,
    pg_type: &'a str,
}

impl Position<'_> {
    fn scalar<T, E: fmt::Display>(
        &self,
        param: &Value,
        parse: fn(&str) -> Result<T, E>,
    ) -> Result<Option<T>, BoxError> {
        let Some(text) = param_text(param) else {
            return Ok(None);
        };
        parse(text.trim())
            .map(Some)
            .map_err(|e| self.error(param, e))
    }

    fn array<T, E: fmt::Display>(
        &self,
        param: &Value,
        parse: fn(&str) -> Result<T, E>,
    ) -> Result<Option<Vec<Option<T>>>, BoxError> {
        match param {
            Value::Null => Ok(None),
            Value::Array(items) => items
                .iter()
                .map(|item| self.scalar(item, parse))
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            other => Err(self.error(other, "expected a JSON array")),
        }
    }

    /// Strings hold JSON text; every other value is sent as itself.
    fn json(&self, param: &Value) -> Result<Option<Value>, BoxError> {
        match param {
            Value::Null => Ok(None),
            Value::String(text) => serde_json::from_str(text)
                .map(Some)
                .map_err(|e| self.error(param, e)),
            other => Ok(Some(other.clone())),
        }
    }

    fn error(&self, param: &Value, reason: impl fmt::Display) -> BoxError {
        format!(
            "cannot bind {param} to parameter ${} of type {}: {reason}",
            self.position, self.pg_type
        )
        .into()
    }
}

/// Text form of a JSON parameter: strings as-is, other scalars as JSON text.
fn param_text(param: &Value) -> Option<String> {
    match param {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn parse_decimal(s: &str) -> Result<Decimal, String> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .map_err(|e| e.to_string())
}

fn parse_timestamptz(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z"))
        .map(|t| t.with_timezone(&Utc))
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
}

fn decode_row(row: &PgRow) -> Result<Row, sqlx::Error> {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = if row.try_get_raw(i)?.is_null() {
            Value::Null
        } else {
            decode_value(row, i, column.type_info())?
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

fn decode_value(row: &PgRow, i: usize, type_info: &PgTypeInfo) -> Result<Value, sqlx::Error> {
    let value = match type_info.name() {
        "BOOL" => json!(row.try_get::<bool, _>(i)?),
        "INT2" => json!(row.try_get::<i16, _>(i)?),
        "INT4" => json!(row.try_get::<i32, _>(i)?),
        "INT8" => json!(row.try_get::<i64, _>(i)?),
        "OID" => json!(row.try_get::<Oid, _>(i)?.0),
        "FLOAT4" => json!(row.try_get::<f32, _>(i)?),
        "FLOAT8" => json!(row.try_get::<f64, _>(i)?),
        // Exact decimals travel as strings so no precision is lost.
        "NUMERIC" => json!(row.try_get::<Decimal, _>(i)?.to_string()),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => json!(row.try_get::<String, _>(i)?),
        "JSON" | "JSONB" => row.try_get::<Value, _>(i)?,
        "UUID" => json!(row.try_get::<uuid::Uuid, _>(i)?.to_string()),
        "BYTEA" => json!(bytea_hex(&row.try_get::<Vec<u8>, _>(i)?)),
        "TIMESTAMPTZ" => json!(row.try_get::<DateTime<Utc>, _>(i)?.to_rfc3339()),
        "TIMESTAMP" => json!(row.try_get::<NaiveDateTime, _>(i)?.to_string()),
        "DATE" => json!(row.try_get::<NaiveDate, _>(i)?.to_string()),
        "TIME" => json!(row.try_get::<NaiveTime, _>(i)?.to_string()),
        "BOOL[]" => json!(row.try_get::<Vec<Option<bool>>, _>(i)?),
        "INT2[]" => json!(row.try_get::<Vec<Option<i16>>, _>(i)?),
        "INT4[]" => json!(row.try_get::<Vec<Option<i32>>, _>(i)?),
        "INT8[]" => json!(row.try_get::<Vec<Option<i64>>, _>(i)?),
        "FLOAT8[]" => json!(row.try_get::<Vec<Option<f64>>, _>(i)?),
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => {
            json!(row.try_get::<Vec<Option<String>>, _>(i)?)
        }
        "NUMERIC[]" => json!(row
            .try_get::<Vec<Option<Decimal>>, _>(i)?
            .iter()
            .map(|d| d.map(|d| d.to_string()))
            .collect::<Vec<_>>()),
        "UUID[]" => json!(row
            .try_get::<Vec<Option<uuid::Uuid>>, _>(i)?
            .iter()
            .map(|u| u.map(|u| u.to_string()))
            .collect::<Vec<_>>()),
        _ if matches!(type_info.kind(), PgTypeKind::Enum(_)) => {
            json!(row.try_get_unchecked::<String, _>(i)?)
        }
        other => {
            debug!(column = i, pg_type = other, "no JSON mapping for column type");
            return Err(sqlx::Error::ColumnDecode {
                index: format!("{i}"),
                source: format!("no JSON mapping for type {other}; cast the column to text")
                    .into(),
            });
        }
    };
    Ok(value)
}

/// `bytea` in the server's hex output format.
fn bytea_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

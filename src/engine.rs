//! Database execution engine for xmldesk.
//!
//! This module runs compiled tile and grid queries. The renderer never
//! talks to a database itself; whoever renders a desk hands it a
//! [`DataSource`], normally a [`DeskDB`] backed by a PostgreSQL pool.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row as _, TypeInfo};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::ast::{Grid, Tile};
use crate::error::{DeskError, DeskResult};
use crate::schema::PgInspector;
use crate::transpiler::ToSql;
use crate::validator::Validator;

/// One result row, keyed by column name.
pub type Row = HashMap<String, Value>;

/// Anything that can run compiled SQL text.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Run a query and return every row in query order.
    async fn fetch_rows(&self, sql: &str) -> DeskResult<Vec<Row>>;

    /// Run a query and return the first column of the first row, if any.
    async fn fetch_scalar(&self, sql: &str) -> DeskResult<Option<Value>>;

    /// Allow-list checked before each query, when present.
    fn validator(&self) -> Option<&Validator> {
        None
    }
}

/// Run a tile's aggregate and return its value.
///
/// An empty result or a NULL aggregate yields `0`.
pub async fn execute_tile<D>(source: &D, tile: &Tile) -> DeskResult<Value>
where
    D: DataSource + ?Sized,
{
    if let Some(validator) = source.validator() {
        validator.check_tile(tile)?;
    }
    let sql = tile.to_sql();
    debug!(%sql, "tile query");
    match source.fetch_scalar(&sql).await? {
        Some(value) if !value.is_null() => Ok(value),
        _ => Ok(Value::from(0)),
    }
}

/// Run a grid's query and return its rows in query order.
pub async fn execute_grid<D>(source: &D, grid: &Grid) -> DeskResult<Vec<Row>>
where
    D: DataSource + ?Sized,
{
    if let Some(validator) = source.validator() {
        validator.check_grid(grid)?;
    }
    let sql = grid.to_sql();
    debug!(%sql, "grid query");
    source.fetch_rows(&sql).await
}

/// A PostgreSQL connection pool for running desk queries.
#[derive(Clone)]
pub struct DeskDB {
    pool: PgPool,
    validator: Option<Arc<Validator>>,
}

impl DeskDB {
    /// Connect to a database using a connection URL.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let db = DeskDB::connect("postgres://localhost/campus", 5).await?;
    /// ```
    pub async fn connect(url: &str, max_connections: u32) -> DeskResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| DeskError::Connection(e.to_string()))?;
        info!(max_connections, "connected");

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            validator: None,
        }
    }

    /// Check every compiled query against `validator` before running it.
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Schema introspection over the same pool.
    pub fn inspector(&self) -> PgInspector {
        PgInspector::new(self.pool.clone())
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DataSource for DeskDB {
    async fn fetch_rows(&self, sql: &str) -> DeskResult<Vec<Row>> {
        let rows: Vec<PgRow> = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DeskError::query(sql, e))?;
        rows.iter()
            .map(row_to_map)
            .collect::<Result<Vec<Row>, _>>()
            .map_err(|e| DeskError::query(sql, e))
    }

    async fn fetch_scalar(&self, sql: &str) -> DeskResult<Option<Value>> {
        let row: Option<PgRow> = sqlx::query(sql)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DeskError::query(sql, e))?;
        row.filter(|r| !r.columns().is_empty())
            .map(|r| column_value(&r, 0))
            .transpose()
            .map_err(|e| DeskError::query(sql, e))
    }

    fn validator(&self) -> Option<&Validator> {
        self.validator.as_deref()
    }
}

/// Convert a PgRow to a map keyed by column name.
///
/// A value that cannot be decoded is an error, never a silent NULL.
pub(crate) fn row_to_map(row: &PgRow) -> Result<Row, sqlx::Error> {
    row.columns()
        .iter()
        .map(|column| {
            let value = column_value(row, column.ordinal())?;
            Ok::<_, sqlx::Error>((column.name().to_string(), value))
        })
        .collect()
}

/// How a Postgres column type is read into JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decoder {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Uuid,
    Json,
    Bytes,
    Text,
}

/// Types without a decoder of their own are read as text. Those that do not
/// decode as text (INTERVAL, arrays, enums) fail the query.
fn decoder_for(type_name: &str) -> Decoder {
    match type_name {
        "BOOL" => Decoder::Bool,
        "INT2" => Decoder::Int2,
        "INT4" => Decoder::Int4,
        "INT8" => Decoder::Int8,
        "FLOAT4" => Decoder::Float4,
        "FLOAT8" => Decoder::Float8,
        "NUMERIC" => Decoder::Numeric,
        "DATE" => Decoder::Date,
        "TIME" => Decoder::Time,
        "TIMESTAMP" => Decoder::Timestamp,
        "TIMESTAMPTZ" => Decoder::TimestampTz,
        "UUID" => Decoder::Uuid,
        "JSON" | "JSONB" => Decoder::Json,
        "BYTEA" => Decoder::Bytes,
        _ => Decoder::Text,
    }
}

fn column_value(row: &PgRow, i: usize) -> Result<Value, sqlx::Error> {
    let decoder = decoder_for(row.columns()[i].type_info().name());

    let value = match decoder {
        Decoder::Bool => row.try_get::<Option<bool>, _>(i)?.map(Value::Bool),
        Decoder::Int2 => row.try_get::<Option<i16>, _>(i)?.map(Value::from),
        Decoder::Int4 => row.try_get::<Option<i32>, _>(i)?.map(Value::from),
        Decoder::Int8 => row.try_get::<Option<i64>, _>(i)?.map(Value::from),
        Decoder::Float4 => row
            .try_get::<Option<f32>, _>(i)?
            .and_then(|v| serde_json::Number::from_f64(v as f64))
            .map(Value::Number),
        Decoder::Float8 => row
            .try_get::<Option<f64>, _>(i)?
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        Decoder::Numeric => row
            .try_get::<Option<rust_decimal::Decimal>, _>(i)?
            .map(|d| Value::String(d.to_string())),
        Decoder::Date => row
            .try_get::<Option<chrono::NaiveDate>, _>(i)?
            .map(|d| Value::String(d.to_string())),
        Decoder::Time => row
            .try_get::<Option<chrono::NaiveTime>, _>(i)?
            .map(|t| Value::String(t.to_string())),
        Decoder::Timestamp => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(i)?
            .map(|d| Value::String(d.to_string())),
        Decoder::TimestampTz => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i)?
            .map(|d| Value::String(d.to_rfc3339())),
        Decoder::Uuid => row
            .try_get::<Option<sqlx::types::Uuid>, _>(i)?
            .map(|u| Value::String(u.to_string())),
        Decoder::Json => row.try_get::<Option<Value>, _>(i)?,
        Decoder::Bytes => row
            .try_get::<Option<Vec<u8>>, _>(i)?
            .map(|b| Value::String(hex_bytes(&b))),
        Decoder::Text => row.try_get::<Option<String>, _>(i)?.map(Value::String),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Postgres `bytea` hex output, e.g. `\xdeadbeef`.
fn hex_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

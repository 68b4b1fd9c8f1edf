//! Database schema introspection.
//!
//! Reads table and column metadata from `information_schema`. Row counts
//! and sample rows are best-effort: [`Introspect::count_rows`] answers `0`
//! and [`Introspect::sample_rows`] answers nothing when the database
//! refuses, while the `try_` variants report the failure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row as _;
use tracing::warn;

use crate::engine::{row_to_map, Row};
use crate::error::{DeskError, DeskResult};
use crate::transpiler::quote_ident;

/// Column metadata, in ordinal position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// `information_schema.columns.data_type`, e.g. `integer`, `text`.
    pub data_type: String,
    pub max_length: Option<u32>,
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub default: Option<String>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            max_length: None,
            nullable: true,
            primary_key: false,
            default: None,
        }
    }

    pub fn max_length(mut self, len: u32) -> Self {
        self.max_length = Some(len);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }
}

/// A table and its columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// First primary-key column, if the table has one.
    pub fn primary_key(&self) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.primary_key)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Read-only access to a live schema.
#[async_trait]
pub trait Introspect: Send + Sync {
    /// Base tables, alphabetical.
    async fn list_tables(&self) -> DeskResult<Vec<String>>;

    /// Columns of `table` in ordinal position.
    async fn list_columns(&self, table: &str) -> DeskResult<Vec<ColumnInfo>>;

    async fn try_count_rows(&self, table: &str) -> DeskResult<i64>;

    async fn try_sample_rows(&self, table: &str, limit: u32) -> DeskResult<Vec<Row>>;

    /// Row count, or `0` if it cannot be read.
    async fn count_rows(&self, table: &str) -> i64 {
        match self.try_count_rows(table).await {
            Ok(n) => n,
            Err(e) => {
                warn!(table, error = %e, "row count unavailable, reporting 0");
                0
            }
        }
    }

    /// Up to `limit` rows, or none if they cannot be read.
    async fn sample_rows(&self, table: &str, limit: u32) -> Vec<Row> {
        match self.try_sample_rows(table, limit).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(table, error = %e, "sample rows unavailable, reporting none");
                Vec::new()
            }
        }
    }

    async fn table_schema(&self, table: &str) -> DeskResult<TableSchema> {
        Ok(TableSchema::new(table, self.list_columns(table).await?))
    }

    /// Schemas for `tables`, in the order given.
    async fn table_schemas(&self, tables: &[String]) -> DeskResult<Vec<TableSchema>> {
        let mut out = Vec::with_capacity(tables.len());
        for table in tables {
            out.push(self.table_schema(table).await?);
        }
        Ok(out)
    }
}

const TABLES_SQL: &str = "\
SELECT table_name::text AS table_name
FROM information_schema.tables
WHERE table_schema = $1
  AND table_type = 'BASE TABLE'
ORDER BY table_name";

const COLUMNS_SQL: &str = "\
SELECT c.column_name::text AS column_name,
       c.data_type::text AS data_type,
       c.character_maximum_length::int4 AS max_length,
       c.is_nullable::text AS is_nullable,
       c.column_default::text AS column_default,
       EXISTS (
           SELECT 1
           FROM information_schema.table_constraints tc
           JOIN information_schema.key_column_usage kcu
             ON kcu.constraint_name = tc.constraint_name
            AND kcu.table_schema = tc.table_schema
            AND kcu.table_name = tc.table_name
           WHERE tc.constraint_type = 'PRIMARY KEY'
             AND tc.table_schema = c.table_schema
             AND tc.table_name = c.table_name
             AND kcu.column_name = c.column_name
       ) AS is_primary
FROM information_schema.columns c
WHERE c.table_schema = $1
  AND c.table_name = $2
ORDER BY c.ordinal_position";

/// PostgreSQL introspection over `information_schema`.
#[derive(Clone)]
pub struct PgInspector {
    pool: PgPool,
    schema: String,
}

impl PgInspector {
    /// Inspect the `public` schema.
    pub fn new(pool: PgPool) -> Self {
        Self::with_schema(pool, "public")
    }

    pub fn with_schema(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    /// Qualified, quoted name of a table known to exist.
    async fn checked_table(&self, table: &str) -> DeskResult<String> {
        let tables = self.list_tables().await?;
        if !tables.iter().any(|t| t == table) {
            return Err(DeskError::UnknownIdentifier(format!(
                "table '{}' not found in schema '{}'",
                table, self.schema
            )));
        }
        Ok(format!("{}.{}", quote_ident(&self.schema), quote_ident(table)))
    }
}

#[async_trait]
impl Introspect for PgInspector {
    async fn list_tables(&self) -> DeskResult<Vec<String>> {
        let rows: Vec<PgRow> = sqlx::query(TABLES_SQL)
            .bind(&self.schema)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DeskError::query(TABLES_SQL, e))?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("table_name"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DeskError::query(TABLES_SQL, e))
    }

    async fn list_columns(&self, table: &str) -> DeskResult<Vec<ColumnInfo>> {
        let rows: Vec<PgRow> = sqlx::query(COLUMNS_SQL)
            .bind(&self.schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DeskError::query(COLUMNS_SQL, e))?;

        rows.iter()
            .map(|r| -> Result<ColumnInfo, sqlx::Error> {
                let max_length: Option<i32> = r.try_get("max_length")?;
                let is_nullable: String = r.try_get("is_nullable")?;
                Ok(ColumnInfo {
                    name: r.try_get("column_name")?,
                    data_type: r.try_get("data_type")?,
                    max_length: max_length.and_then(|n| u32::try_from(n).ok()),
                    nullable: is_nullable == "YES",
                    primary_key: r.try_get("is_primary")?,
                    default: r.try_get("column_default")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DeskError::query(COLUMNS_SQL, e))
    }

    async fn try_count_rows(&self, table: &str) -> DeskResult<i64> {
        let qualified = self.checked_table(table).await?;
        let sql = format!("SELECT COUNT(*) AS count FROM {}", qualified);
        sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DeskError::query(sql.as_str(), e))
    }

    async fn try_sample_rows(&self, table: &str, limit: u32) -> DeskResult<Vec<Row>> {
        let qualified = self.checked_table(table).await?;
        let sql = format!("SELECT * FROM {} LIMIT $1", qualified);
        let rows: Vec<PgRow> = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DeskError::query(sql.as_str(), e))?;
        rows.iter()
            .map(row_to_map)
            .collect::<Result<Vec<Row>, _>>()
            .map_err(|e| DeskError::query(sql, e))
    }
}

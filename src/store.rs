//! Persistence gateway.
//!
//! Owns a single sqlx `Any` connection (MySQL or SQLite). Every public
//! operation logs its own failures and returns a safe value; the `try_`
//! variants surface the error instead. Mutations run inside one transaction
//! that is rolled back on any failure.

use sqlx::any::AnyRow;
use sqlx::{AnyConnection, Connection, Row};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::error::{EtlError, EtlResult};
use crate::model::{CASES, FieldMap, NormalizedRow, VACCINATIONS};

/// Tables owned by this tool, in creation order.
pub const TABLES: [&str; 2] = [CASES.table, VACCINATIONS.table];

/// Which SQL dialect the connection speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    MySql,
    Sqlite,
}

impl Backend {
    pub fn from_url(url: &str) -> EtlResult<Self> {
        if url.starts_with("mysql:") || url.starts_with("mariadb:") {
            Ok(Self::MySql)
        } else if url.starts_with("sqlite:") {
            Ok(Self::Sqlite)
        } else {
            Err(EtlError::Config(format!("unsupported database url: {}", url)))
        }
    }

    fn list_tables_sql(self) -> &'static str {
        match self {
            Self::MySql => {
                "SELECT CAST(table_name AS CHAR) FROM information_schema.tables \
                 WHERE table_schema = DATABASE() ORDER BY table_name"
            }
            Self::Sqlite => {
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
            }
        }
    }
}

/// Dynamic value for query parameters and result cells.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl SqlValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Int(v) => serde_json::Value::Number((*v).into()),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

/// Outcome of a deduplicated insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertReport {
    pub inserted: usize,
    pub skipped: usize,
}

/// A single relational connection.
pub struct Store {
    conn: Option<AnyConnection>,
    backend: Backend,
}

impl Store {
    /// Connect using a sqlx URL (`mysql://…`, `sqlite://…`, `sqlite::memory:`).
    pub async fn connect(url: &str) -> EtlResult<Self> {
        let backend = Backend::from_url(url)?;
        sqlx::any::install_default_drivers();

        let conn = AnyConnection::connect(url).await?;
        info!(?backend, "connected to database");
        Ok(Self {
            conn: Some(conn),
            backend,
        })
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    fn conn(&mut self) -> EtlResult<&mut AnyConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| EtlError::Persistence("connection is closed".to_string()))
    }

    /// Close the connection. Safe to call on a store that is already closed.
    pub async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            match conn.close().await {
                Ok(()) => info!("database connection closed"),
                Err(e) => error!("error closing connection: {}", e),
            }
        }
    }

    /// Run the DDL script at `path`. Returns `false` if it is missing or fails.
    pub async fn create_schema(&mut self, path: &Path) -> bool {
        match self.try_create_schema(path).await {
            Ok(count) => {
                info!(statements = count, "database tables created");
                true
            }
            Err(e) => {
                error!(script = %path.display(), "error creating tables: {}", e);
                false
            }
        }
    }

    pub async fn try_create_schema(&mut self, path: &Path) -> EtlResult<usize> {
        let script = std::fs::read_to_string(path)?;
        let statements = split_statements(&script);

        let conn = self.conn()?;
        let mut tx = conn.begin().await?;
        for stmt in &statements {
            debug!(sql = %stmt, "executing");
            let result = sqlx::query(stmt).execute(&mut *tx).await;
            if let Err(e) = result {
                rollback(tx).await;
                return Err(e.into());
            }
        }
        tx.commit().await?;
        Ok(statements.len())
    }

    /// Insert rows not already present. Returns the number inserted.
    pub async fn insert(&mut self, map: &FieldMap, rows: &[NormalizedRow]) -> usize {
        if rows.is_empty() {
            warn!(table = map.table, "no data provided for insertion");
            return 0;
        }
        match self.try_insert(map, rows).await {
            Ok(report) => report.inserted,
            Err(e) => {
                error!(table = map.table, "insertion failed: {}", e);
                0
            }
        }
    }

    /// Deduplicated insert of a whole batch in one transaction.
    ///
    /// The first row is checked for the key fields and the map's column set;
    /// a mismatch rejects the batch before anything is written.
    pub async fn try_insert(&mut self, map: &FieldMap, rows: &[NormalizedRow]) -> EtlResult<InsertReport> {
        let Some(first) = rows.first() else {
            return Ok(InsertReport::default());
        };
        if first.country_name.trim().is_empty() {
            return Err(EtlError::Persistence(format!(
                "data missing required field country_name for table {}",
                map.table
            )));
        }
        if !first.matches(map) {
            return Err(EtlError::Persistence(format!(
                "row columns do not match table {}",
                map.table
            )));
        }

        let conn = self.conn()?;
        let mut tx = conn.begin().await?;
        let result = insert_rows(&mut tx, map, rows).await;
        match result {
            Ok(report) => {
                tx.commit().await?;
                if report.inserted > 0 {
                    info!(
                        table = map.table,
                        inserted = report.inserted,
                        skipped = report.skipped,
                        "inserted records"
                    );
                } else {
                    info!(table = map.table, skipped = report.skipped, "no new records to insert");
                }
                Ok(report)
            }
            Err(e) => {
                rollback(tx).await;
                Err(e)
            }
        }
    }

    /// Run a parameterized read. Returns no rows on error.
    ///
    /// Date columns must be selected through `CAST(... AS CHAR)`; the `Any`
    /// driver only decodes integers, floats and text.
    pub async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Vec<Vec<SqlValue>> {
        match self.try_query(sql, params).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(sql, "query error: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn try_query(&mut self, sql: &str, params: &[SqlValue]) -> EtlResult<Vec<Vec<SqlValue>>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                SqlValue::Null => query.bind(Option::<String>::None),
                SqlValue::Int(v) => query.bind(*v),
                SqlValue::Float(v) => query.bind(*v),
                SqlValue::Text(v) => query.bind(v.clone()),
            };
        }
        let rows = query.fetch_all(self.conn()?).await?;
        Ok(rows.iter().map(row_to_values).collect())
    }

    /// Names of the tables in the current database.
    pub async fn list_tables(&mut self) -> Vec<String> {
        let sql = self.backend.list_tables_sql();
        match self.try_query(sql, &[]).await {
            Ok(rows) => rows
                .into_iter()
                .filter_map(|row| match row.into_iter().next() {
                    Some(SqlValue::Text(name)) => Some(name),
                    _ => None,
                })
                .collect(),
            Err(e) => {
                error!("error listing tables: {}", e);
                Vec::new()
            }
        }
    }

    /// Drop both tables if they exist.
    pub async fn drop_tables(&mut self) -> bool {
        match self.try_drop_tables().await {
            Ok(()) => {
                warn!("all tables dropped");
                true
            }
            Err(e) => {
                error!("error dropping tables: {}", e);
                false
            }
        }
    }

    async fn try_drop_tables(&mut self) -> EtlResult<()> {
        let conn = self.conn()?;
        let mut tx = conn.begin().await?;
        for table in TABLES {
            let sql = format!("DROP TABLE IF EXISTS {}", table);
            let result = sqlx::query(&sql).execute(&mut *tx).await;
            if let Err(e) = result {
                rollback(tx).await;
                return Err(e.into());
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

async fn insert_rows(conn: &mut AnyConnection, map: &FieldMap, rows: &[NormalizedRow]) -> EtlResult<InsertReport> {
    let exists_sql = format!(
        "SELECT 1 FROM {} WHERE report_date = ? AND country_name = ? LIMIT 1",
        map.table
    );
    let columns = map.columns();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let insert_sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        map.table,
        columns.join(", "),
        placeholders
    );

    let mut seen = HashSet::new();
    let mut fresh = Vec::with_capacity(rows.len());
    let mut report = InsertReport::default();

    for row in rows {
        if !seen.insert(row.key()) {
            report.skipped += 1;
            continue;
        }
        let existing = sqlx::query(&exists_sql)
            .bind(row.report_date.to_string())
            .bind(row.country_name.clone())
            .fetch_optional(&mut *conn)
            .await?;
        if existing.is_some() {
            report.skipped += 1;
        } else {
            fresh.push(row);
        }
    }

    for row in fresh {
        let mut query = sqlx::query(&insert_sql)
            .bind(row.report_date.to_string())
            .bind(row.country_name.clone());
        for (_, value) in &row.metrics {
            query = query.bind(*value);
        }
        query.execute(&mut *conn).await?;
        report.inserted += 1;
    }

    Ok(report)
}

async fn rollback(tx: sqlx::Transaction<'_, sqlx::Any>) {
    if let Err(e) = tx.rollback().await {
        warn!("rollback failed: {}", e);
    }
}

/// Split a DDL script into statements, dropping `--` comment lines.
fn split_statements(script: &str) -> Vec<String> {
    let stripped: String = script
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");
    stripped
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Convert an AnyRow to a vector of cells.
fn row_to_values(row: &AnyRow) -> Vec<SqlValue> {
    (0..row.len())
        .map(|i| {
            if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
                return v.map(SqlValue::Int).unwrap_or(SqlValue::Null);
            }
            if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
                return v.map(SqlValue::Float).unwrap_or(SqlValue::Null);
            }
            row.try_get::<Option<String>, _>(i)
                .ok()
                .flatten()
                .map(SqlValue::Text)
                .unwrap_or(SqlValue::Null)
        })
        .collect()
}

//! SQLite-backed client implementation.
//!
//! Translates the crate's named-parameter statements and buffered mutations
//! into sqlx calls:
//!
//! - `@name` placeholders are rewritten to positional `?` binds in occurrence
//!   order (single-quoted literals are left alone).
//! - Mutations are rendered to INSERT / UPDATE / upsert / DELETE statements
//!   and executed inside one sqlx transaction per apply.
//! - Update, upsert and delete need the table's primary-key columns; those
//!   are discovered through `pragma_table_info` and cached per table.
//!
//! Every database call is wrapped in a per-client timeout.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, Sqlite, SqlitePool, TypeInfo, ValueRef};
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::client::{Client, RowCursor};
use crate::error::{DbResult, Error};
use crate::mutation::Mutation;
use crate::statement::Statement;
use crate::value::{Row, Value};

/// Default per-operation timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// SQLite connection handle implementing [`Client`].
pub struct SqliteClient {
    pool: SqlitePool,
    query_timeout: Duration,
    key_columns: RwLock<HashMap<String, Arc<Vec<String>>>>,
}

impl SqliteClient {
    /// Wrap an existing pool with the default timeout.
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_timeout(pool, Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS))
    }

    /// Wrap an existing pool with a custom per-operation timeout.
    pub fn with_timeout(pool: SqlitePool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
            key_columns: RwLock::new(HashMap::new()),
        }
    }

    /// Open a database by URL (e.g. `sqlite:/path/to.db`), creating the file
    /// if needed and enforcing foreign keys.
    pub async fn connect(url: &str) -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(Error::from)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(Error::from)?;
        Ok(Self::new(pool))
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Execute a standalone statement (DDL or DML), returning affected rows.
    pub async fn execute(&self, stmt: &Statement) -> DbResult<u64> {
        let (sql, args) = expand_placeholders(&stmt.sql, &stmt.params)?;
        debug!(sql = %stmt.sql, params = stmt.params.len(), "executing statement");

        let mut query = sqlx::query(&sql);
        for arg in &args {
            query = bind_value(query, arg);
        }
        match timeout(self.query_timeout, query.execute(&self.pool)).await {
            Ok(result) => Ok(result.map_err(Error::from)?.rows_affected()),
            Err(_) => Err(Error::timeout(
                "statement execution",
                self.query_timeout.as_secs(),
            )),
        }
    }

    /// Begin a read-write session.
    pub async fn begin(&self) -> DbResult<SqliteSession> {
        let tx = self.pool.begin().await.map_err(Error::from)?;
        debug!("session started");
        Ok(SqliteSession {
            tx: Mutex::new(Some(tx)),
        })
    }

    /// Primary-key column names for a table, in key order, cached after first
    /// lookup.
    async fn table_key_columns(&self, table: &str) -> DbResult<Arc<Vec<String>>> {
        if let Some(cols) = self.key_columns.read().await.get(table) {
            return Ok(Arc::clone(cols));
        }

        let rows: Vec<SqliteRow> =
            sqlx::query("SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk")
                .bind(table)
                .fetch_all(&self.pool)
                .await
                .map_err(Error::from)?;
        let cols = rows
            .iter()
            .map(|r| r.try_get::<String, _>(0))
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(Error::from)?;
        if cols.is_empty() {
            return Err(Error::database(
                format!("table \"{}\" has no primary key or does not exist", table),
                None,
            ));
        }

        let cols = Arc::new(cols);
        self.key_columns
            .write()
            .await
            .insert(table.to_string(), Arc::clone(&cols));
        Ok(cols)
    }

    /// Render a mutation to SQL plus bind arguments.
    async fn render_mutation(&self, mutation: &Mutation) -> DbResult<(String, Vec<Value>)> {
        match mutation {
            Mutation::Insert { table, data } => Ok(render_insert(table, data)),
            Mutation::Update { table, data } => {
                let keys = self.table_key_columns(table).await?;
                render_update(table, data, &keys)
            }
            Mutation::InsertOrUpdate { table, data } => {
                let keys = self.table_key_columns(table).await?;
                render_upsert(table, data, &keys)
            }
            Mutation::Delete { table, key } => {
                let keys = self.table_key_columns(table).await?;
                render_delete(table, key, &keys)
            }
        }
    }

    async fn run_query(&self, stmt: &Statement) -> DbResult<Vec<Row>> {
        let (sql, args) = expand_placeholders(&stmt.sql, &stmt.params)?;
        debug!(sql = %stmt.sql, params = stmt.params.len(), "executing query");

        let mut query = sqlx::query(&sql);
        for arg in &args {
            query = bind_value(query, arg);
        }
        let rows: Vec<SqliteRow> = match timeout(
            self.query_timeout,
            query.fetch(&self.pool).try_collect::<Vec<_>>(),
        )
        .await
        {
            Ok(result) => result.map_err(Error::from)?,
            Err(_) => {
                return Err(Error::timeout(
                    "query execution",
                    self.query_timeout.as_secs(),
                ));
            }
        };

        rows.iter().map(decode_row).collect()
    }
}

#[async_trait]
impl Client for SqliteClient {
    type Session = SqliteSession;

    async fn query(&self, stmt: &Statement) -> DbResult<RowCursor> {
        Ok(RowCursor::new(self.run_query(stmt).await?))
    }

    async fn query_in(&self, session: &SqliteSession, stmt: &Statement) -> DbResult<RowCursor> {
        let (sql, args) = expand_placeholders(&stmt.sql, &stmt.params)?;
        debug!(sql = %stmt.sql, params = stmt.params.len(), "executing query in session");

        let mut guard = session.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| Error::transaction("session is closed"))?;

        let mut query = sqlx::query(&sql);
        for arg in &args {
            query = bind_value(query, arg);
        }
        let rows: Vec<SqliteRow> = match timeout(
            self.query_timeout,
            query.fetch(&mut **tx).try_collect::<Vec<_>>(),
        )
        .await
        {
            Ok(result) => result.map_err(Error::from)?,
            Err(_) => {
                return Err(Error::timeout(
                    "query execution",
                    self.query_timeout.as_secs(),
                ));
            }
        };

        Ok(RowCursor::new(
            rows.iter().map(decode_row).collect::<DbResult<Vec<_>>>()?,
        ))
    }

    async fn apply(&self, mutations: &[Mutation]) -> DbResult<DateTime<Utc>> {
        // Key lookups run on their own pool connections, so resolve them
        // before the write transaction starts.
        let mut rendered = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            rendered.push(self.render_mutation(mutation).await?);
        }

        let mut tx = self.pool.begin().await.map_err(Error::from)?;
        for ((sql, args), mutation) in rendered.iter().zip(mutations) {
            debug!(
                table = mutation.table(),
                kind = mutation.kind(),
                "buffered mutation"
            );
            let mut query = sqlx::query(sql);
            for arg in args {
                query = bind_value(query, arg);
            }
            match timeout(self.query_timeout, query.execute(&mut *tx)).await {
                Ok(result) => {
                    result.map_err(Error::from)?;
                }
                Err(_) => {
                    return Err(Error::timeout(
                        "mutation execution",
                        self.query_timeout.as_secs(),
                    ));
                }
            }
        }
        tx.commit().await.map_err(Error::from)?;

        let commit_timestamp = Utc::now();
        info!(
            mutation_count = mutations.len(),
            commit_timestamp = %commit_timestamp,
            "mutations committed"
        );
        Ok(commit_timestamp)
    }
}

/// An active read-write SQLite transaction.
///
/// Queries routed through [`Client::query_in`] observe writes executed in the
/// session before it commits.
pub struct SqliteSession {
    tx: Mutex<Option<sqlx::Transaction<'static, Sqlite>>>,
}

impl SqliteSession {
    /// Execute a statement inside the session, returning affected rows.
    pub async fn execute(&self, stmt: &Statement) -> DbResult<u64> {
        let (sql, args) = expand_placeholders(&stmt.sql, &stmt.params)?;

        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| Error::transaction("session is closed"))?;

        let mut query = sqlx::query(&sql);
        for arg in &args {
            query = bind_value(query, arg);
        }
        Ok(query
            .execute(&mut **tx)
            .await
            .map_err(Error::from)?
            .rows_affected())
    }

    /// Commit the session.
    pub async fn commit(self) -> DbResult<()> {
        let tx = self
            .tx
            .into_inner()
            .ok_or_else(|| Error::transaction("session is closed"))?;
        tx.commit().await.map_err(Error::from)?;
        debug!("session committed");
        Ok(())
    }

    /// Roll the session back.
    pub async fn rollback(self) -> DbResult<()> {
        let tx = self
            .tx
            .into_inner()
            .ok_or_else(|| Error::transaction("session is closed"))?;
        tx.rollback().await.map_err(Error::from)?;
        debug!("session rolled back");
        Ok(())
    }
}

/// Rewrite `@name` placeholders to positional `?` binds.
///
/// Returns the rewritten SQL and the bind values in occurrence order. Text
/// inside single-quoted literals is left untouched; a placeholder with no
/// bound parameter is a usage error.
fn expand_placeholders(
    sql: &str,
    params: &BTreeMap<String, Value>,
) -> DbResult<(String, Vec<Value>)> {
    let mut out = String::with_capacity(sql.len());
    let mut args = Vec::new();
    let mut chars = sql.chars().peekable();
    let mut in_literal = false;

    while let Some(c) = chars.next() {
        if in_literal {
            out.push(c);
            if c == '\'' {
                in_literal = false;
            }
            continue;
        }
        match c {
            '\'' => {
                in_literal = true;
                out.push(c);
            }
            '@' => {
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        name.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if name.is_empty() {
                    out.push('@');
                    continue;
                }
                let value = params.get(&name).ok_or_else(|| {
                    Error::invalid_argument(format!("no value bound for parameter @{}", name))
                })?;
                args.push(value.clone());
                out.push('?');
            }
            _ => out.push(c),
        }
    }

    Ok((out, args))
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q Value,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::String(v) => query.bind(v.as_str()),
        Value::Bytes(v) => query.bind(v.as_slice()),
        // SQLite doesn't have a native JSON type, store as string
        Value::Json(v) => query.bind(v.to_string()),
    }
}

/// Decode a sqlx row into the crate's row model, by value storage class.
fn decode_row(row: &SqliteRow) -> DbResult<Row> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (idx, col) in row.columns().iter().enumerate() {
        columns.push(col.name().to_string());
        values.push(decode_column(row, idx)?);
    }
    Ok(Row::new(columns, values))
}

fn decode_column(row: &SqliteRow, idx: usize) -> DbResult<Value> {
    let (is_null, storage_class) = {
        let raw = row.try_get_raw(idx).map_err(Error::from)?;
        (raw.is_null(), raw.type_info().name().to_string())
    };
    if is_null {
        return Ok(Value::Null);
    }
    match storage_class.as_str() {
        "INTEGER" => row
            .try_get::<i64, _>(idx)
            .map(Value::Int)
            .map_err(Error::from),
        "REAL" => row
            .try_get::<f64, _>(idx)
            .map(Value::Float)
            .map_err(Error::from),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(idx)
            .map(Value::Bytes)
            .map_err(Error::from),
        "BOOLEAN" => row
            .try_get::<bool, _>(idx)
            .map(Value::Bool)
            .map_err(Error::from),
        _ => row
            .try_get::<String, _>(idx)
            .map(Value::String)
            .map_err(Error::from),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn render_insert(table: &str, data: &[(String, Value)]) -> (String, Vec<Value>) {
    let columns = data
        .iter()
        .map(|(name, _)| quote_ident(name))
        .collect::<Vec<_>>()
        .join(", ");
    let marks = vec!["?"; data.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        columns,
        marks
    );
    (sql, data.iter().map(|(_, v)| v.clone()).collect())
}

fn render_update(
    table: &str,
    data: &[(String, Value)],
    keys: &[String],
) -> DbResult<(String, Vec<Value>)> {
    let mut key_values = Vec::with_capacity(keys.len());
    for key in keys {
        match data.iter().find(|(name, _)| name == key) {
            Some((_, value)) => key_values.push(value.clone()),
            None => {
                return Err(Error::invalid_argument(format!(
                    "update on \"{}\" is missing key column \"{}\"",
                    table, key
                )));
            }
        }
    }

    let set_pairs: Vec<&(String, Value)> = data
        .iter()
        .filter(|(name, _)| !keys.contains(name))
        .collect();
    if set_pairs.is_empty() {
        return Err(Error::invalid_argument(format!(
            "update on \"{}\" has no non-key columns",
            table
        )));
    }

    let set_clause = set_pairs
        .iter()
        .map(|(name, _)| format!("{} = ?", quote_ident(name)))
        .collect::<Vec<_>>()
        .join(", ");
    let where_clause = keys
        .iter()
        .map(|name| format!("{} = ?", quote_ident(name)))
        .collect::<Vec<_>>()
        .join(" AND ");
    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        quote_ident(table),
        set_clause,
        where_clause
    );

    let mut args: Vec<Value> = set_pairs.iter().map(|(_, v)| v.clone()).collect();
    args.extend(key_values);
    Ok((sql, args))
}

fn render_upsert(
    table: &str,
    data: &[(String, Value)],
    keys: &[String],
) -> DbResult<(String, Vec<Value>)> {
    for key in keys {
        if !data.iter().any(|(name, _)| name == key) {
            return Err(Error::invalid_argument(format!(
                "upsert on \"{}\" is missing key column \"{}\"",
                table, key
            )));
        }
    }

    let (insert_sql, args) = render_insert(table, data);
    let conflict_target = keys
        .iter()
        .map(|name| quote_ident(name))
        .collect::<Vec<_>>()
        .join(", ");

    let updates = data
        .iter()
        .filter(|(name, _)| !keys.contains(name))
        .map(|(name, _)| {
            let quoted = quote_ident(name);
            format!("{} = excluded.{}", quoted, quoted)
        })
        .collect::<Vec<_>>();
    let action = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };

    let sql = format!("{} ON CONFLICT ({}) {}", insert_sql, conflict_target, action);
    Ok((sql, args))
}

fn render_delete(table: &str, key: &[Value], keys: &[String]) -> DbResult<(String, Vec<Value>)> {
    if key.len() != keys.len() {
        return Err(Error::invalid_argument(format!(
            "delete on \"{}\" has {} key values but the table has {} key columns",
            table,
            key.len(),
            keys.len()
        )));
    }
    let where_clause = keys
        .iter()
        .map(|name| format!("{} = ?", quote_ident(name)))
        .collect::<Vec<_>>()
        .join(" AND ");
    let sql = format!("DELETE FROM {} WHERE {}", quote_ident(table), where_clause);
    Ok((sql, key.to_vec()))
}

use std::future::Future;
use std::time::Instant;

use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Arguments, FromRow, Sqlite};

use crate::error::DbResult;

use super::connection::{BackendMode, Db};

/// A positional statement parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&String> for SqlValue {
    fn from(value: &String) -> Self {
        SqlValue::Text(value.clone())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

pub fn arguments(params: &[SqlValue]) -> Result<SqliteArguments<'static>, sqlx::Error> {
    let mut args = SqliteArguments::default();
    for param in params {
        let added = match param {
            SqlValue::Null => args.add(Option::<String>::None),
            SqlValue::Int(value) => args.add(*value),
            SqlValue::Real(value) => args.add(*value),
            SqlValue::Text(value) => args.add(value.clone()),
        };
        added.map_err(sqlx::Error::Encode)?;
    }
    Ok(args)
}

/// Connection drops, pool exhaustion, timeouts and SQLite busy locks.
pub fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::PoolClosed => false,
        other => {
            let message = other.to_string().to_lowercase();
            message.contains("connection")
                || message.contains("timeout")
                || message.contains("timed out")
                || message.contains("database is locked")
        }
    }
}

/// Statements naming tables or columns the backend does not have.
pub fn is_unrecognized(err: &sqlx::Error) -> bool {
    let message = err.to_string();
    message.contains("no such table") || message.contains("no such column")
}

pub fn is_schema_mismatch(err: &sqlx::Error) -> bool {
    let message = err.to_string();
    message.contains("has no column named") || message.contains("no such column")
}

impl Db {
    pub async fn fetch_all<T>(&self, sql: &str, params: &[SqlValue]) -> DbResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let started = Instant::now();
        let pool = self.pool();
        let result = self
            .with_retry(sql, move || async move {
                sqlx::query_as_with::<Sqlite, T, _>(sql, arguments(params)?)
                    .fetch_all(pool)
                    .await
            })
            .await;
        let rows = self.recover_unrecognized(sql, result, Vec::new)?;
        log_success(sql, started, rows.len() as u64);
        Ok(rows)
    }

    pub async fn fetch_optional<T>(&self, sql: &str, params: &[SqlValue]) -> DbResult<Option<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let started = Instant::now();
        let pool = self.pool();
        let result = self
            .with_retry(sql, move || async move {
                sqlx::query_as_with::<Sqlite, T, _>(sql, arguments(params)?)
                    .fetch_optional(pool)
                    .await
            })
            .await;
        let row = self.recover_unrecognized(sql, result, || None)?;
        log_success(sql, started, u64::from(row.is_some()));
        Ok(row)
    }

    /// First column of the first row, or `None` when the statement returns no rows.
    pub async fn fetch_scalar<T>(&self, sql: &str, params: &[SqlValue]) -> DbResult<Option<T>>
    where
        T: for<'r> sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite> + Send + Unpin,
    {
        let started = Instant::now();
        let pool = self.pool();
        let result = self
            .with_retry(sql, move || async move {
                sqlx::query_scalar_with::<Sqlite, T, _>(sql, arguments(params)?)
                    .fetch_optional(pool)
                    .await
            })
            .await;
        let value = self.recover_unrecognized(sql, result, || None)?;
        log_success(sql, started, u64::from(value.is_some()));
        Ok(value)
    }

    /// Runs a statement and returns the number of affected rows.
    pub async fn execute(&self, sql: &str, params: &[SqlValue]) -> DbResult<u64> {
        let started = Instant::now();
        let pool = self.pool();
        let result = self
            .with_retry(sql, move || async move {
                sqlx::query_with::<Sqlite, _>(sql, arguments(params)?)
                    .execute(pool)
                    .await
                    .map(|done| done.rows_affected())
            })
            .await;
        let affected = self.recover_unrecognized(sql, result, || 0)?;
        log_success(sql, started, affected);
        Ok(affected)
    }

    pub async fn count(&self, sql: &str, params: &[SqlValue]) -> i64 {
        match self.fetch_scalar::<i64>(sql, params).await {
            Ok(value) => value.unwrap_or(0),
            Err(err) => {
                log::error!("Count query failed: {err}");
                0
            }
        }
    }

    /// Retries `op` on transient errors with exponential backoff; other errors return at once.
    pub async fn with_retry<T, F, Fut>(&self, sql: &str, mut op: F) -> Result<T, sqlx::Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let policy = self.retry_policy();
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < policy.max_retries && is_transient(&err) => {
                    let delay = policy.delay_for(attempt);
                    attempt += 1;
                    log::warn!(
                        "Transient database error ({err}); retry {attempt}/{} in {}ms: {}",
                        policy.max_retries,
                        delay.as_millis(),
                        compact(sql)
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if attempt > 0 {
                        log::warn!("Giving up after {attempt} retries: {}", compact(sql));
                    }
                    return Err(err);
                }
            }
        }
    }

    fn recover_unrecognized<T>(
        &self,
        sql: &str,
        result: Result<T, sqlx::Error>,
        empty: impl FnOnce() -> T,
    ) -> DbResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) if self.mode() == BackendMode::Fixture && is_unrecognized(&err) => {
                log::debug!("Fixture store has no data for: {}", compact(sql));
                Ok(empty())
            }
            Err(err) => {
                log::error!("Query failed: {err}: {}", compact(sql));
                Err(err.into())
            }
        }
    }
}

pub fn log_success(sql: &str, started: Instant, rows: u64) {
    log::debug!(
        "Executed query in {}ms ({rows} rows): {}",
        started.elapsed().as_millis(),
        compact(sql)
    );
}

fn compact(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

use std::{fs, path::Path, str::FromStr, time::Duration};

use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::config::{DbConfig, RetryPolicy};
use crate::error::{DbError, DbResult};

pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Which backend a [`Db`] handle talks to. Chosen once, at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    Connected,
    Fixture,
}

#[derive(Clone, Debug)]
pub struct Db {
    pool: SqlitePool,
    mode: BackendMode,
    retry: RetryPolicy,
}

impl Db {
    /// Opens the configured database, or the seeded in-memory fixture store when
    /// no database is configured or it cannot be reached.
    pub async fn connect(config: &DbConfig) -> DbResult<Self> {
        match config.database_url.as_deref() {
            Some(url) => match Self::open(url, config.max_connections, config.retry).await {
                Ok(db) => {
                    log::info!("Connected to database {}", display_url(url));
                    return Ok(db);
                }
                Err(err) => {
                    log::warn!("Database unavailable ({err}). Falling back to the in-memory fixture store.");
                }
            },
            None => {
                log::warn!("DATABASE_URL not set. Using the in-memory fixture store.");
            }
        }

        Self::fixture(config.retry).await
    }

    pub async fn open(url: &str, max_connections: u32, retry: RetryPolicy) -> DbResult<Self> {
        ensure_sqlite_dir(url).map_err(|err| DbError::Connection(err.to_string()))?;

        let options = connect_options(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|err| DbError::Connection(err.to_string()))?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|err| DbError::Connection(err.to_string()))?;

        Ok(Self {
            pool,
            mode: BackendMode::Connected,
            retry,
        })
    }

    /// An empty in-memory database in fixture mode. Lives as long as the pool.
    pub async fn in_memory(retry: RetryPolicy) -> DbResult<Self> {
        let options = connect_options("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|err| DbError::Connection(err.to_string()))?;

        Ok(Self {
            pool,
            mode: BackendMode::Fixture,
            retry,
        })
    }

    /// In-memory database with the schema applied and the sample dataset loaded.
    pub async fn fixture(retry: RetryPolicy) -> DbResult<Self> {
        let db = Self::in_memory(retry).await?;
        super::bootstrap(&db, true).await?;
        Ok(db)
    }

    pub fn mode(&self) -> BackendMode {
        self.mode
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// True when the handle answers a trivial query.
    pub async fn ensure_connection(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ok,
    Missing,
    Invalid,
    Unreachable,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConnectionCheck {
    pub status: CheckStatus,
    pub message: String,
}

/// Validates a connection string without touching the application's pool.
pub async fn check_connection_string(url: Option<&str>) -> ConnectionCheck {
    let Some(url) = url else {
        return ConnectionCheck {
            status: CheckStatus::Missing,
            message: "DATABASE_URL is not set; the in-memory fixture store is in use.".to_string(),
        };
    };

    let options = match connect_options(url) {
        Ok(options) => options,
        Err(err) => {
            return ConnectionCheck {
                status: CheckStatus::Invalid,
                message: err.to_string(),
            }
        }
    };

    let probe = async {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let result = sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&pool).await;
        pool.close().await;
        result
    };

    match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, probe).await {
        Ok(Ok(_)) => ConnectionCheck {
            status: CheckStatus::Ok,
            message: format!("Connected to {}", display_url(url)),
        },
        Ok(Err(err)) => ConnectionCheck {
            status: CheckStatus::Unreachable,
            message: err.to_string(),
        },
        Err(_) => ConnectionCheck {
            status: CheckStatus::Unreachable,
            message: format!(
                "Timed out after {}s connecting to {}",
                HEALTH_CHECK_TIMEOUT.as_secs(),
                display_url(url)
            ),
        },
    }
}

fn connect_options(url: &str) -> DbResult<SqliteConnectOptions> {
    if !url.starts_with("sqlite:") {
        return Err(DbError::Connection(format!(
            "unsupported database url {}: expected a sqlite: url",
            display_url(url)
        )));
    }
    let options = SqliteConnectOptions::from_str(url)
        .map_err(|err| DbError::Connection(format!("invalid database url: {err}")))?;
    Ok(options.foreign_keys(true))
}

fn display_url(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

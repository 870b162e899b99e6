use std::{env, str::FromStr, time::Duration};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 2;
pub const DEFAULT_RETRY_BASE_MS: u64 = 1000;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub seed_on_start: bool,
    pub db: DbConfig,
}

#[derive(Clone, Debug)]
pub struct DbConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub retry: RetryPolicy,
}

/// Backoff for transient query failures: `base_delay * 2^attempt`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_RETRY_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_MS),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            retry: RetryPolicy::default(),
        }
    }
}

impl AppConfig {
    /// Reads configuration from the process environment, after loading `.env` if present.
    pub fn from_env() -> Self {
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let retry = RetryPolicy {
            max_retries: parse_or(&lookup, "DB_RETRY_ATTEMPTS", DEFAULT_RETRY_ATTEMPTS),
            base_delay: Duration::from_millis(parse_or(
                &lookup,
                "DB_RETRY_BASE_MS",
                DEFAULT_RETRY_BASE_MS,
            )),
        };

        Self {
            port: parse_or(&lookup, "PORT", DEFAULT_PORT),
            seed_on_start: parse_or(&lookup, "SEED_ON_START", true),
            db: DbConfig {
                database_url,
                max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)
                    .max(1),
                retry,
            },
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("Ignoring malformed {key}={raw:?}, using default.");
                default
            }
        },
        None => default,
    }
}

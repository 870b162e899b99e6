//! Entity operations used by the HTTP layer.
//!
//! Reads never fail outward: a database error is logged and the caller gets
//! an empty list or `None`. Mutations return [`ActionResult`] so callers can
//! tell a missing row or a rejected input from a database failure.

pub mod appointments;
pub mod customers;
pub mod dashboard;
pub mod products;
pub mod sales;
pub mod services;

use chrono::{Datelike, Days, Local, NaiveDate, NaiveTime};
use thiserror::Error;

use crate::db::executor::SqlValue;
use crate::db::Db;
use crate::error::{DbError, DbResult};

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl From<sqlx::Error> for ActionError {
    fn from(err: sqlx::Error) -> Self {
        ActionError::Database(DbError::Query(err))
    }
}

impl ActionError {
    pub fn not_found(entity: &'static str, id: &str) -> Self {
        ActionError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ActionError::Validation(message.into())
    }
}

pub type ActionResult<T> = Result<T, ActionError>;

fn or_empty<T: Default>(result: DbResult<T>, what: &str) -> T {
    result.unwrap_or_else(|err| {
        log::error!("Failed to load {what}: {err}");
        T::default()
    })
}

async fn exists(db: &Db, table: &str, id: &str) -> DbResult<bool> {
    let found: Option<i64> = db
        .fetch_scalar(&format!("SELECT 1 FROM {table} WHERE id = ?"), &[id.into()])
        .await?;
    Ok(found.is_some())
}

async fn delete_by_id(db: &Db, table: &str, entity: &'static str, id: &str) -> ActionResult<()> {
    if !exists(db, table, id).await? {
        return Err(ActionError::not_found(entity, id));
    }
    db.execute(&format!("DELETE FROM {table} WHERE id = ?"), &[id.into()])
        .await?;
    log::info!("Deleted {entity} {id}");
    Ok(())
}

/// Trims and drops blank optional text.
fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn optional_text(value: Option<String>) -> SqlValue {
    clean(value).into()
}

fn required(value: &str, field: &str) -> ActionResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ActionError::validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

/// Four-digit years only, so stored dates compare correctly as text.
pub fn parse_date(value: &str) -> ActionResult<NaiveDate> {
    let invalid =
        || ActionError::validation(format!("Invalid date '{value}', expected YYYY-MM-DD"));
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| invalid())?;
    if !(1..=9999).contains(&date.year()) {
        return Err(invalid());
    }
    Ok(date)
}

/// The date `days` before `date`, kept within the years `parse_date` accepts.
pub fn days_before(date: NaiveDate, days: u64) -> ActionResult<NaiveDate> {
    date.checked_sub_days(Days::new(days))
        .filter(|start| start.year() >= 1)
        .ok_or_else(|| {
            ActionError::validation(format!(
                "Date range before {} starts before year 1",
                format_date(date)
            ))
        })
}

fn parse_time(value: &str) -> ActionResult<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| ActionError::validation(format!("Invalid time '{value}', expected HH:MM")))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

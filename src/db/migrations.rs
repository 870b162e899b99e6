//! Additive schema migrations.
//!
//! Each step names the schema object it introduces and is applied only when
//! that object is missing, so the whole list can run on every start. Steps
//! never drop or rename anything. Pending steps are applied in a single
//! transaction; a failing step rolls the whole batch back.

use serde::Serialize;
use sqlx::{Sqlite, SqliteConnection, Transaction};

use super::connection::Db;
use super::schema::{CREATE_PRODUCTS, CREATE_SALES, CREATE_SALE_ITEMS};
use crate::error::{DbError, DbResult};

pub const CREATE_APPOINTMENT_DETAILS: &str = r#"CREATE VIEW IF NOT EXISTS appointment_details AS
SELECT a.id,
       a.customer_id,
       c.name AS customer_name,
       c.phone AS customer_phone,
       a.service_id,
       s.name AS service_name,
       s.price AS service_price,
       a.date,
       a.time,
       a.duration,
       a.status,
       a.notes,
       a.payment_status,
       a.payment_method
FROM appointments a
LEFT JOIN customers c ON c.id = a.customer_id
LEFT JOIN services s ON s.id = a.service_id"#;

/// The schema object whose presence marks a step as applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Probe {
    Table(&'static str),
    View(&'static str),
    Column {
        table: &'static str,
        column: &'static str,
    },
}

#[derive(Clone, Copy, Debug)]
pub struct MigrationStep {
    pub name: &'static str,
    pub probe: Probe,
    pub statements: &'static [&'static str],
}

pub const STEPS: &[MigrationStep] = &[
    MigrationStep {
        name: "appointments_payment_status",
        probe: Probe::Column {
            table: "appointments",
            column: "payment_status",
        },
        statements: &[
            "ALTER TABLE appointments ADD COLUMN payment_status TEXT NOT NULL DEFAULT 'pending'",
        ],
    },
    MigrationStep {
        name: "appointments_payment_method",
        probe: Probe::Column {
            table: "appointments",
            column: "payment_method",
        },
        statements: &["ALTER TABLE appointments ADD COLUMN payment_method TEXT"],
    },
    MigrationStep {
        name: "create_products",
        probe: Probe::Table("products"),
        statements: &[CREATE_PRODUCTS],
    },
    MigrationStep {
        name: "create_sales",
        probe: Probe::Table("sales"),
        statements: &[CREATE_SALES],
    },
    MigrationStep {
        name: "create_sale_items",
        probe: Probe::Table("sale_items"),
        statements: &[CREATE_SALE_ITEMS],
    },
    MigrationStep {
        name: "sale_items_item_id",
        probe: Probe::Column {
            table: "sale_items",
            column: "item_id",
        },
        statements: &["ALTER TABLE sale_items ADD COLUMN item_id TEXT"],
    },
    MigrationStep {
        name: "sale_items_item_type",
        probe: Probe::Column {
            table: "sale_items",
            column: "item_type",
        },
        statements: &["ALTER TABLE sale_items ADD COLUMN item_type TEXT NOT NULL DEFAULT 'product'"],
    },
    MigrationStep {
        name: "sale_items_name",
        probe: Probe::Column {
            table: "sale_items",
            column: "name",
        },
        statements: &["ALTER TABLE sale_items ADD COLUMN name TEXT"],
    },
    MigrationStep {
        name: "sale_items_quantity",
        probe: Probe::Column {
            table: "sale_items",
            column: "quantity",
        },
        statements: &["ALTER TABLE sale_items ADD COLUMN quantity INTEGER NOT NULL DEFAULT 1"],
    },
    MigrationStep {
        name: "appointment_details_view",
        probe: Probe::View("appointment_details"),
        statements: &[CREATE_APPOINTMENT_DETAILS],
    },
];

#[derive(Clone, Debug, Default, Serialize)]
pub struct MigrationReport {
    pub applied: Vec<&'static str>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

pub async fn migrate(db: &Db) -> DbResult<MigrationReport> {
    let mut tx: Transaction<'_, Sqlite> = db.pool().begin().await?;
    let mut report = MigrationReport::default();

    for step in STEPS {
        let present = probe(&mut tx, step.probe)
            .await
            .map_err(|source| DbError::Migration {
                step: step.name,
                source,
            })?;
        if present {
            continue;
        }

        log::info!("Applying migration step {}", step.name);
        for statement in step.statements {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|source| {
                    log::error!("Migration step {} failed: {source}", step.name);
                    DbError::Migration {
                        step: step.name,
                        source,
                    }
                })?;
        }
        report.applied.push(step.name);
    }

    tx.commit().await?;

    if report.is_noop() {
        log::debug!("Schema is up to date");
    } else {
        log::info!("Applied {} migration step(s)", report.applied.len());
    }
    Ok(report)
}

/// Names of steps whose schema object is still missing.
pub async fn pending(db: &Db) -> DbResult<Vec<&'static str>> {
    let mut conn = db.pool().acquire().await?;
    let mut missing = Vec::new();
    for step in STEPS {
        if !probe(&mut conn, step.probe).await? {
            missing.push(step.name);
        }
    }
    Ok(missing)
}

async fn probe(conn: &mut SqliteConnection, probe: Probe) -> Result<bool, sqlx::Error> {
    let count: i64 = match probe {
        Probe::Table(name) => {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(name)
            .fetch_one(&mut *conn)
            .await?
        }
        Probe::View(name) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'view' AND name = ?")
                .bind(name)
                .fetch_one(&mut *conn)
                .await?
        }
        Probe::Column { table, column } => {
            sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
                .bind(table)
                .bind(column)
                .fetch_one(&mut *conn)
                .await?
        }
    };
    Ok(count > 0)
}

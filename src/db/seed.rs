use chrono::{Local, Utc};
use serde::Serialize;

use super::connection::Db;
use super::executor::SqlValue;
use crate::error::DbResult;
use crate::models::{new_id, STATUS_CONFIRMED, STATUS_PENDING};

const SAMPLE_CUSTOMERS: [(&str, &str, &str); 3] = [
    ("Marcus Reed", "555-0101", "marcus.reed@example.com"),
    ("Diego Alvarez", "555-0102", "diego.alvarez@example.com"),
    ("Sam Okafor", "555-0103", "sam.okafor@example.com"),
];

const SAMPLE_SERVICES: [(&str, i64, f64, &str); 4] = [
    ("Signature Cut", 45, 35.0, "Precision cut, styling, and lineup."),
    ("Fade & Line-Up", 35, 30.0, "Skin fade with sharp finishing touches."),
    ("Beard Sculpt", 25, 20.0, "Shape, trim, and conditioning for the beard."),
    ("Full Grooming", 60, 55.0, "Cut, beard, and grooming refresh."),
];

const SAMPLE_PRODUCTS: [(&str, &str, f64, i64, &str); 4] = [
    ("Matte Clay Pomade", "styling", 18.0, 24, "Strong hold, no shine."),
    ("Cedar Beard Oil", "beard", 22.0, 12, "Softens and conditions."),
    ("Sea Salt Spray", "styling", 15.0, 3, "Texture and volume."),
    ("Boar Bristle Brush", "tools", 12.5, 8, "Daily grooming brush."),
];

/// (customer index, service index, time, status)
const SAMPLE_APPOINTMENTS: [(usize, usize, &str, &str); 3] = [
    (0, 0, "10:00", STATUS_CONFIRMED),
    (1, 1, "11:30", STATUS_CONFIRMED),
    (2, 2, "14:00", STATUS_PENDING),
];

#[derive(Clone, Debug, Default, Serialize)]
pub struct SeedReport {
    pub customers: usize,
    pub services: usize,
    pub products: usize,
    pub appointments: usize,
}

/// Inserts the sample rows into each table that has none.
pub async fn seed_if_empty(db: &Db) -> DbResult<SeedReport> {
    let mut report = SeedReport::default();
    let now = Utc::now().to_rfc3339();

    if is_empty(db, "customers").await? {
        for (name, phone, email) in SAMPLE_CUSTOMERS {
            db.execute(
                "INSERT INTO customers (id, name, phone, email, visit_count, created_at) VALUES (?, ?, ?, ?, 0, ?)",
                &[new_id().into(), name.into(), phone.into(), email.into(), now.as_str().into()],
            )
            .await?;
            report.customers += 1;
        }
    }

    if is_empty(db, "services").await? {
        for (name, duration, price, description) in SAMPLE_SERVICES {
            db.execute(
                "INSERT INTO services (id, name, duration, price, description, created_at) VALUES (?, ?, ?, ?, ?, ?)",
                &[
                    new_id().into(),
                    name.into(),
                    duration.into(),
                    price.into(),
                    description.into(),
                    now.as_str().into(),
                ],
            )
            .await?;
            report.services += 1;
        }
    }

    if is_empty(db, "products").await? {
        for (name, category, price, stock, description) in SAMPLE_PRODUCTS {
            db.execute(
                "INSERT INTO products (id, name, category, price, stock, description, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
                &[
                    new_id().into(),
                    name.into(),
                    category.into(),
                    price.into(),
                    stock.into(),
                    description.into(),
                    now.as_str().into(),
                ],
            )
            .await?;
            report.products += 1;
        }
    }

    if is_empty(db, "appointments").await? {
        let customers: Vec<(String,)> = db
            .fetch_all("SELECT id FROM customers ORDER BY rowid", &[])
            .await?;
        let services: Vec<(String, i64)> = db
            .fetch_all("SELECT id, duration FROM services ORDER BY rowid", &[])
            .await?;
        let today = Local::now().date_naive().format("%Y-%m-%d").to_string();

        for (customer, service, time, status) in SAMPLE_APPOINTMENTS {
            let (Some((customer_id,)), Some((service_id, duration))) =
                (customers.get(customer), services.get(service))
            else {
                continue;
            };
            db.execute(
                "INSERT INTO appointments (id, customer_id, service_id, date, time, duration, status, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                &[
                    new_id().into(),
                    customer_id.into(),
                    service_id.into(),
                    today.as_str().into(),
                    time.into(),
                    SqlValue::Int(*duration),
                    status.into(),
                    now.as_str().into(),
                ],
            )
            .await?;
            report.appointments += 1;
        }
    }

    log::info!(
        "Seeded {} customers, {} services, {} products, {} appointments.",
        report.customers,
        report.services,
        report.products,
        report.appointments
    );
    Ok(report)
}

async fn is_empty(db: &Db, table: &str) -> DbResult<bool> {
    let count: Option<i64> = db
        .fetch_scalar(&format!("SELECT COUNT(*) FROM {table}"), &[])
        .await?;
    Ok(count.unwrap_or(0) == 0)
}

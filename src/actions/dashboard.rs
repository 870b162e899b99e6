use serde::Serialize;

use super::{
    appointments, days_before, format_date, or_empty, parse_date, products, ActionError,
    ActionResult,
};
use crate::db::executor::SqlValue;
use crate::db::Db;
use crate::models::{
    round_cents, Appointment, Product, LOW_STOCK_THRESHOLD, SALE_TYPE_PRODUCT, SALE_TYPE_SERVICE,
    STATUS_CANCELLED, STATUS_COMPLETED, STATUS_CONFIRMED, STATUS_PENDING,
};

const TOP_ITEMS_LIMIT: i64 = 5;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AppointmentCounts {
    pub count: i64,
    pub confirmed: i64,
    pub pending: i64,
    pub completed: i64,
    pub cancelled: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct DashboardStats {
    pub date: String,
    pub appointments: AppointmentCounts,
    pub customers: i64,
    pub services: i64,
    pub products: i64,
    pub low_stock: i64,
    pub revenue_today: f64,
    pub revenue_week: f64,
    pub todays_appointments: Vec<Appointment>,
    pub low_stock_products: Vec<Product>,
}

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct TopItem {
    pub name: String,
    pub item_type: String,
    pub units: i64,
    pub revenue: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct SalesReport {
    pub from: String,
    pub to: String,
    pub sale_count: i64,
    pub total: f64,
    pub service_total: f64,
    pub product_total: f64,
    pub top_items: Vec<TopItem>,
}

/// Figures for the dashboard on `date`. Weekly revenue covers the seven days
/// ending on `date`.
pub async fn dashboard_stats(db: &Db, date: &str) -> ActionResult<DashboardStats> {
    let day = parse_date(date)?;
    let date = format_date(day);
    let week_start = format_date(days_before(day, 6)?);

    let by_status = "SELECT COUNT(*) FROM appointments WHERE date = ? AND status = ?";
    let counts = AppointmentCounts {
        count: db
            .count("SELECT COUNT(*) FROM appointments WHERE date = ?", &[date.as_str().into()])
            .await,
        confirmed: db
            .count(by_status, &[date.as_str().into(), STATUS_CONFIRMED.into()])
            .await,
        pending: db
            .count(by_status, &[date.as_str().into(), STATUS_PENDING.into()])
            .await,
        completed: db
            .count(by_status, &[date.as_str().into(), STATUS_COMPLETED.into()])
            .await,
        cancelled: db
            .count(by_status, &[date.as_str().into(), STATUS_CANCELLED.into()])
            .await,
    };

    let stats = DashboardStats {
        appointments: counts,
        customers: db.count("SELECT COUNT(*) FROM customers", &[]).await,
        services: db.count("SELECT COUNT(*) FROM services", &[]).await,
        products: db.count("SELECT COUNT(*) FROM products", &[]).await,
        low_stock: db
            .count(
                "SELECT COUNT(*) FROM products WHERE stock < ?",
                &[LOW_STOCK_THRESHOLD.into()],
            )
            .await,
        revenue_today: sum(
            db,
            "SELECT COALESCE(SUM(total), 0.0) FROM sales WHERE date = ?",
            &[date.as_str().into()],
        )
        .await,
        revenue_week: sum(
            db,
            "SELECT COALESCE(SUM(total), 0.0) FROM sales WHERE date BETWEEN ? AND ?",
            &[week_start.into(), date.as_str().into()],
        )
        .await,
        todays_appointments: appointments::get_by_date(db, &date).await,
        low_stock_products: products::low_stock(db).await,
        date,
    };
    Ok(stats)
}

/// Sales between `from` and `to`, both inclusive.
pub async fn sales_report(db: &Db, from: &str, to: &str) -> ActionResult<SalesReport> {
    let from_day = parse_date(from)?;
    let to_day = parse_date(to)?;
    if from_day > to_day {
        return Err(ActionError::validation(format!(
            "Report start {from} is after its end {to}"
        )));
    }
    let from = format_date(from_day);
    let to = format_date(to_day);
    let range = || -> Vec<SqlValue> { vec![from.as_str().into(), to.as_str().into()] };
    let by_type = |sale_type: &str| -> Vec<SqlValue> {
        vec![from.as_str().into(), to.as_str().into(), sale_type.into()]
    };

    let by_type_sql =
        "SELECT COALESCE(SUM(total), 0.0) FROM sales WHERE date BETWEEN ? AND ? AND type = ?";
    let sale_count = db
        .count("SELECT COUNT(*) FROM sales WHERE date BETWEEN ? AND ?", &range())
        .await;
    let total = sum(
        db,
        "SELECT COALESCE(SUM(total), 0.0) FROM sales WHERE date BETWEEN ? AND ?",
        &range(),
    )
    .await;
    let service_total = sum(db, by_type_sql, &by_type(SALE_TYPE_SERVICE)).await;
    let product_total = sum(db, by_type_sql, &by_type(SALE_TYPE_PRODUCT)).await;

    let mut params = range();
    params.push(TOP_ITEMS_LIMIT.into());
    let top_items: Vec<TopItem> = or_empty(
        db.fetch_all(
            r#"SELECT COALESCE(i.name, i.item_id, 'unknown') AS name,
                   i.item_type,
                   SUM(i.quantity) AS units,
                   COALESCE(SUM(i.price * i.quantity), 0.0) AS revenue
            FROM sale_items i
            JOIN sales s ON s.id = i.sale_id
            WHERE s.date BETWEEN ? AND ?
            GROUP BY 1, 2
            ORDER BY units DESC, name
            LIMIT ?"#,
            &params,
        )
        .await,
        "top sale items",
    );

    Ok(SalesReport {
        from,
        to,
        sale_count,
        total,
        service_total,
        product_total,
        top_items: top_items
            .into_iter()
            .map(|item| TopItem {
                revenue: round_cents(item.revenue),
                ..item
            })
            .collect(),
    })
}

async fn sum(db: &Db, sql: &str, params: &[SqlValue]) -> f64 {
    match db.fetch_scalar::<f64>(sql, params).await {
        Ok(value) => round_cents(value.unwrap_or(0.0)),
        Err(err) => {
            log::error!("Revenue query failed: {err}");
            0.0
        }
    }
}

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use super::{failure, respond};
use crate::actions::{dashboard, days_before, format_date, parse_date, today};
use crate::state::AppState;

/// Report window when no start date is given.
const DEFAULT_REPORT_DAYS: u64 = 30;

#[derive(Debug, Deserialize)]
struct StatsQuery {
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReportQuery {
    from: Option<String>,
    to: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/dashboard-stats").route(web::get().to(dashboard_stats)))
        .service(web::resource("/api/reports/sales").route(web::get().to(sales_report)));
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

async fn dashboard_stats(
    state: web::Data<AppState>,
    query: web::Query<StatsQuery>,
) -> HttpResponse {
    let date = non_blank(&query.date).unwrap_or_else(|| format_date(today()));
    respond(dashboard::dashboard_stats(&state.db, &date).await)
}

async fn sales_report(state: web::Data<AppState>, query: web::Query<ReportQuery>) -> HttpResponse {
    let to = non_blank(&query.to).unwrap_or_else(|| format_date(today()));
    let from = match non_blank(&query.from) {
        Some(from) => from,
        None => {
            let start = parse_date(&to).and_then(|end| days_before(end, DEFAULT_REPORT_DAYS - 1));
            match start {
                Ok(start) => format_date(start),
                Err(err) => return failure(err.to_string()),
            }
        }
    };
    respond(dashboard::sales_report(&state.db, &from, &to).await)
}

use actix_web::{web, HttpResponse};
use serde::Serialize;

use super::{failure, success};
use crate::db::{self, migrations, BackendMode, CheckStatus, ConnectionCheck};
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct DbCheck {
    check: ConnectionCheck,
    mode: BackendMode,
    reachable: bool,
    pending_migrations: Vec<&'static str>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/db-check").route(web::get().to(db_check)))
        .service(web::resource("/api/db-init").route(web::get().to(db_init)))
        .service(web::resource("/api/db-reset").route(web::get().to(db_reset)));
}

async fn db_check(state: web::Data<AppState>) -> HttpResponse {
    let check = db::check_connection_string(state.config.db.database_url.as_deref()).await;
    let pending_migrations = match migrations::pending(&state.db).await {
        Ok(pending) => pending,
        Err(err) => {
            log::warn!("Could not inspect schema: {err}");
            Vec::new()
        }
    };

    let ok = check.status == CheckStatus::Ok;
    let message = check.message.clone();
    let body = DbCheck {
        check,
        mode: state.db.mode(),
        reachable: state.db.ensure_connection().await,
        pending_migrations,
    };

    HttpResponse::Ok().json(super::Envelope {
        success: ok,
        message: Some(message),
        data: Some(body),
    })
}

async fn db_init(state: web::Data<AppState>) -> HttpResponse {
    match db::bootstrap(&state.db, true).await {
        Ok(report) => {
            let message = if report.migrations.is_noop() {
                "Database initialized; schema already up to date".to_string()
            } else {
                format!(
                    "Database initialized; applied {}",
                    report.migrations.applied.join(", ")
                )
            };
            success(Some(message), report)
        }
        Err(err) => {
            log::error!("Database initialization failed: {err}");
            failure(err.to_string())
        }
    }
}

async fn db_reset(state: web::Data<AppState>) -> HttpResponse {
    log::warn!("Resetting database ({:?} backend)", state.db.mode());
    match db::reset(&state.db, true).await {
        Ok(report) => success(Some("Database reset and reseeded".to_string()), report),
        Err(err) => {
            log::error!("Database reset failed: {err}");
            failure(err.to_string())
        }
    }
}

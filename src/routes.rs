pub mod admin;
pub mod dashboard;
pub mod public;

use actix_web::error::InternalError;
use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::actions::{ActionError, ActionResult};

/// Body shared by every `/api` endpoint. Failures are reported here, with a
/// 200 status, rather than through the status code.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

pub fn success<T: Serialize>(message: Option<String>, data: T) -> HttpResponse {
    HttpResponse::Ok().json(Envelope {
        success: true,
        message,
        data: Some(data),
    })
}

pub fn failure(message: impl Into<String>) -> HttpResponse {
    HttpResponse::Ok().json(Envelope::<()> {
        success: false,
        message: Some(message.into()),
        data: None,
    })
}

pub fn respond<T: Serialize>(result: ActionResult<T>) -> HttpResponse {
    match result {
        Ok(data) => success(None, data),
        Err(ActionError::Database(err)) => {
            log::error!("Request failed: {err}");
            failure(err.to_string())
        }
        Err(err) => failure(err.to_string()),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    // Malformed query strings get the same envelope instead of a 400.
    let query_config = web::QueryConfig::default().error_handler(|err, _req| {
        let message = format!("Invalid query string: {err}");
        InternalError::from_response(err, failure(message)).into()
    });

    cfg.app_data(query_config)
        .configure(public::configure)
        .configure(admin::configure)
        .configure(dashboard::configure);
}

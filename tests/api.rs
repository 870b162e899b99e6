use actix_web::{test, web, App};
use serde_json::Value;

use chairside::config::{AppConfig, RetryPolicy};
use chairside::db::Db;
use chairside::routes;
use chairside::state::AppState;

async fn fixture_state() -> AppState {
    let config = AppConfig::from_lookup(|_| None);
    let db = Db::fixture(RetryPolicy::none()).await.unwrap();
    AppState::new(db, config)
}

async fn get_json(state: AppState, path: &str) -> Value {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(routes::configure),
    )
    .await;
    let resp = test::call_service(&app, test::TestRequest::get().uri(path).to_request()).await;
    assert!(resp.status().is_success(), "{path} returned {}", resp.status());
    test::read_body_json(resp).await
}

#[actix_web::test]
async fn health_reports_fixture_mode() {
    let body = get_json(fixture_state().await, "/health").await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["mode"], "fixture");
}

#[actix_web::test]
async fn db_check_without_url_reports_missing() {
    let body = get_json(fixture_state().await, "/api/db-check").await;
    assert_eq!(body["success"], false);
    assert_eq!(body["data"]["check"]["status"], "missing");
    assert_eq!(body["data"]["mode"], "fixture");
    assert_eq!(body["data"]["reachable"], true);
    assert_eq!(body["data"]["pending_migrations"], Value::Array(Vec::new()));
}

#[actix_web::test]
async fn db_check_accepts_configured_file() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("shop.db").display());
    let config = AppConfig::from_lookup(|key| (key == "DATABASE_URL").then(|| url.clone()));
    let db = Db::connect(&config.db).await.unwrap();
    let body = get_json(AppState::new(db, config), "/api/db-check").await;

    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["check"]["status"], "ok");
    assert_eq!(body["data"]["mode"], "connected");
}

#[actix_web::test]
async fn db_check_rejects_foreign_urls() {
    let mut state = fixture_state().await;
    state.config.db.database_url = Some("postgres://localhost/shop".to_string());
    let body = get_json(state, "/api/db-check").await;
    assert_eq!(body["success"], false);
    assert_eq!(body["data"]["check"]["status"], "invalid");
}

#[actix_web::test]
async fn db_init_on_current_schema_applies_nothing() {
    let body = get_json(fixture_state().await, "/api/db-init").await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["migrations"]["applied"], Value::Array(Vec::new()));
    assert_eq!(body["data"]["seed"]["customers"], 0);
}

#[actix_web::test]
async fn dashboard_stats_summarise_seeded_day() {
    let body = get_json(fixture_state().await, "/api/dashboard-stats").await;
    assert_eq!(body["success"], true);
    let data = &body["data"];
    assert_eq!(data["appointments"]["count"], 3);
    assert_eq!(data["appointments"]["confirmed"], 2);
    assert_eq!(data["appointments"]["pending"], 1);
    assert_eq!(data["customers"], 3);
    assert_eq!(data["services"], 4);
    assert_eq!(data["products"], 4);
    assert_eq!(data["low_stock"], 1);
    assert_eq!(data["todays_appointments"].as_array().map(Vec::len), Some(3));
}

#[actix_web::test]
async fn dashboard_stats_reject_malformed_date() {
    let body = get_json(fixture_state().await, "/api/dashboard-stats?date=tomorrow").await;
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("Invalid date"));
    assert!(body.get("data").is_none());
}

#[actix_web::test]
async fn dashboard_stats_reject_out_of_range_year() {
    let body = get_json(fixture_state().await, "/api/dashboard-stats?date=-262143-01-01").await;
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("Invalid date"));
}

#[actix_web::test]
async fn duplicated_query_key_is_reported_in_envelope() {
    let body = get_json(
        fixture_state().await,
        "/api/dashboard-stats?date=2030-01-01&date=2030-01-02",
    )
    .await;
    assert_eq!(body["success"], false);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Invalid query string"));
}

#[actix_web::test]
async fn sales_report_rejects_out_of_range_end() {
    let state = fixture_state().await;
    let body = get_json(state.clone(), "/api/reports/sales?to=-262143-01-02").await;
    assert_eq!(body["success"], false);

    let body = get_json(state, "/api/reports/sales?to=0001-01-10").await;
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("before year 1"));
}

#[actix_web::test]
async fn sales_report_defaults_and_reversed_range() {
    let state = fixture_state().await;
    let body = get_json(state.clone(), "/api/reports/sales").await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["sale_count"], 0);

    let body = get_json(state, "/api/reports/sales?from=2030-02-01&to=2030-01-01").await;
    assert_eq!(body["success"], false);
}

#[actix_web::test]
async fn db_reset_reseeds_sample_data() {
    let state = fixture_state().await;
    state
        .db
        .execute("DELETE FROM appointments", &[])
        .await
        .unwrap();

    let body = get_json(state.clone(), "/api/db-reset").await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["seed"]["appointments"], 3);

    let body = get_json(state, "/api/dashboard-stats").await;
    assert_eq!(body["data"]["appointments"]["count"], 3);
}

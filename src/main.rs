use actix_web::{middleware, web, App, HttpServer};

use chairside::config::AppConfig;
use chairside::db::{self, Db};
use chairside::routes;
use chairside::state::AppState;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(err) = run().await {
        eprintln!("Startup error: {err}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    let config = AppConfig::from_env();
    let db = Db::connect(&config.db).await?;

    // A failed bootstrap leaves the server up; /api/db-init can retry it.
    match db::bootstrap(&db, config.seed_on_start).await {
        Ok(report) if !report.migrations.is_noop() => {
            log::info!("Migrated: {}", report.migrations.applied.join(", "));
        }
        Ok(_) => {}
        Err(err) => log::error!("Database bootstrap failed: {err}"),
    }

    let address = format!("0.0.0.0:{}", config.port);
    let state = AppState::new(db, config);
    log::info!("Starting Chairside on http://{address} ({:?} backend)", state.db.mode());

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(middleware::Logger::default())
            .configure(routes::configure)
    })
    .bind(address)?
    .run()
    .await?;

    Ok(())
}

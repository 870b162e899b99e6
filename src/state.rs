use crate::config::AppConfig;
use crate::db::Db;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(db: Db, config: AppConfig) -> Self {
        Self { db, config }
    }
}

use std::sync::Arc;

use crate::booking::engine::BookingEngine;
use crate::shared::config::AppConfig;
use crate::shared::utils::DbPool;

pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
    pub engine: Arc<BookingEngine>,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            config: self.config.clone(),
            engine: Arc::clone(&self.engine),
        }
    }
}

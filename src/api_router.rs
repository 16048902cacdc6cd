//! Combines the API endpoints from all modules into a unified router.

use axum::Router;
use std::sync::Arc;

use crate::shared::state::AppState;

/// Configure all API routes from all modules
pub fn configure_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // ===== Viewing appointments (booking module) =====
        .merge(crate::booking::configure())
}

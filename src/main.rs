use std::sync::Arc;

use axum::Router;
use dotenvy::dotenv;
use log::info;
use tower_http::cors::CorsLayer;

use visitaserver::api_router::configure_api_routes;
use visitaserver::booking::engine::BookingEngine;
use visitaserver::booking::store::{
    PgAppointmentStore, PgClientStore, PgPropertyResolver, PgSlotStore,
};
use visitaserver::shared::config::AppConfig;
use visitaserver::shared::state::AppState;
use visitaserver::shared::utils::create_conn;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config = AppConfig::from_env();
    let pool = create_conn()?;

    let engine = Arc::new(BookingEngine::new(
        Arc::new(PgSlotStore::new(pool.clone())),
        Arc::new(PgAppointmentStore::new(pool.clone())),
        Arc::new(PgClientStore::new(pool.clone())),
        Arc::new(PgPropertyResolver::new(pool.clone())),
    ));

    let state = Arc::new(AppState {
        conn: pool,
        config: config.clone(),
        engine,
    });

    let app = Router::new()
        .merge(configure_api_routes())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("visitaserver listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

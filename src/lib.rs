// src/lib.rs

use axum::{routing::get, Router};
use sea_orm::DatabaseConnection;
use services::fleet::StatusRegistry;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub supervisors: StatusRegistry,
}

pub mod entities {
    pub mod prelude;
    pub mod currencies;
    pub mod currency_exchangers;
    pub mod exchangers;
    pub mod markets;
    pub mod order_book_asks;
    pub mod order_book_bids;
    pub mod order_books;
    pub mod price_vols;
    pub mod symbols;
    pub mod tickers;
    pub mod trades;
}

pub mod services {
    pub mod store;
    pub mod resolver;
    pub mod recorder;
    pub mod exchange;
    pub mod supervisor;
    pub mod fleet;
    pub mod bootstrap;
    pub mod bitget_client;
}

pub mod handlers {
    pub mod status;
}

pub mod config;
pub mod models;

/// Status surface: `/health` and `/supervisors`
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::status::health))
        .route("/supervisors", get(handlers::status::list_supervisors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

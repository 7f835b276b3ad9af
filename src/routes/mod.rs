pub mod api;
pub mod pages;
pub mod selection;

use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(pages::routes())
        .merge(api::routes())
        .merge(selection::routes())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

use axum::{
    response::{Html, IntoResponse},
    routing::get,
    Router,
};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
}

async fn index() -> impl IntoResponse {
    Html(include_str!("../../static/index.html"))
}

async fn health() -> &'static str {
    "OK"
}

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use railmap_core::UserAction;

use crate::models::{SelectRequest, SelectionResponse};
use crate::routes::api::queue_action;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/api/selection",
        get(get_selection).post(select).delete(deselect),
    )
}

/// GET /api/selection - Selected train and its timetable.
pub async fn get_selection(State(state): State<AppState>) -> Json<SelectionResponse> {
    let snapshot = state.snapshot();
    Json(SelectionResponse {
        selection: snapshot.selection.clone(),
        train: snapshot.selected_train.clone(),
        timetable: snapshot.timetable.clone(),
    })
}

/// POST /api/selection - Select a train by id.
pub async fn select(State(state): State<AppState>, Json(req): Json<SelectRequest>) -> Response {
    if state.snapshot().train(&req.train_id).is_none() {
        return (StatusCode::NOT_FOUND, "Train not found").into_response();
    }
    queue_action(&state, UserAction::Select(req.train_id)).await
}

/// DELETE /api/selection - Return to the list.
pub async fn deselect(State(state): State<AppState>) -> Response {
    queue_action(&state, UserAction::Deselect).await
}

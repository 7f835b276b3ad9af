use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use railmap_core::{filter_by_number, UserAction};

use crate::models::{
    MarkersResponse, ServersResponse, StatusResponse, SwitchServerRequest, TrainsQuery,
    TrainsResponse,
};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/servers", get(get_servers))
        .route("/api/server", post(switch_server))
        .route("/api/trains", get(get_trains))
        .route("/api/markers", get(get_markers))
}

/// GET /api/status - Connection state and counters.
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.snapshot();
    Json(StatusResponse {
        status: snapshot.status.clone(),
        server: snapshot.server.clone(),
        train_count: snapshot.trains.len(),
        marker_count: snapshot.markers.len(),
        revision: snapshot.revision,
        updated_at: snapshot.updated_at,
    })
}

/// GET /api/servers - Servers announced by the hub.
pub async fn get_servers(State(state): State<AppState>) -> Json<ServersResponse> {
    let snapshot = state.snapshot();
    Json(ServersResponse {
        active: snapshot.server.clone(),
        servers: snapshot.servers.clone(),
    })
}

/// POST /api/server - Switch the simulation server.
pub async fn switch_server(
    State(state): State<AppState>,
    Json(req): Json<SwitchServerRequest>,
) -> Response {
    let code = req.code.trim().to_string();
    if code.is_empty() {
        return (StatusCode::BAD_REQUEST, "code is required").into_response();
    }
    queue_action(&state, UserAction::SwitchServer(code)).await
}

/// GET /api/trains?q=... - Trains whose number contains `q`.
pub async fn get_trains(
    State(state): State<AppState>,
    Query(query): Query<TrainsQuery>,
) -> Json<TrainsResponse> {
    let snapshot = state.snapshot();
    let trains = filter_by_number(&snapshot.trains, &query.q)
        .into_iter()
        .cloned()
        .collect();
    Json(TrainsResponse {
        query: query.q,
        total: snapshot.trains.len(),
        trains,
    })
}

/// GET /api/markers - Markers currently on the map and the focus point.
pub async fn get_markers(State(state): State<AppState>) -> Json<MarkersResponse> {
    let snapshot = state.snapshot();
    Json(MarkersResponse {
        markers: snapshot.markers.clone(),
        focus: snapshot.focus.clone(),
    })
}

/// Hand an action to the runtime. Accepted means queued, not applied.
pub(crate) async fn queue_action(state: &AppState, action: UserAction) -> Response {
    match state.actions.send(action).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => {
            tracing::error!("Runtime is not accepting actions: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "Dashboard is not running").into_response()
        }
    }
}

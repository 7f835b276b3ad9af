use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use railmap_core::{
    ConnectionStatus, Dashboard, Selection, ServerEntity, TimetableView, TrainEntity, TrainId,
};

use crate::map::{MapFocus, MarkerLayer, MarkerView};

/// Immutable view of the dashboard, published after every input.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub status: ConnectionStatus,
    pub server: String,
    pub servers: Vec<ServerEntity>,
    /// Trains in server order.
    pub trains: Vec<TrainEntity>,
    pub markers: Vec<MarkerView>,
    pub focus: Option<MapFocus>,
    pub selection: Selection,
    pub selected_train: Option<TrainEntity>,
    pub timetable: TimetableView,
    /// Bumped on every publish.
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

impl DashboardSnapshot {
    pub fn empty(server: &str) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            server: server.to_string(),
            servers: Vec::new(),
            trains: Vec::new(),
            markers: Vec::new(),
            focus: None,
            selection: Selection::None,
            selected_train: None,
            timetable: TimetableView::Idle,
            revision: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn capture(dashboard: &Dashboard<MarkerLayer>, revision: u64) -> Self {
        Self {
            status: dashboard.status().clone(),
            server: dashboard.active_server().to_string(),
            servers: dashboard.servers().to_vec(),
            trains: dashboard.store().iter().cloned().collect(),
            markers: dashboard.map().markers().cloned().collect(),
            focus: dashboard.map().focus().cloned(),
            selection: dashboard.selection().clone(),
            selected_train: dashboard.selected_train().cloned(),
            timetable: dashboard.timetable().clone(),
            revision,
            updated_at: Utc::now(),
        }
    }

    pub fn train(&self, id: &TrainId) -> Option<&TrainEntity> {
        self.trains.iter().find(|train| &train.id == id)
    }
}

/// Response for GET /api/status.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: ConnectionStatus,
    pub server: String,
    pub train_count: usize,
    pub marker_count: usize,
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

/// Query parameters for GET /api/trains.
#[derive(Debug, Deserialize)]
pub struct TrainsQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct TrainsResponse {
    pub query: String,
    pub total: usize,
    pub trains: Vec<TrainEntity>,
}

#[derive(Debug, Serialize)]
pub struct ServersResponse {
    pub active: String,
    pub servers: Vec<ServerEntity>,
}

#[derive(Debug, Serialize)]
pub struct MarkersResponse {
    pub markers: Vec<MarkerView>,
    pub focus: Option<MapFocus>,
}

#[derive(Debug, Serialize)]
pub struct SelectionResponse {
    pub selection: Selection,
    pub train: Option<TrainEntity>,
    pub timetable: TimetableView,
}

/// Request body for POST /api/selection.
#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub train_id: TrainId,
}

/// Request body for POST /api/server.
#[derive(Debug, Deserialize)]
pub struct SwitchServerRequest {
    pub code: String,
}

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use railmap_core::UserAction;

use crate::models::DashboardSnapshot;

/// Application state shared across handlers.
///
/// Handlers read the latest snapshot and queue actions for the runtime;
/// they never touch the dashboard itself.
#[derive(Clone)]
pub struct AppState {
    pub snapshot: watch::Receiver<Arc<DashboardSnapshot>>,
    pub actions: mpsc::Sender<UserAction>,
}

impl AppState {
    pub fn new(
        snapshot: watch::Receiver<Arc<DashboardSnapshot>>,
        actions: mpsc::Sender<UserAction>,
    ) -> Self {
        Self { snapshot, actions }
    }

    pub fn snapshot(&self) -> Arc<DashboardSnapshot> {
        Arc::clone(&self.snapshot.borrow())
    }
}

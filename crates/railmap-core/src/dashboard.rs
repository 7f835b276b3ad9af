use crate::error::FetchError;
use crate::event::{ChannelEvent, ConnectionStatus, UserAction};
use crate::filter::filter_by_number;
use crate::marker::{MapSurface, MarkerReconciler};
use crate::selection::{Selection, SelectionManager};
use crate::store::{StoreChange, TrainStore};
use crate::timetable::{
    Completion, Timetable, TimetableCoordinator, TimetableRequest, TimetableView,
};
use crate::train::{ServerEntity, TrainEntity};

/// A request the network layer must carry out on behalf of the dashboard.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    RequestServers,
    SwitchServer(String),
    FetchTimetable(TimetableRequest),
}

/// The synchronization engine.
///
/// Every inbound event and user action goes through here, one at a time.
/// Each store mutation is followed by marker reconciliation and a selection
/// check, so derived state never lags the store.
pub struct Dashboard<M: MapSurface> {
    store: TrainStore,
    markers: MarkerReconciler<M::Handle>,
    selection: SelectionManager,
    timetable: TimetableCoordinator,
    map: M,
    servers: Vec<ServerEntity>,
    active_server: String,
    status: ConnectionStatus,
    focus_zoom: u8,
}

impl<M: MapSurface> Dashboard<M> {
    pub fn new(map: M, active_server: impl Into<String>, focus_zoom: u8) -> Self {
        Self {
            store: TrainStore::new(),
            markers: MarkerReconciler::new(),
            selection: SelectionManager::new(),
            timetable: TimetableCoordinator::new(),
            map,
            servers: Vec::new(),
            active_server: active_server.into(),
            status: ConnectionStatus::Connecting,
            focus_zoom,
        }
    }

    pub fn store(&self) -> &TrainStore {
        &self.store
    }

    pub fn markers(&self) -> &MarkerReconciler<M::Handle> {
        &self.markers
    }

    pub fn selection(&self) -> &Selection {
        self.selection.current()
    }

    /// The selected train's live record.
    pub fn selected_train(&self) -> Option<&TrainEntity> {
        self.selection.selected().and_then(|id| self.store.get(id))
    }

    pub fn timetable(&self) -> &TimetableView {
        self.timetable.view()
    }

    pub fn map(&self) -> &M {
        &self.map
    }

    pub fn servers(&self) -> &[ServerEntity] {
        &self.servers
    }

    pub fn active_server(&self) -> &str {
        &self.active_server
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn visible_trains(&self, query: &str) -> Vec<&TrainEntity> {
        filter_by_number(self.store.iter(), query)
    }

    pub fn handle_event(&mut self, event: ChannelEvent) -> Vec<Command> {
        match event {
            ChannelEvent::ServersReceived(servers) => {
                tracing::debug!("Received {} servers", servers.len());
                self.servers = servers;
                Vec::new()
            }
            ChannelEvent::TrainsReceived(trains) => {
                let change = self.store.apply_full_list(trains);
                self.after_store_change("trains", change);
                Vec::new()
            }
            ChannelEvent::TrainPositionsReceived(positions) => {
                let change = self.store.apply_position_snapshot(&positions);
                self.after_store_change("positions", change);
                Vec::new()
            }
            ChannelEvent::StatusChanged(status) => self.on_status(status),
        }
    }

    pub fn handle_action(&mut self, action: UserAction) -> Vec<Command> {
        match action {
            UserAction::Select(id) => {
                if let Err(e) = self.selection.select(id.clone(), &self.store) {
                    tracing::warn!("Ignoring selection: {}", e);
                    return Vec::new();
                }
                self.markers.focus(&id, self.focus_zoom, &mut self.map);
                vec![Command::FetchTimetable(self.timetable.begin(id))]
            }
            UserAction::Deselect => {
                self.selection.deselect();
                self.timetable.clear();
                self.map.clear_focus();
                Vec::new()
            }
            UserAction::SwitchServer(code) => {
                tracing::info!("Switching to server {}", code);
                self.active_server = code.clone();
                vec![Command::SwitchServer(code)]
            }
        }
    }

    pub fn complete_timetable(
        &mut self,
        request: &TimetableRequest,
        result: Result<Timetable, FetchError>,
    ) -> Completion {
        self.timetable.complete(request, result)
    }

    fn on_status(&mut self, status: ConnectionStatus) -> Vec<Command> {
        let was_connected = self.status.is_connected();
        tracing::info!("Connection status: {:?}", status);
        self.status = status;

        if self.status.is_connected() && !was_connected {
            // Fresh connection: ask for the server list and (re)subscribe to
            // the active server so the hub starts pushing snapshots.
            vec![
                Command::RequestServers,
                Command::SwitchServer(self.active_server.clone()),
            ]
        } else {
            Vec::new()
        }
    }

    fn after_store_change(&mut self, source: &str, change: StoreChange) {
        if change.ignored > 0 {
            tracing::debug!("Ignored {} unmatched positions", change.ignored);
        }
        if !change.is_empty() {
            tracing::debug!(
                "Applied {}: {} added, {} updated, {} removed",
                source,
                change.added,
                change.updated,
                change.removed
            );
        }

        self.markers.reconcile(&self.store, &mut self.map);
        if self.selection.on_store_changed(&self.store) {
            self.timetable.clear();
            self.map.clear_focus();
        }
    }
}

//! The single task that owns the dashboard.
//!
//! Hub events, user actions and timetable completions are applied one at a
//! time. Commands the dashboard emits run as spawned tasks; timetable
//! results come back through the completion queue. After every input a
//! fresh [`DashboardSnapshot`] is published.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use railmap_core::{
    ChannelEvent, Command, Dashboard, FetchError, Timetable, TimetableRequest, UserAction,
};
use railmap_hub::SimulationApi;

use crate::map::MarkerLayer;
use crate::models::DashboardSnapshot;

type TimetableCompletion = (TimetableRequest, Result<Timetable, FetchError>);

pub struct Runtime<A: SimulationApi + 'static> {
    dashboard: Dashboard<MarkerLayer>,
    api: Arc<A>,
    snapshot_tx: watch::Sender<Arc<DashboardSnapshot>>,
    completions_tx: mpsc::Sender<TimetableCompletion>,
    completions_rx: mpsc::Receiver<TimetableCompletion>,
    revision: u64,
}

impl<A: SimulationApi + 'static> Runtime<A> {
    pub fn new(
        dashboard: Dashboard<MarkerLayer>,
        api: Arc<A>,
        snapshot_tx: watch::Sender<Arc<DashboardSnapshot>>,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::channel(32);
        Self {
            dashboard,
            api,
            snapshot_tx,
            completions_tx,
            completions_rx,
            revision: 0,
        }
    }

    /// Run until the hub event stream ends.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<ChannelEvent>,
        mut actions: mpsc::Receiver<UserAction>,
    ) {
        self.publish();

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        tracing::info!("Hub event stream closed, stopping runtime");
                        break;
                    };
                    tracing::trace!("Applying {}", event.kind());
                    let commands = self.dashboard.handle_event(event);
                    self.execute(commands);
                }
                Some(action) = actions.recv() => {
                    let commands = self.dashboard.handle_action(action);
                    self.execute(commands);
                }
                Some((request, result)) = self.completions_rx.recv() => {
                    self.dashboard.complete_timetable(&request, result);
                }
            }
            self.publish();
        }
    }

    fn publish(&mut self) {
        self.revision += 1;
        let snapshot = DashboardSnapshot::capture(&self.dashboard, self.revision);
        self.snapshot_tx.send_replace(Arc::new(snapshot));
    }

    fn execute(&self, commands: Vec<Command>) {
        for command in commands {
            let api = Arc::clone(&self.api);
            match command {
                Command::RequestServers => {
                    tokio::spawn(async move {
                        if let Err(e) = api.get_servers().await {
                            tracing::warn!("Failed to request server list: {}", e);
                        }
                    });
                }
                Command::SwitchServer(code) => {
                    tokio::spawn(async move {
                        if let Err(e) = api.switch_server(&code).await {
                            tracing::warn!("Failed to switch to server {}: {}", code, e);
                        }
                    });
                }
                Command::FetchTimetable(request) => {
                    let completions_tx = self.completions_tx.clone();
                    tokio::spawn(async move {
                        let train_id = request.train_id.clone();
                        let result = api
                            .get_timetable(&train_id)
                            .await
                            .map_err(|e| FetchError::request(train_id, e.to_string()));
                        let _ = completions_tx.send((request, result)).await;
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio::sync::oneshot;

    use railmap_core::{
        ConnectionStatus, StopTime, TimetableStop, TimetableView, TrainEntity, TrainId,
    };
    use railmap_hub::HubError;

    /// Api whose timetable calls block until the test releases them.
    #[derive(Default)]
    struct ScriptedApi {
        gates: Mutex<HashMap<TrainId, oneshot::Receiver<Timetable>>>,
        switched: Mutex<Vec<String>>,
    }

    impl ScriptedApi {
        fn gate(&self, id: &str) -> oneshot::Sender<Timetable> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().insert(TrainId::new(id), rx);
            tx
        }
    }

    impl SimulationApi for ScriptedApi {
        async fn get_servers(&self) -> Result<(), HubError> {
            Ok(())
        }

        async fn switch_server(&self, code: &str) -> Result<(), HubError> {
            self.switched.lock().unwrap().push(code.to_string());
            Ok(())
        }

        async fn get_timetable(&self, train_id: &TrainId) -> Result<Timetable, HubError> {
            let gate = self.gates.lock().unwrap().remove(train_id);
            match gate {
                Some(rx) => rx.await.map_err(|_| HubError::ConnectionLost),
                None => Err(HubError::ConnectionLost),
            }
        }
    }

    fn make_train(id: &str, number: &str) -> TrainEntity {
        TrainEntity {
            id: TrainId::new(id),
            number: number.to_string(),
            route: "Kraków - Katowice".to_string(),
            category: "RE".to_string(),
            driver_name: None,
            velocity: 90.0,
            latitude: 50.0,
            longitude: 19.5,
        }
    }

    fn make_timetable(stop: &str) -> Timetable {
        Timetable {
            stops: vec![TimetableStop {
                name: stop.to_string(),
                arrival: Some(StopTime {
                    real_time: "08:00".to_string(),
                    delay_minutes: 0,
                }),
                departure: None,
            }],
        }
    }

    struct Harness {
        api: Arc<ScriptedApi>,
        events: mpsc::Sender<ChannelEvent>,
        actions: mpsc::Sender<UserAction>,
        snapshot: watch::Receiver<Arc<DashboardSnapshot>>,
    }

    impl Harness {
        fn start() -> Self {
            let api = Arc::new(ScriptedApi::default());
            let (snapshot_tx, snapshot) =
                watch::channel(Arc::new(DashboardSnapshot::empty("PL1")));
            let (events, events_rx) = mpsc::channel(8);
            let (actions, actions_rx) = mpsc::channel(8);
            let dashboard = Dashboard::new(MarkerLayer::new(), "PL1", 14);
            let runtime = Runtime::new(dashboard, Arc::clone(&api), snapshot_tx);
            tokio::spawn(runtime.run(events_rx, actions_rx));
            Self {
                api,
                events,
                actions,
                snapshot,
            }
        }

        async fn wait_for<F>(&mut self, predicate: F) -> Arc<DashboardSnapshot>
        where
            F: FnMut(&Arc<DashboardSnapshot>) -> bool,
        {
            let snapshot = tokio::time::timeout(
                Duration::from_secs(5),
                self.snapshot.wait_for(predicate),
            )
            .await
            .expect("timed out waiting for snapshot")
            .expect("runtime stopped");
            Arc::clone(&snapshot)
        }
    }

    #[tokio::test]
    async fn test_connect_subscribes_to_active_server() {
        let mut harness = Harness::start();
        harness
            .events
            .send(ChannelEvent::StatusChanged(ConnectionStatus::Connected))
            .await
            .unwrap();

        let snapshot = harness.wait_for(|s| s.status.is_connected()).await;
        assert_eq!(snapshot.server, "PL1");

        tokio::time::timeout(Duration::from_secs(5), async {
            while harness.api.switched.lock().unwrap().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(*harness.api.switched.lock().unwrap(), vec!["PL1".to_string()]);
    }

    #[tokio::test]
    async fn test_markers_follow_store() {
        let mut harness = Harness::start();
        harness
            .events
            .send(ChannelEvent::TrainsReceived(vec![
                make_train("a", "42100"),
                make_train("b", "100"),
            ]))
            .await
            .unwrap();

        let snapshot = harness.wait_for(|s| s.trains.len() == 2).await;
        assert_eq!(snapshot.markers.len(), 2);
        assert_eq!(snapshot.markers[0].label, "Train 42100");

        harness
            .events
            .send(ChannelEvent::TrainPositionsReceived(Vec::new()))
            .await
            .unwrap();

        let snapshot = harness.wait_for(|s| s.trains.is_empty()).await;
        assert!(snapshot.markers.is_empty());
    }

    #[tokio::test]
    async fn test_late_response_for_previous_selection_is_discarded() {
        let mut harness = Harness::start();
        let release_a = harness.api.gate("a");
        let release_b = harness.api.gate("b");

        harness
            .events
            .send(ChannelEvent::TrainsReceived(vec![
                make_train("a", "1"),
                make_train("b", "2"),
            ]))
            .await
            .unwrap();
        harness.wait_for(|s| s.trains.len() == 2).await;

        harness.actions.send(UserAction::Select(TrainId::new("a"))).await.unwrap();
        harness.actions.send(UserAction::Select(TrainId::new("b"))).await.unwrap();
        let snapshot = harness
            .wait_for(|s| s.selection.train_id() == Some(&TrainId::new("b")))
            .await;
        assert_eq!(
            snapshot.timetable,
            TimetableView::Loading {
                train_id: TrainId::new("b")
            }
        );

        // A's response arrives while B is selected.
        let before = snapshot.revision;
        release_a.send(make_timetable("Warszawa")).unwrap();
        let snapshot = harness.wait_for(|s| s.revision > before).await;
        assert_eq!(
            snapshot.timetable,
            TimetableView::Loading {
                train_id: TrainId::new("b")
            }
        );

        release_b.send(make_timetable("Katowice")).unwrap();
        let snapshot = harness
            .wait_for(|s| matches!(s.timetable, TimetableView::Loaded { .. }))
            .await;
        assert_eq!(
            snapshot.timetable,
            TimetableView::Loaded {
                train_id: TrainId::new("b"),
                timetable: make_timetable("Katowice"),
            }
        );
        assert_eq!(snapshot.focus.as_ref().map(|f| f.zoom), Some(14));
    }

    #[tokio::test]
    async fn test_failed_fetch_shows_unavailable() {
        let mut harness = Harness::start();
        harness
            .events
            .send(ChannelEvent::TrainsReceived(vec![make_train("a", "1")]))
            .await
            .unwrap();
        harness.wait_for(|s| s.trains.len() == 1).await;

        // No gate registered, so the call fails.
        harness.actions.send(UserAction::Select(TrainId::new("a"))).await.unwrap();

        let snapshot = harness
            .wait_for(|s| matches!(s.timetable, TimetableView::Unavailable { .. }))
            .await;
        assert_eq!(snapshot.selected_train.as_ref().map(|t| t.number.as_str()), Some("1"));
    }

    #[tokio::test]
    async fn test_runtime_stops_when_events_close() {
        let Harness {
            events,
            actions: _actions,
            mut snapshot,
            ..
        } = Harness::start();
        drop(events);

        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            while snapshot.changed().await.is_ok() {}
        })
        .await;
        assert!(closed.is_ok());
    }
}

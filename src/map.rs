//! Server-side marker layer.
//!
//! The viewer page renders whatever this layer holds, so it is the
//! [`MapSurface`] the dashboard reconciles against.

use std::collections::BTreeMap;

use serde::Serialize;

use railmap_core::{LatLon, MapSurface, TrainId};

/// Opaque handle to a marker on the layer.
#[derive(Debug, PartialEq, Eq)]
pub struct MarkerHandle(u64);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerView {
    pub id: u64,
    pub train_id: TrainId,
    pub lat: f64,
    pub lon: f64,
    pub label: String,
}

/// Where the viewer should center, set when a train is selected.
///
/// `seq` grows on every focus request, so the viewer re-centers even when
/// the same train is focused twice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapFocus {
    pub seq: u64,
    pub train_id: TrainId,
    pub lat: f64,
    pub lon: f64,
    pub zoom: u8,
}

#[derive(Debug, Default)]
pub struct MarkerLayer {
    markers: BTreeMap<u64, MarkerView>,
    next_id: u64,
    focus: Option<MapFocus>,
    focus_seq: u64,
}

impl MarkerLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Markers in creation order.
    pub fn markers(&self) -> impl Iterator<Item = &MarkerView> {
        self.markers.values()
    }

    pub fn focus(&self) -> Option<&MapFocus> {
        self.focus.as_ref()
    }
}

impl MapSurface for MarkerLayer {
    type Handle = MarkerHandle;

    fn create_marker(&mut self, id: &TrainId, position: LatLon, label: &str) -> MarkerHandle {
        self.next_id += 1;
        self.markers.insert(
            self.next_id,
            MarkerView {
                id: self.next_id,
                train_id: id.clone(),
                lat: position.lat,
                lon: position.lon,
                label: label.to_string(),
            },
        );
        MarkerHandle(self.next_id)
    }

    fn move_marker(&mut self, handle: &mut MarkerHandle, position: LatLon) {
        if let Some(marker) = self.markers.get_mut(&handle.0) {
            marker.lat = position.lat;
            marker.lon = position.lon;
        }
    }

    fn set_label(&mut self, handle: &mut MarkerHandle, label: &str) {
        if let Some(marker) = self.markers.get_mut(&handle.0) {
            marker.label = label.to_string();
        }
    }

    fn remove_marker(&mut self, handle: MarkerHandle) {
        if let Some(marker) = self.markers.remove(&handle.0) {
            if self.focus.as_ref().map(|f| &f.train_id) == Some(&marker.train_id) {
                self.focus = None;
            }
        }
    }

    fn focus_marker(&mut self, handle: &MarkerHandle, position: LatLon, zoom: u8) {
        if let Some(marker) = self.markers.get(&handle.0) {
            self.focus_seq += 1;
            self.focus = Some(MapFocus {
                seq: self.focus_seq,
                train_id: marker.train_id.clone(),
                lat: position.lat,
                lon: position.lon,
                zoom,
            });
        }
    }

    fn clear_focus(&mut self) {
        self.focus = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railmap_core::{ChannelEvent, Dashboard, TrainEntity, UserAction};

    fn make_train(id: &str) -> TrainEntity {
        TrainEntity {
            id: TrainId::new(id),
            number: "100".to_string(),
            route: "Kraków - Tarnów".to_string(),
            category: "RE".to_string(),
            driver_name: None,
            velocity: 0.0,
            latitude: 50.0,
            longitude: 19.0,
        }
    }

    #[test]
    fn test_marker_lifecycle() {
        let mut layer = MarkerLayer::new();
        let id = TrainId::new("t-1");

        let mut handle = layer.create_marker(&id, LatLon::new(50.0, 19.0), "Train 1");
        layer.move_marker(&mut handle, LatLon::new(50.5, 19.5));
        layer.set_label(&mut handle, "Train 2");

        let marker = layer.markers().next().unwrap();
        assert_eq!(marker.train_id, id);
        assert_eq!((marker.lat, marker.lon), (50.5, 19.5));
        assert_eq!(marker.label, "Train 2");

        layer.remove_marker(handle);
        assert!(layer.is_empty());
    }

    #[test]
    fn test_handles_are_unique() {
        let mut layer = MarkerLayer::new();
        let a = layer.create_marker(&TrainId::new("a"), LatLon::new(0.0, 0.0), "A");
        let b = layer.create_marker(&TrainId::new("b"), LatLon::new(0.0, 0.0), "B");
        assert_ne!(a, b);
        assert_eq!(layer.len(), 2);
    }

    #[test]
    fn test_focus_cleared_when_marker_removed() {
        let mut layer = MarkerLayer::new();
        let handle = layer.create_marker(&TrainId::new("a"), LatLon::new(1.0, 2.0), "A");

        layer.focus_marker(&handle, LatLon::new(1.0, 2.0), 14);
        assert_eq!(layer.focus().map(|f| f.zoom), Some(14));

        layer.remove_marker(handle);
        assert!(layer.focus().is_none());
    }

    #[test]
    fn test_reselect_after_deselect_refocuses() {
        let mut dashboard = Dashboard::new(MarkerLayer::new(), "PL1", 14);
        dashboard.handle_event(ChannelEvent::TrainsReceived(vec![make_train("a")]));

        dashboard.handle_action(UserAction::Select(TrainId::new("a")));
        let first = dashboard.map().focus().cloned();
        dashboard.handle_action(UserAction::Deselect);
        assert!(dashboard.map().focus().is_none());
        dashboard.handle_action(UserAction::Select(TrainId::new("a")));
        let second = dashboard.map().focus().cloned();

        assert!(first.is_some() && second.is_some());
        assert_ne!(first, second);
        assert_eq!(second.map(|f| f.train_id), Some(TrainId::new("a")));
    }

    #[test]
    fn test_repeated_focus_bumps_seq() {
        let mut layer = MarkerLayer::new();
        let handle = layer.create_marker(&TrainId::new("a"), LatLon::new(1.0, 2.0), "A");

        layer.focus_marker(&handle, LatLon::new(1.0, 2.0), 14);
        let first = layer.focus().map(|f| f.seq);
        layer.focus_marker(&handle, LatLon::new(1.0, 2.0), 14);
        let second = layer.focus().map(|f| f.seq);

        assert_eq!(first, Some(1));
        assert_eq!(second, Some(2));
    }
}

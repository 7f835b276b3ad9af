use std::collections::HashMap;

use crate::store::TrainStore;
use crate::train::{LatLon, TrainId};

/// The map collaborator markers are drawn on.
///
/// A marker is created for a train id; the surface routes clicks on it back
/// as a selection of that id, never of a captured copy of the train.
pub trait MapSurface {
    type Handle;

    fn create_marker(&mut self, id: &TrainId, position: LatLon, label: &str) -> Self::Handle;

    fn move_marker(&mut self, handle: &mut Self::Handle, position: LatLon);

    fn set_label(&mut self, handle: &mut Self::Handle, label: &str);

    fn remove_marker(&mut self, handle: Self::Handle);

    /// Center the view on a marker and open its popup.
    fn focus_marker(&mut self, handle: &Self::Handle, position: LatLon, zoom: u8);

    /// Drop the focus set by the last `focus_marker` call.
    fn clear_focus(&mut self);
}

/// A realized marker and the values last pushed to the surface.
#[derive(Debug)]
pub struct MarkerRecord<H> {
    pub handle: H,
    pub position: LatLon,
    pub label: String,
}

/// Side effects issued by one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
}

impl ReconcileStats {
    pub fn is_empty(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.removed == 0
    }
}

/// Keeps the marker set on a [`MapSurface`] aligned with a [`TrainStore`].
#[derive(Debug)]
pub struct MarkerReconciler<H> {
    markers: HashMap<TrainId, MarkerRecord<H>>,
}

impl<H> Default for MarkerReconciler<H> {
    fn default() -> Self {
        Self {
            markers: HashMap::new(),
        }
    }
}

impl<H> MarkerReconciler<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &TrainId) -> Option<&MarkerRecord<H>> {
        self.markers.get(id)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &TrainId> {
        self.markers.keys()
    }

    /// Align markers with the store.
    ///
    /// Markers of departed trains are removed, new trains get a marker, and
    /// surviving markers are moved or relabelled in place only when their
    /// values differ. Running it twice on the same store issues nothing.
    pub fn reconcile<M>(&mut self, store: &TrainStore, map: &mut M) -> ReconcileStats
    where
        M: MapSurface<Handle = H>,
    {
        let mut stats = ReconcileStats::default();

        let departed: Vec<TrainId> = self
            .markers
            .keys()
            .filter(|id| !store.contains(id))
            .cloned()
            .collect();
        for id in departed {
            if let Some(record) = self.markers.remove(&id) {
                map.remove_marker(record.handle);
                stats.removed += 1;
            }
        }

        for train in store.iter() {
            let position = train.position();
            let label = train.marker_label();

            match self.markers.get_mut(&train.id) {
                Some(record) => {
                    let mut touched = false;
                    if record.position != position {
                        map.move_marker(&mut record.handle, position);
                        record.position = position;
                        touched = true;
                    }
                    if record.label != label {
                        map.set_label(&mut record.handle, &label);
                        record.label = label;
                        touched = true;
                    }
                    if touched {
                        stats.updated += 1;
                    }
                }
                None => {
                    let handle = map.create_marker(&train.id, position, &label);
                    self.markers.insert(
                        train.id.clone(),
                        MarkerRecord {
                            handle,
                            position,
                            label,
                        },
                    );
                    stats.created += 1;
                }
            }
        }

        if !stats.is_empty() {
            tracing::debug!(
                "Reconciled markers: {} created, {} updated, {} removed",
                stats.created,
                stats.updated,
                stats.removed
            );
        }
        stats
    }

    /// Focus the marker of `id`, if it has one.
    pub fn focus<M>(&self, id: &TrainId, zoom: u8, map: &mut M) -> bool
    where
        M: MapSurface<Handle = H>,
    {
        match self.markers.get(id) {
            Some(record) => {
                map.focus_marker(&record.handle, record.position, zoom);
                true
            }
            None => false,
        }
    }
}

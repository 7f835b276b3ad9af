use std::collections::{HashMap, HashSet};

use crate::train::{TrainEntity, TrainId, TrainPosition};

/// Summary of what a snapshot did to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreChange {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    /// Position records whose id has no entity.
    pub ignored: usize,
}

impl StoreChange {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.removed == 0
    }
}

/// Canonical mapping of train id to train record.
///
/// Fed only by authoritative snapshots: a full train list replaces the
/// store, a position snapshot merges the volatile fields and prunes every
/// train it does not mention.
#[derive(Debug, Default)]
pub struct TrainStore {
    trains: HashMap<TrainId, TrainEntity>,
    /// Ids in the order the server listed them.
    order: Vec<TrainId>,
    revision: u64,
}

impl TrainStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &TrainId) -> Option<&TrainEntity> {
        self.trains.get(id)
    }

    pub fn contains(&self, id: &TrainId) -> bool {
        self.trains.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.trains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trains.is_empty()
    }

    /// Incremented every time a snapshot changes the store.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Trains in server order.
    pub fn iter(&self) -> impl Iterator<Item = &TrainEntity> {
        self.order.iter().filter_map(|id| self.trains.get(id))
    }

    pub fn ids(&self) -> impl Iterator<Item = &TrainId> {
        self.order.iter()
    }

    /// Replace the entire mapping with the given list.
    /// If an id occurs more than once, the last record wins.
    pub fn apply_full_list(&mut self, trains: Vec<TrainEntity>) -> StoreChange {
        let mut change = StoreChange::default();
        let mut next: HashMap<TrainId, TrainEntity> = HashMap::with_capacity(trains.len());
        let mut order = Vec::with_capacity(trains.len());

        for train in trains {
            if !next.contains_key(&train.id) {
                order.push(train.id.clone());
            }
            next.insert(train.id.clone(), train);
        }

        for (id, train) in &next {
            match self.trains.get(id) {
                None => change.added += 1,
                Some(existing) if existing != train => change.updated += 1,
                Some(_) => {}
            }
        }
        change.removed = self
            .trains
            .keys()
            .filter(|id| !next.contains_key(*id))
            .count();

        let reordered = order != self.order;
        self.trains = next;
        self.order = order;

        if !change.is_empty() || reordered {
            self.revision += 1;
        }
        change
    }

    /// Merge a complete position snapshot.
    ///
    /// Trains present in the store but absent from the snapshot are
    /// removed. Positions for unknown ids are ignored: there is no metadata
    /// to build a record from.
    pub fn apply_position_snapshot(&mut self, positions: &[TrainPosition]) -> StoreChange {
        let mut change = StoreChange::default();
        let mut seen: HashSet<&TrainId> = HashSet::with_capacity(positions.len());

        for position in positions {
            match self.trains.get_mut(&position.id) {
                Some(train) => {
                    seen.insert(&position.id);
                    if train.apply_position(position) {
                        change.updated += 1;
                    }
                }
                None => {
                    tracing::debug!("Ignoring position for unknown train {}", position.id);
                    change.ignored += 1;
                }
            }
        }

        let before = self.order.len();
        self.order.retain(|id| seen.contains(id));
        self.trains.retain(|id, _| seen.contains(id));
        change.removed = before - self.order.len();

        if !change.is_empty() {
            self.revision += 1;
        }
        change
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_train(id: &str, number: &str) -> TrainEntity {
        TrainEntity {
            id: TrainId::new(id),
            number: number.to_string(),
            route: "Gdynia - Kraków".to_string(),
            category: "IC".to_string(),
            driver_name: Some("Jan".to_string()),
            velocity: 0.0,
            latitude: 50.0,
            longitude: 19.0,
        }
    }

    fn make_position(id: &str, lat: f64, lon: f64, velocity: f64) -> TrainPosition {
        TrainPosition {
            id: TrainId::new(id),
            latitude: lat,
            longitude: lon,
            velocity,
        }
    }

    #[test]
    fn test_full_list_replaces_store() {
        let mut store = TrainStore::new();
        store.apply_full_list(vec![make_train("1", "100"), make_train("2", "200")]);

        let change = store.apply_full_list(vec![make_train("2", "200"), make_train("3", "300")]);

        assert_eq!(change.added, 1);
        assert_eq!(change.removed, 1);
        assert_eq!(change.updated, 0);
        assert!(!store.contains(&TrainId::new("1")));
        let ids: Vec<_> = store.ids().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
    }

    #[test]
    fn test_full_list_duplicate_ids_keep_last() {
        let mut store = TrainStore::new();
        store.apply_full_list(vec![make_train("1", "100"), make_train("1", "101")]);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&TrainId::new("1")).unwrap().number, "101");
        assert_eq!(store.ids().count(), 1);
    }

    #[test]
    fn test_position_snapshot_merges_fields() {
        let mut store = TrainStore::new();
        store.apply_full_list(vec![make_train("1", "100")]);

        let change = store.apply_position_snapshot(&[make_position("1", 52.0, 21.0, 80.0)]);

        assert_eq!(change.updated, 1);
        let train = store.get(&TrainId::new("1")).unwrap();
        assert_eq!(train.latitude, 52.0);
        assert_eq!(train.longitude, 21.0);
        assert_eq!(train.velocity, 80.0);
        assert_eq!(train.route, "Gdynia - Kraków");
    }

    #[test]
    fn test_position_snapshot_prunes_absent_trains() {
        let mut store = TrainStore::new();
        store.apply_full_list(vec![make_train("1", "100"), make_train("2", "200")]);

        let change = store.apply_position_snapshot(&[make_position("2", 50.0, 19.0, 0.0)]);

        assert_eq!(change.removed, 1);
        assert!(!store.contains(&TrainId::new("1")));
        assert!(store.contains(&TrainId::new("2")));
    }

    #[test]
    fn test_empty_position_snapshot_empties_store() {
        let mut store = TrainStore::new();
        store.apply_full_list(vec![make_train("1", "100")]);

        let change = store.apply_position_snapshot(&[]);

        assert_eq!(change.removed, 1);
        assert!(store.is_empty());
        assert_eq!(store.iter().count(), 0);
    }

    #[test]
    fn test_unmatched_position_is_ignored() {
        let mut store = TrainStore::new();
        store.apply_full_list(vec![make_train("1", "100")]);

        let change = store.apply_position_snapshot(&[
            make_position("1", 50.0, 19.0, 0.0),
            make_position("99", 51.0, 20.0, 60.0),
        ]);

        assert_eq!(change.ignored, 1);
        assert!(!store.contains(&TrainId::new("99")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_revision_only_moves_on_change() {
        let mut store = TrainStore::new();
        store.apply_full_list(vec![make_train("1", "100")]);
        let rev = store.revision();

        let positions = [make_position("1", 52.0, 21.0, 80.0)];
        store.apply_position_snapshot(&positions);
        assert_eq!(store.revision(), rev + 1);

        store.apply_position_snapshot(&positions);
        assert_eq!(store.revision(), rev + 1);
    }
}

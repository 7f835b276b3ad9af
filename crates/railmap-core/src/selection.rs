use serde::Serialize;

use crate::error::SelectError;
use crate::store::TrainStore;
use crate::train::TrainId;

/// Which train, if any, the user has focused.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "train_id", rename_all = "snake_case")]
pub enum Selection {
    #[default]
    None,
    Selected(TrainId),
}

impl Selection {
    pub fn train_id(&self) -> Option<&TrainId> {
        match self {
            Selection::None => None,
            Selection::Selected(id) => Some(id),
        }
    }
}

/// Selection state machine.
///
/// The selected id always refers to a train in the store: selecting an
/// unknown id is rejected, and a store update that drops the selected train
/// resets the selection.
#[derive(Debug, Default)]
pub struct SelectionManager {
    state: Selection,
}

impl SelectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &Selection {
        &self.state
    }

    pub fn selected(&self) -> Option<&TrainId> {
        self.state.train_id()
    }

    /// Enter `Selected(id)`. Re-selecting the current train is allowed and
    /// counts as a fresh entry.
    pub fn select(&mut self, id: TrainId, store: &TrainStore) -> Result<(), SelectError> {
        if !store.contains(&id) {
            return Err(SelectError::UnknownTrain(id));
        }
        self.state = Selection::Selected(id);
        Ok(())
    }

    pub fn deselect(&mut self) {
        self.state = Selection::None;
    }

    /// React to a store update. Returns true if the selection was cleared.
    pub fn on_store_changed(&mut self, store: &TrainStore) -> bool {
        let departed = match &self.state {
            Selection::Selected(id) if !store.contains(id) => id.clone(),
            _ => return false,
        };

        tracing::debug!("Selected train {} left the store, clearing selection", departed);
        self.state = Selection::None;
        true
    }
}

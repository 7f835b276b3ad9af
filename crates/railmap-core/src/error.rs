use thiserror::Error;

use crate::train::TrainId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectError {
    #[error("Train not found: {0}")]
    UnknownTrain(TrainId),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("No timetable available for train {0}")]
    Empty(TrainId),

    #[error("Timetable request for train {train} failed: {reason}")]
    Request { train: TrainId, reason: String },
}

impl FetchError {
    pub fn request(train: TrainId, reason: impl Into<String>) -> Self {
        FetchError::Request {
            train,
            reason: reason.into(),
        }
    }
}

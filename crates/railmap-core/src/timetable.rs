use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::train::TrainId;

/// Real time and delay of an arrival or departure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopTime {
    pub real_time: String,
    pub delay_minutes: i32,
}

/// One stop of a timetable. A missing arrival or departure means the train
/// starts or terminates there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimetableStop {
    pub name: String,
    pub arrival: Option<StopTime>,
    pub departure: Option<StopTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timetable {
    pub stops: Vec<TimetableStop>,
}

/// A timetable request issued on entering `Selected(train_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimetableRequest {
    pub train_id: TrainId,
    /// Monotonic per coordinator; later requests have larger tickets.
    pub ticket: u64,
}

/// What the detail panel shows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TimetableView {
    #[default]
    Idle,
    Loading {
        train_id: TrainId,
    },
    Loaded {
        train_id: TrainId,
        timetable: Timetable,
    },
    /// The request failed or returned nothing; shown as "no data".
    Unavailable {
        train_id: TrainId,
        reason: String,
    },
}

/// Outcome of delivering a response to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    Discarded,
}

/// Issues one request per selection and drops responses that a later
/// selection has superseded.
#[derive(Debug, Default)]
pub struct TimetableCoordinator {
    current: Option<TrainId>,
    next_ticket: u64,
    /// Ticket of the response currently on display.
    shown_ticket: Option<u64>,
    view: TimetableView,
}

impl TimetableCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> &TimetableView {
        &self.view
    }

    /// Start a fetch for `train_id`, replacing whatever was shown.
    pub fn begin(&mut self, train_id: TrainId) -> TimetableRequest {
        self.next_ticket += 1;
        self.current = Some(train_id.clone());
        self.shown_ticket = None;
        self.view = TimetableView::Loading {
            train_id: train_id.clone(),
        };
        TimetableRequest {
            train_id,
            ticket: self.next_ticket,
        }
    }

    /// Forget the selection; every outstanding response becomes stale.
    pub fn clear(&mut self) {
        self.current = None;
        self.shown_ticket = None;
        self.view = TimetableView::Idle;
    }

    /// Deliver a response. It is applied only while its train is still the
    /// one selected, and never over a response to a later request.
    pub fn complete(
        &mut self,
        request: &TimetableRequest,
        result: Result<Timetable, FetchError>,
    ) -> Completion {
        if self.current.as_ref() != Some(&request.train_id) {
            tracing::debug!(
                "Discarding timetable for {}: selection moved on",
                request.train_id
            );
            return Completion::Discarded;
        }
        if self.shown_ticket.is_some_and(|shown| shown > request.ticket) {
            tracing::debug!(
                "Discarding timetable for {}: newer response already shown",
                request.train_id
            );
            return Completion::Discarded;
        }

        self.shown_ticket = Some(request.ticket);
        self.view = match result {
            Ok(timetable) if !timetable.stops.is_empty() => TimetableView::Loaded {
                train_id: request.train_id.clone(),
                timetable,
            },
            Ok(_) => TimetableView::Unavailable {
                train_id: request.train_id.clone(),
                reason: FetchError::Empty(request.train_id.clone()).to_string(),
            },
            Err(e) => {
                tracing::warn!("{}", e);
                TimetableView::Unavailable {
                    train_id: request.train_id.clone(),
                    reason: e.to_string(),
                }
            }
        };
        Completion::Applied
    }
}

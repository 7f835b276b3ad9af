//! Railmap Core - Domain models and the synchronization engine.
//!
//! This crate holds the train entity store, the marker reconciler, the
//! selection state machine and the timetable fetch coordinator, plus the
//! [`Dashboard`] that sequences them. It performs no I/O: inbound events
//! go in, [`Command`]s for the network layer come out.

pub mod dashboard;
pub mod error;
pub mod event;
pub mod filter;
pub mod marker;
pub mod selection;
pub mod store;
pub mod timetable;
pub mod train;

// Re-exports for convenience
pub use dashboard::{Command, Dashboard};
pub use error::{FetchError, SelectError};
pub use event::{ChannelEvent, ConnectionStatus, UserAction};
pub use filter::filter_by_number;
pub use marker::{MapSurface, MarkerRecord, MarkerReconciler, ReconcileStats};
pub use selection::{Selection, SelectionManager};
pub use store::{StoreChange, TrainStore};
pub use timetable::{
    Completion, StopTime, Timetable, TimetableCoordinator, TimetableRequest, TimetableStop,
    TimetableView,
};
pub use train::{LatLon, ServerEntity, TrainEntity, TrainId, TrainPosition};

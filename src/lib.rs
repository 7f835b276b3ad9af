//! Railmap - Live train map dashboard.
//!
//! Wires the hub client to the synchronization engine and serves the
//! resulting snapshot over HTTP.

pub mod config;
pub mod map;
pub mod models;
pub mod routes;
pub mod runtime;
pub mod state;

pub use config::{Config, ConfigError};
pub use map::{MapFocus, MarkerLayer, MarkerView};
pub use models::DashboardSnapshot;
pub use routes::create_router;
pub use runtime::Runtime;
pub use state::AppState;

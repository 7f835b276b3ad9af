//! Railmap Hub - Push-channel client for the simulation hub.
//!
//! Negotiates a connection, speaks the JSON hub protocol over WebSocket,
//! turns pushed snapshots into [`ChannelEvent`]s and exposes the hub's
//! request/response calls through [`SimulationApi`].
//!
//! [`ChannelEvent`]: railmap_core::ChannelEvent

pub mod api;
pub mod client;
pub mod error;
pub mod protocol;
pub mod retry;
pub mod wire;

pub use api::SimulationApi;
pub use client::{HubClient, HubConfig, HubHandle};
pub use error::HubError;
pub use protocol::{HubMessage, InvocationTracker};
pub use retry::RetryPolicy;

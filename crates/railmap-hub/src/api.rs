use serde_json::Value;

use railmap_core::{Timetable, TrainId};

use crate::client::HubHandle;
use crate::error::HubError;
use crate::wire::decode_timetable;

pub const GET_SERVERS: &str = "GetServers";
pub const SWITCH_SERVER: &str = "SwitchServer";
pub const GET_TIMETABLE: &str = "GetTimetable";

/// Request/response calls the dashboard makes against the hub.
pub trait SimulationApi: Send + Sync {
    /// Ask for the server list. The list itself arrives as a
    /// `ServersReceived` push.
    fn get_servers(&self) -> impl std::future::Future<Output = Result<(), HubError>> + Send;

    /// Change the simulation server the hub pushes snapshots for.
    fn switch_server(
        &self,
        code: &str,
    ) -> impl std::future::Future<Output = Result<(), HubError>> + Send;

    fn get_timetable(
        &self,
        train_id: &TrainId,
    ) -> impl std::future::Future<Output = Result<Timetable, HubError>> + Send;
}

impl SimulationApi for HubHandle {
    async fn get_servers(&self) -> Result<(), HubError> {
        self.invoke(GET_SERVERS, Vec::new()).await?;
        Ok(())
    }

    async fn switch_server(&self, code: &str) -> Result<(), HubError> {
        self.invoke(SWITCH_SERVER, vec![Value::from(code)]).await?;
        Ok(())
    }

    async fn get_timetable(&self, train_id: &TrainId) -> Result<Timetable, HubError> {
        let result = self
            .invoke(GET_TIMETABLE, vec![Value::from(train_id.as_str())])
            .await?;
        decode_timetable(result)
    }
}

//! Payload shapes pushed and returned by the simulation hub.

use serde::Deserialize;
use serde_json::Value;

use railmap_core::{
    ChannelEvent, ServerEntity, StopTime, Timetable, TimetableStop, TrainEntity, TrainId,
    TrainPosition,
};

use crate::error::HubError;

pub const SERVERS_RECEIVED: &str = "ServersReceived";
pub const TRAINS_RECEIVED: &str = "TrainsReceived";
pub const TRAIN_POSITIONS_RECEIVED: &str = "TrainPositionsReceived";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrainDataDto {
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub route: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub velocity: f64,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrainDto {
    pub id: String,
    pub driver_name: Option<String>,
    pub train_data: TrainDataDto,
}

impl From<TrainDto> for TrainEntity {
    fn from(dto: TrainDto) -> Self {
        Self {
            id: TrainId(dto.id),
            number: dto.train_data.number,
            route: dto.train_data.route,
            category: dto.train_data.category,
            driver_name: dto.driver_name.filter(|name| !name.is_empty()),
            velocity: dto.train_data.velocity,
            latitude: dto.train_data.latitude,
            longitude: dto.train_data.longitude,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PositionDto {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub velocity: f64,
}

impl From<PositionDto> for TrainPosition {
    fn from(dto: PositionDto) -> Self {
        Self {
            id: TrainId(dto.id),
            latitude: dto.latitude,
            longitude: dto.longitude,
            velocity: dto.velocity,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerDto {
    pub id: String,
    pub server_code: String,
    #[serde(default)]
    pub server_name: String,
    pub server_region: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl From<ServerDto> for ServerEntity {
    fn from(dto: ServerDto) -> Self {
        Self {
            id: dto.id,
            code: dto.server_code,
            name: dto.server_name,
            region: dto.server_region,
            is_active: dto.is_active,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StopDto {
    pub stop_name: String,
    pub arrival_line: Option<String>,
    pub arrival_real_time: Option<String>,
    pub arrival_delay: Option<i32>,
    pub departure_line: Option<String>,
    pub departure_real_time: Option<String>,
    pub departure_delay: Option<i32>,
}

/// A stop time exists when its line is set and non-empty.
fn stop_time(
    line: Option<String>,
    real_time: Option<String>,
    delay: Option<i32>,
) -> Option<StopTime> {
    line.filter(|l| !l.is_empty()).map(|_| StopTime {
        real_time: real_time.unwrap_or_default(),
        delay_minutes: delay.unwrap_or(0),
    })
}

impl From<StopDto> for TimetableStop {
    fn from(dto: StopDto) -> Self {
        Self {
            name: dto.stop_name,
            arrival: stop_time(dto.arrival_line, dto.arrival_real_time, dto.arrival_delay),
            departure: stop_time(
                dto.departure_line,
                dto.departure_real_time,
                dto.departure_delay,
            ),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TimetableDto {
    #[serde(default)]
    pub stops: Vec<StopDto>,
}

impl From<TimetableDto> for Timetable {
    fn from(dto: TimetableDto) -> Self {
        Self {
            stops: dto.stops.into_iter().map(Into::into).collect(),
        }
    }
}

/// Decode a `GetTimetable` result. A null result means no timetable.
pub fn decode_timetable(value: Value) -> Result<Timetable, HubError> {
    if value.is_null() {
        return Ok(Timetable::default());
    }
    let dto: TimetableDto = serde_json::from_value(value)?;
    Ok(dto.into())
}

fn decode_list<D, T>(arguments: Vec<Value>) -> Result<Vec<T>, HubError>
where
    D: serde::de::DeserializeOwned + Into<T>,
{
    let payload = arguments
        .into_iter()
        .next()
        .ok_or_else(|| HubError::Protocol("push without arguments".into()))?;
    if payload.is_null() {
        return Ok(Vec::new());
    }
    let items: Vec<D> = serde_json::from_value(payload)?;
    Ok(items.into_iter().map(Into::into).collect())
}

/// Turn a server push into a channel event. Unknown targets yield `None`.
pub fn decode_push(
    target: &str,
    arguments: Vec<Value>,
) -> Result<Option<ChannelEvent>, HubError> {
    let event = match target {
        SERVERS_RECEIVED => {
            ChannelEvent::ServersReceived(decode_list::<ServerDto, _>(arguments)?)
        }
        TRAINS_RECEIVED => ChannelEvent::TrainsReceived(decode_list::<TrainDto, _>(arguments)?),
        TRAIN_POSITIONS_RECEIVED => {
            ChannelEvent::TrainPositionsReceived(decode_list::<PositionDto, _>(arguments)?)
        }
        _ => return Ok(None),
    };
    Ok(Some(event))
}

use serde::{Deserialize, Serialize};

/// Stable identifier of a train, as assigned by the simulation server.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrainId(pub String);

impl TrainId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TrainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrainId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// The canonical record of one running train.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainEntity {
    pub id: TrainId,
    pub number: String,
    pub route: String,
    pub category: String,
    pub driver_name: Option<String>,
    pub velocity: f64,
    pub latitude: f64,
    pub longitude: f64,
}

impl TrainEntity {
    pub fn position(&self) -> LatLon {
        LatLon::new(self.latitude, self.longitude)
    }

    /// Text shown on the train's map marker.
    pub fn marker_label(&self) -> String {
        format!("Train {}", self.number)
    }

    /// Overwrite the volatile fields from a position record.
    /// Returns true if anything changed.
    pub fn apply_position(&mut self, position: &TrainPosition) -> bool {
        let changed = self.latitude != position.latitude
            || self.longitude != position.longitude
            || self.velocity != position.velocity;

        self.latitude = position.latitude;
        self.longitude = position.longitude;
        self.velocity = position.velocity;
        changed
    }
}

/// One entry of a position snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainPosition {
    pub id: TrainId,
    pub latitude: f64,
    pub longitude: f64,
    pub velocity: f64,
}

/// A simulation server the dashboard can switch to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEntity {
    pub id: String,
    pub code: String,
    pub name: String,
    pub region: Option<String>,
    pub is_active: bool,
}

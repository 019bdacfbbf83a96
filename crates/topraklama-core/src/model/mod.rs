//! Fleet Data Model
//!
//! Records as the dashboard holds them after decoding. Risk tiers are never
//! stored on a record; they are derived on demand by [`crate::risk`].

mod wire;

pub use wire::{
    check_success, decode_alerts, decode_detail, decode_fleet, decode_health, decode_history,
    decode_isolation_ack, decode_statistics, parse_timestamp,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::risk::{self, TierCounts};

/// Stable transformer identifier, unique across the fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransformerId(pub u32);

impl fmt::Display for TransformerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TransformerId {
    fn from(id: u32) -> Self {
        TransformerId(id)
    }
}

/// Geographic position of a transformer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Latest known state of one transformer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerRecord {
    pub id: TransformerId,
    pub name: String,
    pub region: String,
    /// `None` when the server omitted coordinates; such a record can be
    /// listed but not placed on the map.
    pub position: Option<Position>,
    /// Sensor name -> value, only for the sensors the server reported
    pub sensor_readings: BTreeMap<String, f64>,
    /// Upstream risk score. `None` means "no score", which is not the same as 0.
    pub risk_score: Option<f64>,
    pub is_anomaly_flagged: bool,
    /// true = connected/active, false = isolated
    pub isolation_status: bool,
    /// Freshness of the record itself, not of the fetch that delivered it
    pub last_update: Option<DateTime<Utc>>,
}

impl TransformerRecord {
    /// Create a record with no readings, no score and default flags
    pub fn new(id: TransformerId, name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            region: region.into(),
            position: None,
            sensor_readings: BTreeMap::new(),
            risk_score: None,
            is_anomaly_flagged: false,
            isolation_status: true,
            last_update: None,
        }
    }

    /// Whether the record carries enough data to be drawn on the map
    pub fn is_renderable(&self) -> bool {
        self.position.is_some()
    }

    /// Whether the transformer is currently isolated from the grid
    pub fn is_isolated(&self) -> bool {
        !self.isolation_status
    }

    pub fn reading(&self, sensor: &str) -> Option<f64> {
        self.sensor_readings.get(sensor).copied()
    }
}

/// Last successfully fetched state of the whole fleet.
///
/// Records keep the order in which the server delivered them. A snapshot is
/// only ever replaced as a whole.
#[derive(Debug, Clone, Default)]
pub struct FleetSnapshot {
    records: Vec<TransformerRecord>,
    index: HashMap<TransformerId, usize>,
}

impl FleetSnapshot {
    /// Build a snapshot from records in arrival order.
    ///
    /// A duplicated id keeps its first position but takes the later record.
    pub fn from_records(records: impl IntoIterator<Item = TransformerRecord>) -> Self {
        let mut snapshot = FleetSnapshot::default();
        for record in records {
            match snapshot.index.get(&record.id) {
                Some(&slot) => snapshot.records[slot] = record,
                None => {
                    snapshot.index.insert(record.id, snapshot.records.len());
                    snapshot.records.push(record);
                }
            }
        }
        snapshot
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: TransformerId) -> Option<&TransformerRecord> {
        self.index.get(&id).map(|&slot| &self.records[slot])
    }

    pub fn contains(&self, id: TransformerId) -> bool {
        self.index.contains_key(&id)
    }

    /// Records in arrival order
    pub fn iter(&self) -> impl Iterator<Item = &TransformerRecord> {
        self.records.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = TransformerId> + '_ {
        self.records.iter().map(|r| r.id)
    }

    /// Records that can be placed on the map
    pub fn renderable(&self) -> impl Iterator<Item = &TransformerRecord> {
        self.records.iter().filter(|r| r.is_renderable())
    }

    /// Per-tier counts computed locally with the risk classifier
    pub fn tier_counts(&self) -> TierCounts {
        TierCounts::tally(self.records.iter().map(risk::classify_record))
    }
}

impl PartialEq for FleetSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records
    }
}

/// Aggregate fleet statistics as reported by the server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub total: u32,
    pub anomaly_count: Option<u32>,
    pub isolated_count: u32,
    pub average_risk: Option<f64>,
    pub max_risk: Option<f64>,
    pub min_risk: Option<f64>,
    pub high_risk: u32,
    pub medium_risk: u32,
    pub low_risk: u32,
    pub total_alerts: Option<u32>,
    pub estimated_savings: Option<f64>,
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
}

impl From<String> for AlertSeverity {
    fn from(value: String) -> Self {
        AlertSeverity::from(value.as_str())
    }
}

impl From<&str> for AlertSeverity {
    /// Unrecognised severities are treated as low
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" | "critical" => AlertSeverity::High,
            "medium" | "warning" => AlertSeverity::Medium,
            _ => AlertSeverity::Low,
        }
    }
}

/// One entry of the live alert feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub message: String,
    pub severity: AlertSeverity,
    pub timestamp: Option<DateTime<Utc>>,
    pub transformer_id: Option<TransformerId>,
    pub risk_score: Option<f64>,
}

/// One sample of a transformer's history series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub timestamp: Option<DateTime<Utc>>,
    pub readings: BTreeMap<String, f64>,
    pub risk_score: Option<f64>,
    pub is_anomaly: bool,
}

/// Isolation command sent to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationAction {
    Isolate,
    Restore,
}

impl IsolationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationAction::Isolate => "isolate",
            IsolationAction::Restore => "restore",
        }
    }

    /// Isolation status the transformer should report once the action applies
    pub fn expected_status(&self) -> bool {
        matches!(self, IsolationAction::Restore)
    }
}

/// Server acknowledgement of an isolation command
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IsolationAck {
    pub message: Option<String>,
    pub isolation_status: Option<bool>,
}

/// Answer of the health endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub message: Option<String>,
    /// Only reported by the map dashboard variant
    pub model_loaded: Option<bool>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl HealthStatus {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            message: Some(message.into()),
            model_loaded: None,
            timestamp: Some(Utc::now()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok")
    }
}

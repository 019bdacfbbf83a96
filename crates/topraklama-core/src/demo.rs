//! Demo Mode - Simulated grounding telemetry for running without a backend
//!
//! Simulates a 50-transformer fleet around İzmir. Every fleet poll advances
//! the simulation by one hour: sensor readings drift around each unit's own
//! baseline, and faults (rain, corrosion, leakage surges) are injected at
//! random. Units scoring 80 or more are isolated automatically.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::client::TelemetrySource;
use crate::error::{ActionError, FetchError};
use crate::model::{
    AlertRecord, AlertSeverity, FleetSnapshot, HistoryPoint, IsolationAck, IsolationAction,
    Position, Statistics, TransformerId, TransformerRecord,
};
use crate::risk::{FAULTY_THRESHOLD, HIGH_THRESHOLD, MEDIUM_THRESHOLD};

/// Units in the simulated fleet
pub const FLEET_SIZE: u32 = 50;

const CENTER: (f64, f64) = (38.4237, 27.1428);
const REGIONS: [&str; 5] = ["Alsancak", "Bornova", "Karşıyaka", "Konak", "Buca"];

/// Sensor name, normal minimum, normal maximum
const SENSORS: [(&str, f64, f64); 6] = [
    ("toprak_direnci", 2.0, 5.0),
    ("kacak_akim", 0.0, 10.0),
    ("toprak_potansiyel", -5.0, 5.0),
    ("toprak_nemi", 20.0, 60.0),
    ("toprak_sicakligi", 5.0, 35.0),
    ("korozyon_seviyesi", 0.0, 30.0),
];
const RESISTANCE: usize = 0;
const LEAKAGE: usize = 1;
const POTENTIAL: usize = 2;
const MOISTURE: usize = 3;
const CORROSION: usize = 5;

/// Per-hour chance of a healthy unit developing a fault
const FAULT_CHANCE: f64 = 0.01;
/// Hourly points kept per unit
const HISTORY_CAPACITY: usize = 24 * 30;
/// Alerts kept by the simulated server
const ALERT_BACKLOG: usize = 100;
/// Alerts returned per page
const ALERT_PAGE: usize = 50;

const REACTIVE_MAINTENANCE_COST: f64 = 50_000.0;
const PREVENTIVE_MAINTENANCE_COST: f64 = 5_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Fault {
    None,
    /// Soil resistance drops and moisture rises for a few hours
    Rain { remaining_hours: u32 },
    /// Resistance creeps up each hour until maintenance
    Corrosion,
    /// Sudden leakage current with raised ground potential
    LeakageSurge { remaining_hours: u32 },
}

struct Unit {
    id: TransformerId,
    name: String,
    region: String,
    position: Position,
    baseline: [f64; 6],
    fault: Fault,
    /// Resistance accumulated by corrosion
    corrosion_drift: f64,
    connected: bool,
    readings: [f64; 6],
    risk_score: f64,
    is_anomaly: bool,
    history: VecDeque<HistoryPoint>,
}

impl Unit {
    fn new(index: u32, rng: &mut StdRng) -> Self {
        let row = f64::from(index % 10) - 5.0;
        let col = f64::from(index / 10) - 2.0;
        let baseline = [
            rng.gen_range(2.5..4.5),
            rng.gen_range(2.0..8.0),
            rng.gen_range(-2.0..2.0),
            rng.gen_range(30.0..50.0),
            rng.gen_range(15.0..25.0),
            rng.gen_range(5.0..20.0),
        ];
        Self {
            id: TransformerId(index + 1),
            name: format!("Trafo {}", index + 1),
            region: REGIONS[index as usize % REGIONS.len()].to_string(),
            position: Position::new(CENTER.0 + row * 0.05, CENTER.1 + col * 0.05),
            baseline,
            fault: Fault::None,
            corrosion_drift: 0.0,
            connected: true,
            readings: baseline,
            risk_score: 0.0,
            is_anomaly: false,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    fn record(&self, at: DateTime<Utc>) -> TransformerRecord {
        let mut record = TransformerRecord::new(self.id, self.name.clone(), self.region.clone());
        record.position = Some(self.position);
        record.sensor_readings = SENSORS
            .iter()
            .zip(self.readings)
            .map(|((name, _, _), value)| (name.to_string(), value))
            .collect();
        record.risk_score = Some(self.risk_score);
        record.is_anomaly_flagged = self.is_anomaly;
        record.isolation_status = self.connected;
        record.last_update = Some(at);
        record
    }

    /// Drift, apply the active fault and rescore
    fn step(&mut self, rng: &mut StdRng, at: DateTime<Utc>) {
        if self.fault == Fault::None && rng.gen_bool(FAULT_CHANCE) {
            self.fault = match rng.gen_range(0..3) {
                0 => Fault::Rain {
                    remaining_hours: rng.gen_range(6..13),
                },
                1 => Fault::Corrosion,
                _ => Fault::LeakageSurge {
                    remaining_hours: rng.gen_range(3..7),
                },
            };
            tracing::debug!(transformer = %self.id, fault = ?self.fault, "demo fault injected");
        }

        let noise = [0.3, 1.5, 1.0, 5.0, 3.0, 2.0];
        let mut readings = self.baseline;
        for (value, spread) in readings.iter_mut().zip(noise) {
            *value += rng.gen_range(-spread..spread);
        }

        match &mut self.fault {
            Fault::None => {}
            Fault::Rain { remaining_hours } => {
                readings[RESISTANCE] -= 0.5;
                readings[MOISTURE] += 20.0;
                *remaining_hours = remaining_hours.saturating_sub(1);
                if *remaining_hours == 0 {
                    self.fault = Fault::None;
                }
            }
            Fault::Corrosion => {
                self.corrosion_drift = (self.corrosion_drift + 0.1).min(20.0);
                readings[CORROSION] += 2.0 * self.corrosion_drift;
            }
            Fault::LeakageSurge { remaining_hours } => {
                readings[LEAKAGE] = 50.0 + rng.gen_range(-2.0..2.0);
                readings[POTENTIAL] = 15.0 + rng.gen_range(-1.0..1.0);
                *remaining_hours = remaining_hours.saturating_sub(1);
                if *remaining_hours == 0 {
                    self.fault = Fault::None;
                }
            }
        }
        readings[RESISTANCE] = (readings[RESISTANCE] + self.corrosion_drift).clamp(0.5, 25.0);
        readings[MOISTURE] = readings[MOISTURE].clamp(0.0, 100.0);
        readings[LEAKAGE] = readings[LEAKAGE].max(0.0);
        readings[CORROSION] = readings[CORROSION].clamp(0.0, 100.0);
        for value in readings.iter_mut() {
            *value = (*value * 100.0).round() / 100.0;
        }

        let excess = worst_excess(&readings);
        self.readings = readings;
        self.is_anomaly = excess > 0.5;
        let jitter = rng.gen_range(-3.0..3.0);
        self.risk_score =
            ((15.0 + 85.0 * (excess / 1.5).min(1.0) + jitter).clamp(0.0, 100.0) * 100.0).round()
                / 100.0;

        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(HistoryPoint {
            timestamp: Some(at),
            readings: self.record(at).sensor_readings,
            risk_score: Some(self.risk_score),
            is_anomaly: self.is_anomaly,
        });
    }

    fn repair(&mut self) {
        self.fault = Fault::None;
        self.corrosion_drift = 0.0;
    }
}

/// Largest distance outside a normal range, in units of that range's width
fn worst_excess(readings: &[f64; 6]) -> f64 {
    SENSORS
        .iter()
        .zip(readings)
        .map(|((_, min, max), value)| {
            let width = max - min;
            ((value - max) / width).max((min - value) / width).max(0.0)
        })
        .fold(0.0, f64::max)
}

struct DemoFleet {
    rng: StdRng,
    clock: DateTime<Utc>,
    units: Vec<Unit>,
    /// Newest first
    alerts: VecDeque<AlertRecord>,
}

impl DemoFleet {
    fn advance(&mut self) {
        self.clock += ChronoDuration::hours(1);
        let at = self.clock;
        let mut raised = Vec::new();

        for unit in &mut self.units {
            let was_at_risk = unit.risk_score >= HIGH_THRESHOLD;
            unit.step(&mut self.rng, at);

            if unit.risk_score >= HIGH_THRESHOLD && !was_at_risk {
                let severity = if unit.risk_score >= FAULTY_THRESHOLD {
                    AlertSeverity::High
                } else {
                    AlertSeverity::Medium
                };
                raised.push(alert(
                    at,
                    unit,
                    severity,
                    format!("{} high risk detected (risk {:.1})", unit.name, unit.risk_score),
                ));
            }

            if unit.risk_score >= FAULTY_THRESHOLD && unit.connected {
                unit.connected = false;
                tracing::info!(
                    transformer = %unit.id,
                    risk = unit.risk_score,
                    "demo unit auto-isolated"
                );
                raised.push(alert(
                    at,
                    unit,
                    AlertSeverity::High,
                    format!(
                        "{} automatically isolated (risk {:.1})",
                        unit.name, unit.risk_score
                    ),
                ));
            }
        }

        for record in raised {
            self.push_alert(record);
        }
    }

    fn push_alert(&mut self, record: AlertRecord) {
        if self.alerts.len() == ALERT_BACKLOG {
            self.alerts.pop_back();
        }
        self.alerts.push_front(record);
    }

    fn unit(&self, id: TransformerId) -> Option<&Unit> {
        self.units.iter().find(|u| u.id == id)
    }

    fn unit_mut(&mut self, id: TransformerId) -> Option<&mut Unit> {
        self.units.iter_mut().find(|u| u.id == id)
    }

    fn statistics(&self) -> Statistics {
        let scores: Vec<f64> = self.units.iter().map(|u| u.risk_score).collect();
        let high = scores.iter().filter(|&&s| s >= HIGH_THRESHOLD).count() as u32;
        let medium = scores
            .iter()
            .filter(|&&s| (MEDIUM_THRESHOLD..HIGH_THRESHOLD).contains(&s))
            .count() as u32;
        let average =
            (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64);

        Statistics {
            total: self.units.len() as u32,
            anomaly_count: Some(self.units.iter().filter(|u| u.is_anomaly).count() as u32),
            isolated_count: self.units.iter().filter(|u| !u.connected).count() as u32,
            average_risk: average.map(|a| (a * 100.0).round() / 100.0),
            max_risk: scores.iter().copied().reduce(f64::max),
            min_risk: scores.iter().copied().reduce(f64::min),
            high_risk: high,
            medium_risk: medium,
            low_risk: scores.len() as u32 - high - medium,
            total_alerts: Some(self.alerts.len() as u32),
            estimated_savings: Some(
                f64::from(high) * (REACTIVE_MAINTENANCE_COST - PREVENTIVE_MAINTENANCE_COST),
            ),
        }
    }
}

fn alert(at: DateTime<Utc>, unit: &Unit, severity: AlertSeverity, message: String) -> AlertRecord {
    AlertRecord {
        message,
        severity,
        timestamp: Some(at),
        transformer_id: Some(unit.id),
        risk_score: Some(unit.risk_score),
    }
}

/// Simulated telemetry source
pub struct DemoSource {
    fleet: Mutex<DemoFleet>,
}

impl Default for DemoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoSource {
    /// Create a simulator seeded from entropy
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Create a reproducible simulator
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(mut rng: StdRng) -> Self {
        let units = (0..FLEET_SIZE).map(|i| Unit::new(i, &mut rng)).collect();
        let mut fleet = DemoFleet {
            rng,
            clock: Utc::now(),
            units,
            alerts: VecDeque::new(),
        };
        // Score every unit before the first poll
        fleet.advance();
        Self {
            fleet: Mutex::new(fleet),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DemoFleet> {
        self.fleet.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Force a fault on one unit. Returns false for an unknown id.
    pub fn inject_leakage_surge(&self, id: TransformerId, hours: u32) -> bool {
        match self.lock().unit_mut(id) {
            Some(unit) => {
                unit.fault = Fault::LeakageSurge {
                    remaining_hours: hours.max(1),
                };
                true
            }
            None => false,
        }
    }

    /// Advance the simulation by `hours` without a fleet poll
    pub fn advance(&self, hours: u32) {
        let mut fleet = self.lock();
        for _ in 0..hours {
            fleet.advance();
        }
    }
}

#[async_trait]
impl TelemetrySource for DemoSource {
    async fn fetch_fleet(&self) -> Result<FleetSnapshot, FetchError> {
        let mut fleet = self.lock();
        fleet.advance();
        let at = fleet.clock;
        Ok(FleetSnapshot::from_records(
            fleet.units.iter().map(|u| u.record(at)),
        ))
    }

    async fn fetch_statistics(&self) -> Result<Statistics, FetchError> {
        Ok(self.lock().statistics())
    }

    async fn fetch_alerts(&self) -> Result<Vec<AlertRecord>, FetchError> {
        Ok(self.lock().alerts.iter().take(ALERT_PAGE).cloned().collect())
    }

    async fn fetch_detail(&self, id: TransformerId) -> Result<TransformerRecord, FetchError> {
        let fleet = self.lock();
        fleet
            .unit(id)
            .map(|u| u.record(fleet.clock))
            .ok_or_else(|| FetchError::Unsuccessful(format!("Transformer {id} not found")))
    }

    async fn fetch_history(
        &self,
        id: TransformerId,
        window_days: u32,
    ) -> Result<Vec<HistoryPoint>, FetchError> {
        let fleet = self.lock();
        let unit = fleet
            .unit(id)
            .ok_or_else(|| FetchError::Unsuccessful(format!("Transformer {id} not found")))?;
        let since = fleet.clock - ChronoDuration::days(i64::from(window_days));
        Ok(unit
            .history
            .iter()
            .filter(|p| p.timestamp.is_some_and(|t| t >= since))
            .cloned()
            .collect())
    }

    async fn set_isolation(
        &self,
        id: TransformerId,
        action: IsolationAction,
    ) -> Result<IsolationAck, ActionError> {
        let mut fleet = self.lock();
        let unit = fleet
            .unit_mut(id)
            .ok_or_else(|| ActionError::Rejected(format!("Invalid transformer id {id}")))?;

        let message = match action {
            IsolationAction::Isolate => {
                unit.connected = false;
                format!("{} isolated", unit.name)
            }
            IsolationAction::Restore => {
                unit.connected = true;
                unit.repair();
                format!("{} restored after maintenance", unit.name)
            }
        };
        tracing::info!(transformer = %id, action = action.as_str(), "demo isolation command");

        Ok(IsolationAck {
            message: Some(message),
            isolation_status: Some(unit.connected),
        })
    }
}

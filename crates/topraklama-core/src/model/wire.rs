//! Response decoding
//!
//! Both dashboard API variants are accepted: ids as `id` or `transformer_id`,
//! the fleet under `transformers` or `data`, detail records flat or with a
//! nested `latest_data`, statistics flat or under `stats`. Decoding is
//! lenient at the record level: a record with unusable fields is kept with
//! those fields empty, and only a record without an id is dropped.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::{
    AlertRecord, AlertSeverity, FleetSnapshot, HealthStatus, HistoryPoint, IsolationAck, Position,
    Statistics, TransformerId, TransformerRecord,
};
use crate::error::{ActionError, FetchError};

const ID_KEYS: &[&str] = &["id", "transformer_id", "transformerId"];
const SCORE_KEYS: &[&str] = &["risk_score", "riskScore"];
const ANOMALY_KEYS: &[&str] = &["is_anomaly", "isAnomalyFlagged", "anomaly", "anomali"];
const ISOLATION_KEYS: &[&str] = &["isolation_status", "isolationStatus"];
const TIMESTAMP_KEYS: &[&str] = &["last_update", "lastUpdate", "timestamp"];
const LATITUDE_KEYS: &[&str] = &["latitude", "lat"];
const LONGITUDE_KEYS: &[&str] = &["longitude", "lng", "lon"];

/// Objects whose fields are lifted into the record itself
const NESTED_KEYS: &[&str] = &[
    "latest_data",
    "latestData",
    "sensor_data",
    "sensorData",
    "sensor_readings",
    "sensorReadings",
];

/// Numeric fields that are never sensor readings
const RESERVED_KEYS: &[&str] = &[
    "id",
    "transformer_id",
    "transformerId",
    "name",
    "region",
    "latitude",
    "longitude",
    "lat",
    "lng",
    "lon",
    "position",
    "risk_score",
    "riskScore",
    "risk_level",
    "risk_color",
    "anomaly_score",
    "is_anomaly",
    "isAnomalyFlagged",
    "anomaly",
    "anomali",
    "isolation_status",
    "isolationStatus",
    "last_update",
    "lastUpdate",
    "timestamp",
];

/// Check a response's success indicator.
///
/// `false` is always a failure. An absent indicator is a failure only when
/// `require_flag` is set; otherwise an `error` string still marks failure.
pub fn check_success(body: &Value, require_flag: bool) -> Result<(), FetchError> {
    match body.get("success") {
        Some(Value::Bool(true)) => Ok(()),
        Some(_) => Err(FetchError::Unsuccessful(error_message(body))),
        None if require_flag => Err(FetchError::Unsuccessful(
            "response carries no success flag".to_string(),
        )),
        None => match body.get("error").and_then(Value::as_str) {
            Some(message) => Err(FetchError::Unsuccessful(message.to_string())),
            None => Ok(()),
        },
    }
}

fn error_message(body: &Value) -> String {
    body.get("error")
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("no error message")
        .to_string()
}

/// Decode a fleet listing into a snapshot
pub fn decode_fleet(body: &Value, require_flag: bool) -> Result<FleetSnapshot, FetchError> {
    check_success(body, require_flag)?;
    let items = list_field(body, &["transformers", "data"])
        .ok_or_else(|| FetchError::Decode("fleet response has no transformer list".into()))?;

    let mut skipped = 0usize;
    let records: Vec<TransformerRecord> = items
        .iter()
        .filter_map(|item| {
            let record = decode_record(item);
            if record.is_none() {
                skipped += 1;
            }
            record
        })
        .collect();

    if skipped > 0 {
        tracing::warn!(skipped, "fleet response contained records without an id");
    }

    Ok(FleetSnapshot::from_records(records))
}

/// Decode a single-transformer detail response
pub fn decode_detail(body: &Value, require_flag: bool) -> Result<TransformerRecord, FetchError> {
    check_success(body, require_flag)?;
    let inner = match body.get("transformer") {
        Some(value @ Value::Object(_)) => value,
        _ => body,
    };
    decode_record(inner)
        .ok_or_else(|| FetchError::Decode("detail response has no transformer id".into()))
}

/// Decode a history series
pub fn decode_history(body: &Value, require_flag: bool) -> Result<Vec<HistoryPoint>, FetchError> {
    check_success(body, require_flag)?;
    let items = list_field(body, &["history", "data"])
        .ok_or_else(|| FetchError::Decode("history response has no series".into()))?;
    Ok(items.iter().filter_map(decode_history_point).collect())
}

/// Decode aggregate statistics
pub fn decode_statistics(body: &Value, require_flag: bool) -> Result<Statistics, FetchError> {
    check_success(body, require_flag)?;
    let obj = ["stats", "statistics"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_object))
        .or_else(|| body.as_object())
        .ok_or_else(|| FetchError::Decode("statistics response is not an object".into()))?;

    let distribution = obj.get("risk_distribution").and_then(Value::as_object);
    let bucket = |flat: &str, nested: &str| {
        u32_field(obj, &[flat])
            .or_else(|| distribution.and_then(|d| u32_field(d, &[nested])))
            .unwrap_or(0)
    };

    Ok(Statistics {
        total: u32_field(obj, &["total", "total_transformers"]).unwrap_or(0),
        anomaly_count: u32_field(obj, &["anomaly_count", "anomalyCount"]),
        isolated_count: u32_field(obj, &["isolated_count", "isolatedCount", "isolated"])
            .unwrap_or(0),
        average_risk: f64_field(obj, &["average_risk", "averageRisk"]),
        max_risk: f64_field(obj, &["max_risk"]),
        min_risk: f64_field(obj, &["min_risk"]),
        high_risk: bucket("high_risk", "high"),
        medium_risk: bucket("medium_risk", "medium"),
        low_risk: bucket("low_risk", "low"),
        total_alerts: u32_field(obj, &["total_alerts"]),
        estimated_savings: f64_field(obj, &["estimated_savings", "estimatedSavings"]),
    })
}

/// Decode the alert page
pub fn decode_alerts(body: &Value, require_flag: bool) -> Result<Vec<AlertRecord>, FetchError> {
    check_success(body, require_flag)?;
    let items = list_field(body, &["alerts"])
        .ok_or_else(|| FetchError::Decode("alert response has no alert list".into()))?;
    Ok(items.iter().filter_map(decode_alert).collect())
}

/// Decode the response to an isolate/restore command
pub fn decode_isolation_ack(body: &Value, require_flag: bool) -> Result<IsolationAck, ActionError> {
    check_success(body, require_flag).map_err(|e| match e {
        FetchError::Unsuccessful(message) => ActionError::Rejected(message),
        other => ActionError::Request(other),
    })?;
    Ok(IsolationAck {
        message: body.get("message").and_then(Value::as_str).map(String::from),
        isolation_status: body
            .as_object()
            .and_then(|obj| bool_field(obj, ISOLATION_KEYS)),
    })
}

/// Decode the health endpoint. Any status other than `ok` is a failure.
pub fn decode_health(body: &Value) -> Result<HealthStatus, FetchError> {
    let status = body
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| FetchError::Decode("health response has no status".into()))?;
    let health = HealthStatus {
        status: status.to_string(),
        message: body.get("message").and_then(Value::as_str).map(String::from),
        model_loaded: body.get("model_loaded").and_then(Value::as_bool),
        timestamp: body.get("timestamp").and_then(timestamp_value),
    };
    if !health.is_ok() {
        return Err(FetchError::Unsuccessful(format!("health status is {status}")));
    }
    Ok(health)
}

/// Parse the timestamp formats the API emits (RFC 3339, or naive ISO treated as UTC)
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
    ]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    .map(|naive| naive.and_utc())
}

fn timestamp_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => {
            let raw = n.as_i64()?;
            // Anything past 1e12 can only be milliseconds
            if raw.abs() >= 1_000_000_000_000 {
                DateTime::from_timestamp_millis(raw)
            } else {
                DateTime::from_timestamp(raw, 0)
            }
        }
        _ => None,
    }
}

fn decode_record(value: &Value) -> Option<TransformerRecord> {
    let fields = merged_fields(value)?;
    let id = ID_KEYS.iter().find_map(|k| fields.get(*k).and_then(id_value))?;

    let name = string_field(&fields, &["name"]).unwrap_or_else(|| format!("Transformer {id}"));
    let region = string_field(&fields, &["region"]).unwrap_or_default();

    Some(TransformerRecord {
        id,
        name,
        region,
        position: position_of(&fields),
        sensor_readings: readings_of(&fields),
        risk_score: f64_field(&fields, SCORE_KEYS),
        is_anomaly_flagged: bool_field(&fields, ANOMALY_KEYS).unwrap_or(false),
        isolation_status: bool_field(&fields, ISOLATION_KEYS).unwrap_or(true),
        last_update: TIMESTAMP_KEYS
            .iter()
            .find_map(|k| fields.get(*k).and_then(timestamp_value)),
    })
}

fn decode_history_point(value: &Value) -> Option<HistoryPoint> {
    let fields = merged_fields(value)?;
    Some(HistoryPoint {
        timestamp: TIMESTAMP_KEYS
            .iter()
            .find_map(|k| fields.get(*k).and_then(timestamp_value)),
        readings: readings_of(&fields),
        risk_score: f64_field(&fields, SCORE_KEYS),
        is_anomaly: bool_field(&fields, ANOMALY_KEYS).unwrap_or(false),
    })
}

fn decode_alert(value: &Value) -> Option<AlertRecord> {
    let obj = value.as_object()?;
    let message = string_field(obj, &["message"])?;
    Some(AlertRecord {
        message,
        severity: obj
            .get("severity")
            .and_then(Value::as_str)
            .map(AlertSeverity::from)
            .unwrap_or(AlertSeverity::Low),
        timestamp: obj.get("timestamp").and_then(timestamp_value),
        transformer_id: ID_KEYS.iter().skip(1).find_map(|k| obj.get(*k).and_then(id_value)),
        risk_score: f64_field(obj, SCORE_KEYS),
    })
}

/// Top-level fields with the nested reading/latest-data objects lifted in
fn merged_fields(value: &Value) -> Option<Map<String, Value>> {
    let obj = value.as_object()?;
    let mut merged = obj.clone();
    for key in NESTED_KEYS {
        if let Some(Value::Object(inner)) = merged.remove(*key) {
            for (k, v) in inner {
                merged.insert(k, v);
            }
        }
    }
    Some(merged)
}

fn position_of(fields: &Map<String, Value>) -> Option<Position> {
    let source = fields
        .get("position")
        .and_then(Value::as_object)
        .unwrap_or(fields);
    let latitude = f64_field(source, LATITUDE_KEYS)?;
    let longitude = f64_field(source, LONGITUDE_KEYS)?;
    if (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude) {
        Some(Position::new(latitude, longitude))
    } else {
        None
    }
}

fn readings_of(fields: &Map<String, Value>) -> BTreeMap<String, f64> {
    fields
        .iter()
        .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
        .filter_map(|(k, v)| v.as_f64().filter(|f| f.is_finite()).map(|f| (k.clone(), f)))
        .collect()
}

fn list_field<'a>(body: &'a Value, keys: &[&str]) -> Option<&'a Vec<Value>> {
    if let Value::Array(items) = body {
        return Some(items);
    }
    keys.iter().find_map(|k| body.get(*k).and_then(Value::as_array))
}

fn id_value(value: &Value) -> Option<TransformerId> {
    let raw = match value {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    u32::try_from(raw).ok().map(TransformerId)
}

fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(String::from)
}

fn f64_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_f64))
        .filter(|f| f.is_finite())
}

fn u32_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<u32> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_u64))
        .and_then(|n| u32::try_from(n).ok())
}

fn bool_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|k| obj.get(*k).and_then(flag_value))
}

fn flag_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_decode_primary_fleet() {
        let body = json!({
            "success": true,
            "count": 1,
            "transformers": [{
                "id": 7,
                "name": "Trafo 7",
                "region": "Bornova",
                "latitude": 38.47,
                "longitude": 27.19,
                "risk_score": 72.5,
                "risk_level": "high",
                "is_anomaly": true,
                "isolation_status": false,
                "last_update": "2024-11-05T10:00:00.123456",
                "sensor_data": { "toprak_direnci": 6.1, "kacak_akim": 12.0 }
            }]
        });

        let fleet = decode_fleet(&body, true).unwrap();
        let record = fleet.get(TransformerId(7)).unwrap();
        assert_eq!(record.region, "Bornova");
        assert_eq!(record.position, Some(Position::new(38.47, 27.19)));
        assert_eq!(record.risk_score, Some(72.5));
        assert!(record.is_anomaly_flagged);
        assert!(record.is_isolated());
        assert_eq!(record.reading("toprak_direnci"), Some(6.1));
        assert_eq!(record.sensor_readings.len(), 2);
        assert!(record.last_update.is_some());
    }

    #[test]
    fn test_decode_legacy_realtime_data() {
        let body = json!({
            "data": [{
                "transformer_id": 3,
                "name": "Trafo 3",
                "latitude": 38.3,
                "longitude": 27.0,
                "region": "Konak",
                "toprak_nemi": 41.0,
                "risk_score": 0,
                "risk_level": "unknown",
                "risk_color": "gray",
                "is_anomaly": false,
                "timestamp": "2024-11-05T10:00:00"
            }],
            "count": 1,
            "source": "csv"
        });

        let fleet = decode_fleet(&body, false).unwrap();
        let record = fleet.get(TransformerId(3)).unwrap();
        assert_eq!(record.risk_score, Some(0.0));
        assert!(record.isolation_status);
        assert_eq!(record.reading("toprak_nemi"), Some(41.0));
        assert_eq!(record.reading("risk_score"), None);
    }

    #[test]
    fn test_missing_position_keeps_record() {
        let body = json!({ "success": true, "transformers": [
            { "id": 1, "name": "no coords" },
            { "name": "no id" },
        ]});
        let fleet = decode_fleet(&body, true).unwrap();
        assert_eq!(fleet.len(), 1);
        let record = fleet.get(TransformerId(1)).unwrap();
        assert!(!record.is_renderable());
        assert_eq!(record.risk_score, None);
    }

    #[test]
    fn test_success_flag_policy() {
        let absent = json!({ "transformers": [] });
        assert!(matches!(
            decode_fleet(&absent, true),
            Err(FetchError::Unsuccessful(_))
        ));
        assert!(decode_fleet(&absent, false).is_ok());

        let failed = json!({ "success": false, "error": "Geçersiz trafo ID" });
        assert_eq!(
            decode_detail(&failed, false),
            Err(FetchError::Unsuccessful("Geçersiz trafo ID".into()))
        );

        let error_only = json!({ "error": "boom" });
        assert!(check_success(&error_only, false).is_err());
    }

    #[test]
    fn test_decode_detail_nested_latest_data() {
        let body = json!({
            "id": 12,
            "name": "Trafo 12",
            "region": "Buca",
            "latitude": 38.39,
            "longitude": 27.17,
            "latest_data": {
                "kacak_akim": 48.0,
                "risk_score": 91.2,
                "is_anomaly": true,
                "timestamp": "2024-10-15 08:00:00"
            }
        });
        let record = decode_detail(&body, false).unwrap();
        assert_eq!(record.risk_score, Some(91.2));
        assert!(record.is_anomaly_flagged);
        assert_eq!(record.reading("kacak_akim"), Some(48.0));
        assert!(record.last_update.is_some());
    }

    #[test]
    fn test_decode_detail_envelope() {
        let body = json!({ "success": true, "transformer": { "id": 4, "risk_score": 12.0 } });
        let record = decode_detail(&body, true).unwrap();
        assert_eq!(record.id, TransformerId(4));
        assert_eq!(record.name, "Transformer 4");
    }

    #[test]
    fn test_decode_statistics_variants() {
        let primary = json!({ "success": true, "stats": {
            "total_transformers": 50,
            "anomaly_count": 4,
            "isolated_count": 2,
            "risk_distribution": { "high": 3, "medium": 7, "low": 40 },
            "average_risk": 23.4
        }});
        let stats = decode_statistics(&primary, true).unwrap();
        assert_eq!(stats.total, 50);
        assert_eq!(stats.anomaly_count, Some(4));
        assert_eq!(stats.high_risk, 3);
        assert_eq!(stats.low_risk, 40);
        assert_eq!(stats.estimated_savings, None);

        let legacy = json!({
            "total_transformers": 50,
            "high_risk": 2,
            "medium_risk": 5,
            "low_risk": 43,
            "isolated": 1,
            "total_alerts": 9,
            "estimated_savings": 90000.0
        });
        let stats = decode_statistics(&legacy, false).unwrap();
        assert_eq!(stats.isolated_count, 1);
        assert_eq!(stats.medium_risk, 5);
        assert_eq!(stats.estimated_savings, Some(90000.0));
    }

    #[test]
    fn test_decode_alerts_skips_messageless_entries() {
        let body = json!({ "success": true, "alerts": [
            { "message": "Trafo 5: Yüksek risk", "severity": "high", "transformer_id": 5,
              "timestamp": "2024-11-05T10:00:00", "risk_score": 84.0 },
            { "severity": "medium" },
            { "message": "no severity" },
        ]});
        let alerts = decode_alerts(&body, true).unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].severity, AlertSeverity::High);
        assert_eq!(alerts[0].transformer_id, Some(TransformerId(5)));
        assert_eq!(alerts[1].severity, AlertSeverity::Low);
    }

    #[test]
    fn test_decode_history_anomali_flag() {
        let body = json!({ "transformer_id": 2, "data": [
            { "timestamp": "2024-11-01T00:00:00", "toprak_direnci": 3.2, "anomali": 1 },
            { "timestamp": "2024-11-01T01:00:00", "toprak_direnci": 3.3, "anomali": 0 },
        ]});
        let history = decode_history(&body, false).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].is_anomaly);
        assert!(!history[1].is_anomaly);
        assert_eq!(history[1].readings.get("toprak_direnci"), Some(&3.3));
    }

    #[test]
    fn test_decode_isolation_ack() {
        let ok = json!({
            "success": true,
            "message": "Trafo 3 izole edildi",
            "isolation_status": false
        });
        let ack = decode_isolation_ack(&ok, true).unwrap();
        assert_eq!(ack.isolation_status, Some(false));

        let rejected = json!({ "success": false, "error": "Geçersiz trafo ID" });
        assert_eq!(
            decode_isolation_ack(&rejected, true),
            Err(ActionError::Rejected("Geçersiz trafo ID".into()))
        );
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-11-05T10:00:00Z").is_some());
        assert!(parse_timestamp("2024-11-05T10:00:00+03:00").is_some());
        assert!(parse_timestamp("2024-11-05T10:00:00.5").is_some());
        assert!(parse_timestamp("2024-11-05 10:00:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_decode_health() {
        let primary = json!({
            "status": "ok",
            "message": "API çalışıyor",
            "timestamp": "2024-11-05T10:00:00.123456"
        });
        let health = decode_health(&primary).unwrap();
        assert!(health.is_ok());
        assert!(health.timestamp.is_some());
        assert_eq!(health.model_loaded, None);

        let legacy = json!({ "status": "ok", "model_loaded": false });
        assert_eq!(decode_health(&legacy).unwrap().model_loaded, Some(false));

        assert!(matches!(
            decode_health(&json!({ "status": "degraded" })),
            Err(FetchError::Unsuccessful(_))
        ));
        assert!(matches!(
            decode_health(&json!({ "success": false, "error": "Endpoint bulunamadı" })),
            Err(FetchError::Decode(_))
        ));
    }
}

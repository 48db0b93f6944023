//! Weight measurement record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::transfer::TransferObject;

/// A single weight measurement
///
/// Immutable once constructed. Records have no identity beyond their content
/// and the order they arrive in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightRecord {
    /// Kilograms
    weight: f64,
    /// Written as RFC 3339; also read from seconds since 2001-01-01T00:00:00Z
    #[serde(deserialize_with = "deserialize_time")]
    time: DateTime<Utc>,
}

impl WeightRecord {
    pub fn new(weight: f64, time: DateTime<Utc>) -> Self {
        Self { weight, time }
    }

    /// Record a weight taken now
    pub fn now(weight: f64) -> Self {
        Self::new(weight, Utc::now())
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// JSON has no representation for NaN or infinities; such a record would
    /// not survive an encode/decode round trip.
    pub fn is_encodable(&self) -> bool {
        self.weight.is_finite()
    }
}

impl TransferObject for WeightRecord {
    const ROUTING_KEY: &'static str = "Weight";
}

/// Unix milliseconds of the platform reference date, 2001-01-01T00:00:00Z
const REFERENCE_DATE_UNIX_MS: i64 = 978_307_200_000;

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTime {
    Text(DateTime<Utc>),
    ReferenceSeconds(f64),
}

fn deserialize_time<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    match RawTime::deserialize(deserializer)? {
        RawTime::Text(time) => Ok(time),
        RawTime::ReferenceSeconds(seconds) => from_reference_seconds(seconds).ok_or_else(|| {
            serde::de::Error::custom(format!("reference-date timestamp out of range: {}", seconds))
        }),
    }
}

fn from_reference_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let millis = (seconds * 1000.0).round() as i64;
    DateTime::from_timestamp_millis(REFERENCE_DATE_UNIX_MS.checked_add(millis)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_json_layout() {
        let time = Utc.with_ymd_and_hms(2018, 5, 10, 8, 30, 0).unwrap();
        let record = WeightRecord::new(70.5, time);

        let bytes = record.encode().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["weight"], serde_json::json!(70.5));
        assert_eq!(value["time"], serde_json::json!("2018-05-10T08:30:00Z"));

        assert_eq!(WeightRecord::decode(&bytes).unwrap(), record);
    }

    #[test]
    fn test_decode_reference_date_timestamp() {
        // 2018-05-10T08:30:00Z as seconds since 2001-01-01
        let record = WeightRecord::decode(br#"{"weight":70.5,"time":547633800}"#).unwrap();
        assert_eq!(record.time(), Utc.with_ymd_and_hms(2018, 5, 10, 8, 30, 0).unwrap());

        let fractional = WeightRecord::decode(br#"{"weight":70.5,"time":0.25}"#).unwrap();
        assert_eq!(fractional.time().timestamp_millis(), REFERENCE_DATE_UNIX_MS + 250);

        // Re-encoding normalizes to RFC 3339
        let value: serde_json::Value = serde_json::from_slice(&record.encode().unwrap()).unwrap();
        assert_eq!(value["time"], serde_json::json!("2018-05-10T08:30:00Z"));

        assert!(WeightRecord::decode(br#"{"weight":70.5,"time":1e300}"#).is_err());
    }

    #[test]
    fn test_encodable() {
        assert!(WeightRecord::now(80.0).is_encodable());
        assert!(!WeightRecord::now(f64::NAN).is_encodable());
        assert!(!WeightRecord::now(f64::INFINITY).is_encodable());
    }

    #[test]
    fn test_decode_rejects_schema_mismatch() {
        assert!(WeightRecord::decode(br#"{"weight":"heavy","time":"2018-05-10T08:30:00Z"}"#).is_err());
        assert!(WeightRecord::decode(br#"{"weight":70.0}"#).is_err());
        assert!(WeightRecord::decode(b"").is_err());
    }
}

// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Sensor Readings
//!
//! The domain object accepted by the ingestion endpoint and forwarded to the queue.
//! Field names are camelCase on the wire in both directions.
//!
//! Validation distinguishes two failure classes:
//! - `IngestionError::Validation` for malformed input (blank or oversized
//!   identifiers, non-finite values)
//! - `IngestionError::BusinessRule` for well-formed readings that cannot be real
//!   (values outside the plausible range of the sensor, timestamps in the future or
//!   before `EARLIEST_TIMESTAMP`)

use crate::errors::IngestionError;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Longest accepted `fieldId` / `sensorType`.
pub const MAX_IDENTIFIER_LEN: usize = 100;

/// Bounds applied to sensor types without a dedicated range.
pub const MIN_READING_VALUE: f64 = -1_000.0;
pub const MAX_READING_VALUE: f64 = 100_000.0;

/// How far ahead of the server clock a reading may be stamped.
pub const MAX_CLOCK_SKEW_SECS: i64 = 300;

/// Readings older than 2000-01-01T00:00:00Z are rejected.
pub const EARLIEST_TIMESTAMP_SECS: i64 = 946_684_800;

/// A single measurement taken by a field sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    pub field_id: String,
    pub sensor_type: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Sensor types with a known physical range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    SoilMoisture,
    Temperature,
    Humidity,
    Precipitation,
}

impl SensorKind {
    /// Matches tags case-insensitively, accepting `-` or `_` as separators.
    pub fn from_tag(tag: &str) -> Option<SensorKind> {
        match tag.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "soil_moisture" | "soilmoisture" => Some(SensorKind::SoilMoisture),
            "temperature" => Some(SensorKind::Temperature),
            "humidity" => Some(SensorKind::Humidity),
            "precipitation" | "rainfall" => Some(SensorKind::Precipitation),
            _ => None,
        }
    }

    /// Inclusive plausible range.
    pub fn range(&self) -> (f64, f64) {
        match self {
            SensorKind::SoilMoisture => (0.0, 100.0),
            SensorKind::Temperature => (-60.0, 70.0),
            SensorKind::Humidity => (0.0, 100.0),
            SensorKind::Precipitation => (0.0, 1_000.0),
        }
    }
}

impl SensorReading {
    /// Validates the reading against the current time.
    pub fn validate(&self) -> Result<(), IngestionError> {
        self.validate_at(Utc::now())
    }

    /// Validates the reading as if the current time were `now`.
    pub fn validate_at(&self, now: DateTime<Utc>) -> Result<(), IngestionError> {
        check_identifier("fieldId", &self.field_id)?;
        check_identifier("sensorType", &self.sensor_type)?;

        if !self.value.is_finite() {
            return Err(IngestionError::Validation(
                "value must be a finite number".to_owned(),
            ));
        }

        let (min, max) = SensorKind::from_tag(&self.sensor_type)
            .map(|kind| kind.range())
            .unwrap_or((MIN_READING_VALUE, MAX_READING_VALUE));

        if self.value < min || self.value > max {
            return Err(IngestionError::BusinessRule(format!(
                "value {} is outside the accepted range [{}, {}] for sensor type `{}`",
                self.value, min, max, self.sensor_type
            )));
        }

        if self.timestamp > now + Duration::seconds(MAX_CLOCK_SKEW_SECS) {
            return Err(IngestionError::BusinessRule(
                "timestamp is in the future".to_owned(),
            ));
        }

        if self.timestamp.timestamp() < EARLIEST_TIMESTAMP_SECS {
            return Err(IngestionError::BusinessRule(format!(
                "timestamp is earlier than {}",
                Utc.timestamp_opt(EARLIEST_TIMESTAMP_SECS, 0)
                    .single()
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default()
            )));
        }

        Ok(())
    }
}

fn check_identifier(name: &str, value: &str) -> Result<(), IngestionError> {
    if value.trim().is_empty() {
        return Err(IngestionError::Validation(format!("{} is required", name)));
    }

    if value.chars().count() > MAX_IDENTIFIER_LEN {
        return Err(IngestionError::Validation(format!(
            "{} must be at most {} characters",
            name, MAX_IDENTIFIER_LEN
        )));
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn reading() -> SensorReading {
        SensorReading {
            field_id: "F1".to_owned(),
            sensor_type: "soil_moisture".to_owned(),
            value: 42.5,
            timestamp: "2024-05-01T10:00:00Z".parse().unwrap(),
        }
    }

    fn now() -> DateTime<Utc> {
        "2024-05-01T10:02:00Z".parse().unwrap()
    }

    #[test]
    fn accepts_a_plausible_reading() {
        assert_eq!(reading().validate_at(now()), Ok(()));
    }

    #[test]
    fn blank_identifiers_are_validation_errors() {
        let mut r = reading();
        r.field_id = " ".to_owned();
        assert!(matches!(r.validate_at(now()), Err(IngestionError::Validation(_))));

        let mut r = reading();
        r.sensor_type = String::new();
        assert!(matches!(r.validate_at(now()), Err(IngestionError::Validation(_))));
    }

    #[test]
    fn oversized_identifier_is_a_validation_error() {
        let mut r = reading();
        r.field_id = "x".repeat(MAX_IDENTIFIER_LEN + 1);
        assert!(matches!(r.validate_at(now()), Err(IngestionError::Validation(_))));
    }

    #[test]
    fn non_finite_values_are_validation_errors() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut r = reading();
            r.value = value;
            assert!(matches!(r.validate_at(now()), Err(IngestionError::Validation(_))));
        }
    }

    #[test]
    fn out_of_range_value_breaks_a_business_rule() {
        let mut r = reading();
        r.value = -9999.0;
        assert!(matches!(r.validate_at(now()), Err(IngestionError::BusinessRule(_))));

        let mut r = reading();
        r.sensor_type = "leaf_wetness".to_owned();
        r.value = -9999.0;
        assert!(matches!(r.validate_at(now()), Err(IngestionError::BusinessRule(_))));
    }

    #[test]
    fn known_sensor_types_use_their_own_range() {
        let mut r = reading();
        r.value = 150.0;
        assert!(matches!(r.validate_at(now()), Err(IngestionError::BusinessRule(_))));

        r.sensor_type = "leaf_wetness".to_owned();
        assert_eq!(r.validate_at(now()), Ok(()));
    }

    #[test]
    fn sensor_tags_are_matched_loosely() {
        assert_eq!(SensorKind::from_tag("Soil-Moisture"), Some(SensorKind::SoilMoisture));
        assert_eq!(SensorKind::from_tag(" TEMPERATURE "), Some(SensorKind::Temperature));
        assert_eq!(SensorKind::from_tag("wind_speed"), None);
    }

    #[test]
    fn future_and_ancient_timestamps_break_business_rules() {
        let mut r = reading();
        r.timestamp = now() + Duration::days(1);
        assert!(matches!(r.validate_at(now()), Err(IngestionError::BusinessRule(_))));

        r.timestamp = now() + Duration::seconds(MAX_CLOCK_SKEW_SECS);
        assert_eq!(r.validate_at(now()), Ok(()));

        r.timestamp = "1999-12-31T23:59:59Z".parse().unwrap();
        assert!(matches!(r.validate_at(now()), Err(IngestionError::BusinessRule(_))));
    }

    #[test]
    fn wire_format_is_camel_case_both_ways() {
        let json = serde_json::to_value(reading()).unwrap();
        assert_eq!(json["fieldId"], "F1");
        assert_eq!(json["sensorType"], "soil_moisture");
        assert_eq!(json["value"], 42.5);
        assert_eq!(json["timestamp"], "2024-05-01T10:00:00Z");

        let decoded: SensorReading = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, reading());
    }
}

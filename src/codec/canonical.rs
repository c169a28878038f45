//! Canonical outbound encodings
//!
//! Two forms leave the gateway, neither of which is the inverse of the
//! regional wire layouts:
//!
//! - **Display form** for the direct pub/sub sink:
//!   `[norte | 25.30 | 60.10 | 1013.25 | 500.10]`
//!   (region, temperature, humidity, pressure, radiation)
//! - **Record form** for the message bus:
//!   `{"regiao":"norte","temperatura":25.3,"umidade":60.1,"pressao":1013.25,"radiacao":500.1,"timestamp":1700000000000}`
//!
//! Both round values to two decimals and use `.` as the decimal point.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize, Serializer};

use super::error::DecodeError;
use crate::types::{Reading, Region};

// ============================================================================
// Display form
// ============================================================================

/// Values recovered from a display-form string
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DisplayFields {
    pub region: Region,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub radiation: f64,
}

/// Render the human-readable form of a reading
pub fn encode_display(reading: &Reading) -> String {
    format!(
        "[{} | {:.2} | {:.2} | {:.2} | {:.2}]",
        reading.region(),
        reading.temperature(),
        reading.humidity(),
        reading.pressure(),
        reading.radiation()
    )
}

/// Parse a display-form string back into its fields
pub fn parse_display(text: &str) -> Result<DisplayFields, DecodeError> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| {
            DecodeError::malformed("display form must be wrapped in '[' ']'").with_context(text)
        })?;

    let parts: Vec<&str> = inner.split('|').map(str::trim).collect();
    if parts.len() != 5 {
        return Err(DecodeError::field_count(5, parts.len()).with_context(text));
    }

    let region: Region = parts[0]
        .parse()
        .map_err(|e| DecodeError::from(e).with_context(text))?;

    let number = |field: &'static str, raw: &str| -> Result<f64, DecodeError> {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| DecodeError::numeric(field, raw).with_context(text))
    };

    Ok(DisplayFields {
        region,
        temperature: number("temperature", parts[1])?,
        humidity: number("humidity", parts[2])?,
        pressure: number("pressure", parts[3])?,
        radiation: number("radiation", parts[4])?,
    })
}

// ============================================================================
// Record form
// ============================================================================

/// Wire shape of the bus record
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReadingRecord {
    regiao: String,
    #[serde(serialize_with = "two_decimals")]
    temperatura: f64,
    #[serde(serialize_with = "two_decimals")]
    umidade: f64,
    #[serde(serialize_with = "two_decimals")]
    pressao: f64,
    #[serde(serialize_with = "two_decimals")]
    radiacao: f64,
    timestamp: i64,
}

fn two_decimals<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64((value * 100.0).round() / 100.0)
}

impl From<&Reading> for ReadingRecord {
    fn from(reading: &Reading) -> Self {
        Self {
            regiao: reading.region().to_string(),
            temperatura: reading.temperature(),
            umidade: reading.humidity(),
            pressao: reading.pressure(),
            radiacao: reading.radiation(),
            timestamp: reading.timestamp_millis(),
        }
    }
}

/// Render the machine-readable record of a reading
pub fn encode_record(reading: &Reading) -> Result<String, serde_json::Error> {
    serde_json::to_string(&ReadingRecord::from(reading))
}

/// Rebuild a reading from its record form, keeping the record's timestamp
pub fn decode_record(text: &str) -> Result<Reading, DecodeError> {
    let record: ReadingRecord = serde_json::from_str(text.trim())
        .map_err(|e| DecodeError::malformed(e.to_string()).with_context(text))?;

    let region: Region = record
        .regiao
        .parse()
        .map_err(|e| DecodeError::from(e).with_context(text))?;

    let timestamp = Utc
        .timestamp_millis_opt(record.timestamp)
        .single()
        .ok_or_else(|| {
            DecodeError::numeric("timestamp", record.timestamp.to_string()).with_context(text)
        })?;

    Reading::with_timestamp(
        region,
        record.pressao,
        record.radiacao,
        record.temperatura,
        record.umidade,
        timestamp,
    )
    .map_err(|e| DecodeError::from(e).with_context(text))
}

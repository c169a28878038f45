//! Core data types shared by every gateway component
//!
//! # Key Types
//!
//! - **`Region`**: The closed set of telemetry source zones
//! - **`Reading`**: One decoded, immutable telemetry sample
//! - **`Metric`**: Selector for one numeric field of a reading
//!
//! # Example
//!
//! ```rust
//! use drone_gateway::types::{Metric, Reading, Region};
//!
//! let region: Region = "norte".parse().unwrap();
//! let reading = Reading::new(region, 1013.25, 500.10, 25.30, 60.10).unwrap();
//!
//! assert_eq!(reading.region(), Region::Norte);
//! assert_eq!(Metric::Temperature.value_of(&reading), 25.30);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while building domain values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadingError {
    /// Region identifier outside the closed set
    #[error("Unknown region: '{0}'")]
    UnknownRegion(String),

    /// A numeric field was NaN or infinite
    #[error("Field '{field}' is not finite: {value}")]
    NonFinite {
        /// Field name
        field: &'static str,
        /// Offending value
        value: f64,
    },
}

// ============================================================================
// Region
// ============================================================================

/// Telemetry source zone
///
/// The set is closed: the wire identifiers `norte`, `sul`, `leste` and
/// `oeste` are the only accepted values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    /// North (`norte`)
    Norte,
    /// South (`sul`)
    Sul,
    /// East (`leste`)
    Leste,
    /// West (`oeste`)
    Oeste,
}

impl Region {
    /// Number of regions in the closed set
    pub const COUNT: usize = 4;

    /// All regions in their stable iteration order
    pub const ALL: [Region; Region::COUNT] =
        [Region::Norte, Region::Sul, Region::Leste, Region::Oeste];

    /// Wire identifier used in topics, routing keys and records
    pub const fn as_str(&self) -> &'static str {
        match self {
            Region::Norte => "norte",
            Region::Sul => "sul",
            Region::Leste => "leste",
            Region::Oeste => "oeste",
        }
    }

    /// Dense index in `0..Region::COUNT`, matching `Region::ALL`
    pub const fn index(&self) -> usize {
        match self {
            Region::Norte => 0,
            Region::Sul => 1,
            Region::Leste => 2,
            Region::Oeste => 3,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = ReadingError;

    /// Case-insensitive on the wire identifier, surrounding whitespace ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Region::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ReadingError::UnknownRegion(s.to_string()))
    }
}

// ============================================================================
// Reading
// ============================================================================

/// One canonical telemetry sample
///
/// Immutable once constructed. The timestamp is the capture instant at the
/// gateway (decode time), not a sensor-supplied value.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    region: Region,
    pressure: f64,
    radiation: f64,
    temperature: f64,
    humidity: f64,
    timestamp: DateTime<Utc>,
}

impl Reading {
    /// Create a reading stamped with the current time
    ///
    /// Arguments follow the wire field order: pressure, radiation,
    /// temperature, humidity.
    pub fn new(
        region: Region,
        pressure: f64,
        radiation: f64,
        temperature: f64,
        humidity: f64,
    ) -> Result<Self, ReadingError> {
        Self::with_timestamp(region, pressure, radiation, temperature, humidity, Utc::now())
    }

    /// Create a reading with a known capture time (e.g. rebuilt from a record)
    pub fn with_timestamp(
        region: Region,
        pressure: f64,
        radiation: f64,
        temperature: f64,
        humidity: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ReadingError> {
        for (field, value) in [
            ("pressure", pressure),
            ("radiation", radiation),
            ("temperature", temperature),
            ("humidity", humidity),
        ] {
            if !value.is_finite() {
                return Err(ReadingError::NonFinite { field, value });
            }
        }

        Ok(Self {
            region,
            pressure,
            radiation,
            temperature,
            humidity,
            timestamp,
        })
    }

    /// Source region
    pub fn region(&self) -> Region {
        self.region
    }

    /// Atmospheric pressure
    pub fn pressure(&self) -> f64 {
        self.pressure
    }

    /// Radiation level
    pub fn radiation(&self) -> f64 {
        self.radiation
    }

    /// Temperature
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Relative humidity
    pub fn humidity(&self) -> f64 {
        self.humidity
    }

    /// Capture instant assigned at decode time
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Capture instant in milliseconds since the Unix epoch
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

// ============================================================================
// Metric
// ============================================================================

/// Numeric field selector used by aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Temperature
    Temperature,
    /// Relative humidity
    Humidity,
    /// Atmospheric pressure
    Pressure,
    /// Radiation level
    Radiation,
}

impl Metric {
    /// Number of metrics
    pub const COUNT: usize = 4;

    /// Metrics in dashboard order
    pub const ALL: [Metric; Metric::COUNT] = [
        Metric::Temperature,
        Metric::Humidity,
        Metric::Pressure,
        Metric::Radiation,
    ];

    /// Extract this metric's value from a reading
    pub fn value_of(&self, reading: &Reading) -> f64 {
        match self {
            Metric::Temperature => reading.temperature(),
            Metric::Humidity => reading.humidity(),
            Metric::Pressure => reading.pressure(),
            Metric::Radiation => reading.radiation(),
        }
    }

    /// Display label
    pub const fn label(&self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
            Metric::Pressure => "pressure",
            Metric::Radiation => "radiation",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_parse_is_case_insensitive() {
        assert_eq!("norte".parse::<Region>().unwrap(), Region::Norte);
        assert_eq!("SUL".parse::<Region>().unwrap(), Region::Sul);
        assert_eq!(" Leste ".parse::<Region>().unwrap(), Region::Leste);
        assert_eq!("oeste".parse::<Region>().unwrap(), Region::Oeste);
    }

    #[test]
    fn test_region_rejects_outside_closed_set() {
        for bad in ["north", "centro", "", "nort"] {
            let err = bad.parse::<Region>().unwrap_err();
            assert!(matches!(err, ReadingError::UnknownRegion(_)), "{bad}");
        }
    }

    #[test]
    fn test_region_index_matches_all_order() {
        for (i, region) in Region::ALL.iter().enumerate() {
            assert_eq!(region.index(), i);
        }
    }

    #[test]
    fn test_reading_rejects_non_finite() {
        let err = Reading::new(Region::Sul, 1000.0, f64::NAN, 20.0, 50.0).unwrap_err();
        assert!(matches!(
            err,
            ReadingError::NonFinite {
                field: "radiation",
                ..
            }
        ));

        assert!(Reading::new(Region::Sul, f64::INFINITY, 1.0, 20.0, 50.0).is_err());
    }

    #[test]
    fn test_metric_value_of() {
        let reading = Reading::new(Region::Oeste, 1.0, 2.0, 3.0, 4.0).unwrap();
        assert_eq!(Metric::Pressure.value_of(&reading), 1.0);
        assert_eq!(Metric::Radiation.value_of(&reading), 2.0);
        assert_eq!(Metric::Temperature.value_of(&reading), 3.0);
        assert_eq!(Metric::Humidity.value_of(&reading), 4.0);
    }
}

//! Shared types, error enum, and the canonical telemetry reading.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors produced by simdata-core and the telemetry sources.
#[derive(Debug, Error)]
pub enum SimDataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("invalid offset: {0:?}")]
    InvalidOffset(String),
    #[error("unknown encoding tag: {0:?}")]
    UnknownEncoding(String),
    #[error("vendor interface error: {0}")]
    Vendor(String),
}

pub type Result<T> = std::result::Result<T, SimDataError>;

/// Current wall-clock time as fractional epoch seconds.
pub fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Source tag
// ---------------------------------------------------------------------------

/// Provenance of the values currently held in a [`Reading`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Nothing has been polled yet.
    #[default]
    Idle,
    SimConnect,
    Fsuipc,
    Mock,
    /// Last cycle produced no reading; numeric fields are stale.
    Unavailable,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Idle => "idle",
            Source::SimConnect => "simconnect",
            Source::Fsuipc => "fsuipc",
            Source::Mock => "mock",
            Source::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Canonical fields
// ---------------------------------------------------------------------------

/// The nine canonical telemetry fields, in publication order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    AltitudeFt,
    HeadingDeg,
    AirspeedKt,
    VerticalSpeedFpm,
    Latitude,
    Longitude,
    PitchDeg,
    BankDeg,
    FuelTotalGal,
}

impl Field {
    pub const ALL: [Field; 9] = [
        Field::AltitudeFt,
        Field::HeadingDeg,
        Field::AirspeedKt,
        Field::VerticalSpeedFpm,
        Field::Latitude,
        Field::Longitude,
        Field::PitchDeg,
        Field::BankDeg,
        Field::FuelTotalGal,
    ];

    /// JSON key used on the wire and in the offsets file.
    pub fn key(&self) -> &'static str {
        match self {
            Field::AltitudeFt => "altitude_ft",
            Field::HeadingDeg => "heading_deg",
            Field::AirspeedKt => "airspeed_kt",
            Field::VerticalSpeedFpm => "vertical_speed_fpm",
            Field::Latitude => "latitude",
            Field::Longitude => "longitude",
            Field::PitchDeg => "pitch_deg",
            Field::BankDeg => "bank_deg",
            Field::FuelTotalGal => "fuel_total_gal",
        }
    }

    pub fn from_key(key: &str) -> Option<Field> {
        Field::ALL.iter().copied().find(|f| f.key() == key)
    }
}

/// A decoded value that is not one of the canonical numeric fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v),
            FieldValue::Text(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Normalized, vendor-independent telemetry record.
///
/// Every canonical field is always present. `extras` carries values from
/// user-added offset entries and is flattened after the canonical keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub altitude_ft: f64,
    pub heading_deg: f64,
    pub airspeed_kt: f64,
    pub vertical_speed_fpm: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub pitch_deg: f64,
    pub bank_deg: f64,
    pub fuel_total_gal: f64,
    pub last_update: f64,
    pub source: Source,
    #[serde(flatten, default)]
    pub extras: BTreeMap<String, FieldValue>,
}

impl Default for Reading {
    fn default() -> Self {
        Reading::idle()
    }
}

impl Reading {
    /// The startup reading: all zeros, tagged `idle`, stamped now.
    pub fn idle() -> Self {
        Reading::zeroed(Source::Idle)
    }

    /// All-zero reading with the given provenance and a fresh stamp.
    pub fn zeroed(source: Source) -> Self {
        Reading {
            altitude_ft: 0.0,
            heading_deg: 0.0,
            airspeed_kt: 0.0,
            vertical_speed_fpm: 0.0,
            latitude: 0.0,
            longitude: 0.0,
            pitch_deg: 0.0,
            bank_deg: 0.0,
            fuel_total_gal: 0.0,
            last_update: now(),
            source,
            extras: BTreeMap::new(),
        }
    }

    pub fn get(&self, field: Field) -> f64 {
        match field {
            Field::AltitudeFt => self.altitude_ft,
            Field::HeadingDeg => self.heading_deg,
            Field::AirspeedKt => self.airspeed_kt,
            Field::VerticalSpeedFpm => self.vertical_speed_fpm,
            Field::Latitude => self.latitude,
            Field::Longitude => self.longitude,
            Field::PitchDeg => self.pitch_deg,
            Field::BankDeg => self.bank_deg,
            Field::FuelTotalGal => self.fuel_total_gal,
        }
    }

    pub fn set(&mut self, field: Field, value: f64) {
        let slot = match field {
            Field::AltitudeFt => &mut self.altitude_ft,
            Field::HeadingDeg => &mut self.heading_deg,
            Field::AirspeedKt => &mut self.airspeed_kt,
            Field::VerticalSpeedFpm => &mut self.vertical_speed_fpm,
            Field::Latitude => &mut self.latitude,
            Field::Longitude => &mut self.longitude,
            Field::PitchDeg => &mut self.pitch_deg,
            Field::BankDeg => &mut self.bank_deg,
            Field::FuelTotalGal => &mut self.fuel_total_gal,
        };
        *slot = value;
    }

    /// Overwrite only the fields present in `patch`. Does not touch the stamp.
    pub fn apply(&mut self, patch: &ReadingPatch) {
        for (field, value) in &patch.fields {
            self.set(*field, *value);
        }
        for (key, value) in &patch.extras {
            self.extras.insert(key.clone(), value.clone());
        }
        if let Some(source) = patch.source {
            self.source = source;
        }
    }
}

/// Field-level update for [`Reading::apply`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingPatch {
    pub fields: BTreeMap<Field, f64>,
    pub extras: BTreeMap<String, FieldValue>,
    pub source: Option<Source>,
}

impl ReadingPatch {
    pub fn source_only(source: Source) -> Self {
        ReadingPatch {
            source: Some(source),
            ..Default::default()
        }
    }

    /// Patch carrying every field of `reading`, including its source tag.
    pub fn full(reading: &Reading) -> Self {
        ReadingPatch {
            fields: Field::ALL.iter().map(|f| (*f, reading.get(*f))).collect(),
            extras: reading.extras.clone(),
            source: Some(reading.source),
        }
    }

    pub fn with(mut self, field: Field, value: f64) -> Self {
        self.fields.insert(field, value);
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! FSUIPC field catalog: offsets, raw encodings, and the linear transform.
//!
//! The catalog lives in `fsuipc_offsets.json` next to the executable's
//! working directory. If the file is missing the compiled-in default table
//! is written out; a corrupt file falls back to the defaults in memory and
//! individual bad entries are skipped.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{Field, FieldValue, Reading, Result, SimDataError, Source};

/// Default catalog file name.
pub const DEFAULT_OFFSETS_FILE: &str = "fsuipc_offsets.json";

// ---------------------------------------------------------------------------
// Encodings and raw values
// ---------------------------------------------------------------------------

/// Raw storage type of one offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    U8,
    I8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F64,
    /// Fixed-size, NUL-padded text.
    Text(usize),
}

impl Encoding {
    /// Parse a single-char tag (`b c h H d u l L f`).
    pub fn from_tag(tag: &str) -> Result<Encoding> {
        Ok(match tag {
            "b" => Encoding::U8,
            "c" => Encoding::I8,
            "h" => Encoding::I16,
            "H" => Encoding::U16,
            "d" => Encoding::I32,
            "u" => Encoding::U32,
            "l" => Encoding::I64,
            "L" => Encoding::U64,
            "f" => Encoding::F64,
            other => return Err(SimDataError::UnknownEncoding(other.to_string())),
        })
    }

    pub fn tag(&self) -> TypeTag {
        let code = match self {
            Encoding::U8 => "b",
            Encoding::I8 => "c",
            Encoding::I16 => "h",
            Encoding::U16 => "H",
            Encoding::I32 => "d",
            Encoding::U32 => "u",
            Encoding::I64 => "l",
            Encoding::U64 => "L",
            Encoding::F64 => "f",
            Encoding::Text(len) => return TypeTag::Length(*len),
        };
        TypeTag::Code(code.to_string())
    }

    /// Byte width of the raw value.
    pub fn size(&self) -> usize {
        match self {
            Encoding::U8 | Encoding::I8 => 1,
            Encoding::I16 | Encoding::U16 => 2,
            Encoding::I32 | Encoding::U32 => 4,
            Encoding::I64 | Encoding::U64 | Encoding::F64 => 8,
            Encoding::Text(len) => *len,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Encoding::Text(_))
    }

    /// Decode little-endian bytes. Returns `None` if `bytes` is too short.
    pub fn decode(&self, bytes: &[u8]) -> Option<RawValue> {
        let b = bytes.get(..self.size())?;
        Some(match self {
            Encoding::U8 => RawValue::UInt(b[0] as u64),
            Encoding::I8 => RawValue::Int(b[0] as i8 as i64),
            Encoding::I16 => RawValue::Int(i16::from_le_bytes([b[0], b[1]]) as i64),
            Encoding::U16 => RawValue::UInt(u16::from_le_bytes([b[0], b[1]]) as u64),
            Encoding::I32 => RawValue::Int(i32::from_le_bytes(b.try_into().ok()?) as i64),
            Encoding::U32 => RawValue::UInt(u32::from_le_bytes(b.try_into().ok()?) as u64),
            Encoding::I64 => RawValue::Int(i64::from_le_bytes(b.try_into().ok()?)),
            Encoding::U64 => RawValue::UInt(u64::from_le_bytes(b.try_into().ok()?)),
            Encoding::F64 => RawValue::Float(f64::from_le_bytes(b.try_into().ok()?)),
            Encoding::Text(_) => RawValue::Text(decode_text(b)),
        })
    }
}

/// NUL-terminated text; invalid UTF-8 is replaced, not rejected.
fn decode_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&c| c == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end])
        .trim_end_matches('\0')
        .to_string()
}

/// Value as read from the simulator, before scaling.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

impl RawValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawValue::Int(v) => Some(*v as f64),
            RawValue::UInt(v) => Some(*v as f64),
            RawValue::Float(v) => Some(*v),
            RawValue::Text(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Field specification
// ---------------------------------------------------------------------------

/// Decode recipe for one raw telemetry value.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub offset: u32,
    pub encoding: Encoding,
    pub scale: f64,
    pub offset_add: f64,
    pub divisor: Option<f64>,
}

impl FieldSpec {
    fn numeric(field: Field, offset: u32, encoding: Encoding, scale: f64) -> Self {
        FieldSpec {
            name: field.key().to_string(),
            offset,
            encoding,
            scale,
            offset_add: 0.0,
            divisor: None,
        }
    }

    /// Canonical field this spec feeds, if any.
    pub fn field(&self) -> Option<Field> {
        Field::from_key(&self.name)
    }

    /// `raw / divisor * scale + offset_add`; text bypasses the transform.
    pub fn apply(&self, raw: &RawValue) -> FieldValue {
        let value = match raw {
            RawValue::Text(s) => return FieldValue::Text(s.clone()),
            other => other.as_f64().unwrap_or(0.0),
        };
        FieldValue::Number(self.transform(value))
    }

    pub fn transform(&self, raw: f64) -> f64 {
        let mut value = raw;
        if let Some(d) = self.effective_divisor() {
            value /= d;
        }
        value * self.scale + self.offset_add
    }

    /// Inverse of [`FieldSpec::transform`].
    pub fn invert(&self, value: f64) -> f64 {
        let mut raw = (value - self.offset_add) / self.scale;
        if let Some(d) = self.effective_divisor() {
            raw *= d;
        }
        raw
    }

    fn effective_divisor(&self) -> Option<f64> {
        self.divisor.filter(|d| *d != 0.0)
    }
}

/// Parse `"0x0570"`, `"0X0570"` or bare `"0570"`.
pub fn parse_offset(text: &str) -> Result<u32> {
    let t = text.trim();
    let digits = t
        .strip_prefix("0x")
        .or_else(|| t.strip_prefix("0X"))
        .unwrap_or(t);
    u32::from_str_radix(digits, 16).map_err(|_| SimDataError::InvalidOffset(text.to_string()))
}

pub fn format_offset(offset: u32) -> String {
    format!("0x{offset:04X}")
}

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

/// `type` in the offsets file: a one-char tag, or the byte length of a text field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeTag {
    Code(String),
    Length(usize),
}

fn default_tag() -> TypeTag {
    TypeTag::Code("d".into())
}

fn default_scale() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OffsetEntry {
    offset: String,
    #[serde(rename = "type", default = "default_tag")]
    kind: TypeTag,
    #[serde(default = "default_scale")]
    scale: f64,
    #[serde(default)]
    offset_add: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    divisor: Option<f64>,
}

/// Payload keys written alongside the fields; an entry may not shadow them.
const RESERVED_KEYS: [&str; 2] = ["source", "last_update"];

impl OffsetEntry {
    fn into_spec(self, name: &str) -> Result<FieldSpec> {
        if RESERVED_KEYS.contains(&name) {
            return Err(SimDataError::Config(format!("{name} is a reserved key")));
        }
        let offset = parse_offset(&self.offset)?;
        let encoding = match self.kind {
            TypeTag::Code(code) => Encoding::from_tag(&code)?,
            TypeTag::Length(0) => return Err(SimDataError::UnknownEncoding("0".into())),
            TypeTag::Length(len) => Encoding::Text(len),
        };
        if encoding.is_text() && Field::from_key(name).is_some() {
            return Err(SimDataError::Config(format!(
                "{name} is numeric and cannot use a text encoding"
            )));
        }
        Ok(FieldSpec {
            name: name.to_string(),
            offset,
            encoding,
            scale: self.scale,
            offset_add: self.offset_add,
            divisor: self.divisor,
        })
    }

    fn from_spec(spec: &FieldSpec) -> Self {
        OffsetEntry {
            offset: format_offset(spec.offset),
            kind: spec.encoding.tag(),
            scale: spec.scale,
            offset_add: spec.offset_add,
            divisor: spec.divisor,
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Ordered set of field specifications read in one FSUIPC batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    specs: Vec<FieldSpec>,
}

impl Default for Catalog {
    fn default() -> Self {
        Catalog::defaults()
    }
}

impl Catalog {
    pub fn new(specs: Vec<FieldSpec>) -> Self {
        Catalog { specs }
    }

    /// Compiled-in table of the nine canonical offsets.
    pub fn defaults() -> Self {
        Catalog::new(vec![
            FieldSpec::numeric(Field::AltitudeFt, 0x0570, Encoding::I64, 1.0 / 65536.0),
            FieldSpec::numeric(Field::HeadingDeg, 0x0580, Encoding::U32, 360.0 / 65536.0),
            FieldSpec::numeric(Field::AirspeedKt, 0x02BC, Encoding::U16, 1.0 / 128.0),
            FieldSpec::numeric(Field::VerticalSpeedFpm, 0x02C8, Encoding::I32, 1.0 / 256.0),
            FieldSpec::numeric(Field::Latitude, 0x0560, Encoding::I64, 90.0 / 2147483648.0),
            FieldSpec::numeric(Field::Longitude, 0x0568, Encoding::I64, 360.0 / 4294967296.0),
            FieldSpec::numeric(Field::PitchDeg, 0x0578, Encoding::I32, 360.0 / 65536.0),
            FieldSpec::numeric(Field::BankDeg, 0x057C, Encoding::I32, 360.0 / 65536.0),
            FieldSpec::numeric(Field::FuelTotalGal, 0x0B7C, Encoding::U32, 1.0),
        ])
    }

    pub fn specs(&self) -> &[FieldSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// `(offset, encoding)` pairs in catalog order.
    pub fn requests(&self) -> Vec<(u32, Encoding)> {
        self.specs.iter().map(|s| (s.offset, s.encoding)).collect()
    }

    /// Parse the offsets file. A document that is not a JSON object is an
    /// error; bad entries inside it are skipped with a warning.
    pub fn from_json(text: &str) -> Result<Catalog> {
        let doc: Value = serde_json::from_str(text)?;
        let Value::Object(entries) = doc else {
            return Err(SimDataError::Config("offsets file is not a JSON object".into()));
        };

        let mut specs = Vec::with_capacity(entries.len());
        for (name, raw) in entries {
            let parsed = serde_json::from_value::<OffsetEntry>(raw)
                .map_err(SimDataError::from)
                .and_then(|entry| entry.into_spec(&name));
            match parsed {
                Ok(spec) => specs.push(spec),
                Err(e) => tracing::warn!(field = %name, error = %e, "Skipping offset entry"),
            }
        }
        Ok(Catalog::new(specs))
    }

    pub fn to_json(&self) -> String {
        let mut map = Map::new();
        for spec in &self.specs {
            let entry = OffsetEntry::from_spec(spec);
            if let Ok(v) = serde_json::to_value(entry) {
                map.insert(spec.name.clone(), v);
            }
        }
        serde_json::to_string_pretty(&Value::Object(map)).unwrap_or_else(|_| "{}".into())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json() + "\n")?;
        Ok(())
    }

    /// Load the catalog, writing the default table first if the file is absent.
    pub fn load_or_init(path: &Path) -> Catalog {
        if !path.exists() {
            let defaults = Catalog::defaults();
            match defaults.save(path) {
                Ok(()) => tracing::info!(path = %path.display(), "Wrote default offsets file"),
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Could not write default offsets file"
                ),
            }
            return defaults;
        }

        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Using default offsets");
                return Catalog::defaults();
            }
        };

        match Catalog::from_json(&text) {
            Ok(catalog) => {
                tracing::debug!(path = %path.display(), fields = catalog.len(), "Loaded offsets");
                catalog
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Corrupt offsets file, using defaults");
                Catalog::defaults()
            }
        }
    }

    /// Build a full reading from one batch of raw values in catalog order.
    ///
    /// Returns `None` if the batch does not line up with the catalog or a
    /// numeric value comes out NaN or infinite.
    pub fn decode(&self, values: &[RawValue], source: Source) -> Option<Reading> {
        if values.len() != self.specs.len() {
            return None;
        }
        let mut reading = Reading::zeroed(source);
        for (spec, raw) in self.specs.iter().zip(values) {
            let value = spec.apply(raw);
            if value.as_f64().is_some_and(|v| !v.is_finite()) {
                return None;
            }
            match (spec.field(), value) {
                (Some(field), FieldValue::Number(v)) => reading.set(field, v),
                (Some(_), FieldValue::Text(_)) => return None,
                (None, v) => {
                    reading.extras.insert(spec.name.clone(), v);
                }
            }
        }
        Some(reading)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

// src/telemetry/decoder.rs
//
// Wristband frame decoder.
//
// Wire format: one JSON object per line with six numeric fields
//   {"Pressure": 1013.2, "HeartRate": 72, "Oxygen": 98,
//    "Acceleration X": 0.01, "Acceleration Y": -0.02, "Acceleration Z": 0.98}
// Keys are case-sensitive. Extra keys are ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const KEY_PRESSURE: &str = "Pressure";
pub const KEY_HEART_RATE: &str = "HeartRate";
pub const KEY_OXYGEN: &str = "Oxygen";
pub const KEY_ACCEL_X: &str = "Acceleration X";
pub const KEY_ACCEL_Y: &str = "Acceleration Y";
pub const KEY_ACCEL_Z: &str = "Acceleration Z";

/// One decoded telemetry sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub pressure: f64,
    pub heart_rate: f64,
    #[serde(rename = "spO2")]
    pub spo2: f64,
    pub accel_x: f64,
    pub accel_y: f64,
    pub accel_z: f64,
}

/// Why a frame was discarded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// Not a JSON object
    #[error("parse failure: {0}")]
    Parse(String),

    #[error("validation failure: missing field '{0}'")]
    MissingField(&'static str),

    #[error("validation failure: field '{0}' is not a number")]
    NotNumeric(&'static str),
}

impl DecodeError {
    pub fn is_parse_failure(&self) -> bool {
        matches!(self, DecodeError::Parse(_))
    }
}

/// Decode one raw line into a `Reading`.
///
/// Invalid UTF-8 is replaced rather than rejected, so only JSON and field
/// problems can fail a frame.
pub fn decode_frame(raw: &[u8]) -> Result<Reading, DecodeError> {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();

    let value: Value = serde_json::from_str(text).map_err(|e| DecodeError::Parse(e.to_string()))?;
    let object = match value {
        Value::Object(map) => map,
        other => {
            return Err(DecodeError::Parse(format!(
                "expected an object, found {}",
                json_kind(&other)
            )))
        }
    };

    // Presence is checked for every key before types, so a frame missing a
    // field reports the missing field even if another one is malformed
    for key in [KEY_PRESSURE, KEY_HEART_RATE, KEY_OXYGEN, KEY_ACCEL_X, KEY_ACCEL_Y, KEY_ACCEL_Z] {
        if !object.contains_key(key) {
            return Err(DecodeError::MissingField(key));
        }
    }

    Ok(Reading {
        pressure: number(&object, KEY_PRESSURE)?,
        heart_rate: number(&object, KEY_HEART_RATE)?,
        spo2: number(&object, KEY_OXYGEN)?,
        accel_x: number(&object, KEY_ACCEL_X)?,
        accel_y: number(&object, KEY_ACCEL_Y)?,
        accel_z: number(&object, KEY_ACCEL_Z)?,
    })
}

fn number(object: &Map<String, Value>, key: &'static str) -> Result<f64, DecodeError> {
    object
        .get(key)
        .and_then(Value::as_f64)
        .ok_or(DecodeError::NotNumeric(key))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

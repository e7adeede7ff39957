use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::models::NewCycleRecord;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("payload element must be a JSON object")]
    NotAnObject,
    #[error("missing required field: machine_id")]
    MissingMachineId,
    #[error("{field} must be an integer")]
    ExpectedInteger { field: &'static str },
    #[error("{field} must be a string")]
    ExpectedString { field: &'static str },
    #[error("{field}[{index}] must be a number")]
    ExpectedNumber { field: &'static str, index: usize },
    #[error("{field} value {seconds} is outside the supported timestamp range")]
    TimestampOutOfRange { field: &'static str, seconds: i64 },
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", describe(.errors))]
pub struct PayloadError {
    pub errors: Vec<FieldError>,
}

fn describe(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Records accepted from one request body, plus the array indexes that were rejected.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PayloadBatch {
    pub records: Vec<NewCycleRecord>,
    pub rejected: Vec<(usize, PayloadError)>,
}

impl PayloadBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.rejected.is_empty()
    }
}

pub fn map_payload(payload: &Value, owner_id: i64) -> PayloadBatch {
    let mut batch = PayloadBatch::default();

    let elements: Vec<&Value> = match payload {
        Value::Null => return batch,
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    for (index, element) in elements.into_iter().enumerate() {
        match map_record(element, owner_id) {
            Ok(record) => batch.records.push(record),
            Err(error) => batch.rejected.push((index, error)),
        }
    }

    batch
}

pub fn map_record(payload: &Value, owner_id: i64) -> Result<NewCycleRecord, PayloadError> {
    let object = payload.as_object().ok_or_else(|| PayloadError {
        errors: vec![FieldError::NotAnObject],
    })?;

    let mut errors = Vec::new();

    let machine_id = read_integer(object, "machine_id", &mut errors);
    if machine_id.is_none() && field(object, "machine_id").is_none() {
        errors.push(FieldError::MissingMachineId);
    }

    let cycle_id = read_integer(object, "cycle_id", &mut errors);
    let cycle_start = read_timestamp(object, "cycle_start", &mut errors);
    let cycle_end = read_timestamp(object, "cycle_end", &mut errors);
    let pay_load = read_integer(object, "pay_load", &mut errors);
    let material_type = read_string(object, "material_type", &mut errors);
    let dumping_spot = read_coordinates(object, "dumping_spot", &mut errors);

    match machine_id {
        Some(machine_id) if errors.is_empty() => Ok(NewCycleRecord {
            owner_id,
            machine_id,
            cycle_id,
            cycle_start,
            cycle_end,
            pay_load,
            material_type,
            dumping_spot,
        }),
        _ => Err(PayloadError { errors }),
    }
}

// JSON null counts as absent.
fn field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object.get(key).filter(|value| !value.is_null())
}

fn read_integer(
    object: &Map<String, Value>,
    key: &'static str,
    errors: &mut Vec<FieldError>,
) -> Option<i64> {
    let value = field(object, key)?;
    match value.as_i64() {
        Some(number) => Some(number),
        None => {
            errors.push(FieldError::ExpectedInteger { field: key });
            None
        }
    }
}

fn read_timestamp(
    object: &Map<String, Value>,
    key: &'static str,
    errors: &mut Vec<FieldError>,
) -> Option<DateTime<Utc>> {
    let seconds = read_integer(object, key, errors)?;
    match DateTime::<Utc>::from_timestamp(seconds, 0) {
        Some(timestamp) => Some(timestamp),
        None => {
            errors.push(FieldError::TimestampOutOfRange {
                field: key,
                seconds,
            });
            None
        }
    }
}

fn read_string(
    object: &Map<String, Value>,
    key: &'static str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    let value = field(object, key)?;
    match value.as_str() {
        Some(text) => Some(text.to_string()),
        None => {
            errors.push(FieldError::ExpectedString { field: key });
            None
        }
    }
}

fn read_coordinates(
    object: &Map<String, Value>,
    key: &'static str,
    errors: &mut Vec<FieldError>,
) -> Vec<f64> {
    let Some(Value::Array(items)) = object.get(key) else {
        return Vec::new();
    };

    let mut coordinates = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match item.as_f64() {
            Some(number) => coordinates.push(number),
            None => errors.push(FieldError::ExpectedNumber { field: key, index }),
        }
    }
    coordinates
}

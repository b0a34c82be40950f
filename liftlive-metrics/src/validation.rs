//! Rep event validation at the JSON boundary
//!
//! A bad rep is excluded from the set and reported; it never aborts the
//! rest of the batch and never lets `NaN` reach the aggregates.

use serde_json::Value;
use thiserror::Error;

use crate::models::RepEvent;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("rep event is not an object")]
    NotAnObject,

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("malformed rep event: {0}")]
    Malformed(String),

    #[error("{field} must be finite, got {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("{field} must be non-negative, got {value}")]
    Negative { field: &'static str, value: f64 },
}

/// Outcome of validating a batch of raw rep events
#[derive(Debug, Default)]
pub struct ParsedReps {
    pub reps: Vec<RepEvent>,
    /// Index into the input batch and the reason it was dropped
    pub rejected: Vec<(usize, ValidationError)>,
}

impl RepEvent {
    /// Check the numeric metrics of an already-typed event.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_metric("tut", self.metrics.tut)?;
        check_metric("speed", self.metrics.speed)?;
        check_metric("vl", self.metrics.vl)?;
        if let Some(depth) = self.metrics.depth_cm {
            check_metric("depthCm", depth)?;
        }
        Ok(())
    }
}

fn check_metric(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFinite { field, value });
    }
    if value < 0.0 {
        return Err(ValidationError::Negative { field, value });
    }
    Ok(())
}

/// Parse and validate one raw rep event.
pub fn parse_rep(value: &Value) -> Result<RepEvent, ValidationError> {
    let object = value.as_object().ok_or(ValidationError::NotAnObject)?;

    let metrics = object
        .get("metrics")
        .and_then(Value::as_object)
        .ok_or(ValidationError::MissingField("metrics"))?;
    for field in ["tut", "speed"] {
        if metrics.get(field).map_or(true, Value::is_null) {
            return Err(ValidationError::MissingField(field));
        }
    }

    let rep: RepEvent = serde_json::from_value(value.clone())
        .map_err(|e| ValidationError::Malformed(e.to_string()))?;
    rep.validate()?;
    Ok(rep)
}

/// Parse a batch, keeping the valid events in order.
pub fn parse_reps(values: &[Value]) -> ParsedReps {
    let mut parsed = ParsedReps::default();

    for (idx, value) in values.iter().enumerate() {
        match parse_rep(value) {
            Ok(rep) => parsed.reps.push(rep),
            Err(e) => {
                tracing::warn!("Rejected rep event #{}: {}", idx, e);
                parsed.rejected.push((idx, e));
            }
        }
    }

    parsed
}

//! Data models shared by the calculator, the gateway and the history store
//!
//! Field names serialize in camelCase to match the browser clients.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn default_valid() -> bool {
    true
}

/// Kinematic metrics derived for one repetition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepMetrics {
    /// Time under tension (seconds)
    pub tut: f64,
    /// Mean concentric bar speed (m/s)
    pub speed: f64,
    /// Velocity loss reported by the sensor path (percent)
    #[serde(default)]
    pub vl: f64,
    /// Whether the rep reached the required depth
    #[serde(default)]
    pub rom_hit: bool,
    /// Measured depth (cm), when the sensor provides it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_cm: Option<f64>,
}

/// One observed repetition. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_valid")]
    pub valid: bool,
    pub metrics: RepMetrics,
    /// Epoch milliseconds
    #[serde(default, alias = "ts")]
    pub timestamp: i64,
}

/// Running snapshot broadcast while a set is active
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetUpdate {
    pub reps_completed: u32,
    pub avg_speed: f64,
    pub vl: f64,
    pub rom_hit_rate: f64,
    pub rir: u32,
    #[serde(alias = "ts")]
    pub timestamp: i64,
}

/// Terminal result of one set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSummary {
    pub reps: u32,
    pub tut: f64,
    pub avg_speed: f64,
    pub vl: f64,
    pub rom_hit_rate: f64,
    pub rom_variability: f64,
}

impl SetSummary {
    /// All-zero summary used for an empty set
    pub fn empty() -> Self {
        Self {
            reps: 0,
            tut: 0.0,
            avg_speed: 0.0,
            vl: 0.0,
            rom_hit_rate: 0.0,
            rom_variability: 0.0,
        }
    }
}

/// `setEnd` payload: summary plus coaching tip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetEnd {
    pub summary: SetSummary,
    pub tip: String,
}

/// Payload of `startSet`. Informational only; unknown keys are preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exercise_id: Option<String>,
    /// Working load (kg)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load: Option<f64>,
    /// `strength`, `hypertrophy` or `technique`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Gateway-global set lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetState {
    Idle,
    Active,
}

impl std::fmt::Display for SetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SetState::Idle => write!(f, "idle"),
            SetState::Active => write!(f, "active"),
        }
    }
}

/// Advisory audio ducking signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MusicAction {
    Duck,
    Restore,
}

/// Phase timings and displacement for one rep, as produced by a motion sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRepSample {
    #[serde(default)]
    pub id: Option<String>,
    pub concentric_s: f64,
    pub eccentric_s: f64,
    /// Concentric bar travel (m)
    pub displacement_m: f64,
    #[serde(default)]
    pub depth_cm: Option<f64>,
    #[serde(default)]
    pub target_depth_cm: Option<f64>,
    pub timestamp: i64,
}

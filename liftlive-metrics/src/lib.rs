//! LiftLive set metrics
//!
//! Pure reduction of repetition events into per-set summaries and coaching
//! tips, plus the ingestion-side validation and the SQLite set history.
//!
//! ## Modules
//!
//! - [`models`]: wire types shared with the gateway (`RepEvent`, `SetUpdate`, `SetEnd`, ...)
//! - [`calculator`]: `summarize`, coaching tips, live snapshots, RIR estimate
//! - [`trend`]: velocity trend and fatigue index over a speed series
//! - [`validation`]: per-rep checks at the JSON boundary
//! - [`history`]: persisted sets and history aggregation

pub mod calculator;
pub mod history;
pub mod models;
pub mod trend;
pub mod validation;

// Re-export main types
pub use calculator::{
    coaching_tip, derive_rep_metrics, estimate_rir, set_update, summarize, TipInputs, NO_REPS_TIP,
};
pub use history::{HistoryAggregate, HistoryQuery, HistoryStore, StoredSet};
pub use models::{
    MusicAction, RawRepSample, RepEvent, RepMetrics, SetContext, SetEnd, SetState,
    SetSummary, SetUpdate,
};
pub use trend::{fatigue_index, velocity_trend, TrendDirection, VelocityTrend};
pub use validation::{parse_rep, parse_reps, ParsedReps, ValidationError};

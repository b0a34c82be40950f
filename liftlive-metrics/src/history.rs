//! SQLite set history
//!
//! Every completed set is stored once, with the context it was started
//! with. The store backs the history screen's aggregation endpoint.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::calculator::round_to;
use crate::models::{SetContext, SetEnd, SetSummary};

/// VL histogram bins: (label, lower bound inclusive, upper bound exclusive)
const VL_BINS: [(&str, f64, f64); 4] = [
    ("0-10", 0.0, 10.0),
    ("10-20", 10.0, 20.0),
    ("20-30", 20.0, 30.0),
    ("30+", 30.0, f64::INFINITY),
];

/// One persisted set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSet {
    pub id: i64,
    pub recorded_at: DateTime<Utc>,
    pub exercise_id: Option<String>,
    pub program_type: Option<String>,
    pub load_kg: Option<f64>,
    pub summary: SetSummary,
    pub tip: String,
}

/// Filter for history queries; all fields optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub exercise_id: Option<String>,
    pub program_type: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VlBin {
    pub range: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedAtLoad {
    pub load: f64,
    pub avg_speed: f64,
    pub sessions: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: String,
    pub value: f64,
}

/// Response of `POST /api/history/aggregate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryAggregate {
    pub vl_distribution: Vec<VlBin>,
    pub speed_at_load: Vec<SpeedAtLoad>,
    /// Daily mean bar speed
    pub trends: Vec<TrendPoint>,
}

/// Thread-safe SQLite store for completed sets
pub struct HistoryStore {
    db_path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl HistoryStore {
    /// Open (or create) the history database at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = liftlive_paths::expand_home(db_path)?;

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let conn = Connection::open(&db_path).context("Failed to open history database")?;

        let store = Self {
            db_path,
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;

        Ok(store)
    }

    /// In-memory store (tests, ephemeral runs)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let store = Self {
            db_path: PathBuf::from(":memory:"),
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("history database lock poisoned"))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recorded_at INTEGER NOT NULL,
                exercise_id TEXT,
                program_type TEXT,
                load_kg REAL,
                reps INTEGER NOT NULL,
                tut REAL NOT NULL,
                avg_speed REAL NOT NULL,
                vl REAL NOT NULL,
                rom_hit_rate REAL NOT NULL,
                rom_variability REAL NOT NULL,
                tip TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sets_recorded_at ON sets(recorded_at)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sets_exercise ON sets(exercise_id)",
            [],
        )?;

        Ok(())
    }

    /// Store one completed set; returns its row id.
    pub fn record_set(
        &self,
        set_end: &SetEnd,
        context: &SetContext,
        recorded_at: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        let summary = &set_end.summary;

        conn.execute(
            "INSERT INTO sets (
                recorded_at, exercise_id, program_type, load_kg,
                reps, tut, avg_speed, vl, rom_hit_rate, rom_variability, tip
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                recorded_at.timestamp_millis(),
                context.exercise_id,
                context.program_type,
                context.load,
                summary.reps,
                summary.tut,
                summary.avg_speed,
                summary.vl,
                summary.rom_hit_rate,
                summary.rom_variability,
                set_end.tip,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Most recent sets, newest first.
    pub fn recent_sets(&self, limit: usize) -> Result<Vec<StoredSet>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM sets ORDER BY recorded_at DESC, id DESC LIMIT ?1",
        )?;

        let sets = stmt
            .query_map(params![limit as i64], Self::row_to_set)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(sets)
    }

    /// Sets matching `query`, oldest first.
    pub fn query_sets(&self, query: &HistoryQuery) -> Result<Vec<StoredSet>> {
        let mut clauses = Vec::new();
        let mut args: Vec<SqlValue> = Vec::new();

        if let Some(exercise_id) = &query.exercise_id {
            args.push(SqlValue::Text(exercise_id.clone()));
            clauses.push(format!("exercise_id = ?{}", args.len()));
        }
        if let Some(program_type) = &query.program_type {
            args.push(SqlValue::Text(program_type.clone()));
            clauses.push(format!("program_type = ?{}", args.len()));
        }
        if let Some(start) = query.start_date {
            args.push(SqlValue::Integer(start.timestamp_millis()));
            clauses.push(format!("recorded_at >= ?{}", args.len()));
        }
        if let Some(end) = query.end_date {
            args.push(SqlValue::Integer(end.timestamp_millis()));
            clauses.push(format!("recorded_at <= ?{}", args.len()));
        }

        let mut sql = String::from("SELECT * FROM sets");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY recorded_at ASC, id ASC");

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let sets = stmt
            .query_map(params_from_iter(args), Self::row_to_set)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(sets)
    }

    /// VL distribution, speed per load and daily speed trend for `query`.
    pub fn aggregate(&self, query: &HistoryQuery) -> Result<HistoryAggregate> {
        let sets = self.query_sets(query)?;
        Ok(aggregate_sets(&sets))
    }

    pub fn set_count(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM sets", [], |row| row.get(0))?;
        Ok(count)
    }

    fn row_to_set(row: &Row) -> rusqlite::Result<StoredSet> {
        let recorded_ms: i64 = row.get("recorded_at")?;

        Ok(StoredSet {
            id: row.get("id")?,
            recorded_at: DateTime::from_timestamp_millis(recorded_ms).unwrap_or_default(),
            exercise_id: row.get("exercise_id")?,
            program_type: row.get("program_type")?,
            load_kg: row.get("load_kg")?,
            summary: SetSummary {
                reps: row.get("reps")?,
                tut: row.get("tut")?,
                avg_speed: row.get("avg_speed")?,
                vl: row.get("vl")?,
                rom_hit_rate: row.get("rom_hit_rate")?,
                rom_variability: row.get("rom_variability")?,
            },
            tip: row.get("tip")?,
        })
    }
}

fn aggregate_sets(sets: &[StoredSet]) -> HistoryAggregate {
    let vl_distribution = VL_BINS
        .iter()
        .map(|(label, low, high)| VlBin {
            range: label.to_string(),
            count: sets
                .iter()
                .filter(|s| s.summary.vl >= *low && s.summary.vl < *high)
                .count() as u32,
        })
        .collect();

    // Loads keyed in tenths of a kg so f64 keys group cleanly
    let mut by_load: BTreeMap<i64, (f64, u32)> = BTreeMap::new();
    for set in sets {
        if let Some(load) = set.load_kg {
            let entry = by_load.entry((load * 10.0).round() as i64).or_insert((0.0, 0));
            entry.0 += set.summary.avg_speed;
            entry.1 += 1;
        }
    }
    let speed_at_load = by_load
        .into_iter()
        .map(|(key, (speed_sum, count))| SpeedAtLoad {
            load: key as f64 / 10.0,
            avg_speed: round_to(speed_sum / count as f64, 2),
            sessions: count,
        })
        .collect();

    let mut by_day: BTreeMap<String, (f64, u32)> = BTreeMap::new();
    for set in sets {
        let day = set.recorded_at.format("%Y-%m-%d").to_string();
        let entry = by_day.entry(day).or_insert((0.0, 0));
        entry.0 += set.summary.avg_speed;
        entry.1 += 1;
    }
    let trends = by_day
        .into_iter()
        .map(|(date, (speed_sum, count))| TrendPoint {
            date,
            value: round_to(speed_sum / count as f64, 2),
        })
        .collect();

    HistoryAggregate {
        vl_distribution,
        speed_at_load,
        trends,
    }
}

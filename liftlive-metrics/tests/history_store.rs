use chrono::{Duration, TimeZone, Utc};
use liftlive_metrics::{summarize, HistoryQuery, HistoryStore, RepEvent, RepMetrics, SetContext};
use tempfile::tempdir;

fn rep(speed: f64, rom_hit: bool) -> RepEvent {
    RepEvent {
        id: format!("rep-{}", speed),
        valid: true,
        metrics: RepMetrics {
            tut: 3.0,
            speed,
            vl: 0.0,
            rom_hit,
            depth_cm: None,
        },
        timestamp: 0,
    }
}

fn context(exercise: &str, load: f64) -> SetContext {
    SetContext {
        exercise_id: Some(exercise.to_string()),
        load: Some(load),
        program_type: Some("strength".to_string()),
        ..Default::default()
    }
}

#[test]
fn test_store_creates_database_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("history.db");

    let store = HistoryStore::new(&path).unwrap();
    assert!(path.exists());
    assert_eq!(store.db_path(), path.as_path());
    assert_eq!(store.set_count().unwrap(), 0);
}

#[test]
fn test_record_and_recent_sets_newest_first() {
    let store = HistoryStore::in_memory().unwrap();
    let day = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();

    let first = summarize(&[rep(0.5, true), rep(0.48, true)]);
    let second = summarize(&[rep(0.5, true), rep(0.3, false)]);

    store.record_set(&first, &context("back-squat", 100.0), day).unwrap();
    store
        .record_set(&second, &context("back-squat", 100.0), day + Duration::minutes(3))
        .unwrap();

    let recent = store.recent_sets(10).unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].summary, second.summary);
    assert_eq!(recent[0].tip, second.tip);
    assert_eq!(recent[1].summary, first.summary);
    assert_eq!(recent[1].exercise_id.as_deref(), Some("back-squat"));
    assert_eq!(recent[1].recorded_at, day);

    assert_eq!(store.recent_sets(1).unwrap().len(), 1);
}

#[test]
fn test_query_filters() {
    let store = HistoryStore::in_memory().unwrap();
    let day = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
    let set = summarize(&[rep(0.5, true)]);

    store.record_set(&set, &context("back-squat", 100.0), day).unwrap();
    store.record_set(&set, &context("bench", 60.0), day).unwrap();
    store
        .record_set(&set, &context("bench", 60.0), day + Duration::days(2))
        .unwrap();

    let bench = HistoryQuery {
        exercise_id: Some("bench".to_string()),
        ..Default::default()
    };
    assert_eq!(store.query_sets(&bench).unwrap().len(), 2);

    let bench_first_day = HistoryQuery {
        end_date: Some(day + Duration::hours(1)),
        ..bench
    };
    assert_eq!(store.query_sets(&bench_first_day).unwrap().len(), 1);

    let hypertrophy = HistoryQuery {
        program_type: Some("hypertrophy".to_string()),
        ..Default::default()
    };
    assert!(store.query_sets(&hypertrophy).unwrap().is_empty());
}

#[test]
fn test_aggregate() {
    let store = HistoryStore::in_memory().unwrap();
    let day = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();

    // vl 4%, avg 0.49
    let steady = summarize(&[rep(0.5, true), rep(0.48, true)]);
    // vl 40%, avg 0.4
    let grinding = summarize(&[rep(0.5, true), rep(0.4, true), rep(0.3, false)]);

    store.record_set(&steady, &context("back-squat", 100.0), day).unwrap();
    store.record_set(&grinding, &context("back-squat", 90.0), day).unwrap();
    store
        .record_set(&steady, &context("back-squat", 110.0), day + Duration::days(1))
        .unwrap();

    let agg = store.aggregate(&HistoryQuery::default()).unwrap();

    let counts: Vec<(String, u32)> = agg
        .vl_distribution
        .iter()
        .map(|b| (b.range.clone(), b.count))
        .collect();
    assert_eq!(
        counts,
        vec![
            ("0-10".to_string(), 2),
            ("10-20".to_string(), 0),
            ("20-30".to_string(), 0),
            ("30+".to_string(), 1),
        ]
    );

    let loads: Vec<f64> = agg.speed_at_load.iter().map(|s| s.load).collect();
    assert_eq!(loads, vec![90.0, 100.0, 110.0]);
    assert_eq!(agg.speed_at_load[0].avg_speed, 0.4);
    assert_eq!(agg.speed_at_load[1].avg_speed, 0.49);
    assert_eq!(agg.speed_at_load[1].sessions, 1);

    assert_eq!(agg.trends.len(), 2);
    assert_eq!(agg.trends[0].date, "2025-03-01");
    assert_eq!(agg.trends[1].date, "2025-03-02");
    assert_eq!(agg.trends[1].value, 0.49);
}

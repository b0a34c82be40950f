//! Set metrics calculator
//!
//! Deterministic reduction of a finite list of [`RepEvent`]s into a
//! [`SetSummary`] plus a coaching tip. Nothing here touches a clock, a
//! socket or the database.

use crate::models::{RawRepSample, RepEvent, RepMetrics, SetEnd, SetSummary, SetUpdate};

/// Tip returned for a set with no reps
pub const NO_REPS_TIP: &str = "No reps recorded.";

/// Velocity loss under which a set counts as highly consistent
const LOW_VL_PERCENT: f64 = 10.0;

/// Velocity loss above which form breakdown is likely
const HIGH_VL_PERCENT: f64 = 30.0;

/// ROM hit rate under which depth consistency needs work
const LOW_ROM_HIT_PERCENT: f64 = 80.0;

const SLOW_BAR_SPEED: f64 = 0.3;
const FAST_BAR_SPEED: f64 = 0.6;

/// Placeholder ROM variability band (cm) used without depth telemetry
const PLACEHOLDER_ROM_VARIABILITY_MIN: f64 = 1.0;
const PLACEHOLDER_ROM_VARIABILITY_SPAN: f64 = 3.0;

/// Inputs the tip cascade looks at (unrounded values)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TipInputs {
    pub reps: u32,
    pub vl: f64,
    pub rom_hit_rate: f64,
    pub avg_speed: f64,
}

/// Reduce one set's reps into its summary and tip.
///
/// `reps` is in chronological order. An empty list is not an error: it
/// yields an all-zero summary and [`NO_REPS_TIP`].
pub fn summarize(reps: &[RepEvent]) -> SetEnd {
    let Some(first) = reps.first() else {
        return SetEnd {
            summary: SetSummary::empty(),
            tip: NO_REPS_TIP.to_string(),
        };
    };

    let count = reps.len() as u32;
    let tut: f64 = reps.iter().map(|r| r.metrics.tut).sum();
    let avg_speed = mean_speed(reps);
    let vl = velocity_loss(first.metrics.speed, min_speed(reps));
    let rom_hit_rate = rom_hit_rate(reps);
    let rom_variability = rom_variability(reps);

    let tip = coaching_tip(&TipInputs {
        reps: count,
        vl,
        rom_hit_rate,
        avg_speed,
    });

    SetEnd {
        summary: SetSummary {
            reps: count,
            tut,
            avg_speed: round_to(avg_speed, 2),
            vl: round_to(vl, 1),
            rom_hit_rate: round_to(rom_hit_rate, 1),
            rom_variability: round_to(rom_variability, 1),
        },
        tip,
    }
}

/// Pick a coaching tip. First matching rule wins.
pub fn coaching_tip(inputs: &TipInputs) -> String {
    let TipInputs {
        reps,
        vl,
        rom_hit_rate,
        avg_speed,
    } = *inputs;

    if vl < LOW_VL_PERCENT {
        return format!(
            "Excellent speed consistency. You likely had {} more reps in the tank. Consider adding load.",
            half_reps_ceil(reps)
        );
    }
    if vl > HIGH_VL_PERCENT {
        return "High velocity loss detected. Great work pushing hard, but watch for form breakdown on future sets."
            .to_string();
    }

    if rom_hit_rate < LOW_ROM_HIT_PERCENT {
        return format!(
            "ROM hit rate was {}%. Focus on depth consistency next set. Quality over quantity.",
            rom_hit_rate.round()
        );
    }
    if rom_hit_rate == 100.0 {
        return "Perfect ROM consistency! Your movement quality is excellent. Keep this up."
            .to_string();
    }

    if avg_speed < SLOW_BAR_SPEED {
        return "Bar speed is slowing down. Consider reducing load or increasing rest between sets."
            .to_string();
    }
    if avg_speed > FAST_BAR_SPEED {
        return "Fast bar speed indicates room for load progression. Add 2.5-5% next session."
            .to_string();
    }

    format!(
        "Solid set! VL at {}% with {}% ROM hits. Stay consistent.",
        vl.round(),
        rom_hit_rate.round()
    )
}

/// Running snapshot of an in-progress set
pub fn set_update(reps: &[RepEvent], timestamp: i64) -> SetUpdate {
    let Some(first) = reps.first() else {
        return SetUpdate {
            reps_completed: 0,
            avg_speed: 0.0,
            vl: 0.0,
            rom_hit_rate: 0.0,
            rir: 0,
            timestamp,
        };
    };

    let count = reps.len() as u32;
    let vl = velocity_loss(first.metrics.speed, min_speed(reps));

    SetUpdate {
        reps_completed: count,
        avg_speed: round_to(mean_speed(reps), 2),
        vl: round_to(vl, 1),
        rom_hit_rate: round_to(rom_hit_rate(reps), 1),
        rir: estimate_rir(count, vl),
        timestamp,
    }
}

/// Reps-in-reserve estimate from velocity loss.
///
/// Below 10% VL this matches the tip's "more reps in the tank" figure; at
/// 30% VL and above the set is treated as taken to failure. In between the
/// estimate shrinks linearly.
pub fn estimate_rir(reps: u32, vl: f64) -> u32 {
    if vl < LOW_VL_PERCENT {
        return half_reps_ceil(reps);
    }
    if vl >= HIGH_VL_PERCENT {
        return 0;
    }
    let remaining = (HIGH_VL_PERCENT - vl) / (HIGH_VL_PERCENT - LOW_VL_PERCENT);
    (reps as f64 * 0.5 * remaining).ceil() as u32
}

/// Build a [`RepEvent`] from one sensor-segmented rep.
///
/// `first_speed` is the first rep's speed in the current set, used for the
/// per-rep velocity loss.
pub fn derive_rep_metrics(sample: &RawRepSample, first_speed: Option<f64>) -> RepEvent {
    let speed = if sample.concentric_s > 0.0 {
        sample.displacement_m / sample.concentric_s
    } else {
        0.0
    };

    let vl = match first_speed {
        Some(first) if first > 0.0 => ((first - speed) / first * 100.0).max(0.0),
        _ => 0.0,
    };

    let rom_hit = match (sample.depth_cm, sample.target_depth_cm) {
        (Some(depth), Some(target)) => depth >= target,
        _ => true,
    };

    RepEvent {
        id: sample
            .id
            .clone()
            .unwrap_or_else(|| format!("rep-{}", sample.timestamp)),
        valid: sample.concentric_s > 0.0 && sample.displacement_m > 0.0,
        metrics: RepMetrics {
            tut: sample.concentric_s + sample.eccentric_s,
            speed,
            vl,
            rom_hit,
            depth_cm: sample.depth_cm,
        },
        timestamp: sample.timestamp,
    }
}

/// Velocity loss from the first rep to the slowest rep (percent).
///
/// A first rep with zero speed yields 0. That guards the division; it is
/// not a claim that the set had no fatigue.
pub(crate) fn velocity_loss(first_speed: f64, min_speed: f64) -> f64 {
    if first_speed > 0.0 {
        (first_speed - min_speed) / first_speed * 100.0
    } else {
        0.0
    }
}

fn mean_speed(reps: &[RepEvent]) -> f64 {
    reps.iter().map(|r| r.metrics.speed).sum::<f64>() / reps.len() as f64
}

fn min_speed(reps: &[RepEvent]) -> f64 {
    reps.iter()
        .map(|r| r.metrics.speed)
        .fold(f64::INFINITY, f64::min)
}

fn rom_hit_rate(reps: &[RepEvent]) -> f64 {
    let hits = reps.iter().filter(|r| r.metrics.rom_hit).count();
    hits as f64 / reps.len() as f64 * 100.0
}

/// ROM dispersion.
///
/// With depth on every rep this is the coefficient of variation of depth
/// (percent). Without it there is no real signal and a placeholder in the
/// 1-4 band is returned, derived from the reps so the result stays
/// repeatable.
fn rom_variability(reps: &[RepEvent]) -> f64 {
    let depths: Option<Vec<f64>> = reps.iter().map(|r| r.metrics.depth_cm).collect();

    match depths {
        Some(depths) if depths.len() >= 2 => {
            let mean = statistical::mean(&depths);
            if mean > 0.0 {
                statistical::population_standard_deviation(&depths, Some(mean)) / mean * 100.0
            } else {
                0.0
            }
        }
        Some(_) => 0.0,
        None => placeholder_rom_variability(reps),
    }
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

// TODO: drop once every ingestion path reports depth_cm
/// FNV-1a over rep ids and speed bits, so the value is stable across
/// builds and toolchains.
fn placeholder_rom_variability(reps: &[RepEvent]) -> f64 {
    let mut hash = FNV_OFFSET_BASIS;
    let mut mix = |bytes: &[u8]| {
        for byte in bytes {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    };
    for rep in reps {
        mix(rep.id.as_bytes());
        mix(rep.metrics.speed.to_bits().to_le_bytes().as_slice());
    }
    let unit = (hash % 1000) as f64 / 1000.0;
    PLACEHOLDER_ROM_VARIABILITY_MIN + unit * PLACEHOLDER_ROM_VARIABILITY_SPAN
}

fn half_reps_ceil(reps: u32) -> u32 {
    (reps as f64 * 0.5).ceil() as u32
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rep(id: &str, speed: f64, tut: f64, rom_hit: bool) -> RepEvent {
        RepEvent {
            id: id.to_string(),
            valid: true,
            metrics: RepMetrics {
                tut,
                speed,
                vl: 0.0,
                rom_hit,
                depth_cm: None,
            },
            timestamp: 0,
        }
    }

    #[test]
    fn test_empty_set() {
        let result = summarize(&[]);
        assert_eq!(result.summary, SetSummary::empty());
        assert_eq!(result.tip, "No reps recorded.");
    }

    #[test]
    fn test_three_rep_set_with_high_velocity_loss() {
        let reps = vec![
            rep("r1", 0.5, 3.0, true),
            rep("r2", 0.4, 3.0, true),
            rep("r3", 0.3, 3.0, false),
        ];
        let result = summarize(&reps);

        assert_eq!(result.summary.reps, 3);
        assert_eq!(result.summary.tut, 9.0);
        assert_eq!(result.summary.avg_speed, 0.4);
        assert_eq!(result.summary.vl, 40.0);
        assert_eq!(result.summary.rom_hit_rate, 66.7);
        assert!(result.tip.starts_with("High velocity loss detected"));
    }

    #[test]
    fn test_summarize_is_repeatable() {
        let reps = vec![rep("a", 0.62, 2.8, true), rep("b", 0.55, 3.1, true)];
        assert_eq!(summarize(&reps), summarize(&reps));
    }

    #[test]
    fn test_zero_first_speed_gives_zero_vl() {
        let reps = vec![rep("a", 0.0, 3.0, true), rep("b", 0.5, 3.0, true)];
        assert_eq!(summarize(&reps).summary.vl, 0.0);
    }

    #[test]
    fn test_vl_is_relative_to_first_rep() {
        // Slowest rep is last; a faster middle rep must not move the baseline.
        let reps = vec![
            rep("a", 0.4, 3.0, true),
            rep("b", 0.8, 3.0, true),
            rep("c", 0.3, 3.0, true),
        ];
        assert_eq!(summarize(&reps).summary.vl, 25.0);
    }

    #[test]
    fn test_rom_hit_rate_bounds() {
        let all_hit = vec![rep("a", 0.5, 3.0, true), rep("b", 0.49, 3.0, true)];
        assert_eq!(summarize(&all_hit).summary.rom_hit_rate, 100.0);

        let none_hit = vec![rep("a", 0.5, 3.0, false), rep("b", 0.49, 3.0, false)];
        assert_eq!(summarize(&none_hit).summary.rom_hit_rate, 0.0);

        let one_miss = vec![rep("a", 0.5, 3.0, true), rep("b", 0.49, 3.0, false)];
        let rate = summarize(&one_miss).summary.rom_hit_rate;
        assert!(rate > 0.0 && rate < 100.0);
    }

    #[test]
    fn test_tip_cascade_prefers_low_vl() {
        let tip = coaching_tip(&TipInputs {
            reps: 5,
            vl: 5.0,
            rom_hit_rate: 90.0,
            avg_speed: 0.45,
        });
        assert_eq!(
            tip,
            "Excellent speed consistency. You likely had 3 more reps in the tank. Consider adding load."
        );
    }

    #[test]
    fn test_tip_rules_in_order() {
        let base = TipInputs {
            reps: 6,
            vl: 20.0,
            rom_hit_rate: 90.0,
            avg_speed: 0.45,
        };

        let low_rom = coaching_tip(&TipInputs {
            rom_hit_rate: 66.7,
            ..base
        });
        assert_eq!(
            low_rom,
            "ROM hit rate was 67%. Focus on depth consistency next set. Quality over quantity."
        );

        let perfect = coaching_tip(&TipInputs {
            rom_hit_rate: 100.0,
            avg_speed: 0.1,
            ..base
        });
        assert!(perfect.starts_with("Perfect ROM consistency!"));

        let slow = coaching_tip(&TipInputs {
            avg_speed: 0.25,
            ..base
        });
        assert!(slow.starts_with("Bar speed is slowing down."));

        let fast = coaching_tip(&TipInputs {
            avg_speed: 0.7,
            ..base
        });
        assert!(fast.contains("Add 2.5-5% next session."));

        let solid = coaching_tip(&base);
        assert_eq!(solid, "Solid set! VL at 20% with 90% ROM hits. Stay consistent.");
    }

    #[test]
    fn test_rom_variability_uses_depth_when_present() {
        let mut a = rep("a", 0.5, 3.0, true);
        let mut b = rep("b", 0.45, 3.0, true);
        a.metrics.depth_cm = Some(40.0);
        b.metrics.depth_cm = Some(40.0);
        assert_eq!(summarize(&[a.clone(), b.clone()]).summary.rom_variability, 0.0);

        a.metrics.depth_cm = Some(36.0);
        b.metrics.depth_cm = Some(44.0);
        // std-dev 4 over mean 40
        assert_eq!(summarize(&[a, b]).summary.rom_variability, 10.0);
    }

    #[test]
    fn test_placeholder_rom_variability_band() {
        let reps = vec![rep("a", 0.5, 3.0, true), rep("b", 0.45, 3.0, true)];
        let value = summarize(&reps).summary.rom_variability;
        assert!((1.0..=4.0).contains(&value), "got {}", value);
        // Fixed mix, independent of the std hasher
        assert_eq!(value, 3.5);
    }

    #[test]
    fn test_tip_percentages_round_half_up() {
        let speeds = [0.5, 0.48, 0.46, 0.45, 0.44, 0.42, 0.41, 0.4];
        let reps: Vec<RepEvent> = speeds
            .iter()
            .enumerate()
            .map(|(i, speed)| rep(&format!("r{}", i), *speed, 3.0, i < 5))
            .collect();

        let result = summarize(&reps);
        assert_eq!(result.summary.rom_hit_rate, 62.5);
        assert_eq!(
            result.tip,
            "ROM hit rate was 63%. Focus on depth consistency next set. Quality over quantity."
        );

        let solid = coaching_tip(&TipInputs {
            reps: 8,
            vl: 12.5,
            rom_hit_rate: 87.5,
            avg_speed: 0.45,
        });
        assert_eq!(solid, "Solid set! VL at 13% with 88% ROM hits. Stay consistent.");
    }

    #[test]
    fn test_set_update_snapshot() {
        let reps = vec![rep("a", 0.5, 3.0, true), rep("b", 0.48, 3.0, true)];
        let update = set_update(&reps, 42);
        assert_eq!(update.reps_completed, 2);
        assert_eq!(update.avg_speed, 0.49);
        assert_eq!(update.vl, 4.0);
        assert_eq!(update.rom_hit_rate, 100.0);
        assert_eq!(update.rir, 1);
        assert_eq!(update.timestamp, 42);

        assert_eq!(set_update(&[], 7).reps_completed, 0);
    }

    #[test]
    fn test_estimate_rir() {
        assert_eq!(estimate_rir(8, 5.0), 4);
        assert_eq!(estimate_rir(8, 20.0), 2);
        assert_eq!(estimate_rir(8, 30.0), 0);
        assert_eq!(estimate_rir(8, 45.0), 0);
        assert_eq!(estimate_rir(0, 0.0), 0);
    }

    #[test]
    fn test_derive_rep_metrics() {
        let sample = RawRepSample {
            id: None,
            concentric_s: 1.0,
            eccentric_s: 2.0,
            displacement_m: 0.5,
            depth_cm: Some(38.0),
            target_depth_cm: Some(40.0),
            timestamp: 1000,
        };
        let rep = derive_rep_metrics(&sample, Some(0.625));

        assert_eq!(rep.id, "rep-1000");
        assert!(rep.valid);
        assert_eq!(rep.metrics.tut, 3.0);
        assert_eq!(rep.metrics.speed, 0.5);
        assert!((rep.metrics.vl - 20.0).abs() < 1e-9);
        assert!(!rep.metrics.rom_hit);
    }

    #[test]
    fn test_derive_rep_metrics_without_concentric_phase() {
        let sample = RawRepSample {
            id: Some("x".into()),
            concentric_s: 0.0,
            eccentric_s: 1.5,
            displacement_m: 0.4,
            depth_cm: None,
            target_depth_cm: None,
            timestamp: 5,
        };
        let rep = derive_rep_metrics(&sample, None);
        assert!(!rep.valid);
        assert_eq!(rep.metrics.speed, 0.0);
        assert!(rep.metrics.rom_hit);
    }
}

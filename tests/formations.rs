//! Integration tests for YACFD chart formation detection.
//!
//! Each scenario builds a synthetic bar sequence, runs the engine end to end
//! and checks the confirmed pattern, its breakout and its projected target.

use yacfd::prelude::*;

/// Test bar with explicit volume and timestamp
#[derive(Debug, Clone, Copy)]
struct TestBar {
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

impl OHLCV for TestBar {
    fn open(&self) -> f64 {
        self.o
    }

    fn high(&self) -> f64 {
        self.h
    }

    fn low(&self) -> f64 {
        self.l
    }

    fn close(&self) -> f64 {
        self.c
    }

    fn volume(&self) -> f64 {
        self.v
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.t)
    }
}

const HOUR_MS: i64 = 3_600_000;

fn bar(i: usize, low: f64, high: f64, close: f64) -> TestBar {
    TestBar {
        t: i as i64 * HOUR_MS,
        o: close,
        h: high,
        l: low,
        c: close,
        v: 1000.0,
    }
}

/// Piecewise-linear lows through `pivots`, highs `spread` above, closes halfway
fn bars_from_pivots(len: usize, pivots: &[(usize, f64)], spread: f64) -> Vec<TestBar> {
    let mut lows = vec![pivots[0].1; len];
    for w in pivots.windows(2) {
        let ((i0, v0), (i1, v1)) = (w[0], w[1]);
        for (k, v) in lows.iter_mut().enumerate().take(i1 + 1).skip(i0) {
            *v = v0 + (v1 - v0) * (k - i0) as f64 / (i1 - i0) as f64;
        }
    }
    lows.iter()
        .enumerate()
        .map(|(i, &l)| bar(i, l, l + spread, l + spread / 2.0))
        .collect()
}

fn engine_for(kind: FormationKind) -> FormationEngine {
    EngineBuilder::new()
        .with_all_defaults()
        .only_formations([kind])
        .build()
        .unwrap()
}

// ============================================================
// DOUBLE BOTTOM
// ============================================================

/// Bottoms at 5 and 25 (low 100), neckline high 115 at 15, breakout bar 27
fn double_bottom_bars() -> Vec<TestBar> {
    (0..40)
        .map(|i| {
            let low = match i {
                0..=5 => 110.0 - 2.0 * i as f64,
                6..=15 => 100.0 + (i - 5) as f64,
                16..=25 => 110.0 - (i - 15) as f64,
                _ => 100.0 + 3.0 * (i - 25) as f64,
            };
            let mut b = bar(i, low, low + 3.0, low + 1.5);
            if i == 15 {
                b.h = 115.0;
            }
            if i == 27 {
                b.o = 107.0;
                b.l = 106.0;
                b.c = 117.0;
                b.h = 118.0;
                b.v = 3000.0;
            }
            b
        })
        .collect()
}

#[test]
fn test_double_bottom_end_to_end() {
    let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
    let bars = double_bottom_bars();
    let report = engine.scan(&bars).unwrap();

    assert_eq!(report.bars_analyzed, 40);
    let confirmed: Vec<_> = report.confirmed().collect();
    assert_eq!(confirmed.len(), 1);

    let pattern = confirmed[0];
    assert_eq!(pattern.kind, FormationKind::DoubleBottom);
    assert_eq!(pattern.direction, Direction::Bullish);
    assert_eq!(pattern.pattern.start_index, 5);
    assert_eq!(pattern.pattern.end_index, 25);
    assert_eq!(pattern.breakout.index, 27);
    assert_eq!(pattern.breakout.timestamp, Some(27 * HOUR_MS));
    assert_eq!(pattern.breakout.close_price, 117.0);
    assert!((pattern.projection.pattern_height - 15.0).abs() < 1e-9);
    assert!((pattern.projection.target_price.unwrap() - 130.0).abs() < 1e-9);
    assert!(pattern.volume_confirmed);
    assert_eq!(pattern.candles_ago, 12);

    let db = report.formation(FormationKind::DoubleBottom).unwrap();
    assert_eq!(db.local_lows_found, 2);
    assert_eq!(db.potential_count, 1);
    assert_eq!(db.rejected_count, 0);

    // Needs 50 bars
    let ihs = report.formation(FormationKind::InverseHeadAndShoulders).unwrap();
    assert!(ihs.insufficient_data);
}

#[test]
fn test_double_bottom_without_volume_is_still_confirmed() {
    let mut bars = double_bottom_bars();
    bars[27].v = 1200.0;
    let report = engine_for(FormationKind::DoubleBottom).scan(&bars).unwrap();
    assert_eq!(report.confirmed().count(), 1);
    assert_eq!(report.volume_confirmed().count(), 0);
}

#[test]
fn test_double_bottom_without_breakout_is_rejected() {
    let mut bars = double_bottom_bars();
    for b in bars.iter_mut().skip(26) {
        b.c = b.c.min(114.0);
        b.h = b.h.min(114.5);
        b.l = b.l.min(113.0);
    }
    let report = engine_for(FormationKind::DoubleBottom).scan(&bars).unwrap();
    assert_eq!(report.potential_count(), 1);
    assert_eq!(report.rejected_count(), 1);
    assert_eq!(report.confirmed().count(), 0);
}

// ============================================================
// TRIANGLES
// ============================================================

#[test]
fn test_ascending_triangle_breakout() {
    let mut bars = bars_from_pivots(
        70,
        &[(0, 100.0), (10, 109.0), (20, 95.0), (30, 109.0), (40, 100.0), (50, 109.0), (60, 104.0), (69, 106.0)],
        1.0,
    );
    bars[56].c = 111.0;
    bars[56].h = 112.0;
    bars[56].v = 3000.0;

    let report = engine_for(FormationKind::AscendingTriangle).scan(&bars).unwrap();
    let confirmed: Vec<_> = report.confirmed().collect();
    assert_eq!(confirmed.len(), 1);

    let pattern = confirmed[0];
    assert_eq!(pattern.pattern.start_index, 10);
    assert_eq!(pattern.pattern.end_index, 50);
    assert_eq!(pattern.breakout.index, 56);
    assert!((pattern.breakout.boundary_value - 110.0).abs() < 1e-9);
    assert!(pattern.volume_confirmed);
    // Resistance 110 minus support at the first support low (95)
    assert!((pattern.projection.pattern_height - 15.0).abs() < 1e-9);
    assert!((pattern.projection.target_price.unwrap() - 125.0).abs() < 1e-9);
}

#[test]
fn test_descending_triangle_breakdown() {
    let mut bars = bars_from_pivots(
        70,
        &[(0, 95.0), (10, 90.0), (20, 104.0), (30, 90.0), (40, 99.0), (50, 90.0), (60, 94.0), (69, 92.0)],
        1.0,
    );
    bars[56].l = 87.5;
    bars[56].c = 88.0;
    bars[56].v = 2000.0;

    let report = engine_for(FormationKind::DescendingTriangle).scan(&bars).unwrap();
    let confirmed: Vec<_> = report.confirmed().collect();
    assert_eq!(confirmed.len(), 1);

    let pattern = confirmed[0];
    assert_eq!(pattern.direction, Direction::Bearish);
    assert_eq!(pattern.breakout.index, 56);
    assert!(pattern.volume_confirmed);
    // Resistance at bar 10 is 107.5, support 90
    assert!((pattern.projection.pattern_height - 17.5).abs() < 1e-9);
    assert!((pattern.projection.target_price.unwrap() - 72.5).abs() < 1e-9);
}

#[test]
fn test_triangle_lines_converge() {
    let bars = bars_from_pivots(
        70,
        &[(0, 100.0), (10, 109.0), (20, 95.0), (30, 109.0), (40, 100.0), (50, 109.0), (60, 104.0), (69, 106.0)],
        1.0,
    );
    let engine = engine_for(FormationKind::AscendingTriangle);
    for candidate in engine.candidates(&bars) {
        if let Geometry::AscendingTriangle { resistance_level, support_line, .. } = candidate.geometry {
            let start_gap = resistance_level - support_line.value_at(candidate.start_index);
            let end_gap = resistance_level - support_line.value_at(candidate.end_index);
            assert!(start_gap > 0.0);
            assert!(end_gap < start_gap);
        }
    }
}

#[test]
fn test_descending_triangle_lines_converge() {
    let bars = bars_from_pivots(
        70,
        &[(0, 95.0), (10, 90.0), (20, 104.0), (30, 90.0), (40, 99.0), (50, 90.0), (60, 94.0), (69, 92.0)],
        1.0,
    );
    let candidates = engine_for(FormationKind::DescendingTriangle).candidates(&bars);
    assert!(!candidates.is_empty());
    for candidate in candidates {
        match candidate.geometry {
            Geometry::DescendingTriangle { support_level, resistance_line, .. } => {
                let start_gap = resistance_line.value_at(candidate.start_index) - support_level;
                let end_gap = resistance_line.value_at(candidate.end_index) - support_level;
                assert!(start_gap > 0.0);
                assert!(end_gap < start_gap);
            }
            other => panic!("unexpected geometry {:?}", other),
        }
    }
}

// ============================================================
// FALLING WEDGE
// ============================================================

#[test]
fn test_falling_wedge_breakout() {
    // Highs on 130 - 0.5x, lows on 110 - 0.2x, then a slow drift up
    let bars = bars_from_pivots(
        70,
        &[(0, 115.0), (10, 124.0), (17, 106.6), (24, 117.0), (31, 103.8), (38, 110.0), (45, 101.0), (69, 102.2)],
        1.0,
    );
    let report = engine_for(FormationKind::FallingWedge).scan(&bars).unwrap();
    let confirmed: Vec<_> = report.confirmed().collect();
    // One candidate per window ending 59..=66, each breaking out on the next bar
    assert_eq!(confirmed.len(), 8);
    assert!(confirmed.iter().all(|p| p.breakout.index == p.pattern.end_index + 1));

    let pattern = confirmed[0];
    assert_eq!(pattern.pattern.end_index, 59);
    assert_eq!(pattern.breakout.index, 60);
    // Resistance at 60 is 100
    assert!((pattern.breakout.boundary_value - 100.0).abs() < 1e-6);
    assert!(!pattern.volume_confirmed);
    // 121.5 - 106.6 at the first support low
    assert!((pattern.projection.pattern_height - 14.9).abs() < 1e-6);
    assert!((pattern.projection.target_price.unwrap() - 114.9).abs() < 1e-6);
}

#[test]
fn test_late_wedge_breakout_confirmed_by_later_window() {
    let mut bars = bars_from_pivots(
        90,
        &[(0, 115.0), (10, 124.0), (17, 106.6), (24, 117.0), (31, 103.8), (38, 110.0), (45, 101.0), (89, 103.2)],
        1.0,
    );
    // Closes hold under resistance (130 - 0.5x) until bar 78
    for (i, b) in bars.iter_mut().enumerate().take(78).skip(60) {
        b.c = 129.0 - 0.5 * i as f64;
    }
    bars[78].c = 95.0;
    bars[78].v = 2000.0;

    let report = engine_for(FormationKind::FallingWedge).scan(&bars).unwrap();
    let wedge = report.formation(FormationKind::FallingWedge).unwrap();
    assert_eq!(wedge.potential_count, 8);
    // Windows ending 59..=62 stop scanning before bar 78
    assert_eq!(wedge.rejected_count, 4);

    let ends: Vec<usize> = wedge.confirmed.iter().map(|p| p.pattern.end_index).collect();
    assert_eq!(ends, vec![63, 64, 65, 66]);
    for pattern in &wedge.confirmed {
        assert_eq!(pattern.breakout.index, 78);
        assert!((pattern.breakout.boundary_value - 91.0).abs() < 1e-6);
        assert!(pattern.volume_confirmed);
        assert!((pattern.projection.target_price.unwrap() - 105.9).abs() < 1e-6);
    }
}

// ============================================================
// INVERSE HEAD & SHOULDERS
// ============================================================

#[test]
fn test_inverse_head_and_shoulders_breakout() {
    let mut bars = bars_from_pivots(
        60,
        &[(0, 110.0), (10, 95.0), (18, 108.0), (26, 85.0), (34, 108.0), (42, 96.0), (59, 104.0)],
        2.0,
    );
    bars[50].c = 111.0;
    bars[50].h = 112.0;
    bars[50].v = 3000.0;

    let report = engine_for(FormationKind::InverseHeadAndShoulders).scan(&bars).unwrap();
    let confirmed: Vec<_> = report.confirmed().collect();
    assert_eq!(confirmed.len(), 1);

    let pattern = confirmed[0];
    assert_eq!(pattern.pattern.start_index, 10);
    assert_eq!(pattern.pattern.end_index, 42);
    assert_eq!(pattern.breakout.index, 50);
    assert!(pattern.volume_confirmed);
    // Neckline 110 minus head 85
    assert!((pattern.projection.pattern_height - 25.0).abs() < 1e-9);
    assert!((pattern.projection.target_price.unwrap() - 135.0).abs() < 1e-9);
}

// ============================================================
// EDGE CASES
// ============================================================

#[test]
fn test_flat_series_has_no_potential_patterns() {
    let bars: Vec<TestBar> = (0..200).map(|i| bar(i, 100.0, 100.0, 100.0)).collect();
    let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
    let report = engine.scan(&bars).unwrap();
    assert_eq!(report.potential_count(), 0);
    assert_eq!(report.confirmed().count(), 0);
    assert!(report.formations.iter().all(|f| !f.insufficient_data));
}

#[test]
fn test_empty_input_is_not_an_error() {
    let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
    let report = engine.scan::<TestBar>(&[]).unwrap();
    assert_eq!(report.bars_analyzed, 0);
    assert_eq!(report.confirmed().count(), 0);
}

#[test]
fn test_fresh_breakouts_only() {
    let bars = double_bottom_bars();

    let fresh = |max| {
        EngineBuilder::new()
            .add(BuiltinMatcher::DoubleBottom(DoubleBottomDetector::with_defaults()))
            .fresh_breakouts(max)
            .build()
            .unwrap()
    };

    // Breakout at 27 is 12 bars before the last bar
    let report = fresh(12).scan(&bars).unwrap();
    assert_eq!(report.confirmed().count(), 0);
    assert_eq!(report.rejected_count(), 1);

    let report = fresh(13).scan(&bars).unwrap();
    let confirmed: Vec<_> = report.confirmed().collect();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].candles_ago, 12);
}

// ============================================================
// SERIALIZATION & CONFIG
// ============================================================

#[test]
fn test_report_serializes_to_json() {
    let engine = engine_for(FormationKind::DoubleBottom);
    let report = engine.scan(&double_bottom_bars()).unwrap();
    let json = serde_json::to_value(&report).unwrap();

    let formation = &json["formations"][0];
    assert_eq!(formation["kind"], "DOUBLE_BOTTOM");
    assert_eq!(formation["potential_count"], 1);
    let confirmed = &formation["confirmed"][0];
    assert_eq!(confirmed["breakout"]["index"], 27);
    assert_eq!(confirmed["pattern"]["geometry"]["type"], "DoubleBottom");
    assert_eq!(confirmed["projection"]["target_price"], 130.0);
}

#[test]
fn test_matcher_config_from_json() {
    let json = serde_json::to_string(&BuiltinMatcher::DoubleBottom(DoubleBottomDetector::default())).unwrap();
    let matcher: BuiltinMatcher = serde_json::from_str(&json).unwrap();
    assert_eq!(matcher.kind(), FormationKind::DoubleBottom);

    let invalid = json.replace("\"trough_tolerance\":0.03", "\"trough_tolerance\":1.5");
    assert_ne!(invalid, json);
    assert!(serde_json::from_str::<BuiltinMatcher>(&invalid).is_err());

    let engine = EngineBuilder::from_matchers([matcher]).build().unwrap();
    assert_eq!(engine.scan(&double_bottom_bars()).unwrap().confirmed().count(), 1);
}

#[test]
fn test_with_params_builds_engine() {
    use std::collections::HashMap;

    let mut params = HashMap::new();
    params.insert("min_peak_rise", 0.2);
    let detector = DoubleBottomDetector::with_params(&params).unwrap();
    let engine = EngineBuilder::new().add(BuiltinMatcher::DoubleBottom(detector)).build().unwrap();

    // 15% rally no longer qualifies
    let report = engine.scan(&double_bottom_bars()).unwrap();
    assert_eq!(report.potential_count(), 0);
}

// ============================================================
// PARALLEL
// ============================================================

#[test]
fn test_scan_parallel_many_instruments() {
    let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
    let db = double_bottom_bars();
    let flat: Vec<TestBar> = (0..100).map(|i| bar(i, 99.0, 101.0, 100.0)).collect();

    let instruments: Vec<(&str, &[TestBar])> =
        vec![("BTCUSDT", &db), ("ETHUSDT", &flat), ("SOLUSDT", &db[..20])];
    let (results, errors) = scan_parallel(&engine, instruments);

    assert!(errors.is_empty());
    assert_eq!(results.len(), 3);
    let confirmed: usize = results.iter().map(|r| r.report.confirmed().count()).sum();
    assert_eq!(confirmed, 1);
}

#[test]
fn test_scan_parallel_reports_invalid_data() {
    let engine = EngineBuilder::new().with_all_defaults().validate_data(true).build().unwrap();
    let good = double_bottom_bars();
    let mut bad = double_bottom_bars();
    bad[3].c = f64::NAN;

    let instruments: Vec<(&str, &[TestBar])> = vec![("GOOD", &good), ("BAD", &bad)];
    let (results, errors) = scan_parallel(&engine, instruments);
    assert_eq!(results.len(), 1);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].symbol, "BAD");
    assert!(matches!(errors[0].error, PatternError::InvalidOHLCV { index: 3, .. }));
}

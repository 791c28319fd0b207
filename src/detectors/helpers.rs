//! Geometric predicates shared by the formation matchers

use crate::{extrema::ExtremumPoint, trend::TrendLine, PotentialPattern};

// ============================================================
// THRESHOLDS
// ============================================================

/// Relative slope difference under which two candidates ending on the same
/// bar are the same formation
pub const SLOPE_DUPLICATE_TOLERANCE: f64 = 1e-6;

// ============================================================
// PRICE COMPARISONS
// ============================================================

/// `|a - b| / |reference|`, `None` when the reference is zero or not finite
#[inline]
pub fn relative_diff(a: f64, b: f64, reference: f64) -> Option<f64> {
    if reference == 0.0 || !reference.is_finite() {
        return None;
    }
    Some((a - b).abs() / reference.abs())
}

#[inline]
pub fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Points within `tolerance` (relative) of the first point, in order.
///
/// Empty when the first value is zero.
pub fn group_near_first(points: &[ExtremumPoint], tolerance: f64) -> Vec<ExtremumPoint> {
    let Some(first) = points.first() else {
        return Vec::new();
    };
    points
        .iter()
        .filter(|p| relative_diff(p.value, first.value, first.value).is_some_and(|d| d <= tolerance))
        .copied()
        .collect()
}

/// Each value above the previous one, allowing a relative slack of
/// `tolerance`; indices must strictly increase.
pub fn is_rising(points: &[ExtremumPoint], tolerance: f64) -> bool {
    points.windows(2).all(|w| {
        w[1].index > w[0].index && w[1].value > w[0].value - w[0].value.abs() * tolerance
    })
}

/// Mirror of [`is_rising`]
pub fn is_falling(points: &[ExtremumPoint], tolerance: f64) -> bool {
    points.windows(2).all(|w| {
        w[1].index > w[0].index && w[1].value < w[0].value + w[0].value.abs() * tolerance
    })
}

/// Points whose value lies within `tolerance` (relative) of the line
pub fn count_touches(points: &[ExtremumPoint], line: &TrendLine, tolerance: f64) -> usize {
    points
        .iter()
        .filter(|p| {
            let expected = line.value_at(p.index);
            relative_diff(p.value, expected, expected).is_some_and(|d| d <= tolerance)
        })
        .count()
}

/// Gap between `upper` and `lower` shrinks strictly from `start` to `end`
/// while staying positive at the start.
#[inline]
pub fn gap_narrows(upper_start: f64, lower_start: f64, upper_end: f64, lower_end: f64) -> bool {
    let start_gap = upper_start - lower_start;
    let end_gap = upper_end - lower_end;
    start_gap > 0.0 && end_gap < start_gap
}

// ============================================================
// DEDUPLICATION
// ============================================================

#[inline]
pub fn slopes_match(a: f64, b: f64) -> bool {
    (a - b).abs() <= a.abs().max(b.abs()) * SLOPE_DUPLICATE_TOLERANCE
}

/// Same completion bar; formations with fitted lines must also agree on
/// every slope.
fn is_duplicate(candidate: &PotentialPattern, kept: &PotentialPattern) -> bool {
    if candidate.end_index != kept.end_index {
        return false;
    }
    let lines = candidate.geometry.fitted_lines();
    let kept_lines = kept.geometry.fitted_lines();
    lines.len() == kept_lines.len()
        && lines
            .iter()
            .zip(&kept_lines)
            .all(|(a, b)| slopes_match(a.slope, b.slope))
}

/// Drop duplicates (first found wins) and order by `end_index`.
pub fn finalize_candidates(candidates: Vec<PotentialPattern>) -> Vec<PotentialPattern> {
    let mut kept: Vec<PotentialPattern> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept.iter().any(|k| is_duplicate(&candidate, k)) {
            log::trace!(
                "{} ending at {} dropped as duplicate",
                candidate.kind(),
                candidate.end_index
            );
            continue;
        }
        kept.push(candidate);
    }
    kept.sort_by_key(|c| c.end_index);
    kept
}

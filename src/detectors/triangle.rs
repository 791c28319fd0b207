//! Ascending and descending triangle matchers
//!
//! One side is horizontal: highs (lows) grouped within a tolerance of the
//! first one and averaged. The other side is a least-squares line through the
//! opposing swing points that lie between the first and last grouped point.

use std::collections::HashMap;

use super::helpers::{finalize_candidates, gap_narrows, group_near_first, is_falling, is_rising, mean};
use crate::{
    breakout::BreakoutConfig,
    extrema::{ExtremumKind, ExtremumPoint, PriceSeries},
    params::{
        breakout_from_params, get_count, get_period, get_ratio, get_value, ParamMeta,
        ParameterizedMatcher,
    },
    trend::TrendLine,
    FormationKind, FormationMatcher, Geometry, PatternError, Period, PotentialPattern, Ratio,
    Result,
};

impl_with_defaults!(AscendingTriangleDetector, DescendingTriangleDetector);

/// Points of `candidates` inside `[first, last]` on the required side of `level`
fn between(
    candidates: &[ExtremumPoint],
    first: usize,
    last: usize,
    keep: impl Fn(f64) -> bool,
) -> Vec<ExtremumPoint> {
    candidates
        .iter()
        .filter(|p| p.index >= first && p.index <= last && keep(p.value))
        .copied()
        .collect()
}

fn validate_common(min_flat: usize, min_sloped: usize, breakout: &BreakoutConfig) -> Result<()> {
    if min_flat < 2 || min_sloped < 2 {
        return Err(PatternError::InvalidConfig(format!(
            "triangles need at least 2 points per side, got {}/{}",
            min_flat, min_sloped
        )));
    }
    breakout.validate()
}

// ============================================================
// ASCENDING TRIANGLE
// ============================================================

/// Flat resistance over rising support; confirmed by a close above resistance.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AscendingTriangleDetector {
    pub order: Period,
    /// Highs within this fraction of the first one form the resistance
    pub resistance_tolerance: Ratio,
    pub min_resistance_highs: usize,
    pub min_support_lows: usize,
    /// Fitted support slope must exceed this
    pub min_support_slope: f64,
    /// Slack allowed when checking that support lows keep rising
    pub monotonic_tolerance: Ratio,
    /// Series shorter than this are skipped
    pub min_duration: Period,
    pub breakout: BreakoutConfig,
}

impl Default for AscendingTriangleDetector {
    fn default() -> Self {
        Self {
            order: Period::new_const(5),
            resistance_tolerance: Ratio::new_const(0.01),
            min_resistance_highs: 2,
            min_support_lows: 2,
            min_support_slope: 1e-5,
            monotonic_tolerance: Ratio::new_const(0.0),
            min_duration: Period::new_const(20),
            breakout: BreakoutConfig::default(),
        }
    }
}

impl AscendingTriangleDetector {
    fn candidate_from(&self, group: &[ExtremumPoint], lows: &[ExtremumPoint]) -> Option<PotentialPattern> {
        if group.len() < self.min_resistance_highs {
            return None;
        }
        let level = mean(group.iter().map(|p| p.value))?;
        let first = group.first()?.index;
        let last = group.last()?.index;

        let support = between(lows, first, last, |v| v < level);
        if support.len() < self.min_support_lows || !is_rising(&support, self.monotonic_tolerance.get()) {
            return None;
        }

        let line = TrendLine::through(&support)?;
        if line.slope <= self.min_support_slope {
            return None;
        }

        let start = first.min(support.first()?.index);
        let end = last.max(support.last()?.index);
        if line.value_at(start) >= level || !gap_narrows(level, line.value_at(start), level, line.value_at(end)) {
            return None;
        }

        log::debug!(
            "ascending triangle candidate {}..{}: resistance {:.4} ({} highs), support slope {:.6} ({} lows)",
            start,
            end,
            level,
            group.len(),
            line.slope,
            support.len()
        );

        Some(PotentialPattern {
            start_index: start,
            end_index: end,
            geometry: Geometry::AscendingTriangle {
                resistance_level: level,
                resistance_points: group.to_vec(),
                support_line: line,
                support_points: support,
            },
        })
    }
}

impl FormationMatcher for AscendingTriangleDetector {
    fn kind(&self) -> FormationKind {
        FormationKind::AscendingTriangle
    }

    fn order(&self) -> usize {
        self.order.get()
    }

    fn min_bars(&self) -> usize {
        self.min_duration.get().max(2 * self.order.get() + 1)
    }

    fn breakout(&self) -> &BreakoutConfig {
        &self.breakout
    }

    fn breakout_mut(&mut self) -> &mut BreakoutConfig {
        &mut self.breakout
    }

    fn find_candidates(&self, series: &PriceSeries) -> Vec<PotentialPattern> {
        let highs = series.extrema(self.order.get(), ExtremumKind::High);
        let lows = series.extrema(self.order.get(), ExtremumKind::Low);

        let candidates = (0..highs.len())
            .filter_map(|i| {
                let group = group_near_first(&highs[i..], self.resistance_tolerance.get());
                self.candidate_from(&group, &lows)
            })
            .collect();
        finalize_candidates(candidates)
    }

    fn validate_config(&self) -> Result<()> {
        if !self.min_support_slope.is_finite() {
            return Err(PatternError::InvalidValue("min_support_slope must be finite"));
        }
        validate_common(self.min_resistance_highs, self.min_support_lows, &self.breakout)
    }
}

// ============================================================
// DESCENDING TRIANGLE
// ============================================================

/// Flat support under falling resistance; confirmed by a close below support.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DescendingTriangleDetector {
    pub order: Period,
    /// Lows within this fraction of the first one form the support
    pub support_tolerance: Ratio,
    pub min_support_lows: usize,
    pub min_resistance_highs: usize,
    /// Fitted resistance slope must be below this
    pub max_resistance_slope: f64,
    pub monotonic_tolerance: Ratio,
    pub min_duration: Period,
    pub breakout: BreakoutConfig,
}

impl Default for DescendingTriangleDetector {
    fn default() -> Self {
        Self {
            order: Period::new_const(5),
            support_tolerance: Ratio::new_const(0.01),
            min_support_lows: 2,
            min_resistance_highs: 2,
            max_resistance_slope: -1e-5,
            monotonic_tolerance: Ratio::new_const(0.0),
            min_duration: Period::new_const(20),
            breakout: BreakoutConfig::default().with_volume_multiplier(1.3),
        }
    }
}

impl DescendingTriangleDetector {
    fn candidate_from(&self, group: &[ExtremumPoint], highs: &[ExtremumPoint]) -> Option<PotentialPattern> {
        if group.len() < self.min_support_lows {
            return None;
        }
        let level = mean(group.iter().map(|p| p.value))?;
        let first = group.first()?.index;
        let last = group.last()?.index;

        let resistance = between(highs, first, last, |v| v > level);
        if resistance.len() < self.min_resistance_highs
            || !is_falling(&resistance, self.monotonic_tolerance.get())
        {
            return None;
        }

        let line = TrendLine::through(&resistance)?;
        if line.slope >= self.max_resistance_slope {
            return None;
        }

        let start = first.min(resistance.first()?.index);
        let end = last.max(resistance.last()?.index);
        if line.value_at(start) <= level || !gap_narrows(line.value_at(start), level, line.value_at(end), level) {
            return None;
        }

        log::debug!(
            "descending triangle candidate {}..{}: support {:.4} ({} lows), resistance slope {:.6} ({} highs)",
            start,
            end,
            level,
            group.len(),
            line.slope,
            resistance.len()
        );

        Some(PotentialPattern {
            start_index: start,
            end_index: end,
            geometry: Geometry::DescendingTriangle {
                support_level: level,
                support_points: group.to_vec(),
                resistance_line: line,
                resistance_points: resistance,
            },
        })
    }
}

impl FormationMatcher for DescendingTriangleDetector {
    fn kind(&self) -> FormationKind {
        FormationKind::DescendingTriangle
    }

    fn order(&self) -> usize {
        self.order.get()
    }

    fn min_bars(&self) -> usize {
        self.min_duration.get().max(2 * self.order.get() + 1)
    }

    fn breakout(&self) -> &BreakoutConfig {
        &self.breakout
    }

    fn breakout_mut(&mut self) -> &mut BreakoutConfig {
        &mut self.breakout
    }

    fn find_candidates(&self, series: &PriceSeries) -> Vec<PotentialPattern> {
        let lows = series.extrema(self.order.get(), ExtremumKind::Low);
        let highs = series.extrema(self.order.get(), ExtremumKind::High);

        let candidates = (0..lows.len())
            .filter_map(|i| {
                let group = group_near_first(&lows[i..], self.support_tolerance.get());
                self.candidate_from(&group, &highs)
            })
            .collect();
        finalize_candidates(candidates)
    }

    fn validate_config(&self) -> Result<()> {
        if !self.max_resistance_slope.is_finite() {
            return Err(PatternError::InvalidValue("max_resistance_slope must be finite"));
        }
        validate_common(self.min_support_lows, self.min_resistance_highs, &self.breakout)
    }
}

// ============================================================
// PARAMETER METADATA
// ============================================================

static ASCENDING_TRIANGLE_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("order", 5.0, (3.0, 8.0, 1.0), "Extrema neighbourhood half-width"),
    ParamMeta::ratio("resistance_tolerance", 0.01, (0.005, 0.02, 0.005), "Grouping tolerance for resistance highs"),
    ParamMeta::count("min_resistance_highs", 2.0, (2.0, 4.0, 1.0), "Minimum highs on resistance"),
    ParamMeta::count("min_support_lows", 2.0, (2.0, 4.0, 1.0), "Minimum lows on support"),
    ParamMeta::value("min_support_slope", 1e-5, (0.0, 1e-3, 1e-4), "Support slope must exceed this"),
    ParamMeta::ratio("monotonic_tolerance", 0.0, (0.0, 0.005, 0.001), "Slack for rising support lows"),
    ParamMeta::period("min_duration", 20.0, (10.0, 40.0, 5.0), "Minimum bars in the series"),
];

static DESCENDING_TRIANGLE_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("order", 5.0, (3.0, 8.0, 1.0), "Extrema neighbourhood half-width"),
    ParamMeta::ratio("support_tolerance", 0.01, (0.005, 0.02, 0.005), "Grouping tolerance for support lows"),
    ParamMeta::count("min_support_lows", 2.0, (2.0, 4.0, 1.0), "Minimum lows on support"),
    ParamMeta::count("min_resistance_highs", 2.0, (2.0, 4.0, 1.0), "Minimum highs on resistance"),
    ParamMeta::value("max_resistance_slope", -1e-5, (-1e-3, 0.0, 1e-4), "Resistance slope must be below this"),
    ParamMeta::ratio("monotonic_tolerance", 0.0, (0.0, 0.005, 0.001), "Slack for falling resistance highs"),
    ParamMeta::period("min_duration", 20.0, (10.0, 40.0, 5.0), "Minimum bars in the series"),
];

impl ParameterizedMatcher for AscendingTriangleDetector {
    fn param_meta() -> &'static [ParamMeta] {
        ASCENDING_TRIANGLE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            order: get_period(params, "order", d.order.get())?,
            resistance_tolerance: get_ratio(params, "resistance_tolerance", d.resistance_tolerance.get())?,
            min_resistance_highs: get_count(params, "min_resistance_highs", d.min_resistance_highs)?,
            min_support_lows: get_count(params, "min_support_lows", d.min_support_lows)?,
            min_support_slope: get_value(params, "min_support_slope", d.min_support_slope)?,
            monotonic_tolerance: get_ratio(params, "monotonic_tolerance", d.monotonic_tolerance.get())?,
            min_duration: get_period(params, "min_duration", d.min_duration.get())?,
            breakout: breakout_from_params(params, &d.breakout)?,
        })
    }

    fn formation_id_str() -> &'static str {
        FormationKind::AscendingTriangle.as_str()
    }
}

impl ParameterizedMatcher for DescendingTriangleDetector {
    fn param_meta() -> &'static [ParamMeta] {
        DESCENDING_TRIANGLE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            order: get_period(params, "order", d.order.get())?,
            support_tolerance: get_ratio(params, "support_tolerance", d.support_tolerance.get())?,
            min_support_lows: get_count(params, "min_support_lows", d.min_support_lows)?,
            min_resistance_highs: get_count(params, "min_resistance_highs", d.min_resistance_highs)?,
            max_resistance_slope: get_value(params, "max_resistance_slope", d.max_resistance_slope)?,
            monotonic_tolerance: get_ratio(params, "monotonic_tolerance", d.monotonic_tolerance.get())?,
            min_duration: get_period(params, "min_duration", d.min_duration.get())?,
            breakout: breakout_from_params(params, &d.breakout)?,
        })
    }

    fn formation_id_str() -> &'static str {
        FormationKind::DescendingTriangle.as_str()
    }
}

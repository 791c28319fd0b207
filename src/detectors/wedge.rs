//! Falling wedge matcher
//!
//! A fixed-length window slides over the series. Inside each window, swing
//! highs and lows are detected locally and fitted with two falling lines; the
//! resistance must fall faster so the lines converge.

use std::collections::HashMap;

use super::helpers::{count_touches, finalize_candidates, gap_narrows};
use crate::{
    breakout::BreakoutConfig,
    extrema::{ExtremumKind, PriceSeries},
    params::{
        breakout_from_params, get_count, get_period, get_ratio, get_value, ParamMeta,
        ParameterizedMatcher,
    },
    trend::TrendLine,
    FormationKind, FormationMatcher, Geometry, PatternError, Period, PotentialPattern, Ratio,
    Result,
};

impl_with_defaults!(FallingWedgeDetector);

/// Two converging, falling trendlines; confirmed by a close above resistance.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FallingWedgeDetector {
    pub order: Period,
    /// Window length, clamped to `min_duration..=max_duration`
    pub window: Period,
    pub min_duration: Period,
    pub max_duration: Period,
    /// Swing points each line must pass within `touch_tolerance` of
    pub min_touches: usize,
    /// Both slopes must be below this
    pub max_slope: f64,
    pub touch_tolerance: Ratio,
    pub breakout: BreakoutConfig,
}

impl Default for FallingWedgeDetector {
    fn default() -> Self {
        Self {
            order: Period::new_const(5),
            window: Period::new_const(60),
            min_duration: Period::new_const(30),
            max_duration: Period::new_const(150),
            min_touches: 2,
            max_slope: -1e-5,
            touch_tolerance: Ratio::new_const(0.005),
            breakout: BreakoutConfig::default(),
        }
    }
}

impl FallingWedgeDetector {
    /// Effective window length
    pub fn window_len(&self) -> usize {
        let min = self.min_duration.get();
        let max = self.max_duration.get().max(min);
        self.window.get().clamp(min, max)
    }

    fn candidate_in(&self, series: &PriceSeries, start: usize, end: usize) -> Option<PotentialPattern> {
        let order = self.order.get();
        let highs = series.extrema_in(start..end + 1, order, ExtremumKind::High);
        let lows = series.extrema_in(start..end + 1, order, ExtremumKind::Low);
        if highs.len() < self.min_touches || lows.len() < self.min_touches {
            return None;
        }

        let resistance = TrendLine::through(&highs)?;
        let support = TrendLine::through(&lows)?;
        if resistance.slope >= self.max_slope
            || support.slope >= self.max_slope
            || resistance.slope.abs() <= support.slope.abs()
        {
            return None;
        }

        let (res_end, sup_end) = (resistance.value_at(end), support.value_at(end));
        if res_end - sup_end <= 0.0
            || !gap_narrows(resistance.value_at(start), support.value_at(start), res_end, sup_end)
        {
            return None;
        }

        let tolerance = self.touch_tolerance.get();
        let resistance_touches = count_touches(&highs, &resistance, tolerance);
        let support_touches = count_touches(&lows, &support, tolerance);
        if resistance_touches < self.min_touches || support_touches < self.min_touches {
            return None;
        }

        log::debug!(
            "falling wedge candidate {}..{}: resistance slope {:.6} ({} touches), support slope {:.6} ({} touches)",
            start,
            end,
            resistance.slope,
            resistance_touches,
            support.slope,
            support_touches
        );

        Some(PotentialPattern {
            start_index: start,
            end_index: end,
            geometry: Geometry::FallingWedge {
                resistance_line: resistance,
                support_line: support,
                resistance_points: highs,
                support_points: lows,
            },
        })
    }
}

impl FormationMatcher for FallingWedgeDetector {
    fn kind(&self) -> FormationKind {
        FormationKind::FallingWedge
    }

    fn order(&self) -> usize {
        self.order.get()
    }

    fn min_bars(&self) -> usize {
        self.window_len()
    }

    fn breakout(&self) -> &BreakoutConfig {
        &self.breakout
    }

    fn breakout_mut(&mut self) -> &mut BreakoutConfig {
        &mut self.breakout
    }

    fn find_candidates(&self, series: &PriceSeries) -> Vec<PotentialPattern> {
        let window = self.window_len();
        if series.len() < window {
            return Vec::new();
        }

        let candidates = (window - 1..series.len())
            .filter_map(|end| self.candidate_in(series, end + 1 - window, end))
            .collect();
        finalize_candidates(candidates)
    }

    fn validate_config(&self) -> Result<()> {
        if self.min_duration > self.max_duration {
            return Err(PatternError::InvalidConfig(format!(
                "min_duration {} > max_duration {}",
                self.min_duration.get(),
                self.max_duration.get()
            )));
        }
        if self.min_touches < 2 {
            return Err(PatternError::InvalidConfig(format!(
                "min_touches must be >= 2 to fit a line, got {}",
                self.min_touches
            )));
        }
        if !self.max_slope.is_finite() {
            return Err(PatternError::InvalidValue("max_slope must be finite"));
        }
        self.breakout.validate()
    }
}

static FALLING_WEDGE_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("order", 5.0, (3.0, 8.0, 1.0), "Extrema neighbourhood half-width"),
    ParamMeta::period("window", 60.0, (30.0, 150.0, 10.0), "Sliding window length"),
    ParamMeta::period("min_duration", 30.0, (20.0, 60.0, 10.0), "Shortest allowed window"),
    ParamMeta::period("max_duration", 150.0, (60.0, 200.0, 10.0), "Longest allowed window"),
    ParamMeta::count("min_touches", 2.0, (2.0, 4.0, 1.0), "Swing points near each line"),
    ParamMeta::value("max_slope", -1e-5, (-1e-3, 0.0, 1e-4), "Both slopes must be below this"),
    ParamMeta::ratio("touch_tolerance", 0.005, (0.002, 0.01, 0.001), "Distance counted as a touch"),
];

impl ParameterizedMatcher for FallingWedgeDetector {
    fn param_meta() -> &'static [ParamMeta] {
        FALLING_WEDGE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            order: get_period(params, "order", d.order.get())?,
            window: get_period(params, "window", d.window.get())?,
            min_duration: get_period(params, "min_duration", d.min_duration.get())?,
            max_duration: get_period(params, "max_duration", d.max_duration.get())?,
            min_touches: get_count(params, "min_touches", d.min_touches)?,
            max_slope: get_value(params, "max_slope", d.max_slope)?,
            touch_tolerance: get_ratio(params, "touch_tolerance", d.touch_tolerance.get())?,
            breakout: breakout_from_params(params, &d.breakout)?,
        })
    }

    fn formation_id_str() -> &'static str {
        FormationKind::FallingWedge.as_str()
    }
}

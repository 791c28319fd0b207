//! Double bottom matcher

use std::collections::HashMap;

use super::helpers::{finalize_candidates, relative_diff};
use crate::{
    breakout::BreakoutConfig,
    extrema::{ExtremumKind, ExtremumPoint, PriceSeries},
    params::{breakout_from_params, get_period, get_ratio, ParamMeta, ParameterizedMatcher},
    FormationKind, FormationMatcher, Geometry, PatternError, Period, PotentialPattern, Ratio,
    Result,
};

impl_with_defaults!(DoubleBottomDetector);

/// Two comparable lows with a meaningful rally between them; confirmed by a
/// close above the rally high (the neckline).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DoubleBottomDetector {
    pub order: Period,
    /// Max `|first - second| / first`
    pub trough_tolerance: Ratio,
    /// Min `(neckline - first) / first`
    pub min_peak_rise: Ratio,
    pub min_distance: Period,
    pub max_distance: Period,
    pub breakout: BreakoutConfig,
}

impl Default for DoubleBottomDetector {
    fn default() -> Self {
        Self {
            order: Period::new_const(5),
            trough_tolerance: Ratio::new_const(0.03),
            min_peak_rise: Ratio::new_const(0.05),
            min_distance: Period::new_const(10),
            max_distance: Period::new_const(100),
            breakout: BreakoutConfig::default().with_volume_multiplier(1.3),
        }
    }
}

impl DoubleBottomDetector {
    fn candidate_from(
        &self,
        series: &PriceSeries,
        first: ExtremumPoint,
        second: ExtremumPoint,
    ) -> Option<PotentialPattern> {
        let distance = second.index.checked_sub(first.index)?;
        if distance < self.min_distance.get() || distance > self.max_distance.get() {
            return None;
        }
        if relative_diff(first.value, second.value, first.value)? > self.trough_tolerance.get() {
            return None;
        }

        let peak = series.highest_high_between(first.index, second.index)?;
        let rise = (peak.value - first.value) / first.value;
        if rise < self.min_peak_rise.get() {
            return None;
        }

        log::debug!(
            "double bottom candidate {}..{}: bottoms {:.4}/{:.4}, neckline {:.4} at {}",
            first.index,
            second.index,
            first.value,
            second.value,
            peak.value,
            peak.index
        );

        Some(PotentialPattern {
            start_index: first.index,
            end_index: second.index,
            geometry: Geometry::DoubleBottom {
                first_bottom: first,
                neckline_peak: peak,
                second_bottom: second,
            },
        })
    }
}

impl FormationMatcher for DoubleBottomDetector {
    fn kind(&self) -> FormationKind {
        FormationKind::DoubleBottom
    }

    fn order(&self) -> usize {
        self.order.get()
    }

    fn min_bars(&self) -> usize {
        self.min_distance.get() + 2 * self.order.get()
    }

    fn breakout(&self) -> &BreakoutConfig {
        &self.breakout
    }

    fn breakout_mut(&mut self) -> &mut BreakoutConfig {
        &mut self.breakout
    }

    fn find_candidates(&self, series: &PriceSeries) -> Vec<PotentialPattern> {
        let lows = series.extrema(self.order.get(), ExtremumKind::Low);

        let mut candidates = Vec::new();
        for (i, &first) in lows.iter().enumerate() {
            for &second in &lows[i + 1..] {
                if let Some(candidate) = self.candidate_from(series, first, second) {
                    candidates.push(candidate);
                }
            }
        }
        finalize_candidates(candidates)
    }

    fn validate_config(&self) -> Result<()> {
        if self.min_distance > self.max_distance {
            return Err(PatternError::InvalidConfig(format!(
                "min_distance {} > max_distance {}",
                self.min_distance.get(),
                self.max_distance.get()
            )));
        }
        self.breakout.validate()
    }
}

static DOUBLE_BOTTOM_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("order", 5.0, (3.0, 8.0, 1.0), "Extrema neighbourhood half-width"),
    ParamMeta::ratio("trough_tolerance", 0.03, (0.01, 0.05, 0.01), "Max relative difference of the bottoms"),
    ParamMeta::ratio("min_peak_rise", 0.05, (0.02, 0.1, 0.01), "Min rise from first bottom to neckline"),
    ParamMeta::period("min_distance", 10.0, (5.0, 20.0, 5.0), "Min bars between bottoms"),
    ParamMeta::period("max_distance", 100.0, (50.0, 150.0, 25.0), "Max bars between bottoms"),
];

impl ParameterizedMatcher for DoubleBottomDetector {
    fn param_meta() -> &'static [ParamMeta] {
        DOUBLE_BOTTOM_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            order: get_period(params, "order", d.order.get())?,
            trough_tolerance: get_ratio(params, "trough_tolerance", d.trough_tolerance.get())?,
            min_peak_rise: get_ratio(params, "min_peak_rise", d.min_peak_rise.get())?,
            min_distance: get_period(params, "min_distance", d.min_distance.get())?,
            max_distance: get_period(params, "max_distance", d.max_distance.get())?,
            breakout: breakout_from_params(params, &d.breakout)?,
        })
    }

    fn formation_id_str() -> &'static str {
        FormationKind::DoubleBottom.as_str()
    }
}

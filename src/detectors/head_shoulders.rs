//! Inverse head & shoulders matcher

use std::collections::HashMap;

use super::helpers::{finalize_candidates, mean};
use crate::{
    breakout::BreakoutConfig,
    extrema::{ExtremumKind, ExtremumPoint, PriceSeries},
    params::{breakout_from_params, get_period, get_ratio, ParamMeta, ParameterizedMatcher},
    trend::TrendLine,
    FormationKind, FormationMatcher, Geometry, Period, PotentialPattern, Ratio, Result,
};

impl_with_defaults!(InverseHeadAndShouldersDetector);

/// Three consecutive swing lows with the middle one deepest; the highs
/// between them define a sloped neckline that the breakout must clear.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InverseHeadAndShouldersDetector {
    pub order: Period,
    /// Max `|P1 - P2|` as a fraction of their mean (exclusive)
    pub peak_tolerance: Ratio,
    /// Max `|S1 - S2|` as a fraction of their mean (exclusive)
    pub shoulder_tolerance: Ratio,
    pub min_candles: Period,
    pub breakout: BreakoutConfig,
}

impl Default for InverseHeadAndShouldersDetector {
    fn default() -> Self {
        Self {
            order: Period::new_const(5),
            peak_tolerance: Ratio::new_const(0.05),
            shoulder_tolerance: Ratio::new_const(0.10),
            min_candles: Period::new_const(50),
            breakout: BreakoutConfig::default().with_volume_multiplier(1.3),
        }
    }
}

/// `|a - b| < tolerance * mean(a, b)`; false for a non-positive mean
fn symmetric(a: f64, b: f64, tolerance: f64) -> bool {
    match mean([a, b]) {
        Some(m) if m > 0.0 => (a - b).abs() < tolerance * m,
        _ => false,
    }
}

impl InverseHeadAndShouldersDetector {
    fn candidate_from(
        &self,
        series: &PriceSeries,
        left: ExtremumPoint,
        head: ExtremumPoint,
        right: ExtremumPoint,
    ) -> Option<PotentialPattern> {
        let order = self.order.get();
        if head.index < left.index + order || right.index < head.index + order {
            return None;
        }
        if head.value >= left.value || head.value >= right.value {
            return None;
        }

        let left_peak = series.highest_high_between(left.index, head.index)?;
        let right_peak = series.highest_high_between(head.index, right.index)?;
        if !symmetric(left_peak.value, right_peak.value, self.peak_tolerance.get())
            || !symmetric(left.value, right.value, self.shoulder_tolerance.get())
        {
            return None;
        }

        let neckline = TrendLine::through(&[left_peak, right_peak])?;

        log::debug!(
            "inverse head & shoulders candidate {}..{}: head {:.4} at {}, neckline slope {:.6}",
            left.index,
            right.index,
            head.value,
            head.index,
            neckline.slope
        );

        Some(PotentialPattern {
            start_index: left.index,
            end_index: right.index,
            geometry: Geometry::InverseHeadAndShoulders {
                left_shoulder: left,
                left_peak,
                head,
                right_peak,
                right_shoulder: right,
                neckline,
            },
        })
    }
}

impl FormationMatcher for InverseHeadAndShouldersDetector {
    fn kind(&self) -> FormationKind {
        FormationKind::InverseHeadAndShoulders
    }

    fn order(&self) -> usize {
        self.order.get()
    }

    fn min_bars(&self) -> usize {
        self.min_candles.get().max(2 * self.order.get() + 1)
    }

    fn breakout(&self) -> &BreakoutConfig {
        &self.breakout
    }

    fn breakout_mut(&mut self) -> &mut BreakoutConfig {
        &mut self.breakout
    }

    fn find_candidates(&self, series: &PriceSeries) -> Vec<PotentialPattern> {
        let lows = series.extrema(self.order.get(), ExtremumKind::Low);
        let candidates = lows
            .windows(3)
            .filter_map(|w| self.candidate_from(series, w[0], w[1], w[2]))
            .collect();
        finalize_candidates(candidates)
    }
}

static INVERSE_HEAD_AND_SHOULDERS_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("order", 5.0, (3.0, 8.0, 1.0), "Extrema neighbourhood half-width"),
    ParamMeta::ratio("peak_tolerance", 0.05, (0.02, 0.08, 0.01), "Neckline peak symmetry"),
    ParamMeta::ratio("shoulder_tolerance", 0.10, (0.05, 0.2, 0.05), "Shoulder depth symmetry"),
    ParamMeta::period("min_candles", 50.0, (30.0, 100.0, 10.0), "Minimum bars in the series"),
];

impl ParameterizedMatcher for InverseHeadAndShouldersDetector {
    fn param_meta() -> &'static [ParamMeta] {
        INVERSE_HEAD_AND_SHOULDERS_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            order: get_period(params, "order", d.order.get())?,
            peak_tolerance: get_ratio(params, "peak_tolerance", d.peak_tolerance.get())?,
            shoulder_tolerance: get_ratio(params, "shoulder_tolerance", d.shoulder_tolerance.get())?,
            min_candles: get_period(params, "min_candles", d.min_candles.get())?,
            breakout: breakout_from_params(params, &d.breakout)?,
        })
    }

    fn formation_id_str() -> &'static str {
        FormationKind::InverseHeadAndShoulders.as_str()
    }
}

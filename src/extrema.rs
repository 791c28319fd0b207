//! Swing extrema detection
//!
//! A bar is a local low (high) when its value is `<=` (`>=`) every neighbour
//! within `order` bars on both sides. A qualifying bar is dropped when it
//! directly follows the last reported one with the same value, so equal
//! neighbours are never reported one bar apart.

use std::ops::Range;

use crate::OHLCV;

/// Which side of the series to search
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ExtremumKind {
    Low,
    High,
}

/// A swing point in the bar sequence
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ExtremumPoint {
    /// Absolute position in the scanned bar sequence
    pub index: usize,
    pub value: f64,
    pub timestamp: Option<i64>,
}

/// Find indices of local extrema in `series`.
///
/// Candidates are `order..len - order`; a series shorter than `2 * order + 1`
/// (or `order == 0`) yields nothing.
pub fn find_extrema(series: &[f64], order: usize, kind: ExtremumKind) -> Vec<usize> {
    let len = series.len();
    let mut found = Vec::new();
    if order == 0 || len < 2 * order + 1 {
        return found;
    }

    for i in order..len - order {
        let value = series[i];
        let qualifies = (1..=order).all(|j| match kind {
            ExtremumKind::Low => value <= series[i - j] && value <= series[i + j],
            ExtremumKind::High => value >= series[i - j] && value >= series[i + j],
        });
        if !qualifies {
            continue;
        }

        // Skip the bar right after the last kept one when it repeats its value
        let continues_plateau = found
            .last()
            .is_some_and(|&prev| prev + 1 == i && series[prev] == value);
        if !continues_plateau {
            found.push(i);
        }
    }

    found
}

/// Price series extracted once per scan and shared by every matcher.
#[derive(Debug, Clone, Default)]
pub struct PriceSeries {
    pub lows: Vec<f64>,
    pub highs: Vec<f64>,
    pub timestamps: Vec<Option<i64>>,
}

impl PriceSeries {
    pub fn from_bars<T: OHLCV>(bars: &[T]) -> Self {
        let mut series = Self {
            lows: Vec::with_capacity(bars.len()),
            highs: Vec::with_capacity(bars.len()),
            timestamps: Vec::with_capacity(bars.len()),
        };
        for bar in bars {
            series.lows.push(bar.low());
            series.highs.push(bar.high());
            series.timestamps.push(bar.timestamp());
        }
        series
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.lows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lows.is_empty()
    }

    /// Raw values for one side of the series
    #[inline]
    pub fn values(&self, kind: ExtremumKind) -> &[f64] {
        match kind {
            ExtremumKind::Low => &self.lows,
            ExtremumKind::High => &self.highs,
        }
    }

    /// Build the swing point at `index`. Caller guarantees the index is in bounds.
    #[inline]
    pub fn point(&self, index: usize, kind: ExtremumKind) -> ExtremumPoint {
        ExtremumPoint {
            index,
            value: self.values(kind)[index],
            timestamp: self.timestamps[index],
        }
    }

    /// Swing points over the whole series
    pub fn extrema(&self, order: usize, kind: ExtremumKind) -> Vec<ExtremumPoint> {
        find_extrema(self.values(kind), order, kind)
            .into_iter()
            .map(|i| self.point(i, kind))
            .collect()
    }

    /// Swing points detected inside `window` only, with indices mapped back to
    /// absolute positions. Bars outside the window do not take part in the
    /// neighbourhood comparison.
    pub fn extrema_in(
        &self,
        window: Range<usize>,
        order: usize,
        kind: ExtremumKind,
    ) -> Vec<ExtremumPoint> {
        let end = window.end.min(self.len());
        let start = window.start.min(end);
        find_extrema(&self.values(kind)[start..end], order, kind)
            .into_iter()
            .map(|i| self.point(start + i, kind))
            .collect()
    }

    /// Highest high strictly between `from` and `to` (both exclusive).
    /// Ties keep the earliest bar.
    pub fn highest_high_between(&self, from: usize, to: usize) -> Option<ExtremumPoint> {
        let end = to.min(self.len());
        let mut best: Option<usize> = None;
        for k in from.saturating_add(1)..end {
            match best {
                Some(b) if self.highs[k] <= self.highs[b] => {}
                _ => best = Some(k),
            }
        }
        best.map(|k| self.point(k, ExtremumKind::High))
    }
}

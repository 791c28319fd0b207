//! Breakout / breakdown confirmation
//!
//! After a formation completes, bars are scanned forward for the first close
//! that crosses the boundary by more than a percentage buffer. The crossing is
//! then checked for freshness (how far back from the last bar it happened)
//! and annotated with a volume confirmation flag.

use crate::{trend::TrendLine, Direction, PatternError, Period, Ratio, Result, OHLCV};

/// Breakout scanning parameters shared by all formations
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BreakoutConfig {
    /// Bars after the formation end to search for a crossing
    pub candles_to_check: Period,
    /// Close must clear the boundary by this fraction of its value
    pub buffer_percent: Ratio,
    /// Bars averaged before the breakout bar
    pub volume_lookback: Period,
    /// Breakout volume must exceed `avg * volume_multiplier`
    pub volume_multiplier: f64,
    /// Discard breakouts this many bars (or more) before the last bar.
    /// `None` disables the freshness filter.
    pub max_candles_ago: Option<usize>,
}

impl Default for BreakoutConfig {
    fn default() -> Self {
        Self {
            candles_to_check: Period::new_const(15),
            buffer_percent: Ratio::new_const(0.001),
            volume_lookback: Period::new_const(30),
            volume_multiplier: 1.5,
            max_candles_ago: None,
        }
    }
}

impl BreakoutConfig {
    /// Same config with a different volume multiplier
    pub fn with_volume_multiplier(mut self, multiplier: f64) -> Self {
        self.volume_multiplier = multiplier;
        self
    }

    /// Only keep breakouts that happened fewer than `max_candles_ago` bars
    /// before the last bar.
    pub fn with_fresh_breakouts(mut self, max_candles_ago: usize) -> Self {
        self.max_candles_ago = Some(max_candles_ago);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.volume_multiplier.is_finite() || self.volume_multiplier < 0.0 {
            return Err(PatternError::InvalidConfig(format!(
                "volume_multiplier must be finite and >= 0, got {}",
                self.volume_multiplier
            )));
        }
        if self.max_candles_ago == Some(0) {
            return Err(PatternError::InvalidConfig(
                "max_candles_ago = 0 would discard every breakout".to_string(),
            ));
        }
        Ok(())
    }
}

/// Line a formation breaks out of
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub enum Boundary {
    /// Averaged level (triangle flats, double bottom neckline)
    Horizontal(f64),
    /// Fitted line, evaluated at each scanned bar
    Sloped(TrendLine),
}

impl Boundary {
    #[inline]
    pub fn value_at(&self, index: usize) -> f64 {
        match self {
            Boundary::Horizontal(level) => *level,
            Boundary::Sloped(line) => line.value_at(index),
        }
    }
}

/// The bar that crossed the boundary
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct BreakoutEvent {
    pub index: usize,
    pub timestamp: Option<i64>,
    pub close_price: f64,
    /// Boundary value at `index`, before the buffer is applied
    pub boundary_value: f64,
    pub volume: f64,
}

/// A crossing that passed the freshness filter
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Breakout {
    pub event: BreakoutEvent,
    pub volume_confirmed: bool,
    pub avg_volume_before: f64,
    /// Bars between the breakout and the last bar of the sequence
    pub candles_ago: usize,
}

/// Terminal state of the breakout state machine for one candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BreakoutOutcome {
    Confirmed(Breakout),
    /// No buffered crossing inside the scan window
    NoBreak,
    /// Crossing found but too old (or past the last bar)
    Stale { event: BreakoutEvent, candles_ago: Option<usize> },
}

impl BreakoutOutcome {
    pub fn confirmed(self) -> Option<Breakout> {
        match self {
            BreakoutOutcome::Confirmed(b) => Some(b),
            _ => None,
        }
    }
}

/// True when `close` clears `boundary` by the buffer in `direction`.
#[inline]
pub fn crosses(close: f64, boundary: f64, buffer: f64, direction: Direction) -> bool {
    match direction {
        Direction::Bullish => close > boundary + boundary * buffer,
        Direction::Bearish => close < boundary - boundary * buffer,
    }
}

/// Scan forward from the bar after `end_index` for the first buffered crossing.
pub fn find_breakout<T: OHLCV>(
    bars: &[T],
    end_index: usize,
    boundary: &Boundary,
    direction: Direction,
    config: &BreakoutConfig,
) -> Option<BreakoutEvent> {
    let first = end_index.checked_add(1)?;
    let last = end_index
        .saturating_add(config.candles_to_check.get())
        .min(bars.len().saturating_sub(1));
    let buffer = config.buffer_percent.get();

    for k in first..=last {
        let bar = bars.get(k)?;
        let level = boundary.value_at(k);
        log::trace!(
            "breakout check: index={} close={:.4} boundary={:.4} direction={:?}",
            k,
            bar.close(),
            level,
            direction
        );
        if crosses(bar.close(), level, buffer, direction) {
            return Some(BreakoutEvent {
                index: k,
                timestamp: bar.timestamp(),
                close_price: bar.close(),
                boundary_value: level,
                volume: bar.volume(),
            });
        }
    }
    None
}

/// Mean volume over the `lookback` bars strictly before `at`; 0 when none.
#[inline]
pub fn trailing_avg_volume<T: OHLCV>(bars: &[T], at: usize, lookback: usize) -> f64 {
    let end = at.min(bars.len());
    let start = end.saturating_sub(lookback);
    let slice = &bars[start..end];
    if slice.is_empty() {
        return 0.0;
    }
    slice.iter().map(|b| b.volume()).sum::<f64>() / slice.len() as f64
}

/// Bars between `index` and the last bar, or `None` when `index` is past it.
#[inline]
pub fn candles_ago(bar_count: usize, index: usize) -> Option<usize> {
    bar_count.checked_sub(1)?.checked_sub(index)
}

/// Run the full state machine: crossing, freshness, volume.
pub fn confirm_breakout<T: OHLCV>(
    bars: &[T],
    end_index: usize,
    boundary: &Boundary,
    direction: Direction,
    config: &BreakoutConfig,
) -> BreakoutOutcome {
    let Some(event) = find_breakout(bars, end_index, boundary, direction, config) else {
        return BreakoutOutcome::NoBreak;
    };

    let ago = candles_ago(bars.len(), event.index);
    let candles_ago = match (ago, config.max_candles_ago) {
        (None, _) => return BreakoutOutcome::Stale { event, candles_ago: None },
        (Some(a), Some(max)) if a >= max => {
            return BreakoutOutcome::Stale { event, candles_ago: Some(a) }
        }
        (Some(a), _) => a,
    };

    let avg_volume_before = trailing_avg_volume(bars, event.index, config.volume_lookback.get());
    let volume_confirmed =
        avg_volume_before > 0.0 && event.volume > avg_volume_before * config.volume_multiplier;

    BreakoutOutcome::Confirmed(Breakout {
        event,
        volume_confirmed,
        avg_volume_before,
        candles_ago,
    })
}

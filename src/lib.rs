//! # YACFD - Yet Another Chart Formation Detector
//!
//! Detection of classical chart formations (ascending/descending triangles,
//! falling wedges, double bottoms, inverse head & shoulders) from swing
//! extrema, confirmed by a buffered breakout and annotated with a projected
//! price target.
//!
//! ## Quick Start
//!
//! ```rust
//! use yacfd::prelude::*;
//!
//! // Any bar type works once it implements OHLCV
//! struct Candle { t: i64, o: f64, h: f64, l: f64, c: f64, v: f64 }
//!
//! impl OHLCV for Candle {
//!     fn open(&self) -> f64 { self.o }
//!     fn high(&self) -> f64 { self.h }
//!     fn low(&self) -> f64 { self.l }
//!     fn close(&self) -> f64 { self.c }
//!     fn volume(&self) -> f64 { self.v }
//!     fn timestamp(&self) -> Option<i64> { Some(self.t) }
//! }
//!
//! // Create engine with every formation at its default settings
//! let engine = EngineBuilder::new()
//!     .with_all_defaults()
//!     .build()
//!     .unwrap();
//!
//! // Scan your data
//! let candles: Vec<Candle> = vec![];
//! let report = engine.scan(&candles).unwrap();
//! assert_eq!(report.confirmed().count(), 0);
//! ```

pub mod breakout;
pub mod detectors;
pub mod extrema;
pub mod params;
pub mod projection;
pub mod trend;

pub mod prelude {
    pub use crate::{
        // Breakout
        breakout::{Boundary, Breakout, BreakoutConfig, BreakoutEvent, BreakoutOutcome},
        // Detectors
        detectors::*,
        // Extrema
        extrema::{find_extrema, ExtremumKind, ExtremumPoint, PriceSeries},
        // Parameters
        params::{get_count, get_period, get_ratio, get_value, ParamMeta, ParamType, ParameterizedMatcher},
        // Projection
        projection::Projection,
        // Parallel
        scan_parallel,
        // Types
        Bar,
        // Engine
        BuiltinMatcher,
        ConfirmedPattern,
        Direction,
        EngineBuilder,
        FormationEngine,
        FormationKind,
        // Core traits
        FormationMatcher,
        FormationReport,
        Geometry,
        OHLCVExt,
        // Errors
        PatternError,
        Period,
        PotentialPattern,
        Ratio,
        Result,
        ScanError,
        ScanReport,
        ScanResult,
        // Trend
        trend::{fit, TrendLine},
        OHLCV,
    };
}

use breakout::{confirm_breakout, Boundary, BreakoutConfig, BreakoutEvent, BreakoutOutcome};
use extrema::{ExtremumKind, ExtremumPoint, PriceSeries};
use projection::Projection;
use trend::TrendLine;

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors that can occur while configuring or running a scan.
///
/// A candidate that does not qualify is never an error; it is simply absent
/// from the report.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Insufficient data: need {need} bars, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Invalid OHLCV at index {index}: {reason}")]
    InvalidOHLCV { index: usize, reason: &'static str },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(PatternError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(PatternError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(PatternError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    /// Bar open time in milliseconds
    fn timestamp(&self) -> Option<i64> {
        None
    }
}

/// Consistency checks for OHLCV data
pub trait OHLCVExt: OHLCV {
    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        let values = [self.open(), self.high(), self.low(), self.close(), self.volume()];
        if values.iter().any(|v| v.is_nan()) {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if values.iter().any(|v| v.is_infinite()) {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        if self.high() < self.low() {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "high < low",
            });
        }
        if self.volume() < 0.0 {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "negative volume",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

/// Plain OHLCV bar with a millisecond timestamp
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl OHLCV for Bar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.timestamp)
    }
}

// ============================================================
// FORMATIONS
// ============================================================

/// Chart formations known to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormationKind {
    AscendingTriangle,
    DescendingTriangle,
    FallingWedge,
    DoubleBottom,
    InverseHeadAndShoulders,
}

impl FormationKind {
    /// Stable identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            FormationKind::AscendingTriangle => "ASCENDING_TRIANGLE",
            FormationKind::DescendingTriangle => "DESCENDING_TRIANGLE",
            FormationKind::FallingWedge => "FALLING_WEDGE",
            FormationKind::DoubleBottom => "DOUBLE_BOTTOM",
            FormationKind::InverseHeadAndShoulders => "INVERSE_HEAD_AND_SHOULDERS",
        }
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            FormationKind::AscendingTriangle => "Ascending Triangle",
            FormationKind::DescendingTriangle => "Descending Triangle",
            FormationKind::FallingWedge => "Falling Wedge",
            FormationKind::DoubleBottom => "Double Bottom",
            FormationKind::InverseHeadAndShoulders => "Inverse Head & Shoulders",
        }
    }

    /// Direction of the breakout that confirms the formation.
    ///
    /// Descending triangles confirm on a breakdown below support; every other
    /// formation confirms on a breakout above its upper boundary.
    pub fn typical_direction(&self) -> Direction {
        match self {
            FormationKind::DescendingTriangle => Direction::Bearish,
            FormationKind::AscendingTriangle
            | FormationKind::FallingWedge
            | FormationKind::DoubleBottom
            | FormationKind::InverseHeadAndShoulders => Direction::Bullish,
        }
    }

    pub fn is_bullish(&self) -> bool {
        self.typical_direction().is_bullish()
    }

    pub fn is_bearish(&self) -> bool {
        self.typical_direction().is_bearish()
    }
}

impl std::fmt::Display for FormationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Side of the boundary a confirming close must clear
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }
}

/// Structure that defines a formation
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "type")]
pub enum Geometry {
    AscendingTriangle {
        /// Mean of the grouped highs
        resistance_level: f64,
        resistance_points: Vec<ExtremumPoint>,
        support_line: TrendLine,
        support_points: Vec<ExtremumPoint>,
    },
    DescendingTriangle {
        /// Mean of the grouped lows
        support_level: f64,
        support_points: Vec<ExtremumPoint>,
        resistance_line: TrendLine,
        resistance_points: Vec<ExtremumPoint>,
    },
    FallingWedge {
        resistance_line: TrendLine,
        support_line: TrendLine,
        resistance_points: Vec<ExtremumPoint>,
        support_points: Vec<ExtremumPoint>,
    },
    DoubleBottom {
        first_bottom: ExtremumPoint,
        /// Highest high between the bottoms
        neckline_peak: ExtremumPoint,
        second_bottom: ExtremumPoint,
    },
    InverseHeadAndShoulders {
        left_shoulder: ExtremumPoint,
        left_peak: ExtremumPoint,
        head: ExtremumPoint,
        right_peak: ExtremumPoint,
        right_shoulder: ExtremumPoint,
        /// Line through both peaks
        neckline: TrendLine,
    },
}

impl Geometry {
    pub fn kind(&self) -> FormationKind {
        match self {
            Geometry::AscendingTriangle { .. } => FormationKind::AscendingTriangle,
            Geometry::DescendingTriangle { .. } => FormationKind::DescendingTriangle,
            Geometry::FallingWedge { .. } => FormationKind::FallingWedge,
            Geometry::DoubleBottom { .. } => FormationKind::DoubleBottom,
            Geometry::InverseHeadAndShoulders { .. } => FormationKind::InverseHeadAndShoulders,
        }
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.kind().typical_direction()
    }

    /// The boundary a confirming close must cross
    pub fn breakout_boundary(&self) -> Boundary {
        match self {
            Geometry::AscendingTriangle { resistance_level, .. } => {
                Boundary::Horizontal(*resistance_level)
            }
            Geometry::DescendingTriangle { support_level, .. } => {
                Boundary::Horizontal(*support_level)
            }
            Geometry::FallingWedge { resistance_line, .. } => Boundary::Sloped(*resistance_line),
            Geometry::DoubleBottom { neckline_peak, .. } => {
                Boundary::Horizontal(neckline_peak.value)
            }
            Geometry::InverseHeadAndShoulders { neckline, .. } => Boundary::Sloped(*neckline),
        }
    }

    /// Fitted (sloped) lines, used to recognise duplicate candidates
    pub fn fitted_lines(&self) -> Vec<TrendLine> {
        match self {
            Geometry::AscendingTriangle { support_line, .. } => vec![*support_line],
            Geometry::DescendingTriangle { resistance_line, .. } => vec![*resistance_line],
            Geometry::FallingWedge {
                resistance_line,
                support_line,
                ..
            } => vec![*resistance_line, *support_line],
            Geometry::DoubleBottom { .. } => Vec::new(),
            Geometry::InverseHeadAndShoulders { neckline, .. } => vec![*neckline],
        }
    }
}

/// A formation whose structure is complete but not yet confirmed
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PotentialPattern {
    pub start_index: usize,
    /// Bar at which the defining structure completes; breakout scanning starts after it
    pub end_index: usize,
    pub geometry: Geometry,
}

impl PotentialPattern {
    #[inline]
    pub fn kind(&self) -> FormationKind {
        self.geometry.kind()
    }
}

/// A formation confirmed by a breakout
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ConfirmedPattern {
    pub kind: FormationKind,
    pub direction: Direction,
    pub pattern: PotentialPattern,
    pub breakout: BreakoutEvent,
    /// Advisory: breakout volume above the trailing average times the multiplier
    pub volume_confirmed: bool,
    pub avg_volume_before: f64,
    pub candles_ago: usize,
    pub projection: Projection,
}

/// Push one candidate through the breakout state machine and projection.
///
/// Returns `None` when no confirming breakout exists (or it is stale).
pub fn confirm_pattern<T: OHLCV>(
    bars: &[T],
    pattern: PotentialPattern,
    config: &BreakoutConfig,
) -> Option<ConfirmedPattern> {
    let kind = pattern.kind();
    let direction = pattern.geometry.direction();
    let boundary = pattern.geometry.breakout_boundary();

    match confirm_breakout(bars, pattern.end_index, &boundary, direction, config) {
        BreakoutOutcome::Confirmed(breakout) => {
            let projection = projection::project(&pattern.geometry, &breakout.event);
            log::debug!(
                "{} ending at {} confirmed at {} (close {:.4}, boundary {:.4}, volume confirmed: {}, target {:?})",
                kind,
                pattern.end_index,
                breakout.event.index,
                breakout.event.close_price,
                breakout.event.boundary_value,
                breakout.volume_confirmed,
                projection.target_price
            );
            Some(ConfirmedPattern {
                kind,
                direction,
                pattern,
                breakout: breakout.event,
                volume_confirmed: breakout.volume_confirmed,
                avg_volume_before: breakout.avg_volume_before,
                candles_ago: breakout.candles_ago,
                projection,
            })
        }
        BreakoutOutcome::NoBreak => {
            log::debug!(
                "{} ending at {}: no breakout within {} bars",
                kind,
                pattern.end_index,
                config.candles_to_check.get()
            );
            None
        }
        BreakoutOutcome::Stale { event, candles_ago } => {
            log::debug!(
                "{} ending at {}: breakout at {} is stale ({:?} bars ago)",
                kind,
                pattern.end_index,
                event.index,
                candles_ago
            );
            None
        }
    }
}

// ============================================================
// FORMATION MATCHER TRAIT
// ============================================================

/// Formation matcher - turns swing extrema into potential patterns
pub trait FormationMatcher: Send + Sync {
    fn kind(&self) -> FormationKind;

    /// Neighbourhood half-width used for extrema detection
    fn order(&self) -> usize;

    /// Fewer bars than this means no formation is possible
    fn min_bars(&self) -> usize;

    fn breakout(&self) -> &BreakoutConfig;

    fn breakout_mut(&mut self) -> &mut BreakoutConfig;

    /// All de-duplicated candidates, ordered by `end_index`
    fn find_candidates(&self, series: &PriceSeries) -> Vec<PotentialPattern>;

    fn validate_config(&self) -> Result<()> {
        self.breakout().validate()
    }
}

// ============================================================
// BUILTIN MATCHERS - generated via macro
// ============================================================

use detectors::*;

/// Macro to generate BuiltinMatcher enum without boilerplate
macro_rules! define_builtin_matchers {
    (
        $(
            $variant:ident($matcher:ty)
        ),* $(,)?
    ) => {
        /// All builtin matchers - enum dispatch, no vtable
        #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        pub enum BuiltinMatcher {
            $($variant($matcher)),*
        }

        impl BuiltinMatcher {
            #[inline]
            pub fn kind(&self) -> FormationKind {
                match self {
                    $(Self::$variant(m) => FormationMatcher::kind(m)),*
                }
            }

            #[inline]
            pub fn order(&self) -> usize {
                match self {
                    $(Self::$variant(m) => FormationMatcher::order(m)),*
                }
            }

            #[inline]
            pub fn min_bars(&self) -> usize {
                match self {
                    $(Self::$variant(m) => FormationMatcher::min_bars(m)),*
                }
            }

            #[inline]
            pub fn breakout(&self) -> &BreakoutConfig {
                match self {
                    $(Self::$variant(m) => FormationMatcher::breakout(m)),*
                }
            }

            #[inline]
            pub fn breakout_mut(&mut self) -> &mut BreakoutConfig {
                match self {
                    $(Self::$variant(m) => FormationMatcher::breakout_mut(m)),*
                }
            }

            pub fn find_candidates(&self, series: &PriceSeries) -> Vec<PotentialPattern> {
                match self {
                    $(Self::$variant(m) => FormationMatcher::find_candidates(m, series)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(m) => FormationMatcher::validate_config(m)),*
                }
            }
        }
    };
}

define_builtin_matchers! {
    AscendingTriangle(AscendingTriangleDetector),
    DescendingTriangle(DescendingTriangleDetector),
    FallingWedge(FallingWedgeDetector),
    DoubleBottom(DoubleBottomDetector),
    InverseHeadAndShoulders(InverseHeadAndShouldersDetector),
}

// ============================================================
// REPORTS
// ============================================================

/// Outcome of one matcher over one bar sequence
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FormationReport {
    pub kind: FormationKind,
    pub bars_analyzed: usize,
    /// Bars required by the matcher; set when `insufficient_data` is true
    pub min_bars: usize,
    pub insufficient_data: bool,
    pub local_lows_found: usize,
    pub local_highs_found: usize,
    pub potential_count: usize,
    /// Potential patterns without a (fresh) breakout
    pub rejected_count: usize,
    pub confirmed: Vec<ConfirmedPattern>,
}

impl FormationReport {
    fn new(kind: FormationKind, bars_analyzed: usize, min_bars: usize) -> Self {
        Self {
            kind,
            bars_analyzed,
            min_bars,
            insufficient_data: false,
            local_lows_found: 0,
            local_highs_found: 0,
            potential_count: 0,
            rejected_count: 0,
            confirmed: Vec::new(),
        }
    }

    /// Error form of `insufficient_data`, for callers that want one
    pub fn insufficient_data_error(&self) -> Option<PatternError> {
        self.insufficient_data.then_some(PatternError::InsufficientData {
            need: self.min_bars,
            got: self.bars_analyzed,
        })
    }
}

/// Outcome of one scan over every configured matcher
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize)]
pub struct ScanReport {
    pub bars_analyzed: usize,
    pub formations: Vec<FormationReport>,
}

impl ScanReport {
    /// Every confirmed pattern across formations
    pub fn confirmed(&self) -> impl Iterator<Item = &ConfirmedPattern> {
        self.formations.iter().flat_map(|f| f.confirmed.iter())
    }

    /// Confirmed patterns whose breakout volume also confirmed
    pub fn volume_confirmed(&self) -> impl Iterator<Item = &ConfirmedPattern> {
        self.confirmed().filter(|p| p.volume_confirmed)
    }

    pub fn potential_count(&self) -> usize {
        self.formations.iter().map(|f| f.potential_count).sum()
    }

    pub fn rejected_count(&self) -> usize {
        self.formations.iter().map(|f| f.rejected_count).sum()
    }

    pub fn formation(&self, kind: FormationKind) -> Option<&FormationReport> {
        self.formations.iter().find(|f| f.kind == kind)
    }
}

// ============================================================
// FORMATION ENGINE
// ============================================================

/// Engine configuration
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub validate_data: bool,
    pub formation_filter: Option<Vec<FormationKind>>,
    /// Applied to every matcher's breakout config at build time
    pub max_candles_ago: Option<usize>,
}

/// Main formation detection engine
#[derive(Debug, Clone)]
pub struct FormationEngine {
    matchers: Vec<BuiltinMatcher>,
    config: EngineConfig,
}

impl FormationEngine {
    /// Configured matchers, e.g. to report the parameters in use
    pub fn matchers(&self) -> &[BuiltinMatcher] {
        &self.matchers
    }

    // ===========================================
    // LOW-LEVEL: Primitives
    // ===========================================

    /// Potential patterns of every matcher, before breakout confirmation.
    pub fn candidates<T: OHLCV>(&self, bars: &[T]) -> Vec<PotentialPattern> {
        let series = PriceSeries::from_bars(bars);
        self.active_matchers()
            .filter(|m| bars.len() >= m.min_bars())
            .flat_map(|m| m.find_candidates(&series))
            .collect()
    }

    // ===========================================
    // MID-LEVEL: Single formation
    // ===========================================

    /// Run one matcher through candidate search, breakout and projection.
    pub fn scan_formation<T: OHLCV>(
        &self,
        matcher: &BuiltinMatcher,
        bars: &[T],
        series: &PriceSeries,
    ) -> FormationReport {
        let kind = matcher.kind();
        let mut report = FormationReport::new(kind, bars.len(), matcher.min_bars());

        if bars.len() < matcher.min_bars() {
            log::debug!(
                "{}: need {} bars, got {}",
                kind,
                matcher.min_bars(),
                bars.len()
            );
            report.insufficient_data = true;
            return report;
        }

        report.local_lows_found = series.extrema(matcher.order(), ExtremumKind::Low).len();
        report.local_highs_found = series.extrema(matcher.order(), ExtremumKind::High).len();

        let candidates = matcher.find_candidates(series);
        report.potential_count = candidates.len();
        log::debug!(
            "{}: {} lows, {} highs, {} potential formations",
            kind,
            report.local_lows_found,
            report.local_highs_found,
            report.potential_count
        );

        for candidate in candidates {
            match confirm_pattern(bars, candidate, matcher.breakout()) {
                Some(confirmed) => report.confirmed.push(confirmed),
                None => report.rejected_count += 1,
            }
        }

        report
    }

    // ===========================================
    // HIGH-LEVEL: Batch processing
    // ===========================================

    /// Scan all configured formations over one bar sequence.
    ///
    /// Only fails on invalid bars when data validation is enabled.
    pub fn scan<T: OHLCV>(&self, bars: &[T]) -> Result<ScanReport> {
        if self.config.validate_data {
            self.validate_bars(bars)?;
        }

        let series = PriceSeries::from_bars(bars);
        let formations = self
            .active_matchers()
            .map(|m| self.scan_formation(m, bars, &series))
            .collect();

        Ok(ScanReport {
            bars_analyzed: bars.len(),
            formations,
        })
    }

    // ===========================================
    // Internal helpers
    // ===========================================

    fn active_matchers(&self) -> impl Iterator<Item = &BuiltinMatcher> {
        self.matchers.iter().filter(|m| self.should_run(m.kind()))
    }

    fn should_run(&self, kind: FormationKind) -> bool {
        match self.config.formation_filter {
            Some(ref filter) => filter.contains(&kind),
            None => true,
        }
    }

    fn validate_bars<T: OHLCV>(&self, bars: &[T]) -> Result<()> {
        for (i, bar) in bars.iter().enumerate() {
            bar.validate().map_err(|e| match e {
                PatternError::InvalidOHLCV { reason, .. } => {
                    PatternError::InvalidOHLCV { index: i, reason }
                }
                other => other,
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for m in &self.matchers {
            m.validate_config()?;
        }
        Ok(())
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating FormationEngine instances
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    matchers: Vec<BuiltinMatcher>,
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing matcher list, e.g. deserialized from a config file
    pub fn from_matchers(matchers: impl IntoIterator<Item = BuiltinMatcher>) -> Self {
        Self {
            matchers: matchers.into_iter().collect(),
            config: EngineConfig::default(),
        }
    }

    /// Add all builtin formations with default configurations
    pub fn with_all_defaults(self) -> Self {
        self.with_triangle_defaults()
            .add(BuiltinMatcher::FallingWedge(Default::default()))
            .add(BuiltinMatcher::DoubleBottom(Default::default()))
            .add(BuiltinMatcher::InverseHeadAndShoulders(Default::default()))
    }

    /// Add ascending and descending triangles with defaults
    pub fn with_triangle_defaults(self) -> Self {
        self.add(BuiltinMatcher::AscendingTriangle(Default::default()))
            .add(BuiltinMatcher::DescendingTriangle(Default::default()))
    }

    /// Add a builtin matcher
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, matcher: BuiltinMatcher) -> Self {
        self.matchers.push(matcher);
        self
    }

    /// Add with config validation
    pub fn add_checked(mut self, matcher: BuiltinMatcher) -> Result<Self> {
        matcher.validate_config()?;
        self.matchers.push(matcher);
        Ok(self)
    }

    /// Enable/disable data validation
    pub fn validate_data(mut self, enable: bool) -> Self {
        self.config.validate_data = enable;
        self
    }

    /// Run only these formations
    pub fn only_formations(mut self, kinds: impl IntoIterator<Item = FormationKind>) -> Self {
        self.config.formation_filter = Some(kinds.into_iter().collect());
        self
    }

    /// Require every breakout to be less than `max_candles_ago` bars old
    pub fn fresh_breakouts(mut self, max_candles_ago: usize) -> Self {
        self.config.max_candles_ago = Some(max_candles_ago);
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<FormationEngine> {
        let mut matchers = self.matchers;
        if let Some(max) = self.config.max_candles_ago {
            for m in &mut matchers {
                m.breakout_mut().max_candles_ago = Some(max);
            }
        }

        let engine = FormationEngine {
            matchers,
            config: self.config,
        };
        engine.validate()?;
        Ok(engine)
    }
}

// ============================================================
// PARALLEL SCANNING
// ============================================================

use rayon::prelude::*;

/// Result of scanning a single instrument
#[derive(Debug)]
pub struct ScanResult {
    pub symbol: String,
    pub report: ScanReport,
}

/// Error from scanning a single instrument
#[derive(Debug)]
pub struct ScanError {
    pub symbol: String,
    pub error: PatternError,
}

/// Parallel scanning of multiple instruments
pub fn scan_parallel<'a, T, I>(
    engine: &FormationEngine,
    instruments: I,
) -> (Vec<ScanResult>, Vec<ScanError>)
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, bars)| {
            engine
                .scan(bars)
                .map(|report| ScanResult {
                    symbol: symbol.to_string(),
                    report,
                })
                .map_err(|error| ScanError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================

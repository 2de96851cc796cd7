//! # chartscan - chart pattern scanning engine
//!
//! Reduces OHLCV series to zigzag pivots, matches them (and the most recent
//! candles) against classical chart patterns, gates matches on indicator
//! clauses and breakout confirmation, scores them and returns ranked cards.
//!
//! ## Quick Start
//!
//! ```rust
//! use chartscan::prelude::*;
//!
//! // Any market-data source implements the provider boundary
//! let mut provider = InMemoryProvider::new();
//! let bars: Vec<PriceBar> = (0..120)
//!     .map(|i| {
//!         let c = 100.0 + (i as f64 * 0.3).sin() * 5.0;
//!         PriceBar::new(i * 60_000, c, c + 0.5, c - 0.5, c, 1000.0)
//!     })
//!     .collect();
//! provider.insert("BTC", Timeframe::M5, Series::new(bars).unwrap());
//!
//! let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
//! let request = ScanRequest::new(["BTC"], Timeframe::M5).limit(5);
//! let result = engine.scan(&provider, &request).unwrap();
//! assert!(result.cards.len() <= 5);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod breakout;
pub mod detectors;
pub mod filter;
pub mod indicators;
pub mod overlay;
pub mod params;
pub mod pivots;
pub mod scan;
pub mod scoring;

pub mod prelude {
    pub use crate::{
        // Breakout
        breakout::{confirmed_breakdown, confirmed_breakout, BreakoutDirection},
        // Detectors
        detectors::*,
        // Filters
        filter::{passes, FilterError, IndicatorFilter},
        // Overlays
        overlay::{Overlay, Overlays, Point, Style},
        // Parameters
        params::{
            get_period, get_ratio, DetectorParams, ParamMeta, ParamType, ParameterizedDetector,
            PivotConfig, ScanConfig,
        },
        // Pivots
        pivots::{extract_pivots, Pivot, PivotKind},
        // Scanning
        scan::{InMemoryProvider, OhlcvProvider, ScanRequest, ScanResult, SortKey, SymbolDiagnostics},
        // Scoring
        scoring::{Confidence, DefaultScoringModel, ScoringModel},
        // Engine
        BuiltinDetector,
        // Types
        Card,
        DetectionResult,
        Direction,
        EngineBuilder,
        Feature,
        Features,
        OHLCVExt,
        PatternDetector,
        PatternEngine,
        // Errors
        PatternError,
        PatternId,
        Period,
        PriceBar,
        Ratio,
        Result,
        Series,
        Timeframe,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors that can occur while configuring or running a scan
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

    #[error("Invalid series at index {index}: {reason}")]
    InvalidSeries { index: usize, reason: &'static str },

    #[error("Unknown pattern: {0}")]
    UnknownPattern(String),

    #[error("Invalid indicator filter: {0}")]
    Filter(#[from] filter::FilterError),
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

impl Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Ratio {
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

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Period {
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
    /// Bar open time in milliseconds since the epoch
    fn timestamp(&self) -> i64;
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn body(&self) -> f64 {
        (self.close() - self.open()).abs()
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn upper_shadow(&self) -> f64 {
        self.high() - self.open().max(self.close())
    }

    #[inline]
    fn lower_shadow(&self) -> f64 {
        self.open().min(self.close()) - self.low()
    }

    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    #[inline]
    fn is_bearish(&self) -> bool {
        self.close() < self.open()
    }

    /// Body as ratio of range. Returns None if range is ~0
    #[inline]
    fn body_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.body() / range)
    }

    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        let prices = [self.open(), self.high(), self.low(), self.close()];
        if prices.iter().any(|p| p.is_nan()) {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if prices.iter().any(|p| p.is_infinite()) {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        if prices.iter().any(|p| *p <= 0.0) {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "non-positive price",
            });
        }
        if self.high() < self.low() {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "high < low",
            });
        }
        if !self.volume().is_finite() || self.volume() < 0.0 {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "volume must be finite and non-negative",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV + ?Sized> OHLCVExt for T {}

/// One OHLCV bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    #[serde(rename = "t")]
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
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

    /// Copy any OHLCV implementor into a concrete bar
    pub fn from_ohlcv<T: OHLCV + ?Sized>(bar: &T) -> Self {
        Self::new(
            bar.timestamp(),
            bar.open(),
            bar.high(),
            bar.low(),
            bar.close(),
            bar.volume(),
        )
    }
}

impl OHLCV for PriceBar {
    fn timestamp(&self) -> i64 {
        self.timestamp
    }

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
}

// ============================================================
// SERIES
// ============================================================

/// Validated bar sequence: ascending, unique timestamps, consistent bars.
///
/// Every constructor checks the invariants, so detectors never re-validate.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Series {
    bars: Vec<PriceBar>,
}

impl Series {
    pub fn new(bars: Vec<PriceBar>) -> Result<Self> {
        for (i, bar) in bars.iter().enumerate() {
            bar.validate().map_err(|e| match e {
                PatternError::InvalidOHLCV { reason, .. } => {
                    PatternError::InvalidOHLCV { index: i, reason }
                }
                other => other,
            })?;
            if i > 0 && bar.timestamp <= bars[i - 1].timestamp {
                return Err(PatternError::InvalidSeries {
                    index: i,
                    reason: "timestamps must be strictly ascending",
                });
            }
        }
        Ok(Self { bars })
    }

    /// Build a series from any OHLCV implementor
    pub fn from_bars<T: OHLCV>(bars: &[T]) -> Result<Self> {
        Self::new(bars.iter().map(PriceBar::from_ohlcv).collect())
    }

    #[inline]
    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&PriceBar> {
        self.bars.get(index)
    }

    #[inline]
    pub fn last(&self) -> Option<&PriceBar> {
        self.bars.last()
    }

    /// The most recent `n` bars (the whole series when shorter)
    pub fn tail(&self, n: usize) -> Series {
        let start = self.bars.len().saturating_sub(n);
        Series {
            bars: self.bars[start..].to_vec(),
        }
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }
}

impl TryFrom<Vec<PriceBar>> for Series {
    type Error = PatternError;

    fn try_from(bars: Vec<PriceBar>) -> Result<Self> {
        Series::new(bars)
    }
}

impl<'de> Deserialize<'de> for Series {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            bars: Vec<PriceBar>,
        }
        let raw = Raw::deserialize(d)?;
        Series::new(raw.bars).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// TIMEFRAME
// ============================================================

macro_rules! define_timeframes {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// Supported bar intervals
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum Timeframe {
            $(#[serde(rename = $name)] $variant),*
        }

        impl Timeframe {
            pub const ALL: &'static [Timeframe] = &[$(Timeframe::$variant),*];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Timeframe::$variant => $name),*
                }
            }
        }

        impl FromStr for Timeframe {
            type Err = PatternError;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim() {
                    $($name => Ok(Timeframe::$variant),)*
                    _ => Err(PatternError::InvalidConfig(format!("unsupported timeframe `{s}`"))),
                }
            }
        }
    };
}

define_timeframes! {
    M1 => "1m",
    M3 => "3m",
    M5 => "5m",
    M15 => "15m",
    M30 => "30m",
    H1 => "1h",
    H2 => "2h",
    H4 => "4h",
    H6 => "6h",
    H12 => "12h",
    D1 => "1d",
}

impl Timeframe {
    /// 1m/3m/5m bars, where default pivot sensitivity is lowered
    #[inline]
    pub fn is_short_intraday(self) -> bool {
        matches!(self, Timeframe::M1 | Timeframe::M3 | Timeframe::M5)
    }
}

impl Default for Timeframe {
    fn default() -> Self {
        Timeframe::M5
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================
// PATTERN IDENTIFIERS
// ============================================================

/// Direction/bias of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Neutral,
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

macro_rules! define_pattern_ids {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// Closed set of patterns the engine can detect
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum PatternId {
            $(#[serde(rename = $name)] $variant),*
        }

        impl PatternId {
            pub const ALL: &'static [PatternId] = &[$(PatternId::$variant),*];

            /// Returns the wire name (e.g. `double_top`)
            #[inline]
            pub fn as_str(self) -> &'static str {
                match self {
                    $(PatternId::$variant => $name),*
                }
            }
        }

        impl FromStr for PatternId {
            type Err = PatternError;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim() {
                    $($name => Ok(PatternId::$variant),)*
                    other => Err(PatternError::UnknownPattern(other.to_string())),
                }
            }
        }
    };
}

define_pattern_ids! {
    AscendingTriangle => "ascending_triangle",
    DescendingTriangle => "descending_triangle",
    SymmetricalTriangle => "symmetrical_triangle",
    BullFlag => "bull_flag",
    BearFlag => "bear_flag",
    DoubleTop => "double_top",
    DoubleBottom => "double_bottom",
    HeadShoulders => "head_shoulders",
    InverseHeadShoulders => "inverse_head_shoulders",
    WedgeRising => "wedge_rising",
    WedgeFalling => "wedge_falling",
    EngulfingBull => "engulfing_bull",
    EngulfingBear => "engulfing_bear",
    Hammer => "hammer",
    ShootingStar => "shooting_star",
    Doji => "doji",
}

impl PatternId {
    /// Returns the typical/expected direction of this pattern.
    ///
    /// - `Direction::Bullish` - pattern typically resolves upward
    /// - `Direction::Bearish` - pattern typically resolves downward
    /// - `Direction::Neutral` - pattern has no directional bias
    pub fn typical_direction(self) -> Direction {
        match self {
            PatternId::AscendingTriangle
            | PatternId::BullFlag
            | PatternId::DoubleBottom
            | PatternId::InverseHeadShoulders
            | PatternId::WedgeFalling
            | PatternId::EngulfingBull
            | PatternId::Hammer => Direction::Bullish,
            PatternId::DescendingTriangle
            | PatternId::BearFlag
            | PatternId::DoubleTop
            | PatternId::HeadShoulders
            | PatternId::WedgeRising
            | PatternId::EngulfingBear
            | PatternId::ShootingStar => Direction::Bearish,
            PatternId::SymmetricalTriangle | PatternId::Doji => Direction::Neutral,
        }
    }

    /// Static prior probability that a match of this pattern plays out.
    ///
    /// Not learned: these are fixed per pattern and only adjusted by the scoring model.
    pub fn base_probability(self) -> f64 {
        match self {
            PatternId::AscendingTriangle => 0.62,
            PatternId::DescendingTriangle => 0.60,
            PatternId::SymmetricalTriangle => 0.55,
            PatternId::BullFlag => 0.63,
            PatternId::BearFlag => 0.61,
            PatternId::DoubleTop => 0.60,
            PatternId::DoubleBottom => 0.62,
            PatternId::HeadShoulders => 0.64,
            PatternId::InverseHeadShoulders => 0.65,
            PatternId::WedgeRising => 0.58,
            PatternId::WedgeFalling => 0.60,
            PatternId::EngulfingBull => 0.57,
            PatternId::EngulfingBear => 0.56,
            PatternId::Hammer => 0.55,
            PatternId::ShootingStar => 0.55,
            PatternId::Doji => 0.50,
        }
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================
// CARDS
// ============================================================

/// A single measured feature on a card
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Feature {
    Flag(bool),
    Number(f64),
}

impl Feature {
    /// Numeric view; flags read as 1.0 / 0.0
    pub fn as_f64(self) -> Option<f64> {
        match self {
            Feature::Number(v) => Some(v),
            Feature::Flag(b) => Some(if b { 1.0 } else { 0.0 }),
        }
    }
}

impl From<f64> for Feature {
    fn from(v: f64) -> Self {
        Feature::Number(v)
    }
}

impl From<bool> for Feature {
    fn from(b: bool) -> Self {
        Feature::Flag(b)
    }
}

impl From<usize> for Feature {
    fn from(v: usize) -> Self {
        Feature::Number(v as f64)
    }
}

/// Feature name -> value, ordered for deterministic output
pub type Features = BTreeMap<String, Feature>;

/// One confirmed pattern match - the engine's unit of output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub symbol: String,
    #[serde(rename = "tf")]
    pub timeframe: Timeframe,
    pub pattern: PatternId,
    /// Probability 0.0..=1.0
    pub prob: f64,
    pub confidence: scoring::Confidence,
    pub features: Features,
    pub overlays: overlay::Overlays,
}

impl Card {
    /// New card carrying the pattern's static prior
    pub fn new(symbol: &str, timeframe: Timeframe, pattern: PatternId) -> Self {
        let prob = pattern.base_probability();
        Self {
            symbol: symbol.to_string(),
            timeframe,
            pattern,
            prob,
            confidence: scoring::Confidence::classify(prob),
            features: Features::new(),
            overlays: overlay::Overlays::default(),
        }
    }

    pub fn feature(mut self, name: &str, value: impl Into<Feature>) -> Self {
        self.features.insert(name.to_string(), value.into());
        self
    }

    pub fn overlay(mut self, overlay: overlay::Overlay) -> Self {
        self.overlays.push(overlay);
        self
    }

    pub fn numeric_feature(&self, name: &str) -> Option<f64> {
        self.features.get(name).and_then(|f| f.as_f64())
    }
}

/// Outcome of one detector evaluation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectionResult {
    pub matched: bool,
    pub card: Option<Card>,
}

impl DetectionResult {
    #[inline]
    pub fn none() -> Self {
        Self::default()
    }

    #[inline]
    pub fn found(card: Card) -> Self {
        Self {
            matched: true,
            card: Some(card),
        }
    }

    #[inline]
    pub fn into_card(self) -> Option<Card> {
        if self.matched {
            self.card
        } else {
            None
        }
    }
}

// ============================================================
// PATTERN DETECTOR TRAIT
// ============================================================

/// Pattern detector: a pure function of its inputs and its own parameters
pub trait PatternDetector: Send + Sync {
    fn id(&self) -> PatternId;

    /// Pivots needed before the detector can match (0 for candle shapes)
    fn min_pivots(&self) -> usize;

    /// Bars needed before the detector can match
    fn min_bars(&self) -> usize;

    fn detect(
        &self,
        series: &Series,
        pivots: &[pivots::Pivot],
        timeframe: Timeframe,
        symbol: &str,
    ) -> Result<DetectionResult>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================
// BUILTIN DETECTORS - generated via macro
// ============================================================

use detectors::*;

/// Macro to generate BuiltinDetector enum without boilerplate
macro_rules! define_builtin_detectors {
    (
        $(
            $variant:ident($detector:ty)
        ),* $(,)?
    ) => {
        /// All builtin detectors - enum dispatch, one variant per pattern
        #[derive(Debug, Clone)]
        pub enum BuiltinDetector {
            $($variant($detector)),*
        }

        impl BuiltinDetector {
            #[inline]
            pub fn detect(
                &self,
                series: &Series,
                pivots: &[pivots::Pivot],
                timeframe: Timeframe,
                symbol: &str,
            ) -> Result<DetectionResult> {
                match self {
                    $(Self::$variant(d) => PatternDetector::detect(d, series, pivots, timeframe, symbol)),*
                }
            }

            #[inline]
            pub fn id(&self) -> PatternId {
                match self {
                    $(Self::$variant(d) => PatternDetector::id(d)),*
                }
            }

            #[inline]
            pub fn min_pivots(&self) -> usize {
                match self {
                    $(Self::$variant(d) => PatternDetector::min_pivots(d)),*
                }
            }

            #[inline]
            pub fn min_bars(&self) -> usize {
                match self {
                    $(Self::$variant(d) => PatternDetector::min_bars(d)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(d) => PatternDetector::validate_config(d)),*
                }
            }
        }
    };
}

define_builtin_detectors! {
    // Continuation
    AscendingTriangle(AscendingTriangleDetector),
    DescendingTriangle(DescendingTriangleDetector),
    SymmetricalTriangle(SymmetricalTriangleDetector),
    BullFlag(BullFlagDetector),
    BearFlag(BearFlagDetector),
    WedgeRising(WedgeRisingDetector),
    WedgeFalling(WedgeFallingDetector),

    // Reversal
    DoubleTop(DoubleTopDetector),
    DoubleBottom(DoubleBottomDetector),
    HeadShoulders(HeadShouldersDetector),
    InverseHeadShoulders(InverseHeadShouldersDetector),

    // Candle
    EngulfingBull(EngulfingBullDetector),
    EngulfingBear(EngulfingBearDetector),
    Hammer(HammerDetector),
    ShootingStar(ShootingStarDetector),
    Doji(DojiDetector),
}

// ============================================================
// PATTERN ENGINE
// ============================================================

/// Pattern names and timeframes an engine accepts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Description {
    pub patterns: Vec<&'static str>,
    pub tfs: Vec<&'static str>,
}

/// Main scanning engine: an immutable detector table plus scoring and config
pub struct PatternEngine<S: scoring::ScoringModel = scoring::DefaultScoringModel> {
    registry: BTreeMap<PatternId, BuiltinDetector>,
    scoring: S,
    config: params::ScanConfig,
}

impl<S: scoring::ScoringModel> PatternEngine<S> {
    #[inline]
    pub fn config(&self) -> &params::ScanConfig {
        &self.config
    }

    #[inline]
    pub fn scoring(&self) -> &S {
        &self.scoring
    }

    /// Registered detector for a pattern
    #[inline]
    pub fn detector(&self, id: PatternId) -> Option<&BuiltinDetector> {
        self.registry.get(&id)
    }

    /// Registered patterns in registry order
    pub fn patterns(&self) -> impl Iterator<Item = PatternId> + '_ {
        self.registry.keys().copied()
    }

    pub fn describe(&self) -> Description {
        Description {
            patterns: self.patterns().map(PatternId::as_str).collect(),
            tfs: Timeframe::ALL.iter().map(|tf| tf.as_str()).collect(),
        }
    }

    /// Zigzag pivots using the engine's pivot configuration
    pub fn extract_pivots(&self, series: &Series, sensitivity: f64) -> Vec<pivots::Pivot> {
        pivots::extract_pivots_with(series, sensitivity, &self.config.pivots)
    }

    /// Run one registered detector.
    ///
    /// Too few pivots or bars is a non-match, never an error.
    pub fn detect(
        &self,
        id: PatternId,
        series: &Series,
        pivots: &[pivots::Pivot],
        timeframe: Timeframe,
        symbol: &str,
    ) -> Result<DetectionResult> {
        let detector = self
            .detector(id)
            .ok_or_else(|| PatternError::UnknownPattern(id.as_str().to_string()))?;
        if pivots.len() < detector.min_pivots() || series.len() < detector.min_bars() {
            return Ok(DetectionResult::none());
        }
        detector.detect(series, pivots, timeframe, symbol)
    }

    fn validate(&self) -> Result<()> {
        self.config.validate()?;
        for d in self.registry.values() {
            d.validate_config()?;
        }
        Ok(())
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating PatternEngine instances.
///
/// `with_*_defaults` read detector parameters from the current config, so set
/// [`EngineBuilder::config`] first when tuning.
pub struct EngineBuilder<S: scoring::ScoringModel = scoring::DefaultScoringModel> {
    scoring: S,
    builtin: Vec<BuiltinDetector>,
    config: params::ScanConfig,
}

impl Default for EngineBuilder<scoring::DefaultScoringModel> {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder<scoring::DefaultScoringModel> {
    pub fn new() -> Self {
        Self {
            scoring: scoring::DefaultScoringModel::default(),
            builtin: Vec::new(),
            config: params::ScanConfig::default(),
        }
    }

    /// Replace the config; the default scoring model follows its weights
    pub fn config(mut self, config: params::ScanConfig) -> Self {
        self.scoring = scoring::DefaultScoringModel::new(config.scoring.clone());
        self.config = config;
        self
    }
}

impl<S: scoring::ScoringModel> EngineBuilder<S> {
    /// Change scoring model
    pub fn scoring_model<S2: scoring::ScoringModel>(self, scoring: S2) -> EngineBuilder<S2> {
        EngineBuilder {
            scoring,
            builtin: self.builtin,
            config: self.config,
        }
    }

    /// Add every builtin pattern
    pub fn with_all_defaults(self) -> Self {
        self.with_continuation_defaults()
            .with_reversal_defaults()
            .with_candle_defaults()
    }

    /// Triangles, flags and wedges (7)
    pub fn with_continuation_defaults(mut self) -> Self {
        let p = &self.config.detectors;
        let detectors = [
            BuiltinDetector::AscendingTriangle(AscendingTriangleDetector::new(p.triangle.clone())),
            BuiltinDetector::DescendingTriangle(DescendingTriangleDetector::new(
                p.triangle.clone(),
            )),
            BuiltinDetector::SymmetricalTriangle(SymmetricalTriangleDetector::new(
                p.triangle.clone(),
            )),
            BuiltinDetector::BullFlag(BullFlagDetector::new(p.flag.clone())),
            BuiltinDetector::BearFlag(BearFlagDetector::new(p.flag.clone())),
            BuiltinDetector::WedgeRising(WedgeRisingDetector::new(p.wedge.clone())),
            BuiltinDetector::WedgeFalling(WedgeFallingDetector::new(p.wedge.clone())),
        ];
        self.builtin.extend(detectors);
        self
    }

    /// Double top/bottom and head-and-shoulders (4)
    pub fn with_reversal_defaults(mut self) -> Self {
        let p = &self.config.detectors;
        let detectors = [
            BuiltinDetector::DoubleTop(DoubleTopDetector::new(p.double.clone())),
            BuiltinDetector::DoubleBottom(DoubleBottomDetector::new(p.double.clone())),
            BuiltinDetector::HeadShoulders(HeadShouldersDetector::new(p.head_shoulders.clone())),
            BuiltinDetector::InverseHeadShoulders(InverseHeadShouldersDetector::new(
                p.head_shoulders.clone(),
            )),
        ];
        self.builtin.extend(detectors);
        self
    }

    /// Single and two-bar candle shapes (5)
    pub fn with_candle_defaults(mut self) -> Self {
        let p = &self.config.detectors;
        let detectors = [
            BuiltinDetector::EngulfingBull(EngulfingBullDetector::new(p.candle.clone())),
            BuiltinDetector::EngulfingBear(EngulfingBearDetector::new(p.candle.clone())),
            BuiltinDetector::Hammer(HammerDetector::new(p.candle.clone())),
            BuiltinDetector::ShootingStar(ShootingStarDetector::new(p.candle.clone())),
            BuiltinDetector::Doji(DojiDetector::new(p.candle.clone())),
        ];
        self.builtin.extend(detectors);
        self
    }

    /// Add a builtin detector; a later detector for the same pattern replaces an earlier one
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, detector: BuiltinDetector) -> Self {
        self.builtin.push(detector);
        self
    }

    /// Add with config validation
    pub fn add_checked(mut self, detector: BuiltinDetector) -> Result<Self> {
        detector.validate_config()?;
        self.builtin.push(detector);
        Ok(self)
    }

    /// Set the minimum history floor
    pub fn min_history_bars(mut self, bars: usize) -> Self {
        self.config.min_history_bars = bars;
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<PatternEngine<S>> {
        let mut registry = BTreeMap::new();
        for detector in self.builtin {
            registry.insert(detector.id(), detector);
        }
        let engine = PatternEngine {
            registry,
            scoring: self.scoring,
            config: self.config,
        };
        engine.validate()?;
        Ok(engine)
    }
}

// ============================================================
// TESTS
// ============================================================

//! Scan orchestration
//!
//! Per symbol: load the series, enforce the history floor, apply the
//! indicator filter, extract pivots once, run each requested detector, gate
//! on a confirmed breakout when asked, score. Cards from all symbols are then
//! sorted and truncated to the request limit.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    breakout,
    filter::IndicatorFilter,
    pivots::Pivot,
    scoring::{ScoringModel, FEATURE_RECENT_BREAKOUT},
    Card, Feature, Features, PatternEngine, PatternError, PatternId, Result, Series, Timeframe,
};

// ============================================================
// PROVIDER
// ============================================================

/// Market data boundary
pub trait OhlcvProvider: Send + Sync {
    /// Up to `bars` most recent bars, `None` when the symbol has no data
    fn load(&self, symbol: &str, timeframe: Timeframe, bars: usize) -> Option<Series>;
}

impl<F> OhlcvProvider for F
where
    F: Fn(&str, Timeframe, usize) -> Option<Series> + Send + Sync,
{
    fn load(&self, symbol: &str, timeframe: Timeframe, bars: usize) -> Option<Series> {
        self(symbol, timeframe, bars)
    }
}

/// Provider over series held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    series: HashMap<(String, Timeframe), Series>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: &str, timeframe: Timeframe, series: Series) {
        self.series.insert((symbol.to_string(), timeframe), series);
    }

    pub fn with(mut self, symbol: &str, timeframe: Timeframe, series: Series) -> Self {
        self.insert(symbol, timeframe, series);
        self
    }
}

impl OhlcvProvider for InMemoryProvider {
    fn load(&self, symbol: &str, timeframe: Timeframe, bars: usize) -> Option<Series> {
        self.series
            .get(&(symbol.to_string(), timeframe))
            .map(|s| s.tail(bars))
    }
}

// ============================================================
// REQUEST / RESULT
// ============================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Highest probability first
    #[default]
    Prob,
    /// Lowest probability first
    ProbAsc,
}

/// One scan over a symbol universe on one timeframe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanRequest {
    pub symbols: Vec<String>,
    #[serde(rename = "tf")]
    pub timeframe: Timeframe,
    /// Pattern names; unknown names are skipped
    pub patterns: Vec<String>,
    pub indicator_filters: Vec<String>,
    /// Require a confirmed breakout within `recency_bars`
    pub recent_breakout: bool,
    pub recency_bars: usize,
    /// Trailing bars loaded per symbol
    pub bars: usize,
    pub sort: SortKey,
    pub limit: usize,
    pub sensitivity: f64,
}

impl Default for ScanRequest {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            timeframe: Timeframe::default(),
            patterns: PatternId::ALL.iter().map(|p| p.as_str().to_string()).collect(),
            indicator_filters: Vec::new(),
            recent_breakout: false,
            recency_bars: 5,
            bars: 720,
            sort: SortKey::Prob,
            limit: 12,
            sensitivity: 1.0,
        }
    }
}

impl ScanRequest {
    pub fn new<I, S>(symbols: I, timeframe: Timeframe) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
            timeframe,
            ..Self::default()
        }
    }

    pub fn patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn filters<I, S>(mut self, clauses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indicator_filters = clauses.into_iter().map(Into::into).collect();
        self
    }

    /// Keep only cards confirmed by a breakout within `recency_bars`
    pub fn recent_breakout(mut self, recency_bars: usize) -> Self {
        self.recent_breakout = true;
        self.recency_bars = recency_bars;
        self
    }

    pub fn bars(mut self, bars: usize) -> Self {
        self.bars = bars;
        self
    }

    pub fn sort(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn sensitivity(mut self, sensitivity: f64) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    /// Sensitivity after the short-timeframe substitution: a default 1.0 on
    /// 1m/3m/5m bars becomes `short_tf_sensitivity`
    pub fn effective_sensitivity(&self, short_tf_sensitivity: f64) -> f64 {
        if (self.sensitivity - 1.0).abs() < f64::EPSILON && self.timeframe.is_short_intraday() {
            short_tf_sensitivity
        } else {
            self.sensitivity
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.sensitivity.is_finite() || self.sensitivity <= 0.0 {
            return Err(PatternError::OutOfRange {
                field: "sensitivity",
                value: self.sensitivity,
                min: f64::MIN_POSITIVE,
                max: f64::MAX,
            });
        }
        if self.bars == 0 {
            return Err(PatternError::InvalidValue("bars must be > 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub cards: Vec<Card>,
}

// ============================================================
// DIAGNOSTICS
// ============================================================

/// Why a symbol produced no detector runs
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoData,
    InsufficientHistory { have: usize, need: usize },
    Filtered { clause: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoData => write!(f, "no data"),
            SkipReason::InsufficientHistory { have, need } => {
                write!(f, "insufficient history: {have} bars, need {need}")
            }
            SkipReason::Filtered { clause } => write!(f, "filtered by {clause}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DetectorOutcome {
    Evaluated {
        matched: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        prob: Option<f64>,
        features: Features,
    },
    Error {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectorDiagnostic {
    pub pattern: String,
    #[serde(flatten)]
    pub outcome: DetectorOutcome,
}

/// Everything one symbol went through during a scan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolDiagnostics {
    pub symbol: String,
    #[serde(rename = "tf")]
    pub timeframe: Timeframe,
    pub sensitivity: f64,
    pub bars: usize,
    pub pivots: Vec<Pivot>,
    pub patterns: Vec<DetectorDiagnostic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

// ============================================================
// ENGINE
// ============================================================

/// A request resolved against the engine
struct ScanPlan {
    patterns: Vec<PatternId>,
    filter: IndicatorFilter,
    sensitivity: f64,
}

impl<S: ScoringModel> PatternEngine<S> {
    /// Scan every symbol sequentially
    pub fn scan<P: OhlcvProvider + ?Sized>(
        &self,
        provider: &P,
        request: &ScanRequest,
    ) -> Result<ScanResult> {
        let plan = self.plan(request)?;
        let cards = request
            .symbols
            .iter()
            .flat_map(|symbol| self.scan_symbol(provider, symbol, request, &plan))
            .collect();
        Ok(rank(cards, request))
    }

    /// Same result as [`PatternEngine::scan`], with symbols spread over the rayon pool
    pub fn scan_parallel<P: OhlcvProvider + ?Sized>(
        &self,
        provider: &P,
        request: &ScanRequest,
    ) -> Result<ScanResult> {
        let plan = self.plan(request)?;
        let per_symbol: Vec<Vec<Card>> = request
            .symbols
            .par_iter()
            .map(|symbol| self.scan_symbol(provider, symbol, request, &plan))
            .collect();
        Ok(rank(per_symbol.into_iter().flatten().collect(), request))
    }

    /// Run the request once per timeframe
    pub fn scan_multi_timeframe<P: OhlcvProvider + ?Sized>(
        &self,
        provider: &P,
        request: &ScanRequest,
        timeframes: &[Timeframe],
    ) -> Result<BTreeMap<Timeframe, ScanResult>> {
        timeframes
            .iter()
            .map(|&timeframe| {
                let request = ScanRequest {
                    timeframe,
                    ..request.clone()
                };
                Ok((timeframe, self.scan(provider, &request)?))
            })
            .collect()
    }

    /// Per-symbol pivots and per-pattern outcomes, matched or not.
    ///
    /// Unknown pattern names are reported instead of skipped; the breakout
    /// gate and the result limit are not applied.
    pub fn diagnose<P: OhlcvProvider + ?Sized>(
        &self,
        provider: &P,
        request: &ScanRequest,
    ) -> Result<Vec<SymbolDiagnostics>> {
        let plan = self.plan(request)?;
        Ok(request
            .symbols
            .iter()
            .map(|symbol| self.diagnose_symbol(provider, symbol, request, &plan))
            .collect())
    }

    fn plan(&self, request: &ScanRequest) -> Result<ScanPlan> {
        request.validate()?;
        let filter = IndicatorFilter::compile(&request.indicator_filters, &self.config().filter)?;
        let mut patterns = Vec::new();
        for name in &request.patterns {
            match name.parse::<PatternId>() {
                Ok(id) if self.detector(id).is_none() => {
                    debug!(pattern = %id, "pattern not registered, skipping");
                }
                Ok(id) => {
                    if !patterns.contains(&id) {
                        patterns.push(id);
                    }
                }
                Err(_) => debug!(pattern = %name, "unknown pattern, skipping"),
            }
        }
        Ok(ScanPlan {
            patterns,
            filter,
            sensitivity: request.effective_sensitivity(self.config().short_tf_sensitivity),
        })
    }

    fn prepare<P: OhlcvProvider + ?Sized>(
        &self,
        provider: &P,
        symbol: &str,
        request: &ScanRequest,
        plan: &ScanPlan,
    ) -> std::result::Result<Series, SkipReason> {
        let mut series = provider
            .load(symbol, request.timeframe, request.bars)
            .ok_or(SkipReason::NoData)?;
        if series.len() > request.bars {
            series = series.tail(request.bars);
        }
        let need = self.config().min_history_bars;
        if series.len() < need {
            return Err(SkipReason::InsufficientHistory {
                have: series.len(),
                need,
            });
        }
        if let Some(clause) = plan.filter.first_failure(&series) {
            return Err(SkipReason::Filtered {
                clause: clause.source().to_string(),
            });
        }
        Ok(series)
    }

    fn scan_symbol<P: OhlcvProvider + ?Sized>(
        &self,
        provider: &P,
        symbol: &str,
        request: &ScanRequest,
        plan: &ScanPlan,
    ) -> Vec<Card> {
        let series = match self.prepare(provider, symbol, request, plan) {
            Ok(series) => series,
            Err(reason) => {
                debug!(symbol, %reason, "symbol skipped");
                return Vec::new();
            }
        };
        let pivots = self.extract_pivots(&series, plan.sensitivity);

        let mut cards = Vec::new();
        for &id in &plan.patterns {
            let result = match self.detect(id, &series, &pivots, request.timeframe, symbol) {
                Ok(result) => result,
                Err(e) => {
                    warn!(symbol, pattern = %id, error = %e, "detector failed, skipping");
                    continue;
                }
            };
            let Some(card) = result.into_card() else {
                continue;
            };
            if let Some(card) = self.gate_and_score(card, &series, request) {
                cards.push(card);
            }
        }
        debug!(symbol, pivots = pivots.len(), cards = cards.len(), "symbol scanned");
        cards
    }

    /// Drop the card when the breakout gate is requested and unconfirmed,
    /// otherwise score it
    fn gate_and_score(&self, mut card: Card, series: &Series, request: &ScanRequest) -> Option<Card> {
        if request.recent_breakout {
            let cfg = &self.config().breakout;
            let confirmed = cfg.policy.directions(card.pattern).iter().any(|&direction| {
                breakout::confirmed(
                    series,
                    cfg.lookback.get(),
                    request.recency_bars,
                    direction,
                    cfg.volume_multiple,
                )
            });
            if !confirmed {
                debug!(symbol = %card.symbol, pattern = %card.pattern, "no confirmed breakout");
                return None;
            }
            card.features
                .insert(FEATURE_RECENT_BREAKOUT.to_string(), Feature::Flag(true));
        }
        self.score(&mut card);
        Some(card)
    }

    fn score(&self, card: &mut Card) {
        let (prob, confidence) = self
            .scoring()
            .score(card.pattern.base_probability(), &card.features);
        card.prob = prob;
        card.confidence = confidence;
    }

    fn diagnose_symbol<P: OhlcvProvider + ?Sized>(
        &self,
        provider: &P,
        symbol: &str,
        request: &ScanRequest,
        plan: &ScanPlan,
    ) -> SymbolDiagnostics {
        let mut diag = SymbolDiagnostics {
            symbol: symbol.to_string(),
            timeframe: request.timeframe,
            sensitivity: plan.sensitivity,
            bars: 0,
            pivots: Vec::new(),
            patterns: Vec::new(),
            skipped: None,
        };
        let series = match self.prepare(provider, symbol, request, plan) {
            Ok(series) => series,
            Err(reason) => {
                if let SkipReason::InsufficientHistory { have, .. } = reason {
                    diag.bars = have;
                }
                diag.skipped = Some(reason.to_string());
                return diag;
            }
        };
        diag.bars = series.len();
        diag.pivots = self.extract_pivots(&series, plan.sensitivity);

        let mut seen = Vec::new();
        for name in &request.patterns {
            if seen.contains(name) {
                continue;
            }
            seen.push(name.clone());
            let outcome = match name.parse::<PatternId>() {
                Err(_) => DetectorOutcome::Error {
                    error: "unknown pattern".to_string(),
                },
                Ok(id) => match self.detect(id, &series, &diag.pivots, request.timeframe, symbol) {
                    Ok(result) => match result.into_card() {
                        Some(mut card) => {
                            self.score(&mut card);
                            DetectorOutcome::Evaluated {
                                matched: true,
                                prob: Some(card.prob),
                                features: card.features,
                            }
                        }
                        None => DetectorOutcome::Evaluated {
                            matched: false,
                            prob: None,
                            features: Features::new(),
                        },
                    },
                    Err(e) => DetectorOutcome::Error {
                        error: e.to_string(),
                    },
                },
            };
            diag.patterns.push(DetectorDiagnostic {
                pattern: name.clone(),
                outcome,
            });
        }
        diag
    }
}

/// Stable sort by probability, then truncate
fn rank(mut cards: Vec<Card>, request: &ScanRequest) -> ScanResult {
    match request.sort {
        SortKey::Prob => cards.sort_by(|a, b| b.prob.total_cmp(&a.prob)),
        SortKey::ProbAsc => cards.sort_by(|a, b| a.prob.total_cmp(&b.prob)),
    }
    let found = cards.len();
    cards.truncate(request.limit);
    info!(
        tf = %request.timeframe,
        symbols = request.symbols.len(),
        found,
        returned = cards.len(),
        "scan complete"
    );
    ScanResult { cards }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PriceBar;

    #[test]
    fn test_request_defaults() {
        let req: ScanRequest = serde_json::from_str(r#"{"symbols": ["BTC"], "tf": "15m"}"#).unwrap();
        assert_eq!(req.timeframe, Timeframe::M15);
        assert_eq!(req.patterns.len(), 16);
        assert_eq!(req.recency_bars, 5);
        assert_eq!(req.bars, 720);
        assert_eq!(req.limit, 12);
        assert_eq!(req.sort, SortKey::Prob);
        assert!(!req.recent_breakout);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_sort_key_names() {
        let req: ScanRequest = serde_json::from_str(r#"{"sort": "prob_asc"}"#).unwrap();
        assert_eq!(req.sort, SortKey::ProbAsc);
    }

    #[test]
    fn test_effective_sensitivity() {
        let short = ScanRequest::new(["A"], Timeframe::M3);
        assert_eq!(short.effective_sensitivity(0.6), 0.6);
        assert_eq!(short.clone().sensitivity(1.4).effective_sensitivity(0.6), 1.4);
        let long = ScanRequest::new(["A"], Timeframe::H1);
        assert_eq!(long.effective_sensitivity(0.6), 1.0);
    }

    #[test]
    fn test_invalid_request() {
        assert!(ScanRequest::new(["A"], Timeframe::H1).sensitivity(0.0).validate().is_err());
        assert!(ScanRequest::new(["A"], Timeframe::H1).bars(0).validate().is_err());
    }

    #[test]
    fn test_in_memory_provider_truncates() {
        let bars = (0..10)
            .map(|i| PriceBar::new(i, 10.0, 11.0, 9.0, 10.0, 1.0))
            .collect();
        let provider = InMemoryProvider::new().with("A", Timeframe::H1, Series::new(bars).unwrap());
        assert_eq!(provider.load("A", Timeframe::H1, 4).unwrap().len(), 4);
        assert!(provider.load("A", Timeframe::H4, 4).is_none());
        assert!(provider.load("B", Timeframe::H1, 4).is_none());
    }

    #[test]
    fn test_closure_provider() {
        let provider = |_: &str, _: Timeframe, _: usize| -> Option<Series> { None };
        let engine = crate::EngineBuilder::new().with_all_defaults().build().unwrap();
        let result = engine
            .scan(&provider, &ScanRequest::new(["A", "B"], Timeframe::H1))
            .unwrap();
        assert!(result.cards.is_empty());
    }

    #[test]
    fn test_skip_reason_display() {
        let r = SkipReason::InsufficientHistory { have: 30, need: 50 };
        assert_eq!(r.to_string(), "insufficient history: 30 bars, need 50");
    }
}

//! Integration tests for end-to-end scans.

use chartscan::prelude::*;
use chartscan::scan::DetectorOutcome;

const MINUTE: i64 = 60_000;

/// Simple test bar structure
#[derive(Debug, Clone, Copy)]
struct TestBar {
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

impl TestBar {
    fn new(i: usize, o: f64, h: f64, l: f64, c: f64, v: f64) -> Self {
        Self {
            t: i as i64 * MINUTE,
            o,
            h,
            l,
            c,
            v,
        }
    }
}

impl OHLCV for TestBar {
    fn timestamp(&self) -> i64 {
        self.t
    }

    fn open(&self) -> f64 {
        self.o
    }

    fn high(&self) -> f64 {
        self.h
    }

    fn low(&self) -> f64 {
        self.l
    }

    fn close(&self) -> f64 {
        self.c
    }

    fn volume(&self) -> f64 {
        self.v
    }
}

/// 58 range-bound bars (99..101) followed by two `(open, high, low, close)` bars
fn make_range_then(prev: (f64, f64, f64, f64), last: (f64, f64, f64, f64), last_volume: f64) -> Series {
    let mut bars: Vec<TestBar> = (0..58)
        .map(|i| {
            let c = if i % 2 == 0 { 100.5 } else { 99.5 };
            TestBar::new(i, c, 101.0, 99.0, c, 1000.0)
        })
        .collect();
    bars.push(TestBar::new(58, prev.0, prev.1, prev.2, prev.3, 1000.0));
    bars.push(TestBar::new(59, last.0, last.1, last.2, last.3, last_volume));
    Series::from_bars(&bars).unwrap()
}

/// A bearish bar engulfed by a bullish bar that closes above the range
fn make_breakout(last_volume: f64) -> Series {
    make_range_then((100.5, 101.0, 99.2, 99.5), (99.3, 103.2, 99.1, 103.0), last_volume)
}

/// A bullish bar engulfed by a bearish bar that closes below the range
fn make_breakdown(last_volume: f64) -> Series {
    make_range_then((99.5, 101.0, 99.2, 100.5), (100.7, 100.9, 96.8, 97.0), last_volume)
}

/// A shooting star whose close still clears the top of the range
fn make_star_above_range(last_volume: f64) -> Series {
    make_range_then((100.5, 101.0, 99.2, 99.5), (101.5, 104.0, 101.1, 101.2), last_volume)
}

/// Linear closes through `(bar, close)` anchors
fn make_ramp(anchors: &[(usize, f64)]) -> Series {
    let mut bars = Vec::new();
    for w in anchors.windows(2) {
        let ((i0, c0), (i1, c1)) = (w[0], w[1]);
        let start = if bars.is_empty() { i0 } else { i0 + 1 };
        for i in start..=i1 {
            let c = c0 + (c1 - c0) * (i - i0) as f64 / (i1 - i0) as f64;
            bars.push(TestBar::new(i, c, c + 0.2, c - 0.2, c, 1000.0));
        }
    }
    Series::from_bars(&bars).unwrap()
}

fn make_double_top() -> Series {
    make_ramp(&[(0, 100.0), (15, 115.0), (25, 105.0), (40, 115.0), (50, 104.0), (59, 100.0)])
}

fn engine() -> PatternEngine {
    EngineBuilder::new().with_all_defaults().build().unwrap()
}

#[test]
fn test_insufficient_history_yields_nothing() {
    let short = make_ramp(&[(0, 100.0), (29, 110.0)]);
    let provider = InMemoryProvider::new().with("SHORT", Timeframe::H1, short);
    let result = engine()
        .scan(&provider, &ScanRequest::new(["SHORT"], Timeframe::H1))
        .unwrap();
    assert!(result.cards.is_empty());
}

#[test]
fn test_missing_symbol_yields_nothing() {
    let provider = InMemoryProvider::new();
    let result = engine()
        .scan(&provider, &ScanRequest::new(["NOPE"], Timeframe::H1))
        .unwrap();
    assert!(result.cards.is_empty());
}

#[test]
fn test_unknown_pattern_is_skipped() {
    let provider = InMemoryProvider::new().with("BTC", Timeframe::H1, make_breakout(5000.0));
    let request =
        ScanRequest::new(["BTC"], Timeframe::H1).patterns(["not_a_real_pattern", "engulfing_bull"]);
    let result = engine().scan(&provider, &request).unwrap();
    assert_eq!(result.cards.len(), 1);
    assert_eq!(result.cards[0].pattern, PatternId::EngulfingBull);
    assert_eq!(result.cards[0].symbol, "BTC");
    assert_eq!(result.cards[0].timeframe, Timeframe::H1);
}

#[test]
fn test_duplicate_patterns_run_once() {
    let provider = InMemoryProvider::new().with("BTC", Timeframe::H1, make_breakout(5000.0));
    let request =
        ScanRequest::new(["BTC"], Timeframe::H1).patterns(["engulfing_bull", "engulfing_bull"]);
    assert_eq!(engine().scan(&provider, &request).unwrap().cards.len(), 1);
}

#[test]
fn test_breakout_gate_keeps_confirmed_card() {
    let provider = InMemoryProvider::new().with("BTC", Timeframe::H1, make_breakout(5000.0));
    let request = ScanRequest::new(["BTC"], Timeframe::H1)
        .patterns(["engulfing_bull"])
        .recent_breakout(5);
    let result = engine().scan(&provider, &request).unwrap();
    assert_eq!(result.cards.len(), 1);
    let card = &result.cards[0];
    assert_eq!(card.features.get("recent_breakout"), Some(&Feature::Flag(true)));
}

#[test]
fn test_breakout_gate_drops_unconfirmed_card() {
    let provider = InMemoryProvider::new().with("BTC", Timeframe::H1, make_breakout(1000.0));
    let ungated = ScanRequest::new(["BTC"], Timeframe::H1).patterns(["engulfing_bull"]);
    assert_eq!(engine().scan(&provider, &ungated).unwrap().cards.len(), 1);

    let gated = ungated.recent_breakout(5);
    assert!(engine().scan(&provider, &gated).unwrap().cards.is_empty());
}

#[test]
fn test_bearish_pattern_confirmed_by_breakdown() {
    let provider = InMemoryProvider::new()
        .with("UP", Timeframe::H1, make_breakout(5000.0))
        .with("DOWN", Timeframe::H1, make_breakdown(2000.0))
        .with("QUIET", Timeframe::H1, make_breakdown(1000.0));
    let request = ScanRequest::new(["UP", "DOWN", "QUIET"], Timeframe::H1)
        .patterns(["engulfing_bull", "engulfing_bear"]);

    // Without the gate each series yields its engulfing card
    assert_eq!(engine().scan(&provider, &request).unwrap().cards.len(), 3);

    let gated = engine().scan(&provider, &request.recent_breakout(5)).unwrap();
    let kept: Vec<(&str, PatternId)> = gated
        .cards
        .iter()
        .map(|c| (c.symbol.as_str(), c.pattern))
        .collect();
    assert_eq!(kept.len(), 2);
    assert!(kept.contains(&("UP", PatternId::EngulfingBull)));
    assert!(kept.contains(&("DOWN", PatternId::EngulfingBear)));
    let bear = gated.cards.iter().find(|c| c.symbol == "DOWN").unwrap();
    assert_eq!(bear.features.get("recent_breakout"), Some(&Feature::Flag(true)));
}

#[test]
fn test_upside_break_does_not_confirm_bearish_pattern() {
    let provider = InMemoryProvider::new().with("BTC", Timeframe::H1, make_star_above_range(2000.0));
    let request = ScanRequest::new(["BTC"], Timeframe::H1).patterns(["shooting_star"]);
    assert_eq!(engine().scan(&provider, &request).unwrap().cards.len(), 1);
    assert!(engine()
        .scan(&provider, &request.recent_breakout(5))
        .unwrap()
        .cards
        .is_empty());
}

#[test]
fn test_up_only_policy_ignores_polarity() {
    let config = ScanConfig::from_toml_str("[breakout]\npolicy = \"up_only\"").unwrap();
    let engine = EngineBuilder::new().config(config).with_all_defaults().build().unwrap();

    // Upside break keeps a bearish card
    let star = InMemoryProvider::new().with("BTC", Timeframe::H1, make_star_above_range(2000.0));
    let request = ScanRequest::new(["BTC"], Timeframe::H1)
        .patterns(["shooting_star"])
        .recent_breakout(5);
    let result = engine.scan(&star, &request).unwrap();
    assert_eq!(result.cards.len(), 1);
    assert_eq!(result.cards[0].pattern, PatternId::ShootingStar);

    // Breakdown no longer confirms it
    let down = InMemoryProvider::new().with("BTC", Timeframe::H1, make_breakdown(2000.0));
    let request = request.patterns(["engulfing_bear"]);
    assert!(engine.scan(&down, &request).unwrap().cards.is_empty());
}

#[test]
fn test_double_top_end_to_end() {
    let provider = InMemoryProvider::new().with("ETH", Timeframe::H1, make_double_top());
    let request = ScanRequest::new(["ETH"], Timeframe::H1).patterns(["double_top"]);
    let result = engine().scan(&provider, &request).unwrap();
    assert_eq!(result.cards.len(), 1);
    let card = &result.cards[0];
    assert_eq!(card.pattern, PatternId::DoubleTop);
    assert!((0.0..=1.0).contains(&card.prob));
    assert!(card.prob >= PatternId::DoubleTop.base_probability());
    assert!(!card.overlays.is_empty());
}

#[test]
fn test_lower_second_peak_is_not_double_top() {
    let series =
        make_ramp(&[(0, 100.0), (15, 115.0), (25, 105.0), (40, 110.0), (50, 101.0), (59, 98.0)]);
    let provider = InMemoryProvider::new().with("ETH", Timeframe::H1, series);
    let request = ScanRequest::new(["ETH"], Timeframe::H1).patterns(["double_top"]);
    assert!(engine().scan(&provider, &request).unwrap().cards.is_empty());
}

/// Every card gets the same probability
struct FlatScore;

impl ScoringModel for FlatScore {
    fn score(&self, _base_probability: f64, _features: &Features) -> (f64, Confidence) {
        (0.5, Confidence::Low)
    }
}

fn same_series_provider() -> InMemoryProvider {
    ["Z", "A", "M"]
        .into_iter()
        .fold(InMemoryProvider::new(), |p, s| p.with(s, Timeframe::H1, make_double_top()))
}

#[test]
fn test_ties_keep_discovery_order() {
    let provider = same_series_provider();
    let request = ScanRequest::new(["Z", "A", "M"], Timeframe::H1).patterns(["doji", "double_top"]);
    let engine = EngineBuilder::new()
        .with_all_defaults()
        .scoring_model(FlatScore)
        .build()
        .unwrap();

    let expected = vec![
        ("Z", PatternId::Doji),
        ("Z", PatternId::DoubleTop),
        ("A", PatternId::Doji),
        ("A", PatternId::DoubleTop),
        ("M", PatternId::Doji),
        ("M", PatternId::DoubleTop),
    ];
    for result in [
        engine.scan(&provider, &request).unwrap(),
        engine.scan_parallel(&provider, &request).unwrap(),
    ] {
        let order: Vec<(&str, PatternId)> = result
            .cards
            .iter()
            .map(|c| (c.symbol.as_str(), c.pattern))
            .collect();
        assert_eq!(order, expected);
    }
}

#[test]
fn test_equal_probabilities_stay_symbol_major() {
    let provider = same_series_provider();
    let request = ScanRequest::new(["Z", "A", "M"], Timeframe::H1).patterns(["doji", "double_top"]);
    let result = engine().scan(&provider, &request).unwrap();
    assert_eq!(result.cards.len(), 6);
    for pattern in [PatternId::Doji, PatternId::DoubleTop] {
        let run: Vec<&Card> = result.cards.iter().filter(|c| c.pattern == pattern).collect();
        let symbols: Vec<&str> = run.iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["Z", "A", "M"]);
        assert!(run.windows(2).all(|w| w[0].prob == w[1].prob));
    }
    assert!(result.cards.windows(2).all(|w| w[0].prob >= w[1].prob));
}

fn ranked_provider() -> InMemoryProvider {
    InMemoryProvider::new()
        .with("A", Timeframe::H1, make_breakout(1000.0))
        .with("B", Timeframe::H1, make_breakout(1500.0))
        .with("C", Timeframe::H1, make_breakout(3000.0))
}

#[test]
fn test_sort_and_limit() {
    let provider = ranked_provider();
    let request = ScanRequest::new(["A", "B", "C"], Timeframe::H1)
        .patterns(["engulfing_bull"])
        .limit(2);
    let result = engine().scan(&provider, &request).unwrap();
    let symbols: Vec<&str> = result.cards.iter().map(|c| c.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["C", "B"]);

    let asc = engine().scan(&provider, &request.clone().sort(SortKey::ProbAsc)).unwrap();
    let symbols: Vec<&str> = asc.cards.iter().map(|c| c.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["A", "B"]);
}

#[test]
fn test_limit_zero() {
    let provider = ranked_provider();
    let request = ScanRequest::new(["A", "B", "C"], Timeframe::H1).limit(0);
    assert!(engine().scan(&provider, &request).unwrap().cards.is_empty());
}

#[test]
fn test_scan_is_deterministic_and_parallel_matches() {
    let provider = ranked_provider().with("D", Timeframe::H1, make_double_top());
    let request = ScanRequest::new(["A", "B", "C", "D"], Timeframe::H1).limit(50);
    let engine = engine();
    let first = engine.scan(&provider, &request).unwrap();
    let second = engine.scan(&provider, &request).unwrap();
    let parallel = engine.scan_parallel(&provider, &request).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, parallel);
    assert!(first.cards.windows(2).all(|w| w[0].prob >= w[1].prob));
}

#[test]
fn test_indicator_filter_gates_symbols() {
    let provider = InMemoryProvider::new().with("BTC", Timeframe::H1, make_breakout(5000.0));
    let base = ScanRequest::new(["BTC"], Timeframe::H1).patterns(["engulfing_bull"]);

    let pass = base.clone().filters(["CLOSE > SMA(30)", "VOLUME > 1.5*VOL_SMA(20)"]);
    assert_eq!(engine().scan(&provider, &pass).unwrap().cards.len(), 1);

    let reject = base.filters(["RSI(14) < 30"]);
    assert!(engine().scan(&provider, &reject).unwrap().cards.is_empty());
}

#[test]
fn test_bad_filter_fails_request() {
    let provider = InMemoryProvider::new();
    let request = ScanRequest::new(["BTC"], Timeframe::H1).filters(["MACD > 0"]);
    let err = engine().scan(&provider, &request).unwrap_err();
    assert!(matches!(err, PatternError::Filter(FilterError::UnknownIdentifier(_))));
}

#[test]
fn test_multi_timeframe() {
    let provider = InMemoryProvider::new()
        .with("BTC", Timeframe::H1, make_breakout(5000.0))
        .with("BTC", Timeframe::H4, make_double_top());
    let request = ScanRequest::new(["BTC"], Timeframe::H1).patterns(["engulfing_bull", "double_top"]);
    let results = engine()
        .scan_multi_timeframe(&provider, &request, &[Timeframe::H1, Timeframe::H4, Timeframe::D1])
        .unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[&Timeframe::H1].cards[0].pattern, PatternId::EngulfingBull);
    assert_eq!(results[&Timeframe::H4].cards[0].pattern, PatternId::DoubleTop);
    assert!(results[&Timeframe::H4].cards.iter().all(|c| c.timeframe == Timeframe::H4));
    assert!(results[&Timeframe::D1].cards.is_empty());
}

#[test]
fn test_diagnose_reports_every_pattern() {
    let provider = InMemoryProvider::new()
        .with("ETH", Timeframe::H1, make_double_top())
        .with("SHORT", Timeframe::H1, make_ramp(&[(0, 100.0), (20, 110.0)]));
    let request = ScanRequest::new(["ETH", "SHORT"], Timeframe::H1)
        .patterns(["double_top", "doji", "not_a_real_pattern"]);
    let diags = engine().diagnose(&provider, &request).unwrap();
    assert_eq!(diags.len(), 2);

    let eth = &diags[0];
    assert!(eth.skipped.is_none());
    assert_eq!(eth.bars, 60);
    assert_eq!(eth.pivots.len(), 4);
    assert_eq!(eth.patterns.len(), 3);
    assert!(matches!(
        eth.patterns[0].outcome,
        DetectorOutcome::Evaluated { matched: true, prob: Some(_), .. }
    ));
    assert_eq!(
        eth.patterns[2].outcome,
        DetectorOutcome::Error {
            error: "unknown pattern".to_string()
        }
    );

    let short = &diags[1];
    assert!(short.skipped.as_deref().unwrap().starts_with("insufficient history"));
    assert!(short.patterns.is_empty());

    let json = serde_json::to_value(&diags).unwrap();
    assert_eq!(json[0]["patterns"][2]["error"], "unknown pattern");
    assert_eq!(json[0]["pivots"][0]["kind"], "LOW");
}

#[test]
fn test_config_from_toml_raises_history_floor() {
    let config = ScanConfig::from_toml_str("min_history_bars = 100").unwrap();
    let engine = EngineBuilder::new().config(config).with_all_defaults().build().unwrap();
    let provider = InMemoryProvider::new().with("BTC", Timeframe::H1, make_breakout(5000.0));
    let request = ScanRequest::new(["BTC"], Timeframe::H1);
    assert!(engine.scan(&provider, &request).unwrap().cards.is_empty());
}

#[test]
fn test_describe() {
    let description = engine().describe();
    assert!(description.patterns.contains(&"head_shoulders"));
    assert!(description.tfs.contains(&"4h"));
    let json = serde_json::to_value(&description).unwrap();
    assert_eq!(json["patterns"].as_array().unwrap().len(), 16);
}

#[test]
fn test_card_json_shape() {
    let provider = InMemoryProvider::new().with("BTC", Timeframe::H1, make_breakout(5000.0));
    let request = ScanRequest::new(["BTC"], Timeframe::H1).patterns(["engulfing_bull"]);
    let result = engine().scan(&provider, &request).unwrap();
    let json = serde_json::to_value(&result).unwrap();
    let card = &json["cards"][0];
    assert_eq!(card["symbol"], "BTC");
    assert_eq!(card["tf"], "1h");
    assert_eq!(card["pattern"], "engulfing_bull");
    assert!(card["prob"].as_f64().is_some());
    assert!(card["confidence"].is_string());
    assert_eq!(card["overlays"]["version"], 1);
    assert_eq!(card["overlays"]["series"][0]["type"], "box");
    assert_eq!(card["features"]["engulf_ratio"].as_f64().map(|r| r > 3.0), Some(true));
}

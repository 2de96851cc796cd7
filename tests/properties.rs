//! Property tests over random walks.

use chartscan::indicators;
use chartscan::prelude::{
    extract_pivots, passes, DefaultScoringModel, EngineBuilder, Feature, Features,
    InMemoryProvider, PivotKind, PriceBar, ScanRequest, ScoringModel, Series, Timeframe,
};
use chartscan::scoring::{FEATURE_BREAKOUT_PCT, FEATURE_SYMMETRY, FEATURE_VOLUME_RATIO};
use proptest::prelude::*;

/// Random walk of bars from per-bar percent steps and volumes
fn walk(steps: &[(f64, f64)]) -> Series {
    let mut close = 100.0;
    let bars: Vec<PriceBar> = steps
        .iter()
        .enumerate()
        .map(|(i, &(step, volume))| {
            let open = close;
            close = (close * (1.0 + step)).max(1.0);
            let high = open.max(close) * 1.002;
            let low = open.min(close) * 0.998;
            PriceBar::new(i as i64 * 60_000, open, high, low, close, volume)
        })
        .collect();
    Series::new(bars).unwrap()
}

fn steps(len: std::ops::Range<usize>) -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((-0.03f64..0.03, 100.0f64..5000.0), len)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn pivots_alternate_in_order(steps in steps(3..200), sensitivity in 0.2f64..3.0) {
        let series = walk(&steps);
        let pivots = extract_pivots(&series, sensitivity);
        for pair in pivots.windows(2) {
            prop_assert!(pair[0].index < pair[1].index);
            prop_assert_eq!(pair[0].kind.opposite(), pair[1].kind);
        }
        for p in &pivots {
            let bar = series.get(p.index).unwrap();
            let expected = match p.kind {
                PivotKind::High => bar.high,
                PivotKind::Low => bar.low,
            };
            prop_assert_eq!(p.price, expected);
        }
    }

    #[test]
    fn rsi_stays_in_bounds(steps in steps(16..120)) {
        let series = walk(&steps);
        if let Some(rsi) = indicators::rsi(&series.closes(), 14) {
            prop_assert!((0.0..=100.0).contains(&rsi), "rsi {}", rsi);
        }
    }

    #[test]
    fn score_is_clamped_and_monotone(
        base in 0.0f64..1.0,
        breakout in -0.1f64..0.1,
        symmetry in 0.0f64..1.0,
        volume in 0.0f64..5.0,
        bump in 0.0f64..1.0,
    ) {
        let model = DefaultScoringModel::default();
        let mut features = Features::new();
        features.insert(FEATURE_BREAKOUT_PCT.to_string(), Feature::from(breakout));
        features.insert(FEATURE_SYMMETRY.to_string(), Feature::from(symmetry));
        features.insert(FEATURE_VOLUME_RATIO.to_string(), Feature::from(volume));
        let (prob, _) = model.score(base, &features);
        prop_assert!((0.0..=1.0).contains(&prob));

        features.insert(FEATURE_VOLUME_RATIO.to_string(), Feature::from(volume + bump));
        let (bumped, _) = model.score(base, &features);
        prop_assert!(bumped >= prob);
    }

    #[test]
    fn more_clauses_never_admit_more(steps in steps(60..120), level in 0.0f64..100.0) {
        let series = walk(&steps);
        let one = ["CLOSE > SMA(30)".to_string()];
        let two = [one[0].clone(), format!("RSI(14) > {level}")];
        let loose = passes(&series, &one).unwrap();
        let strict = passes(&series, &two).unwrap();
        prop_assert!(!strict || loose);
    }

    #[test]
    fn scan_output_is_bounded_and_sorted(
        a in steps(60..160),
        b in steps(60..160),
        limit in 0usize..20,
    ) {
        let provider = InMemoryProvider::new()
            .with("A", Timeframe::M15, walk(&a))
            .with("B", Timeframe::M15, walk(&b));
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        let request = ScanRequest::new(["A", "B"], Timeframe::M15).limit(limit);
        let result = engine.scan(&provider, &request).unwrap();
        prop_assert!(result.cards.len() <= limit);
        for card in &result.cards {
            prop_assert!((0.0..=1.0).contains(&card.prob));
        }
        for pair in result.cards.windows(2) {
            prop_assert!(pair[0].prob >= pair[1].prob);
        }
        prop_assert_eq!(&result, &engine.scan_parallel(&provider, &request).unwrap());
    }
}

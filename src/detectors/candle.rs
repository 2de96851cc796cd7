//! Candle shape detectors
//!
//! These read only the last one or two bars and ignore pivots.

use super::helpers::{self, BEAR_COLOR, BULL_COLOR, NEUTRAL_COLOR};
use crate::{
    overlay::{Overlay, Point, Style},
    params::CandleParams,
    pivots::Pivot,
    scoring::{FEATURE_BREAKOUT_PCT, FEATURE_SYMMETRY, FEATURE_VOLUME_RATIO},
    Card, DetectionResult, OHLCVExt, PatternDetector, PatternId, Result, Series, Timeframe, OHLCV,
};

define_detector!(
    /// Body at most `doji_body_ratio` of the range
    DojiDetector(CandleParams)
);
define_detector!(
    /// Small body near the top, long lower shadow
    HammerDetector(CandleParams)
);
define_detector!(
    /// Small body near the bottom, long upper shadow
    ShootingStarDetector(CandleParams)
);
define_detector!(
    /// Bullish body engulfing the previous bearish body
    EngulfingBullDetector(CandleParams)
);
define_detector!(
    /// Bearish body engulfing the previous bullish body
    EngulfingBearDetector(CandleParams)
);

impl_parameterized! {
    DojiDetector => CandleParams, PatternId::Doji;
    HammerDetector => CandleParams, PatternId::Hammer;
    ShootingStarDetector => CandleParams, PatternId::ShootingStar;
    EngulfingBullDetector => CandleParams, PatternId::EngulfingBull;
    EngulfingBearDetector => CandleParams, PatternId::EngulfingBear;
}

/// Card with a box around the last `bars` candles
fn candle_card(
    id: PatternId,
    series: &Series,
    bars: usize,
    color: &str,
    timeframe: Timeframe,
    symbol: &str,
) -> Card {
    let tail = &series.bars()[series.len().saturating_sub(bars)..];
    let high = tail.iter().map(|b| b.high()).fold(f64::MIN, f64::max);
    let low = tail.iter().map(|b| b.low()).fold(f64::MAX, f64::min);
    let (t0, t1) = match (tail.first(), tail.last()) {
        (Some(first), Some(last)) => (first.timestamp(), last.timestamp()),
        _ => (0, 0),
    };
    Card::new(symbol, timeframe, id)
        .feature(FEATURE_VOLUME_RATIO, helpers::volume_ratio(series))
        .overlay(Overlay::rect(
            Point(t0, high),
            Point(t1, low),
            Style::color(color).alpha(0.2),
        ))
        .overlay(Overlay::label(Point(t1, high), id.as_str()))
}

impl PatternDetector for DojiDetector {
    fn id(&self) -> PatternId {
        PatternId::Doji
    }

    fn min_pivots(&self) -> usize {
        0
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect(
        &self,
        series: &Series,
        _pivots: &[Pivot],
        timeframe: Timeframe,
        symbol: &str,
    ) -> Result<DetectionResult> {
        let Some(bar) = series.last() else {
            return Ok(DetectionResult::none());
        };
        // Zero range is no candle at all
        let Some(body_ratio) = bar.body_ratio() else {
            return Ok(DetectionResult::none());
        };
        if body_ratio > self.params.doji_body_ratio.get() {
            return Ok(DetectionResult::none());
        }
        let symmetry = 1.0 - (bar.upper_shadow() - bar.lower_shadow()).abs() / bar.range();
        let card = candle_card(self.id(), series, 1, NEUTRAL_COLOR, timeframe, symbol)
            .feature("body_ratio", body_ratio)
            .feature(FEATURE_SYMMETRY, symmetry);
        Ok(DetectionResult::found(card))
    }

    fn validate_config(&self) -> Result<()> {
        self.params.validate()
    }
}

/// Long shadow on one side, short on the other
fn shadow_shape(
    params: &CandleParams,
    long_shadow: f64,
    short_shadow: f64,
    body: f64,
    range: f64,
) -> bool {
    range > f64::EPSILON
        && body / range <= params.max_body_ratio.get()
        && long_shadow >= params.min_shadow_body_ratio * body
        && long_shadow > short_shadow
        && short_shadow / range <= params.max_opposite_shadow_ratio.get()
}

impl PatternDetector for HammerDetector {
    fn id(&self) -> PatternId {
        PatternId::Hammer
    }

    fn min_pivots(&self) -> usize {
        0
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect(
        &self,
        series: &Series,
        _pivots: &[Pivot],
        timeframe: Timeframe,
        symbol: &str,
    ) -> Result<DetectionResult> {
        let Some(bar) = series.last() else {
            return Ok(DetectionResult::none());
        };
        let (lower, upper, body, range) = (bar.lower_shadow(), bar.upper_shadow(), bar.body(), bar.range());
        if !shadow_shape(&self.params, lower, upper, body, range) {
            return Ok(DetectionResult::none());
        }
        let card = candle_card(self.id(), series, 1, BULL_COLOR, timeframe, symbol)
            .feature("body_ratio", body / range)
            .feature("lower_shadow_ratio", lower / range)
            .feature("upper_shadow_ratio", upper / range);
        Ok(DetectionResult::found(card))
    }

    fn validate_config(&self) -> Result<()> {
        self.params.validate()
    }
}

impl PatternDetector for ShootingStarDetector {
    fn id(&self) -> PatternId {
        PatternId::ShootingStar
    }

    fn min_pivots(&self) -> usize {
        0
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect(
        &self,
        series: &Series,
        _pivots: &[Pivot],
        timeframe: Timeframe,
        symbol: &str,
    ) -> Result<DetectionResult> {
        let Some(bar) = series.last() else {
            return Ok(DetectionResult::none());
        };
        let (lower, upper, body, range) = (bar.lower_shadow(), bar.upper_shadow(), bar.body(), bar.range());
        if !shadow_shape(&self.params, upper, lower, body, range) {
            return Ok(DetectionResult::none());
        }
        let card = candle_card(self.id(), series, 1, BEAR_COLOR, timeframe, symbol)
            .feature("body_ratio", body / range)
            .feature("lower_shadow_ratio", lower / range)
            .feature("upper_shadow_ratio", upper / range);
        Ok(DetectionResult::found(card))
    }

    fn validate_config(&self) -> Result<()> {
        self.params.validate()
    }
}

impl PatternDetector for EngulfingBullDetector {
    fn id(&self) -> PatternId {
        PatternId::EngulfingBull
    }

    fn min_pivots(&self) -> usize {
        0
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect(
        &self,
        series: &Series,
        _pivots: &[Pivot],
        timeframe: Timeframe,
        symbol: &str,
    ) -> Result<DetectionResult> {
        let bars = series.bars();
        let [.., prev, curr] = bars else {
            return Ok(DetectionResult::none());
        };
        if !(curr.is_bullish() && prev.is_bearish()) {
            return Ok(DetectionResult::none());
        }
        // At most one end of the engulfed body may be matched exactly
        let case_a = curr.close() >= prev.open() && curr.open() < prev.close();
        let case_b = curr.close() > prev.open() && curr.open() <= prev.close();
        if !(case_a || case_b) || curr.body() < prev.body() * self.params.min_engulf_ratio {
            return Ok(DetectionResult::none());
        }
        let card = candle_card(self.id(), series, 2, BULL_COLOR, timeframe, symbol)
            .feature("engulf_ratio", curr.body() / prev.body())
            .feature(FEATURE_BREAKOUT_PCT, (curr.close() - prev.open()) / prev.open());
        Ok(DetectionResult::found(card))
    }

    fn validate_config(&self) -> Result<()> {
        self.params.validate()
    }
}

impl PatternDetector for EngulfingBearDetector {
    fn id(&self) -> PatternId {
        PatternId::EngulfingBear
    }

    fn min_pivots(&self) -> usize {
        0
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect(
        &self,
        series: &Series,
        _pivots: &[Pivot],
        timeframe: Timeframe,
        symbol: &str,
    ) -> Result<DetectionResult> {
        let bars = series.bars();
        let [.., prev, curr] = bars else {
            return Ok(DetectionResult::none());
        };
        if !(curr.is_bearish() && prev.is_bullish()) {
            return Ok(DetectionResult::none());
        }
        let case_a = curr.open() >= prev.close() && curr.close() < prev.open();
        let case_b = curr.open() > prev.close() && curr.close() <= prev.open();
        if !(case_a || case_b) || curr.body() < prev.body() * self.params.min_engulf_ratio {
            return Ok(DetectionResult::none());
        }
        let card = candle_card(self.id(), series, 2, BEAR_COLOR, timeframe, symbol)
            .feature("engulf_ratio", curr.body() / prev.body())
            .feature(FEATURE_BREAKOUT_PCT, (prev.open() - curr.close()) / prev.open());
        Ok(DetectionResult::found(card))
    }

    fn validate_config(&self) -> Result<()> {
        self.params.validate()
    }
}

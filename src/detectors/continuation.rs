//! Continuation detectors: triangles, wedges and flags
//!
//! All three fit an upper trendline through pivot highs and a lower one
//! through pivot lows, then classify the pair by drift and convergence.

use super::helpers::{self, closeness, trailing, Channel, Slope, BEAR_COLOR, BULL_COLOR, NEUTRAL_COLOR};
use crate::{
    overlay::{Overlay, Style},
    params::{FlagParams, TriangleParams, WedgeParams},
    pivots::{Pivot, PivotKind},
    scoring::{FEATURE_BREAKOUT_PCT, FEATURE_SYMMETRY, FEATURE_VOLUME_RATIO},
    Card, DetectionResult, PatternDetector, PatternId, Result, Series, Timeframe,
};

define_detector!(
    /// Flat resistance over rising support
    AscendingTriangleDetector(TriangleParams)
);
define_detector!(
    /// Falling resistance over flat support
    DescendingTriangleDetector(TriangleParams)
);
define_detector!(
    /// Falling resistance over rising support
    SymmetricalTriangleDetector(TriangleParams)
);
define_detector!(
    /// Both lines rising, support steeper
    WedgeRisingDetector(WedgeParams)
);
define_detector!(
    /// Both lines falling, resistance steeper
    WedgeFallingDetector(WedgeParams)
);
define_detector!(
    /// Up pole, then a flat or falling parallel channel
    BullFlagDetector(FlagParams)
);
define_detector!(
    /// Down pole, then a flat or rising parallel channel
    BearFlagDetector(FlagParams)
);

impl_parameterized! {
    AscendingTriangleDetector => TriangleParams, PatternId::AscendingTriangle;
    DescendingTriangleDetector => TriangleParams, PatternId::DescendingTriangle;
    SymmetricalTriangleDetector => TriangleParams, PatternId::SymmetricalTriangle;
    WedgeRisingDetector => WedgeParams, PatternId::WedgeRising;
    WedgeFallingDetector => WedgeParams, PatternId::WedgeFalling;
    BullFlagDetector => FlagParams, PatternId::BullFlag;
    BearFlagDetector => FlagParams, PatternId::BearFlag;
}

/// Relative distance of `close` above (`up`) or below a line value
#[inline]
fn beyond(close: f64, line: f64, up: bool) -> f64 {
    if line <= 0.0 {
        return 0.0;
    }
    if up {
        (close - line) / line
    } else {
        (line - close) / line
    }
}

/// Card with both channel lines extended to the last bar
fn channel_card(
    id: PatternId,
    series: &Series,
    channel: &Channel,
    from: usize,
    last: usize,
    timeframe: Timeframe,
    symbol: &str,
) -> Card {
    let color = match id.typical_direction() {
        crate::Direction::Bullish => BULL_COLOR,
        crate::Direction::Bearish => BEAR_COLOR,
        crate::Direction::Neutral => NEUTRAL_COLOR,
    };
    Card::new(symbol, timeframe, id)
        .feature("upper_drift", channel.upper_drift())
        .feature("lower_drift", channel.lower_drift())
        .feature(FEATURE_VOLUME_RATIO, helpers::volume_ratio(series))
        .overlay(helpers::line_overlay(series, &channel.upper, from, last, Style::color(color).width(2.0)))
        .overlay(helpers::line_overlay(series, &channel.lower, from, last, Style::color(color).width(2.0)))
        .overlay(Overlay::label(
            crate::overlay::Point(helpers::time_at(series, last), channel.upper.at(last as f64)),
            id.as_str(),
        ))
}

// ============================================================
// TRIANGLES
// ============================================================

fn detect_triangle(
    id: PatternId,
    params: &TriangleParams,
    series: &Series,
    pivots: &[Pivot],
    timeframe: Timeframe,
    symbol: &str,
) -> Result<DetectionResult> {
    helpers::check_pivots(series, pivots)?;
    if pivots.len() < params.min_pivots {
        return Ok(DetectionResult::none());
    }
    let window = trailing(pivots, params.window);
    let Some(channel) = Channel::fit(window) else {
        return Ok(DetectionResult::none());
    };
    let tol = params.flat_tolerance;
    let upper = Slope::classify(channel.upper_drift(), tol);
    let lower = Slope::classify(channel.lower_drift(), tol);
    let shape = match id {
        PatternId::AscendingTriangle => upper == Slope::Flat && lower == Slope::Rising,
        PatternId::DescendingTriangle => upper == Slope::Falling && lower == Slope::Flat,
        _ => upper == Slope::Falling && lower == Slope::Rising,
    };
    if !shape {
        return Ok(DetectionResult::none());
    }
    let Some(convergence) = channel.convergence() else {
        return Ok(DetectionResult::none());
    };
    if convergence < params.min_convergence.get() {
        return Ok(DetectionResult::none());
    }

    let (last, close) = helpers::last_close(series)?;
    let x = last as f64;
    let up = beyond(close, channel.upper.at(x), true);
    let down = beyond(close, channel.lower.at(x), false);
    let (breakout, symmetry) = match id {
        PatternId::AscendingTriangle => (up, closeness(channel.upper_drift().abs(), tol)),
        PatternId::DescendingTriangle => (down, closeness(channel.lower_drift().abs(), tol)),
        _ => (up.max(down), channel.slope_symmetry()),
    };
    let card = channel_card(id, series, &channel, channel.start, last, timeframe, symbol)
        .feature("convergence", convergence)
        .feature("touches", window.len())
        .feature(FEATURE_BREAKOUT_PCT, breakout)
        .feature(FEATURE_SYMMETRY, symmetry);
    Ok(DetectionResult::found(card))
}

macro_rules! triangle_detector {
    ($($detector:ty => $id:expr),* $(,)?) => {
        $(impl PatternDetector for $detector {
            fn id(&self) -> PatternId {
                $id
            }

            fn min_pivots(&self) -> usize {
                self.params.min_pivots
            }

            fn min_bars(&self) -> usize {
                helpers::MIN_PATTERN_BARS
            }

            fn detect(
                &self,
                series: &Series,
                pivots: &[Pivot],
                timeframe: Timeframe,
                symbol: &str,
            ) -> Result<DetectionResult> {
                detect_triangle(self.id(), &self.params, series, pivots, timeframe, symbol)
            }

            fn validate_config(&self) -> Result<()> {
                self.params.validate()
            }
        })*
    };
}

triangle_detector! {
    AscendingTriangleDetector => PatternId::AscendingTriangle,
    DescendingTriangleDetector => PatternId::DescendingTriangle,
    SymmetricalTriangleDetector => PatternId::SymmetricalTriangle,
}

// ============================================================
// WEDGES
// ============================================================

fn detect_wedge(
    id: PatternId,
    params: &WedgeParams,
    series: &Series,
    pivots: &[Pivot],
    timeframe: Timeframe,
    symbol: &str,
) -> Result<DetectionResult> {
    helpers::check_pivots(series, pivots)?;
    if pivots.len() < params.min_pivots {
        return Ok(DetectionResult::none());
    }
    let window = trailing(pivots, params.window);
    let Some(channel) = Channel::fit(window) else {
        return Ok(DetectionResult::none());
    };
    let rising = id == PatternId::WedgeRising;
    let (ud, ld) = (channel.upper_drift(), channel.lower_drift());
    let slope = params.min_slope;
    let shape = if rising {
        ud > slope && ld > slope
    } else {
        ud < -slope && ld < -slope
    };
    if !shape {
        return Ok(DetectionResult::none());
    }
    let Some(convergence) = channel.convergence() else {
        return Ok(DetectionResult::none());
    };
    if convergence < params.min_convergence.get() {
        return Ok(DetectionResult::none());
    }

    let (last, close) = helpers::last_close(series)?;
    let x = last as f64;
    // Rising wedges resolve down through support, falling wedges up through resistance
    let breakout = if rising {
        beyond(close, channel.lower.at(x), false)
    } else {
        beyond(close, channel.upper.at(x), true)
    };
    let card = channel_card(id, series, &channel, channel.start, last, timeframe, symbol)
        .feature("convergence", convergence)
        .feature("touches", window.len())
        .feature(FEATURE_BREAKOUT_PCT, breakout)
        .feature(FEATURE_SYMMETRY, channel.slope_symmetry());
    Ok(DetectionResult::found(card))
}

impl PatternDetector for WedgeRisingDetector {
    fn id(&self) -> PatternId {
        PatternId::WedgeRising
    }

    fn min_pivots(&self) -> usize {
        self.params.min_pivots
    }

    fn min_bars(&self) -> usize {
        helpers::MIN_PATTERN_BARS
    }

    fn detect(
        &self,
        series: &Series,
        pivots: &[Pivot],
        timeframe: Timeframe,
        symbol: &str,
    ) -> Result<DetectionResult> {
        detect_wedge(self.id(), &self.params, series, pivots, timeframe, symbol)
    }

    fn validate_config(&self) -> Result<()> {
        self.params.validate()
    }
}

impl PatternDetector for WedgeFallingDetector {
    fn id(&self) -> PatternId {
        PatternId::WedgeFalling
    }

    fn min_pivots(&self) -> usize {
        self.params.min_pivots
    }

    fn min_bars(&self) -> usize {
        helpers::MIN_PATTERN_BARS
    }

    fn detect(
        &self,
        series: &Series,
        pivots: &[Pivot],
        timeframe: Timeframe,
        symbol: &str,
    ) -> Result<DetectionResult> {
        detect_wedge(self.id(), &self.params, series, pivots, timeframe, symbol)
    }

    fn validate_config(&self) -> Result<()> {
        self.params.validate()
    }
}

// ============================================================
// FLAGS
// ============================================================

/// Index into `window` of the strongest pole start, with its size
fn strongest_pole(window: &[Pivot], bull: bool, min_pole_pct: f64) -> Option<(usize, f64)> {
    let start_kind = if bull { PivotKind::Low } else { PivotKind::High };
    let mut best: Option<(usize, f64)> = None;
    // The channel after the pole tip needs four pivots
    for k in 0..window.len().saturating_sub(4) {
        let (start, tip) = (&window[k], &window[k + 1]);
        if start.kind != start_kind || tip.kind != start_kind.opposite() || start.price <= 0.0 {
            continue;
        }
        let pole = if bull {
            (tip.price - start.price) / start.price
        } else {
            (start.price - tip.price) / start.price
        };
        if pole >= min_pole_pct && best.map_or(true, |(_, p)| pole > p) {
            best = Some((k, pole));
        }
    }
    best
}

fn detect_flag(
    id: PatternId,
    params: &FlagParams,
    series: &Series,
    pivots: &[Pivot],
    timeframe: Timeframe,
    symbol: &str,
) -> Result<DetectionResult> {
    helpers::check_pivots(series, pivots)?;
    if pivots.len() < params.min_pivots {
        return Ok(DetectionResult::none());
    }
    let bull = id == PatternId::BullFlag;
    let window = trailing(pivots, params.window);
    let Some((k, pole_pct)) = strongest_pole(window, bull, params.min_pole_pct) else {
        return Ok(DetectionResult::none());
    };
    let (start, tip) = (&window[k], &window[k + 1]);
    let flag = &window[k + 1..];
    let Some(channel) = Channel::fit(flag) else {
        return Ok(DetectionResult::none());
    };

    let (ud, ld) = (channel.upper_drift(), channel.lower_drift());
    let tol = params.flat_tolerance;
    let against_pole = if bull {
        ud <= tol && ld <= tol
    } else {
        ud >= -tol && ld >= -tol
    };
    let parallel_gap = (ud - ld).abs();
    if !against_pole || parallel_gap > params.parallel_tolerance {
        return Ok(DetectionResult::none());
    }

    let pole_size = (tip.price - start.price).abs();
    let retracement = if bull {
        let low = flag.iter().map(|p| p.price).fold(f64::MAX, f64::min);
        (tip.price - low) / pole_size
    } else {
        let high = flag.iter().map(|p| p.price).fold(f64::MIN, f64::max);
        (high - tip.price) / pole_size
    };
    if retracement > params.max_retracement.get() {
        return Ok(DetectionResult::none());
    }

    let (last, close) = helpers::last_close(series)?;
    let x = last as f64;
    let breakout = if bull {
        beyond(close, channel.upper.at(x), true)
    } else {
        beyond(close, channel.lower.at(x), false)
    };
    let color = if bull { BULL_COLOR } else { BEAR_COLOR };
    let card = channel_card(id, series, &channel, tip.index, last, timeframe, symbol)
        .feature("pole_pct", pole_pct)
        .feature("retracement", retracement)
        .feature(FEATURE_BREAKOUT_PCT, breakout)
        .feature(FEATURE_SYMMETRY, closeness(parallel_gap, params.parallel_tolerance))
        .overlay(Overlay::line(
            vec![helpers::pivot_point(start), helpers::pivot_point(tip)],
            Style::color(color).width(3.0),
        ))
        .overlay(helpers::volume_overlay(series, last - start.index + 1));
    Ok(DetectionResult::found(card))
}

impl PatternDetector for BullFlagDetector {
    fn id(&self) -> PatternId {
        PatternId::BullFlag
    }

    fn min_pivots(&self) -> usize {
        self.params.min_pivots
    }

    fn min_bars(&self) -> usize {
        helpers::MIN_PATTERN_BARS
    }

    fn detect(
        &self,
        series: &Series,
        pivots: &[Pivot],
        timeframe: Timeframe,
        symbol: &str,
    ) -> Result<DetectionResult> {
        detect_flag(self.id(), &self.params, series, pivots, timeframe, symbol)
    }

    fn validate_config(&self) -> Result<()> {
        self.params.validate()
    }
}

impl PatternDetector for BearFlagDetector {
    fn id(&self) -> PatternId {
        PatternId::BearFlag
    }

    fn min_pivots(&self) -> usize {
        self.params.min_pivots
    }

    fn min_bars(&self) -> usize {
        helpers::MIN_PATTERN_BARS
    }

    fn detect(
        &self,
        series: &Series,
        pivots: &[Pivot],
        timeframe: Timeframe,
        symbol: &str,
    ) -> Result<DetectionResult> {
        detect_flag(self.id(), &self.params, series, pivots, timeframe, symbol)
    }

    fn validate_config(&self) -> Result<()> {
        self.params.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PriceBar;

    fn flat(n: usize) -> Series {
        let bars = (0..n)
            .map(|i| PriceBar::new(i as i64 * 60_000, 100.0, 100.5, 99.5, 100.0, 1000.0))
            .collect();
        Series::new(bars).unwrap()
    }

    fn pivots(shape: &[(usize, char, f64)]) -> Vec<Pivot> {
        shape.iter()
            .map(|&(index, kind, price)| Pivot {
                index,
                timestamp: index as i64 * 60_000,
                kind: if kind == 'H' { PivotKind::High } else { PivotKind::Low },
                price,
            })
            .collect()
    }

    fn matched<D: PatternDetector>(d: D, p: &[Pivot]) -> bool {
        d.detect(&flat(40), p, Timeframe::M30, "SOL").unwrap().matched
    }

    #[test]
    fn test_ascending_triangle() {
        let p = pivots(&[
            (0, 'H', 110.0),
            (5, 'L', 95.0),
            (10, 'H', 110.2),
            (15, 'L', 100.0),
            (20, 'H', 109.9),
            (25, 'L', 104.0),
        ]);
        assert!(matched(AscendingTriangleDetector::default(), &p));
        assert!(!matched(DescendingTriangleDetector::default(), &p));
        assert!(!matched(SymmetricalTriangleDetector::default(), &p));
    }

    #[test]
    fn test_descending_triangle() {
        let p = pivots(&[
            (0, 'H', 110.0),
            (5, 'L', 90.0),
            (10, 'H', 104.0),
            (15, 'L', 90.1),
            (20, 'H', 98.0),
            (25, 'L', 89.9),
        ]);
        assert!(matched(DescendingTriangleDetector::default(), &p));
        assert!(!matched(AscendingTriangleDetector::default(), &p));
    }

    #[test]
    fn test_symmetrical_triangle() {
        let p = pivots(&[
            (0, 'H', 110.0),
            (5, 'L', 90.0),
            (10, 'H', 108.0),
            (15, 'L', 94.0),
            (20, 'H', 106.0),
            (25, 'L', 98.0),
        ]);
        let r = SymmetricalTriangleDetector::default()
            .detect(&flat(40), &p, Timeframe::M30, "SOL")
            .unwrap();
        assert!(r.matched);
        let card = r.card.unwrap();
        assert!(card.numeric_feature("convergence").unwrap() > 0.5);
        assert_eq!(card.numeric_feature("touches"), Some(6.0));
    }

    #[test]
    fn test_parallel_channel_is_not_a_triangle() {
        let p = pivots(&[
            (0, 'H', 110.0),
            (5, 'L', 100.0),
            (10, 'H', 110.0),
            (15, 'L', 100.0),
            (20, 'H', 110.0),
            (25, 'L', 100.0),
        ]);
        assert!(!matched(AscendingTriangleDetector::default(), &p));
        assert!(!matched(SymmetricalTriangleDetector::default(), &p));
        assert!(!matched(DescendingTriangleDetector::default(), &p));
    }

    #[test]
    fn test_too_few_pivots() {
        let p = pivots(&[(0, 'H', 110.0), (5, 'L', 95.0), (10, 'H', 110.2)]);
        assert!(!matched(AscendingTriangleDetector::default(), &p));
        assert!(!matched(BullFlagDetector::default(), &p));
    }

    #[test]
    fn test_rising_wedge() {
        let p = pivots(&[
            (0, 'H', 100.0),
            (5, 'L', 92.0),
            (10, 'H', 104.0),
            (15, 'L', 98.0),
            (20, 'H', 108.0),
            (25, 'L', 104.0),
        ]);
        assert!(matched(WedgeRisingDetector::default(), &p));
        assert!(!matched(WedgeFallingDetector::default(), &p));
    }

    #[test]
    fn test_falling_wedge() {
        let p = pivots(&[
            (0, 'L', 100.0),
            (5, 'H', 108.0),
            (10, 'L', 96.0),
            (15, 'H', 102.0),
            (20, 'L', 92.0),
            (25, 'H', 96.0),
        ]);
        assert!(matched(WedgeFallingDetector::default(), &p));
        assert!(!matched(WedgeRisingDetector::default(), &p));
    }

    #[test]
    fn test_bull_flag() {
        let p = pivots(&[
            (0, 'L', 100.0),
            (10, 'H', 110.0),
            (14, 'L', 107.0),
            (18, 'H', 108.5),
            (22, 'L', 105.5),
            (26, 'H', 107.0),
        ]);
        let r = BullFlagDetector::default()
            .detect(&flat(40), &p, Timeframe::M30, "SOL")
            .unwrap();
        assert!(r.matched);
        let card = r.card.unwrap();
        assert!((card.numeric_feature("pole_pct").unwrap() - 0.1).abs() < 1e-9);
        assert!(card.numeric_feature("retracement").unwrap() <= 0.5);
        assert!(!matched(BearFlagDetector::default(), &p));
    }

    #[test]
    fn test_bull_flag_deep_retracement() {
        let p = pivots(&[
            (0, 'L', 100.0),
            (10, 'H', 110.0),
            (14, 'L', 104.0),
            (18, 'H', 108.5),
            (22, 'L', 102.5),
            (26, 'H', 107.0),
        ]);
        assert!(!matched(BullFlagDetector::default(), &p));
    }

    #[test]
    fn test_bear_flag() {
        let p = pivots(&[
            (0, 'H', 100.0),
            (10, 'L', 90.0),
            (14, 'H', 93.0),
            (18, 'L', 91.5),
            (22, 'H', 94.5),
            (26, 'L', 93.0),
        ]);
        assert!(matched(BearFlagDetector::default(), &p));
        assert!(!matched(BullFlagDetector::default(), &p));
    }
}

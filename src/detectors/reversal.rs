//! Reversal detectors: double top/bottom and head-and-shoulders
//!
//! Both read the trailing alternating pivots. The most recent qualifying
//! arrangement wins.

use super::helpers::{self, closeness, relative_diff, trailing, Trendline, BEAR_COLOR, BULL_COLOR};
use crate::{
    overlay::{Overlay, Style},
    params::{DoubleParams, HeadShouldersParams},
    pivots::{Pivot, PivotKind},
    scoring::{FEATURE_BREAKOUT_PCT, FEATURE_SYMMETRY, FEATURE_VOLUME_RATIO},
    Card, DetectionResult, PatternDetector, PatternId, Result, Series, Timeframe,
};

define_detector!(
    /// Two similar highs around a trough
    DoubleTopDetector(DoubleParams)
);
define_detector!(
    /// Two similar lows around a peak
    DoubleBottomDetector(DoubleParams)
);
define_detector!(
    /// Higher head between two similar shoulders
    HeadShouldersDetector(HeadShouldersParams)
);
define_detector!(
    /// Lower head between two similar shoulders
    InverseHeadShouldersDetector(HeadShouldersParams)
);

impl_parameterized! {
    DoubleTopDetector => DoubleParams, PatternId::DoubleTop;
    DoubleBottomDetector => DoubleParams, PatternId::DoubleBottom;
    HeadShouldersDetector => HeadShouldersParams, PatternId::HeadShoulders;
    InverseHeadShouldersDetector => HeadShouldersParams, PatternId::InverseHeadShoulders;
}

// ============================================================
// DOUBLE TOP / BOTTOM
// ============================================================

fn detect_double(
    id: PatternId,
    params: &DoubleParams,
    series: &Series,
    pivots: &[Pivot],
    timeframe: Timeframe,
    symbol: &str,
) -> Result<DetectionResult> {
    helpers::check_pivots(series, pivots)?;
    let top = id == PatternId::DoubleTop;
    let extreme = if top { PivotKind::High } else { PivotKind::Low };
    let tolerance = params.price_tolerance.get();

    for triple in trailing(pivots, params.lookback_pivots).windows(3).rev() {
        let [a, b, c] = triple else { continue };
        if !helpers::alternates(triple, extreme) {
            continue;
        }
        let diff = relative_diff(a.price, c.price);
        if diff > tolerance {
            continue;
        }
        let level = (a.price + c.price) / 2.0;
        let depth = if top {
            (level - b.price) / level
        } else {
            (b.price - level) / level
        };
        if depth < params.min_retracement.get()
            || c.index.saturating_sub(a.index) < params.min_separation_bars
        {
            continue;
        }

        let (last, close) = helpers::last_close(series)?;
        let neckline = b.price;
        let breakout = if top {
            (neckline - close) / neckline
        } else {
            (close - neckline) / neckline
        };
        let color = if top { BEAR_COLOR } else { BULL_COLOR };
        let card = Card::new(symbol, timeframe, id)
            .feature("peak_diff_pct", diff)
            .feature("depth_pct", depth)
            .feature("separation_bars", c.index - a.index)
            .feature("neckline", neckline)
            .feature(FEATURE_BREAKOUT_PCT, breakout)
            .feature(FEATURE_SYMMETRY, closeness(diff, tolerance))
            .feature(FEATURE_VOLUME_RATIO, helpers::volume_ratio(series))
            .overlay(helpers::path_overlay(triple, Style::color(color).width(2.0)))
            .overlay(Overlay::ray(
                helpers::pivot_point(b),
                crate::overlay::Point(helpers::time_at(series, last), neckline),
                Style::color(color).dashed(),
            ))
            .overlay(Overlay::level(level, Style::color(color).alpha(0.4)))
            .overlay(Overlay::label(helpers::pivot_point(c), id.as_str()));
        return Ok(DetectionResult::found(card));
    }
    Ok(DetectionResult::none())
}

impl PatternDetector for DoubleTopDetector {
    fn id(&self) -> PatternId {
        PatternId::DoubleTop
    }

    fn min_pivots(&self) -> usize {
        3
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
        detect_double(self.id(), &self.params, series, pivots, timeframe, symbol)
    }

    fn validate_config(&self) -> Result<()> {
        self.params.validate()
    }
}

impl PatternDetector for DoubleBottomDetector {
    fn id(&self) -> PatternId {
        PatternId::DoubleBottom
    }

    fn min_pivots(&self) -> usize {
        3
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
        detect_double(self.id(), &self.params, series, pivots, timeframe, symbol)
    }

    fn validate_config(&self) -> Result<()> {
        self.params.validate()
    }
}

// ============================================================
// HEAD AND SHOULDERS
// ============================================================

fn detect_head_shoulders(
    id: PatternId,
    params: &HeadShouldersParams,
    series: &Series,
    pivots: &[Pivot],
    timeframe: Timeframe,
    symbol: &str,
) -> Result<DetectionResult> {
    helpers::check_pivots(series, pivots)?;
    let top = id == PatternId::HeadShoulders;
    let extreme = if top { PivotKind::High } else { PivotKind::Low };
    let margin = params.head_margin.get();
    let tolerance = params.shoulder_tolerance.get();

    for five in trailing(pivots, params.lookback_pivots).windows(5).rev() {
        let [left, trough_a, head, trough_b, right] = five else { continue };
        if !helpers::alternates(five, extreme) {
            continue;
        }
        let head_excess = if top {
            head.price / left.price.max(right.price) - 1.0
        } else {
            1.0 - head.price / left.price.min(right.price)
        };
        if head_excess < margin {
            continue;
        }
        let shoulder_diff = relative_diff(left.price, right.price);
        if shoulder_diff > tolerance {
            continue;
        }
        let left_span = head.index.saturating_sub(left.index) as f64;
        let right_span = right.index.saturating_sub(head.index) as f64;
        if left_span <= 0.0 || right_span <= 0.0 {
            continue;
        }
        let time_symmetry = left_span.min(right_span) / left_span.max(right_span);
        if time_symmetry < params.min_time_symmetry.get() {
            continue;
        }
        let Some(neckline) = Trendline::through(trough_a, trough_b) else {
            continue;
        };

        let (last, close) = helpers::last_close(series)?;
        let neck_now = neckline.at(last as f64);
        if neck_now <= 0.0 {
            continue;
        }
        let breakout = if top {
            (neck_now - close) / neck_now
        } else {
            (close - neck_now) / neck_now
        };
        let color = if top { BEAR_COLOR } else { BULL_COLOR };
        let symmetry = (closeness(shoulder_diff, tolerance) + time_symmetry) / 2.0;
        let card = Card::new(symbol, timeframe, id)
            .feature("head_margin_pct", head_excess)
            .feature("shoulder_diff_pct", shoulder_diff)
            .feature("time_symmetry", time_symmetry)
            .feature("neckline", neck_now)
            .feature(FEATURE_BREAKOUT_PCT, breakout)
            .feature(FEATURE_SYMMETRY, symmetry)
            .feature(FEATURE_VOLUME_RATIO, helpers::volume_ratio(series))
            .overlay(helpers::path_overlay(five, Style::color(color).width(2.0)))
            .overlay(helpers::line_overlay(
                series,
                &neckline,
                trough_a.index,
                last,
                Style::color(color).dashed(),
            ))
            .overlay(Overlay::label(helpers::pivot_point(head), id.as_str()));
        return Ok(DetectionResult::found(card));
    }
    Ok(DetectionResult::none())
}

impl PatternDetector for HeadShouldersDetector {
    fn id(&self) -> PatternId {
        PatternId::HeadShoulders
    }

    fn min_pivots(&self) -> usize {
        5
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
        detect_head_shoulders(self.id(), &self.params, series, pivots, timeframe, symbol)
    }

    fn validate_config(&self) -> Result<()> {
        self.params.validate()
    }
}

impl PatternDetector for InverseHeadShouldersDetector {
    fn id(&self) -> PatternId {
        PatternId::InverseHeadShoulders
    }

    fn min_pivots(&self) -> usize {
        5
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
        detect_head_shoulders(self.id(), &self.params, series, pivots, timeframe, symbol)
    }

    fn validate_config(&self) -> Result<()> {
        self.params.validate()
    }
}

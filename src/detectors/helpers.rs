//! Geometry shared across the pivot-based detectors
//!
//! Trendlines are least-squares fits over `(bar index, price)`. Slopes are
//! compared as relative drift: the line's change across the fitted span
//! divided by the mean pivot price, so thresholds do not depend on the
//! instrument's price level or the timeframe.

use crate::{
    indicators,
    overlay::{Overlay, Point, Style},
    pivots::{Pivot, PivotKind},
    PatternError, Result, Series, OHLCV,
};

pub const BULL_COLOR: &str = "#26a69a";
pub const BEAR_COLOR: &str = "#ef5350";
pub const NEUTRAL_COLOR: &str = "#90a4ae";

/// Bars averaged for the volume ratio feature
pub const VOLUME_LOOKBACK: usize = 20;

/// Bars a pivot-based pattern must span before it is evaluated
pub const MIN_PATTERN_BARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trendline {
    pub slope: f64,
    pub intercept: f64,
}

impl Trendline {
    /// Least-squares fit; `None` with fewer than two distinct x values
    pub fn fit(points: &[(f64, f64)]) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        let n = points.len() as f64;
        let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
        let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
        let mut sxy = 0.0;
        let mut sxx = 0.0;
        for (x, y) in points {
            sxy += (x - mean_x) * (y - mean_y);
            sxx += (x - mean_x) * (x - mean_x);
        }
        if sxx <= f64::EPSILON {
            return None;
        }
        let slope = sxy / sxx;
        Some(Self {
            slope,
            intercept: mean_y - slope * mean_x,
        })
    }

    /// Line through two pivots
    pub fn through(a: &Pivot, b: &Pivot) -> Option<Self> {
        Self::fit(&[(a.index as f64, a.price), (b.index as f64, b.price)])
    }

    #[inline]
    pub fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slope {
    Rising,
    Flat,
    Falling,
}

impl Slope {
    pub fn classify(drift: f64, tolerance: f64) -> Self {
        if drift > tolerance {
            Slope::Rising
        } else if drift < -tolerance {
            Slope::Falling
        } else {
            Slope::Flat
        }
    }
}

/// Upper line through the highs, lower line through the lows
#[derive(Debug, Clone, Copy)]
pub struct Channel {
    pub upper: Trendline,
    pub lower: Trendline,
    /// First and last fitted bar index
    pub start: usize,
    pub end: usize,
    pub reference_price: f64,
}

impl Channel {
    /// Needs at least two highs and two lows
    pub fn fit(pivots: &[Pivot]) -> Option<Self> {
        let points = |kind: PivotKind| -> Vec<(f64, f64)> {
            pivots
                .iter()
                .filter(|p| p.kind == kind)
                .map(|p| (p.index as f64, p.price))
                .collect()
        };
        let upper = Trendline::fit(&points(PivotKind::High))?;
        let lower = Trendline::fit(&points(PivotKind::Low))?;
        let start = pivots.first()?.index;
        let end = pivots.last()?.index;
        let reference_price = pivots.iter().map(|p| p.price).sum::<f64>() / pivots.len() as f64;
        if end <= start || reference_price <= 0.0 {
            return None;
        }
        Some(Self {
            upper,
            lower,
            start,
            end,
            reference_price,
        })
    }

    fn drift(&self, line: &Trendline) -> f64 {
        line.slope * (self.end - self.start) as f64 / self.reference_price
    }

    #[inline]
    pub fn upper_drift(&self) -> f64 {
        self.drift(&self.upper)
    }

    #[inline]
    pub fn lower_drift(&self) -> f64 {
        self.drift(&self.lower)
    }

    #[inline]
    pub fn width_at(&self, x: f64) -> f64 {
        self.upper.at(x) - self.lower.at(x)
    }

    /// Fractional narrowing from the first to the last fitted bar
    pub fn convergence(&self) -> Option<f64> {
        let w0 = self.width_at(self.start as f64);
        let w1 = self.width_at(self.end as f64);
        (w0 > 0.0 && w1 > 0.0).then(|| 1.0 - w1 / w0)
    }

    /// 1.0 when both lines drift by the same magnitude
    pub fn slope_symmetry(&self) -> f64 {
        let (u, l) = (self.upper_drift().abs(), self.lower_drift().abs());
        if u + l <= f64::EPSILON {
            return 1.0;
        }
        1.0 - (u - l).abs() / (u + l)
    }
}

/// The trailing `n` pivots
#[inline]
pub fn trailing(pivots: &[Pivot], n: usize) -> &[Pivot] {
    &pivots[pivots.len().saturating_sub(n)..]
}

/// Pivots alternate in kind, starting with `first`
pub fn alternates(pivots: &[Pivot], first: PivotKind) -> bool {
    let mut expected = first;
    for p in pivots {
        if p.kind != expected {
            return false;
        }
        expected = expected.opposite();
    }
    true
}

/// `|a - b|` over their mean
#[inline]
pub fn relative_diff(a: f64, b: f64) -> f64 {
    let mid = (a + b) / 2.0;
    if mid <= 0.0 {
        return f64::INFINITY;
    }
    (a - b).abs() / mid
}

/// Maps an error measured against a tolerance onto 0..=1
#[inline]
pub fn closeness(error: f64, tolerance: f64) -> f64 {
    if tolerance <= 0.0 {
        return if error <= 0.0 { 1.0 } else { 0.0 };
    }
    (1.0 - error / tolerance).clamp(0.0, 1.0)
}

/// Pivots must point into `series`
pub fn check_pivots(series: &Series, pivots: &[Pivot]) -> Result<()> {
    match pivots.iter().find(|p| p.index >= series.len()) {
        Some(_) => Err(PatternError::InvalidValue("pivot index outside series")),
        None => Ok(()),
    }
}

/// Last close with its bar index
pub fn last_close(series: &Series) -> Result<(usize, f64)> {
    let last = series
        .last()
        .ok_or(PatternError::InsufficientData { need: 1, got: 0 })?;
    Ok((series.len() - 1, last.close()))
}

/// Last volume over the mean of the preceding bars; 1.0 without history
pub fn volume_ratio(series: &Series) -> f64 {
    let bars = series.bars();
    let Some((last, prior)) = bars.split_last() else {
        return 1.0;
    };
    let prior = &prior[prior.len().saturating_sub(VOLUME_LOOKBACK)..];
    let volumes: Vec<f64> = prior.iter().map(|b| b.volume()).collect();
    match indicators::mean(&volumes) {
        Some(avg) if avg > 0.0 => last.volume() / avg,
        _ => 1.0,
    }
}

/// Timestamp of a bar index known to be in range
#[inline]
pub fn time_at(series: &Series, index: usize) -> i64 {
    series.get(index).map(|b| b.timestamp()).unwrap_or_default()
}

#[inline]
pub fn pivot_point(p: &Pivot) -> Point {
    Point(p.timestamp, p.price)
}

/// Trendline drawn from `start` to `end` bar
pub fn line_overlay(series: &Series, line: &Trendline, start: usize, end: usize, style: Style) -> Overlay {
    Overlay::line(
        vec![
            Point(time_at(series, start), line.at(start as f64)),
            Point(time_at(series, end), line.at(end as f64)),
        ],
        style,
    )
}

/// Polyline through the pivots
pub fn path_overlay(pivots: &[Pivot], style: Style) -> Overlay {
    Overlay::poly(pivots.iter().map(pivot_point).collect(), style)
}

/// Recent volume bars ending at the last bar
pub fn volume_overlay(series: &Series, bars: usize) -> Overlay {
    let tail = &series.bars()[series.len().saturating_sub(bars)..];
    Overlay::volume(tail.iter().map(|b| Point(b.timestamp(), b.volume())).collect())
}

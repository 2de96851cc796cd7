//! Confirmed breakout checks
//!
//! The trailing `lookback + confirm_bars` bars are split into a reference
//! window and the confirmation bars. A breakout is confirmed when the last
//! close clears the reference extreme and the last volume exceeds the
//! reference mean by the configured multiple.

use serde::{Deserialize, Serialize};

use crate::{indicators, Direction, PatternId, Series, OHLCV};

/// Default multiple of the reference mean volume
pub const DEFAULT_VOLUME_MULTIPLE: f64 = 1.5;

/// Keeps the volume ratio finite over a silent reference window
const VOLUME_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakoutDirection {
    /// Close above the reference high
    Up,
    /// Close below the reference low
    Down,
}

/// Which breakout directions confirm a pattern
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakoutPolicy {
    /// Bullish patterns need an upside break, bearish ones a breakdown,
    /// neutral ones either
    #[default]
    ByPolarity,
    /// Every pattern needs an upside break
    UpOnly,
}

impl BreakoutPolicy {
    pub fn directions(self, pattern: PatternId) -> &'static [BreakoutDirection] {
        match self {
            BreakoutPolicy::UpOnly => &[BreakoutDirection::Up],
            BreakoutPolicy::ByPolarity => match pattern.typical_direction() {
                Direction::Bullish => &[BreakoutDirection::Up],
                Direction::Bearish => &[BreakoutDirection::Down],
                Direction::Neutral => &[BreakoutDirection::Up, BreakoutDirection::Down],
            },
        }
    }
}

/// Upside breakout with the default volume multiple
pub fn confirmed_breakout(series: &Series, lookback: usize, confirm_bars: usize) -> bool {
    confirmed(series, lookback, confirm_bars, BreakoutDirection::Up, DEFAULT_VOLUME_MULTIPLE)
}

/// Downside breakout with the default volume multiple
pub fn confirmed_breakdown(series: &Series, lookback: usize, confirm_bars: usize) -> bool {
    confirmed(series, lookback, confirm_bars, BreakoutDirection::Down, DEFAULT_VOLUME_MULTIPLE)
}

/// Returns false when the series is shorter than `lookback + confirm_bars` or
/// either window is empty
pub fn confirmed(
    series: &Series,
    lookback: usize,
    confirm_bars: usize,
    direction: BreakoutDirection,
    volume_multiple: f64,
) -> bool {
    let bars = series.bars();
    let need = lookback + confirm_bars;
    if lookback == 0 || confirm_bars == 0 || bars.len() < need {
        return false;
    }
    let segment = &bars[bars.len() - need..];
    let reference = &segment[..lookback];
    let Some(last) = segment.last() else {
        return false;
    };

    let volumes: Vec<f64> = reference.iter().map(|b| b.volume()).collect();
    let Some(avg_volume) = indicators::mean(&volumes) else {
        return false;
    };
    let volume_ok = last.volume() / (avg_volume + VOLUME_EPSILON) > volume_multiple;

    let price_ok = match direction {
        BreakoutDirection::Up => {
            let resistance = reference.iter().map(|b| b.high()).fold(f64::MIN, f64::max);
            last.close() > resistance
        }
        BreakoutDirection::Down => {
            let support = reference.iter().map(|b| b.low()).fold(f64::MAX, f64::min);
            last.close() < support
        }
    };
    price_ok && volume_ok
}

//! Zigzag pivot extraction
//!
//! A swing is confirmed once price reverses from its running extreme by more
//! than `ATR * atr_multiple / sensitivity` (floored at `close * min_move_pct`).
//! Only confirmed pivots are emitted, so highs and lows strictly alternate and
//! the still-forming leg at the end of the series never appears.

use serde::{Deserialize, Serialize};

use crate::{indicators, params::PivotConfig, Series, OHLCV};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PivotKind {
    High,
    Low,
}

impl PivotKind {
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            PivotKind::High => PivotKind::Low,
            PivotKind::Low => PivotKind::High,
        }
    }
}

/// A confirmed swing high or low
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pivot {
    /// Bar position in the series the pivot was extracted from
    pub index: usize,
    #[serde(rename = "t")]
    pub timestamp: i64,
    pub kind: PivotKind,
    pub price: f64,
}

#[derive(Debug, Clone, Copy)]
enum Swing {
    /// No leg confirmed yet; track both extremes
    Undecided { high: usize, low: usize },
    Up { extreme: usize },
    Down { extreme: usize },
}

/// Extract pivots with the default [`PivotConfig`]
pub fn extract_pivots(series: &Series, sensitivity: f64) -> Vec<Pivot> {
    extract_pivots_with(series, sensitivity, &PivotConfig::default())
}

/// Extract pivots; higher `sensitivity` lowers the reversal threshold.
///
/// Returns an empty list for fewer than three bars or a non-positive sensitivity.
pub fn extract_pivots_with(series: &Series, sensitivity: f64, config: &PivotConfig) -> Vec<Pivot> {
    let bars = series.bars();
    if bars.len() < 3 || !sensitivity.is_finite() || sensitivity <= 0.0 {
        return Vec::new();
    }

    let atr = indicators::atr(bars, config.atr_period.get());
    let threshold = |i: usize| {
        let floor = bars[i].close() * config.min_move_pct;
        (atr[i] * config.atr_multiple).max(floor) / sensitivity
    };

    let mut pivots = Vec::new();
    let mut push = |index: usize, kind: PivotKind| {
        let bar = &bars[index];
        let price = match kind {
            PivotKind::High => bar.high(),
            PivotKind::Low => bar.low(),
        };
        pivots.push(Pivot {
            index,
            timestamp: bar.timestamp(),
            kind,
            price,
        });
    };

    let mut swing = Swing::Undecided { high: 0, low: 0 };
    for i in 1..bars.len() {
        let thr = threshold(i);
        swing = match swing {
            Swing::Undecided { mut high, mut low } => {
                if bars[i].high() > bars[high].high() {
                    high = i;
                }
                if bars[i].low() < bars[low].low() {
                    low = i;
                }
                if high == i && low < i && bars[i].high() - bars[low].low() > thr {
                    push(low, PivotKind::Low);
                    Swing::Up { extreme: i }
                } else if low == i && high < i && bars[high].high() - bars[i].low() > thr {
                    push(high, PivotKind::High);
                    Swing::Down { extreme: i }
                } else {
                    Swing::Undecided { high, low }
                }
            }
            Swing::Up { extreme } => {
                if bars[i].high() > bars[extreme].high() {
                    Swing::Up { extreme: i }
                } else if bars[extreme].high() - bars[i].low() > thr {
                    push(extreme, PivotKind::High);
                    Swing::Down { extreme: i }
                } else {
                    Swing::Up { extreme }
                }
            }
            Swing::Down { extreme } => {
                if bars[i].low() < bars[extreme].low() {
                    Swing::Down { extreme: i }
                } else if bars[i].high() - bars[extreme].low() > thr {
                    push(extreme, PivotKind::Low);
                    Swing::Up { extreme: i }
                } else {
                    Swing::Down { extreme }
                }
            }
        };
    }

    if config.max_pivots > 0 && pivots.len() > config.max_pivots {
        pivots.drain(..pivots.len() - config.max_pivots);
    }
    pivots
}

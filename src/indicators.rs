//! Trailing indicator values
//!
//! Each function returns the value at the most recent bar, or `None` when the
//! input is too short for the indicator to be defined.

use crate::OHLCV;

/// Guards the RSI ratio against a zero average loss
const RSI_EPSILON: f64 = 1e-12;

/// Arithmetic mean, `None` on empty input
#[inline]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Simple moving average over the last `window` values
pub fn sma(values: &[f64], window: usize) -> Option<f64> {
    if window == 0 || values.len() < window {
        return None;
    }
    mean(&values[values.len() - window..])
}

/// Recursive exponential smoothing seeded with the first value.
///
/// Returns `None` until `min_periods` observations have been seen.
pub fn ewm(values: &[f64], alpha: f64, min_periods: usize) -> Option<f64> {
    if values.is_empty() || values.len() < min_periods.max(1) {
        return None;
    }
    let mut acc = values[0];
    for v in &values[1..] {
        acc = alpha * v + (1.0 - alpha) * acc;
    }
    Some(acc)
}

/// Exponential moving average with smoothing `2 / (span + 1)`, defined once
/// `span` values exist
pub fn ema(values: &[f64], span: usize) -> Option<f64> {
    if span == 0 {
        return None;
    }
    ewm(values, 2.0 / (span as f64 + 1.0), span)
}

/// Wilder's RSI (smoothing `1 / period`), bounded to 0..=100.
///
/// A window with neither gains nor losses reads 50.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < 2 {
        return None;
    }
    let (gains, losses): (Vec<f64>, Vec<f64>) = closes
        .windows(2)
        .map(|w| {
            let d = w[1] - w[0];
            (d.max(0.0), (-d).max(0.0))
        })
        .unzip();
    let alpha = 1.0 / period as f64;
    let avg_gain = ewm(&gains, alpha, period)?;
    let avg_loss = ewm(&losses, alpha, period)?;
    if avg_gain <= 0.0 && avg_loss <= 0.0 {
        return Some(50.0);
    }
    let rs = avg_gain / (avg_loss + RSI_EPSILON);
    Some((100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0))
}

/// True range of a bar given the previous close
#[inline]
pub fn true_range(high: f64, low: f64, prev_close: Option<f64>) -> f64 {
    let hl = high - low;
    match prev_close {
        Some(pc) => hl.max((high - pc).abs()).max((low - pc).abs()),
        None => hl,
    }
}

/// True range for every bar
pub fn true_ranges<T: OHLCV>(bars: &[T]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, b)| {
            let prev = (i > 0).then(|| bars[i - 1].close());
            true_range(b.high(), b.low(), prev)
        })
        .collect()
}

/// Rolling mean aligned to the input; the first `window - 1` entries average
/// whatever history exists
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (i, v) in values.iter().enumerate() {
        sum += v;
        if i >= window {
            sum -= values[i - window];
        }
        let n = (i + 1).min(window);
        out.push(sum / n as f64);
    }
    out
}

/// Average true range per bar
pub fn atr<T: OHLCV>(bars: &[T], period: usize) -> Vec<f64> {
    rolling_mean(&true_ranges(bars), period)
}

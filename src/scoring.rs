//! Card scoring
//!
//! A [`ScoringModel`] turns a pattern's static prior plus the measured
//! features of a match into a probability and a confidence band.

use serde::{Deserialize, Serialize};

use crate::{params::ScoringWeights, Features};

/// Distance past the pattern's trigger line, positive in the pattern's direction
pub const FEATURE_BREAKOUT_PCT: &str = "breakout_pct";
/// Shape regularity in 0..=1
pub const FEATURE_SYMMETRY: &str = "symmetry";
/// Last volume over the trailing mean
pub const FEATURE_VOLUME_RATIO: &str = "volume_ratio";
/// Set when a confirmed breakout gated the card
pub const FEATURE_RECENT_BREAKOUT: &str = "recent_breakout";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Band with the default cutoffs (0.55 / 0.70)
    pub fn classify(prob: f64) -> Self {
        let w = ScoringWeights::default();
        Self::classify_with(prob, w.medium_cutoff, w.high_cutoff)
    }

    pub fn classify_with(prob: f64, medium: f64, high: f64) -> Self {
        if prob >= high {
            Confidence::High
        } else if prob >= medium {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

/// Pluggable scoring seam
pub trait ScoringModel: Send + Sync {
    /// Probability in 0..=1 and its confidence band
    fn score(&self, base_probability: f64, features: &Features) -> (f64, Confidence);
}

/// Linear bonus model over the named features, clamped to 0..=1.
///
/// All weights are non-negative, so the score never decreases when
/// breakout distance, symmetry or volume ratio increase.
#[derive(Debug, Clone, Default)]
pub struct DefaultScoringModel {
    weights: ScoringWeights,
}

impl DefaultScoringModel {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }
}

fn numeric(features: &Features, name: &str) -> f64 {
    features
        .get(name)
        .and_then(|f| f.as_f64())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

#[inline]
fn unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

impl ScoringModel for DefaultScoringModel {
    fn score(&self, base_probability: f64, features: &Features) -> (f64, Confidence) {
        let w = &self.weights;
        let breakout = unit(numeric(features, FEATURE_BREAKOUT_PCT) / w.breakout_scale);
        let symmetry = unit(numeric(features, FEATURE_SYMMETRY));
        let volume = unit((numeric(features, FEATURE_VOLUME_RATIO) - 1.0) / w.volume_scale);
        let recent = unit(numeric(features, FEATURE_RECENT_BREAKOUT));

        let prob = unit(
            unit(base_probability)
                + w.breakout_weight * breakout
                + w.symmetry_weight * symmetry
                + w.volume_weight * volume
                + w.recent_breakout_weight * recent,
        );
        (prob, Confidence::classify_with(prob, w.medium_cutoff, w.high_cutoff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Feature;

    fn features(pairs: &[(&str, Feature)]) -> Features {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_empty_features_return_prior() {
        let model = DefaultScoringModel::default();
        let (p, c) = model.score(0.6, &Features::new());
        assert!((p - 0.6).abs() < 1e-12);
        assert_eq!(c, Confidence::Medium);
    }

    #[test]
    fn test_bonuses_add_up() {
        let model = DefaultScoringModel::default();
        let f = features(&[
            (FEATURE_BREAKOUT_PCT, Feature::Number(0.05)),
            (FEATURE_SYMMETRY, Feature::Number(1.0)),
            (FEATURE_VOLUME_RATIO, Feature::Number(3.0)),
            (FEATURE_RECENT_BREAKOUT, Feature::Flag(true)),
        ]);
        let (p, c) = model.score(0.6, &f);
        assert!((p - 0.9).abs() < 1e-9);
        assert_eq!(c, Confidence::High);
    }

    #[test]
    fn test_clamped() {
        let model = DefaultScoringModel::new(ScoringWeights {
            symmetry_weight: 5.0,
            ..ScoringWeights::default()
        });
        let f = features(&[(FEATURE_SYMMETRY, Feature::Number(1.0))]);
        assert_eq!(model.score(0.9, &f).0, 1.0);
        assert_eq!(model.score(-3.0, &Features::new()).0, 0.0);
        assert_eq!(model.score(f64::NAN, &Features::new()).0, 0.0);
    }

    #[test]
    fn test_non_finite_features_ignored() {
        let model = DefaultScoringModel::default();
        let f = features(&[(FEATURE_BREAKOUT_PCT, Feature::Number(f64::INFINITY))]);
        assert!((model.score(0.5, &f).0 - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_confidence_bands() {
        assert_eq!(Confidence::classify(0.3), Confidence::Low);
        assert_eq!(Confidence::classify(0.55), Confidence::Medium);
        assert_eq!(Confidence::classify(0.7), Confidence::High);
        assert!(Confidence::High > Confidence::Low);
    }
}

//! Pattern detectors
//!
//! # Pattern Categories
//!
//! - **Continuation (7)**: ascending/descending/symmetrical triangles, bull/bear flags,
//!   rising/falling wedges
//! - **Reversal (4)**: double top/bottom, head-and-shoulders and its inverse
//! - **Candle (5)**: bullish/bearish engulfing, hammer, shooting star, doji
//!
//! Each detector owns its parameter group and is a pure function of the series,
//! the pivots and those parameters.

/// Declare a detector struct holding its parameter group.
macro_rules! define_detector {
  ($(#[$doc:meta])* $name:ident($params:ty)) => {
    $(#[$doc])*
    #[derive(Debug, Clone, Default)]
    pub struct $name {
      pub params: $params,
    }

    impl $name {
      pub fn new(params: $params) -> Self {
        Self { params }
      }

      pub fn with_defaults() -> Self {
        Self::default()
      }
    }
  };
}

/// Implement `ParameterizedDetector` by delegating to the parameter group.
macro_rules! impl_parameterized {
  ($($detector:ty => $params:ty, $id:expr);* $(;)?) => {
    $(impl crate::params::ParameterizedDetector for $detector {
      fn param_meta() -> &'static [crate::params::ParamMeta] {
        <$params>::param_meta()
      }

      fn with_params(params: &std::collections::HashMap<&str, f64>) -> crate::Result<Self> {
        Ok(Self::new(<$params>::from_map(params)?))
      }

      fn pattern_id_str() -> &'static str {
        $id.as_str()
      }
    })*
  };
}

pub mod helpers;

pub mod candle;
pub mod continuation;
pub mod reversal;

// Re-export all detectors for convenience
pub use candle::*;
pub use continuation::*;
pub use reversal::*;

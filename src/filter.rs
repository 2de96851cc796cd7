//! Indicator filter clauses
//!
//! A clause compares two operands, e.g. `RSI(14)<30`, `EMA50>EMA200`,
//! `CLOSE>SMA(30)` or `VOLUME>1.5*VOL_SMA(20)`. Clauses are case and
//! whitespace insensitive, compiled once per scan and combined with AND.
//!
//! Operand grammar:
//!
//! ```text
//! operand    := number | [number '*'] indicator
//! indicator  := NAME [ '(' window ')' | window ]
//! comparison := '>' | '<' | '>=' | '<='
//! ```

use std::fmt;

use crate::{indicators, params::FilterConfig, Series};

/// Clause parse failures, reported before any data is loaded
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    #[error("empty clause")]
    Empty,

    #[error("clause `{0}` needs exactly one of >, <, >=, <=")]
    MissingOperator(String),

    #[error("unknown identifier `{0}`")]
    UnknownIdentifier(String),

    #[error("`{name}` does not support window {window}")]
    InvalidWindow { name: String, window: usize },

    #[error("invalid number `{0}`")]
    InvalidNumber(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indicator {
    Close,
    Sma(usize),
    Ema(usize),
    Rsi(usize),
    Volume,
    VolumeSma(usize),
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Indicator::Close => write!(f, "CLOSE"),
            Indicator::Sma(n) => write!(f, "SMA{n}"),
            Indicator::Ema(n) => write!(f, "EMA{n}"),
            Indicator::Rsi(n) => write!(f, "RSI{n}"),
            Indicator::Volume => write!(f, "V"),
            Indicator::VolumeSma(n) => write!(f, "VOL_SMA{n}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Literal(f64),
    Scaled { factor: f64, indicator: Indicator },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Lt,
    Ge,
    Le,
}

impl Comparison {
    #[inline]
    fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::Gt => lhs > rhs,
            Comparison::Lt => lhs < rhs,
            Comparison::Ge => lhs >= rhs,
            Comparison::Le => lhs <= rhs,
        }
    }
}

/// One compiled comparison
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub lhs: Operand,
    pub op: Comparison,
    pub rhs: Operand,
    source: String,
}

impl Clause {
    pub fn parse(text: &str, config: &FilterConfig) -> Result<Self, FilterError> {
        let source: String = text
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();
        if source.is_empty() {
            return Err(FilterError::Empty);
        }

        let Some(pos) = source.find(['<', '>']) else {
            return Err(FilterError::MissingOperator(source));
        };
        let (lhs, rest) = source.split_at(pos);
        let (op, rhs) = match rest.as_bytes() {
            [b'>', b'=', ..] => (Comparison::Ge, &rest[2..]),
            [b'<', b'=', ..] => (Comparison::Le, &rest[2..]),
            [b'>', ..] => (Comparison::Gt, &rest[1..]),
            _ => (Comparison::Lt, &rest[1..]),
        };
        if lhs.is_empty() || rhs.is_empty() || rhs.contains(['<', '>', '=']) {
            return Err(FilterError::MissingOperator(source));
        }

        Ok(Self {
            lhs: parse_operand(lhs, config)?,
            op,
            rhs: parse_operand(rhs, config)?,
            source,
        })
    }

    /// Normalized text of the clause
    pub fn source(&self) -> &str {
        &self.source
    }

    /// False when either side is undefined on this series
    pub fn evaluate(&self, env: &Environment<'_>) -> bool {
        match (env.operand(self.lhs), env.operand(self.rhs)) {
            (Some(l), Some(r)) => self.op.holds(l, r),
            _ => false,
        }
    }
}

fn parse_number(s: &str) -> Result<f64, FilterError> {
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(FilterError::InvalidNumber(s.to_string())),
    }
}

fn starts_numeric(s: &str) -> bool {
    s.starts_with(|c: char| c.is_ascii_digit() || c == '.' || c == '-' || c == '+')
}

fn parse_operand(s: &str, config: &FilterConfig) -> Result<Operand, FilterError> {
    if let Some((factor, ident)) = s.split_once('*') {
        return Ok(Operand::Scaled {
            factor: parse_number(factor)?,
            indicator: parse_indicator(ident, config)?,
        });
    }
    if starts_numeric(s) {
        return parse_number(s).map(Operand::Literal);
    }
    Ok(Operand::Scaled {
        factor: 1.0,
        indicator: parse_indicator(s, config)?,
    })
}

fn parse_window(s: &str) -> Result<usize, FilterError> {
    s.parse::<usize>()
        .map_err(|_| FilterError::InvalidNumber(s.to_string()))
}

fn parse_indicator(s: &str, config: &FilterConfig) -> Result<Indicator, FilterError> {
    let (name, window) = if let Some(inner) = s.strip_suffix(')') {
        let Some((name, arg)) = inner.split_once('(') else {
            return Err(FilterError::UnknownIdentifier(s.to_string()));
        };
        (name, Some(parse_window(arg)?))
    } else {
        let name = s.trim_end_matches(|c: char| c.is_ascii_digit());
        let digits = &s[name.len()..];
        let window = if digits.is_empty() {
            None
        } else {
            Some(parse_window(digits)?)
        };
        (name, window)
    };

    let invalid = |window: usize| FilterError::InvalidWindow {
        name: name.to_string(),
        window,
    };
    let positive = |w: usize| if w == 0 { Err(invalid(w)) } else { Ok(w) };

    match name {
        "CLOSE" | "PRICE" => match window {
            None => Ok(Indicator::Close),
            Some(w) => Err(invalid(w)),
        },
        "V" | "VOL" | "VOLUME" => match window {
            None => Ok(Indicator::Volume),
            Some(w) => Err(invalid(w)),
        },
        "SMA" | "MA" => {
            positive(window.unwrap_or(config.sma_window.get())).map(Indicator::Sma)
        }
        "VOL_SMA" | "VOLUME_SMA" | "VOLSMA" => {
            positive(window.unwrap_or(config.volume_sma_window.get())).map(Indicator::VolumeSma)
        }
        "EMA" => match window {
            Some(w) if config.ema_spans.contains(&w) => Ok(Indicator::Ema(w)),
            Some(w) => Err(invalid(w)),
            None => Err(FilterError::UnknownIdentifier(s.to_string())),
        },
        "RSI" => {
            let period = config.rsi_period.get();
            match window {
                None => Ok(Indicator::Rsi(period)),
                Some(w) if w == period => Ok(Indicator::Rsi(w)),
                Some(w) => Err(invalid(w)),
            }
        }
        _ => Err(FilterError::UnknownIdentifier(s.to_string())),
    }
}

/// Indicator values over one series, computed on demand
pub struct Environment<'a> {
    series: &'a Series,
    closes: Vec<f64>,
    volumes: Vec<f64>,
}

impl<'a> Environment<'a> {
    pub fn new(series: &'a Series) -> Self {
        Self {
            series,
            closes: series.closes(),
            volumes: series.volumes(),
        }
    }

    pub fn value(&self, indicator: Indicator) -> Option<f64> {
        match indicator {
            Indicator::Close => self.series.last().map(|b| b.close),
            Indicator::Volume => self.series.last().map(|b| b.volume),
            Indicator::Sma(n) => indicators::sma(&self.closes, n),
            Indicator::Ema(n) => indicators::ema(&self.closes, n),
            Indicator::Rsi(n) => indicators::rsi(&self.closes, n),
            Indicator::VolumeSma(n) => indicators::sma(&self.volumes, n),
        }
    }

    fn operand(&self, operand: Operand) -> Option<f64> {
        match operand {
            Operand::Literal(v) => Some(v),
            Operand::Scaled { factor, indicator } => self.value(indicator).map(|v| factor * v),
        }
    }
}

/// Conjunction of compiled clauses
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorFilter {
    clauses: Vec<Clause>,
}

impl IndicatorFilter {
    pub fn compile<S: AsRef<str>>(clauses: &[S], config: &FilterConfig) -> Result<Self, FilterError> {
        let clauses = clauses
            .iter()
            .map(|c| Clause::parse(c.as_ref(), config))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { clauses })
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// An empty filter passes everything
    pub fn passes(&self, series: &Series) -> bool {
        if self.clauses.is_empty() {
            return true;
        }
        let env = Environment::new(series);
        self.clauses.iter().all(|c| c.evaluate(&env))
    }

    /// First clause that fails on this series
    pub fn first_failure(&self, series: &Series) -> Option<&Clause> {
        let env = Environment::new(series);
        self.clauses.iter().find(|c| !c.evaluate(&env))
    }
}

/// Compile with default windows and evaluate against `series`
pub fn passes<S: AsRef<str>>(series: &Series, clauses: &[S]) -> Result<bool, FilterError> {
    Ok(IndicatorFilter::compile(clauses, &FilterConfig::default())?.passes(series))
}

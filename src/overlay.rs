//! Chart overlay vocabulary attached to cards
//!
//! Serialized as `{"version": 1, "series": [{"type": "line", ...}, ...]}`.
//! Points are `[timestamp_ms, price]` pairs.

use serde::{Deserialize, Serialize};

pub const OVERLAY_VERSION: u32 = 1;

/// `[timestamp_ms, price]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point(pub i64, pub f64);

/// Optional drawing hints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Style {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dashed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f64>,
}

impl Style {
    pub fn color(color: &str) -> Self {
        Self {
            color: Some(color.to_string()),
            ..Self::default()
        }
    }

    pub fn dashed(mut self) -> Self {
        self.dashed = true;
        self
    }

    pub fn width(mut self, width: f64) -> Self {
        self.width = Some(width);
        self
    }

    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = Some(alpha);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Overlay {
    Line {
        points: Vec<Point>,
        #[serde(flatten)]
        style: Style,
    },
    Ray {
        #[serde(rename = "from_")]
        from: Point,
        to: Point,
        #[serde(flatten)]
        style: Style,
    },
    Box {
        p1: Point,
        p2: Point,
        #[serde(flatten)]
        style: Style,
    },
    Poly {
        points: Vec<Point>,
        #[serde(flatten)]
        style: Style,
    },
    Label {
        at: Point,
        text: String,
        #[serde(flatten)]
        style: Style,
    },
    Level {
        y: f64,
        #[serde(flatten)]
        style: Style,
    },
    Volume {
        points: Vec<Point>,
        #[serde(flatten)]
        style: Style,
    },
}

impl Overlay {
    pub fn line(points: Vec<Point>, style: Style) -> Self {
        Overlay::Line { points, style }
    }

    pub fn ray(from: Point, to: Point, style: Style) -> Self {
        Overlay::Ray { from, to, style }
    }

    pub fn rect(p1: Point, p2: Point, style: Style) -> Self {
        Overlay::Box { p1, p2, style }
    }

    pub fn poly(points: Vec<Point>, style: Style) -> Self {
        Overlay::Poly { points, style }
    }

    pub fn label(at: Point, text: impl Into<String>) -> Self {
        Overlay::Label {
            at,
            text: text.into(),
            style: Style::default(),
        }
    }

    pub fn level(y: f64, style: Style) -> Self {
        Overlay::Level { y, style }
    }

    pub fn volume(points: Vec<Point>) -> Self {
        Overlay::Volume {
            points,
            style: Style::default(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Overlay::Line { .. } => "line",
            Overlay::Ray { .. } => "ray",
            Overlay::Box { .. } => "box",
            Overlay::Poly { .. } => "poly",
            Overlay::Label { .. } => "label",
            Overlay::Level { .. } => "level",
            Overlay::Volume { .. } => "volume",
        }
    }
}

/// Versioned overlay list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overlays {
    pub version: u32,
    pub series: Vec<Overlay>,
}

impl Default for Overlays {
    fn default() -> Self {
        Self {
            version: OVERLAY_VERSION,
            series: Vec::new(),
        }
    }
}

impl Overlays {
    #[inline]
    pub fn push(&mut self, overlay: Overlay) {
        self.series.push(overlay);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.series.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

//! Renderer-independent chart description handed to the UI layer.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const DEFAULT_HEIGHT: u32 = 450;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceMode {
    Lines,
    Markers,
    LinesMarkers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dash {
    Solid,
    Dash,
    Dot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fill {
    ToZeroY,
}

/// Horizontal coordinates of a trace. `None` breaks the line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TraceAxis {
    Numeric(Vec<Option<f64>>),
    Timestamps(Vec<NaiveDateTime>),
}

impl TraceAxis {
    pub fn numeric(values: &[f64]) -> Self {
        TraceAxis::Numeric(values.iter().copied().map(Some).collect())
    }

    pub fn len(&self) -> usize {
        match self {
            TraceAxis::Numeric(values) => values.len(),
            TraceAxis::Timestamps(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub name: String,
    pub x: TraceAxis,
    pub y: Vec<Option<f64>>,
    pub mode: TraceMode,
    pub color: Option<String>,
    pub width: Option<f64>,
    pub dash: Dash,
    /// Marker diameter for `Markers`/`LinesMarkers` traces.
    pub marker_size: Option<f64>,
    pub fill: Option<Fill>,
    pub show_legend: bool,
}

impl Trace {
    pub fn line(name: impl Into<String>, x: &[f64], y: &[f64]) -> Self {
        Self::with_axis(name, TraceAxis::numeric(x), y.iter().copied().map(Some).collect())
    }

    pub fn with_axis(name: impl Into<String>, x: TraceAxis, y: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            mode: TraceMode::Lines,
            color: None,
            width: None,
            dash: Dash::Solid,
            marker_size: None,
            fill: None,
            show_legend: true,
        }
    }

    pub fn mode(mut self, mode: TraceMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn width(mut self, width: f64) -> Self {
        self.width = Some(width);
        self
    }

    pub fn dash(mut self, dash: Dash) -> Self {
        self.dash = dash;
        self
    }

    pub fn marker_size(mut self, size: f64) -> Self {
        self.marker_size = Some(size);
        self
    }

    pub fn fill(mut self, fill: Fill) -> Self {
        self.fill = Some(fill);
        self
    }

    pub fn hide_legend(mut self) -> Self {
        self.show_legend = false;
        self
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub title: String,
    pub range: Option<[f64; 2]>,
}

impl Axis {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            range: None,
        }
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.range = Some([min, max]);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub title: String,
    pub x_axis: Axis,
    pub y_axis: Axis,
    pub traces: Vec<Trace>,
    /// Lock the y scale to the x scale (vector fields).
    pub equal_aspect: bool,
    pub height: u32,
}

impl ChartSpec {
    pub fn new(title: impl Into<String>, x_axis: Axis, y_axis: Axis) -> Self {
        Self {
            title: title.into(),
            x_axis,
            y_axis,
            traces: Vec::new(),
            equal_aspect: false,
            height: DEFAULT_HEIGHT,
        }
    }

    pub fn trace(mut self, trace: Trace) -> Self {
        self.traces.push(trace);
        self
    }

    pub fn equal_aspect(mut self) -> Self {
        self.equal_aspect = true;
        self
    }

    pub fn height(mut self, height: u32) -> Self {
        self.height = height;
        self
    }

    pub fn find_trace(&self, name: &str) -> Option<&Trace> {
        self.traces.iter().find(|trace| trace.name == name)
    }

    /// True when no trace carries a point.
    pub fn is_blank(&self) -> bool {
        self.traces.iter().all(Trace::is_empty)
    }
}

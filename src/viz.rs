//! Turns a query result's rows plus its visualization descriptor into something
//! renderable. Pure; owns no state.

use crate::export::cell_text;
use crate::model::{Record, VisualizationDescriptor};
use serde_json::Value;

/// Fields probed, in order, for a metric's value. Only the first row is looked at.
pub const METRIC_FIELD_CANDIDATES: [&str; 3] = ["count", "total_amount", "avg_amount"];

/// Bar charts render at most this many rows.
pub const MAX_BARS: usize = 10;

pub const DEFAULT_METRIC_PLACEHOLDER: &str = "-";

#[derive(Debug, Clone, PartialEq)]
pub enum RenderSpec {
    Metric { label: String, value: String },
    Bars(Vec<Bar>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub label: String,
    pub value: f64,
    /// Share of the largest value across all rows, `0..=100`.
    pub width_pct: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Shown when no metric candidate field holds a value.
    pub metric_placeholder: String,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            metric_placeholder: DEFAULT_METRIC_PLACEHOLDER.to_string(),
        }
    }
}

pub fn resolve(rows: &[Record], descriptor: Option<&VisualizationDescriptor>) -> Option<RenderSpec> {
    resolve_with(rows, descriptor, &ResolveOptions::default())
}

pub fn resolve_with(
    rows: &[Record],
    descriptor: Option<&VisualizationDescriptor>,
    opts: &ResolveOptions,
) -> Option<RenderSpec> {
    let first = rows.first()?;
    match descriptor? {
        VisualizationDescriptor::Metric { value_label } => Some(RenderSpec::Metric {
            label: value_label.clone(),
            value: metric_value(first)
                .map(cell_text)
                .unwrap_or_else(|| opts.metric_placeholder.clone()),
        }),
        VisualizationDescriptor::Bar {
            x_field: Some(x),
            y_field: Some(y),
        } => Some(RenderSpec::Bars(bars(rows, x, y))),
        VisualizationDescriptor::Bar { .. } | VisualizationDescriptor::Unsupported => None,
    }
}

/// First candidate field present and non-null in `row`.
pub fn metric_value(row: &Record) -> Option<&Value> {
    METRIC_FIELD_CANDIDATES
        .iter()
        .find_map(|field| row.get(*field).filter(|v| !v.is_null()))
}

fn bars(rows: &[Record], x: &str, y: &str) -> Vec<Bar> {
    let y_of = |row: &Record| row.get(y).map(numeric).unwrap_or(0.0);
    // Scale against every row, not just the rendered ones.
    let scale = rows.iter().map(y_of).fold(1.0_f64, f64::max);

    rows.iter()
        .take(MAX_BARS)
        .map(|row| {
            let value = y_of(row);
            Bar {
                label: row.get(x).map(cell_text).unwrap_or_default(),
                value,
                width_pct: (value / scale * 100.0).round().clamp(0.0, 100.0) as u8,
            }
        })
        .collect()
}

/// Numbers as-is, numeric strings parsed; anything else, and non-finite values, is 0.
fn numeric(value: &Value) -> f64 {
    let n = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

/// Clamp a risk score onto the gauge's `0..=100` range. NaN reads as 0.
pub fn risk_gauge_percent(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

/// Compact number text: integral values without a fractional part.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value:.2}")
    }
}

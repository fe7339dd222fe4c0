use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use toml::Value;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};

/// Pass band or single cutoff for one metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gate {
    Range(f64, f64),
    Value(f64),
}

/// One governance entry after normalisation
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Threshold {
    pub gate: Option<Gate>,
    pub warn: Option<f64>,
    pub fail: Option<f64>,
}

impl Threshold {
    /// Accepts a bare number or a table with `gate`, `threshold`, `min`/`max`,
    /// `warn` and `fail` keys; anything else yields an empty entry.
    pub fn from_toml(value: &Value) -> Self {
        if let Some(number) = as_number(value) {
            return Self {
                gate: Some(Gate::Value(number)),
                ..Self::default()
            };
        }
        let Some(table) = value.as_table() else {
            return Self::default();
        };

        let field = |key: &str| table.get(key).and_then(as_number);
        let gate = table
            .get("gate")
            .and_then(gate_from_toml)
            .or_else(|| field("threshold").map(Gate::Value))
            .or_else(|| match (field("min"), field("max")) {
                (Some(lo), Some(hi)) => Some(Gate::Range(lo, hi)),
                (Some(lo), None) => Some(Gate::Value(lo)),
                (None, Some(hi)) => Some(Gate::Value(hi)),
                (None, None) => None,
            });

        Self {
            gate,
            warn: field("warn"),
            fail: field("fail"),
        }
    }

    /// Table cell text: `lo–hi`, the gate value, `<= fail`, `warn x`, else `-`
    pub fn render(&self) -> String {
        match (self.gate, self.fail, self.warn) {
            (Some(Gate::Range(lo, hi)), _, _) => format!("{:.2}–{:.2}", lo, hi),
            (Some(Gate::Value(v)), _, _) => format!("{:.2}", v),
            (None, Some(fail), _) => format!("<= {:.2}", fail),
            (None, None, Some(warn)) => format!("warn {:.2}", warn),
            (None, None, None) => "-".to_string(),
        }
    }
}

pub type Thresholds = BTreeMap<String, Threshold>;

pub fn format_gate(metric: &str, thresholds: &Thresholds) -> String {
    thresholds
        .get(metric)
        .map(Threshold::render)
        .unwrap_or_else(|| "-".to_string())
}

pub fn parse_thresholds(content: &str) -> Result<Thresholds> {
    let document: Value = toml::from_str(content)
        .map_err(|e| PipelineError::Config(format!("invalid thresholds file: {}", e)))?;

    let thresholds = match document.get("thresholds").and_then(Value::as_table) {
        Some(table) => table
            .iter()
            .map(|(metric, entry)| (metric.clone(), Threshold::from_toml(entry)))
            .collect(),
        None => Thresholds::new(),
    };
    Ok(thresholds)
}

/// Missing file means no gates; a malformed one is a configuration error
pub fn load_thresholds(path: &Path) -> Result<Thresholds> {
    if !path.exists() {
        warn!("Thresholds file {} not found, gates left blank", path.display());
        return Ok(Thresholds::new());
    }
    let thresholds = parse_thresholds(&fs::read_to_string(path)?)?;
    info!("Loaded {} metric gates from {}", thresholds.len(), path.display());
    Ok(thresholds)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Float(f) => Some(*f),
        Value::Integer(i) => Some(*i as f64),
        _ => None,
    }
}

fn gate_from_toml(value: &Value) -> Option<Gate> {
    if let Some(number) = as_number(value) {
        return Some(Gate::Value(number));
    }
    match value.as_array().map(|a| a.as_slice()) {
        Some([lo, hi]) => Some(Gate::Range(as_number(lo)?, as_number(hi)?)),
        _ => None,
    }
}

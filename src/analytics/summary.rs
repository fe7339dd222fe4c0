use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::thresholds::{format_gate, load_thresholds, Thresholds};
use crate::config::{MetricSettings, PathSettings};
use crate::data::ensure_parent;
use crate::error::Result;
use crate::ml::cluster::ClusterArtifact;
use crate::ml::persistence::{write_json, ArtifactStore};
use crate::ml::transition::{brier_score, expected_calibration_error};
use crate::ml::transition::calibration::ECE_BINS;
use crate::types::FeatureFrame;

/// One scored row as seen by the summarizer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredRecord {
    pub transition_prob: f64,
    pub actual_transition: f64,
    pub clarity: f64,
    pub abstain: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub prototype_drift: f64,
    pub ece: f64,
    pub brier: f64,
    pub abstain_rate: f64,
    pub transition_hit_ratio: f64,
    pub count: usize,
}

impl MetricsSummary {
    /// (name, rendered value, note) in report order
    fn rows(&self, transition_gate: f64) -> Vec<(&'static str, String, String)> {
        vec![
            (
                "prototype_drift",
                format!("{:.4}", self.prototype_drift),
                "Scaled Euclidean drift of cluster centroids".to_string(),
            ),
            (
                "ece",
                format!("{:.4}", self.ece),
                "Expected calibration error of transition probability".to_string(),
            ),
            (
                "brier",
                format!("{:.4}", self.brier),
                "Brier score of transition probability".to_string(),
            ),
            (
                "abstain_rate",
                format!("{:.4}", self.abstain_rate),
                "Share of observations abstaining".to_string(),
            ),
            (
                "transition_hit_ratio",
                format!("{:.4}", self.transition_hit_ratio),
                format!("Trigger gate uses transition_prob >= {:.2}", transition_gate),
            ),
            ("count", self.count.to_string(), "Sample size".to_string()),
        ]
    }
}

/// Aggregates calibration, abstention and drift into the governance report
pub struct CalibrationSummarizer {
    transition_gate: f64,
    thresholds: Thresholds,
    thresholds_source: Option<PathBuf>,
}

impl CalibrationSummarizer {
    pub fn new(transition_gate: f64, thresholds: Thresholds) -> Self {
        Self {
            transition_gate,
            thresholds,
            thresholds_source: None,
        }
    }

    pub fn from_settings(settings: &MetricSettings) -> Result<Self> {
        let thresholds = match &settings.thresholds_path {
            Some(path) => load_thresholds(path)?,
            None => Thresholds::new(),
        };
        Ok(Self {
            thresholds_source: settings.thresholds_path.clone(),
            ..Self::new(settings.transition_gate, thresholds)
        })
    }

    pub fn summarise(&self, records: &[ScoredRecord], prototype_drift: f64) -> MetricsSummary {
        let probs: Vec<f64> = records.iter().map(|r| r.transition_prob).collect();
        let actual: Vec<f64> = records.iter().map(|r| r.actual_transition).collect();

        let ece = expected_calibration_error(&probs, &actual, ECE_BINS);
        let abstain_rate = if records.is_empty() {
            0.0
        } else {
            records.iter().filter(|r| r.abstain).count() as f64 / records.len() as f64
        };

        let triggered: Vec<f64> = records
            .iter()
            .filter(|r| r.transition_prob >= self.transition_gate)
            .map(|r| r.actual_transition)
            .collect();
        let transition_hit_ratio = if triggered.is_empty() {
            0.0
        } else {
            triggered.iter().sum::<f64>() / triggered.len() as f64
        };

        MetricsSummary {
            prototype_drift,
            ece: if ece.is_nan() { 0.0 } else { ece },
            brier: brier_score(&probs, &actual),
            abstain_rate,
            transition_hit_ratio,
            count: records.len(),
        }
    }

    pub fn to_markdown(&self, summary: &MetricsSummary) -> String {
        let mut lines = vec![
            "# Validation Metrics".to_string(),
            String::new(),
            "| Metric | Value | Gate | Notes |".to_string(),
            "| --- | --- | --- | --- |".to_string(),
        ];
        for (metric, value, note) in summary.rows(self.transition_gate) {
            lines.push(format!(
                "| {} | {} | {} | {} |",
                metric,
                value,
                format_gate(metric, &self.thresholds),
                note
            ));
        }
        lines.push(String::new());
        match &self.thresholds_source {
            Some(path) => lines.push(format!("> Gates sourced from {}", path.display())),
            None => lines.push("> No gate source configured".to_string()),
        }
        lines.join("\n")
    }

    /// Summarise a scored frame and write both reports
    pub fn run(
        &self,
        frame: &FeatureFrame,
        cluster_store: &dyn ArtifactStore<ClusterArtifact>,
        paths: &PathSettings,
    ) -> Result<MetricsSummary> {
        let records = records_from_frame(frame)?;
        let drift = cluster_store
            .load()?
            .map(|artifact| artifact.prototype_drift)
            .unwrap_or(0.0);

        let summary = self.summarise(&records, drift);
        info!(
            "Metrics: ece={:.4}, brier={:.4}, abstain_rate={:.4}, hit_ratio={:.4}, n={}",
            summary.ece, summary.brier, summary.abstain_rate, summary.transition_hit_ratio, summary.count
        );

        write_json(&summary, &paths.metrics_json)?;
        write_markdown(&paths.metrics_markdown, &self.to_markdown(&summary))?;
        info!(
            "Wrote {} and {}",
            paths.metrics_json.display(),
            paths.metrics_markdown.display()
        );
        Ok(summary)
    }
}

/// Reads scored rows; absent columns default to 0 / false
pub fn records_from_frame(frame: &FeatureFrame) -> Result<Vec<ScoredRecord>> {
    let n = frame.len();
    let numeric_or_zero = |name: &str| -> Result<Vec<f64>> {
        if frame.has_column(name) {
            Ok(frame.numeric(name)?.to_vec())
        } else {
            warn!("Column '{}' missing from scored frame, defaulting to 0", name);
            Ok(vec![0.0; n])
        }
    };

    let transition_prob = numeric_or_zero("transition_prob")?;
    let actual_transition = numeric_or_zero("actual_transition")?;
    let clarity = numeric_or_zero("clarity")?;
    let abstain: Vec<bool> = if frame.has_column("abstain") {
        frame.labels("abstain")?.iter().map(|v| parse_flag(v)).collect()
    } else {
        warn!("Column 'abstain' missing from scored frame, defaulting to false");
        vec![false; n]
    };

    Ok((0..n)
        .map(|i| ScoredRecord {
            transition_prob: transition_prob[i],
            actual_transition: actual_transition[i],
            clarity: clarity[i],
            abstain: abstain[i],
        })
        .collect())
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

fn write_markdown(path: &Path, content: &str) -> Result<()> {
    ensure_parent(path)?;
    fs::write(path, content)?;
    Ok(())
}

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::PipelineError;
use crate::ml::cluster::AlignmentStrategy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub clusterer: ClustererSettings,
    pub training: TrainingSettings,
    pub inference: InferenceSettings,
    pub decision: DecisionSettings,
    pub metrics: MetricSettings,
    pub paths: PathSettings,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // Clusterer validation
        if self.clusterer.feature_columns.is_empty() {
            errors.push("clusterer: feature_columns must not be empty".to_string());
        }
        if self.clusterer.k == 0 {
            errors.push("clusterer: k must be > 0".to_string());
        }
        if self.clusterer.window_size < self.clusterer.k {
            errors.push("clusterer: window_size must be >= k".to_string());
        }
        if !(0.0..=1.0).contains(&self.clusterer.online_decay) {
            errors.push("clusterer: online_decay must be between 0 and 1".to_string());
        }

        errors.extend(self.training.problems());

        // Inference validation
        if !(0.0..=1.0).contains(&self.inference.transition_gate) {
            errors.push("inference: transition_gate must be between 0 and 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.inference.min_clarity) {
            errors.push("inference: min_clarity must be between 0 and 1".to_string());
        }

        // Decision validation
        if !(0.0..=1.0).contains(&self.decision.transition_gate) {
            errors.push("decision: transition_gate must be between 0 and 1".to_string());
        }
        if self.decision.clarity_breakpoints.len() != self.decision.position_scale.len() {
            errors.push("decision: clarity_breakpoints and position_scale must match in length".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// `validate` folded into a single configuration error
    pub fn ensure_valid(&self) -> Result<(), PipelineError> {
        self.validate()
            .map_err(|errors| PipelineError::Config(errors.join(", ")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClustererSettings {
    pub feature_columns: Vec<String>,
    pub window_size: usize,
    pub k: usize,
    pub online_decay: f64,
    pub alignment: AlignmentStrategy,
}

impl Default for ClustererSettings {
    fn default() -> Self {
        Self {
            feature_columns: vec![
                "bar_vpo_imbalance".to_string(),
                "bar_vpo_absorption".to_string(),
                "cvd_rolling".to_string(),
                "volprofile_skew".to_string(),
            ],
            window_size: 240,
            k: 2,
            online_decay: 0.97,
            alignment: AlignmentStrategy::IdentityOrReversal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    pub feature_columns: Vec<String>,
    pub label_column: String,
    pub state_a: String,
    pub state_b: String,
    pub regularisation: f64,
    pub max_iter: usize,
    pub learning_rate: f64,
    /// Early stop once the largest parameter step drops below this.
    /// `None` runs exactly `max_iter` iterations.
    pub tolerance: Option<f64>,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            feature_columns: vec!["macro_regime".to_string(), "volatility_slope".to_string()],
            label_column: "state".to_string(),
            state_a: "A".to_string(),
            state_b: "B".to_string(),
            regularisation: 1e-2,
            max_iter: 500,
            learning_rate: 0.05,
            tolerance: None,
        }
    }
}

impl TrainingSettings {
    pub fn problems(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.feature_columns.is_empty() {
            errors.push("training: feature_columns must not be empty".to_string());
        }
        if self.state_a == self.state_b {
            errors.push("training: state_a and state_b must differ".to_string());
        }
        if self.learning_rate <= 0.0 {
            errors.push("training: learning_rate must be > 0".to_string());
        }
        if self.max_iter == 0 {
            errors.push("training: max_iter must be > 0".to_string());
        }
        if self.regularisation < 0.0 {
            errors.push("training: regularisation must be >= 0".to_string());
        }
        if matches!(self.tolerance, Some(tol) if tol <= 0.0) {
            errors.push("training: tolerance must be > 0 when set".to_string());
        }
        errors
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    /// Columns scored at inference time; empty means the artifact's own list
    pub feature_columns: Vec<String>,
    pub transition_gate: f64,
    pub min_clarity: f64,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            feature_columns: Vec::new(),
            transition_gate: 0.65,
            min_clarity: 0.4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionSettings {
    pub transition_gate: f64,
    pub clarity_breakpoints: Vec<f64>,
    pub position_scale: Vec<f64>,
}

impl Default for DecisionSettings {
    fn default() -> Self {
        Self {
            transition_gate: 0.65,
            clarity_breakpoints: vec![0.0, 0.5, 0.7, 0.85, 1.0],
            position_scale: vec![0.0, 0.2, 0.5, 0.8, 1.0],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricSettings {
    pub transition_gate: f64,
    pub thresholds_path: Option<PathBuf>,
}

impl Default for MetricSettings {
    fn default() -> Self {
        Self {
            transition_gate: 0.65,
            thresholds_path: Some(PathBuf::from("governance/CONTROL_switch_policy.toml")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub cluster_artifact: PathBuf,
    pub alignment_log: PathBuf,
    pub labels_output: PathBuf,
    pub alignment_report: PathBuf,
    pub training_artifact: PathBuf,
    pub transition_output: PathBuf,
    pub calibration_output: PathBuf,
    pub metrics_json: PathBuf,
    pub metrics_markdown: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            cluster_artifact: PathBuf::from("model/clusterer_dynamic/cluster_artifacts.json"),
            alignment_log: PathBuf::from("output/cluster_alignment.log"),
            labels_output: PathBuf::from("output/clusterer_dynamic/labels_wt.csv"),
            alignment_report: PathBuf::from("output/clusterer_dynamic/label_alignment_report.md"),
            training_artifact: PathBuf::from("model/hmm_tvtp_adaptive/artifacts/model_params.json"),
            transition_output: PathBuf::from("output/tvtp/transition_prob.csv"),
            calibration_output: PathBuf::from("output/tvtp/calibration_report.json"),
            metrics_json: PathBuf::from("validation/metrics_summary.json"),
            metrics_markdown: PathBuf::from("validation/VALIDATION.md"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_collects_every_problem() {
        let mut config = PipelineConfig::default();
        config.clusterer.k = 0;
        config.training.state_b = "A".to_string();
        config.decision.position_scale.pop();

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(matches!(config.ensure_valid(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_window_shorter_than_k_rejected() {
        let config = PipelineConfig {
            clusterer: ClustererSettings {
                window_size: 1,
                k: 2,
                ..ClustererSettings::default()
            },
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}

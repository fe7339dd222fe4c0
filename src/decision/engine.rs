use tracing::debug;

use super::directional::{DirectionalClassifier, FlowDirectionalClassifier};
use crate::config::DecisionSettings;
use crate::error::{PipelineError, Result};
use crate::types::{DecisionLabel, DecisionReason, DecisionResult, FeatureVector, InferenceOutput};

/// Validated gate and clarity-to-size step table
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionConfig {
    transition_gate: f64,
    clarity_breakpoints: Vec<f64>,
    position_scale: Vec<f64>,
}

impl DecisionConfig {
    pub fn new(transition_gate: f64, clarity_breakpoints: Vec<f64>, position_scale: Vec<f64>) -> Result<Self> {
        if clarity_breakpoints.len() != position_scale.len() {
            return Err(PipelineError::Config(format!(
                "clarity_breakpoints ({}) and position_scale ({}) must have the same length",
                clarity_breakpoints.len(),
                position_scale.len()
            )));
        }
        if clarity_breakpoints.is_empty() {
            return Err(PipelineError::Config("clarity_breakpoints must not be empty".to_string()));
        }
        if clarity_breakpoints.windows(2).any(|w| w[0] > w[1]) {
            return Err(PipelineError::Config("clarity_breakpoints must be ascending".to_string()));
        }
        if position_scale.windows(2).any(|w| w[0] > w[1]) {
            return Err(PipelineError::Config("position_scale must be non-decreasing".to_string()));
        }
        if position_scale.iter().any(|s| !(0.0..=1.0).contains(s)) {
            return Err(PipelineError::Config("position_scale values must be between 0 and 1".to_string()));
        }
        if !(0.0..=1.0).contains(&transition_gate) {
            return Err(PipelineError::Config("transition_gate must be between 0 and 1".to_string()));
        }

        Ok(Self {
            transition_gate,
            clarity_breakpoints,
            position_scale,
        })
    }

    pub fn from_settings(settings: &DecisionSettings) -> Result<Self> {
        Self::new(
            settings.transition_gate,
            settings.clarity_breakpoints.clone(),
            settings.position_scale.clone(),
        )
    }

    pub fn transition_gate(&self) -> f64 {
        self.transition_gate
    }

    /// Scale of the first breakpoint at or above `clarity`, else the last scale
    pub fn position_size(&self, clarity: f64) -> f64 {
        self.clarity_breakpoints
            .iter()
            .position(|bp| clarity <= *bp)
            .map(|i| self.position_scale[i])
            .or_else(|| self.position_scale.last().copied())
            .unwrap_or(0.0)
    }
}

/// Gates inference output and sizes the position for rows that pass
pub struct DecisionEngine {
    config: DecisionConfig,
    classifier: Box<dyn DirectionalClassifier>,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig, classifier: Box<dyn DirectionalClassifier>) -> Self {
        Self { config, classifier }
    }

    /// Engine with the order-flow classifier
    pub fn with_default_classifier(config: DecisionConfig) -> Self {
        Self::new(config, Box::new(FlowDirectionalClassifier::default()))
    }

    pub fn evaluate(&self, features: &FeatureVector, inference: &InferenceOutput) -> DecisionResult {
        let unscored = !inference.transition_prob.is_finite() || !inference.clarity.is_finite();
        if inference.abstain || unscored || inference.transition_prob < self.config.transition_gate() {
            let reason = if inference.abstain {
                inference.reason
            } else if unscored {
                DecisionReason::LowConfidence
            } else {
                DecisionReason::TransitionProbBelowGate
            };
            return DecisionResult {
                label: DecisionLabel::Neutral,
                position_size: 0.0,
                abstain: true,
                reason,
                transition_prob: inference.transition_prob,
                clarity: inference.clarity,
                directional: None,
            };
        }

        let directional = self.classifier.infer(features);
        let position_size = self.config.position_size(inference.clarity);
        debug!(
            "{} -> {} (confidence {:.3}), size {:.2}",
            self.classifier.name(),
            directional.label,
            directional.confidence,
            position_size
        );

        DecisionResult {
            label: directional.label.into(),
            position_size,
            abstain: false,
            reason: DecisionReason::TransitionProbAboveThreshold,
            transition_prob: inference.transition_prob,
            clarity: inference.clarity,
            directional: Some(directional),
        }
    }
}

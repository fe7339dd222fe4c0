use tracing::{debug, info, warn};

use super::model::{sigmoid, TrainingArtifact};
use crate::config::InferenceSettings;
use crate::error::{PipelineError, Result};
use crate::ml::persistence::ArtifactStore;
use crate::types::{DecisionReason, FeatureFrame, FeatureVector, InferenceOutput};

/// Floor applied inside the entropy logs
pub const CLARITY_EPSILON: f64 = 1e-12;

/// 1 - H(p) / ln 2, clamped to [0, 1]. Exactly 0 at p = 0.5, 1 at p in {0, 1}.
pub fn clarity_from_prob(prob: f64) -> f64 {
    let p = prob.clamp(0.0, 1.0);
    let q = 1.0 - p;
    let entropy = -(p * p.max(CLARITY_EPSILON).ln() + q * q.max(CLARITY_EPSILON).ln());
    (1.0 - entropy / std::f64::consts::LN_2).clamp(0.0, 1.0)
}

/// Stateless per-row scorer over a trained transition artifact
#[derive(Debug, Clone)]
pub struct StateInferenceEngine {
    columns: Vec<String>,
    weights: Vec<f64>,
    intercept: f64,
    transition_gate: f64,
    min_clarity: f64,
}

impl StateInferenceEngine {
    /// Scores the configured columns, or the artifact's own columns when none
    /// are configured. Every scored column needs a coefficient.
    pub fn new(artifact: &TrainingArtifact, settings: &InferenceSettings) -> Result<Self> {
        let columns = if settings.feature_columns.is_empty() {
            artifact.feature_columns.clone()
        } else {
            settings.feature_columns.clone()
        };

        let missing: Vec<String> = columns
            .iter()
            .filter(|c| !artifact.coefficients.contains_key(*c))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::Schema { missing });
        }

        let weights = columns.iter().map(|c| artifact.coefficients[c]).collect();
        Ok(Self {
            columns,
            weights,
            intercept: artifact.intercept,
            transition_gate: settings.transition_gate,
            min_clarity: settings.min_clarity,
        })
    }

    pub fn from_store(store: &dyn ArtifactStore<TrainingArtifact>, settings: &InferenceSettings) -> Result<Self> {
        let artifact = store.load()?.ok_or_else(|| {
            PipelineError::InsufficientData(format!("no trained model at {}", store.location()))
        })?;
        info!(
            "Loaded transition model ({} -> {}) from {}",
            artifact.state_a,
            artifact.state_b,
            store.location()
        );
        Self::new(&artifact, settings)
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.columns
    }

    /// Scored columns that are absent or hold a non-finite value
    fn unusable_columns(&self, features: &FeatureVector) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !features.get(*c).is_some_and(|v| v.is_finite()))
            .cloned()
            .collect()
    }

    /// Blank (NaN) cells count as missing
    pub fn transition_probability(&self, features: &FeatureVector) -> Result<f64> {
        let missing = self.unusable_columns(features);
        if !missing.is_empty() {
            return Err(PipelineError::Schema { missing });
        }

        let logit = self
            .columns
            .iter()
            .zip(&self.weights)
            .fold(self.intercept, |acc, (c, w)| acc + features[c] * w);
        Ok(sigmoid(logit))
    }

    /// Absent columns are a schema error; a row with blank cells abstains
    pub fn infer(&self, features: &FeatureVector) -> Result<InferenceOutput> {
        let absent: Vec<String> = self
            .columns
            .iter()
            .filter(|c| !features.contains_key(*c))
            .cloned()
            .collect();
        if !absent.is_empty() {
            return Err(PipelineError::Schema { missing: absent });
        }

        let blank = self.unusable_columns(features);
        if !blank.is_empty() {
            warn!("Non-finite features {:?}, abstaining", blank);
            return Ok(InferenceOutput {
                transition_prob: 0.0,
                clarity: 0.0,
                abstain: true,
                reason: DecisionReason::LowConfidence,
            });
        }

        let transition_prob = self.transition_probability(features)?;
        let clarity = clarity_from_prob(transition_prob);
        let abstain = transition_prob < self.transition_gate || clarity < self.min_clarity;
        let reason = if abstain {
            DecisionReason::LowConfidence
        } else {
            DecisionReason::TransitionProbAboveThreshold
        };
        Ok(InferenceOutput {
            transition_prob,
            clarity,
            abstain,
            reason,
        })
    }

    pub fn infer_frame(&self, frame: &FeatureFrame) -> Result<Vec<InferenceOutput>> {
        frame.require(self.feature_columns())?;
        let outputs = frame.rows().map(|row| self.infer(&row)).collect::<Result<Vec<_>>>()?;
        debug!(
            "Inferred {} rows, {} abstained",
            outputs.len(),
            outputs.iter().filter(|o| o.abstain).count()
        );
        Ok(outputs)
    }
}

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::calibration::CalibrationReport;
use crate::config::{PathSettings, TrainingSettings};
use crate::data::write_csv;
use crate::error::{PipelineError, Result};
use crate::ml::persistence::{write_json, ArtifactStore};
use crate::types::FeatureFrame;

/// Trained state_a -> state_b transition model. Replaced wholesale by each run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingArtifact {
    pub coefficients: BTreeMap<String, f64>,
    pub intercept: f64,
    pub state_a: String,
    pub state_b: String,
    pub feature_columns: Vec<String>,
}

/// Lagged training rows: features at t, encoded state at t and t+1
#[derive(Debug, Clone)]
pub struct TransitionDataset {
    /// Source row index of each sample
    pub rows: Vec<usize>,
    pub features: Array2<f64>,
    pub current: Vec<f64>,
    pub next: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: TrainingArtifact,
    pub calibration: CalibrationReport,
    /// Training subset (rows currently in state_a) with fitted `transition_prob`
    pub transition_frame: FeatureFrame,
    pub iterations: usize,
}

/// state_b encodes as 1; state_a and anything else collapse to 0
pub fn encode_state(label: &str, state_a: &str, state_b: &str) -> f64 {
    if label == state_b && label != state_a {
        1.0
    } else {
        0.0
    }
}

/// Realised 0 -> 1 transition for each row (the last row has no successor)
pub fn actual_transitions(frame: &FeatureFrame, label_column: &str, state_a: &str, state_b: &str) -> Result<Vec<f64>> {
    let labels = frame.labels(label_column)?;
    Ok((0..labels.len())
        .map(|i| match labels.get(i + 1) {
            Some(next)
                if encode_state(&labels[i], state_a, state_b) == 0.0
                    && encode_state(next, state_a, state_b) == 1.0 =>
            {
                1.0
            }
            _ => 0.0,
        })
        .collect())
}

pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Regularized logistic regression over labeled regime transitions.
///
/// Only rows currently in state_a are used, so the model estimates the single
/// state_a -> state_b switch probability rather than a transition matrix.
pub struct TransitionModel {
    settings: TrainingSettings,
}

impl TransitionModel {
    pub fn new(settings: TrainingSettings) -> Result<Self> {
        let problems = settings.problems();
        if !problems.is_empty() {
            return Err(PipelineError::Config(problems.join(", ")));
        }
        Ok(Self { settings })
    }

    /// Pair each row's label with the next row's. Rows with a blank label, a
    /// blank successor label or a non-finite feature are dropped.
    pub fn build_dataset(&self, frame: &FeatureFrame) -> Result<TransitionDataset> {
        let s = &self.settings;
        let mut required = s.feature_columns.clone();
        required.push(s.label_column.clone());
        frame.require(&required)?;

        let matrix = frame.select(&s.feature_columns)?;
        let labels = frame.labels(&s.label_column)?;

        let rows: Vec<usize> = (0..frame.len().saturating_sub(1))
            .filter(|&i| {
                !labels[i].is_empty()
                    && !labels[i + 1].is_empty()
                    && matrix.row(i).iter().all(|v| v.is_finite())
            })
            .collect();

        Ok(TransitionDataset {
            features: matrix.select(Axis(0), &rows),
            current: rows.iter().map(|&i| encode_state(&labels[i], &s.state_a, &s.state_b)).collect(),
            next: rows.iter().map(|&i| encode_state(&labels[i + 1], &s.state_a, &s.state_b)).collect(),
            rows,
        })
    }

    pub fn train(&self, frame: &FeatureFrame) -> Result<TrainingOutcome> {
        let s = &self.settings;
        let dataset = self.build_dataset(frame)?;

        let subset: Vec<usize> = (0..dataset.current.len())
            .filter(|&i| dataset.current[i] == 0.0)
            .collect();
        if subset.is_empty() {
            return Err(PipelineError::InsufficientData(format!(
                "no rows currently in state '{}' to learn transitions from",
                s.state_a
            )));
        }

        let features = dataset.features.select(Axis(0), &subset);
        let targets = Array1::from_iter(subset.iter().map(|&i| dataset.next[i]));
        debug!(
            "Transition dataset: {} lagged rows, {} in state '{}', {} switches",
            dataset.rows.len(),
            subset.len(),
            s.state_a,
            targets.sum()
        );

        let (weights, bias, iterations) = fit_logistic(&features, &targets, s);
        let probs = predict(&features, &weights, bias);
        let calibration = CalibrationReport::compute(&probs.to_vec(), &targets.to_vec());

        let mut transition_frame = FeatureFrame::new();
        for (j, name) in s.feature_columns.iter().enumerate() {
            transition_frame = transition_frame.with_numeric(name.clone(), features.column(j).to_vec())?;
        }
        transition_frame = transition_frame.with_numeric("transition_prob", probs.to_vec())?;

        let artifact = TrainingArtifact {
            coefficients: s
                .feature_columns
                .iter()
                .cloned()
                .zip(weights.iter().copied())
                .collect(),
            intercept: bias,
            state_a: s.state_a.clone(),
            state_b: s.state_b.clone(),
            feature_columns: s.feature_columns.clone(),
        };

        info!(
            "Transition training complete: {} samples, {} iterations, ece={:.4} brier={:.4} log_loss={:.4}",
            calibration.count,
            iterations,
            calibration.ece,
            calibration.brier,
            log_loss(&probs, &targets)
        );

        Ok(TrainingOutcome {
            artifact,
            calibration,
            transition_frame,
            iterations,
        })
    }

    /// Train, then persist the artifact, the per-row probabilities and the
    /// calibration report. Any failed write fails the run.
    pub fn run(
        &self,
        frame: &FeatureFrame,
        store: &dyn ArtifactStore<TrainingArtifact>,
        paths: &PathSettings,
    ) -> Result<TrainingOutcome> {
        let outcome = self.train(frame)?;
        write_csv(&outcome.transition_frame, &paths.transition_output)?;
        write_json(&outcome.calibration, &paths.calibration_output)?;
        store.save(&outcome.artifact)?;
        Ok(outcome)
    }
}

/// Batch gradient descent on cross-entropy with an L2 penalty on the weights
/// (not the bias). Runs exactly `max_iter` steps unless a tolerance is set.
pub fn fit_logistic(
    features: &Array2<f64>,
    targets: &Array1<f64>,
    settings: &TrainingSettings,
) -> (Array1<f64>, f64, usize) {
    let n = features.nrows() as f64;
    let mut weights = Array1::<f64>::zeros(features.ncols());
    let mut bias = 0.0;

    for iter in 0..settings.max_iter {
        let probs = predict(features, &weights, bias);
        let errors = &probs - targets;
        let grad_w = features.t().dot(&errors) / n + &weights * settings.regularisation;
        let grad_b = errors.mean().unwrap_or(0.0);

        let step_w = grad_w * settings.learning_rate;
        let step_b = grad_b * settings.learning_rate;
        weights -= &step_w;
        bias -= step_b;

        if let Some(tol) = settings.tolerance {
            let largest = step_w.iter().fold(step_b.abs(), |acc, v| acc.max(v.abs()));
            if largest < tol {
                debug!("Logistic fit converged after {} iterations", iter + 1);
                return (weights, bias, iter + 1);
            }
        }
    }

    (weights, bias, settings.max_iter)
}

pub fn predict(features: &Array2<f64>, weights: &Array1<f64>, bias: f64) -> Array1<f64> {
    (features.dot(weights) + bias).mapv(sigmoid)
}

fn log_loss(probs: &Array1<f64>, targets: &Array1<f64>) -> f64 {
    const EPS: f64 = 1e-12;
    let n = probs.len().max(1) as f64;
    -probs
        .iter()
        .zip(targets)
        .map(|(&p, &y)| y * p.max(EPS).ln() + (1.0 - y) * (1.0 - p).max(EPS).ln())
        .sum::<f64>()
        / n
}

use serde::Serialize;
use tracing::{info, warn};

use crate::analytics::{CalibrationSummarizer, MetricsSummary};
use crate::config::PipelineConfig;
use crate::decision::{DecisionConfig, DecisionEngine};
use crate::error::Result;
use crate::ml::cluster::{ClusterArtifact, ClusterRunSummary, OnlineClusterer};
use crate::ml::persistence::{ArtifactStore, JsonFileStore};
use crate::ml::transition::{
    actual_transitions, CalibrationReport, StateInferenceEngine, TrainingArtifact, TrainingOutcome, TransitionModel,
};
use crate::types::{DecisionResult, FeatureFrame};

/// What the unified training entry reports back
#[derive(Debug, Clone, Serialize)]
pub struct TrainingRunSummary {
    pub clusterer: ClusterRunSummary,
    pub calibration: CalibrationReport,
    pub iterations: usize,
}

/// Wires every stage to its configured artifact stores
pub struct RegimePipeline {
    config: PipelineConfig,
    cluster_store: Box<dyn ArtifactStore<ClusterArtifact>>,
    training_store: Box<dyn ArtifactStore<TrainingArtifact>>,
}

impl RegimePipeline {
    /// JSON file stores at the configured artifact paths
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let cluster_store = Box::new(JsonFileStore::new(config.paths.cluster_artifact.clone()));
        let training_store = Box::new(JsonFileStore::new(config.paths.training_artifact.clone()));
        Self::with_stores(config, cluster_store, training_store)
    }

    pub fn with_stores(
        config: PipelineConfig,
        cluster_store: Box<dyn ArtifactStore<ClusterArtifact>>,
        training_store: Box<dyn ArtifactStore<TrainingArtifact>>,
    ) -> Result<Self> {
        config.ensure_valid()?;
        Ok(Self {
            config,
            cluster_store,
            training_store,
        })
    }

    pub fn fit_clusters(&self, frame: &FeatureFrame) -> Result<ClusterRunSummary> {
        info!("Clusterer stage: {} rows", frame.len());
        let clusterer = OnlineClusterer::new(self.config.clusterer.clone())?;
        let (_, summary) = clusterer.run(frame, self.cluster_store.as_ref(), &self.config.paths)?;
        Ok(summary)
    }

    pub fn train(&self, frame: &FeatureFrame) -> Result<TrainingOutcome> {
        info!("Transition training stage: {} rows", frame.len());
        let model = TransitionModel::new(self.config.training.clone())?;
        model.run(frame, self.training_store.as_ref(), &self.config.paths)
    }

    /// Clusterer then transition training; either failure stops the run
    pub fn run_training(&self, cluster_frame: &FeatureFrame, transition_frame: &FeatureFrame) -> Result<TrainingRunSummary> {
        let clusterer = self.fit_clusters(cluster_frame)?;
        let outcome = self.train(transition_frame)?;
        info!(
            "Training pipeline complete: drift={:.4}, ece={:.4}, brier={:.4}",
            clusterer.prototype_drift, outcome.calibration.ece, outcome.calibration.brier
        );
        Ok(TrainingRunSummary {
            clusterer,
            calibration: outcome.calibration,
            iterations: outcome.iterations,
        })
    }

    /// Per-row inference and decision over `frame`
    pub fn decide(&self, frame: &FeatureFrame) -> Result<Vec<DecisionResult>> {
        let inference = StateInferenceEngine::from_store(self.training_store.as_ref(), &self.config.inference)?;
        let decision = DecisionEngine::with_default_classifier(DecisionConfig::from_settings(&self.config.decision)?);

        let outputs = inference.infer_frame(frame)?;
        let results: Vec<DecisionResult> = frame
            .rows()
            .zip(&outputs)
            .map(|(row, output)| decision.evaluate(&row, output))
            .collect();

        let active = results.iter().filter(|r| !r.abstain).count();
        info!("Scored {} rows: {} active, {} abstained", results.len(), active, results.len() - active);
        Ok(results)
    }

    /// Input columns plus the scored columns read back by `summarize`
    pub fn score(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        let results = self.decide(frame)?;
        let training = &self.config.training;
        let actual = if frame.has_column(&training.label_column) {
            actual_transitions(frame, &training.label_column, &training.state_a, &training.state_b)?
        } else {
            warn!(
                "Label column '{}' absent, actual_transition set to 0",
                training.label_column
            );
            vec![0.0; frame.len()]
        };

        frame
            .clone()
            .with_numeric("transition_prob", results.iter().map(|r| r.transition_prob).collect())?
            .with_numeric("clarity", results.iter().map(|r| r.clarity).collect())?
            .with_text("abstain", results.iter().map(|r| r.abstain.to_string()).collect())?
            .with_text("reason", results.iter().map(|r| r.reason.to_string()).collect())?
            .with_text("decision", results.iter().map(|r| r.label.to_string()).collect())?
            .with_numeric("position_size", results.iter().map(|r| r.position_size).collect())?
            .with_numeric("actual_transition", actual)
    }

    pub fn summarize(&self, scored: &FeatureFrame) -> Result<MetricsSummary> {
        let summarizer = CalibrationSummarizer::from_settings(&self.config.metrics)?;
        summarizer.run(scored, self.cluster_store.as_ref(), &self.config.paths)
    }
}

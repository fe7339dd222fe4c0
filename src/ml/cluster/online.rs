use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::alignment::{align_centroids, prototype_drift, AlignmentOutcome};
use super::report::{
    append_alignment_log, export_labels, resolve_window_id, write_alignment_report, AlignmentReport,
};
use crate::config::{ClustererSettings, PathSettings};
use crate::error::{PipelineError, Result};
use crate::ml::persistence::ArtifactStore;
use crate::types::FeatureFrame;

/// Persisted centroid set; the only link between successive fits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterArtifact {
    pub centroids: Vec<Vec<f64>>,
    pub prototype_drift: f64,
}

impl ClusterArtifact {
    pub fn new(centroids: &Array2<f64>, prototype_drift: f64) -> Self {
        Self {
            centroids: centroids.outer_iter().map(|row| row.to_vec()).collect(),
            prototype_drift,
        }
    }

    /// Centroids as a (k x d) matrix; `None` when empty or ragged
    pub fn centroid_matrix(&self) -> Option<Array2<f64>> {
        let k = self.centroids.len();
        let d = self.centroids.first()?.len();
        if self.centroids.iter().any(|row| row.len() != d) {
            return None;
        }
        let flat: Vec<f64> = self.centroids.iter().flatten().copied().collect();
        Array2::from_shape_vec((k, d), flat).ok()
    }

    pub fn is_finite(&self) -> bool {
        self.prototype_drift.is_finite() && self.centroids.iter().flatten().all(|v| v.is_finite())
    }
}

/// Result of a single streaming fit over one window
#[derive(Debug, Clone)]
pub struct ClusterFit {
    pub labels: Vec<usize>,
    /// exp(-distance to the assigned centroid)
    pub weights: Vec<f64>,
    pub artifact: ClusterArtifact,
    pub alignment: AlignmentOutcome,
}

/// Summary returned to callers of a full clusterer run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterRunSummary {
    pub prototype_drift: f64,
    pub label_switch: bool,
}

/// Online prototype clusterer.
///
/// One sequential pass over the window: each row pulls its nearest centroid
/// toward itself by `1 - decay`. Row order is part of the result.
pub struct OnlineClusterer {
    settings: ClustererSettings,
}

impl OnlineClusterer {
    pub fn new(settings: ClustererSettings) -> Result<Self> {
        if settings.feature_columns.is_empty() {
            return Err(PipelineError::Config("clusterer: feature_columns must not be empty".to_string()));
        }
        if settings.k == 0 {
            return Err(PipelineError::Config("clusterer: k must be > 0".to_string()));
        }
        if !(0.0..=1.0).contains(&settings.online_decay) {
            return Err(PipelineError::Config(format!(
                "clusterer: online_decay {} outside [0, 1]",
                settings.online_decay
            )));
        }
        Ok(Self { settings })
    }

    /// Last `window_size` rows, minus rows with a blank or non-finite feature
    pub fn load_window(&self, dataset: &FeatureFrame) -> Result<FeatureFrame> {
        if dataset.is_empty() {
            return Err(PipelineError::InsufficientData(
                "feature dataset is empty; cannot fit clusterer".to_string(),
            ));
        }
        dataset.require(&self.settings.feature_columns)?;
        let window = dataset.tail(self.settings.window_size);

        let columns = self
            .settings
            .feature_columns
            .iter()
            .map(|c| window.numeric(c))
            .collect::<Result<Vec<_>>>()?;
        let complete: Vec<usize> = (0..window.len())
            .filter(|&i| columns.iter().all(|values| values[i].is_finite()))
            .collect();
        if complete.len() < window.len() {
            warn!(
                "Dropped {} window rows with non-finite features",
                window.len() - complete.len()
            );
        }
        if complete.len() < self.settings.k {
            return Err(PipelineError::InsufficientData(format!(
                "{} complete rows in window, need at least k={}",
                complete.len(),
                self.settings.k
            )));
        }
        Ok(window.take(&complete))
    }

    /// Fit centroids over `data` (rows in time order) and align them to `previous`
    pub fn fit(&self, data: &Array2<f64>, previous: Option<&ClusterArtifact>) -> Result<ClusterFit> {
        if data.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::InsufficientData(
                "clusterer input contains non-finite values".to_string(),
            ));
        }
        let centroids = initialise_centroids(data, self.settings.k)?;
        let centroids = online_update(data, centroids, self.settings.online_decay);

        let previous_centroids = previous.and_then(|artifact| {
            let matrix = artifact.centroid_matrix();
            if matrix.is_none() {
                warn!("Previous cluster artifact has no usable centroids; ignoring it");
            }
            matrix
        });

        let (aligned, alignment) =
            align_centroids(previous_centroids.as_ref(), &centroids, self.settings.alignment);
        let drift = prototype_drift(previous_centroids.as_ref(), &aligned);
        let (labels, weights) = assign_labels(data, &aligned);

        debug!(
            "Clusterer fit: {} rows, k={}, swapped={}, drift={:.4}",
            data.nrows(),
            self.settings.k,
            alignment.swapped,
            drift
        );

        Ok(ClusterFit {
            labels,
            weights,
            artifact: ClusterArtifact::new(&aligned, drift),
            alignment,
        })
    }

    /// Full run: window, fit, persist the artifact, export labels and reports
    pub fn run(
        &self,
        dataset: &FeatureFrame,
        store: &dyn ArtifactStore<ClusterArtifact>,
        paths: &PathSettings,
    ) -> Result<(ClusterFit, ClusterRunSummary)> {
        let window = self.load_window(dataset)?;
        let data = window.select(&self.settings.feature_columns)?;

        let previous = store.load()?;
        let fit = self.fit(&data, previous.as_ref())?;
        let drift = fit.artifact.prototype_drift;

        if !fit.artifact.is_finite() {
            return Err(PipelineError::InsufficientData(
                "fit produced non-finite centroids; artifact not saved".to_string(),
            ));
        }
        export_labels(&window, &fit.labels, &fit.weights, &paths.labels_output)?;
        store.save(&fit.artifact)?;
        append_alignment_log(
            &paths.alignment_log,
            self.settings.window_size,
            fit.alignment.swapped,
            drift,
        )?;
        let report = AlignmentReport::new(resolve_window_id(&window), fit.alignment.swapped, drift);
        write_alignment_report(&paths.alignment_report, &report)?;

        info!(
            "Clusterer fit complete: drift={:.4} swapped={} artifact={}",
            drift,
            fit.alignment.swapped,
            store.location()
        );

        let summary = ClusterRunSummary {
            prototype_drift: drift,
            label_switch: fit.alignment.swapped,
        };
        Ok((fit, summary))
    }
}

/// Starting centroids: k rows evenly spaced over the window
pub fn initialise_centroids(data: &Array2<f64>, k: usize) -> Result<Array2<f64>> {
    let n = data.nrows();
    if n < k || k == 0 {
        return Err(PipelineError::InsufficientData(format!(
            "not enough samples to initialise centroids: {} rows for k={}",
            n, k
        )));
    }
    Ok(data.select(Axis(0), &linspace_indices(n, k)))
}

/// Integer-truncated linspace(0, n - 1, k)
fn linspace_indices(n: usize, k: usize) -> Vec<usize> {
    if k == 1 {
        return vec![0];
    }
    let step = (n - 1) as f64 / (k - 1) as f64;
    (0..k)
        .map(|i| if i == k - 1 { n - 1 } else { (i as f64 * step) as usize })
        .collect()
}

/// One streaming epoch of winner-takes-all exponential blending
pub fn online_update(data: &Array2<f64>, mut centroids: Array2<f64>, decay: f64) -> Array2<f64> {
    for row in data.outer_iter() {
        let (winner, _) = nearest(&centroids, row);
        let mut target = centroids.row_mut(winner);
        target.zip_mut_with(&row, |c, &x| *c = decay * *c + (1.0 - decay) * x);
    }
    centroids
}

/// Nearest-centroid label and soft weight per row
pub fn assign_labels(data: &Array2<f64>, centroids: &Array2<f64>) -> (Vec<usize>, Vec<f64>) {
    data.outer_iter()
        .map(|row| {
            let (label, distance) = nearest(centroids, row);
            (label, (-distance).exp())
        })
        .unzip()
}

/// Index and Euclidean distance of the closest centroid; first wins on ties
fn nearest(centroids: &Array2<f64>, row: ArrayView1<f64>) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (idx, centroid) in centroids.outer_iter().enumerate() {
        let diff: Array1<f64> = &centroid - &row;
        let distance = diff.dot(&diff).sqrt();
        if distance < best.1 {
            best = (idx, distance);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::cluster::AlignmentStrategy;
    use crate::ml::persistence::{JsonFileStore, MemoryStore};
    use ndarray::array;
    use std::fs;

    fn settings(k: usize) -> ClustererSettings {
        ClustererSettings {
            feature_columns: vec!["x".to_string(), "y".to_string()],
            window_size: 240,
            k,
            online_decay: 0.5,
            alignment: AlignmentStrategy::IdentityOrReversal,
        }
    }

    fn two_blobs() -> Array2<f64> {
        array![
            [0.0, 0.0],
            [10.0, 10.0],
            [0.2, 0.0],
            [9.8, 10.0],
            [0.0, 0.2],
            [10.0, 9.8],
        ]
    }

    #[test]
    fn test_linspace_indices() {
        assert_eq!(linspace_indices(240, 3), vec![0, 119, 239]);
        assert_eq!(linspace_indices(5, 2), vec![0, 4]);
        assert_eq!(linspace_indices(5, 1), vec![0]);
        assert_eq!(linspace_indices(4, 4), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_insufficient_rows_for_k() {
        let data = array![[1.0, 2.0]];
        assert!(matches!(
            initialise_centroids(&data, 2),
            Err(PipelineError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_online_update_blends_winner_only() {
        let data = array![[2.0, 2.0]];
        let centroids = array![[0.0, 0.0], [10.0, 10.0]];
        let updated = online_update(&data, centroids, 0.5);
        assert_eq!(updated, array![[1.0, 1.0], [10.0, 10.0]]);
    }

    #[test]
    fn test_update_is_order_dependent() {
        let data = array![[0.0], [4.0], [1.0]];
        let start = array![[0.0], [10.0]];
        let forward = online_update(&data, start.clone(), 0.5);
        let reversed_rows = array![[1.0], [4.0], [0.0]];
        let backward = online_update(&reversed_rows, start, 0.5);
        assert_ne!(forward, backward);
    }

    #[test]
    fn test_weights_are_exp_of_negative_distance() {
        let data = array![[0.0, 0.0], [3.0, 4.0]];
        let centroids = array![[0.0, 0.0]];
        let (labels, weights) = assign_labels(&data, &centroids);
        assert_eq!(labels, vec![0, 0]);
        assert_eq!(weights[0], 1.0);
        assert!((weights[1] - (-5.0f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_fit_separates_blobs_and_keeps_identity_across_runs() {
        let clusterer = OnlineClusterer::new(settings(2)).unwrap();
        let data = two_blobs();

        let first = clusterer.fit(&data, None).unwrap();
        assert_eq!(first.labels, vec![0, 1, 0, 1, 0, 1]);
        assert_eq!(first.artifact.prototype_drift, 0.0);

        // Same regimes presented in the opposite order: labels must not flip
        let flipped = data.select(Axis(0), &[1, 0, 3, 2, 5, 4]);
        let second = clusterer.fit(&flipped, Some(&first.artifact)).unwrap();
        assert!(second.alignment.swapped);
        assert_eq!(second.labels, vec![1, 0, 1, 0, 1, 0]);
        assert!(second.artifact.prototype_drift < 0.05);
    }

    #[test]
    fn test_fit_with_mismatched_previous_artifact() {
        let clusterer = OnlineClusterer::new(settings(2)).unwrap();
        let previous = ClusterArtifact {
            centroids: vec![vec![0.0, 0.0, 0.0]],
            prototype_drift: 0.0,
        };
        let fit = clusterer.fit(&two_blobs(), Some(&previous)).unwrap();
        assert!(fit.alignment.shape_mismatch);
        assert_eq!(fit.artifact.prototype_drift, 0.0);
    }

    #[test]
    fn test_ragged_artifact_has_no_matrix() {
        let artifact = ClusterArtifact {
            centroids: vec![vec![0.0, 1.0], vec![2.0]],
            prototype_drift: 0.0,
        };
        assert!(artifact.centroid_matrix().is_none());
    }

    #[test]
    fn test_load_window_errors() {
        let clusterer = OnlineClusterer::new(settings(2)).unwrap();
        assert!(matches!(
            clusterer.load_window(&FeatureFrame::new()),
            Err(PipelineError::InsufficientData(_))
        ));
        let frame = FeatureFrame::new().with_numeric("x", vec![1.0, 2.0]).unwrap();
        assert!(matches!(
            clusterer.load_window(&frame),
            Err(PipelineError::Schema { .. })
        ));
    }

    #[test]
    fn test_fit_rejects_non_finite_input() {
        let clusterer = OnlineClusterer::new(settings(2)).unwrap();
        let data = array![[0.0, 0.0], [f64::NAN, 1.0], [10.0, 10.0]];
        assert!(matches!(
            clusterer.fit(&data, None),
            Err(PipelineError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_load_window_drops_blank_rows() {
        let clusterer = OnlineClusterer::new(settings(2)).unwrap();
        let frame = FeatureFrame::new()
            .with_numeric("x", vec![0.0, f64::NAN, 10.0, 1.0])
            .unwrap()
            .with_numeric("y", vec![0.0, 1.0, 10.0, f64::INFINITY])
            .unwrap();
        let window = clusterer.load_window(&frame).unwrap();
        assert_eq!(window.numeric("x").unwrap(), &[0.0, 10.0]);

        let sparse = FeatureFrame::new()
            .with_numeric("x", vec![0.0, f64::NAN])
            .unwrap()
            .with_numeric("y", vec![0.0, 1.0])
            .unwrap();
        assert!(matches!(
            clusterer.load_window(&sparse),
            Err(PipelineError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_blank_cell_survives_repeated_runs() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("features.csv");
        fs::write(&csv_path, "x,y\n0,0\n,1\n10,10\n1,1\n").unwrap();
        let frame = crate::data::read_csv(&csv_path).unwrap();
        let paths = PathSettings {
            cluster_artifact: dir.path().join("cluster_artifacts.json"),
            alignment_log: dir.path().join("alignment.log"),
            labels_output: dir.path().join("labels.csv"),
            alignment_report: dir.path().join("report.md"),
            ..PathSettings::default()
        };

        let clusterer = OnlineClusterer::new(settings(2)).unwrap();
        let store = JsonFileStore::new(&paths.cluster_artifact);
        let (first, _) = clusterer.run(&frame, &store, &paths).unwrap();
        assert_eq!(first.labels.len(), 3);
        assert!(first.artifact.is_finite());

        let (second, summary) = clusterer.run(&frame, &store, &paths).unwrap();
        assert!(second.artifact.is_finite());
        assert!(summary.prototype_drift.is_finite());
        let saved = store.load().unwrap().unwrap();
        assert!(saved.centroids.iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn test_non_finite_artifact_detected() {
        let artifact = ClusterArtifact {
            centroids: vec![vec![0.0, f64::NAN]],
            prototype_drift: 0.0,
        };
        assert!(!artifact.is_finite());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        assert!(OnlineClusterer::new(settings(0)).is_err());
        let mut bad_decay = settings(2);
        bad_decay.online_decay = 1.5;
        assert!(OnlineClusterer::new(bad_decay).is_err());
    }

    #[test]
    fn test_run_persists_artifact_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathSettings {
            cluster_artifact: dir.path().join("cluster_artifacts.json"),
            alignment_log: dir.path().join("alignment.log"),
            labels_output: dir.path().join("labels.csv"),
            alignment_report: dir.path().join("report.md"),
            ..PathSettings::default()
        };
        let data = two_blobs();
        let frame = FeatureFrame::new()
            .with_numeric("x", data.column(0).to_vec())
            .unwrap()
            .with_numeric("y", data.column(1).to_vec())
            .unwrap()
            .with_text("window_id", (0..6).map(|i| format!("w{}", i)).collect())
            .unwrap();

        let clusterer = OnlineClusterer::new(settings(2)).unwrap();
        let store = JsonFileStore::new(&paths.cluster_artifact);
        let (_, first) = clusterer.run(&frame, &store, &paths).unwrap();
        assert!(!first.label_switch);
        let (_, second) = clusterer.run(&frame, &store, &paths).unwrap();
        assert!(second.prototype_drift.abs() < 1e-12);

        let log = fs::read_to_string(&paths.alignment_log).unwrap();
        assert_eq!(log.lines().count(), 2);
        assert!(log.contains("window=240, label_switch=0, prototype_drift=0.0000"));
        let report = fs::read_to_string(&paths.alignment_report).unwrap();
        assert!(report.contains("| w5 | 0 | 1.0000 |"));
        let labels = fs::read_to_string(&paths.labels_output).unwrap();
        assert!(labels.starts_with("x,y,window_id,label,weight"));
    }

    #[test]
    fn test_run_against_memory_store() {
        let clusterer = OnlineClusterer::new(settings(2)).unwrap();
        let store = MemoryStore::with(ClusterArtifact {
            centroids: vec![vec![10.0, 10.0], vec![0.0, 0.0]],
            prototype_drift: 0.0,
        });
        let fit = clusterer
            .fit(&two_blobs(), store.load().unwrap().as_ref())
            .unwrap();
        assert!(fit.alignment.swapped);
        assert_eq!(fit.labels[0], 1);
    }
}

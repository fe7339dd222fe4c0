pub mod calibration;
pub mod inference;
pub mod model;

pub use calibration::{brier_score, expected_calibration_error, CalibrationReport};
pub use inference::StateInferenceEngine;
pub use model::{actual_transitions, TrainingArtifact, TrainingOutcome, TransitionModel};

use crate::types::{Direction, DirectionalOutput, FeatureVector};

/// Maps raw row features to a bullish/bearish call once a transition fires
pub trait DirectionalClassifier: Send + Sync {
    fn name(&self) -> &str;
    fn infer(&self, features: &FeatureVector) -> DirectionalOutput;
}

/// Order-flow heuristic: tanh(0.5 * MFI + 0.25 * sign(CVD)).
///
/// Missing inputs read as 0; a zero CVD counts as positive flow.
#[derive(Debug, Clone)]
pub struct FlowDirectionalClassifier {
    pub mfi_column: String,
    pub cvd_column: String,
}

impl Default for FlowDirectionalClassifier {
    fn default() -> Self {
        Self {
            mfi_column: "MFI".to_string(),
            cvd_column: "CVD".to_string(),
        }
    }
}

impl DirectionalClassifier for FlowDirectionalClassifier {
    fn name(&self) -> &str {
        "flow_tanh"
    }

    fn infer(&self, features: &FeatureVector) -> DirectionalOutput {
        let mfi = features.get(&self.mfi_column).copied().unwrap_or(0.0);
        let cvd = features.get(&self.cvd_column).copied().unwrap_or(0.0);
        let cvd_sign = if cvd >= 0.0 { 1.0 } else { -1.0 };

        let score = (0.5 * mfi + 0.25 * cvd_sign).tanh();
        let label = if score >= 0.0 {
            Direction::Bullish
        } else {
            Direction::Bearish
        };
        DirectionalOutput {
            label,
            confidence: score.abs(),
        }
    }
}

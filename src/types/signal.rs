use serde::{Deserialize, Serialize};
use std::fmt;

/// Why the inference step did or did not clear its gates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    LowConfidence,
    TransitionProbAboveThreshold,
    TransitionProbBelowGate,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::LowConfidence => "low_confidence",
            DecisionReason::TransitionProbAboveThreshold => "transition_prob_above_threshold",
            DecisionReason::TransitionProbBelowGate => "transition_prob_below_gate",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-row output of the state inference step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InferenceOutput {
    pub transition_prob: f64,
    pub clarity: f64,
    pub abstain: bool,
    pub reason: DecisionReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Bullish => "bullish",
            Direction::Bearish => "bearish",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionalOutput {
    pub label: Direction,
    /// |score| in [0, 1]
    pub confidence: f64,
}

/// Final label emitted by the decision gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionLabel {
    Neutral,
    Bullish,
    Bearish,
}

impl DecisionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionLabel::Neutral => "neutral",
            DecisionLabel::Bullish => "bullish",
            DecisionLabel::Bearish => "bearish",
        }
    }
}

impl From<Direction> for DecisionLabel {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Bullish => DecisionLabel::Bullish,
            Direction::Bearish => DecisionLabel::Bearish,
        }
    }
}

impl fmt::Display for DecisionLabel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub label: DecisionLabel,
    pub position_size: f64,
    pub abstain: bool,
    pub reason: DecisionReason,
    pub transition_prob: f64,
    pub clarity: f64,
    pub directional: Option<DirectionalOutput>,
}

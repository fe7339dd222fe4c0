pub mod directional;
pub mod engine;

pub use engine::{DecisionConfig, DecisionEngine};

pub mod alignment;
pub mod online;
pub mod report;

pub use alignment::AlignmentStrategy;
pub use online::{ClusterArtifact, ClusterRunSummary, OnlineClusterer};

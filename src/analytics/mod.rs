pub mod summary;
pub mod thresholds;

pub use summary::{CalibrationSummarizer, MetricsSummary};

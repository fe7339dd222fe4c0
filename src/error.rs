use thiserror::Error;

/// Failure classes of the decision pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid or inconsistent settings, detected before any computation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Required feature or label columns are absent
    #[error("Schema error: missing columns {missing:?}")]
    Schema { missing: Vec<String> },

    /// Not enough rows to run the requested stage
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl PipelineError {
    pub fn missing<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PipelineError::Schema {
            missing: columns.into_iter().map(Into::into).collect(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

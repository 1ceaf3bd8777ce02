use polars::error::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Data loading error: {0}")]
    DataLoading(#[from] PolarsError),
    #[error("Data quality error: {0}")]
    DataQuality(String),
    #[error("Split error: {rows} rows available, at least {required} required for a train/test split")]
    Split { rows: usize, required: usize },
    #[error("Metric error: {0}")]
    Metric(String),
    #[error("Invalid input error: {0}")]
    InvalidInput(String),
    #[error("Model error: {0}")]
    Model(String),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

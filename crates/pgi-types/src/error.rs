use thiserror::Error;

#[derive(Error, Debug)]
pub enum PgiError {
    #[error("Degenerate cluster component {component}: {message}")]
    DegenerateCluster { component: usize, message: String },

    #[error("Numerical degeneracy: {0}")]
    NumericalDegeneracy(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        got: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Linear algebra error: {0}")]
    LinAlg(String),
}

impl PgiError {
    pub fn mismatch(what: impl Into<String>, expected: usize, got: usize) -> Self {
        PgiError::DimensionMismatch {
            what: what.into(),
            expected,
            got,
        }
    }
}

pub type PgiResult<T> = Result<T, PgiError>;

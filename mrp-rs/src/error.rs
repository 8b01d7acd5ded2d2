use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error("failed to read stdin: {0}")]
    Stdin(#[source] std::io::Error),
    #[error("failed to parse JSON from stdin: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to deserialize input: {0}")]
    Input(#[source] serde_json::Error),
    #[error("failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolverError {
    #[error("invalid solver settings: {0}")]
    InvalidSettings(&'static str),
    #[error("time grid must be non-empty, finite and strictly increasing")]
    InvalidGrid,
    #[error("tolerances must be finite and positive (rtol={rtol}, atol={atol})")]
    InvalidTolerance { rtol: f64, atol: f64 },
    #[error("state became non-finite at t={t}")]
    NonFinite { t: f64 },
    #[error("step size {h:e} underflowed at t={t}")]
    StepSizeUnderflow { t: f64, h: f64 },
    #[error("more than the allowed number of steps were attempted before reaching t={t}")]
    MaxStepsExceeded { t: f64 },
}

#[derive(Debug, thiserror::Error)]
pub enum PlotError {
    #[error("series {label:?} has {got} values but the time axis has {expected}")]
    LengthMismatch {
        label: String,
        expected: usize,
        got: usize,
    },
    #[error("log axis needs 0 < min < max, got [{min}, {max}]")]
    InvalidLogRange { min: f64, max: f64 },
    #[error("nothing to plot")]
    Empty,
    #[error("rendering failed: {0}")]
    Render(String),
}

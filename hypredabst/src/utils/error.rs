use strum::EnumIs;
use thiserror::Error;

#[derive(Debug, Error, EnumIs)]
pub enum PredAbsError {
    /// The query was aborted through a cancellation request.
    #[error("The query was cancelled before the decision procedure produced an answer.")]
    Cancelled,

    /// The decision procedure answered neither sat nor unsat.
    #[error("The underlying decision procedure gave no definite answer: {diagnostic}")]
    SolverFailure { diagnostic: String },

    /// Exact DNF conversion would build more rows than allowed.
    #[error("DNF conversion exceeded the configured ceiling of {limit} rows.")]
    DnfRowLimitExceeded { limit: usize },

    #[error("Failed to parse configuration: {source}")]
    ConfigParse {
        #[from]
        source: toml::de::Error,
    },
}

impl PredAbsError {
    /// Returns `true` for failures that make the current query unanswerable.
    ///
    /// Cancellation is reported separately since it aborts the whole refinement loop.
    pub fn is_query_failure(&self) -> bool {
        matches!(
            self,
            PredAbsError::SolverFailure { .. } | PredAbsError::DnfRowLimitExceeded { .. }
        )
    }
}

pub type PredAbsResult<T> = Result<T, PredAbsError>;

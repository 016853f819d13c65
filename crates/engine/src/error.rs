//! Error taxonomy for the dispatch-and-correlate engine.
//!
//! Every variant is terminal: the engine performs no retry beyond the
//! bounded polling loop in [`crate::correlate`].

use gust_api::ApiError;
use thiserror::Error;

/// Failures surfaced by workflow resolution and run correlation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A listing call failed at the transport level.
    #[error("GitHub API error: {0}")]
    Transport(#[from] ApiError),

    /// No workflow file matched the requested reference.
    #[error("no workflow matching '{name}' found in {repo}")]
    WorkflowNotFound { repo: String, name: String },

    /// The dispatch request itself was rejected.
    #[error("workflow dispatch rejected: {0}")]
    Dispatch(#[source] ApiError),

    /// The workflow has no run history at all. Treated as fatal rather than
    /// transient: even a just-dispatched run leaves earlier history behind,
    /// so an empty listing points at a systemic problem.
    #[error("workflow '{workflow}' has no recorded runs")]
    NoRuns { workflow: String },

    /// The polling budget ran out without a qualifying run appearing.
    #[error("no new run appeared after {polls} polls")]
    CorrelationTimeout { polls: u32 },

    /// The run was identified but its detail view could not be fetched.
    #[error("failed to fetch details for run {id}")]
    DetailFetch {
        id: u64,
        #[source]
        source: ApiError,
    },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}

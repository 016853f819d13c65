//! Workflow reference resolution.
//!
//! Dispatch and run-listing endpoints address a workflow by its file name,
//! but users typically know it by a bare name like `deploy`. The resolver
//! turns one into the other by scanning the repository's workflow
//! definitions.

use gust_api::ActionsApi;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::EngineError;

/// Matches references that already name a workflow file.
static WORKFLOW_FILE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.ya?ml$").unwrap());
/// Extracts the file stem from a conventional workflow path.
static WORKFLOW_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\.github/workflows/([^/]+)\.ya?ml$").unwrap());

/// Resolve a workflow reference to the file name the API dispatches against.
///
/// A reference that already ends in `.yml` or `.yaml` is returned unchanged
/// without any remote call. Otherwise the repository's workflow definitions
/// are listed and the first one under `.github/workflows/` whose file stem
/// equals `workflow_ref` wins; its basename is returned.
pub async fn resolve_workflow_file<A: ActionsApi + Sync>(
    api: &A,
    repo: &str,
    workflow_ref: &str,
) -> Result<String, EngineError> {
    if WORKFLOW_FILE_RE.is_match(workflow_ref) {
        return Ok(workflow_ref.to_string());
    }

    let workflows = api.list_workflows(repo).await?;
    for descriptor in &workflows {
        let Some(captures) = WORKFLOW_PATH_RE.captures(&descriptor.path) else {
            continue;
        };
        if &captures[1] != workflow_ref {
            continue;
        }

        let basename = descriptor
            .path
            .rsplit('/')
            .next()
            .unwrap_or(&descriptor.path)
            .to_string();
        debug!(workflow_ref, %basename, "resolved workflow file");
        return Ok(basename);
    }

    Err(EngineError::WorkflowNotFound {
        repo: repo.to_string(),
        name: workflow_ref.to_string(),
    })
}

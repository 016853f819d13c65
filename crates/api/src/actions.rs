//! Actions endpoints and their wire types.
//!
//! The [`ActionsApi`] trait is the seam between the correlation engine and
//! the network: the engine is generic over it, and tests substitute scripted
//! implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gust_types::InputMap;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{ApiError, GitHubClient};

/// One workflow definition known to the remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkflowDescriptor {
    /// Repository-relative path, e.g. `.github/workflows/deploy.yml`.
    pub path: String,
}

#[derive(Debug, Deserialize)]
struct WorkflowListResponse {
    workflows: Vec<WorkflowDescriptor>,
}

/// Request body for the workflow dispatch endpoint.
///
/// An empty ref and an empty input map are omitted from the payload entirely
/// rather than sent as empty values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchBody {
    #[serde(rename = "ref", skip_serializing_if = "String::is_empty")]
    pub ref_name: String,
    #[serde(skip_serializing_if = "InputMap::is_empty")]
    pub inputs: InputMap,
}

/// One run entry from the run-listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunSummary {
    pub id: u64,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Run listing for one workflow, newest-first.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunList {
    pub total_count: u64,
    #[serde(rename = "workflow_runs")]
    pub runs: Vec<RunSummary>,
}

/// Canonical detail view of a single run.
///
/// The listing entries carry an API URL; the detail view is fetched
/// separately for the human-facing `html_url`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunDetail {
    pub html_url: String,
}

/// The GitHub Actions operations the engine depends on.
#[async_trait]
pub trait ActionsApi {
    /// List all workflow definitions for `repo` (`owner/name`).
    async fn list_workflows(&self, repo: &str) -> Result<Vec<WorkflowDescriptor>, ApiError>;

    /// Trigger a dispatch of `workflow_file` on `repo`.
    async fn dispatch_workflow(
        &self,
        repo: &str,
        workflow_file: &str,
        body: &DispatchBody,
    ) -> Result<(), ApiError>;

    /// List runs of `workflow_file` on `repo`, newest-first.
    async fn list_workflow_runs(
        &self,
        repo: &str,
        workflow_file: &str,
    ) -> Result<RunList, ApiError>;

    /// Fetch the detail view of one run by id.
    async fn run_detail(&self, repo: &str, run_id: u64) -> Result<RunDetail, ApiError>;
}

#[async_trait]
impl ActionsApi for GitHubClient {
    async fn list_workflows(&self, repo: &str) -> Result<Vec<WorkflowDescriptor>, ApiError> {
        let path = format!("/repos/{}/actions/workflows", repo);
        let response = self.request(Method::GET, &path).send().await?;
        let listing: WorkflowListResponse = expect_success(response).await?.json().await?;
        debug!(repo, count = listing.workflows.len(), "listed workflows");
        Ok(listing.workflows)
    }

    async fn dispatch_workflow(
        &self,
        repo: &str,
        workflow_file: &str,
        body: &DispatchBody,
    ) -> Result<(), ApiError> {
        let path = format!(
            "/repos/{}/actions/workflows/{}/dispatches",
            repo, workflow_file
        );
        let response = self.request(Method::POST, &path).json(body).send().await?;
        expect_success(response).await?;
        Ok(())
    }

    async fn list_workflow_runs(
        &self,
        repo: &str,
        workflow_file: &str,
    ) -> Result<RunList, ApiError> {
        let path = format!("/repos/{}/actions/workflows/{}/runs", repo, workflow_file);
        let response = self.request(Method::GET, &path).send().await?;
        Ok(expect_success(response).await?.json().await?)
    }

    async fn run_detail(&self, repo: &str, run_id: u64) -> Result<RunDetail, ApiError> {
        let path = format!("/repos/{}/actions/runs/{}", repo, run_id);
        let response = self.request(Method::GET, &path).send().await?;
        Ok(expect_success(response).await?.json().await?)
    }
}

/// Map a non-2xx response to [`ApiError::Status`], surfacing the API's
/// `message` field when the error body is parseable JSON.
async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(|message| message.as_str())
                .map(str::to_string)
        })
        .unwrap_or(body);

    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}

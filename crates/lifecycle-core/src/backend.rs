//! The execution backend seam: whatever hosts the workflows.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::repo::Repo;
use crate::types::ExecutionRun;

/// Page size used for directory listings. A shorter page ends the listing.
pub const REPO_PAGE_SIZE: u32 = 100;

/// One page of the owner's repository listing.
#[derive(Debug, Clone, PartialEq)]
pub enum RepoPage {
    /// The backend confirmed the caller's validation tag is still current.
    NotModified,
    Page {
        repos: Vec<Repo>,
        /// Cache token for this listing, when the backend supplied one.
        validation_tag: Option<String>,
    },
}

/// Inputs handed to a dispatched workflow.
///
/// `context` is the caller's payload as JSON text; workflow inputs are
/// strings only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInputs {
    pub operation_id: String,
    pub tenant_id: String,
    pub subscription_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// List one page of the owner's repositories. `if_none_match` is only
    /// meaningful on the first page.
    async fn list_repos(
        &self,
        owner: &str,
        page: u32,
        per_page: u32,
        if_none_match: Option<&str>,
    ) -> Result<RepoPage>;

    /// Recently completed runs for the repository.
    async fn list_completed_runs(&self, owner: &str, repo: &str) -> Result<Vec<ExecutionRun>>;

    /// Head commit sha of `branch`.
    async fn get_head_commit(&self, owner: &str, repo: &str, branch: &str) -> Result<String>;

    async fn workflow_exists(&self, owner: &str, repo: &str, action_type: &str) -> Result<bool>;

    async fn create_branch(&self, owner: &str, repo: &str, sha: &str, name: &str) -> Result<()>;

    /// Remove a branch. A branch that is already gone is not an error.
    async fn delete_branch(&self, owner: &str, repo: &str, name: &str) -> Result<()>;

    async fn dispatch_workflow(
        &self,
        owner: &str,
        repo: &str,
        action_type: &str,
        git_ref: &str,
        inputs: &WorkflowInputs,
    ) -> Result<()>;
}

//! Wire shapes of the GitHub REST responses and requests this crate uses.
//!
//! Only the fields the coordinator reads are modelled; unknown fields are
//! ignored.

use chrono::{DateTime, Utc};
use lifecycle_core::backend::WorkflowInputs;
use lifecycle_core::repo::Repo;
use lifecycle_core::types::{Conclusion, ExecutionRun};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct RepoResponse {
    pub name: String,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub owner: OwnerResponse,
}

#[derive(Debug, Deserialize)]
pub struct OwnerResponse {
    pub login: String,
}

impl From<RepoResponse> for Repo {
    fn from(r: RepoResponse) -> Self {
        Repo {
            name: r.name,
            default_branch: r.default_branch.unwrap_or_else(|| "main".to_string()),
            topics: r.topics.into_iter().collect(),
            owner: r.owner.login,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CommitResponse {
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub struct WorkflowRunsResponse {
    #[serde(default)]
    pub workflow_runs: Vec<WorkflowRunResponse>,
}

#[derive(Debug, Deserialize)]
pub struct WorkflowRunResponse {
    pub id: u64,
    #[serde(default)]
    pub head_branch: Option<String>,
    #[serde(default)]
    pub conclusion: Option<Conclusion>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorkflowRunResponse {
    /// `None` for runs without a branch or conclusion; neither can be matched.
    pub fn into_run(self) -> Option<ExecutionRun> {
        Some(ExecutionRun {
            run_id: self.id.to_string(),
            branch_name: self.head_branch?,
            conclusion: self.conclusion?,
            created_at: self.created_at,
            updated_at: self.updated_at,
            url: self.html_url,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct CreateRefRequest<'a> {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub sha: &'a str,
}

#[derive(Debug, Serialize)]
pub struct DispatchRequest<'a> {
    #[serde(rename = "ref")]
    pub git_ref: &'a str,
    pub inputs: &'a WorkflowInputs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_without_conclusion_is_dropped() {
        let r: WorkflowRunResponse = serde_json::from_str(
            r#"{"id": 9, "head_branch": "abc", "conclusion": null, "html_url": "u"}"#,
        )
        .unwrap();
        assert!(r.into_run().is_none());
    }

    #[test]
    fn repo_topics_become_a_set() {
        let r: RepoResponse = serde_json::from_str(
            r#"{"name":"a","default_branch":"trunk","topics":["x","x","y"],"owner":{"login":"acme"},"private":false}"#,
        )
        .unwrap();
        let repo: Repo = r.into();
        assert_eq!(repo.topics.len(), 2);
        assert_eq!(repo.default_branch, "trunk");
        assert_eq!(repo.owner, "acme");
    }

    #[test]
    fn dispatch_body_uses_ref_and_camel_case_inputs() {
        let inputs = WorkflowInputs {
            operation_id: "abc".into(),
            tenant_id: "t".into(),
            subscription_id: "s".into(),
            context: Some("{\"a\":1}".into()),
        };
        let body = serde_json::to_value(DispatchRequest {
            git_ref: "abc",
            inputs: &inputs,
        })
        .unwrap();
        assert_eq!(body["ref"], "abc");
        assert_eq!(body["inputs"]["operationId"], "abc");
        assert_eq!(body["inputs"]["context"], "{\"a\":1}");
    }
}

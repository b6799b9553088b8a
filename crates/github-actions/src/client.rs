use std::time::Duration;

use async_trait::async_trait;
use lifecycle_core::backend::{ExecutionBackend, RepoPage, WorkflowInputs};
use lifecycle_core::repo::Repo;
use lifecycle_core::types::ExecutionRun;
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::GitHubError;
use crate::types::{
    CommitResponse, CreateRefRequest, DispatchRequest, RepoResponse, WorkflowRunsResponse,
};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = "saas-lifecycle";
const RUNS_PER_PAGE: &str = "100";

type Result<T> = std::result::Result<T, GitHubError>;

/// GitHub REST client scoped to one token.
#[derive(Clone)]
pub struct GitHubClient {
    http: Client,
    base_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(DEFAULT_API_URL, token)
    }

    /// Point the client at another API root (GitHub Enterprise, test servers).
    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn request(&self, method: Method, route: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{route}", self.base_url))
            .bearer_auth(&self.token)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Turn a non-2xx response into `GitHubError::Status`.
    async fn check(method: &'static str, route: &str, resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(GitHubError::Status {
            method,
            route: route.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    async fn decode<T: DeserializeOwned>(route: &str, resp: Response) -> Result<T> {
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|source| GitHubError::Decode {
            route: route.to_string(),
            source,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        route: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let resp = self.request(Method::GET, route).query(query).send().await?;
        let resp = Self::check("GET", route, resp).await?;
        Self::decode(route, resp).await
    }

    pub async fn repos_page(
        &self,
        owner: &str,
        page: u32,
        per_page: u32,
        if_none_match: Option<&str>,
    ) -> Result<RepoPage> {
        let route = format!("/users/{owner}/repos");
        let page = page.to_string();
        let per_page = per_page.to_string();
        let mut req = self
            .request(Method::GET, &route)
            .query(&[("page", page.as_str()), ("per_page", per_page.as_str())]);
        if let Some(tag) = if_none_match {
            req = req.header(header::IF_NONE_MATCH, tag);
        }
        let resp = req.send().await?;
        if resp.status() == StatusCode::NOT_MODIFIED {
            debug!(owner, "repo listing not modified");
            return Ok(RepoPage::NotModified);
        }
        let resp = Self::check("GET", &route, resp).await?;
        let validation_tag = resp
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let repos: Vec<RepoResponse> = Self::decode(&route, resp).await?;
        Ok(RepoPage::Page {
            repos: repos.into_iter().map(Repo::from).collect(),
            validation_tag,
        })
    }

    pub async fn completed_runs(&self, owner: &str, repo: &str) -> Result<Vec<ExecutionRun>> {
        let route = format!("/repos/{owner}/{repo}/actions/runs");
        let runs: WorkflowRunsResponse = self
            .get_json(
                &route,
                &[
                    ("event", "workflow_dispatch"),
                    ("status", "completed"),
                    ("per_page", RUNS_PER_PAGE),
                ],
            )
            .await?;
        Ok(runs
            .workflow_runs
            .into_iter()
            .filter_map(|r| r.into_run())
            .collect())
    }

    pub async fn head_commit(&self, owner: &str, repo: &str, branch: &str) -> Result<String> {
        let route = format!("/repos/{owner}/{repo}/commits");
        let commits: Vec<CommitResponse> = self
            .get_json(&route, &[("sha", branch), ("per_page", "1")])
            .await?;
        commits
            .into_iter()
            .next()
            .map(|c| c.sha)
            .ok_or_else(|| GitHubError::EmptyHistory {
                repo: format!("{owner}/{repo}"),
                branch: branch.to_string(),
            })
    }

    pub async fn has_workflow(&self, owner: &str, repo: &str, action_type: &str) -> Result<bool> {
        let route = format!("/repos/{owner}/{repo}/actions/workflows/{action_type}.yml");
        let resp = self.request(Method::GET, &route).send().await?;
        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Self::check("GET", &route, resp).await.map(|_| true),
        }
    }

    pub async fn create_ref(&self, owner: &str, repo: &str, sha: &str, branch: &str) -> Result<()> {
        let route = format!("/repos/{owner}/{repo}/git/refs");
        let resp = self
            .request(Method::POST, &route)
            .json(&CreateRefRequest {
                git_ref: format!("refs/heads/{branch}"),
                sha,
            })
            .send()
            .await?;
        Self::check("POST", &route, resp).await?;
        Ok(())
    }

    pub async fn delete_ref(&self, owner: &str, repo: &str, branch: &str) -> Result<()> {
        let route = format!("/repos/{owner}/{repo}/git/refs/heads/{branch}");
        let resp = self.request(Method::DELETE, &route).send().await?;
        match resp.status() {
            // Already gone
            StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
                debug!(owner, repo, branch, "branch already deleted");
                Ok(())
            }
            _ => Self::check("DELETE", &route, resp).await.map(|_| ()),
        }
    }

    pub async fn dispatch(
        &self,
        owner: &str,
        repo: &str,
        action_type: &str,
        git_ref: &str,
        inputs: &WorkflowInputs,
    ) -> Result<()> {
        let route = format!("/repos/{owner}/{repo}/actions/workflows/{action_type}.yml/dispatches");
        let resp = self
            .request(Method::POST, &route)
            .json(&DispatchRequest { git_ref, inputs })
            .send()
            .await?;
        Self::check("POST", &route, resp).await?;
        Ok(())
    }
}

#[async_trait]
impl ExecutionBackend for GitHubClient {
    async fn list_repos(
        &self,
        owner: &str,
        page: u32,
        per_page: u32,
        if_none_match: Option<&str>,
    ) -> lifecycle_core::Result<RepoPage> {
        Ok(self.repos_page(owner, page, per_page, if_none_match).await?)
    }

    async fn list_completed_runs(
        &self,
        owner: &str,
        repo: &str,
    ) -> lifecycle_core::Result<Vec<ExecutionRun>> {
        Ok(self.completed_runs(owner, repo).await?)
    }

    async fn get_head_commit(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> lifecycle_core::Result<String> {
        Ok(self.head_commit(owner, repo, branch).await?)
    }

    async fn workflow_exists(
        &self,
        owner: &str,
        repo: &str,
        action_type: &str,
    ) -> lifecycle_core::Result<bool> {
        Ok(self.has_workflow(owner, repo, action_type).await?)
    }

    async fn create_branch(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
        name: &str,
    ) -> lifecycle_core::Result<()> {
        Ok(self.create_ref(owner, repo, sha, name).await?)
    }

    async fn delete_branch(&self, owner: &str, repo: &str, name: &str) -> lifecycle_core::Result<()> {
        Ok(self.delete_ref(owner, repo, name).await?)
    }

    async fn dispatch_workflow(
        &self,
        owner: &str,
        repo: &str,
        action_type: &str,
        git_ref: &str,
        inputs: &WorkflowInputs,
    ) -> lifecycle_core::Result<()> {
        Ok(self.dispatch(owner, repo, action_type, git_ref, inputs).await?)
    }
}

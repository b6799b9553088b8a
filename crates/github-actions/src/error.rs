use lifecycle_core::LifecycleError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{method} {route} returned {status}: {body}")]
    Status {
        method: &'static str,
        route: String,
        status: u16,
        body: String,
    },

    #[error("Failed to decode response from {route}: {source}")]
    Decode {
        route: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("No commits on {repo}@{branch}")]
    EmptyHistory { repo: String, branch: String },
}

impl GitHubError {
    /// 401 and 403: the token is missing, expired, or lacks scope.
    pub fn is_auth(&self) -> bool {
        matches!(self, GitHubError::Status { status: 401 | 403, .. })
    }
}

impl From<GitHubError> for LifecycleError {
    fn from(e: GitHubError) -> Self {
        if e.is_auth() {
            LifecycleError::BackendAuth(e.to_string())
        } else {
            LifecycleError::Backend(e.to_string())
        }
    }
}

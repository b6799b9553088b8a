use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("can't decide which workflow to run -- {}", format_candidates(.repos))]
    Conflict { repos: Vec<String> },

    #[error("operation already pending: {0}")]
    DuplicateOperation(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("backend rejected credentials: {0}")]
    BackendAuth(String),

    #[error("malformed operation record '{key}': {reason}")]
    PoisonItem { key: String, reason: String },

    #[error("cycle aborted: {0}")]
    FatalCycle(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("event sink error: {0}")]
    EventSink(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl LifecycleError {
    /// Errors that mean every unit of work in a cycle would fail the same way.
    ///
    /// Sweeps abort and re-raise on these instead of recording them against a
    /// single repo or record.
    pub fn is_systemic(&self) -> bool {
        matches!(
            self,
            LifecycleError::BackendAuth(_) | LifecycleError::FatalCycle(_)
        )
    }
}

fn format_candidates(repos: &[String]) -> String {
    repos
        .iter()
        .map(|r| format!("[{r}]"))
        .collect::<Vec<_>>()
        .join(" or ")
}

pub type Result<T> = std::result::Result<T, LifecycleError>;

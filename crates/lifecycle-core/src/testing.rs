//! In-process fakes for the backend, event sink and store seams.
//!
//! Shared by this crate's unit tests and, through the `testing` feature,
//! the server's integration tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{ExecutionBackend, RepoPage, WorkflowInputs};
use crate::error::{LifecycleError, Result};
use crate::events::{EventSink, LifecycleEvent};
use crate::repo::Repo;
use crate::store::{MemoryStore, Metadata, ObjectEntry, ObjectStore, StoredObject};
use crate::types::{Conclusion, EventType, ExecutionRun};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Build a repo owned by `acme` on `main`.
pub fn repo(name: &str, topics: &[&str]) -> Repo {
    Repo {
        name: name.to_string(),
        default_branch: "main".to_string(),
        topics: topics.iter().map(|t| t.to_string()).collect(),
        owner: "acme".to_string(),
    }
}

/// Build a completed run on `branch`.
pub fn run(run_id: &str, branch: &str, conclusion: Conclusion) -> ExecutionRun {
    ExecutionRun {
        run_id: run_id.to_string(),
        branch_name: branch.to_string(),
        conclusion,
        created_at: None,
        updated_at: None,
        url: format!("https://github.example/actions/runs/{run_id}"),
    }
}

// ---------------------------------------------------------------------------
// ScriptedBackend
// ---------------------------------------------------------------------------

/// A backend call, as recorded and as a failure injection point.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Call {
    ListRepos { page: u32 },
    ListCompletedRuns { repo: String },
    GetHeadCommit { repo: String },
    WorkflowExists { repo: String },
    CreateBranch { repo: String, name: String },
    DeleteBranch { repo: String, name: String },
    DispatchWorkflow { repo: String, git_ref: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Surfaces as `LifecycleError::Backend`.
    Transient,
    /// Surfaces as `LifecycleError::BackendAuth`.
    Auth,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub repo: String,
    pub action_type: String,
    pub git_ref: String,
    pub inputs: WorkflowInputs,
}

#[derive(Default)]
struct Script {
    repos: Vec<Repo>,
    repo_tag: Option<String>,
    workflows: BTreeSet<(String, String)>,
    runs: HashMap<String, Vec<ExecutionRun>>,
    branches: BTreeSet<(String, String)>,
    dispatched: Vec<Dispatched>,
    failures: HashMap<Call, Failure>,
    calls: Vec<Call>,
    owners: BTreeSet<String>,
}

/// In-memory `ExecutionBackend` driven by a script the test sets up.
///
/// Repo listings are paged out of one repo list; when the caller's tag
/// equals the scripted tag, page 1 answers `NotModified`.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<Script>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_repos(&self, repos: Vec<Repo>, tag: Option<&str>) {
        let mut s = lock(&self.script);
        s.repos = repos;
        s.repo_tag = tag.map(str::to_string);
    }

    pub fn add_workflow(&self, repo: &str, action_type: &str) {
        lock(&self.script)
            .workflows
            .insert((repo.to_string(), action_type.to_string()));
    }

    pub fn add_run(&self, repo: &str, run: ExecutionRun) {
        lock(&self.script)
            .runs
            .entry(repo.to_string())
            .or_default()
            .push(run);
    }

    pub fn add_branch(&self, repo: &str, name: &str) {
        lock(&self.script)
            .branches
            .insert((repo.to_string(), name.to_string()));
    }

    pub fn fail(&self, call: Call, failure: Failure) {
        lock(&self.script).failures.insert(call, failure);
    }

    pub fn clear_failures(&self) {
        lock(&self.script).failures.clear();
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        lock(&self.script).calls.clone()
    }

    pub fn has_branch(&self, repo: &str, name: &str) -> bool {
        lock(&self.script)
            .branches
            .contains(&(repo.to_string(), name.to_string()))
    }

    pub fn branch_count(&self) -> usize {
        lock(&self.script).branches.len()
    }

    pub fn dispatched(&self) -> Vec<Dispatched> {
        lock(&self.script).dispatched.clone()
    }

    /// Every owner any call was made under.
    pub fn owners(&self) -> BTreeSet<String> {
        lock(&self.script).owners.clone()
    }

    /// Record `call` and return the injected failure for it, if any.
    fn enter(&self, owner: &str, call: Call) -> Result<MutexGuard<'_, Script>> {
        let mut s = lock(&self.script);
        s.owners.insert(owner.to_string());
        s.calls.push(call.clone());
        let failure = s.failures.get(&call).copied();
        match failure {
            None => Ok(s),
            Some(Failure::Transient) => Err(LifecycleError::Backend(format!(
                "scripted failure on {call:?}"
            ))),
            Some(Failure::Auth) => Err(LifecycleError::BackendAuth(format!(
                "scripted auth failure on {call:?}"
            ))),
        }
    }
}

#[async_trait]
impl ExecutionBackend for ScriptedBackend {
    async fn list_repos(
        &self,
        owner: &str,
        page: u32,
        per_page: u32,
        if_none_match: Option<&str>,
    ) -> Result<RepoPage> {
        let s = self.enter(owner, Call::ListRepos { page })?;
        if page == 1 && if_none_match.is_some() && if_none_match == s.repo_tag.as_deref() {
            return Ok(RepoPage::NotModified);
        }
        let per_page = per_page.max(1) as usize;
        let start = (page.saturating_sub(1) as usize).saturating_mul(per_page);
        let repos = s
            .repos
            .iter()
            .skip(start)
            .take(per_page)
            .cloned()
            .collect();
        Ok(RepoPage::Page {
            repos,
            validation_tag: s.repo_tag.clone(),
        })
    }

    async fn list_completed_runs(&self, owner: &str, repo: &str) -> Result<Vec<ExecutionRun>> {
        let s = self.enter(owner, Call::ListCompletedRuns {
            repo: repo.to_string(),
        })?;
        Ok(s.runs.get(repo).cloned().unwrap_or_default())
    }

    async fn get_head_commit(&self, owner: &str, repo: &str, branch: &str) -> Result<String> {
        let _s = self.enter(owner, Call::GetHeadCommit {
            repo: repo.to_string(),
        })?;
        Ok(format!("{repo}-{branch}-head"))
    }

    async fn workflow_exists(&self, owner: &str, repo: &str, action_type: &str) -> Result<bool> {
        let s = self.enter(owner, Call::WorkflowExists {
            repo: repo.to_string(),
        })?;
        Ok(s.workflows
            .contains(&(repo.to_string(), action_type.to_string())))
    }

    async fn create_branch(&self, owner: &str, repo: &str, _sha: &str, name: &str) -> Result<()> {
        let mut s = self.enter(owner, Call::CreateBranch {
            repo: repo.to_string(),
            name: name.to_string(),
        })?;
        if !s.branches.insert((repo.to_string(), name.to_string())) {
            return Err(LifecycleError::Backend(format!(
                "branch '{name}' already exists on {repo}"
            )));
        }
        Ok(())
    }

    async fn delete_branch(&self, owner: &str, repo: &str, name: &str) -> Result<()> {
        let mut s = self.enter(owner, Call::DeleteBranch {
            repo: repo.to_string(),
            name: name.to_string(),
        })?;
        s.branches.remove(&(repo.to_string(), name.to_string()));
        Ok(())
    }

    async fn dispatch_workflow(
        &self,
        owner: &str,
        repo: &str,
        action_type: &str,
        git_ref: &str,
        inputs: &WorkflowInputs,
    ) -> Result<()> {
        let mut s = self.enter(owner, Call::DispatchWorkflow {
            repo: repo.to_string(),
            git_ref: git_ref.to_string(),
        })?;
        s.dispatched.push(Dispatched {
            repo: repo.to_string(),
            action_type: action_type.to_string(),
            git_ref: git_ref.to_string(),
            inputs: inputs.clone(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// Collects published events. Can be switched to fail every publish.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LifecycleEvent>>,
    failing: Mutex<bool>,
    delay: Mutex<Option<Duration>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }

    /// Hold every publish for `delay` before recording it.
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        lock(&self.events).clone()
    }

    pub fn event_types(&self) -> Vec<EventType> {
        lock(&self.events).iter().map(|e| e.event_type).collect()
    }

    /// Events of `event_type` for `operation_id`.
    pub fn count(&self, operation_id: &str, event_type: EventType) -> usize {
        lock(&self.events)
            .iter()
            .filter(|e| e.operation_id == operation_id && e.event_type == event_type)
            .count()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, event: &LifecycleEvent) -> Result<()> {
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *lock(&self.failing) {
            return Err(LifecycleError::EventSink("recording sink set to fail".into()));
        }
        lock(&self.events).push(event.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RacingStore
// ---------------------------------------------------------------------------

/// A `MemoryStore` that loses every race against a concurrent sweep.
///
/// With [`RacingStore::losing_claims`], `delete` removes the object but
/// reports `false`, as if another sweep claimed it between this caller's
/// read and its claim. With [`RacingStore::vanishing_reads`], `get` removes
/// the object and reads nothing, as if it was claimed right after listing.
pub struct RacingStore {
    inner: Arc<MemoryStore>,
    vanish_on_read: bool,
}

impl RacingStore {
    pub fn losing_claims(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            vanish_on_read: false,
        }
    }

    pub fn vanishing_reads(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            vanish_on_read: true,
        }
    }
}

impl ObjectStore for RacingStore {
    fn put_with_metadata(&self, key: &str, data: &[u8], metadata: &Metadata) -> Result<()> {
        self.inner.put_with_metadata(key, data, metadata)
    }

    fn get(&self, key: &str) -> Result<Option<StoredObject>> {
        if self.vanish_on_read {
            self.inner.delete(key)?;
        }
        self.inner.get(key)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        self.inner.delete(key)?;
        Ok(false)
    }

    fn list_by_prefix(&self, prefix: &str) -> Result<Vec<ObjectEntry>> {
        self.inner.list_by_prefix(prefix)
    }

    fn get_metadata(&self, key: &str) -> Result<Option<Metadata>> {
        self.inner.get_metadata(key)
    }

    fn set_metadata(&self, key: &str, metadata: &Metadata) -> Result<()> {
        self.inner.set_metadata(key, metadata)
    }
}

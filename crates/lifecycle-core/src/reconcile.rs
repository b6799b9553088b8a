//! Matching pending operations to completed workflow runs.
//!
//! The operation id is the branch the run executed on, so a pending record
//! `repo/id` is resolved by the completed run in `repo` whose branch is `id`.
//!
//! Failures are contained at three levels:
//! - one record failing is recorded against that record only;
//! - the backend failing for one repo fails that repo's batch only;
//! - systemic failures (credentials rejected, listing unreadable) abort the
//!   whole cycle and are returned to the caller once every repo already in
//!   flight has finished, so no claimed record loses its event.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::backend::ExecutionBackend;
use crate::error::{LifecycleError, Result};
use crate::events::{EventSink, LifecycleEvent};
use crate::operation::OperationKey;
use crate::store::{blocking, OperationRepository};
use crate::types::{Conclusion, EventType, ExecutionRun};

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Record deleted and this terminal event emitted.
    Resolved(EventType),
    /// No completed run on the operation's branch yet.
    AwaitingRun,
    /// A run completed with a conclusion that has no lifecycle event.
    Unmapped(Conclusion),
    /// Another loop removed the record first; nothing emitted.
    AlreadyResolved,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemReport {
    pub operation_id: String,
    pub result: std::result::Result<ReconcileOutcome, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoBatch {
    Processed(Vec<ItemReport>),
    /// The repo's runs could not be read; none of its records were touched.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepoReport {
    pub repo: String,
    pub batch: RepoBatch,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    /// Store keys that are not `repoName/operationId`.
    pub skipped_keys: Vec<String>,
    /// One entry per repo with pending work, ordered by repo name.
    pub repos: Vec<RepoReport>,
}

impl ReconcileReport {
    pub fn resolved(&self) -> usize {
        self.items()
            .filter(|i| matches!(i.result, Ok(ReconcileOutcome::Resolved(_))))
            .count()
    }

    pub fn item_errors(&self) -> usize {
        self.items().filter(|i| i.result.is_err()).count()
    }

    pub fn failed_repos(&self) -> usize {
        self.repos
            .iter()
            .filter(|r| matches!(r.batch, RepoBatch::Failed(_)))
            .count()
    }

    pub fn items(&self) -> impl Iterator<Item = &ItemReport> {
        self.repos.iter().flat_map(|r| match &r.batch {
            RepoBatch::Processed(items) => items.as_slice(),
            RepoBatch::Failed(_) => &[][..],
        })
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

pub struct Reconciler {
    owner: String,
    operations: OperationRepository,
    backend: Arc<dyn ExecutionBackend>,
    events: Arc<dyn EventSink>,
    concurrency: usize,
}

impl Reconciler {
    pub fn new(
        owner: impl Into<String>,
        operations: OperationRepository,
        backend: Arc<dyn ExecutionBackend>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            owner: owner.into(),
            operations,
            backend,
            events,
            concurrency: 1,
        }
    }

    /// Reconcile up to `n` repos at once. Values below 1 are treated as 1.
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Run one cycle.
    ///
    /// Returns `Err` only for systemic failures; everything else is in the
    /// report.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let operations = self.operations.clone();
        let listing = blocking(move || operations.list_keys())
            .await
            .map_err(|e| LifecycleError::FatalCycle(format!("listing pending operations: {e}")))?;
        for raw in &listing.malformed {
            warn!(key = %raw, "skipping malformed operation key");
        }

        let mut by_repo: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for key in listing.keys {
            by_repo
                .entry(key.repo_name)
                .or_default()
                .push(key.operation_id);
        }

        let results: Vec<Result<RepoReport>> = stream::iter(by_repo)
            .map(|(repo, ids)| self.reconcile_repo(repo, ids))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut repos = Vec::with_capacity(results.len());
        let mut systemic = None;
        for result in results {
            match result {
                Ok(repo) => repos.push(repo),
                Err(e) => {
                    error!("reconcile cycle aborting: {e}");
                    systemic.get_or_insert(e);
                }
            }
        }
        if let Some(e) = systemic {
            return Err(e);
        }
        repos.sort_by(|a, b| a.repo.cmp(&b.repo));

        let report = ReconcileReport {
            skipped_keys: listing.malformed,
            repos,
        };
        info!(
            repos = report.repos.len(),
            resolved = report.resolved(),
            item_errors = report.item_errors(),
            failed_repos = report.failed_repos(),
            "reconcile cycle finished"
        );
        Ok(report)
    }

    async fn reconcile_repo(&self, repo: String, operation_ids: Vec<String>) -> Result<RepoReport> {
        let runs = match self.backend.list_completed_runs(&self.owner, &repo).await {
            Ok(runs) => runs,
            Err(e) if e.is_systemic() => return Err(e),
            Err(e) => {
                error!(repo = %repo, "failed to list completed runs: {e}");
                return Ok(RepoReport {
                    repo,
                    batch: RepoBatch::Failed(e.to_string()),
                });
            }
        };

        let mut items = Vec::with_capacity(operation_ids.len());
        for operation_id in operation_ids {
            let key = OperationKey::new(&repo, &operation_id);
            let result = match self.reconcile_one(&key, &runs).await {
                Ok(outcome) => Ok(outcome),
                Err(e) if e.is_systemic() => return Err(e),
                Err(e) => {
                    error!(repo = %repo, operation_id = %operation_id, "failed to reconcile operation: {e}");
                    Err(e.to_string())
                }
            };
            items.push(ItemReport {
                operation_id,
                result,
            });
        }
        Ok(RepoReport {
            repo,
            batch: RepoBatch::Processed(items),
        })
    }

    async fn reconcile_one(
        &self,
        key: &OperationKey,
        runs: &[ExecutionRun],
    ) -> Result<ReconcileOutcome> {
        let Some(run) = matching_run(runs, &key.operation_id) else {
            return Ok(ReconcileOutcome::AwaitingRun);
        };
        let Some(event_type) = run.conclusion.terminal_event() else {
            debug!(
                operation_id = %key.operation_id,
                run_id = %run.run_id,
                conclusion = %run.conclusion,
                "run conclusion has no lifecycle event; leaving pending"
            );
            return Ok(ReconcileOutcome::Unmapped(run.conclusion.clone()));
        };

        let operations = self.operations.clone();
        let lookup = key.clone();
        let Some(operation) = blocking(move || operations.get(&lookup)).await? else {
            return Ok(ReconcileOutcome::AlreadyResolved);
        };

        self.backend
            .delete_branch(&self.owner, &key.repo_name, &key.operation_id)
            .await?;
        let operations = self.operations.clone();
        let claimed = key.clone();
        if !blocking(move || operations.claim(&claimed)).await? {
            return Ok(ReconcileOutcome::AlreadyResolved);
        }

        let event = LifecycleEvent::for_operation(&operation, event_type).with_run(run);
        self.events.publish(&event).await?;
        info!(
            operation_id = %key.operation_id,
            repo = %key.repo_name,
            run_id = %run.run_id,
            event_type = %event_type,
            "operation resolved"
        );
        Ok(ReconcileOutcome::Resolved(event_type))
    }
}

/// The run on `branch`, preferring one whose conclusion maps to an event.
fn matching_run<'a>(runs: &'a [ExecutionRun], branch: &str) -> Option<&'a ExecutionRun> {
    let mut on_branch = runs.iter().filter(|r| r.branch_name == branch);
    let first = on_branch.next()?;
    if first.conclusion.terminal_event().is_some() {
        return Some(first);
    }
    on_branch
        .find(|r| r.conclusion.terminal_event().is_some())
        .or(Some(first))
}

//! Composition root: turns [`Settings`] into concrete components.

use anyhow::{bail, Context};
use github_actions::GitHubClient;
use lifecycle_core::backend::ExecutionBackend;
use lifecycle_core::config::Settings;
use lifecycle_core::dispatch::Dispatcher;
use lifecycle_core::events::{EventSink, HttpEventSink, LogEventSink};
use lifecycle_core::expire::Expirer;
use lifecycle_core::reconcile::Reconciler;
use lifecycle_core::refresh::RepoMapRefresher;
use lifecycle_core::store::{OperationRepository, RedbStore, RepoMapRepository};
use std::sync::Arc;

pub struct Wiring {
    pub settings: Settings,
    store: RedbStore,
}

impl Wiring {
    /// Open the store. Backend credentials are only checked when a
    /// component that needs them is built.
    pub fn open(settings: Settings) -> anyhow::Result<Self> {
        let store = RedbStore::open(&settings.store.path).with_context(|| {
            format!("failed to open store at {}", settings.store.path.display())
        })?;
        Ok(Self { settings, store })
    }

    pub fn operations(&self) -> anyhow::Result<OperationRepository> {
        let name = &self.settings.store.operation_container;
        let container = self
            .store
            .container(name)
            .with_context(|| format!("failed to open container '{name}'"))?;
        Ok(OperationRepository::new(Arc::new(container)))
    }

    pub fn repo_maps(&self) -> anyhow::Result<RepoMapRepository> {
        let name = &self.settings.store.repo_map_container;
        let container = self
            .store
            .container(name)
            .with_context(|| format!("failed to open container '{name}'"))?;
        Ok(RepoMapRepository::new(Arc::new(container)))
    }

    pub fn backend(&self) -> anyhow::Result<Arc<dyn ExecutionBackend>> {
        let gh = &self.settings.github;
        let Some(token) = gh.token.as_deref().filter(|t| !t.is_empty()) else {
            bail!("no GitHub token configured (set GITHUB_TOKEN)");
        };
        if gh.owner.trim().is_empty() {
            bail!("no repo owner configured (set REPO_OWNER_NAME)");
        }
        let client = GitHubClient::with_base_url(&gh.api_url, token)
            .context("failed to build GitHub client")?;
        Ok(Arc::new(client))
    }

    pub fn events(&self) -> anyhow::Result<Arc<dyn EventSink>> {
        match &self.settings.events.endpoint {
            Some(endpoint) => {
                let sink = HttpEventSink::new(endpoint.clone(), self.settings.events.key.clone())
                    .context("failed to build event sink")?;
                Ok(Arc::new(sink))
            }
            None => {
                tracing::warn!("no event endpoint configured; lifecycle events go to the log");
                Ok(Arc::new(LogEventSink))
            }
        }
    }

    pub fn refresher(&self) -> anyhow::Result<RepoMapRefresher> {
        Ok(RepoMapRefresher::new(
            &self.settings.github.owner,
            &self.settings.github.opt_in_topic,
            self.repo_maps()?,
            self.backend()?,
        ))
    }

    pub fn reconciler(&self) -> anyhow::Result<Reconciler> {
        Ok(Reconciler::new(
            &self.settings.github.owner,
            self.operations()?,
            self.backend()?,
            self.events()?,
        )
        .with_concurrency(self.settings.schedule.reconcile_concurrency))
    }

    pub fn expirer(&self, ttl: chrono::Duration) -> anyhow::Result<Expirer> {
        Ok(Expirer::new(self.operations()?, self.events()?, ttl))
    }

    pub fn dispatcher(&self) -> anyhow::Result<Dispatcher> {
        Ok(Dispatcher::new(
            &self.settings.github.owner,
            self.repo_maps()?,
            self.operations()?,
            self.backend()?,
            self.events()?,
        ))
    }
}

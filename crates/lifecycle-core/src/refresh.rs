//! Conditional refresh of the repo directory.
//!
//! The stored validation tag is offered on the first listing page. A
//! not-modified answer ends the cycle with no writes. Otherwise every page
//! is fetched into memory and the snapshot and its new tag are written in
//! one step, so a failure part-way through leaves the previous pair intact.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::backend::{ExecutionBackend, RepoPage, REPO_PAGE_SIZE};
use crate::error::{LifecycleError, Result};
use crate::repo::{Repo, RepoMap};
use crate::store::{blocking, RepoMapRepository};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    NotModified,
    Replaced {
        repos: usize,
        validation_tag: Option<String>,
    },
}

pub struct RepoMapRefresher {
    owner: String,
    opt_in_topic: String,
    repo_maps: RepoMapRepository,
    backend: Arc<dyn ExecutionBackend>,
}

impl RepoMapRefresher {
    pub fn new(
        owner: impl Into<String>,
        opt_in_topic: impl Into<String>,
        repo_maps: RepoMapRepository,
        backend: Arc<dyn ExecutionBackend>,
    ) -> Self {
        Self {
            owner: owner.into(),
            opt_in_topic: opt_in_topic.into(),
            repo_maps,
            backend,
        }
    }

    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let repo_maps = self.repo_maps.clone();
        let cached_tag = blocking(move || repo_maps.load_tag()).await?;
        if cached_tag.is_none() {
            info!(owner = %self.owner, "no cached validation tag; fetching the full directory");
        }

        let mut listed: Vec<Repo> = Vec::new();
        let mut validation_tag = None;
        let mut page = 1;
        loop {
            let if_none_match = if page == 1 { cached_tag.as_deref() } else { None };
            match self
                .backend
                .list_repos(&self.owner, page, REPO_PAGE_SIZE, if_none_match)
                .await?
            {
                RepoPage::NotModified if page == 1 => {
                    debug!(owner = %self.owner, "repo directory not modified");
                    return Ok(RefreshOutcome::NotModified);
                }
                RepoPage::NotModified => {
                    return Err(LifecycleError::Backend(format!(
                        "unexpected not-modified response on page {page}"
                    )));
                }
                RepoPage::Page {
                    repos,
                    validation_tag: tag,
                } => {
                    if page == 1 {
                        validation_tag = tag;
                    }
                    let count = repos.len();
                    listed.extend(repos);
                    if count < REPO_PAGE_SIZE as usize {
                        break;
                    }
                    page += 1;
                }
            }
        }

        let total = listed.len();
        let repos: Vec<Repo> = listed
            .into_iter()
            .filter(|r| r.is_opted_in(&self.opt_in_topic))
            .collect();
        let opted_in = repos.len();
        let repo_maps = self.repo_maps.clone();
        let map = RepoMap::new(repos, validation_tag.clone());
        blocking(move || repo_maps.replace(&map)).await?;

        info!(
            owner = %self.owner,
            listed = total,
            opted_in,
            pages = page,
            "repo directory replaced"
        );
        Ok(RefreshOutcome::Replaced {
            repos: opted_in,
            validation_tag,
        })
    }
}

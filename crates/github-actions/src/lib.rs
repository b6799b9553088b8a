//! `github-actions`: GitHub REST driver for the lifecycle coordinator.
//!
//! Implements [`lifecycle_core::backend::ExecutionBackend`] over the small
//! slice of the GitHub API the coordinator needs: listing an owner's
//! repositories (with `If-None-Match` conditional requests), reading the head
//! commit of a branch, checking a workflow file exists, creating and deleting
//! branch refs, dispatching a workflow, and listing completed
//! `workflow_dispatch` runs.
//!
//! # Architecture
//!
//! ```text
//! Dispatcher / Reconciler / Refresher
//!     │  Arc<dyn ExecutionBackend>
//!     ▼
//! GitHubClient    ← one reqwest::Client, bearer token, API version header
//!     │
//!     ▼
//! types.rs        ← response / request wire shapes
//! ```
//!
//! Errors are [`GitHubError`]; at the trait seam they become
//! `LifecycleError::BackendAuth` for 401/403 and `LifecycleError::Backend`
//! otherwise.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use github_actions::GitHubClient;
//! use lifecycle_core::backend::ExecutionBackend;
//!
//! let gh = GitHubClient::new(std::env::var("GITHUB_TOKEN")?)?;
//! let runs = gh.list_completed_runs("acme", "billing-config").await?;
//! ```

pub mod client;
pub mod error;
pub mod types;

#[cfg(test)]
mod tests;

pub use client::{GitHubClient, DEFAULT_API_URL};
pub use error::GitHubError;

//! Turning a request into exactly one running workflow.

use std::sync::Arc;

use tracing::{error, info};

use crate::backend::{ExecutionBackend, WorkflowInputs};
use crate::error::{LifecycleError, Result};
use crate::events::{EventSink, LifecycleEvent};
use crate::operation::{Operation, OperationKey, OperationRequest, OPERATION_SCHEMA_VERSION};
use crate::repo::normalize_selectors;
use crate::store::{blocking, OperationRepository, RepoMapRepository};
use crate::types::EventType;

/// A request accepted for asynchronous processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub operation_id: String,
    pub repo_name: String,
}

pub struct Dispatcher {
    owner: String,
    repo_maps: RepoMapRepository,
    operations: OperationRepository,
    backend: Arc<dyn ExecutionBackend>,
    events: Arc<dyn EventSink>,
}

impl Dispatcher {
    /// Every backend call is made under `owner`, the same account the
    /// reconciler lists runs from.
    pub fn new(
        owner: impl Into<String>,
        repo_maps: RepoMapRepository,
        operations: OperationRepository,
        backend: Arc<dyn ExecutionBackend>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repo_maps,
            operations,
            backend,
            events,
        }
    }

    /// Select a repo, open the correlation branch, record the operation,
    /// trigger the workflow and announce `Configuring`.
    ///
    /// Steps run in that order and stop at the first failure. Nothing is
    /// rolled back: a failure after the branch exists leaves it behind.
    pub async fn dispatch(
        &self,
        tenant_id: &str,
        subscription_id: &str,
        action_type: &str,
        request: &OperationRequest,
    ) -> Result<Accepted> {
        require_segment("tenantId", tenant_id)?;
        require_segment("subscriptionId", subscription_id)?;
        require_segment("actionType", action_type)?;
        let selectors = normalize_selectors(&request.selectors)?;
        let operation_id = request.resolve_operation_id()?;

        let repo_maps = self.repo_maps.clone();
        let map = blocking(move || repo_maps.load()).await?.ok_or_else(|| {
            LifecycleError::Unavailable("repo directory has not been populated yet".to_string())
        })?;
        let repo = map.select_one(&selectors)?.clone();

        let key = OperationKey::new(&repo.name, &operation_id);
        let operations = self.operations.clone();
        let lookup = key.clone();
        if blocking(move || operations.exists(&lookup)).await? {
            return Err(LifecycleError::DuplicateOperation(key.to_string()));
        }

        let head = self
            .backend
            .get_head_commit(&self.owner, &repo.name, &repo.default_branch)
            .await?;
        if !self
            .backend
            .workflow_exists(&self.owner, &repo.name, action_type)
            .await?
        {
            return Err(LifecycleError::NotFound(format!(
                "workflow '{action_type}' not found in {}",
                repo.name
            )));
        }

        self.backend
            .create_branch(&self.owner, &repo.name, &head, &operation_id)
            .await?;

        let operation = Operation {
            schema_version: OPERATION_SCHEMA_VERSION,
            operation_id: operation_id.clone(),
            tenant_id: tenant_id.to_string(),
            subscription_id: subscription_id.to_string(),
            repo_name: repo.name.clone(),
            action_type: action_type.to_string(),
            context: request.context.clone(),
            selectors,
            created_at: None,
        };
        let operations = self.operations.clone();
        let record = operation.clone();
        if let Err(e) = blocking(move || operations.put(&record)).await {
            error!(
                operation_id = %operation_id,
                repo = %repo.name,
                branch = %operation_id,
                "failed to record operation; branch left without a record: {e}"
            );
            return Err(e);
        }

        let inputs = WorkflowInputs {
            operation_id: operation_id.clone(),
            tenant_id: tenant_id.to_string(),
            subscription_id: subscription_id.to_string(),
            context: request.context.as_ref().map(|c| c.to_string()),
        };
        if let Err(e) = self
            .backend
            .dispatch_workflow(&self.owner, &repo.name, action_type, &operation_id, &inputs)
            .await
        {
            error!(
                operation_id = %operation_id,
                repo = %repo.name,
                branch = %operation_id,
                "workflow dispatch failed; record stays pending until it expires: {e}"
            );
            return Err(e);
        }

        self.events
            .publish(&LifecycleEvent::for_operation(
                &operation,
                EventType::Configuring,
            ))
            .await?;

        info!(
            operation_id = %operation_id,
            repo = %repo.name,
            action_type,
            "operation dispatched"
        );
        Ok(Accepted {
            operation_id,
            repo_name: repo.name,
        })
    }
}

fn require_segment(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() || value.contains('/') {
        return Err(LifecycleError::Validation(format!(
            "{field} must be a non-empty path segment"
        )));
    }
    Ok(())
}

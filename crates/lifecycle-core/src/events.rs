//! Lifecycle events and the sinks they are published to.
//!
//! Publishing is fire-and-forget from the coordinator's point of view and
//! at-least-once from the consumer's: downstream handlers dedupe on
//! `operationId` + `eventType`.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{LifecycleError, Result};
use crate::operation::Operation;
use crate::types::{Conclusion, EventType, ExecutionRun};

pub const EVENT_DATA_VERSION: &str = "1.0";
const SAS_KEY_HEADER: &str = "aeg-sas-key";

// ---------------------------------------------------------------------------
// LifecycleEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub tenant_subject: String,
    pub event_type: EventType,
    pub operation_id: String,
    pub repo_name: String,
    pub selectors: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<Conclusion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl LifecycleEvent {
    pub fn for_operation(op: &Operation, event_type: EventType) -> Self {
        Self {
            tenant_subject: op.tenant_subject(),
            event_type,
            operation_id: op.operation_id.clone(),
            repo_name: op.repo_name.clone(),
            selectors: op.selectors.clone(),
            context: op.context.clone(),
            run_id: None,
            conclusion: None,
            run_url: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Attach the metadata of the run that resolved the operation.
    pub fn with_run(mut self, run: &ExecutionRun) -> Self {
        self.run_id = Some(run.run_id.clone());
        self.conclusion = Some(run.conclusion.clone());
        self.run_url = Some(run.url.clone());
        self.started_at = run.created_at;
        self.finished_at = run.updated_at;
        self
    }
}

/// Wire envelope posted to the topic endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub id: String,
    pub subject: String,
    pub event_type: EventType,
    pub event_time: DateTime<Utc>,
    pub data_version: String,
    pub data: LifecycleEvent,
}

impl EventEnvelope {
    pub fn wrap(event: &LifecycleEvent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            subject: event.tenant_subject.clone(),
            event_type: event.event_type,
            event_time: Utc::now(),
            data_version: EVENT_DATA_VERSION.to_string(),
            data: event.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// EventSink
// ---------------------------------------------------------------------------

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &LifecycleEvent) -> Result<()>;
}

/// Posts each event as a one-element envelope array to a topic endpoint.
pub struct HttpEventSink {
    client: reqwest::Client,
    endpoint: String,
    key: Option<String>,
}

impl HttpEventSink {
    pub fn new(endpoint: impl Into<String>, key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LifecycleError::EventSink(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            key,
        })
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn publish(&self, event: &LifecycleEvent) -> Result<()> {
        let body = vec![EventEnvelope::wrap(event)];
        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.key {
            req = req.header(SAS_KEY_HEADER, key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| LifecycleError::EventSink(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(LifecycleError::EventSink(format!(
                "topic returned {status}: {text}"
            )));
        }
        Ok(())
    }
}

/// Writes events to the tracing log. Used when no topic is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

#[async_trait]
impl EventSink for LogEventSink {
    async fn publish(&self, event: &LifecycleEvent) -> Result<()> {
        info!(
            event_type = %event.event_type,
            operation_id = %event.operation_id,
            repo = %event.repo_name,
            subject = %event.tenant_subject,
            run_id = event.run_id.as_deref().unwrap_or(""),
            "lifecycle event"
        );
        Ok(())
    }
}

//! The Operation record and its storage key.
//!
//! An operation is written once by the dispatcher, sits pending in the
//! operation store, and is deleted by whichever of the reconciler or the
//! expirer resolves it first. The operation id doubles as the execution
//! branch name, which is how completed runs are matched back to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use crate::error::{LifecycleError, Result};

/// Version of the stored record and of the `selectors` wire shape (a list of
/// normalised strings).
pub const OPERATION_SCHEMA_VERSION: u32 = 1;

const MAX_OPERATION_ID_LEN: usize = 100;

// ---------------------------------------------------------------------------
// OperationKey
// ---------------------------------------------------------------------------

/// Store key of a pending operation: `repoName/operationId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationKey {
    pub repo_name: String,
    pub operation_id: String,
}

impl OperationKey {
    pub fn new(repo_name: impl Into<String>, operation_id: impl Into<String>) -> Self {
        Self {
            repo_name: repo_name.into(),
            operation_id: operation_id.into(),
        }
    }

    /// Parse a store key. Anything other than two non-empty `/`-separated
    /// parts is malformed and yields `None`.
    pub fn parse(key: &str) -> Option<Self> {
        let mut parts = key.trim().split('/');
        let repo = parts.next()?;
        let op = parts.next()?;
        if parts.next().is_some() || repo.is_empty() || op.is_empty() {
            return None;
        }
        Some(Self::new(repo, op))
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.repo_name, self.operation_id)
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub operation_id: String,
    pub tenant_id: String,
    pub subscription_id: String,
    pub repo_name: String,
    pub action_type: String,
    /// Caller payload, passed through verbatim and never validated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    pub selectors: BTreeSet<String>,
    /// Assigned by the store on first write; filled in when the record is read back.
    #[serde(skip)]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_schema_version() -> u32 {
    OPERATION_SCHEMA_VERSION
}

impl Operation {
    pub fn key(&self) -> OperationKey {
        OperationKey::new(&self.repo_name, &self.operation_id)
    }

    /// Event subject shared by every lifecycle event for this operation.
    pub fn tenant_subject(&self) -> String {
        format!(
            "/saas/tenants/{}/subscriptions/{}",
            self.tenant_id, self.subscription_id
        )
    }
}

// ---------------------------------------------------------------------------
// OperationRequest
// ---------------------------------------------------------------------------

/// Body of a dispatch request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    #[serde(default, alias = "id", skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    #[serde(default)]
    pub selectors: Vec<String>,
}

impl OperationRequest {
    /// The caller's operation id, or a fresh one.
    pub fn resolve_operation_id(&self) -> Result<String> {
        match &self.operation_id {
            Some(id) => {
                validate_operation_id(id)?;
                Ok(id.clone())
            }
            None => Ok(Uuid::new_v4().to_string()),
        }
    }
}

/// An operation id becomes both a store key segment and a git branch name.
pub fn validate_operation_id(id: &str) -> Result<()> {
    let ok = !id.is_empty()
        && id.len() <= MAX_OPERATION_ID_LEN
        && !id.starts_with('.')
        && !id.ends_with(".lock")
        && !id.contains("..")
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(LifecycleError::Validation(format!(
            "invalid operation id '{id}': use letters, digits, '-', '_' or '.'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_parses_two_part_names() {
        let key = OperationKey::parse("repo-a/abc123").unwrap();
        assert_eq!(key.repo_name, "repo-a");
        assert_eq!(key.operation_id, "abc123");
        assert_eq!(key.to_string(), "repo-a/abc123");
    }

    #[test]
    fn key_rejects_malformed_names() {
        for bad in ["", "repo-a", "repo-a/", "/abc", "a/b/c", "  /  "] {
            assert!(OperationKey::parse(bad).is_none(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn operation_id_validation() {
        assert!(validate_operation_id("abc123").is_ok());
        assert!(validate_operation_id("0b8c-4f_2.v1").is_ok());
        for bad in ["", "a/b", ".hidden", "x..y", "space here", "ref.lock"] {
            assert!(validate_operation_id(bad).is_err(), "{bad:?}");
        }
        assert!(validate_operation_id(&"a".repeat(101)).is_err());
    }

    #[test]
    fn request_accepts_legacy_id_alias() {
        let req: OperationRequest =
            serde_json::from_str(r#"{"id":"op-1","selectors":["billing"]}"#).unwrap();
        assert_eq!(req.operation_id.as_deref(), Some("op-1"));
        assert_eq!(req.resolve_operation_id().unwrap(), "op-1");
    }

    #[test]
    fn missing_operation_id_is_generated() {
        let req: OperationRequest = serde_json::from_str(r#"{"selectors":["billing"]}"#).unwrap();
        let id = req.resolve_operation_id().unwrap();
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn stored_record_omits_created_at_and_keeps_context_verbatim() {
        let op = Operation {
            schema_version: OPERATION_SCHEMA_VERSION,
            operation_id: "abc123".into(),
            tenant_id: "t1".into(),
            subscription_id: "s1".into(),
            repo_name: "repo-a".into(),
            action_type: "configure".into(),
            context: Some(serde_json::json!({"plan": {"seats": 5}, "tags": [1, "x"]})),
            selectors: ["billing".to_string()].into_iter().collect(),
            created_at: Some(Utc::now()),
        };
        let json = serde_json::to_value(&op).unwrap();
        assert!(json.get("createdAt").is_none());
        assert_eq!(json["context"]["plan"]["seats"], 5);
        assert_eq!(json["schemaVersion"], 1);
        assert_eq!(op.tenant_subject(), "/saas/tenants/t1/subscriptions/s1");
    }
}

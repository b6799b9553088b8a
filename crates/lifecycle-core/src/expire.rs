//! Timing out operations that never completed.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::events::{EventSink, LifecycleEvent};
use crate::operation::OperationKey;
use crate::store::{blocking, OperationRepository};
use crate::types::EventType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpireOutcome {
    /// Record deleted and `ConfigurationTimedOut` emitted.
    Expired,
    /// The record was gone by the time it was claimed.
    AlreadyResolved,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpiredItem {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub result: std::result::Result<ExpireOutcome, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpireReport {
    pub cutoff: DateTime<Utc>,
    /// Records at or past the cutoff.
    pub items: Vec<ExpiredItem>,
    /// Records newer than the cutoff.
    pub retained: usize,
    pub skipped_keys: Vec<String>,
    /// Set when the listing itself failed and nothing was examined.
    pub listing_error: Option<String>,
}

impl ExpireReport {
    fn empty(cutoff: DateTime<Utc>) -> Self {
        Self {
            cutoff,
            items: Vec::new(),
            retained: 0,
            skipped_keys: Vec::new(),
            listing_error: None,
        }
    }

    pub fn expired(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.result == Ok(ExpireOutcome::Expired))
            .count()
    }

    pub fn item_errors(&self) -> usize {
        self.items.iter().filter(|i| i.result.is_err()).count()
    }
}

pub struct Expirer {
    operations: OperationRepository,
    events: Arc<dyn EventSink>,
    ttl: Duration,
}

impl Expirer {
    pub fn new(operations: OperationRepository, events: Arc<dyn EventSink>, ttl: Duration) -> Self {
        Self {
            operations,
            events,
            ttl: ttl.abs(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn sweep(&self) -> ExpireReport {
        self.sweep_at(Utc::now()).await
    }

    /// Expire every record created at or before `now - ttl`.
    ///
    /// A listing failure ends the sweep early; it is logged and reported but
    /// not raised, since the next sweep starts over.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> ExpireReport {
        let cutoff = now
            .checked_sub_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut report = ExpireReport::empty(cutoff);

        let operations = self.operations.clone();
        let entries = match blocking(move || operations.list_entries()).await {
            Ok(entries) => entries,
            Err(e) => {
                error!("failed to list pending operations for expiry: {e}");
                report.listing_error = Some(e.to_string());
                return report;
            }
        };

        for entry in entries {
            if entry.created_at > cutoff {
                report.retained += 1;
                continue;
            }
            let Some(key) = OperationKey::parse(&entry.key) else {
                warn!(key = %entry.key, "skipping malformed operation key");
                report.skipped_keys.push(entry.key);
                continue;
            };
            let result = match self.expire_one(&key).await {
                Ok(outcome) => Ok(outcome),
                Err(e) => {
                    error!(operation_id = %key.operation_id, repo = %key.repo_name, "failed to expire operation: {e}");
                    Err(e.to_string())
                }
            };
            report.items.push(ExpiredItem {
                key: entry.key,
                created_at: entry.created_at,
                result,
            });
        }

        info!(
            cutoff = %cutoff,
            expired = report.expired(),
            retained = report.retained,
            item_errors = report.item_errors(),
            "expiry sweep finished"
        );
        report
    }

    async fn expire_one(&self, key: &OperationKey) -> Result<ExpireOutcome> {
        let operations = self.operations.clone();
        let lookup = key.clone();
        let Some(operation) = blocking(move || operations.get(&lookup)).await? else {
            return Ok(ExpireOutcome::AlreadyResolved);
        };
        let operations = self.operations.clone();
        let claimed = key.clone();
        if !blocking(move || operations.claim(&claimed)).await? {
            return Ok(ExpireOutcome::AlreadyResolved);
        }
        self.events
            .publish(&LifecycleEvent::for_operation(
                &operation,
                EventType::ConfigurationTimedOut,
            ))
            .await?;
        info!(operation_id = %key.operation_id, repo = %key.repo_name, "operation timed out");
        Ok(ExpireOutcome::Expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{Operation, OPERATION_SCHEMA_VERSION};
    use crate::store::{MemoryStore, ObjectStore};
    use crate::testing::{RacingStore, RecordingSink};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn pending_at(ops: &Arc<MemoryStore>, repo: &str, id: &str, created_at: DateTime<Utc>) {
        let op = Operation {
            schema_version: OPERATION_SCHEMA_VERSION,
            operation_id: id.into(),
            tenant_id: "t1".into(),
            subscription_id: "s1".into(),
            repo_name: repo.into(),
            action_type: "configure".into(),
            context: None,
            selectors: ["billing".to_string()].into_iter().collect(),
            created_at: None,
        };
        OperationRepository::new(ops.clone()).put(&op).unwrap();
        ops.set_created_at(&format!("{repo}/{id}"), created_at)
            .unwrap();
    }

    fn expirer(ops: &Arc<MemoryStore>, sink: &Arc<RecordingSink>) -> Expirer {
        Expirer::new(
            OperationRepository::new(ops.clone()),
            sink.clone(),
            Duration::hours(48),
        )
    }

    #[tokio::test]
    async fn old_record_expires_and_young_record_stays() {
        let ops = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::new());
        pending_at(&ops, "repo-a", "old", now() - Duration::hours(50));
        pending_at(&ops, "repo-a", "young", now() - Duration::hours(10));

        let report = expirer(&ops, &sink).sweep_at(now()).await;

        assert_eq!(report.expired(), 1);
        assert_eq!(report.retained, 1);
        assert!(ops.get("repo-a/old").unwrap().is_none());
        assert!(ops.get("repo-a/young").unwrap().is_some());
        assert_eq!(sink.count("old", EventType::ConfigurationTimedOut), 1);
        assert_eq!(sink.events().len(), 1);
    }

    #[tokio::test]
    async fn lost_claim_is_already_resolved_without_an_event() {
        let ops = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::new());
        pending_at(&ops, "repo-a", "old", now() - Duration::hours(50));
        let racing = Expirer::new(
            OperationRepository::new(Arc::new(RacingStore::losing_claims(ops.clone()))),
            sink.clone(),
            Duration::hours(48),
        );

        let report = racing.sweep_at(now()).await;

        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].result, Ok(ExpireOutcome::AlreadyResolved));
        assert_eq!(report.expired(), 0);
        assert!(sink.events().is_empty());
        assert!(ops.is_empty());
    }

    #[tokio::test]
    async fn record_gone_before_read_is_already_resolved() {
        let ops = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::new());
        pending_at(&ops, "repo-a", "old", now() - Duration::hours(50));
        let racing = Expirer::new(
            OperationRepository::new(Arc::new(RacingStore::vanishing_reads(ops.clone()))),
            sink.clone(),
            Duration::hours(48),
        );

        let report = racing.sweep_at(now()).await;

        assert_eq!(report.items[0].result, Ok(ExpireOutcome::AlreadyResolved));
        assert_eq!(report.item_errors(), 0);
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn boundary_is_inclusive() {
        let ops = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::new());
        pending_at(&ops, "repo-a", "exact", now() - Duration::hours(48));
        pending_at(
            &ops,
            "repo-a",
            "just-under",
            now() - Duration::hours(48) + Duration::seconds(1),
        );

        let report = expirer(&ops, &sink).sweep_at(now()).await;

        assert_eq!(report.cutoff, now() - Duration::hours(48));
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].key, "repo-a/exact");
        assert!(ops.get("repo-a/just-under").unwrap().is_some());
    }

    #[tokio::test]
    async fn undecodable_record_does_not_stop_the_sweep() {
        let ops = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::new());
        ops.put("repo-a/bad", b"garbage").unwrap();
        ops.set_created_at("repo-a/bad", now() - Duration::hours(100))
            .unwrap();
        pending_at(&ops, "repo-b", "old", now() - Duration::hours(60));

        let report = expirer(&ops, &sink).sweep_at(now()).await;

        assert_eq!(report.item_errors(), 1);
        assert_eq!(report.expired(), 1);
        assert_eq!(sink.count("old", EventType::ConfigurationTimedOut), 1);
    }

    #[tokio::test]
    async fn event_failure_is_an_item_error() {
        let ops = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::new());
        sink.set_failing(true);
        pending_at(&ops, "repo-a", "old", now() - Duration::hours(60));

        let report = expirer(&ops, &sink).sweep_at(now()).await;
        assert_eq!(report.item_errors(), 1);
        assert!(report.listing_error.is_none());
    }

    #[tokio::test]
    async fn repeated_sweep_emits_nothing_new() {
        let ops = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::new());
        pending_at(&ops, "repo-a", "old", now() - Duration::hours(60));
        let expirer = expirer(&ops, &sink);

        expirer.sweep_at(now()).await;
        let second = expirer.sweep_at(now()).await;
        assert!(second.items.is_empty());
        assert_eq!(sink.events().len(), 1);
    }

    #[test]
    fn negative_ttl_is_treated_as_positive() {
        let e = Expirer::new(
            OperationRepository::new(Arc::new(MemoryStore::new())),
            Arc::new(RecordingSink::new()),
            Duration::hours(-12),
        );
        assert_eq!(e.ttl(), Duration::hours(12));
    }
}

//! QueueItem: one durable outbound mutation awaiting remote confirmation.
//!
//! State machine:
//!
//! ```text
//!            enqueue
//!               |
//!               v
//!   +------> PENDING ----------> IN_PROGRESS ------> COMPLETED
//!   |           ^                     |
//!   |           |  network failure    |
//!   |           +---------------------+
//!   |           |  application failure, retries left
//!   |           +---------------------+
//!   |                                 |  application failure, budget spent
//!   |                                 v
//!   +------- manual retry -------- FAILED
//! ```
//!
//! `retry_count` only grows, except through [`QueueItem::reset_for_retry`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use crate::retry::RetryPolicy;
use crate::types::{now_millis, EntityType, OperationType, Priority, QueueItemId, SyncStatus};

/// A unit of outbound work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: QueueItemId,
    pub entity_type: EntityType,
    pub operation_type: OperationType,
    pub payload: Value,
    pub priority: Priority,
    pub retry_count: u32,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<i64>,
    pub status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a failed attempt did to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back to `PENDING`, retry budget untouched.
    Requeued,
    /// Back to `PENDING` with one more retry consumed.
    RetryScheduled { retry_count: u32 },
    /// Retry budget exhausted; the item is `FAILED`.
    Exhausted { retry_count: u32 },
}

impl QueueItem {
    /// Create a new `PENDING` item with a freshly generated id.
    pub fn new(
        entity_type: EntityType,
        operation_type: OperationType,
        payload: Value,
        priority: Priority,
    ) -> Self {
        Self {
            id: QueueItemId::generate(),
            entity_type,
            operation_type,
            payload,
            priority,
            retry_count: 0,
            created_at: now_millis(),
            last_attempt: None,
            status: SyncStatus::Pending,
            error: None,
        }
    }

    /// The id of the entity this item mutates, read from the payload.
    ///
    /// Accepts string or integer ids.
    pub fn entity_id(&self) -> Option<String> {
        match self.payload.get("id")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn mark_in_progress(&mut self, at: i64) {
        self.status = SyncStatus::InProgress;
        self.last_attempt = Some(at);
    }

    pub fn mark_completed(&mut self) {
        self.status = SyncStatus::Completed;
        self.error = None;
    }

    /// A transport-level failure: the attempt does not count.
    pub fn record_network_failure(&mut self, message: impl Into<String>) -> FailureOutcome {
        self.status = SyncStatus::Pending;
        self.error = Some(message.into());
        FailureOutcome::Requeued
    }

    /// The remote rejected the payload: consume one retry.
    ///
    /// Once `policy` considers the budget spent the item is terminally `FAILED`.
    pub fn record_application_failure(
        &mut self,
        message: impl Into<String>,
        policy: &RetryPolicy,
    ) -> FailureOutcome {
        self.retry_count = self.retry_count.saturating_add(1);
        self.error = Some(message.into());
        if policy.is_exhausted(self.retry_count) {
            self.status = SyncStatus::Failed;
            FailureOutcome::Exhausted {
                retry_count: self.retry_count,
            }
        } else {
            self.status = SyncStatus::Pending;
            FailureOutcome::RetryScheduled {
                retry_count: self.retry_count,
            }
        }
    }

    /// Manual retry: clear the budget and the stored error.
    pub fn reset_for_retry(&mut self) {
        self.retry_count = 0;
        self.status = SyncStatus::Pending;
        self.error = None;
    }
}

/// Order in which pending items are attempted within one pass:
/// priority descending, then retry count ascending, then oldest first.
/// The id breaks remaining ties so the order is total.
pub fn processing_order(a: &QueueItem, b: &QueueItem) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.retry_count.cmp(&b.retry_count))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(priority: Priority, retry_count: u32, created_at: i64) -> QueueItem {
        let mut item = QueueItem::new(
            EntityType::Sale,
            OperationType::Create,
            json!({"id": "s1"}),
            priority,
        );
        item.retry_count = retry_count;
        item.created_at = created_at;
        item
    }

    #[test]
    fn test_new_item_is_pending() {
        let item = item(Priority::High, 0, 1);
        assert_eq!(item.status, SyncStatus::Pending);
        assert_eq!(item.retry_count, 0);
        assert_eq!(item.entity_id().as_deref(), Some("s1"));
    }

    #[test]
    fn test_numeric_entity_id() {
        let item = QueueItem::new(
            EntityType::Contact,
            OperationType::Update,
            json!({"id": 42}),
            Priority::Medium,
        );
        assert_eq!(item.entity_id().as_deref(), Some("42"));
    }

    #[test]
    fn test_processing_order() {
        let mut items = vec![
            item(Priority::Low, 0, 1),
            item(Priority::High, 2, 1),
            item(Priority::High, 0, 5),
            item(Priority::High, 0, 3),
            item(Priority::Medium, 0, 0),
        ];
        items.sort_by(processing_order);

        let got: Vec<(Priority, u32, i64)> = items
            .iter()
            .map(|i| (i.priority, i.retry_count, i.created_at))
            .collect();
        assert_eq!(
            got,
            vec![
                (Priority::High, 0, 3),
                (Priority::High, 0, 5),
                (Priority::High, 2, 1),
                (Priority::Medium, 0, 0),
                (Priority::Low, 0, 1),
            ]
        );
    }

    #[test]
    fn test_network_failure_keeps_budget() {
        let mut item = item(Priority::High, 0, 1);
        for _ in 0..10 {
            item.mark_in_progress(5);
            assert_eq!(item.record_network_failure("offline"), FailureOutcome::Requeued);
        }
        assert_eq!(item.retry_count, 0);
        assert_eq!(item.status, SyncStatus::Pending);
    }

    #[test]
    fn test_application_failure_exhausts_budget() {
        let policy = RetryPolicy::default();
        let mut item = item(Priority::High, 0, 1);
        for n in 1..5 {
            assert_eq!(
                item.record_application_failure("rejected", &policy),
                FailureOutcome::RetryScheduled { retry_count: n }
            );
        }
        assert_eq!(
            item.record_application_failure("rejected", &policy),
            FailureOutcome::Exhausted { retry_count: 5 }
        );
        assert_eq!(item.status, SyncStatus::Failed);
        assert_eq!(item.error.as_deref(), Some("rejected"));

        item.reset_for_retry();
        assert_eq!(item.retry_count, 0);
        assert_eq!(item.status, SyncStatus::Pending);
        assert!(item.error.is_none());
    }

    #[test]
    fn test_budget_follows_policy() {
        let policy = RetryPolicy::default().with_max_retries(2);
        let mut item = item(Priority::Medium, 0, 1);
        assert_eq!(
            item.record_application_failure("rejected", &policy),
            FailureOutcome::RetryScheduled { retry_count: 1 }
        );
        assert!(!policy.is_exhausted(item.retry_count));
        assert_eq!(
            item.record_application_failure("rejected", &policy),
            FailureOutcome::Exhausted { retry_count: 2 }
        );
        assert!(policy.is_exhausted(item.retry_count));
        assert_eq!(item.status, SyncStatus::Failed);
    }
}

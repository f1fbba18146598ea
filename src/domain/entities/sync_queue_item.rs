use crate::domain::entities::SyncAction;
use crate::domain::value_objects::{RetryPolicy, SyncQueueId, SyncQueueStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    pub id: SyncQueueId,
    pub action: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub retries: u32,
    pub status: SyncQueueStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
}

/// What a failed delivery attempt did to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Still pending; the next flush should run after this delay.
    RetryAfter(Duration),
    /// Retry budget spent; the item is now `failed`.
    Exhausted,
}

impl SyncQueueItem {
    pub fn new_pending(action: &SyncAction, now: DateTime<Utc>) -> Result<Self, String> {
        let (action, payload) = action.encode()?;
        Ok(Self {
            id: SyncQueueId::generate(),
            action,
            payload,
            created_at: now,
            updated_at: now,
            retries: 0,
            status: SyncQueueStatus::Pending,
            error_message: None,
            synced_at: None,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == SyncQueueStatus::Pending
    }

    pub fn decode_action(&self) -> Result<SyncAction, String> {
        SyncAction::decode(&self.action, &self.payload)
    }

    pub fn mark_synced(&mut self, now: DateTime<Utc>) {
        self.status = SyncQueueStatus::Synced;
        self.error_message = None;
        self.synced_at = Some(now);
        self.updated_at = now;
    }

    /// 配信失敗を1回分記録する。
    ///
    /// While budget remains the attempt is counted and a backoff delay is
    /// returned; a failure with the budget already spent marks the item
    /// `failed`. `retries` therefore never exceeds `policy.max_retries`.
    pub fn record_failure(
        &mut self,
        message: String,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> FailureOutcome {
        self.error_message = Some(message);
        self.updated_at = now;

        if policy.is_exhausted(self.retries) {
            self.status = SyncQueueStatus::Failed;
            return FailureOutcome::Exhausted;
        }

        self.retries += 1;
        FailureOutcome::RetryAfter(policy.delay_for(self.retries))
    }

    /// Auth failures leave the retry budget untouched; the item waits for the
    /// next trigger once the session is restored.
    pub fn record_deferral(&mut self, message: String, now: DateTime<Utc>) {
        self.error_message = Some(message);
        self.updated_at = now;
    }

    /// A payload that cannot be decoded will never deliver.
    pub fn mark_undeliverable(&mut self, message: String, now: DateTime<Utc>) {
        self.status = SyncQueueStatus::Failed;
        self.error_message = Some(message);
        self.updated_at = now;
    }

    pub fn reset_for_retry(&mut self, now: DateTime<Utc>) -> Result<(), String> {
        if self.status != SyncQueueStatus::Failed {
            return Err(format!(
                "Only failed items can be retried (item {} is {})",
                self.id, self.status
            ));
        }
        self.status = SyncQueueStatus::Pending;
        self.retries = 0;
        self.error_message = None;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Collection;
    use serde_json::json;

    fn sample_item() -> SyncQueueItem {
        let action = SyncAction::DeleteRecord {
            collection: Collection::Artists,
            id: "ar-1".into(),
        };
        SyncQueueItem::new_pending(&action, Utc::now()).unwrap()
    }

    #[test]
    fn new_items_start_pending_with_zero_retries() {
        let item = sample_item();
        assert!(item.is_pending());
        assert_eq!(item.retries, 0);
        assert_eq!(item.action, "delete_record");
        assert_eq!(item.payload, json!({"collection": "artists", "id": "ar-1"}));
    }

    #[test]
    fn failures_back_off_until_exhausted() {
        let policy = RetryPolicy::default();
        let mut item = sample_item();
        let mut delays = Vec::new();

        loop {
            match item.record_failure("offline".into(), &policy, Utc::now()) {
                FailureOutcome::RetryAfter(delay) => {
                    assert!(item.is_pending());
                    delays.push(delay.as_millis() as u64);
                }
                FailureOutcome::Exhausted => break,
            }
        }

        assert_eq!(delays, vec![2000, 4000, 8000, 16000, 32000]);
        assert_eq!(item.status, SyncQueueStatus::Failed);
        assert_eq!(item.retries, 5);
        assert_eq!(item.error_message.as_deref(), Some("offline"));
    }

    #[test]
    fn reset_only_applies_to_failed_items() {
        let mut item = sample_item();
        assert!(item.reset_for_retry(Utc::now()).is_err());

        item.mark_undeliverable("bad payload".into(), Utc::now());
        item.reset_for_retry(Utc::now()).unwrap();
        assert!(item.is_pending());
        assert_eq!(item.retries, 0);
        assert!(item.error_message.is_none());
    }

    #[test]
    fn deferral_keeps_retry_budget() {
        let mut item = sample_item();
        item.record_deferral("session expired".into(), Utc::now());
        assert_eq!(item.retries, 0);
        assert!(item.is_pending());
    }
}

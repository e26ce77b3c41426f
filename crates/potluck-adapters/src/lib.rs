//! Store adapters for the planner: deterministic failure injection and demo
//! fixtures.

#![deny(unsafe_code)]

pub mod fixtures;

use async_trait::async_trait;
use potluck_core::error::PlannerError;
use potluck_core::store::{BoardRows, PlannerStore, ShiftRow};
use potluck_core::types::{Item, NewItem};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Store wrapper that fails a configured number of `apply_total_delta` calls
/// before delegating normally. Useful for chaos-testing the
/// `AggregateUpdateFailed` path: the pledge write lands, the aggregate
/// increment does not, and the repair operation has to reconcile.
pub struct FlakyTotalsStore {
    inner: Arc<dyn PlannerStore>,
    failures_left: AtomicU32,
}

impl FlakyTotalsStore {
    pub fn new(inner: Arc<dyn PlannerStore>, failures: u32) -> Self {
        Self {
            inner,
            failures_left: AtomicU32::new(failures),
        }
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok()
    }
}

#[async_trait]
impl PlannerStore for FlakyTotalsStore {
    async fn pledge_count(
        &self,
        user_id: &str,
        item_id: i64,
    ) -> Result<Option<i64>, PlannerError> {
        self.inner.pledge_count(user_id, item_id).await
    }

    async fn upsert_pledge(
        &self,
        user_id: &str,
        item_id: i64,
        count: i64,
    ) -> Result<(), PlannerError> {
        self.inner.upsert_pledge(user_id, item_id, count).await
    }

    async fn apply_total_delta(&self, item_id: i64, delta: i64) -> Result<(), PlannerError> {
        if self.take_failure() {
            return Err(PlannerError::Store(
                "injected total update failure".to_string(),
            ));
        }
        self.inner.apply_total_delta(item_id, delta).await
    }

    async fn sum_pledges(&self, item_id: i64) -> Result<i64, PlannerError> {
        self.inner.sum_pledges(item_id).await
    }

    async fn write_total(&self, item_id: i64, total: i64) -> Result<(), PlannerError> {
        self.inner.write_total(item_id, total).await
    }

    async fn insert_item(&self, creator: &str, draft: NewItem) -> Result<Item, PlannerError> {
        self.inner.insert_item(creator, draft).await
    }

    async fn board_rows(&self) -> Result<BoardRows, PlannerError> {
        self.inner.board_rows().await
    }

    async fn list_shifts(&self) -> Result<Vec<ShiftRow>, PlannerError> {
        self.inner.list_shifts().await
    }

    async fn insert_signup_below_capacity(
        &self,
        user_id: &str,
        shift_id: i64,
    ) -> Result<bool, PlannerError> {
        self.inner
            .insert_signup_below_capacity(user_id, shift_id)
            .await
    }

    async fn delete_signup(&self, user_id: &str, shift_id: i64) -> Result<(), PlannerError> {
        self.inner.delete_signup(user_id, shift_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use potluck_core::projection::CategoryOrder;
    use potluck_core::{MemoryStore, PlannerEngine};

    async fn flaky_engine(failures: u32) -> (PlannerEngine, Arc<MemoryStore>) {
        let memory = Arc::new(MemoryStore::new());
        fixtures::seed_demo(&memory).await;
        let store = Arc::new(FlakyTotalsStore::new(memory.clone(), failures));
        (
            PlannerEngine::with_store(store, "flaky-memory", CategoryOrder::Position),
            memory,
        )
    }

    #[tokio::test]
    async fn missed_delta_surfaces_aggregate_update_failed() {
        let (engine, memory) = flaky_engine(1).await;
        let item_id = fixtures::LIMES_ITEM_ID;

        let err = engine.set_commitment("alice", item_id, 4).await.unwrap_err();
        assert!(err.needs_repair());

        // The pledge write landed; the aggregate undercounts.
        assert_eq!(memory.pledge_count("alice", item_id).await.unwrap(), Some(4));
        assert_eq!(memory.stored_total(item_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn repair_reconciles_after_injected_failure() {
        let (engine, memory) = flaky_engine(1).await;
        let item_id = fixtures::LIMES_ITEM_ID;

        let err = engine.set_commitment("alice", item_id, 4).await.unwrap_err();
        assert!(matches!(
            err,
            PlannerError::AggregateUpdateFailed { item_id: id, .. } if id == item_id
        ));

        let report = engine.repair_item_total(item_id).await.unwrap();
        assert_eq!(report.committed_total, 4);
        assert_eq!(memory.stored_total(item_id).await.unwrap(), 4);

        // Once the injected failure is spent, normal reconciliation resumes.
        engine.set_commitment("bob", item_id, 2).await.unwrap();
        assert_eq!(memory.stored_total(item_id).await.unwrap(), 6);
    }
}

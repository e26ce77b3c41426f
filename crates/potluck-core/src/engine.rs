use crate::error::PlannerError;
use crate::memory::MemoryStore;
use crate::postgres::PostgresStore;
use crate::projection::{
    assemble_board, assemble_my_commitments, assemble_shifts, BoardView, CategoryOrder,
    MyCommitmentsView, ShiftView,
};
use crate::store::{PlannerStore, StoreConfig};
use crate::types::{CommitmentReceipt, Item, NewItem, RepairReport};
use std::sync::Arc;
use uuid::Uuid;

/// Planner engine: reconciliation protocol, repair backstop, and read
/// projections over a single storage port.
///
/// The engine holds no locks of its own. The only shared-mutation primitives
/// it relies on are the store's atomic increment-by-delta and conditional
/// signup insert, so concurrent requests commute at the storage layer.
pub struct PlannerEngine {
    store: Arc<dyn PlannerStore>,
    backend: &'static str,
    order: CategoryOrder,
}

impl PlannerEngine {
    pub async fn bootstrap(
        config: StoreConfig,
        order: CategoryOrder,
    ) -> Result<Self, PlannerError> {
        let backend = config.label();
        let store: Arc<dyn PlannerStore> = match config {
            StoreConfig::Memory => Arc::new(MemoryStore::new()),
            StoreConfig::Postgres {
                database_url,
                max_connections,
            } => {
                let store = PostgresStore::connect(&database_url, max_connections).await?;
                store.ensure_schema().await?;
                Arc::new(store)
            }
        };
        Ok(Self {
            store,
            backend,
            order,
        })
    }

    /// Wrap an already-built store. Used by the service's seeded memory mode,
    /// tests, and failure-injection wrappers.
    pub fn with_store(
        store: Arc<dyn PlannerStore>,
        backend: &'static str,
        order: CategoryOrder,
    ) -> Self {
        Self {
            store,
            backend,
            order,
        }
    }

    pub fn backend_label(&self) -> &'static str {
        self.backend
    }

    pub fn store(&self) -> Arc<dyn PlannerStore> {
        self.store.clone()
    }

    /// Reconcile a user's pledge change against the shared item total.
    ///
    /// The pledge row is replaced first, then the signed delta between the
    /// old and new counts is applied to `committed_total` with the store's
    /// atomic increment. Setting the count to 0 still applies the negative
    /// delta; the contribution is never dropped silently.
    ///
    /// If the pledge write lands but the delta does not, the store
    /// undercounts and the caller gets `AggregateUpdateFailed` rather than a
    /// clean error: `repair_item_total` is the recovery path.
    pub async fn set_commitment(
        &self,
        user_id: &str,
        item_id: i64,
        new_count: i64,
    ) -> Result<CommitmentReceipt, PlannerError> {
        if new_count < 0 {
            return Err(PlannerError::negative_count(new_count));
        }

        let previous = self
            .store
            .pledge_count(user_id, item_id)
            .await?
            .unwrap_or(0);
        let delta = new_count - previous;

        self.store.upsert_pledge(user_id, item_id, new_count).await?;

        if delta != 0 {
            if let Err(err) = self.store.apply_total_delta(item_id, delta).await {
                return Err(PlannerError::AggregateUpdateFailed {
                    item_id,
                    detail: err.to_string(),
                });
            }
        }

        Ok(CommitmentReceipt {
            trace_id: Uuid::new_v4().to_string(),
            item_id,
            user_id: user_id.to_string(),
            previous,
            count: new_count,
            delta,
        })
    }

    /// Add an item to the board. The store assigns the id and seeds the
    /// creator's zero-count pledge row in the same step; like any zero-count
    /// pledge it stays out of the listings until the creator raises it.
    pub async fn create_item(
        &self,
        user_id: &str,
        mut draft: NewItem,
    ) -> Result<Item, PlannerError> {
        draft.name = draft.name.trim().to_string();
        if draft.name.is_empty() {
            return Err(PlannerError::Validation(
                "item name must not be empty".to_string(),
            ));
        }
        if let Some(max_needed) = draft.max_needed {
            if max_needed < 0 {
                return Err(PlannerError::Validation(format!(
                    "max_needed must be >= 0, got {max_needed}"
                )));
            }
        }
        self.store.insert_item(user_id, draft).await
    }

    /// Recompute an item's total from its pledge rows and overwrite the
    /// stored aggregate. Canonical consistency backstop after a detected
    /// `AggregateUpdateFailed`.
    pub async fn repair_item_total(&self, item_id: i64) -> Result<RepairReport, PlannerError> {
        let committed_total = self.store.sum_pledges(item_id).await?;
        self.store.write_total(item_id, committed_total).await?;
        Ok(RepairReport {
            trace_id: Uuid::new_v4().to_string(),
            item_id,
            committed_total,
        })
    }

    pub async fn board(&self, viewer: &str) -> Result<BoardView, PlannerError> {
        let rows = self.store.board_rows().await?;
        Ok(assemble_board(&rows, viewer, self.order))
    }

    pub async fn my_commitments(&self, viewer: &str) -> Result<MyCommitmentsView, PlannerError> {
        let rows = self.store.board_rows().await?;
        Ok(assemble_my_commitments(&rows, viewer, self.order))
    }

    pub async fn shifts(&self, viewer: &str) -> Result<Vec<ShiftView>, PlannerError> {
        let rows = self.store.list_shifts().await?;
        Ok(assemble_shifts(&rows, viewer))
    }

    /// Join a shift. Closed with the store's conditional insert so two users
    /// racing for the last slot cannot both land. Joining a shift twice is a
    /// no-op success.
    pub async fn signup(&self, user_id: &str, shift_id: i64) -> Result<ShiftView, PlannerError> {
        let inserted = self
            .store
            .insert_signup_below_capacity(user_id, shift_id)
            .await?;
        if !inserted {
            let capacity = self
                .shift_view(user_id, shift_id)
                .await?
                .capacity;
            return Err(PlannerError::CapacityExceeded { shift_id, capacity });
        }
        self.shift_view(user_id, shift_id).await
    }

    /// Leave a shift. Removing a signup that does not exist is a no-op.
    pub async fn cancel_signup(
        &self,
        user_id: &str,
        shift_id: i64,
    ) -> Result<ShiftView, PlannerError> {
        self.store.delete_signup(user_id, shift_id).await?;
        self.shift_view(user_id, shift_id).await
    }

    async fn shift_view(&self, viewer: &str, shift_id: i64) -> Result<ShiftView, PlannerError> {
        self.shifts(viewer)
            .await?
            .into_iter()
            .find(|shift| shift.id == shift_id)
            .ok_or(PlannerError::UnknownShift(shift_id))
    }
}

use crate::error::PlannerError;
use crate::types::{Category, Item, NewItem, Pledge, Profile, Shift, Signup};
use async_trait::async_trait;

/// Store persistence backend configuration.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    /// Keep all rows in process memory only.
    Memory,
    /// Persist all rows in PostgreSQL.
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

impl StoreConfig {
    pub fn memory() -> Self {
        Self::Memory
    }

    pub fn postgres(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self::Postgres {
            database_url: database_url.into(),
            max_connections,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres { .. } => "postgres",
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Memory
    }
}

/// Joined read used by the board and dashboard projections.
#[derive(Debug, Clone, Default)]
pub struct BoardRows {
    pub categories: Vec<Category>,
    pub items: Vec<Item>,
    pub pledges: Vec<Pledge>,
    pub profiles: Vec<Profile>,
}

/// One shift with its current signups, joined with display names.
#[derive(Debug, Clone)]
pub struct ShiftRow {
    pub shift: Shift,
    pub signups: Vec<Signup>,
    pub profiles: Vec<Profile>,
}

/// Persistence port for the planner.
///
/// The two shared-mutation primitives are `apply_total_delta` and
/// `insert_signup_below_capacity`; both must be atomic at the storage layer so
/// concurrent callers commute instead of overwriting each other.
#[async_trait]
pub trait PlannerStore: Send + Sync {
    /// Current pledge count for (user, item), `None` when no row exists.
    async fn pledge_count(
        &self,
        user_id: &str,
        item_id: i64,
    ) -> Result<Option<i64>, PlannerError>;

    /// Create-or-replace the pledge keyed by (user, item).
    async fn upsert_pledge(
        &self,
        user_id: &str,
        item_id: i64,
        count: i64,
    ) -> Result<(), PlannerError>;

    /// Atomically add `delta` to the item's `committed_total`.
    async fn apply_total_delta(&self, item_id: i64, delta: i64) -> Result<(), PlannerError>;

    /// Sum of all pledge rows for the item; the repair source of truth.
    async fn sum_pledges(&self, item_id: i64) -> Result<i64, PlannerError>;

    /// Overwrite the item's `committed_total`. Repair only; regular
    /// reconciliation goes through `apply_total_delta`.
    async fn write_total(&self, item_id: i64, total: i64) -> Result<(), PlannerError>;

    /// Insert a new item with a store-assigned id, plus the creator's
    /// zero-count pledge, in one atomic step. Fails with `UnknownCategory`
    /// when the category does not exist.
    async fn insert_item(&self, creator: &str, draft: NewItem) -> Result<Item, PlannerError>;

    /// All categories, items, pledges, and profiles for the read projection.
    async fn board_rows(&self) -> Result<BoardRows, PlannerError>;

    /// All shifts with their signups and signer display names.
    async fn list_shifts(&self) -> Result<Vec<ShiftRow>, PlannerError>;

    /// Insert a signup only while the shift is below capacity. Returns `false`
    /// when the shift was full. Inserting an existing signup is a no-op that
    /// returns `true`.
    async fn insert_signup_below_capacity(
        &self,
        user_id: &str,
        shift_id: i64,
    ) -> Result<bool, PlannerError>;

    /// Remove the signup row if present.
    async fn delete_signup(&self, user_id: &str, shift_id: i64) -> Result<(), PlannerError>;
}

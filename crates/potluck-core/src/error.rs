use thiserror::Error;

/// Planner core errors.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("shift {shift_id} is full ({capacity} spots)")]
    CapacityExceeded { shift_id: i64, capacity: i64 },

    #[error("pledge for item {item_id} saved but total update failed: {detail}")]
    AggregateUpdateFailed { item_id: i64, detail: String },

    #[error("unknown item {0}")]
    UnknownItem(i64),

    #[error("unknown category {0}")]
    UnknownCategory(i64),

    #[error("unknown shift {0}")]
    UnknownShift(i64),

    #[error("store error: {0}")]
    Store(String),
}

impl PlannerError {
    pub fn negative_count(count: i64) -> Self {
        Self::Validation(format!("commitment count must be >= 0, got {count}"))
    }

    /// True when the store is left in a known-bad state that the repair
    /// operation must reconcile, as opposed to a clean failure.
    pub fn needs_repair(&self) -> bool {
        matches!(self, Self::AggregateUpdateFailed { .. })
    }
}

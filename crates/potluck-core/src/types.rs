use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display grouping for items, ordered by an explicit position field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub position: i64,
    pub created_at: DateTime<Utc>,
}

/// Something the crew needs brought to the event.
///
/// `committed_total` is denormalized: it mirrors the sum of all pledges for
/// this item and is only ever mutated through the store's atomic
/// increment-by-delta operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub id: i64,
    pub category_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub committed_total: i64,
    pub max_needed: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Fields for an item to be created; the store assigns the id. The new item
/// starts with a zero total and a zero-count pledge row for its creator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewItem {
    pub category_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub max_needed: Option<i64>,
}

/// One user's committed quantity for one item. Unique per (user, item).
///
/// A count of 0 is semantically "no commitment" but the row may persist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pledge {
    pub user_id: String,
    pub item_id: i64,
    pub count: i64,
    pub updated_at: DateTime<Utc>,
}

/// Display name for an opaque authenticated user id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub user_id: String,
    pub name: String,
}

/// A capacity-bounded volunteer time slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Shift {
    pub id: i64,
    pub event_name: String,
    pub description: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub capacity: i64,
}

/// A user's slot on a shift. Unique per (user, shift).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Signup {
    pub user_id: String,
    pub shift_id: i64,
    pub joined_at: DateTime<Utc>,
}

/// Outcome of one reconciled commitment change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitmentReceipt {
    pub trace_id: String,
    pub item_id: i64,
    pub user_id: String,
    pub previous: i64,
    pub count: i64,
    pub delta: i64,
}

/// Outcome of recomputing an item's total from its pledge rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepairReport {
    pub trace_id: String,
    pub item_id: i64,
    pub committed_total: i64,
}

//! Deterministic demo dataset for the memory backend.

use chrono::{DateTime, TimeZone, Utc};
use potluck_core::types::{Category, Item, Shift};
use potluck_core::MemoryStore;

pub const LIMES_ITEM_ID: i64 = 101;
pub const ICE_ITEM_ID: i64 = 102;
pub const CHIPS_ITEM_ID: i64 = 201;
pub const OPENING_SHIFT_ID: i64 = 1;
pub const CLOSING_SHIFT_ID: i64 = 2;

fn dt(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Seed categories, items, profiles, and shifts so a memory-backed service
/// is usable out of the box. Pledges and signups start empty.
pub async fn seed_demo(store: &MemoryStore) {
    let created_at = dt(1_750_000_000);

    store
        .put_category(Category {
            id: 1,
            name: "Drinks".to_string(),
            position: 1,
            created_at,
        })
        .await;
    store
        .put_category(Category {
            id: 2,
            name: "Snacks".to_string(),
            position: 2,
            created_at,
        })
        .await;

    store
        .put_item(Item {
            id: LIMES_ITEM_ID,
            category_id: 1,
            name: "Limes".to_string(),
            description: Some("for garnish".to_string()),
            committed_total: 0,
            max_needed: Some(20),
            created_at,
        })
        .await;
    store
        .put_item(Item {
            id: ICE_ITEM_ID,
            category_id: 1,
            name: "Ice".to_string(),
            description: Some("bags".to_string()),
            committed_total: 0,
            max_needed: Some(8),
            created_at,
        })
        .await;
    store
        .put_item(Item {
            id: CHIPS_ITEM_ID,
            category_id: 2,
            name: "Chips".to_string(),
            description: None,
            committed_total: 0,
            max_needed: None,
            created_at,
        })
        .await;

    store.put_profile("alice", "Alice").await;
    store.put_profile("bob", "Bob").await;
    store.put_profile("carol", "Carol").await;

    store
        .put_shift(Shift {
            id: OPENING_SHIFT_ID,
            event_name: "Bar opening".to_string(),
            description: Some("setup and first pour".to_string()),
            starts_at: dt(1_750_100_000),
            ends_at: dt(1_750_110_800),
            capacity: 2,
        })
        .await;
    store
        .put_shift(Shift {
            id: CLOSING_SHIFT_ID,
            event_name: "Bar closing".to_string(),
            description: Some("last call and teardown".to_string()),
            starts_at: dt(1_750_110_800),
            ends_at: dt(1_750_121_600),
            capacity: 1,
        })
        .await;
}

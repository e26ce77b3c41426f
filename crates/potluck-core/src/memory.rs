use crate::error::PlannerError;
use crate::store::{BoardRows, PlannerStore, ShiftRow};
use crate::types::{Category, Item, NewItem, Pledge, Profile, Shift, Signup};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct MemoryState {
    categories: BTreeMap<i64, Category>,
    items: BTreeMap<i64, Item>,
    pledges: BTreeMap<(String, i64), Pledge>,
    profiles: BTreeMap<String, String>,
    shifts: BTreeMap<i64, Shift>,
    signups: BTreeMap<(i64, String), Signup>,
}

/// In-process store backend.
///
/// Every operation takes the state lock exactly once, so each store call is
/// atomic with respect to concurrent callers. That makes this backend honor
/// the same commutativity contract the PostgreSQL backend gets from atomic
/// SQL updates.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_category(&self, category: Category) {
        let mut state = self.state.lock().await;
        state.categories.insert(category.id, category);
    }

    pub async fn put_item(&self, item: Item) {
        let mut state = self.state.lock().await;
        state.items.insert(item.id, item);
    }

    pub async fn put_profile(&self, user_id: impl Into<String>, name: impl Into<String>) {
        let mut state = self.state.lock().await;
        state.profiles.insert(user_id.into(), name.into());
    }

    pub async fn put_shift(&self, shift: Shift) {
        let mut state = self.state.lock().await;
        state.shifts.insert(shift.id, shift);
    }

    /// Current `committed_total` as stored, for assertions and health probes.
    pub async fn stored_total(&self, item_id: i64) -> Result<i64, PlannerError> {
        let state = self.state.lock().await;
        state
            .items
            .get(&item_id)
            .map(|item| item.committed_total)
            .ok_or(PlannerError::UnknownItem(item_id))
    }
}

#[async_trait]
impl PlannerStore for MemoryStore {
    async fn pledge_count(
        &self,
        user_id: &str,
        item_id: i64,
    ) -> Result<Option<i64>, PlannerError> {
        let state = self.state.lock().await;
        Ok(state
            .pledges
            .get(&(user_id.to_string(), item_id))
            .map(|pledge| pledge.count))
    }

    async fn upsert_pledge(
        &self,
        user_id: &str,
        item_id: i64,
        count: i64,
    ) -> Result<(), PlannerError> {
        let mut state = self.state.lock().await;
        if !state.items.contains_key(&item_id) {
            return Err(PlannerError::UnknownItem(item_id));
        }
        state.pledges.insert(
            (user_id.to_string(), item_id),
            Pledge {
                user_id: user_id.to_string(),
                item_id,
                count,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn apply_total_delta(&self, item_id: i64, delta: i64) -> Result<(), PlannerError> {
        let mut state = self.state.lock().await;
        let item = state
            .items
            .get_mut(&item_id)
            .ok_or(PlannerError::UnknownItem(item_id))?;
        item.committed_total += delta;
        Ok(())
    }

    async fn sum_pledges(&self, item_id: i64) -> Result<i64, PlannerError> {
        let state = self.state.lock().await;
        if !state.items.contains_key(&item_id) {
            return Err(PlannerError::UnknownItem(item_id));
        }
        Ok(state
            .pledges
            .values()
            .filter(|pledge| pledge.item_id == item_id)
            .map(|pledge| pledge.count)
            .sum())
    }

    async fn write_total(&self, item_id: i64, total: i64) -> Result<(), PlannerError> {
        let mut state = self.state.lock().await;
        let item = state
            .items
            .get_mut(&item_id)
            .ok_or(PlannerError::UnknownItem(item_id))?;
        item.committed_total = total;
        Ok(())
    }

    async fn insert_item(&self, creator: &str, draft: NewItem) -> Result<Item, PlannerError> {
        let mut state = self.state.lock().await;
        if !state.categories.contains_key(&draft.category_id) {
            return Err(PlannerError::UnknownCategory(draft.category_id));
        }

        let id = state.items.keys().next_back().map_or(1, |max| max + 1);
        let now = Utc::now();
        let item = Item {
            id,
            category_id: draft.category_id,
            name: draft.name,
            description: draft.description,
            committed_total: 0,
            max_needed: draft.max_needed,
            created_at: now,
        };
        state.items.insert(id, item.clone());
        state.pledges.insert(
            (creator.to_string(), id),
            Pledge {
                user_id: creator.to_string(),
                item_id: id,
                count: 0,
                updated_at: now,
            },
        );
        Ok(item)
    }

    async fn board_rows(&self) -> Result<BoardRows, PlannerError> {
        let state = self.state.lock().await;
        Ok(BoardRows {
            categories: state.categories.values().cloned().collect(),
            items: state.items.values().cloned().collect(),
            pledges: state.pledges.values().cloned().collect(),
            profiles: state
                .profiles
                .iter()
                .map(|(user_id, name)| Profile {
                    user_id: user_id.clone(),
                    name: name.clone(),
                })
                .collect(),
        })
    }

    async fn list_shifts(&self) -> Result<Vec<ShiftRow>, PlannerError> {
        let state = self.state.lock().await;
        let profiles = state
            .profiles
            .iter()
            .map(|(user_id, name)| Profile {
                user_id: user_id.clone(),
                name: name.clone(),
            })
            .collect::<Vec<_>>();

        Ok(state
            .shifts
            .values()
            .map(|shift| ShiftRow {
                shift: shift.clone(),
                signups: state
                    .signups
                    .values()
                    .filter(|signup| signup.shift_id == shift.id)
                    .cloned()
                    .collect(),
                profiles: profiles.clone(),
            })
            .collect())
    }

    async fn insert_signup_below_capacity(
        &self,
        user_id: &str,
        shift_id: i64,
    ) -> Result<bool, PlannerError> {
        let mut state = self.state.lock().await;
        let capacity = state
            .shifts
            .get(&shift_id)
            .map(|shift| shift.capacity)
            .ok_or(PlannerError::UnknownShift(shift_id))?;

        let key = (shift_id, user_id.to_string());
        if state.signups.contains_key(&key) {
            return Ok(true);
        }

        let filled = state
            .signups
            .values()
            .filter(|signup| signup.shift_id == shift_id)
            .count() as i64;
        if filled >= capacity {
            return Ok(false);
        }

        state.signups.insert(
            key,
            Signup {
                user_id: user_id.to_string(),
                shift_id,
                joined_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn delete_signup(&self, user_id: &str, shift_id: i64) -> Result<(), PlannerError> {
        let mut state = self.state.lock().await;
        state.signups.remove(&(shift_id, user_id.to_string()));
        Ok(())
    }
}

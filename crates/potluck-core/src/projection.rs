use crate::store::{BoardRows, ShiftRow};
use crate::types::Category;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Sort key for categories on the board.
///
/// Historical versions of the planner disagreed on this (alphabetical name,
/// identifier, explicit order field), so the comparator is configuration
/// rather than a hard-coded rule. Every order breaks ties by id so output
/// stays deterministic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryOrder {
    #[default]
    Position,
    Id,
    Name,
}

impl CategoryOrder {
    pub fn compare(&self, a: &Category, b: &Category) -> Ordering {
        let by_key = match self {
            Self::Position => a.position.cmp(&b.position),
            Self::Id => Ordering::Equal,
            Self::Name => a.name.cmp(&b.name),
        };
        by_key.then(a.id.cmp(&b.id))
    }
}

/// One user's visible pledge on an item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitmentView {
    pub user_id: String,
    pub user_name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemView {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub committed_total: i64,
    pub max_needed: Option<i64>,
    /// The viewer's own pledge count, 0 when absent.
    pub mine: i64,
    /// All nonzero pledges with display names.
    pub commitments: Vec<CommitmentView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryView {
    pub id: i64,
    pub name: String,
    pub items: Vec<ItemView>,
}

/// Display-ready tree of categories, items, and pledges.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardView {
    pub generated_at: DateTime<Utc>,
    pub categories: Vec<CategoryView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MyCommitmentView {
    pub item_id: i64,
    pub item_name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MyCategoryView {
    pub id: i64,
    pub name: String,
    pub commitments: Vec<MyCommitmentView>,
}

/// The viewer's own nonzero pledges, grouped by category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MyCommitmentsView {
    pub generated_at: DateTime<Utc>,
    pub categories: Vec<MyCategoryView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignupView {
    pub user_id: String,
    pub user_name: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShiftView {
    pub id: i64,
    pub event_name: String,
    pub description: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub capacity: i64,
    pub filled: i64,
    pub is_full: bool,
    pub viewer_signed_up: bool,
    pub signups: Vec<SignupView>,
}

fn display_name(profiles: &BTreeMap<&str, &str>, user_id: &str) -> String {
    profiles
        .get(user_id)
        .map(|name| (*name).to_string())
        .unwrap_or_else(|| user_id.to_string())
}

/// Build the board tree. Pure: consumes already-joined rows and never touches
/// pledge rows or totals.
///
/// Items are grouped under categories by category id, never by display name,
/// so two distinct categories that happen to share a name stay separate.
pub fn assemble_board(rows: &BoardRows, viewer: &str, order: CategoryOrder) -> BoardView {
    let profiles = rows
        .profiles
        .iter()
        .map(|profile| (profile.user_id.as_str(), profile.name.as_str()))
        .collect::<BTreeMap<_, _>>();

    let mut categories = rows.categories.clone();
    categories.sort_by(|a, b| order.compare(a, b));

    let category_views = categories
        .into_iter()
        .map(|category| {
            let mut items = rows
                .items
                .iter()
                .filter(|item| item.category_id == category.id)
                .map(|item| {
                    let mine = rows
                        .pledges
                        .iter()
                        .find(|pledge| pledge.item_id == item.id && pledge.user_id == viewer)
                        .map(|pledge| pledge.count)
                        .unwrap_or(0);

                    let mut commitments = rows
                        .pledges
                        .iter()
                        .filter(|pledge| pledge.item_id == item.id && pledge.count > 0)
                        .map(|pledge| CommitmentView {
                            user_id: pledge.user_id.clone(),
                            user_name: display_name(&profiles, &pledge.user_id),
                            count: pledge.count,
                        })
                        .collect::<Vec<_>>();
                    commitments.sort_by(|a, b| {
                        (a.user_name.as_str(), a.user_id.as_str())
                            .cmp(&(b.user_name.as_str(), b.user_id.as_str()))
                    });

                    ItemView {
                        id: item.id,
                        name: item.name.clone(),
                        description: item.description.clone(),
                        committed_total: item.committed_total,
                        max_needed: item.max_needed,
                        mine,
                        commitments,
                    }
                })
                .collect::<Vec<_>>();
            items.sort_by_key(|item| item.id);

            CategoryView {
                id: category.id,
                name: category.name,
                items,
            }
        })
        .collect();

    BoardView {
        generated_at: Utc::now(),
        categories: category_views,
    }
}

/// Build the viewer's dashboard: their own nonzero pledges grouped by
/// category, categories ordered the same way as the board. Categories the
/// viewer has no pledge in are omitted.
pub fn assemble_my_commitments(
    rows: &BoardRows,
    viewer: &str,
    order: CategoryOrder,
) -> MyCommitmentsView {
    let mut categories = rows.categories.clone();
    categories.sort_by(|a, b| order.compare(a, b));

    let category_views = categories
        .into_iter()
        .filter_map(|category| {
            let mut commitments = rows
                .items
                .iter()
                .filter(|item| item.category_id == category.id)
                .filter_map(|item| {
                    rows.pledges
                        .iter()
                        .find(|pledge| {
                            pledge.item_id == item.id
                                && pledge.user_id == viewer
                                && pledge.count > 0
                        })
                        .map(|pledge| MyCommitmentView {
                            item_id: item.id,
                            item_name: item.name.clone(),
                            count: pledge.count,
                        })
                })
                .collect::<Vec<_>>();
            commitments.sort_by_key(|commitment| commitment.item_id);

            if commitments.is_empty() {
                return None;
            }
            Some(MyCategoryView {
                id: category.id,
                name: category.name,
                commitments,
            })
        })
        .collect();

    MyCommitmentsView {
        generated_at: Utc::now(),
        categories: category_views,
    }
}

/// Build the shift roster, ordered by start time then id.
pub fn assemble_shifts(rows: &[ShiftRow], viewer: &str) -> Vec<ShiftView> {
    let mut views = rows
        .iter()
        .map(|row| {
            let profiles = row
                .profiles
                .iter()
                .map(|profile| (profile.user_id.as_str(), profile.name.as_str()))
                .collect::<BTreeMap<_, _>>();

            let mut signups = row
                .signups
                .iter()
                .map(|signup| SignupView {
                    user_id: signup.user_id.clone(),
                    user_name: display_name(&profiles, &signup.user_id),
                    joined_at: signup.joined_at,
                })
                .collect::<Vec<_>>();
            signups.sort_by(|a, b| {
                (a.joined_at, a.user_id.as_str()).cmp(&(b.joined_at, b.user_id.as_str()))
            });

            let filled = signups.len() as i64;
            ShiftView {
                id: row.shift.id,
                event_name: row.shift.event_name.clone(),
                description: row.shift.description.clone(),
                starts_at: row.shift.starts_at,
                ends_at: row.shift.ends_at,
                capacity: row.shift.capacity,
                filled,
                is_full: filled >= row.shift.capacity,
                viewer_signed_up: row.signups.iter().any(|signup| signup.user_id == viewer),
                signups,
            }
        })
        .collect::<Vec<_>>();

    views.sort_by(|a, b| (a.starts_at, a.id).cmp(&(b.starts_at, b.id)));
    views
}

//! Potluck planner core.
//!
//! This crate keeps per-user pledges and each item's denormalized running
//! total consistent under concurrent edits, and builds the display-ready
//! board, dashboard, and shift-roster projections on top of a single storage
//! port.

#![deny(unsafe_code)]

pub mod engine;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod projection;
pub mod store;
pub mod types;

pub use engine::PlannerEngine;
pub use error::PlannerError;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use projection::{
    assemble_board, assemble_my_commitments, assemble_shifts, BoardView, CategoryOrder,
    CategoryView, CommitmentView, ItemView, MyCategoryView, MyCommitmentView, MyCommitmentsView,
    ShiftView, SignupView,
};
pub use store::{BoardRows, PlannerStore, ShiftRow, StoreConfig};
pub use types::{
    Category, CommitmentReceipt, Item, NewItem, Pledge, Profile, RepairReport, Shift, Signup,
};

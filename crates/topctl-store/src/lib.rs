// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! topctl store
//!
//! Read-only Postgres access to the desired topology: row models for the
//! `queue_manager` schema, the repository with its soft-delete and ordering
//! guarantees, and the loader projecting rows into `DesiredTopology`.
//!
//! Schema ownership (migrations, seed data) is external; this crate never
//! writes.

pub mod loader;
pub mod models;
pub mod repository;

pub use loader::{load_topology, LoadError};
pub use models::{
    object_or_empty, BindingRow, ExchangeRow, QueueRow, QueueWithAssignmentRow,
    ServiceAssignmentRow,
};
pub use repository::{Repository, StoreError};

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Row models for the `queue_manager` schema.
//!
//! These are DB-facing structs kept separate from the domain types in
//! `topctl-core`; the loader performs the projection. Every table carries
//! the shared bookkeeping columns (`id`, `uuid`, timestamps, soft-delete
//! marker, `meta`) next to the entity columns.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::FromRow;
use topctl_core::ServiceAssignment;
use uuid::Uuid;

/// Null (or non-object) JSONB normalizes to an empty object at this boundary.
pub fn object_or_empty(value: &Option<Value>) -> Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ExchangeRow {
    pub id: i64,
    pub uuid: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub meta: Option<Value>,
    pub exchange_name: String,
    pub exchange_type: String,
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
    pub arguments: Option<Value>,
    pub description: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct QueueRow {
    pub id: i64,
    pub uuid: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub meta: Option<Value>,
    pub queue_name: String,
    pub durable: bool,
    pub auto_delete: bool,
    pub arguments: Option<Value>,
    pub description: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct BindingRow {
    pub id: i64,
    pub uuid: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub meta: Option<Value>,
    pub exchange_name: String,
    pub queue_name: String,
    pub routing_key: String,
    pub arguments: Option<Value>,
    pub mandatory: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct ServiceAssignmentRow {
    pub id: i64,
    pub uuid: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub meta: Option<Value>,
    pub service_name: String,
    pub queue_name: String,
    pub prefetch_count: i32,
    pub max_inflight: i32,
    pub notes: String,
}

impl From<ServiceAssignmentRow> for ServiceAssignment {
    fn from(row: ServiceAssignmentRow) -> Self {
        Self {
            service: row.service_name,
            queue: row.queue_name,
            prefetch_count: row.prefetch_count,
            max_inflight: row.max_inflight,
            notes: row.notes,
        }
    }
}

/// A queue joined with its assignment columns for one service.
#[derive(Debug, Clone, FromRow)]
pub struct QueueWithAssignmentRow {
    #[sqlx(flatten)]
    pub queue: QueueRow,
    pub prefetch_count: i32,
    pub max_inflight: i32,
    pub notes: String,
    pub assignment_uuid: Uuid,
    pub assignment_meta: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_jsonb_normalizes_to_empty_object() {
        assert!(object_or_empty(&None).is_empty());
        assert!(object_or_empty(&Some(Value::Null)).is_empty());
        assert!(object_or_empty(&Some(json!([1, 2]))).is_empty());
    }

    #[test]
    fn object_jsonb_passes_through() {
        let value = Some(json!({"x-match": "all"}));
        let map = object_or_empty(&value);
        assert_eq!(map.get("x-match"), Some(&json!("all")));
    }

    #[test]
    fn assignment_row_projects_to_domain_type() {
        let row = ServiceAssignmentRow {
            id: 1,
            uuid: Uuid::nil(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
            meta: None,
            service_name: "billing".into(),
            queue_name: "invoice.created".into(),
            prefetch_count: 10,
            max_inflight: 50,
            notes: "slow consumer".into(),
        };
        let assignment = ServiceAssignment::from(row);
        assert_eq!(assignment.service, "billing");
        assert_eq!(assignment.queue, "invoice.created");
        assert_eq!(assignment.prefetch_count, 10);
        assert_eq!(assignment.max_inflight, 50);
        assert_eq!(assignment.notes, "slow consumer");
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Read-only repository over the desired-state store.
//!
//! All reads return active rows only (`deleted_at IS NULL`) in name-sorted
//! order, so two passes over an unchanged store see identical sequences.
//! Point lookups return `None` for absent names; absence is never an error.
//! The service does not write to this store.

use crate::models::{
    BindingRow, ExchangeRow, QueueRow, QueueWithAssignmentRow, ServiceAssignmentRow,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use thiserror::Error;

/// The single store failure kind: transport or query trouble.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

const EXCHANGE_COLUMNS: &str = "id, uuid, created_at, updated_at, deleted_at, meta, \
     exchange_name, exchange_type, durable, auto_delete, internal, arguments, description";

const QUEUE_COLUMNS: &str = "id, uuid, created_at, updated_at, deleted_at, meta, \
     queue_name, durable, auto_delete, arguments, description";

/// Read-only access to the `queue_manager` schema.
#[derive(Clone)]
pub struct Repository {
    pool: PgPool,
}

impl Repository {
    /// Connect with a bounded pool and verify the database answers.
    pub async fn connect(uri: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .max_lifetime(Duration::from_secs(30 * 60))
            .connect(uri)
            .await?;
        let repo = Self { pool };
        repo.ping().await?;
        Ok(repo)
    }

    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Cheap reachability probe for readiness checks.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn list_exchanges(&self) -> Result<Vec<ExchangeRow>, StoreError> {
        let rows = sqlx::query_as::<_, ExchangeRow>(&format!(
            "SELECT {EXCHANGE_COLUMNS}
             FROM queue_manager.exchanges
             WHERE deleted_at IS NULL
             ORDER BY exchange_name"
        ))
        .fetch_all(&self.pool)
        .await?;
        tracing::debug!(count = rows.len(), "loaded exchanges from store");
        Ok(rows)
    }

    pub async fn list_queues(&self) -> Result<Vec<QueueRow>, StoreError> {
        let rows = sqlx::query_as::<_, QueueRow>(&format!(
            "SELECT {QUEUE_COLUMNS}
             FROM queue_manager.queues
             WHERE deleted_at IS NULL
             ORDER BY queue_name"
        ))
        .fetch_all(&self.pool)
        .await?;
        tracing::debug!(count = rows.len(), "loaded queues from store");
        Ok(rows)
    }

    pub async fn list_bindings(&self) -> Result<Vec<BindingRow>, StoreError> {
        let rows = sqlx::query_as::<_, BindingRow>(
            "SELECT id, uuid, created_at, updated_at, deleted_at, meta,
                    exchange_name, queue_name, routing_key, arguments, mandatory
             FROM queue_manager.bindings
             WHERE deleted_at IS NULL
             ORDER BY exchange_name, queue_name, routing_key",
        )
        .fetch_all(&self.pool)
        .await?;
        tracing::debug!(count = rows.len(), "loaded bindings from store");
        Ok(rows)
    }

    pub async fn list_service_assignments(&self) -> Result<Vec<ServiceAssignmentRow>, StoreError> {
        let rows = sqlx::query_as::<_, ServiceAssignmentRow>(
            "SELECT id, uuid, created_at, updated_at, deleted_at, meta,
                    service_name, queue_name, prefetch_count, max_inflight, notes
             FROM queue_manager.service_assignments
             WHERE deleted_at IS NULL
             ORDER BY service_name, queue_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_exchange_by_name(
        &self,
        name: &str,
    ) -> Result<Option<ExchangeRow>, StoreError> {
        let row = sqlx::query_as::<_, ExchangeRow>(&format!(
            "SELECT {EXCHANGE_COLUMNS}
             FROM queue_manager.exchanges
             WHERE exchange_name = $1 AND deleted_at IS NULL
             LIMIT 1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_queue_by_name(&self, name: &str) -> Result<Option<QueueRow>, StoreError> {
        let row = sqlx::query_as::<_, QueueRow>(&format!(
            "SELECT {QUEUE_COLUMNS}
             FROM queue_manager.queues
             WHERE queue_name = $1 AND deleted_at IS NULL
             LIMIT 1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Queues assigned to a service, with the assignment columns alongside.
    pub async fn queues_for_service(
        &self,
        service: &str,
    ) -> Result<Vec<QueueWithAssignmentRow>, StoreError> {
        let rows = sqlx::query_as::<_, QueueWithAssignmentRow>(
            "SELECT q.id, q.uuid, q.created_at, q.updated_at, q.deleted_at, q.meta,
                    q.queue_name, q.durable, q.auto_delete, q.arguments, q.description,
                    sa.prefetch_count, sa.max_inflight, sa.notes,
                    sa.uuid AS assignment_uuid, sa.meta AS assignment_meta
             FROM queue_manager.service_assignments sa
             INNER JOIN queue_manager.queues q ON sa.queue_name = q.queue_name
             WHERE sa.service_name = $1
               AND sa.deleted_at IS NULL
               AND q.deleted_at IS NULL
             ORDER BY q.queue_name",
        )
        .bind(service)
        .fetch_all(&self.pool)
        .await?;
        tracing::debug!(
            count = rows.len(),
            service,
            "loaded queues for service from store"
        );
        Ok(rows)
    }
}

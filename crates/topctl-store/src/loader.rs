// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Projection of repository rows into the canonical `DesiredTopology`.
//!
//! The store is the source of truth; this module only reshapes it. Binding
//! rows referencing an exchange or queue absent from the desired set are
//! passed through with a warning: the pass creating the referenced resource
//! runs before binding creation, and a truly dangling reference surfaces as
//! a per-operation provider error in the reconciliation result.

use crate::models::object_or_empty;
use crate::repository::{Repository, StoreError};
use thiserror::Error;
use topctl_core::{BindingSpec, DesiredTopology, ExchangeSpec, QueueSpec, UnknownExchangeKind};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("exchange {name}: {source}")]
    InvalidExchangeKind {
        name: String,
        source: UnknownExchangeKind,
    },
}

/// Load the desired topology from the store.
pub async fn load_topology(repo: &Repository) -> Result<DesiredTopology, LoadError> {
    let mut topology = DesiredTopology::default();

    for row in repo.list_exchanges().await? {
        let kind = row
            .exchange_type
            .parse()
            .map_err(|source| LoadError::InvalidExchangeKind {
                name: row.exchange_name.clone(),
                source,
            })?;
        topology.exchanges.insert(
            row.exchange_name.clone(),
            ExchangeSpec {
                name: row.exchange_name,
                kind,
                durable: row.durable,
                auto_delete: row.auto_delete,
                internal: row.internal,
                arguments: object_or_empty(&row.arguments),
                description: row.description,
            },
        );
    }

    for row in repo.list_queues().await? {
        topology.queues.push(QueueSpec {
            name: row.queue_name,
            durable: row.durable,
            auto_delete: row.auto_delete,
            arguments: object_or_empty(&row.arguments),
            description: row.description,
        });
    }

    for row in repo.list_bindings().await? {
        topology.bindings.push(BindingSpec {
            exchange: row.exchange_name,
            queue: row.queue_name,
            routing_key: row.routing_key,
            arguments: object_or_empty(&row.arguments),
            mandatory: row.mandatory,
        });
    }

    warn_dangling_bindings(&topology);

    tracing::info!(
        exchanges = topology.exchanges.len(),
        queues = topology.queues.len(),
        bindings = topology.bindings.len(),
        "loaded desired topology"
    );
    Ok(topology)
}

fn warn_dangling_bindings(topology: &DesiredTopology) {
    let queues = topology.queue_names();
    for binding in &topology.bindings {
        if !topology.exchanges.contains_key(&binding.exchange) {
            tracing::warn!(
                exchange = %binding.exchange,
                queue = %binding.queue,
                "binding references an exchange not in the desired set"
            );
        }
        if !queues.contains(&binding.queue) {
            tracing::warn!(
                exchange = %binding.exchange,
                queue = %binding.queue,
                "binding references a queue not in the desired set"
            );
        }
    }
}

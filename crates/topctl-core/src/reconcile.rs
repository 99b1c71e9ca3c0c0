// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reconciliation engine.
//!
//! One pass drives the live broker toward the desired topology:
//!
//! 1. Snapshot actual state (exchanges, queues, bindings per queue)
//! 2. Create missing exchanges
//! 3. Delete extra exchanges
//! 4. Create missing queues
//! 5. Delete extra queues
//! 6. Create missing bindings
//! 7. Delete extra bindings
//!
//! The fixed order makes creations precede their dependents and deletions
//! succeed them. Nothing inside a pass is fatal: a failed inventory shard is
//! treated as empty and recorded in `errors`, a failed mutation is recorded
//! and the pass continues. The next pass re-snapshots.
//!
//! In dry-run mode the same traversal runs with all mutation calls skipped;
//! the result is the action plan a real run would execute, not a simulation
//! of provider failures.

use crate::provider::BrokerProvider;
use crate::topology::{ActualTopology, BindingRef, DesiredTopology, SyncScope};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResult {
    pub created_exchanges: Vec<String>,
    pub created_queues: Vec<String>,
    pub created_bindings: Vec<BindingRef>,
    pub deleted_exchanges: Vec<String>,
    pub deleted_queues: Vec<String>,
    pub deleted_bindings: Vec<BindingRef>,
    pub errors: Vec<String>,
}

impl ReconciliationResult {
    /// True when all six action lists are empty.
    pub fn is_clean(&self) -> bool {
        self.created_exchanges.is_empty()
            && self.created_queues.is_empty()
            && self.created_bindings.is_empty()
            && self.deleted_exchanges.is_empty()
            && self.deleted_queues.is_empty()
            && self.deleted_bindings.is_empty()
    }

    /// Per-list counts for log summaries.
    pub fn summary(&self) -> BTreeMap<&'static str, usize> {
        BTreeMap::from([
            ("exchangesCreated", self.created_exchanges.len()),
            ("queuesCreated", self.created_queues.len()),
            ("bindingsCreated", self.created_bindings.len()),
            ("exchangesDeleted", self.deleted_exchanges.len()),
            ("queuesDeleted", self.deleted_queues.len()),
            ("bindingsDeleted", self.deleted_bindings.len()),
            ("errors", self.errors.len()),
        ])
    }
}

/// Run one full reconciliation pass.
pub async fn reconcile(
    provider: &dyn BrokerProvider,
    desired: &DesiredTopology,
    dry_run: bool,
) -> ReconciliationResult {
    reconcile_scoped(provider, desired, &SyncScope::default(), dry_run).await
}

/// Run one pass narrowed to a scope; an empty scope is the full pass.
pub async fn reconcile_scoped(
    provider: &dyn BrokerProvider,
    desired: &DesiredTopology,
    scope: &SyncScope,
    dry_run: bool,
) -> ReconciliationResult {
    let mut result = ReconciliationResult::default();
    let desired = desired.narrowed(scope);

    tracing::debug!(
        exchanges = desired.exchanges.len(),
        queues = desired.queues.len(),
        bindings = desired.bindings.len(),
        dry_run,
        "starting reconciliation pass"
    );

    let actual = snapshot_actual(provider, scope, &mut result).await;
    tracing::debug!(
        exchanges = actual.exchanges.len(),
        queues = actual.queues.len(),
        bindings = actual.binding_count(),
        "actual state snapshot complete"
    );

    reconcile_exchanges(provider, &desired, &actual, dry_run, &mut result).await;

    let desired_queues = desired.queue_names();
    reconcile_queues(provider, &desired, &actual, &desired_queues, dry_run, &mut result).await;
    reconcile_bindings(provider, &desired, &actual, &desired_queues, dry_run, &mut result).await;

    tracing::info!(summary = ?result.summary(), "reconciliation pass completed");
    result
}

/// Snapshot broker state, substituting an empty shard for any failed read.
async fn snapshot_actual(
    provider: &dyn BrokerProvider,
    scope: &SyncScope,
    result: &mut ReconciliationResult,
) -> ActualTopology {
    let mut actual = ActualTopology::default();

    match provider.list_exchanges().await {
        Ok(names) => {
            actual.exchanges = names
                .into_iter()
                .filter(|name| scope.admits_exchange(name))
                .collect();
        }
        Err(err) => result.errors.push(format!("failed to list exchanges: {err}")),
    }

    match provider.list_queues().await {
        Ok(names) => {
            actual.queues = names
                .into_iter()
                .filter(|name| scope.admits_queue(name))
                .collect();
        }
        Err(err) => result.errors.push(format!("failed to list queues: {err}")),
    }

    let queues: Vec<String> = actual.queues.iter().cloned().collect();
    for queue in queues {
        match provider.list_bindings(&queue).await {
            Ok(bindings) => {
                for b in bindings {
                    if scope.admits_binding(&b.queue, &b.exchange) {
                        actual.insert_binding(b.queue, b.exchange, b.routing_key);
                    }
                }
            }
            Err(err) => result
                .errors
                .push(format!("failed to list bindings for queue {queue}: {err}")),
        }
    }

    actual
}

async fn reconcile_exchanges(
    provider: &dyn BrokerProvider,
    desired: &DesiredTopology,
    actual: &ActualTopology,
    dry_run: bool,
    result: &mut ReconciliationResult,
) {
    for (name, spec) in &desired.exchanges {
        if actual.exchanges.contains(name) {
            continue;
        }
        if dry_run {
            tracing::info!("[dry run] would create exchange: {} (kind: {})", name, spec.kind);
            result.created_exchanges.push(name.clone());
            continue;
        }
        match provider.declare_exchange(name, spec.kind, true).await {
            Ok(()) => {
                tracing::info!("created exchange: {} (kind: {})", name, spec.kind);
                result.created_exchanges.push(name.clone());
            }
            Err(err) => result
                .errors
                .push(format!("failed to create exchange {name}: {err}")),
        }
    }

    // System exchanges never show up here; the provider filters them out of
    // its inventory and refuses to delete them.
    for name in &actual.exchanges {
        if desired.exchanges.contains_key(name) {
            continue;
        }
        if dry_run {
            tracing::info!("[dry run] would delete exchange: {}", name);
            result.deleted_exchanges.push(name.clone());
            continue;
        }
        match provider.delete_exchange(name).await {
            Ok(()) => {
                tracing::info!("deleted exchange: {}", name);
                result.deleted_exchanges.push(name.clone());
            }
            Err(err) => result
                .errors
                .push(format!("failed to delete exchange {name}: {err}")),
        }
    }
}

async fn reconcile_queues(
    provider: &dyn BrokerProvider,
    desired: &DesiredTopology,
    actual: &ActualTopology,
    desired_queues: &BTreeSet<String>,
    dry_run: bool,
    result: &mut ReconciliationResult,
) {
    for queue in &desired.queues {
        if actual.queues.contains(&queue.name) {
            continue;
        }
        if dry_run {
            tracing::info!("[dry run] would create queue: {}", queue.name);
            result.created_queues.push(queue.name.clone());
            continue;
        }
        match provider.declare_queue(&queue.name, true).await {
            Ok(()) => {
                tracing::info!("created queue: {}", queue.name);
                result.created_queues.push(queue.name.clone());
            }
            Err(err) => result
                .errors
                .push(format!("failed to create queue {}: {err}", queue.name)),
        }
    }

    for name in &actual.queues {
        if desired_queues.contains(name) {
            continue;
        }
        if dry_run {
            tracing::info!("[dry run] would delete queue: {}", name);
            result.deleted_queues.push(name.clone());
            continue;
        }
        match provider.delete_queue(name).await {
            Ok(()) => {
                tracing::info!("deleted queue: {}", name);
                result.deleted_queues.push(name.clone());
            }
            Err(err) => result
                .errors
                .push(format!("failed to delete queue {name}: {err}")),
        }
    }
}

async fn reconcile_bindings(
    provider: &dyn BrokerProvider,
    desired: &DesiredTopology,
    actual: &ActualTopology,
    desired_queues: &BTreeSet<String>,
    dry_run: bool,
    result: &mut ReconciliationResult,
) {
    let desired_index = desired.binding_index();

    let mut seen: BTreeSet<(&str, &str, &str)> = BTreeSet::new();
    for b in &desired.bindings {
        // Duplicate triples in the desired set collapse here.
        if !seen.insert(b.identity()) {
            continue;
        }
        if actual.contains_binding(&b.queue, &b.exchange, &b.routing_key) {
            continue;
        }
        let binding = BindingRef::from(b);
        if dry_run {
            tracing::info!("[dry run] would create binding: {}", binding);
            result.created_bindings.push(binding);
            continue;
        }
        match provider
            .bind_queue(&b.queue, &b.exchange, &b.routing_key)
            .await
        {
            Ok(()) => {
                tracing::info!("created binding: {}", binding);
                result.created_bindings.push(binding);
            }
            Err(err) => result
                .errors
                .push(format!("failed to create binding {binding}: {err}")),
        }
    }

    for (queue, per_exchange) in &actual.bindings {
        // A queue deleted in the previous step takes its bindings with it;
        // those are not enumerated as deleted bindings.
        if !desired_queues.contains(queue) {
            continue;
        }
        for (exchange, keys) in per_exchange {
            for key in keys {
                let expected = desired_index
                    .get(queue.as_str())
                    .and_then(|per_exchange| per_exchange.get(exchange.as_str()))
                    .is_some_and(|keys| keys.contains(key.as_str()));
                if expected {
                    continue;
                }
                let binding = BindingRef::new(queue, exchange, key);
                if dry_run {
                    tracing::info!("[dry run] would delete binding: {}", binding);
                    result.deleted_bindings.push(binding);
                    continue;
                }
                match provider.unbind_queue(queue, exchange, key).await {
                    Ok(()) => {
                        tracing::info!("deleted binding: {}", binding);
                        result.deleted_bindings.push(binding);
                    }
                    Err(err) => result
                        .errors
                        .push(format!("failed to delete binding {binding}: {err}")),
                }
            }
        }
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker capability contract.
//!
//! The engine and the facade see the broker only through [`BrokerProvider`].
//! Adapters map every backend failure into [`ProviderError`]; backend error
//! types never cross this boundary.
//!
//! # Integration
//!
//! To add a backend, implement the trait:
//!
//! ```ignore
//! #[async_trait]
//! impl BrokerProvider for CloudPubSubBroker {
//!     async fn connect(&self) -> Result<(), ProviderError> {
//!         // Establish a session...
//!     }
//!     // ...
//! }
//! ```

use crate::topology::{BindingRef, ExchangeKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tokio::sync::mpsc;

/// Reserved exchange name prefix; such exchanges must never be touched.
pub const SYSTEM_EXCHANGE_PREFIX: &str = "amq.";

/// True for the default exchange and the broker-reserved `amq.*` family.
pub fn is_system_exchange(name: &str) -> bool {
    name.is_empty() || name.starts_with(SYSTEM_EXCHANGE_PREFIX)
}

/// Broker failure taxonomy.
///
/// `Unreachable` and `Conflict` are permanent against the current inputs;
/// `Transient` invites a retry on the next cadence.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("broker unreachable: {0}")]
    Unreachable(String),
    #[error("conflicting declaration: {0}")]
    Conflict(String),
    #[error("operation forbidden: {0}")]
    Forbidden(String),
    #[error("transient broker failure: {0}")]
    Transient(String),
    #[error("internal broker error: {0}")]
    Internal(String),
}

/// Session health, reported without remote calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    pub ok: bool,
    pub details: String,
}

impl HealthStatus {
    pub fn healthy(details: impl Into<String>) -> Self {
        Self {
            ok: true,
            details: details.into(),
        }
    }

    pub fn unhealthy(details: impl Into<String>) -> Self {
        Self {
            ok: false,
            details: details.into(),
        }
    }
}

/// Capability contract for one broker backend.
///
/// Mutations are idempotent on identical inputs; a redeclare with different
/// properties fails with [`ProviderError::Conflict`]. Deletes succeed when
/// the resource is already absent. Inventory reads exclude system exchanges
/// and default-exchange bindings.
#[async_trait]
pub trait BrokerProvider: Send + Sync {
    /// Establish a session. Idempotent when already connected.
    async fn connect(&self) -> Result<(), ProviderError>;

    /// Release the session. Safe on an already-closed instance.
    async fn close(&self) -> Result<(), ProviderError>;

    /// Cheap liveness probe on the held session only.
    fn health(&self) -> HealthStatus;

    async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> Result<(), ProviderError>;

    async fn declare_queue(&self, name: &str, durable: bool) -> Result<(), ProviderError>;

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), ProviderError>;

    async fn unbind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), ProviderError>;

    /// Succeeds when the queue is already absent.
    async fn delete_queue(&self, name: &str) -> Result<(), ProviderError>;

    /// Succeeds when the exchange is already absent; refuses system exchanges.
    async fn delete_exchange(&self, name: &str) -> Result<(), ProviderError>;

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), ProviderError>;

    async fn consume(&self, queue: &str) -> Result<mpsc::Receiver<Vec<u8>>, ProviderError>;

    async fn purge_queue(&self, queue: &str) -> Result<(), ProviderError>;

    /// Exchange names, system exchanges excluded.
    async fn list_exchanges(&self) -> Result<Vec<String>, ProviderError>;

    async fn list_queues(&self) -> Result<Vec<String>, ProviderError>;

    /// Bindings of one queue, default-exchange bindings excluded.
    async fn list_bindings(&self, queue: &str) -> Result<Vec<BindingRef>, ProviderError>;
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

#[derive(Debug, Default)]
struct MockState {
    connected: bool,
    exchanges: BTreeMap<String, (ExchangeKind, bool)>,
    queues: BTreeMap<String, bool>,
    bindings: BTreeSet<(String, String, String)>,
    published: Vec<(String, String, Vec<u8>)>,
    mutation_log: Vec<String>,
    connect_failures: usize,
    connect_attempts: usize,
    fail_list_exchanges: bool,
    fail_list_queues: bool,
    fail_list_bindings_for: BTreeSet<String>,
}

/// In-memory broker honoring the full [`BrokerProvider`] contract.
///
/// Mutations mutate the held state, so a reconciliation against the mock
/// converges exactly like one against a live broker. Inventory calls can be
/// made to fail per shard, and every mutation is appended to a log so tests
/// can assert on exactly which calls were issued.
pub struct MockBroker {
    state: Mutex<MockState>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                connected: true,
                ..Default::default()
            }),
        }
    }

    /// Seed an exchange as already present on the broker.
    ///
    /// System exchange names are accepted here: a real broker holds them too,
    /// it merely refuses to enumerate or delete them.
    pub fn seed_exchange(&self, name: &str) {
        self.state
            .lock()
            .exchanges
            .insert(name.to_string(), (ExchangeKind::Direct, true));
    }

    pub fn seed_queue(&self, name: &str) {
        self.state.lock().queues.insert(name.to_string(), true);
    }

    pub fn seed_binding(&self, queue: &str, exchange: &str, routing_key: &str) {
        self.state.lock().bindings.insert((
            queue.to_string(),
            exchange.to_string(),
            routing_key.to_string(),
        ));
    }

    /// Make the next `n` connect attempts fail with `Unreachable`.
    pub fn fail_connects(&self, n: usize) {
        self.state.lock().connect_failures = n;
    }

    pub fn fail_list_exchanges(&self, fail: bool) {
        self.state.lock().fail_list_exchanges = fail;
    }

    pub fn fail_list_queues(&self, fail: bool) {
        self.state.lock().fail_list_queues = fail;
    }

    pub fn fail_list_bindings_for(&self, queue: &str) {
        self.state
            .lock()
            .fail_list_bindings_for
            .insert(queue.to_string());
    }

    pub fn disconnect(&self) {
        self.state.lock().connected = false;
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.lock().connect_attempts
    }

    /// Every mutation issued so far, in order.
    pub fn mutations(&self) -> Vec<String> {
        self.state.lock().mutation_log.clone()
    }

    pub fn clear_mutations(&self) {
        self.state.lock().mutation_log.clear();
    }

    pub fn exchange_names(&self) -> BTreeSet<String> {
        self.state.lock().exchanges.keys().cloned().collect()
    }

    pub fn queue_names(&self) -> BTreeSet<String> {
        self.state.lock().queues.keys().cloned().collect()
    }

    pub fn binding_triples(&self) -> BTreeSet<(String, String, String)> {
        self.state.lock().bindings.clone()
    }

    pub fn published(&self) -> Vec<(String, String, Vec<u8>)> {
        self.state.lock().published.clone()
    }
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerProvider for MockBroker {
    async fn connect(&self) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        state.connect_attempts += 1;
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(ProviderError::Unreachable("mock connect refused".into()));
        }
        state.connected = true;
        Ok(())
    }

    async fn close(&self) -> Result<(), ProviderError> {
        self.state.lock().connected = false;
        Ok(())
    }

    fn health(&self) -> HealthStatus {
        if self.state.lock().connected {
            HealthStatus::healthy("connected")
        } else {
            HealthStatus::unhealthy("connection closed")
        }
    }

    async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        state
            .mutation_log
            .push(format!("declare_exchange {name}"));
        if let Some(&(existing_kind, existing_durable)) = state.exchanges.get(name) {
            if existing_kind != kind || existing_durable != durable {
                return Err(ProviderError::Conflict(format!(
                    "exchange {name} exists with different properties"
                )));
            }
            return Ok(());
        }
        state.exchanges.insert(name.to_string(), (kind, durable));
        Ok(())
    }

    async fn declare_queue(&self, name: &str, durable: bool) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        state.mutation_log.push(format!("declare_queue {name}"));
        if let Some(&existing_durable) = state.queues.get(name) {
            if existing_durable != durable {
                return Err(ProviderError::Conflict(format!(
                    "queue {name} exists with different properties"
                )));
            }
            return Ok(());
        }
        state.queues.insert(name.to_string(), durable);
        Ok(())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        state
            .mutation_log
            .push(format!("bind_queue {queue} {exchange} {routing_key}"));
        if !state.queues.contains_key(queue) {
            return Err(ProviderError::Internal(format!("no queue {queue}")));
        }
        if !state.exchanges.contains_key(exchange) {
            return Err(ProviderError::Internal(format!("no exchange {exchange}")));
        }
        state.bindings.insert((
            queue.to_string(),
            exchange.to_string(),
            routing_key.to_string(),
        ));
        Ok(())
    }

    async fn unbind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        state
            .mutation_log
            .push(format!("unbind_queue {queue} {exchange} {routing_key}"));
        state.bindings.remove(&(
            queue.to_string(),
            exchange.to_string(),
            routing_key.to_string(),
        ));
        Ok(())
    }

    async fn delete_queue(&self, name: &str) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        state.mutation_log.push(format!("delete_queue {name}"));
        state.queues.remove(name);
        // The broker cascades binding removal with the queue.
        state.bindings.retain(|(queue, _, _)| queue != name);
        Ok(())
    }

    async fn delete_exchange(&self, name: &str) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        state.mutation_log.push(format!("delete_exchange {name}"));
        if is_system_exchange(name) {
            return Err(ProviderError::Forbidden(format!(
                "cannot delete system exchange: {name}"
            )));
        }
        state.exchanges.remove(name);
        state.bindings.retain(|(_, exchange, _)| exchange != name);
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), ProviderError> {
        self.state.lock().published.push((
            exchange.to_string(),
            routing_key.to_string(),
            body.to_vec(),
        ));
        Ok(())
    }

    async fn consume(&self, _queue: &str) -> Result<mpsc::Receiver<Vec<u8>>, ProviderError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    async fn purge_queue(&self, _queue: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn list_exchanges(&self) -> Result<Vec<String>, ProviderError> {
        let state = self.state.lock();
        if state.fail_list_exchanges {
            return Err(ProviderError::Transient("mock list_exchanges failed".into()));
        }
        Ok(state
            .exchanges
            .keys()
            .filter(|name| !is_system_exchange(name))
            .cloned()
            .collect())
    }

    async fn list_queues(&self) -> Result<Vec<String>, ProviderError> {
        let state = self.state.lock();
        if state.fail_list_queues {
            return Err(ProviderError::Transient("mock list_queues failed".into()));
        }
        Ok(state.queues.keys().cloned().collect())
    }

    async fn list_bindings(&self, queue: &str) -> Result<Vec<BindingRef>, ProviderError> {
        let state = self.state.lock();
        if state.fail_list_bindings_for.contains(queue) {
            return Err(ProviderError::Transient(format!(
                "mock list_bindings failed for {queue}"
            )));
        }
        Ok(state
            .bindings
            .iter()
            .filter(|(q, exchange, _)| q == queue && !exchange.is_empty())
            .map(|(q, exchange, key)| BindingRef::new(q, exchange, key))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_exchange_rule() {
        assert!(is_system_exchange(""));
        assert!(is_system_exchange("amq.topic"));
        assert!(is_system_exchange("amq.direct"));
        assert!(!is_system_exchange("amqx"));
        assert!(!is_system_exchange("orders"));
    }

    #[tokio::test]
    async fn mock_excludes_system_exchanges_from_inventory() {
        let broker = MockBroker::new();
        broker.seed_exchange("amq.topic");
        broker.seed_exchange("");
        broker.seed_exchange("orders");

        let listed = broker.list_exchanges().await.unwrap();
        assert_eq!(listed, vec!["orders".to_string()]);
    }

    #[tokio::test]
    async fn mock_refuses_system_exchange_deletion() {
        let broker = MockBroker::new();
        broker.seed_exchange("amq.topic");
        let err = broker.delete_exchange("amq.topic").await.unwrap_err();
        assert!(matches!(err, ProviderError::Forbidden(_)));
        assert!(broker.exchange_names().contains("amq.topic"));
    }

    #[tokio::test]
    async fn mock_redeclare_with_different_properties_conflicts() {
        let broker = MockBroker::new();
        broker
            .declare_exchange("orders", ExchangeKind::Topic, true)
            .await
            .unwrap();
        broker
            .declare_exchange("orders", ExchangeKind::Topic, true)
            .await
            .unwrap();
        let err = broker
            .declare_exchange("orders", ExchangeKind::Fanout, true)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Conflict(_)));
    }

    #[tokio::test]
    async fn mock_queue_deletion_cascades_bindings() {
        let broker = MockBroker::new();
        broker.seed_exchange("ex");
        broker.seed_queue("q");
        broker.seed_binding("q", "ex", "key");

        broker.delete_queue("q").await.unwrap();
        assert!(broker.binding_triples().is_empty());
        assert!(broker.list_bindings("q").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mock_delete_is_idempotent() {
        let broker = MockBroker::new();
        broker.delete_queue("ghost").await.unwrap();
        broker.delete_exchange("ghost").await.unwrap();
    }

    #[tokio::test]
    async fn mock_connect_failure_injection_counts_attempts() {
        let broker = MockBroker::new();
        broker.disconnect();
        broker.fail_connects(2);

        assert!(broker.connect().await.is_err());
        assert!(broker.connect().await.is_err());
        assert!(broker.connect().await.is_ok());
        assert_eq!(broker.connect_attempts(), 3);
        assert!(broker.health().ok);
    }
}

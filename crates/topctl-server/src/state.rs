// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared application state.
//!
//! One instance lives for the whole process; the supervisor and every HTTP
//! handler borrow it through an `Arc`. Reconciliations from both sides
//! serialize through `sync_lock` so concurrent passes never interleave
//! their mutations.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use topctl_core::BrokerProvider;
use topctl_store::Repository;

pub struct AppState {
    pub repo: Option<Repository>,
    pub provider: Option<Arc<dyn BrokerProvider>>,
    /// Single-flight guard for reconciliation passes.
    pub sync_lock: Mutex<()>,
    passes: AtomicU64,
}

/// Dependency view served by the readiness endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Readiness {
    pub ready: bool,
    pub store_ok: bool,
    pub provider_ok: bool,
    pub reconciliation_passes: u64,
}

impl AppState {
    pub fn new(repo: Option<Repository>, provider: Option<Arc<dyn BrokerProvider>>) -> Self {
        Self {
            repo,
            provider,
            sync_lock: Mutex::new(()),
            passes: AtomicU64::new(0),
        }
    }

    pub fn record_pass(&self) {
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn passes_completed(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Ready iff the store answers, the provider session is healthy, and at
    /// least one reconciliation pass has completed since startup. An absent
    /// dependency is not a dependency in this deployment and counts as
    /// healthy; the pass requirement applies only when a provider exists.
    pub async fn readiness(&self) -> Readiness {
        let store_ok = match &self.repo {
            Some(repo) => repo.ping().await.is_ok(),
            None => true,
        };
        let provider_ok = match &self.provider {
            Some(provider) => provider.health().ok,
            None => true,
        };
        let passes = self.passes_completed();
        let passes_ok = self.provider.is_none() || passes >= 1;
        Readiness {
            ready: store_ok && provider_ok && passes_ok,
            store_ok,
            provider_ok,
            reconciliation_passes: passes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topctl_core::MockBroker;

    #[tokio::test]
    async fn no_dependencies_is_ready() {
        let state = AppState::new(None, None);
        let readiness = state.readiness().await;
        assert!(readiness.ready);
        assert!(readiness.store_ok);
        assert!(readiness.provider_ok);
    }

    #[tokio::test]
    async fn provider_gates_on_first_pass() {
        let state = AppState::new(None, Some(Arc::new(MockBroker::new())));
        assert!(!state.readiness().await.ready, "no pass completed yet");

        state.record_pass();
        assert!(state.readiness().await.ready);
    }

    #[tokio::test]
    async fn unhealthy_provider_is_not_ready() {
        let broker = Arc::new(MockBroker::new());
        broker.disconnect();
        let state = AppState::new(None, Some(broker));
        state.record_pass();
        let readiness = state.readiness().await;
        assert!(!readiness.ready);
        assert!(!readiness.provider_ok);
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Query and planning facade.
//!
//! Read-side operations behind the HTTP surface: project the desired
//! topology, snapshot the actual one, categorize the difference, and run a
//! (possibly scoped, possibly dry) sync. Deliberately free of HTTP types so
//! it can be exercised directly in tests.

use crate::state::AppState;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use topctl_core::{
    categorize, reconcile_scoped, ActualTopology, BrokerProvider, DesiredTopology, DetailsReport,
    ProviderError, ReconciliationResult, ServiceAssignment, SyncScope, TopologyFilter,
};
use topctl_store::{load_topology, object_or_empty, LoadError, Repository, StoreError};

#[derive(Debug, Error)]
pub enum FacadeError {
    #[error("database connection not available")]
    StoreDisabled,
    #[error("queue provider not available")]
    ProviderDisabled,
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Optional narrowing accepted by the read endpoints.
#[derive(Debug, Clone, Default)]
pub struct ViewFilter {
    pub service: Option<String>,
    pub queue: Option<String>,
    pub exchange: Option<String>,
}

/// A queue with its assignment detail, as served to consuming services.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceQueueDetail {
    pub queue_name: String,
    pub uuid: String,
    pub durable: bool,
    pub auto_delete: bool,
    pub arguments: Map<String, Value>,
    pub description: String,
    pub prefetch_count: i32,
    pub max_inflight: i32,
    pub notes: String,
    pub meta: Map<String, Value>,
}

#[derive(Clone)]
pub struct Facade {
    state: Arc<AppState>,
}

impl Facade {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    fn repo(&self) -> Result<&Repository, FacadeError> {
        self.state.repo.as_ref().ok_or(FacadeError::StoreDisabled)
    }

    fn provider(&self) -> Result<&Arc<dyn BrokerProvider>, FacadeError> {
        self.state
            .provider
            .as_ref()
            .ok_or(FacadeError::ProviderDisabled)
    }

    /// All active service assignments, projected to the domain type.
    pub async fn service_assignments(&self) -> Result<Vec<ServiceAssignment>, FacadeError> {
        let rows = self.repo()?.list_service_assignments().await?;
        Ok(rows.into_iter().map(ServiceAssignment::from).collect())
    }

    /// Resolve a view filter, turning a service name into its queue set.
    async fn resolve_filter(&self, filter: &ViewFilter) -> Result<TopologyFilter, FacadeError> {
        let service_queues = match &filter.service {
            Some(service) => Some(
                self.service_assignments()
                    .await?
                    .into_iter()
                    .filter(|assignment| assignment.service == *service)
                    .map(|assignment| assignment.queue)
                    .collect(),
            ),
            None => None,
        };
        Ok(TopologyFilter {
            exchange: filter.exchange.clone(),
            queue: filter.queue.clone(),
            service_queues,
        })
    }

    /// The desired topology, narrowed by the filter.
    pub async fn expectation(&self, filter: &ViewFilter) -> Result<DesiredTopology, FacadeError> {
        let desired = load_topology(self.repo()?).await?;
        let resolved = self.resolve_filter(filter).await?;
        Ok(desired.filtered(&resolved))
    }

    /// A fresh broker snapshot, narrowed by the filter.
    pub async fn reality(&self, filter: &ViewFilter) -> Result<ActualTopology, FacadeError> {
        let actual = snapshot(self.provider()?.as_ref()).await?;
        let resolved = self.resolve_filter(filter).await?;
        Ok(actual.filtered(&resolved))
    }

    /// Categorize every resource of both sides under one filter.
    pub async fn details(&self, filter: &ViewFilter) -> Result<DetailsReport, FacadeError> {
        let resolved = self.resolve_filter(filter).await?;
        let desired = load_topology(self.repo()?).await?.filtered(&resolved);
        let actual = snapshot(self.provider()?.as_ref())
            .await?
            .filtered(&resolved);
        Ok(categorize(&desired, &actual))
    }

    /// Run one reconciliation pass under the single-flight guard.
    pub async fn run_sync(
        &self,
        scope: &SyncScope,
        dry_run: bool,
    ) -> Result<ReconciliationResult, FacadeError> {
        let desired = load_topology(self.repo()?).await?;
        let provider = self.provider()?;

        let _guard = self.state.sync_lock.lock().await;
        let result = reconcile_scoped(provider.as_ref(), &desired, scope, dry_run).await;
        if !dry_run {
            self.state.record_pass();
        }
        Ok(result)
    }

    /// Queues assigned to a service with their consumption parameters.
    pub async fn service_queues(
        &self,
        service: &str,
    ) -> Result<Vec<ServiceQueueDetail>, FacadeError> {
        let rows = self.repo()?.queues_for_service(service).await?;
        Ok(rows
            .into_iter()
            .map(|row| ServiceQueueDetail {
                queue_name: row.queue.queue_name,
                uuid: row.queue.uuid.to_string(),
                durable: row.queue.durable,
                auto_delete: row.queue.auto_delete,
                arguments: object_or_empty(&row.queue.arguments),
                description: row.queue.description,
                prefetch_count: row.prefetch_count,
                max_inflight: row.max_inflight,
                notes: row.notes,
                meta: object_or_empty(&row.assignment_meta),
            })
            .collect())
    }
}

/// Full broker snapshot; unlike the engine's tolerant variant, a failed
/// shard here is the caller's error.
async fn snapshot(provider: &dyn BrokerProvider) -> Result<ActualTopology, ProviderError> {
    let mut actual = ActualTopology::default();
    actual.exchanges = provider.list_exchanges().await?.into_iter().collect();
    actual.queues = provider.list_queues().await?.into_iter().collect();
    let queues: Vec<String> = actual.queues.iter().cloned().collect();
    for queue in queues {
        for binding in provider.list_bindings(&queue).await? {
            actual.insert_binding(binding.queue, binding.exchange, binding.routing_key);
        }
    }
    Ok(actual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use topctl_core::MockBroker;

    fn broker_state(broker: MockBroker) -> Arc<AppState> {
        Arc::new(AppState::new(None, Some(Arc::new(broker))))
    }

    #[tokio::test]
    async fn reality_snapshots_and_filters_the_broker() {
        let broker = MockBroker::new();
        broker.seed_exchange("ex.orders");
        broker.seed_exchange("ex.audit");
        broker.seed_queue("q.orders");
        broker.seed_binding("q.orders", "ex.orders", "order.*");
        broker.seed_binding("q.orders", "ex.audit", "audit");

        let facade = Facade::new(broker_state(broker));
        let all = facade.reality(&ViewFilter::default()).await.unwrap();
        assert_eq!(all.exchanges.len(), 2);
        assert_eq!(all.binding_count(), 2);

        let narrowed = facade
            .reality(&ViewFilter {
                exchange: Some("ex.orders".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(narrowed.exchanges.len(), 1);
        assert_eq!(narrowed.binding_count(), 1);
        assert!(narrowed.contains_binding("q.orders", "ex.orders", "order.*"));
    }

    #[tokio::test]
    async fn reality_without_provider_is_a_disabled_error() {
        let facade = Facade::new(Arc::new(AppState::new(None, None)));
        let err = facade.reality(&ViewFilter::default()).await.unwrap_err();
        assert!(matches!(err, FacadeError::ProviderDisabled));
    }

    #[tokio::test]
    async fn expectation_without_store_is_a_disabled_error() {
        let facade = Facade::new(Arc::new(AppState::new(None, None)));
        let err = facade
            .expectation(&ViewFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FacadeError::StoreDisabled));
    }

    #[tokio::test]
    async fn snapshot_surfaces_shard_failures() {
        let broker = MockBroker::new();
        broker.fail_list_queues(true);
        let facade = Facade::new(broker_state(broker));
        let err = facade.reality(&ViewFilter::default()).await.unwrap_err();
        assert!(matches!(err, FacadeError::Provider(_)));
    }
}

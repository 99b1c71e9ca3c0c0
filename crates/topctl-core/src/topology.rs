// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topology value types.
//!
//! `DesiredTopology` is the canonical projection of the desired-state store;
//! `ActualTopology` is a snapshot of what the broker reports. Both are built
//! once per reconciliation pass and never mutated afterwards.
//!
//! Binding identity is the full `(exchange, queue, routing_key)` triple.
//! Routing keys may contain any byte, including `:`; the actual-side binding
//! shape is therefore a nested map `queue -> exchange -> set<routing_key>`
//! rather than any delimiter-joined encoding.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// AMQP exchange kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Direct,
    Topic,
    Fanout,
    Headers,
}

impl ExchangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Topic => "topic",
            Self::Fanout => "fanout",
            Self::Headers => "headers",
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for exchange kind strings outside the closed set.
#[derive(Debug, Clone, Error)]
#[error("unknown exchange kind: {0}")]
pub struct UnknownExchangeKind(pub String);

impl FromStr for ExchangeKind {
    type Err = UnknownExchangeKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(Self::Direct),
            "topic" => Ok(Self::Topic),
            "fanout" => Ok(Self::Fanout),
            "headers" => Ok(Self::Headers),
            other => Err(UnknownExchangeKind(other.to_string())),
        }
    }
}

/// Desired declaration of one routing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeSpec {
    pub name: String,
    pub kind: ExchangeKind,
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    #[serde(default)]
    pub description: String,
}

/// Desired declaration of one message destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSpec {
    pub name: String,
    pub durable: bool,
    pub auto_delete: bool,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    #[serde(default)]
    pub description: String,
}

/// Edge in the bipartite exchange/queue graph.
///
/// Equality, ordering and hashing consider only the identity triple; two
/// bindings that differ in `arguments` or `mandatory` are the same edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingSpec {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    #[serde(default)]
    pub mandatory: bool,
}

impl BindingSpec {
    /// Identity triple, in `(queue, exchange, routing_key)` order.
    pub fn identity(&self) -> (&str, &str, &str) {
        (&self.queue, &self.exchange, &self.routing_key)
    }
}

impl PartialEq for BindingSpec {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for BindingSpec {}

impl Hash for BindingSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl PartialOrd for BindingSpec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BindingSpec {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

/// Queue consumption parameters for one service, read-through only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAssignment {
    pub service: String,
    pub queue: String,
    pub prefetch_count: i32,
    pub max_inflight: i32,
    #[serde(default)]
    pub notes: String,
}

/// Lightweight binding triple used in results and inventory listings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingRef {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
}

impl BindingRef {
    pub fn new(
        queue: impl Into<String>,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        Self {
            queue: queue.into(),
            exchange: exchange.into(),
            routing_key: routing_key.into(),
        }
    }
}

impl From<&BindingSpec> for BindingRef {
    fn from(spec: &BindingSpec) -> Self {
        Self::new(&spec.queue, &spec.exchange, &spec.routing_key)
    }
}

impl fmt::Display for BindingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} (routing key: {})",
            self.exchange, self.queue, self.routing_key
        )
    }
}

/// The desired topology, as projected by the loader.
///
/// Queues arrive name-sorted from the repository; bindings keep loader order
/// with set semantics on the identity triple.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesiredTopology {
    pub exchanges: BTreeMap<String, ExchangeSpec>,
    pub queues: Vec<QueueSpec>,
    pub bindings: Vec<BindingSpec>,
}

impl DesiredTopology {
    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty() && self.queues.is_empty() && self.bindings.is_empty()
    }

    /// Names of desired queues.
    pub fn queue_names(&self) -> BTreeSet<String> {
        self.queues.iter().map(|q| q.name.clone()).collect()
    }

    /// Nested index of desired bindings, in the actual-side shape.
    pub fn binding_index(&self) -> BTreeMap<&str, BTreeMap<&str, BTreeSet<&str>>> {
        let mut index: BTreeMap<&str, BTreeMap<&str, BTreeSet<&str>>> = BTreeMap::new();
        for b in &self.bindings {
            index
                .entry(b.queue.as_str())
                .or_default()
                .entry(b.exchange.as_str())
                .or_default()
                .insert(b.routing_key.as_str());
        }
        index
    }

    /// Projection by an optional read-side filter.
    pub fn filtered(&self, filter: &TopologyFilter) -> Self {
        Self {
            exchanges: self
                .exchanges
                .iter()
                .filter(|(name, _)| filter.matches_exchange(name))
                .map(|(name, spec)| (name.clone(), spec.clone()))
                .collect(),
            queues: self
                .queues
                .iter()
                .filter(|q| filter.matches_queue(&q.name))
                .cloned()
                .collect(),
            bindings: self
                .bindings
                .iter()
                .filter(|b| filter.matches_binding(&b.queue, &b.exchange))
                .cloned()
                .collect(),
        }
    }

    /// Narrowing by a sync scope; the identity for an empty scope.
    pub fn narrowed(&self, scope: &SyncScope) -> Self {
        if scope.is_empty() {
            return self.clone();
        }
        Self {
            exchanges: self
                .exchanges
                .iter()
                .filter(|(name, _)| scope.selects_exchange(name))
                .map(|(name, spec)| (name.clone(), spec.clone()))
                .collect(),
            queues: self
                .queues
                .iter()
                .filter(|q| scope.selects_queue(&q.name))
                .cloned()
                .collect(),
            bindings: self
                .bindings
                .iter()
                .filter(|b| scope.selects_binding(&b.queue, &b.exchange))
                .cloned()
                .collect(),
        }
    }
}

/// The broker-observed topology at the start of a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualTopology {
    pub exchanges: BTreeSet<String>,
    pub queues: BTreeSet<String>,
    pub bindings: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl ActualTopology {
    pub fn insert_binding(
        &mut self,
        queue: impl Into<String>,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
    ) {
        self.bindings
            .entry(queue.into())
            .or_default()
            .entry(exchange.into())
            .or_default()
            .insert(routing_key.into());
    }

    pub fn contains_binding(&self, queue: &str, exchange: &str, routing_key: &str) -> bool {
        self.bindings
            .get(queue)
            .and_then(|per_exchange| per_exchange.get(exchange))
            .is_some_and(|keys| keys.contains(routing_key))
    }

    pub fn binding_count(&self) -> usize {
        self.bindings
            .values()
            .flat_map(|per_exchange| per_exchange.values())
            .map(BTreeSet::len)
            .sum()
    }

    /// All bindings as flat triples, deterministically ordered.
    pub fn binding_refs(&self) -> Vec<BindingRef> {
        let mut refs = Vec::with_capacity(self.binding_count());
        for (queue, per_exchange) in &self.bindings {
            for (exchange, keys) in per_exchange {
                for key in keys {
                    refs.push(BindingRef::new(queue, exchange, key));
                }
            }
        }
        refs
    }

    /// Projection by an optional read-side filter.
    pub fn filtered(&self, filter: &TopologyFilter) -> Self {
        let mut out = Self {
            exchanges: self
                .exchanges
                .iter()
                .filter(|name| filter.matches_exchange(name))
                .cloned()
                .collect(),
            queues: self
                .queues
                .iter()
                .filter(|name| filter.matches_queue(name))
                .cloned()
                .collect(),
            bindings: BTreeMap::new(),
        };
        for (queue, per_exchange) in &self.bindings {
            for (exchange, keys) in per_exchange {
                if filter.matches_binding(queue, exchange) {
                    for key in keys {
                        out.insert_binding(queue, exchange, key);
                    }
                }
            }
        }
        out
    }
}

/// Read-side filter for the expectation/reality/details views.
///
/// Each axis narrows its own resource class: `exchange` narrows exchanges,
/// `queue` (and the service-resolved `queues` set) narrows queues, and
/// bindings are kept only when every set constraint on their endpoints
/// holds. An axis left unset is unrestricted.
#[derive(Debug, Clone, Default)]
pub struct TopologyFilter {
    pub exchange: Option<String>,
    pub queue: Option<String>,
    /// Queue names resolved from a service filter, when one was given.
    pub service_queues: Option<BTreeSet<String>>,
}

impl TopologyFilter {
    pub fn is_empty(&self) -> bool {
        self.exchange.is_none() && self.queue.is_none() && self.service_queues.is_none()
    }

    pub fn matches_exchange(&self, name: &str) -> bool {
        self.exchange.as_deref().is_none_or(|want| want == name)
    }

    pub fn matches_queue(&self, name: &str) -> bool {
        self.queue.as_deref().is_none_or(|want| want == name)
            && self
                .service_queues
                .as_ref()
                .is_none_or(|set| set.contains(name))
    }

    pub fn matches_binding(&self, queue: &str, exchange: &str) -> bool {
        self.matches_exchange(exchange) && self.matches_queue(queue)
    }
}

/// Mutation scope for a planned or real sync.
///
/// Unlike [`TopologyFilter`], a non-empty scope is strict: only the named
/// resources (and bindings touching them) take part in the pass. A scope
/// naming just an exchange contributes no queues at all, so the pass cannot
/// create or delete any queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncScope {
    pub exchange: Option<String>,
    pub queue: Option<String>,
}

impl SyncScope {
    pub fn is_empty(&self) -> bool {
        self.exchange.is_none() && self.queue.is_none()
    }

    fn selects_exchange(&self, name: &str) -> bool {
        self.exchange.as_deref() == Some(name)
    }

    fn selects_queue(&self, name: &str) -> bool {
        self.queue.as_deref() == Some(name)
    }

    fn selects_binding(&self, queue: &str, exchange: &str) -> bool {
        self.exchange.as_deref().is_none_or(|want| want == exchange)
            && self.queue.as_deref().is_none_or(|want| want == queue)
    }

    /// Whether the scope keeps this queue in the actual snapshot.
    pub(crate) fn admits_queue(&self, name: &str) -> bool {
        if self.is_empty() {
            return true;
        }
        self.selects_queue(name)
    }

    /// Whether the scope keeps this exchange in the actual snapshot.
    pub(crate) fn admits_exchange(&self, name: &str) -> bool {
        if self.is_empty() {
            return true;
        }
        self.selects_exchange(name)
    }

    /// Whether the scope keeps this binding in the actual snapshot.
    pub(crate) fn admits_binding(&self, queue: &str, exchange: &str) -> bool {
        if self.is_empty() {
            return true;
        }
        self.selects_binding(queue, exchange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(queue: &str, exchange: &str, key: &str) -> BindingSpec {
        BindingSpec {
            exchange: exchange.to_string(),
            queue: queue.to_string(),
            routing_key: key.to_string(),
            arguments: Map::new(),
            mandatory: false,
        }
    }

    #[test]
    fn exchange_kind_round_trips_through_strings() {
        for kind in [
            ExchangeKind::Direct,
            ExchangeKind::Topic,
            ExchangeKind::Fanout,
            ExchangeKind::Headers,
        ] {
            assert_eq!(kind.as_str().parse::<ExchangeKind>().unwrap(), kind);
        }
        assert!("x-delayed".parse::<ExchangeKind>().is_err());
    }

    #[test]
    fn binding_identity_ignores_arguments() {
        let mut a = binding("q", "ex", "a:b:c");
        let b = binding("q", "ex", "a:b:c");
        a.arguments.insert("x-match".into(), Value::from("all"));
        a.mandatory = true;
        assert_eq!(a, b);

        let c = binding("q", "ex", "a:b");
        assert_ne!(a, c);
    }

    #[test]
    fn actual_topology_binding_map_preserves_colons() {
        let mut actual = ActualTopology::default();
        actual.insert_binding("q", "ex", "a:b:c");
        actual.insert_binding("q", "ex", "a:b");
        assert!(actual.contains_binding("q", "ex", "a:b:c"));
        assert!(actual.contains_binding("q", "ex", "a:b"));
        assert!(!actual.contains_binding("q", "ex", "a"));
        assert_eq!(actual.binding_count(), 2);
    }

    #[test]
    fn filter_axes_are_independent() {
        let mut desired = DesiredTopology::default();
        desired.exchanges.insert(
            "ex.orders".into(),
            ExchangeSpec {
                name: "ex.orders".into(),
                kind: ExchangeKind::Topic,
                durable: true,
                auto_delete: false,
                internal: false,
                arguments: Map::new(),
                description: String::new(),
            },
        );
        desired.queues.push(QueueSpec {
            name: "q.orders".into(),
            durable: true,
            auto_delete: false,
            arguments: Map::new(),
            description: String::new(),
        });
        desired.queues.push(QueueSpec {
            name: "q.audit".into(),
            durable: true,
            auto_delete: false,
            arguments: Map::new(),
            description: String::new(),
        });
        desired.bindings.push(binding("q.orders", "ex.orders", "#"));
        desired.bindings.push(binding("q.audit", "ex.orders", "#"));

        let filter = TopologyFilter {
            queue: Some("q.orders".into()),
            ..Default::default()
        };
        let narrowed = desired.filtered(&filter);
        assert_eq!(narrowed.exchanges.len(), 1, "queue filter keeps exchanges");
        assert_eq!(narrowed.queues.len(), 1);
        assert_eq!(narrowed.bindings.len(), 1);
        assert_eq!(narrowed.bindings[0].queue, "q.orders");
    }

    #[test]
    fn service_filter_narrows_queues_through_resolved_set() {
        let filter = TopologyFilter {
            service_queues: Some(BTreeSet::from(["q.orders".to_string()])),
            ..Default::default()
        };
        assert!(filter.matches_queue("q.orders"));
        assert!(!filter.matches_queue("q.audit"));
        assert!(filter.matches_exchange("anything"));
    }

    #[test]
    fn desired_topology_round_trips_through_json() {
        let mut desired = DesiredTopology::default();
        desired.exchanges.insert(
            "order.events".into(),
            ExchangeSpec {
                name: "order.events".into(),
                kind: ExchangeKind::Topic,
                durable: true,
                auto_delete: false,
                internal: false,
                arguments: Map::from_iter([("alternate-exchange".into(), Value::from("dlx"))]),
                description: "order lifecycle events".into(),
            },
        );
        desired.queues.push(QueueSpec {
            name: "order.created".into(),
            durable: true,
            auto_delete: false,
            arguments: Map::new(),
            description: String::new(),
        });
        desired.bindings.push(binding("order.created", "order.events", "order.created"));

        let json = serde_json::to_string(&desired).unwrap();
        let parsed: DesiredTopology = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, desired);
    }

    #[test]
    fn strict_scope_drops_unnamed_classes() {
        let scope = SyncScope {
            exchange: Some("ex.orders".into()),
            queue: None,
        };
        assert!(scope.admits_exchange("ex.orders"));
        assert!(!scope.admits_exchange("ex.other"));
        assert!(!scope.admits_queue("q.orders"));
        assert!(scope.admits_binding("q.orders", "ex.orders"));
        assert!(!scope.admits_binding("q.orders", "ex.other"));

        let empty = SyncScope::default();
        assert!(empty.admits_exchange("anything"));
        assert!(empty.admits_queue("anything"));
    }
}

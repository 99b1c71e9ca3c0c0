// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Desired-vs-actual categorization for the details view.
//!
//! Every resource lands in exactly one category. For exchanges and queues
//! the categories are `missing` (desired only), `unexpected` (actual only)
//! and `healthy` (both). Bindings are judged per routing key within a
//! `(queue, exchange)` pair: shared keys are `healthy`, desired-only keys
//! `missing`, actual-only keys `unexpected`. Only when a pair is bound on
//! both sides with no routing-key overlap at all is it reported once as
//! `mismatched`, carrying both key sets.

use crate::topology::{ActualTopology, BindingRef, DesiredTopology};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Name-level categorization for exchanges or queues.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDetails {
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
    pub healthy: Vec<String>,
}

/// A `(queue, exchange)` pair bound on both sides with disjoint key sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingMismatch {
    pub queue: String,
    pub exchange: String,
    pub desired_keys: Vec<String>,
    pub actual_keys: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingDetails {
    pub missing: Vec<BindingRef>,
    pub unexpected: Vec<BindingRef>,
    pub mismatched: Vec<BindingMismatch>,
    pub healthy: Vec<BindingRef>,
}

/// The grouped report served by the details view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailsReport {
    pub exchanges: ResourceDetails,
    pub queues: ResourceDetails,
    pub bindings: BindingDetails,
}

impl DetailsReport {
    /// True when everything is healthy.
    pub fn is_converged(&self) -> bool {
        self.exchanges.missing.is_empty()
            && self.exchanges.unexpected.is_empty()
            && self.queues.missing.is_empty()
            && self.queues.unexpected.is_empty()
            && self.bindings.missing.is_empty()
            && self.bindings.unexpected.is_empty()
            && self.bindings.mismatched.is_empty()
    }
}

/// Categorize every resource of both topologies.
pub fn categorize(desired: &DesiredTopology, actual: &ActualTopology) -> DetailsReport {
    let mut report = DetailsReport::default();

    for name in desired.exchanges.keys() {
        if actual.exchanges.contains(name) {
            report.exchanges.healthy.push(name.clone());
        } else {
            report.exchanges.missing.push(name.clone());
        }
    }
    for name in &actual.exchanges {
        if !desired.exchanges.contains_key(name) {
            report.exchanges.unexpected.push(name.clone());
        }
    }

    let desired_queues = desired.queue_names();
    for name in &desired_queues {
        if actual.queues.contains(name) {
            report.queues.healthy.push(name.clone());
        } else {
            report.queues.missing.push(name.clone());
        }
    }
    for name in &actual.queues {
        if !desired_queues.contains(name) {
            report.queues.unexpected.push(name.clone());
        }
    }

    categorize_bindings(desired, actual, &mut report.bindings);
    report
}

fn categorize_bindings(
    desired: &DesiredTopology,
    actual: &ActualTopology,
    details: &mut BindingDetails,
) {
    let desired_index = desired.binding_index();

    for (queue, per_exchange) in &desired_index {
        for (exchange, desired_keys) in per_exchange {
            let actual_keys: Option<&BTreeSet<String>> = actual
                .bindings
                .get(*queue)
                .and_then(|per_exchange| per_exchange.get(*exchange));
            match actual_keys {
                None => {
                    for key in desired_keys {
                        details.missing.push(BindingRef::new(*queue, *exchange, *key));
                    }
                }
                Some(actual_keys) => {
                    let actual_keys: BTreeSet<&str> =
                        actual_keys.iter().map(String::as_str).collect();
                    if desired_keys.is_disjoint(&actual_keys) {
                        details.mismatched.push(BindingMismatch {
                            queue: (*queue).to_string(),
                            exchange: (*exchange).to_string(),
                            desired_keys: desired_keys.iter().map(|k| k.to_string()).collect(),
                            actual_keys: actual_keys.iter().map(|k| k.to_string()).collect(),
                        });
                        continue;
                    }
                    for key in desired_keys {
                        if actual_keys.contains(key) {
                            details.healthy.push(BindingRef::new(*queue, *exchange, *key));
                        } else {
                            details.missing.push(BindingRef::new(*queue, *exchange, *key));
                        }
                    }
                    for key in &actual_keys {
                        if !desired_keys.contains(key) {
                            details.unexpected.push(BindingRef::new(*queue, *exchange, *key));
                        }
                    }
                }
            }
        }
    }

    for (queue, per_exchange) in &actual.bindings {
        for (exchange, keys) in per_exchange {
            let pair_desired = desired_index
                .get(queue.as_str())
                .and_then(|per_exchange| per_exchange.get(exchange.as_str()))
                .is_some();
            if !pair_desired {
                for key in keys {
                    details.unexpected.push(BindingRef::new(queue, exchange, key));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{BindingSpec, ExchangeKind, ExchangeSpec, QueueSpec};
    use serde_json::Map;

    fn sample_desired() -> DesiredTopology {
        let mut desired = DesiredTopology::default();
        for name in ["ex.here", "ex.missing"] {
            desired.exchanges.insert(
                name.to_string(),
                ExchangeSpec {
                    name: name.to_string(),
                    kind: ExchangeKind::Topic,
                    durable: true,
                    auto_delete: false,
                    internal: false,
                    arguments: Map::new(),
                    description: String::new(),
                },
            );
        }
        for name in ["q.here", "q.missing"] {
            desired.queues.push(QueueSpec {
                name: name.to_string(),
                durable: true,
                auto_delete: false,
                arguments: Map::new(),
                description: String::new(),
            });
        }
        desired.bindings.push(BindingSpec {
            exchange: "ex.here".into(),
            queue: "q.here".into(),
            routing_key: "order.*".into(),
            arguments: Map::new(),
            mandatory: false,
        });
        desired
    }

    #[test]
    fn categories_are_exclusive_and_complete() {
        let desired = sample_desired();
        let mut actual = ActualTopology::default();
        actual.exchanges.insert("ex.here".into());
        actual.exchanges.insert("ex.stray".into());
        actual.queues.insert("q.here".into());
        actual.queues.insert("q.stray".into());
        actual.insert_binding("q.here", "ex.here", "order.#");
        actual.insert_binding("q.stray", "ex.stray", "x");

        let report = categorize(&desired, &actual);

        assert_eq!(report.exchanges.missing, vec!["ex.missing"]);
        assert_eq!(report.exchanges.unexpected, vec!["ex.stray"]);
        assert_eq!(report.exchanges.healthy, vec!["ex.here"]);

        assert_eq!(report.queues.missing, vec!["q.missing"]);
        assert_eq!(report.queues.unexpected, vec!["q.stray"]);
        assert_eq!(report.queues.healthy, vec!["q.here"]);

        // Same (queue, exchange) pair, disjoint routing keys.
        assert_eq!(report.bindings.mismatched.len(), 1);
        let mismatch = &report.bindings.mismatched[0];
        assert_eq!(mismatch.queue, "q.here");
        assert_eq!(mismatch.exchange, "ex.here");
        assert_eq!(mismatch.desired_keys, vec!["order.*"]);
        assert_eq!(mismatch.actual_keys, vec!["order.#"]);
        assert!(report.bindings.missing.is_empty());
        assert_eq!(
            report.bindings.unexpected,
            vec![BindingRef::new("q.stray", "ex.stray", "x")]
        );
        assert!(report.bindings.healthy.is_empty());
        assert!(!report.is_converged());
    }

    #[test]
    fn identical_topologies_are_converged() {
        let desired = sample_desired();
        let mut actual = ActualTopology::default();
        for name in desired.exchanges.keys() {
            actual.exchanges.insert(name.clone());
        }
        for queue in &desired.queues {
            actual.queues.insert(queue.name.clone());
        }
        for b in &desired.bindings {
            actual.insert_binding(&b.queue, &b.exchange, &b.routing_key);
        }

        let report = categorize(&desired, &actual);
        assert!(report.is_converged());
        assert_eq!(report.bindings.healthy.len(), 1);
    }

    #[test]
    fn overlapping_pair_splits_per_key_instead_of_mismatching() {
        let mut desired = sample_desired();
        desired.bindings.push(BindingSpec {
            exchange: "ex.here".into(),
            queue: "q.here".into(),
            routing_key: "order.created".into(),
            arguments: Map::new(),
            mandatory: false,
        });
        // Desired keys {order.*, order.created}; actual {order.*, order.dead}.
        let mut actual = ActualTopology::default();
        actual.insert_binding("q.here", "ex.here", "order.*");
        actual.insert_binding("q.here", "ex.here", "order.dead");

        let report = categorize(&desired, &actual);
        assert!(report.bindings.mismatched.is_empty());
        assert_eq!(
            report.bindings.healthy,
            vec![BindingRef::new("q.here", "ex.here", "order.*")]
        );
        assert_eq!(
            report.bindings.missing,
            vec![BindingRef::new("q.here", "ex.here", "order.created")]
        );
        assert_eq!(
            report.bindings.unexpected,
            vec![BindingRef::new("q.here", "ex.here", "order.dead")]
        );
    }

    #[test]
    fn absent_pair_is_missing_not_mismatched() {
        let desired = sample_desired();
        let actual = ActualTopology::default();

        let report = categorize(&desired, &actual);
        assert_eq!(
            report.bindings.missing,
            vec![BindingRef::new("q.here", "ex.here", "order.*")]
        );
        assert!(report.bindings.mismatched.is_empty());
    }
}

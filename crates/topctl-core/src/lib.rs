// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! topctl core
//!
//! Topology types, the broker capability contract and the reconciliation
//! engine. This crate is broker-agnostic and store-agnostic: the desired
//! topology arrives as a value, the broker is reached only through the
//! [`BrokerProvider`] trait, and one pass of [`reconcile`] drives the
//! observed state toward the desired one.
//!
//! # Architecture
//!
//! ```text
//! DesiredTopology --+
//!                   +--> reconcile() --> ReconciliationResult
//! BrokerProvider ---+        |
//!   (snapshot + mutations)   +--> categorize() --> DetailsReport
//! ```
//!
//! # Example
//!
//! ```ignore
//! use topctl_core::{reconcile, BrokerProvider, DesiredTopology};
//!
//! let result = reconcile(&broker, &desired, /* dry_run */ true).await;
//! println!("{:?}", result.summary());
//! ```

pub mod diff;
pub mod provider;
pub mod reconcile;
pub mod topology;

pub use diff::{categorize, BindingDetails, BindingMismatch, DetailsReport, ResourceDetails};
pub use provider::{
    is_system_exchange, BrokerProvider, HealthStatus, MockBroker, ProviderError,
};
pub use reconcile::{reconcile, reconcile_scoped, ReconciliationResult};
pub use topology::{
    ActualTopology, BindingRef, BindingSpec, DesiredTopology, ExchangeKind, ExchangeSpec,
    QueueSpec, ServiceAssignment, SyncScope, TopologyFilter, UnknownExchangeKind,
};

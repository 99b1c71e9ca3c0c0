// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! topctl server
//!
//! Declarative topology reconciler for AMQP-style brokers. The desired set
//! of exchanges, queues and bindings lives in Postgres; this service
//! continuously drives the live broker toward it and exposes the desired,
//! actual and diffed views over HTTP.
//!
//! # Endpoints
//!
//! - `GET /health` - Process liveness
//! - `GET /ready` - Dependencies + initial reconciliation
//! - `GET /expectation` - Desired topology
//! - `GET /reality` - Broker snapshot
//! - `GET /details` - Missing/unexpected/mismatched/healthy grouping
//! - `POST /sync` - On-demand reconciliation, optionally dry-run
//! - `GET /services/{service}/queues` - Assignment read-through
//!
//! # Configuration
//!
//! Entirely from the environment; see `config.rs`. The process exits
//! non-zero only for invalid configuration or a configured-but-unreachable
//! store. Broker unavailability is survivable: the supervisor keeps
//! retrying on its cadence.

mod config;
mod facade;
mod http;
mod state;
mod supervisor;

use anyhow::Context;
use config::{Config, ProviderConfig};
use state::AppState;
use std::sync::Arc;
use supervisor::Supervisor;
use topctl_core::BrokerProvider;
use topctl_rabbitmq::RabbitMqBroker;
use topctl_store::Repository;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cfg = Config::from_env().context("failed to load configuration")?;

    let repo = match &cfg.postgres_uri {
        Some(uri) => {
            let repo = Repository::connect(uri)
                .await
                .context("failed to connect to database")?;
            info!("connected to database");
            Some(repo)
        }
        None => {
            info!("POSTGRES_URI not set; store disabled, reconciliation will no-op");
            None
        }
    };

    let provider: Option<Arc<dyn BrokerProvider>> = match &cfg.provider {
        ProviderConfig::RabbitMq { amqp_uri, http_uri } => {
            let broker = match http_uri {
                Some(http_uri) => RabbitMqBroker::with_http_uri(amqp_uri, http_uri),
                None => RabbitMqBroker::new(amqp_uri),
            };
            Some(Arc::new(broker))
        }
        ProviderConfig::None => {
            info!("no queue provider configured");
            None
        }
    };

    let state = Arc::new(AppState::new(repo, provider));

    let supervisor = state
        .provider
        .is_some()
        .then(|| Supervisor::new(Arc::clone(&state)).start());

    let app = http::router(Arc::clone(&state));
    let addr = cfg.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(version = env!("CARGO_PKG_VERSION"), addr = %addr, "topctl server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(handle) = supervisor {
        handle.stop().await;
    }
    if let Some(provider) = &state.provider {
        if let Err(err) = provider.close().await {
            tracing::warn!("error closing queue provider: {err}");
        }
    }
    if let Some(repo) = &state.repo {
        repo.close().await;
    }
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received");
}

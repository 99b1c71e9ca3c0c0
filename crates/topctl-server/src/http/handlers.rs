// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP request handlers.
//!
//! Thin translation between query/body parameters and the facade. Handlers
//! never touch the provider or the store directly.

use crate::facade::{Facade, ViewFilter};
use crate::http::envelope::{parse_pagination, ApiError, Envelope, FieldIssue, Metadata, Pagination};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use topctl_core::{ReconciliationResult, SyncScope};
use uuid::Uuid;

const NOT_READY_RETRY_SECONDS: u64 = 5;

/// GET /health -- process liveness, no remote calls.
pub async fn health() -> Response {
    let envelope = Envelope::new("ok", json!({"status": "ok"}), Metadata::now());
    (StatusCode::OK, Json(envelope)).into_response()
}

/// GET /ready -- dependencies plus at least one completed pass.
pub async fn ready(State(state): State<Arc<AppState>>) -> Response {
    let readiness = state.readiness().await;
    if readiness.ready {
        let envelope = Envelope::new("ready", &readiness, Metadata::now());
        (StatusCode::OK, Json(envelope)).into_response()
    } else {
        let metadata = Metadata::now().with_retry_after(NOT_READY_RETRY_SECONDS);
        let envelope = Envelope::new("not ready", &readiness, metadata);
        (StatusCode::SERVICE_UNAVAILABLE, Json(envelope)).into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewParams {
    service: Option<String>,
    queue: Option<String>,
    exchange: Option<String>,
    page: Option<String>,
    page_size: Option<String>,
}

impl ViewParams {
    fn filter(&self) -> ViewFilter {
        ViewFilter {
            service: self.service.clone(),
            queue: self.queue.clone(),
            exchange: self.exchange.clone(),
        }
    }
}

fn validated_pagination(
    page: Option<&str>,
    page_size: Option<&str>,
) -> Result<Pagination, ApiError> {
    parse_pagination(page, page_size)
        .map_err(|issues| ApiError::bad_request("invalid pagination parameters", issues))
}

/// GET /expectation -- the desired topology, optionally filtered.
pub async fn expectation(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ViewParams>,
) -> Result<Response, ApiError> {
    let pagination = validated_pagination(params.page.as_deref(), params.page_size.as_deref())?;
    let facade = Facade::new(state);
    let desired = facade.expectation(&params.filter()).await?;

    let total = (desired.exchanges.len() + desired.queues.len() + desired.bindings.len()) as u64;
    let metadata = Metadata::now().with_pagination(&pagination, total);
    let envelope = Envelope::new("expected topology", &desired, metadata);
    Ok((StatusCode::OK, Json(envelope)).into_response())
}

/// GET /reality -- the broker snapshot, optionally filtered.
pub async fn reality(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ViewParams>,
) -> Result<Response, ApiError> {
    let pagination = validated_pagination(params.page.as_deref(), params.page_size.as_deref())?;
    let facade = Facade::new(state);
    let actual = facade
        .reality(&ViewFilter {
            service: None,
            queue: params.queue.clone(),
            exchange: params.exchange.clone(),
        })
        .await?;

    let total = (actual.exchanges.len() + actual.queues.len() + actual.binding_count()) as u64;
    let metadata = Metadata::now().with_pagination(&pagination, total);
    let envelope = Envelope::new("actual topology", &actual, metadata);
    Ok((StatusCode::OK, Json(envelope)).into_response())
}

/// GET /details -- every resource grouped into missing/unexpected/
/// mismatched/healthy.
pub async fn details(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ViewParams>,
) -> Result<Response, ApiError> {
    let pagination = validated_pagination(params.page.as_deref(), params.page_size.as_deref())?;
    let facade = Facade::new(state);
    let report = facade.details(&params.filter()).await?;

    let total = (report.exchanges.missing.len()
        + report.exchanges.unexpected.len()
        + report.exchanges.healthy.len()
        + report.queues.missing.len()
        + report.queues.unexpected.len()
        + report.queues.healthy.len()
        + report.bindings.missing.len()
        + report.bindings.unexpected.len()
        + report.bindings.mismatched.len()
        + report.bindings.healthy.len()) as u64;
    let metadata = Metadata::now().with_pagination(&pagination, total);
    let envelope = Envelope::new("topology details", &report, metadata);
    Ok((StatusCode::OK, Json(envelope)).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncParams {
    dry_run: Option<String>,
    exchange: Option<String>,
    queue: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBody {
    dry_run: Option<bool>,
    scope: Option<SyncScope>,
}

fn parse_dry_run(raw: &str) -> Result<bool, ApiError> {
    match raw {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ApiError::bad_request(
            "invalid parameters",
            vec![FieldIssue::new("dryRun", "must be a boolean value")],
        )),
    }
}

fn actions_payload(result: &ReconciliationResult) -> serde_json::Value {
    json!({
        "actions": {
            "toCreate": {
                "exchanges": result.created_exchanges,
                "queues": result.created_queues,
                "bindings": result.created_bindings,
            },
            "toDelete": {
                "exchanges": result.deleted_exchanges,
                "queues": result.deleted_queues,
                "bindings": result.deleted_bindings,
            },
        },
        "summary": result.summary(),
        "errors": result.errors,
    })
}

/// POST /sync -- dry runs return the plan synchronously; real runs are
/// accepted and executed on a background task under the job id.
pub async fn sync(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SyncParams>,
    body: Option<Json<SyncBody>>,
) -> Result<Response, ApiError> {
    let body = body.map(|Json(body)| body).unwrap_or_default();

    // The query parameter wins over the body flag.
    let dry_run = match params.dry_run.as_deref() {
        Some(raw) => parse_dry_run(raw)?,
        None => body.dry_run.unwrap_or(false),
    };
    let scope = if params.exchange.is_some() || params.queue.is_some() {
        SyncScope {
            exchange: params.exchange.clone(),
            queue: params.queue.clone(),
        }
    } else {
        body.scope.unwrap_or_default()
    };

    let facade = Facade::new(state);
    if dry_run {
        let result = facade.run_sync(&scope, true).await?;
        let envelope = Envelope::new("dry run complete", actions_payload(&result), Metadata::now());
        return Ok((StatusCode::OK, Json(envelope)).into_response());
    }

    let job_id = Uuid::new_v4().to_string();
    let job = job_id.clone();
    tokio::spawn(async move {
        match facade.run_sync(&scope, false).await {
            Ok(result) => {
                tracing::info!(job_id = %job, summary = ?result.summary(), "sync completed");
                for error in &result.errors {
                    tracing::warn!(job_id = %job, "sync error: {error}");
                }
            }
            Err(err) => tracing::warn!(job_id = %job, "sync failed: {err}"),
        }
    });

    let envelope = Envelope::new("sync started", json!({ "jobId": job_id }), Metadata::now());
    Ok((StatusCode::ACCEPTED, Json(envelope)).into_response())
}

/// GET /services/{service}/queues -- assignment read-through for consumers.
pub async fn service_queues(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
) -> Result<Response, ApiError> {
    if service.trim().is_empty() {
        return Err(ApiError::bad_request(
            "invalid parameters",
            vec![FieldIssue::new("service", "must not be empty")],
        ));
    }
    let facade = Facade::new(state);
    let queues = facade.service_queues(&service).await?;

    let total = queues.len() as u64;
    let metadata = Metadata::now().with_pagination(&Default::default(), total);
    let envelope = Envelope::new("service queues", &queues, metadata);
    Ok((StatusCode::OK, Json(envelope)).into_response())
}

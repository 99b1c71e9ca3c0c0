// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request middleware: trace-id correlation and the handler deadline.
//!
//! `X-Trace-Id` is accepted from the caller when it is a syntactically valid
//! UUIDv4, generated otherwise, and echoed on the response. The probe
//! endpoints `/health` and `/ready` are exempt: they neither read nor set
//! the header.

use crate::http::envelope::ApiError;
use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const TRACE_HEADER: &str = "X-Trace-Id";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Trace id attached to request extensions for handlers and logs.
#[derive(Debug, Clone)]
pub struct TraceId(pub String);

fn is_uuid_v4(value: &str) -> bool {
    Uuid::parse_str(value)
        .map(|parsed| parsed.get_version_num() == 4)
        .unwrap_or(false)
}

/// Keep a valid incoming trace id, mint one otherwise.
pub fn accept_or_generate(incoming: Option<&str>) -> String {
    match incoming {
        Some(value) if is_uuid_v4(value) => value.to_string(),
        _ => Uuid::new_v4().to_string(),
    }
}

pub async fn trace_id(mut request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if path == "/health" || path == "/ready" {
        return next.run(request).await;
    }

    let incoming = request
        .headers()
        .get(TRACE_HEADER)
        .and_then(|value| value.to_str().ok());
    let id = accept_or_generate(incoming);
    let method = request.method().clone();
    request.extensions_mut().insert(TraceId(id.clone()));

    let started = Instant::now();
    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(TRACE_HEADER, value);
    }
    tracing::info!(
        category = "API",
        trace_id = %id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        "request completed"
    );
    response
}

/// Hard per-request deadline; exceeding it surfaces a gateway timeout.
pub async fn timeout(request: Request, next: Next) -> Response {
    match tokio::time::timeout(REQUEST_TIMEOUT, next.run(request)).await {
        Ok(response) => response,
        Err(_) => ApiError::timeout().into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_v4_trace_ids_are_kept() {
        let id = Uuid::new_v4().to_string();
        assert_eq!(accept_or_generate(Some(&id)), id);
    }

    #[test]
    fn invalid_trace_ids_are_replaced() {
        for bad in ["", "not-a-uuid", "12345"] {
            let generated = accept_or_generate(Some(bad));
            assert_ne!(generated, bad);
            assert!(is_uuid_v4(&generated));
        }
    }

    #[test]
    fn non_v4_uuids_are_replaced() {
        // A valid UUID, but version 1.
        let v1 = "c232ab00-9414-11ec-b3c8-9f68deced846";
        assert!(Uuid::parse_str(v1).is_ok());
        let generated = accept_or_generate(Some(v1));
        assert_ne!(generated, v1);
        assert!(is_uuid_v4(&generated));
    }

    #[test]
    fn absent_header_generates_a_fresh_id() {
        let a = accept_or_generate(None);
        let b = accept_or_generate(None);
        assert!(is_uuid_v4(&a));
        assert_ne!(a, b);
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Response envelope and pagination validation.
//!
//! Every response body is `{message, data, metadata}`. Metadata carries an
//! RFC3339 timestamp, the echoed pagination window, result totals, and any
//! validation issues as `{field, issue}` pairs.

use crate::facade::FacadeError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use topctl_core::ProviderError;
use topctl_store::LoadError;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const MAX_PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone, Serialize)]
pub struct FieldIssue {
    pub field: String,
    pub issue: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, issue: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            issue: issue.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl Metadata {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            page: None,
            page_size: None,
            total: None,
            errors: Vec::new(),
            retry_after_seconds: None,
        }
    }

    pub fn with_pagination(mut self, pagination: &Pagination, total: u64) -> Self {
        self.page = Some(pagination.page);
        self.page_size = Some(pagination.page_size);
        self.total = Some(total);
        self
    }

    pub fn with_errors(mut self, errors: Vec<FieldIssue>) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after_seconds = Some(seconds);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub metadata: Metadata,
}

impl Envelope {
    pub fn new(message: impl Into<String>, data: impl Serialize, metadata: Metadata) -> Self {
        Self {
            message: message.into(),
            data: serde_json::to_value(data).ok(),
            metadata,
        }
    }

    pub fn message_only(message: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            message: message.into(),
            data: None,
            metadata,
        }
    }
}

/// Validated pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Parse `page`/`pageSize` query values, collecting every issue.
pub fn parse_pagination(
    page: Option<&str>,
    page_size: Option<&str>,
) -> Result<Pagination, Vec<FieldIssue>> {
    let mut issues = Vec::new();
    let mut pagination = Pagination::default();

    if let Some(raw) = page {
        match raw.parse::<u32>() {
            Ok(value) if value >= 1 => pagination.page = value,
            _ => issues.push(FieldIssue::new("page", "must be an integer of at least 1")),
        }
    }
    if let Some(raw) = page_size {
        match raw.parse::<u32>() {
            Ok(value) if (1..=MAX_PAGE_SIZE).contains(&value) => pagination.page_size = value,
            _ => issues.push(FieldIssue::new(
                "pageSize",
                format!("must be an integer between 1 and {MAX_PAGE_SIZE}"),
            )),
        }
    }

    if issues.is_empty() {
        Ok(pagination)
    } else {
        Err(issues)
    }
}

/// Error shape returned by every handler.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub errors: Vec<FieldIssue>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>, errors: Vec<FieldIssue>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            errors,
        }
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn timeout() -> Self {
        Self {
            status: StatusCode::GATEWAY_TIMEOUT,
            message: "request timeout".to_string(),
            errors: Vec::new(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let metadata = Metadata::now().with_errors(self.errors);
        let envelope = Envelope::message_only(self.message, metadata);
        (self.status, Json(envelope)).into_response()
    }
}

impl From<FacadeError> for ApiError {
    fn from(err: FacadeError) -> Self {
        match &err {
            FacadeError::StoreDisabled | FacadeError::ProviderDisabled => {
                Self::service_unavailable(err.to_string())
            }
            FacadeError::Store(_) | FacadeError::Load(LoadError::Store(_)) => {
                Self::service_unavailable(err.to_string())
            }
            FacadeError::Provider(ProviderError::Unreachable(_))
            | FacadeError::Provider(ProviderError::Transient(_)) => {
                Self::service_unavailable(err.to_string())
            }
            _ => Self::internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_apply() {
        let pagination = parse_pagination(None, None).unwrap();
        assert_eq!(pagination, Pagination::default());
        assert_eq!(pagination.page, 1);
        assert_eq!(pagination.page_size, 100);
    }

    #[test]
    fn pagination_accepts_the_valid_range() {
        let pagination = parse_pagination(Some("3"), Some("500")).unwrap();
        assert_eq!(pagination.page, 3);
        assert_eq!(pagination.page_size, 500);
    }

    #[test]
    fn pagination_rejects_out_of_range_values() {
        let issues = parse_pagination(Some("0"), Some("501")).unwrap_err();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].field, "page");
        assert_eq!(issues[1].field, "pageSize");
    }

    #[test]
    fn pagination_rejects_non_numeric_values() {
        let issues = parse_pagination(Some("first"), Some("lots")).unwrap_err();
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn metadata_skips_empty_fields() {
        let json = serde_json::to_value(Metadata::now()).unwrap();
        let object = json.as_object().unwrap();
        assert!(object.contains_key("timestamp"));
        assert!(!object.contains_key("page"));
        assert!(!object.contains_key("errors"));
        assert!(!object.contains_key("retryAfterSeconds"));
    }

    #[test]
    fn envelope_serializes_with_camel_case_metadata() {
        let metadata = Metadata::now()
            .with_pagination(&Pagination::default(), 7)
            .with_retry_after(5);
        let envelope = Envelope::new("ok", serde_json::json!({"x": 1}), metadata);
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["metadata"]["pageSize"], 100);
        assert_eq!(json["metadata"]["total"], 7);
        assert_eq!(json["metadata"]["retryAfterSeconds"], 5);
        assert_eq!(json["data"]["x"], 1);
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Transport abstraction.
//!
//! The SDK never talks to the network itself. A [`Transport`] turns one logical
//! request into a remote call and hands back the raw response; how that happens
//! (HTTP, RPC, tool calls routed to a backend host) is up to the implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SdkError};

/// One logical request to the remote runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    /// Action or tool name, e.g. `ClearContext` or `page_use_act_async`.
    pub action: String,
    /// Session the request targets, if any.
    pub session_id: Option<String>,
    /// Action parameters.
    pub params: serde_json::Value,
}

impl ApiRequest {
    /// Create a request without a session.
    pub fn new(action: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            action: action.into(),
            session_id: None,
            params,
        }
    }

    /// Target a session.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Raw response from the remote runtime.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Request ID assigned by the remote system.
    pub request_id: Option<String>,
    /// Whether the remote system accepted the request.
    pub success: bool,
    /// Response body.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Error code when `success` is false.
    pub error_code: Option<String>,
    /// Error message when `success` is false.
    pub error_message: Option<String>,
}

impl ApiResponse {
    /// Successful response with a body.
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data,
            ..Self::default()
        }
    }

    /// Failed response.
    pub fn failed(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_code: Some(code.into()),
            error_message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Body of a successful response, or [`SdkError::Remote`].
    pub fn into_data(self) -> Result<serde_json::Value> {
        if self.success {
            Ok(self.data)
        } else {
            Err(SdkError::Remote {
                code: self.error_code.unwrap_or_else(|| "unknown".to_string()),
                message: self
                    .error_message
                    .unwrap_or_else(|| "request failed".to_string()),
            })
        }
    }
}

/// Executes requests against the remote runtime.
///
/// Implementations report failures to reach the remote system as
/// [`SdkError::Transport`]; a reachable system that refuses a request answers
/// with `success == false`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute one request.
    async fn call(&self, request: ApiRequest) -> Result<ApiResponse>;
}

/// Call `transport`, giving up after `timeout`.
pub(crate) async fn call_with_timeout(
    transport: &dyn Transport,
    request: ApiRequest,
    timeout: Duration,
) -> Result<ApiResponse> {
    let action = request.action.clone();
    tokio::time::timeout(timeout, transport.call(request))
        .await
        .map_err(|_| {
            SdkError::Transport(format!(
                "{} did not answer within {}ms",
                action,
                timeout.as_millis()
            ))
        })?
}

/// Call `transport` and return the response body, treating refusals as errors.
pub(crate) async fn call_data(
    transport: &dyn Transport,
    request: ApiRequest,
    timeout: Duration,
) -> Result<serde_json::Value> {
    call_with_timeout(transport, request, timeout)
        .await?
        .into_data()
}

/// Read a required string field from a response body.
pub(crate) fn required_str(data: &serde_json::Value, field: &str) -> Result<String> {
    data.get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SdkError::UnexpectedResponse(format!("missing '{}' in response", field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_into_data_success() {
        let data = ApiResponse::ok(json!({"task_id": "t-1"})).into_data().unwrap();
        assert_eq!(data["task_id"], "t-1");
    }

    #[test]
    fn test_into_data_failure() {
        let err = ApiResponse::failed("InvalidContext", "no such context")
            .into_data()
            .unwrap_err();
        match err {
            SdkError::Remote { code, message } => {
                assert_eq!(code, "InvalidContext");
                assert_eq!(message, "no such context");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_required_str() {
        let data = json!({"task_id": "abc", "empty": ""});
        assert_eq!(required_str(&data, "task_id").unwrap(), "abc");
        assert!(required_str(&data, "empty").is_err());
        assert!(required_str(&data, "missing").is_err());
    }

    #[test]
    fn test_request_builder() {
        let request = ApiRequest::new("GetSession", json!({})).with_session("s-1");
        assert_eq!(request.action, "GetSession");
        assert_eq!(request.session_id.as_deref(), Some("s-1"));
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Context data operations: clearing and synchronizing persistent contexts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::completion::{
    Acknowledgement, CONTEXT_AVAILABLE, CompletionTracker, OperationHandle, OperationKind,
    PollReport, RetryPolicy, StatusProbe, StatusSnapshot,
};
use crate::config::SdkConfig;
use crate::error::{Result, SdkError};
use crate::transport::{ApiRequest, Transport, call_data};

/// Current state of a context as reported by the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextState {
    /// Context ID.
    pub context_id: String,
    /// State string, e.g. `clearing` or `available`.
    pub state: String,
    /// Error reported for the last operation, if any.
    pub error_message: Option<String>,
}

impl ContextState {
    /// Whether the context is ready for use.
    pub fn is_available(&self) -> bool {
        self.state.eq_ignore_ascii_case(CONTEXT_AVAILABLE)
    }
}

/// Direction of a context sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Session to persistent storage.
    #[default]
    Upload,
    /// Persistent storage to session.
    Download,
}

/// Options for a context sync.
#[derive(Debug, Clone, Default)]
pub struct SyncRequest {
    /// Limit the sync to one context.
    pub context_id: Option<String>,
    /// Limit the sync to one mount path.
    pub path: Option<String>,
    /// Sync direction.
    pub mode: SyncMode,
    /// Override the default polling policy.
    pub policy: Option<RetryPolicy>,
}

impl SyncRequest {
    /// Sync everything in the default direction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit to one context and mount path.
    pub fn with_context(mut self, context_id: impl Into<String>, path: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self.path = Some(path.into());
        self
    }

    /// Set the sync direction.
    pub fn with_mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }

    /// Override the polling policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = Some(policy);
        self
    }
}

/// Per-context sync status entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextStatusEntry {
    /// Context ID.
    #[serde(alias = "contextId")]
    pub context_id: String,
    /// Mount path inside the session.
    #[serde(default)]
    pub path: String,
    /// Status string, e.g. `Pending`, `Uploading`, `Success`, `Failed`.
    pub status: String,
    /// Error message, if the task failed.
    #[serde(default, alias = "errorMessage")]
    pub error_message: Option<String>,
    /// Task type, e.g. `upload` or `download`.
    #[serde(default, alias = "taskType")]
    pub task_type: Option<String>,
}

impl ContextStatusEntry {
    fn is_finished(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }

    fn failure(&self) -> Option<String> {
        if let Some(msg) = self.error_message.as_deref().filter(|m| !m.is_empty()) {
            return Some(msg.to_string());
        }
        self.status
            .eq_ignore_ascii_case("failed")
            .then(|| format!("sync failed for context {} at {}", self.context_id, self.path))
    }
}

/// Filter for [`ContextService::info`].
#[derive(Debug, Clone, Default)]
pub struct ContextInfoFilter {
    /// Only this context.
    pub context_id: Option<String>,
    /// Only this mount path.
    pub path: Option<String>,
    /// Only this task type.
    pub task_type: Option<String>,
}

impl ContextInfoFilter {
    fn matches(&self, entry: &ContextStatusEntry) -> bool {
        self.context_id
            .as_deref()
            .is_none_or(|id| entry.context_id == id)
            && self.path.as_deref().is_none_or(|p| entry.path == p)
            && self
                .task_type
                .as_deref()
                .is_none_or(|t| entry.task_type.as_deref() == Some(t))
    }
}

/// Context clear, sync and status operations.
#[derive(Clone)]
pub struct ContextService {
    transport: Arc<dyn Transport>,
    config: Arc<SdkConfig>,
}

impl ContextService {
    pub(crate) fn new(transport: Arc<dyn Transport>, config: Arc<SdkConfig>) -> Self {
        Self { transport, config }
    }

    // =========================================================================
    // Clear
    // =========================================================================

    /// Start clearing a context without waiting.
    #[instrument(skip(self), fields(context_id = %context_id))]
    pub async fn clear_async(&self, context_id: &str) -> Result<OperationHandle> {
        require("context_id", context_id)?;
        debug!("Submitting context clear");

        let request = ApiRequest::new("ClearContext", json!({ "context_id": context_id }));
        call_data(self.transport.as_ref(), request, self.config.request_timeout)
            .await
            .map_err(|e| SdkError::SubmissionRejected(e.to_string()))?;

        Ok(OperationHandle::new(OperationKind::ContextClear, None))
    }

    /// Query the clear status of a context once.
    #[instrument(skip(self), fields(context_id = %context_id))]
    pub async fn get_clear_status(&self, context_id: &str) -> Result<ContextState> {
        require("context_id", context_id)?;
        let data = self.clear_probe(context_id).fetch().await?;
        let payload: ContextStatePayload = serde_json::from_value(data)?;
        let state = payload.state.or(payload.status).ok_or_else(|| {
            SdkError::UnexpectedResponse("context payload carries no state".to_string())
        })?;
        Ok(ContextState {
            context_id: context_id.to_string(),
            state,
            error_message: payload
                .error_message
                .or(payload.error_message_camel)
                .filter(|m| !m.is_empty()),
        })
    }

    /// Clear a context and wait until it is available again.
    #[instrument(skip(self, policy), fields(context_id = %context_id))]
    pub async fn clear(&self, context_id: &str, policy: Option<RetryPolicy>) -> Result<PollReport> {
        let handle = self.clear_async(context_id).await?;
        let tracker = CompletionTracker::new(
            OperationKind::ContextClear,
            self.policy_or_default(policy, OperationKind::ContextClear),
        );
        let report = tracker
            .await_completion(&handle, &self.clear_probe(context_id))
            .await?;
        info!(attempts = report.attempts, outcome = ?report.outcome, "Context clear finished");
        Ok(report)
    }

    /// Clear a context and report the outcome through `callback`.
    ///
    /// Returns once the clear request has been answered.
    pub async fn clear_with_callback<C>(
        &self,
        context_id: &str,
        policy: Option<RetryPolicy>,
        callback: C,
    ) -> Acknowledgement
    where
        C: FnOnce(PollReport) + Send + 'static,
    {
        let submission = self.clear_async(context_id).await;
        let probe = self.clear_probe(context_id);
        CompletionTracker::new(
            OperationKind::ContextClear,
            self.policy_or_default(policy, OperationKind::ContextClear),
        )
        .start_and_notify(submission, move |_| probe, callback)
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Start a context sync for a session without waiting.
    #[instrument(skip(self, request), fields(session_id = %session_id, mode = ?request.mode))]
    pub async fn sync_async(
        &self,
        session_id: &str,
        request: &SyncRequest,
    ) -> Result<OperationHandle> {
        require("session_id", session_id)?;
        if request.context_id.is_some() != request.path.is_some() {
            return Err(SdkError::InvalidInput(
                "context_id and path must be given together".to_string(),
            ));
        }
        debug!("Submitting context sync");

        let mut params = json!({ "mode": request.mode });
        if let (Some(context_id), Some(path)) = (&request.context_id, &request.path) {
            params["context_id"] = json!(context_id);
            params["path"] = json!(path);
        }
        let api_request = ApiRequest::new("SyncContext", params).with_session(session_id);
        call_data(self.transport.as_ref(), api_request, self.config.request_timeout)
            .await
            .map_err(|e| SdkError::SubmissionRejected(e.to_string()))?;

        Ok(OperationHandle::new(OperationKind::ContextSync, None))
    }

    /// Sync context data and wait until every matching context is done.
    #[instrument(skip(self, request), fields(session_id = %session_id))]
    pub async fn sync(&self, session_id: &str, request: SyncRequest) -> Result<PollReport> {
        let handle = self.sync_async(session_id, &request).await?;
        let tracker = CompletionTracker::new(
            OperationKind::ContextSync,
            self.policy_or_default(request.policy, OperationKind::ContextSync),
        );
        let report = tracker
            .await_completion(&handle, &self.sync_probe(session_id, &request))
            .await?;
        info!(attempts = report.attempts, outcome = ?report.outcome, "Context sync finished");
        Ok(report)
    }

    /// Sync context data and report the outcome through `callback`.
    pub async fn sync_with_callback<C>(
        &self,
        session_id: &str,
        request: SyncRequest,
        callback: C,
    ) -> Acknowledgement
    where
        C: FnOnce(PollReport) + Send + 'static,
    {
        let submission = self.sync_async(session_id, &request).await;
        let probe = self.sync_probe(session_id, &request);
        CompletionTracker::new(
            OperationKind::ContextSync,
            self.policy_or_default(request.policy, OperationKind::ContextSync),
        )
        .start_and_notify(submission, move |_| probe, callback)
    }

    /// Sync status entries of a session's contexts.
    #[instrument(skip(self, filter), fields(session_id = %session_id))]
    pub async fn info(
        &self,
        session_id: &str,
        filter: &ContextInfoFilter,
    ) -> Result<Vec<ContextStatusEntry>> {
        require("session_id", session_id)?;
        let request = ApiRequest::new("GetContextInfo", json!({})).with_session(session_id);
        let data = call_data(self.transport.as_ref(), request, self.config.request_timeout).await?;
        let entries = parse_entries(data)?;
        Ok(entries.into_iter().filter(|e| filter.matches(e)).collect())
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    fn policy_or_default(&self, policy: Option<RetryPolicy>, kind: OperationKind) -> RetryPolicy {
        policy.unwrap_or_else(|| RetryPolicy::for_kind(kind, &self.config))
    }

    fn clear_probe(&self, context_id: &str) -> ContextClearProbe {
        ContextClearProbe {
            transport: self.transport.clone(),
            context_id: context_id.to_string(),
            request_timeout: self.config.request_timeout,
        }
    }

    fn sync_probe(&self, session_id: &str, request: &SyncRequest) -> ContextSyncProbe {
        ContextSyncProbe {
            transport: self.transport.clone(),
            session_id: session_id.to_string(),
            filter: ContextInfoFilter {
                context_id: request.context_id.clone(),
                path: request.path.clone(),
                task_type: None,
            },
            request_timeout: self.config.request_timeout,
        }
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SdkError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ContextStatePayload {
    state: Option<String>,
    status: Option<String>,
    error_message: Option<String>,
    #[serde(rename = "errorMessage")]
    error_message_camel: Option<String>,
}

struct ContextClearProbe {
    transport: Arc<dyn Transport>,
    context_id: String,
    request_timeout: Duration,
}

impl ContextClearProbe {
    async fn fetch(&self) -> Result<serde_json::Value> {
        let request = ApiRequest::new(
            "GetContext",
            json!({ "context_id": self.context_id, "allow_create": false }),
        );
        call_data(self.transport.as_ref(), request, self.request_timeout).await
    }
}

#[async_trait]
impl StatusProbe for ContextClearProbe {
    async fn probe(&self) -> Result<StatusSnapshot> {
        self.fetch().await.map(StatusSnapshot::new)
    }
}

struct ContextSyncProbe {
    transport: Arc<dyn Transport>,
    session_id: String,
    filter: ContextInfoFilter,
    request_timeout: Duration,
}

#[async_trait]
impl StatusProbe for ContextSyncProbe {
    async fn probe(&self) -> Result<StatusSnapshot> {
        let request = ApiRequest::new("GetContextInfo", json!({})).with_session(&self.session_id);
        let data = call_data(self.transport.as_ref(), request, self.request_timeout).await?;
        let entries: Vec<ContextStatusEntry> = parse_entries(data)?
            .into_iter()
            .filter(|e| self.filter.matches(e))
            .collect();
        Ok(StatusSnapshot::new(fold_sync_entries(&entries)))
    }
}

/// Fold per-context entries into one clear/sync state payload.
fn fold_sync_entries(entries: &[ContextStatusEntry]) -> serde_json::Value {
    if entries.is_empty() {
        return json!({ "state": "pre-available" });
    }
    if let Some(error) = entries.iter().find_map(ContextStatusEntry::failure) {
        return json!({ "state": "failed", "errorMessage": error });
    }
    if entries.iter().all(ContextStatusEntry::is_finished) {
        json!({ "state": CONTEXT_AVAILABLE })
    } else {
        json!({ "state": "syncing" })
    }
}

/// Entries arrive as an array, wrapped in an object, or as a JSON string of either.
fn parse_entries(data: serde_json::Value) -> Result<Vec<ContextStatusEntry>> {
    match data {
        serde_json::Value::String(text) => parse_entries(serde_json::from_str(&text)?),
        serde_json::Value::Array(_) => Ok(serde_json::from_value(data)?),
        serde_json::Value::Object(mut map) => {
            match map
                .remove("context_status_data")
                .or_else(|| map.remove("contextStatusData"))
            {
                Some(inner) => parse_entries(inner),
                None => Err(SdkError::UnexpectedResponse(
                    "context info carries no status data".to_string(),
                )),
            }
        }
        serde_json::Value::Null => Ok(Vec::new()),
        other => Err(SdkError::UnexpectedResponse(format!(
            "unexpected context info payload: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(context_id: &str, status: &str, error: Option<&str>) -> ContextStatusEntry {
        ContextStatusEntry {
            context_id: context_id.to_string(),
            path: "/home/data".to_string(),
            status: status.to_string(),
            error_message: error.map(str::to_string),
            task_type: Some("upload".to_string()),
        }
    }

    #[test]
    fn test_fold_no_entries() {
        assert_eq!(fold_sync_entries(&[])["state"], "pre-available");
    }

    #[test]
    fn test_fold_in_progress() {
        let entries = [entry("c1", "Success", None), entry("c2", "Uploading", None)];
        assert_eq!(fold_sync_entries(&entries)["state"], "syncing");
    }

    #[test]
    fn test_fold_all_done() {
        let entries = [entry("c1", "Success", None), entry("c2", "success", None)];
        assert_eq!(fold_sync_entries(&entries)["state"], "available");
    }

    #[test]
    fn test_fold_failure_wins() {
        let entries = [
            entry("c1", "Success", None),
            entry("c2", "Failed", Some("quota exceeded")),
        ];
        let folded = fold_sync_entries(&entries);
        assert_eq!(folded["errorMessage"], "quota exceeded");

        let entries = [entry("c3", "Failed", None)];
        let folded = fold_sync_entries(&entries);
        assert!(folded["errorMessage"].as_str().unwrap().contains("c3"));
    }

    #[test]
    fn test_parse_entries_shapes() {
        let raw = json!([
            {"contextId": "c1", "path": "/p", "status": "Success", "taskType": "upload"}
        ]);
        assert_eq!(parse_entries(raw.clone()).unwrap().len(), 1);

        let wrapped = json!({ "contextStatusData": raw.clone() });
        assert_eq!(parse_entries(wrapped).unwrap()[0].context_id, "c1");

        let stringified = serde_json::Value::String(raw.to_string());
        assert_eq!(
            parse_entries(stringified).unwrap()[0].task_type.as_deref(),
            Some("upload")
        );

        assert!(parse_entries(serde_json::Value::Null).unwrap().is_empty());
        assert!(parse_entries(json!({"other": 1})).is_err());
    }

    #[test]
    fn test_filter_matches() {
        let filter = ContextInfoFilter {
            context_id: Some("c1".to_string()),
            path: None,
            task_type: Some("upload".to_string()),
        };
        assert!(filter.matches(&entry("c1", "Success", None)));
        assert!(!filter.matches(&entry("c2", "Success", None)));
    }

    #[test]
    fn test_context_state_available() {
        let state = ContextState {
            context_id: "c1".to_string(),
            state: "Available".to_string(),
            error_message: None,
        };
        assert!(state.is_available());
    }
}

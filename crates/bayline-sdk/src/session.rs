// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Session lifecycle: pause and resume.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::completion::{
    Acknowledgement, CompletionTracker, OperationHandle, OperationKind, PollReport, RetryPolicy,
    StatusProbe, StatusSnapshot,
};
use crate::config::SdkConfig;
use crate::error::{Result, SdkError};
use crate::transport::{ApiRequest, Transport, call_data};

/// Session state as reported by the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Session is running.
    Running,
    /// Pause in progress.
    Pausing,
    /// Session is paused.
    Paused,
    /// Resume in progress.
    Resuming,
    /// Deletion in progress.
    Deleting,
    /// Session is gone.
    Deleted,
    /// Any state this SDK does not know.
    Other(String),
}

impl SessionState {
    /// Parse a state string, ignoring case.
    pub fn parse(state: &str) -> Self {
        match state.to_ascii_uppercase().as_str() {
            "RUNNING" => SessionState::Running,
            "PAUSING" => SessionState::Pausing,
            "PAUSED" => SessionState::Paused,
            "RESUMING" => SessionState::Resuming,
            "DELETING" => SessionState::Deleting,
            "DELETED" => SessionState::Deleted,
            _ => SessionState::Other(state.to_string()),
        }
    }

    /// Whether a pause or resume is in flight.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, SessionState::Pausing | SessionState::Resuming)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Running => f.write_str("RUNNING"),
            SessionState::Pausing => f.write_str("PAUSING"),
            SessionState::Paused => f.write_str("PAUSED"),
            SessionState::Resuming => f.write_str("RESUMING"),
            SessionState::Deleting => f.write_str("DELETING"),
            SessionState::Deleted => f.write_str("DELETED"),
            SessionState::Other(s) => f.write_str(s),
        }
    }
}

/// Pause/resume operations on sessions.
#[derive(Clone)]
pub struct SessionService {
    transport: Arc<dyn Transport>,
    config: Arc<SdkConfig>,
}

impl SessionService {
    pub(crate) fn new(transport: Arc<dyn Transport>, config: Arc<SdkConfig>) -> Self {
        Self { transport, config }
    }

    /// Current state of a session.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn get_status(&self, session_id: &str) -> Result<SessionState> {
        require_session(session_id)?;
        let data = self.probe_for(session_id).fetch().await?;
        let state = data
            .get("status")
            .or_else(|| data.get("state"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                SdkError::UnexpectedResponse("session payload carries no status".to_string())
            })?;
        Ok(SessionState::parse(state))
    }

    /// Request a pause without waiting.
    pub async fn pause_async(&self, session_id: &str) -> Result<OperationHandle> {
        self.submit(session_id, OperationKind::SessionPause).await
    }

    /// Request a resume without waiting.
    pub async fn resume_async(&self, session_id: &str) -> Result<OperationHandle> {
        self.submit(session_id, OperationKind::SessionResume).await
    }

    /// Pause a session and wait until it is `PAUSED`.
    pub async fn pause(&self, session_id: &str, policy: Option<RetryPolicy>) -> Result<PollReport> {
        self.transition(session_id, OperationKind::SessionPause, policy)
            .await
    }

    /// Resume a session and wait until it is `RUNNING`.
    pub async fn resume(
        &self,
        session_id: &str,
        policy: Option<RetryPolicy>,
    ) -> Result<PollReport> {
        self.transition(session_id, OperationKind::SessionResume, policy)
            .await
    }

    /// Pause a session and report the outcome through `callback`.
    pub async fn pause_with_callback<C>(
        &self,
        session_id: &str,
        policy: Option<RetryPolicy>,
        callback: C,
    ) -> Acknowledgement
    where
        C: FnOnce(PollReport) + Send + 'static,
    {
        self.transition_with_callback(session_id, OperationKind::SessionPause, policy, callback)
            .await
    }

    /// Resume a session and report the outcome through `callback`.
    pub async fn resume_with_callback<C>(
        &self,
        session_id: &str,
        policy: Option<RetryPolicy>,
        callback: C,
    ) -> Acknowledgement
    where
        C: FnOnce(PollReport) + Send + 'static,
    {
        self.transition_with_callback(session_id, OperationKind::SessionResume, policy, callback)
            .await
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    #[instrument(skip(self), fields(session_id = %session_id, kind = %kind))]
    async fn submit(&self, session_id: &str, kind: OperationKind) -> Result<OperationHandle> {
        require_session(session_id)?;
        let action = match kind {
            OperationKind::SessionPause => "PauseSessionAsync",
            OperationKind::SessionResume => "ResumeSessionAsync",
            other => {
                return Err(SdkError::InvalidInput(format!(
                    "{} is not a session operation",
                    other
                )));
            }
        };
        debug!(action, "Submitting session state change");

        let request = ApiRequest::new(action, json!({})).with_session(session_id);
        call_data(self.transport.as_ref(), request, self.config.request_timeout)
            .await
            .map_err(|e| SdkError::SubmissionRejected(e.to_string()))?;

        Ok(OperationHandle::new(kind, Some(session_id.to_string())))
    }

    async fn transition(
        &self,
        session_id: &str,
        kind: OperationKind,
        policy: Option<RetryPolicy>,
    ) -> Result<PollReport> {
        let handle = self.submit(session_id, kind).await?;
        let policy = policy.unwrap_or_else(|| RetryPolicy::for_kind(kind, &self.config));
        let report = CompletionTracker::new(kind, policy)
            .await_completion(&handle, &self.probe_for(session_id))
            .await?;
        info!(
            session_id = %session_id,
            kind = %kind,
            attempts = report.attempts,
            outcome = ?report.outcome,
            "Session state change finished"
        );
        Ok(report)
    }

    async fn transition_with_callback<C>(
        &self,
        session_id: &str,
        kind: OperationKind,
        policy: Option<RetryPolicy>,
        callback: C,
    ) -> Acknowledgement
    where
        C: FnOnce(PollReport) + Send + 'static,
    {
        let submission = self.submit(session_id, kind).await;
        let probe = self.probe_for(session_id);
        let policy = policy.unwrap_or_else(|| RetryPolicy::for_kind(kind, &self.config));
        CompletionTracker::new(kind, policy).start_and_notify(submission, move |_| probe, callback)
    }

    fn probe_for(&self, session_id: &str) -> SessionStateProbe {
        SessionStateProbe {
            transport: self.transport.clone(),
            session_id: session_id.to_string(),
            request_timeout: self.config.request_timeout,
        }
    }
}

fn require_session(session_id: &str) -> Result<()> {
    if session_id.trim().is_empty() {
        return Err(SdkError::InvalidInput(
            "session_id must not be empty".to_string(),
        ));
    }
    Ok(())
}

struct SessionStateProbe {
    transport: Arc<dyn Transport>,
    session_id: String,
    request_timeout: Duration,
}

impl SessionStateProbe {
    async fn fetch(&self) -> Result<serde_json::Value> {
        let request = ApiRequest::new("GetSession", json!({})).with_session(&self.session_id);
        call_data(self.transport.as_ref(), request, self.request_timeout).await
    }
}

#[async_trait]
impl StatusProbe for SessionStateProbe {
    async fn probe(&self) -> Result<StatusSnapshot> {
        self.fetch().await.map(StatusSnapshot::new)
    }
}

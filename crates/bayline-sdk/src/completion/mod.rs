// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Completion tracking for asynchronous remote operations.
//!
//! A remote operation (context clear, context sync, session pause/resume, browser
//! task) is started with one request and then observed with repeated status
//! probes until it reaches a terminal outcome:
//!
//! - [`StatusProbe`] fetches one raw [`StatusSnapshot`].
//! - [`Interpreter`] maps a snapshot to a [`CompletionOutcome`].
//! - [`RetryPolicy`] bounds the loop by attempts and wall-clock time.
//! - [`CompletionPoller`] drives the loop.
//! - [`CompletionTracker`] exposes the loop as a blocking call or as a
//!   background task that reports through a callback.

mod interpret;
mod poller;
mod policy;
mod tracker;

pub(crate) use interpret::CONTEXT_AVAILABLE;
pub use interpret::{Interpreter, TaskStep};
pub use poller::{CompletionPoller, StatusProbe};
pub use policy::RetryPolicy;
pub use tracker::{Acknowledgement, CompletionTracker};

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SdkError};

/// Kind of asynchronous remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Clearing the data stored in a context.
    ContextClear,
    /// Uploading or downloading context data for a session.
    ContextSync,
    /// Pausing a session.
    SessionPause,
    /// Resuming a paused session.
    SessionResume,
    /// A browser act/observe/extract task on the remote automation engine.
    BrowserTask,
}

impl OperationKind {
    /// Stable name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::ContextClear => "context_clear",
            OperationKind::ContextSync => "context_sync",
            OperationKind::SessionPause => "session_pause",
            OperationKind::SessionResume => "session_resume",
            OperationKind::BrowserTask => "browser_task",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one in-flight remote operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle {
    /// Operation kind.
    pub kind: OperationKind,
    /// Identifier assigned by the remote system, if any. Operations whose
    /// status is read by a fixed key (a context ID) leave this empty.
    pub external_id: Option<String>,
    /// When the operation was submitted.
    pub submitted_at: DateTime<Utc>,
}

impl OperationHandle {
    /// Create a handle for an operation submitted now.
    pub fn new(kind: OperationKind, external_id: Option<String>) -> Self {
        Self {
            kind,
            external_id,
            submitted_at: Utc::now(),
        }
    }
}

/// Raw status payload returned by one probe. Only an [`Interpreter`] looks inside.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot(serde_json::Value);

impl StatusSnapshot {
    /// Wrap a raw payload.
    pub fn new(payload: serde_json::Value) -> Self {
        Self(payload)
    }

    /// Borrow the raw payload.
    pub fn payload(&self) -> &serde_json::Value {
        &self.0
    }
}

impl From<serde_json::Value> for StatusSnapshot {
    fn from(payload: serde_json::Value) -> Self {
        Self(payload)
    }
}

/// Result carried by a successful outcome. The shape depends on the operation kind.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionResult {
    /// Final state string (context and session operations).
    State(String),
    /// Step list of a finished browser task.
    Steps {
        /// Steps reported by the automation engine.
        steps: Vec<TaskStep>,
        /// Whether the engine reported success.
        success: bool,
        /// Task output, e.g. extracted data.
        output: Option<serde_json::Value>,
    },
    /// Plain success flag.
    Flag(bool),
}

/// Why an operation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Wall-clock budget exhausted.
    Timeout,
    /// Attempt budget exhausted before a terminal outcome.
    MaxAttemptsExceeded,
    /// Polling was cancelled through a cancellation token.
    Cancelled,
    /// The remote system reported a failure.
    Remote(String),
    /// The request that starts the operation was rejected.
    SubmissionError(String),
    /// A status payload could not be interpreted.
    InterpreterError(String),
}

impl FailureReason {
    /// Short machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::Timeout => "timeout",
            FailureReason::MaxAttemptsExceeded => "max-attempts-exceeded",
            FailureReason::Cancelled => "cancelled",
            FailureReason::Remote(_) => "remote-error",
            FailureReason::SubmissionError(_) => "submission-error",
            FailureReason::InterpreterError(_) => "interpreter-error",
        }
    }

    /// Detail message, if the reason carries one.
    pub fn message(&self) -> Option<&str> {
        match self {
            FailureReason::Remote(msg)
            | FailureReason::SubmissionError(msg)
            | FailureReason::InterpreterError(msg) => Some(msg),
            _ => None,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(msg) => write!(f, "{}:{}", self.code(), msg),
            None => f.write_str(self.code()),
        }
    }
}

/// Abstract outcome of interpreting one snapshot, or of a whole polling loop.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    /// Not finished yet.
    Pending,
    /// Finished successfully.
    Succeeded(CompletionResult),
    /// Finished unsuccessfully.
    Failed(FailureReason),
}

impl CompletionOutcome {
    /// Whether this outcome ends polling.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CompletionOutcome::Pending)
    }

    /// Whether this is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, CompletionOutcome::Succeeded(_))
    }

    /// Convert a terminal outcome into a `Result`.
    ///
    /// `Timeout` and `MaxAttemptsExceeded` map to [`SdkError::Timeout`] with the
    /// given elapsed milliseconds, remote failures to [`SdkError::Remote`].
    pub fn into_result(self, elapsed_ms: u64) -> Result<CompletionResult> {
        match self {
            CompletionOutcome::Succeeded(result) => Ok(result),
            CompletionOutcome::Pending => Err(SdkError::UnexpectedResponse(
                "operation still pending".to_string(),
            )),
            CompletionOutcome::Failed(reason) => Err(match reason {
                FailureReason::Timeout | FailureReason::MaxAttemptsExceeded => {
                    SdkError::Timeout(elapsed_ms)
                }
                FailureReason::Cancelled => SdkError::Remote {
                    code: "cancelled".to_string(),
                    message: "polling cancelled".to_string(),
                },
                FailureReason::Remote(message) => SdkError::Remote {
                    code: "remote-error".to_string(),
                    message,
                },
                FailureReason::SubmissionError(message) => SdkError::SubmissionRejected(message),
                FailureReason::InterpreterError(message) => SdkError::Interpreter(message),
            }),
        }
    }
}

/// Terminal outcome of a polling loop plus what it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct PollReport {
    /// Terminal outcome, never `Pending`.
    pub outcome: CompletionOutcome,
    /// Number of probes issued.
    pub attempts: u32,
    /// Wall-clock time spent polling.
    pub elapsed: Duration,
}

impl PollReport {
    /// Convert into a `Result`, see [`CompletionOutcome::into_result`].
    pub fn into_result(self) -> Result<CompletionResult> {
        let elapsed_ms = self.elapsed.as_millis() as u64;
        self.outcome.into_result(elapsed_ms)
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Status interpretation for each operation kind.
//!
//! Interpreters are pure: one snapshot in, one outcome out. They never look at
//! earlier snapshots, so a terminal snapshot is reported the moment it is seen.

use serde::{Deserialize, Serialize};

use crate::completion::{
    CompletionOutcome, CompletionResult, FailureReason, OperationKind, StatusSnapshot,
};
use crate::error::{Result, SdkError};

/// The only success state of the context clear/sync state machine.
pub(crate) const CONTEXT_AVAILABLE: &str = "available";

/// One step reported by the browser automation engine.
///
/// The engine reports either plain strings or objects; both are kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskStep(serde_json::Value);

impl TaskStep {
    /// Create a step from a raw value.
    pub fn new(raw: serde_json::Value) -> Self {
        Self(raw)
    }

    /// Raw step value.
    pub fn raw(&self) -> &serde_json::Value {
        &self.0
    }

    /// Human-readable message for this step.
    pub fn message(&self) -> String {
        match &self.0 {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Object(map) => ["message", "msg", "description"]
                .iter()
                .find_map(|key| map.get(*key).and_then(|v| v.as_str()))
                .map(str::to_string)
                .unwrap_or_else(|| self.0.to_string()),
            other => other.to_string(),
        }
    }
}

impl From<&str> for TaskStep {
    fn from(message: &str) -> Self {
        Self(serde_json::Value::String(message.to_string()))
    }
}

// Engines disagree on key names and some send both spellings, so each one is
// read separately and the first present wins.
#[derive(Debug, Deserialize)]
struct StatePayload {
    state: Option<String>,
    status: Option<String>,
    error_message: Option<String>,
    #[serde(rename = "errorMessage")]
    error_message_camel: Option<String>,
    error: Option<String>,
}

impl StatePayload {
    fn state(&self) -> Option<&str> {
        self.state.as_deref().or(self.status.as_deref())
    }

    fn error(&self) -> Option<&str> {
        self.error_message
            .as_deref()
            .or(self.error_message_camel.as_deref())
            .or(self.error.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct TaskPayload {
    #[serde(default)]
    is_done: bool,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    steps: Vec<TaskStep>,
    #[serde(default, alias = "extract_result")]
    result: Option<serde_json::Value>,
}

/// Tagged interpreter, one variant per state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpreter {
    /// `pre-available -> clearing|syncing -> available`.
    ContextState,
    /// `RUNNING -> PAUSING -> PAUSED` or `PAUSED -> RESUMING -> RUNNING`,
    /// succeeding when `target` is observed.
    SessionState {
        /// State that ends the transition.
        target: &'static str,
    },
    /// `{ is_done, success, steps }` reported by the automation engine.
    BrowserTask,
}

impl Interpreter {
    /// Interpreter for an operation kind.
    pub fn for_kind(kind: OperationKind) -> Self {
        match kind {
            OperationKind::ContextClear | OperationKind::ContextSync => Interpreter::ContextState,
            OperationKind::SessionPause => Interpreter::SessionState { target: "PAUSED" },
            OperationKind::SessionResume => Interpreter::SessionState { target: "RUNNING" },
            OperationKind::BrowserTask => Interpreter::BrowserTask,
        }
    }

    /// Map a snapshot to an outcome.
    ///
    /// Returns an error only when the payload is malformed.
    pub fn interpret(&self, snapshot: &StatusSnapshot) -> Result<CompletionOutcome> {
        match self {
            Interpreter::ContextState => {
                let payload = parse_state(snapshot)?;
                Ok(state_outcome(payload, |state| {
                    state.eq_ignore_ascii_case(CONTEXT_AVAILABLE)
                }))
            }
            Interpreter::SessionState { target } => {
                let payload = parse_state(snapshot)?;
                Ok(state_outcome(payload, |state| state.eq_ignore_ascii_case(target)))
            }
            Interpreter::BrowserTask => {
                let payload = parse_task(snapshot)?;
                if !payload.is_done {
                    return Ok(CompletionOutcome::Pending);
                }
                if payload.success {
                    Ok(CompletionOutcome::Succeeded(CompletionResult::Steps {
                        steps: payload.steps,
                        success: true,
                        output: payload.result,
                    }))
                } else {
                    Ok(CompletionOutcome::Failed(FailureReason::Remote(
                        join_step_messages(&payload.steps),
                    )))
                }
            }
        }
    }

    /// Incremental progress carried by a non-terminal browser task snapshot.
    ///
    /// Returns `None` for other interpreters, for finished tasks, and for
    /// snapshots without steps.
    pub fn progress(&self, snapshot: &StatusSnapshot) -> Option<Vec<TaskStep>> {
        if !matches!(self, Interpreter::BrowserTask) {
            return None;
        }
        let payload = parse_task(snapshot).ok()?;
        if payload.is_done || payload.steps.is_empty() {
            return None;
        }
        Some(payload.steps)
    }
}

fn parse_state(snapshot: &StatusSnapshot) -> Result<StatePayload> {
    let payload: StatePayload = serde_json::from_value(snapshot.payload().clone())
        .map_err(|e| SdkError::Interpreter(format!("malformed state payload: {}", e)))?;
    if payload.state().is_none() && payload.error().is_none() {
        return Err(SdkError::Interpreter(
            "state payload carries neither state nor error".to_string(),
        ));
    }
    Ok(payload)
}

fn parse_task(snapshot: &StatusSnapshot) -> Result<TaskPayload> {
    // The engine sometimes wraps the payload in a JSON string.
    let value = match snapshot.payload() {
        serde_json::Value::String(text) => serde_json::from_str(text)
            .map_err(|e| SdkError::Interpreter(format!("malformed task payload: {}", e)))?,
        other => other.clone(),
    };
    serde_json::from_value(value)
        .map_err(|e| SdkError::Interpreter(format!("malformed task payload: {}", e)))
}

fn state_outcome(payload: StatePayload, is_success: impl Fn(&str) -> bool) -> CompletionOutcome {
    if let Some(error) = payload.error().filter(|e| !e.is_empty()) {
        return CompletionOutcome::Failed(FailureReason::Remote(error.to_string()));
    }
    match payload.state() {
        Some(state) if is_success(state) => {
            CompletionOutcome::Succeeded(CompletionResult::State(state.to_string()))
        }
        // Anything else, including states outside the documented sequence, keeps polling.
        _ => CompletionOutcome::Pending,
    }
}

fn join_step_messages(steps: &[TaskStep]) -> String {
    if steps.is_empty() {
        return "task failed".to_string();
    }
    steps
        .iter()
        .map(TaskStep::message)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snap(value: serde_json::Value) -> StatusSnapshot {
        StatusSnapshot::new(value)
    }

    #[test]
    fn test_for_kind() {
        assert_eq!(
            Interpreter::for_kind(OperationKind::ContextSync),
            Interpreter::ContextState
        );
        assert_eq!(
            Interpreter::for_kind(OperationKind::SessionResume),
            Interpreter::SessionState { target: "RUNNING" }
        );
    }

    #[test]
    fn test_context_error_message_fails() {
        let outcome = Interpreter::ContextState
            .interpret(&snap(json!({"state": "clearing", "errorMessage": "disk gone"})))
            .unwrap();
        assert_eq!(
            outcome,
            CompletionOutcome::Failed(FailureReason::Remote("disk gone".into()))
        );
    }

    #[test]
    fn test_context_empty_error_ignored() {
        let outcome = Interpreter::ContextState
            .interpret(&snap(json!({"status": "in-use", "errorMessage": ""})))
            .unwrap();
        assert_eq!(outcome, CompletionOutcome::Pending);
    }

    #[test]
    fn test_context_missing_fields_is_malformed() {
        let err = Interpreter::ContextState
            .interpret(&snap(json!({"unrelated": 1})))
            .unwrap_err();
        assert!(matches!(err, SdkError::Interpreter(_)));

        let err = Interpreter::ContextState
            .interpret(&snap(json!("available")))
            .unwrap_err();
        assert!(matches!(err, SdkError::Interpreter(_)));
    }

    #[test]
    fn test_task_payload_as_string() {
        let payload = json!({"is_done": true, "success": true, "steps": ["a"]}).to_string();
        let outcome = Interpreter::BrowserTask
            .interpret(&snap(serde_json::Value::String(payload)))
            .unwrap();
        assert!(outcome.is_success());
    }

    #[test]
    fn test_task_failure_without_steps() {
        let outcome = Interpreter::BrowserTask
            .interpret(&snap(json!({"is_done": true, "success": false})))
            .unwrap();
        assert_eq!(
            outcome,
            CompletionOutcome::Failed(FailureReason::Remote("task failed".into()))
        );
    }

    #[test]
    fn test_step_message_variants() {
        assert_eq!(TaskStep::from("click").message(), "click");
        assert_eq!(
            TaskStep::new(json!({"msg": "typed text", "idx": 2})).message(),
            "typed text"
        );
        assert_eq!(TaskStep::new(json!(42)).message(), "42");
    }

    #[test]
    fn test_progress_only_for_running_tasks() {
        let running = snap(json!({"is_done": false, "steps": ["a"]}));
        assert_eq!(
            Interpreter::BrowserTask.progress(&running),
            Some(vec![TaskStep::from("a")])
        );
        let done = snap(json!({"is_done": true, "success": true, "steps": ["a"]}));
        assert_eq!(Interpreter::BrowserTask.progress(&done), None);
        assert_eq!(Interpreter::ContextState.progress(&running), None);
    }
}

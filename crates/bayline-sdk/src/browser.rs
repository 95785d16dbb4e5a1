// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Browser automation on the remote engine.
//!
//! `act`, `observe` and `extract` run as tasks on the remote automation engine:
//! the SDK submits the task, receives a task ID and polls for the result.
//! `navigate` and `screenshot` answer directly. Every call is addressed to a
//! page with a [`TargetAddress`] resolved right before submission.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::completion::{
    Acknowledgement, CompletionOutcome, CompletionResult, CompletionTracker, FailureReason,
    Interpreter, OperationHandle, OperationKind, PollReport, RetryPolicy, StatusProbe,
    StatusSnapshot, TaskStep,
};
use crate::config::SdkConfig;
use crate::error::{Result, SdkError};
use crate::target::{PageHandle, RemoteTargetResolver};
use crate::transport::{ApiRequest, Transport, call_data, required_str};

/// Receives the step list of a running task each time it is polled.
pub type ProgressCallback = Arc<dyn Fn(&[TaskStep]) + Send + Sync>;

/// Tool pair for one kind of engine task.
#[derive(Debug, Clone, Copy)]
struct TaskTools {
    submit: &'static str,
    result: &'static str,
}

const ACT: TaskTools = TaskTools {
    submit: "page_use_act_async",
    result: "page_use_get_act_result",
};

const OBSERVE: TaskTools = TaskTools {
    submit: "page_use_observe_async",
    result: "page_use_get_observe_result",
};

const EXTRACT: TaskTools = TaskTools {
    submit: "page_use_extract_async",
    result: "page_use_get_extract_result",
};

/// Options for [`BrowserAgent::act`].
#[derive(Clone, Default)]
pub struct ActOptions {
    /// Natural-language action, e.g. "click the login button".
    pub action: String,
    /// Values substituted into `%name%` placeholders of the action.
    pub variables: Option<serde_json::Value>,
    /// Let the engine use screenshots.
    pub use_vision: bool,
    /// Override the total task timeout.
    pub timeout: Option<Duration>,
    on_progress: Option<ProgressCallback>,
}

impl ActOptions {
    /// Create options for an action.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Self::default()
        }
    }

    /// Set placeholder values.
    pub fn with_variables(mut self, variables: serde_json::Value) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Enable or disable vision.
    pub fn with_vision(mut self, use_vision: bool) -> Self {
        self.use_vision = use_vision;
        self
    }

    /// Override the total task timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Receive intermediate step lists while the task runs.
    pub fn on_progress(mut self, callback: impl Fn(&[TaskStep]) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for ActOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActOptions")
            .field("action", &self.action)
            .field("variables", &self.variables)
            .field("use_vision", &self.use_vision)
            .field("timeout", &self.timeout)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Options for [`BrowserAgent::observe`].
#[derive(Debug, Clone, Default)]
pub struct ObserveOptions {
    /// What to look for.
    pub instruction: String,
    /// Restrict observation to elements under this selector.
    pub selector: Option<String>,
    /// Let the engine use screenshots.
    pub use_vision: bool,
    /// Override the total task timeout.
    pub timeout: Option<Duration>,
}

impl ObserveOptions {
    /// Create options for an instruction.
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            ..Self::default()
        }
    }

    /// Restrict to a selector.
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }
}

/// Options for [`BrowserAgent::extract`].
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// What to extract.
    pub instruction: String,
    /// JSON schema of the expected result.
    pub schema: serde_json::Value,
    /// Restrict extraction to elements under this selector.
    pub selector: Option<String>,
    /// Extract from page text instead of the DOM tree.
    pub use_text_extract: bool,
    /// Override the total task timeout.
    pub timeout: Option<Duration>,
}

impl ExtractOptions {
    /// Create options for an instruction and result schema.
    pub fn new(instruction: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            instruction: instruction.into(),
            schema,
            ..Self::default()
        }
    }

    /// Override the total task timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Options for [`BrowserAgent::screenshot`].
#[derive(Debug, Clone)]
pub struct ScreenshotOptions {
    /// Capture the full scrollable page.
    pub full_page: bool,
    /// Image format, `png` or `jpeg`.
    pub format: String,
    /// JPEG quality (0-100).
    pub quality: Option<u8>,
}

impl Default for ScreenshotOptions {
    fn default() -> Self {
        Self {
            full_page: false,
            format: "png".to_string(),
            quality: None,
        }
    }
}

/// Result of a finished engine task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    /// Task ID assigned by the engine.
    pub task_id: String,
    /// Whether the engine reported success.
    pub success: bool,
    /// Steps the engine executed.
    pub steps: Vec<TaskStep>,
    /// Task output (observed elements, extracted data).
    pub output: Option<serde_json::Value>,
    /// Result probes issued.
    pub attempts: u32,
}

/// A captured screenshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    /// Base64-encoded image data.
    pub data: String,
    /// Image format.
    pub format: String,
}

impl Screenshot {
    /// Decode the image bytes.
    pub fn decode(&self) -> Result<Vec<u8>> {
        let encoded = match self.data.split_once(";base64,") {
            Some((_, rest)) => rest,
            None => self.data.as_str(),
        };
        Ok(base64::engine::general_purpose::STANDARD.decode(encoded)?)
    }
}

/// Browser automation for one session.
#[derive(Clone)]
pub struct BrowserAgent {
    transport: Arc<dyn Transport>,
    config: Arc<SdkConfig>,
    session_id: String,
    resolver: RemoteTargetResolver,
}

impl BrowserAgent {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        config: Arc<SdkConfig>,
        session_id: impl Into<String>,
    ) -> Self {
        let resolver = RemoteTargetResolver::new(config.target_resolve_timeout);
        Self {
            transport,
            config,
            session_id: session_id.into(),
            resolver,
        }
    }

    /// Session this agent drives.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Perform an action and wait for the engine to finish it.
    ///
    /// A task the engine reports as failed is returned as [`SdkError::Remote`]
    /// with code `task-failed` and the step messages joined.
    #[instrument(
        skip(self, page, options),
        fields(session_id = %self.session_id, action = %options.action)
    )]
    pub async fn act(
        &self,
        page: Option<&dyn PageHandle>,
        options: ActOptions,
    ) -> Result<TaskReport> {
        require("action", &options.action)?;
        let policy = self.act_policy(options.timeout);
        let handle = self.submit(ACT, page, act_params(&options)).await?;
        let report = self
            .tracker(policy, options.on_progress.clone())
            .await_completion(&handle, &self.probe(ACT, &handle))
            .await?;
        task_report(&handle, report)
    }

    /// Perform an action and report the outcome through `callback`.
    ///
    /// Returns once the task has been submitted (or rejected).
    pub async fn act_with_callback<C>(
        &self,
        page: Option<&dyn PageHandle>,
        options: ActOptions,
        callback: C,
    ) -> Acknowledgement
    where
        C: FnOnce(PollReport) + Send + 'static,
    {
        let submission = match require("action", &options.action) {
            Ok(()) => self.submit(ACT, page, act_params(&options)).await,
            Err(e) => Err(e),
        };
        let policy = self.act_policy(options.timeout);
        let agent = self.clone();
        self.tracker(policy, options.on_progress.clone())
            .start_and_notify(submission, move |handle| agent.probe(ACT, handle), callback)
    }

    /// Find elements matching an instruction.
    #[instrument(skip(self, page, options), fields(session_id = %self.session_id))]
    pub async fn observe(
        &self,
        page: Option<&dyn PageHandle>,
        options: ObserveOptions,
    ) -> Result<TaskReport> {
        require("instruction", &options.instruction)?;
        let mut params = json!({
            "instruction": options.instruction,
            "use_vision": options.use_vision,
        });
        if let Some(selector) = &options.selector {
            params["selector"] = json!(selector);
        }
        let policy = self.act_policy(options.timeout);
        let handle = self.submit(OBSERVE, page, params).await?;
        let report = self
            .tracker(policy, None)
            .await_completion(&handle, &self.probe(OBSERVE, &handle))
            .await?;
        task_report(&handle, report)
    }

    /// Extract structured data from the page.
    ///
    /// Returns `(false, None)` when the engine reports the task as failed.
    #[instrument(skip(self, page, options), fields(session_id = %self.session_id))]
    pub async fn extract<T: DeserializeOwned>(
        &self,
        page: Option<&dyn PageHandle>,
        options: ExtractOptions,
    ) -> Result<(bool, Option<T>)> {
        require("instruction", &options.instruction)?;
        let params = json!({
            "instruction": options.instruction,
            "field_schema": format!("schema: {}", options.schema),
            "selector": options.selector,
            "use_text_extract": options.use_text_extract,
        });
        let policy = match options.timeout {
            Some(timeout) => RetryPolicy::browser_extract(&self.config).override_timeout(timeout),
            None => RetryPolicy::browser_extract(&self.config),
        };
        let handle = self.submit(EXTRACT, page, params).await?;
        let report = self
            .tracker(policy, None)
            .await_completion(&handle, &self.probe(EXTRACT, &handle))
            .await?;

        match task_report(&handle, report) {
            Ok(task) => {
                let value = match task.output {
                    Some(serde_json::Value::String(text)) => Some(serde_json::from_str(&text)?),
                    Some(value) => Some(serde_json::from_value(value)?),
                    None => None,
                };
                Ok((true, value))
            }
            Err(SdkError::Remote { code, message }) if code == "task-failed" => {
                info!(reason = %message, "Extract task failed");
                Ok((false, None))
            }
            Err(e) => Err(e),
        }
    }

    /// Navigate the page to `url`.
    #[instrument(skip(self, page), fields(session_id = %self.session_id))]
    pub async fn navigate(&self, page: Option<&dyn PageHandle>, url: &str) -> Result<String> {
        require("url", url)?;
        let data = self
            .call_addressed("page_use_navigate", page, json!({ "url": url }))
            .await?;
        Ok(match data {
            serde_json::Value::String(message) => message,
            other => other.to_string(),
        })
    }

    /// Capture a screenshot of the page.
    #[instrument(skip(self, page, options), fields(session_id = %self.session_id))]
    pub async fn screenshot(
        &self,
        page: Option<&dyn PageHandle>,
        options: ScreenshotOptions,
    ) -> Result<Screenshot> {
        let params = json!({
            "full_page": options.full_page,
            "format": options.format,
            "quality": options.quality,
        });
        let data = self.call_addressed("page_use_screenshot", page, params).await?;
        let encoded = match data {
            serde_json::Value::String(encoded) => encoded,
            other => required_str(&other, "data")?,
        };
        Ok(Screenshot {
            data: encoded,
            format: options.format,
        })
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    fn act_policy(&self, timeout: Option<Duration>) -> RetryPolicy {
        let policy = RetryPolicy::for_kind(OperationKind::BrowserTask, &self.config);
        match timeout {
            Some(timeout) => policy.override_timeout(timeout),
            None => policy,
        }
    }

    fn tracker(
        &self,
        policy: RetryPolicy,
        on_progress: Option<ProgressCallback>,
    ) -> CompletionTracker {
        let tracker = CompletionTracker::new(OperationKind::BrowserTask, policy);
        let Some(callback) = on_progress else {
            return tracker;
        };
        tracker.with_snapshot_observer(Arc::new(move |snapshot: &StatusSnapshot| {
            if let Some(steps) = Interpreter::BrowserTask.progress(snapshot) {
                callback(&steps);
            }
        }))
    }

    async fn call_addressed(
        &self,
        tool: &str,
        page: Option<&dyn PageHandle>,
        mut params: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let address = self.resolver.resolve(page).await;
        address.apply_to(&mut params);
        debug!(
            tool,
            page_index = ?address.page_index,
            context_index = address.context_index,
            "Calling browser tool"
        );
        let request = ApiRequest::new(tool, params).with_session(&self.session_id);
        let data = call_data(self.transport.as_ref(), request, self.config.request_timeout).await?;
        Ok(unwrap_json_string(data))
    }

    async fn submit(
        &self,
        tools: TaskTools,
        page: Option<&dyn PageHandle>,
        params: serde_json::Value,
    ) -> Result<OperationHandle> {
        let data = self
            .call_addressed(tools.submit, page, params)
            .await
            .map_err(|e| SdkError::SubmissionRejected(e.to_string()))?;
        let task_id = required_str(&data, "task_id")
            .map_err(|e| SdkError::SubmissionRejected(e.to_string()))?;
        debug!(tool = tools.submit, task_id = %task_id, "Browser task submitted");
        Ok(OperationHandle::new(OperationKind::BrowserTask, Some(task_id)))
    }

    fn probe(&self, tools: TaskTools, handle: &OperationHandle) -> BrowserTaskProbe {
        BrowserTaskProbe {
            transport: self.transport.clone(),
            session_id: self.session_id.clone(),
            tool: tools.result,
            task_id: handle.external_id.clone().unwrap_or_default(),
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

fn act_params(options: &ActOptions) -> serde_json::Value {
    let mut params = json!({
        "action": options.action,
        "use_vision": options.use_vision,
    });
    if let Some(variables) = &options.variables {
        params["variables"] = variables.clone();
    }
    params
}

/// Tool results are often JSON documents wrapped in a string.
fn unwrap_json_string(data: serde_json::Value) -> serde_json::Value {
    match data {
        serde_json::Value::String(text) => match serde_json::from_str(&text) {
            Ok(value @ serde_json::Value::Object(_)) => value,
            _ => serde_json::Value::String(text),
        },
        other => other,
    }
}

fn task_report(handle: &OperationHandle, report: PollReport) -> Result<TaskReport> {
    let task_id = handle.external_id.clone().unwrap_or_default();
    match report.outcome {
        CompletionOutcome::Succeeded(CompletionResult::Steps {
            steps,
            success,
            output,
        }) => Ok(TaskReport {
            task_id,
            success,
            steps,
            output,
            attempts: report.attempts,
        }),
        CompletionOutcome::Failed(FailureReason::Remote(message)) => Err(SdkError::Remote {
            code: "task-failed".to_string(),
            message,
        }),
        CompletionOutcome::Succeeded(other) => Err(SdkError::UnexpectedResponse(format!(
            "browser task finished with {:?}",
            other
        ))),
        outcome => {
            let elapsed_ms = report.elapsed.as_millis() as u64;
            outcome.into_result(elapsed_ms).map(|_| TaskReport {
                task_id,
                success: false,
                steps: Vec::new(),
                output: None,
                attempts: report.attempts,
            })
        }
    }
}

struct BrowserTaskProbe {
    transport: Arc<dyn Transport>,
    session_id: String,
    tool: &'static str,
    task_id: String,
    request_timeout: Duration,
}

#[async_trait]
impl StatusProbe for BrowserTaskProbe {
    async fn probe(&self) -> Result<StatusSnapshot> {
        let request = ApiRequest::new(self.tool, json!({ "task_id": self.task_id }))
            .with_session(&self.session_id);
        call_data(self.transport.as_ref(), request, self.request_timeout)
            .await
            .map(StatusSnapshot::new)
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Blocking and callback consumption of one polling loop.
//!
//! Both modes run the same [`CompletionPoller`], so for the same snapshots they
//! produce the same outcome.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use crate::completion::{
    CompletionOutcome, CompletionPoller, FailureReason, Interpreter, OperationHandle,
    OperationKind, PollReport, RetryPolicy, StatusProbe, StatusSnapshot,
};
use crate::error::Result;

type SnapshotObserver = Arc<dyn Fn(&StatusSnapshot) + Send + Sync>;

/// Immediate answer of [`CompletionTracker::start_and_notify`].
#[derive(Debug)]
pub struct Acknowledgement {
    handle: Option<OperationHandle>,
    task: Option<JoinHandle<()>>,
}

impl Acknowledgement {
    /// Whether background polling was started.
    pub fn is_started(&self) -> bool {
        self.task.is_some()
    }

    /// Handle of the started operation, if the submission was accepted.
    pub fn handle(&self) -> Option<&OperationHandle> {
        self.handle.as_ref()
    }

    /// Wait until the background loop has finished and the callback has run.
    ///
    /// Dropping the acknowledgement instead does not stop the loop.
    pub async fn join(self) {
        if let Some(task) = self.task {
            if let Err(e) = task.await {
                warn!(error = %e, "Completion task ended abnormally");
            }
        }
    }
}

/// Per-call completion tracker.
///
/// Created for a single operation and consumed by it; nothing is shared between calls.
pub struct CompletionTracker {
    policy: RetryPolicy,
    interpreter: Interpreter,
    cancel: Option<CancellationToken>,
    observer: Option<SnapshotObserver>,
}

impl CompletionTracker {
    /// Tracker using the interpreter for `kind`.
    pub fn new(kind: OperationKind, policy: RetryPolicy) -> Self {
        Self::with_interpreter(Interpreter::for_kind(kind), policy)
    }

    /// Tracker with an explicit interpreter.
    pub fn with_interpreter(interpreter: Interpreter, policy: RetryPolicy) -> Self {
        Self {
            policy,
            interpreter,
            cancel: None,
            observer: None,
        }
    }

    /// Allow the loop to be stopped early through `token`.
    ///
    /// A cancelled loop ends with `Failed(Cancelled)`.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Observe every non-terminal snapshot (e.g. to surface task progress).
    pub fn with_snapshot_observer(mut self, observer: SnapshotObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// The policy this tracker polls under.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Blocking mode: poll until a terminal outcome and return it.
    ///
    /// Returns `Err` only when a status payload is malformed.
    pub async fn await_completion<P>(
        &self,
        handle: &OperationHandle,
        probe: &P,
    ) -> Result<PollReport>
    where
        P: StatusProbe + ?Sized,
    {
        self.poll(handle, probe, None).await
    }

    async fn poll<P>(
        &self,
        handle: &OperationHandle,
        probe: &P,
        attempt_counter: Option<&AtomicU32>,
    ) -> Result<PollReport>
    where
        P: StatusProbe + ?Sized,
    {
        debug!(
            kind = %handle.kind,
            external_id = ?handle.external_id,
            max_attempts = self.policy.max_attempts(),
            "Awaiting operation completion"
        );
        let observer = self.observer.as_deref();
        let mut poller = CompletionPoller::new(self.policy, self.interpreter);
        if let Some(token) = self.cancel.as_ref() {
            poller = poller.with_cancellation(token);
        }
        if let Some(observer) = observer {
            poller = poller.with_snapshot_observer(observer);
        }
        if let Some(counter) = attempt_counter {
            poller = poller.with_attempt_counter(counter);
        }
        poller.run(probe).await
    }

    /// Callback mode: return at once and report the terminal outcome later.
    ///
    /// `submission` is the result of the request that started the operation. If it
    /// failed, `callback` runs synchronously with `Failed(SubmissionError)` and no
    /// polling happens. Otherwise a background task polls with the probe built by
    /// `make_probe` and calls `callback` exactly once. Interpreter errors, and panics
    /// raised by the probe or the snapshot observer, are reported as
    /// `Failed(InterpreterError)` together with the attempts made so far.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_and_notify<F, P, C>(
        self,
        submission: Result<OperationHandle>,
        make_probe: F,
        callback: C,
    ) -> Acknowledgement
    where
        F: FnOnce(&OperationHandle) -> P,
        P: StatusProbe + 'static,
        C: FnOnce(PollReport) + Send + 'static,
    {
        let handle = match submission {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "Submission rejected, polling not started");
                callback(PollReport {
                    outcome: CompletionOutcome::Failed(FailureReason::SubmissionError(
                        e.to_string(),
                    )),
                    attempts: 0,
                    elapsed: std::time::Duration::ZERO,
                });
                return Acknowledgement {
                    handle: None,
                    task: None,
                };
            }
        };

        let probe = make_probe(&handle);
        let span = info_span!("completion", kind = %handle.kind, external_id = ?handle.external_id);
        let task_handle = handle.clone();

        let task = tokio::spawn(
            async move {
                let started = tokio::time::Instant::now();
                let attempts = Arc::new(AtomicU32::new(0));
                let counter = attempts.clone();

                // Polling gets its own task so a panic in a status query or observer still
                // ends in exactly one callback.
                let polling = tokio::spawn(
                    async move { self.poll(&task_handle, &probe, Some(&counter)).await }
                        .in_current_span(),
                );
                let reason = match polling.await {
                    Ok(Ok(report)) => {
                        callback(report);
                        return;
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "Status interpretation failed");
                        FailureReason::InterpreterError(e.to_string())
                    }
                    Err(e) => join_failure(e),
                };
                callback(PollReport {
                    outcome: CompletionOutcome::Failed(reason),
                    attempts: attempts.load(Ordering::Relaxed),
                    elapsed: started.elapsed(),
                });
            }
            .instrument(span),
        );

        Acknowledgement {
            handle: Some(handle),
            task: Some(task),
        }
    }
}

fn join_failure(e: JoinError) -> FailureReason {
    if !e.is_panic() {
        warn!(error = %e, "Polling task was cancelled");
        return FailureReason::Cancelled;
    }
    let message = panic_message(e.into_panic());
    warn!(panic = %message, "Polling task panicked");
    FailureReason::InterpreterError(format!("panic: {}", message))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

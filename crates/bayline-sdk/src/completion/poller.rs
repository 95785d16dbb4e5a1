// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The polling loop shared by every operation kind.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::completion::{
    CompletionOutcome, FailureReason, Interpreter, PollReport, RetryPolicy, StatusSnapshot,
};
use crate::error::Result;

/// Idempotent status query for one remote operation.
///
/// This is the only place the poller touches the transport.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    /// Fetch the current status. Errors are treated as transport failures and retried.
    async fn probe(&self) -> Result<StatusSnapshot>;
}

/// Drives a [`StatusProbe`] and an [`Interpreter`] under a [`RetryPolicy`].
///
/// Probes are strictly sequential. The loop stops at the first terminal outcome,
/// when attempts run out, or when the wall clock runs out.
pub struct CompletionPoller<'a> {
    policy: RetryPolicy,
    interpreter: Interpreter,
    cancel: Option<&'a CancellationToken>,
    on_snapshot: Option<&'a (dyn Fn(&StatusSnapshot) + Send + Sync)>,
    attempt_counter: Option<&'a AtomicU32>,
}

impl<'a> CompletionPoller<'a> {
    /// Create a poller.
    pub fn new(policy: RetryPolicy, interpreter: Interpreter) -> Self {
        Self {
            policy,
            interpreter,
            cancel: None,
            on_snapshot: None,
            attempt_counter: None,
        }
    }

    /// Stop waiting (with `Failed(Cancelled)`) once `token` is cancelled.
    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Observe every snapshot that interprets as `Pending`.
    pub fn with_snapshot_observer(
        mut self,
        observer: &'a (dyn Fn(&StatusSnapshot) + Send + Sync),
    ) -> Self {
        self.on_snapshot = Some(observer);
        self
    }

    /// Mirror the attempt count into `counter`, so it survives an aborted loop.
    pub(crate) fn with_attempt_counter(mut self, counter: &'a AtomicU32) -> Self {
        self.attempt_counter = Some(counter);
        self
    }

    /// Run the loop to a terminal outcome.
    ///
    /// Returns `Err` only when the interpreter rejects a payload; every other
    /// failure is reported as data in the [`PollReport`].
    pub async fn run<P>(&self, probe: &P) -> Result<PollReport>
    where
        P: StatusProbe + ?Sized,
    {
        let started = Instant::now();
        let deadline = started + self.policy.wall_clock_timeout();
        let max_attempts = self.policy.max_attempts();
        let mut attempts: u32 = 0;

        let finish = |outcome: CompletionOutcome, attempts: u32| PollReport {
            outcome,
            attempts,
            elapsed: started.elapsed(),
        };

        loop {
            if self.is_cancelled() {
                return Ok(finish(CompletionOutcome::Failed(FailureReason::Cancelled), attempts));
            }
            if attempts > 0 && Instant::now() >= deadline {
                debug!(attempts, "Wall-clock timeout reached before next probe");
                return Ok(finish(CompletionOutcome::Failed(FailureReason::Timeout), attempts));
            }

            attempts += 1;
            if let Some(counter) = self.attempt_counter {
                counter.store(attempts, Ordering::Relaxed);
            }
            debug!(
                attempt = attempts,
                max_attempts,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Probing operation status"
            );

            // A probe may not outlive the wall clock.
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, probe.probe()).await {
                Ok(Ok(snapshot)) => {
                    let outcome = self.interpreter.interpret(&snapshot)?;
                    if outcome.is_terminal() {
                        info!(
                            attempts,
                            success = outcome.is_success(),
                            "Operation reached terminal outcome"
                        );
                        return Ok(finish(outcome, attempts));
                    }
                    if let Some(observer) = self.on_snapshot {
                        observer(&snapshot);
                    }
                }
                Ok(Err(e)) => {
                    warn!(attempt = attempts, error = %e, "Status probe failed, will retry");
                }
                Err(_) => {
                    warn!(attempt = attempts, "Status probe outlived the wall-clock timeout");
                    return Ok(finish(CompletionOutcome::Failed(FailureReason::Timeout), attempts));
                }
            }

            if attempts >= max_attempts {
                debug!(attempts, "Attempt budget exhausted");
                return Ok(finish(
                    CompletionOutcome::Failed(FailureReason::MaxAttemptsExceeded),
                    attempts,
                ));
            }

            if !self.wait_interval().await {
                return Ok(finish(CompletionOutcome::Failed(FailureReason::Cancelled), attempts));
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(|token| token.is_cancelled())
    }

    /// Sleep for the policy interval. Returns false if cancelled while waiting.
    async fn wait_interval(&self) -> bool {
        let interval = self.policy.interval();
        match self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => false,
                    _ = tokio::time::sleep(interval) => true,
                }
            }
            None => {
                tokio::time::sleep(interval).await;
                true
            }
        }
    }
}

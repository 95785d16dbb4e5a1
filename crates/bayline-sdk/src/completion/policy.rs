// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bounded polling schedule.

use std::time::Duration;

use crate::completion::OperationKind;
use crate::config::SdkConfig;

// Matches the default request timeout.
const DEFAULT_PROBE_ALLOWANCE: Duration = Duration::from_secs(30);

/// Immutable polling schedule for one call.
///
/// Two independent ceilings apply: `max_attempts` probes and `wall_clock_timeout`.
/// Whichever is hit first ends polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    interval: Duration,
    wall_clock_timeout: Duration,
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` is clamped to at least 1.
    pub fn new(max_attempts: u32, interval: Duration, wall_clock_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
            wall_clock_timeout,
        }
    }

    /// Policy bounded by time only.
    ///
    /// Attempts are sized one past the timeout so the wall clock, not the attempt
    /// count, ends an unfinished operation.
    pub fn with_timeout(interval: Duration, wall_clock_timeout: Duration) -> Self {
        Self::new(
            attempts_for(interval, wall_clock_timeout),
            interval,
            wall_clock_timeout,
        )
    }

    /// Policy bounded by attempts only.
    ///
    /// Each probe is allowed 30 s on top of its interval, so slow status queries do
    /// not turn into a timeout before the attempts run out.
    pub fn with_attempts(max_attempts: u32, interval: Duration) -> Self {
        Self::with_attempts_and_probe_timeout(max_attempts, interval, DEFAULT_PROBE_ALLOWANCE)
    }

    /// Policy bounded by attempts only, for probes that each finish within `probe_timeout`.
    ///
    /// The wall clock is `max_attempts * (interval + probe_timeout)`.
    pub fn with_attempts_and_probe_timeout(
        max_attempts: u32,
        interval: Duration,
        probe_timeout: Duration,
    ) -> Self {
        let max_attempts = max_attempts.max(1);
        let per_attempt = interval.saturating_add(probe_timeout);
        Self::new(max_attempts, interval, per_attempt.saturating_mul(max_attempts))
    }

    /// Default policy for an operation kind.
    ///
    /// Browser tasks use the act/observe interval; see [`RetryPolicy::browser_extract`].
    pub fn for_kind(kind: OperationKind, config: &SdkConfig) -> Self {
        match kind {
            OperationKind::ContextClear => {
                Self::with_timeout(config.context_clear_interval, config.context_clear_timeout)
            }
            OperationKind::ContextSync => Self::with_attempts_and_probe_timeout(
                config.context_sync_max_attempts,
                config.context_sync_interval,
                config.request_timeout,
            ),
            OperationKind::SessionPause | OperationKind::SessionResume => {
                Self::with_timeout(config.session_state_interval, config.session_state_timeout)
            }
            OperationKind::BrowserTask => {
                Self::with_timeout(config.browser_act_interval, config.browser_task_timeout)
            }
        }
    }

    /// Default policy for extract tasks, which poll less often.
    pub fn browser_extract(config: &SdkConfig) -> Self {
        Self::with_timeout(config.browser_extract_interval, config.browser_task_timeout)
    }

    /// Replace the wall-clock timeout, resizing attempts to match.
    pub fn override_timeout(self, wall_clock_timeout: Duration) -> Self {
        Self::with_timeout(self.interval, wall_clock_timeout)
    }

    /// Maximum number of probes.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay between probes.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Hard wall-clock ceiling.
    pub fn wall_clock_timeout(&self) -> Duration {
        self.wall_clock_timeout
    }
}

fn attempts_for(interval: Duration, timeout: Duration) -> u32 {
    let interval_ms = interval.as_millis().max(1);
    let attempts = timeout.as_millis().div_ceil(interval_ms) + 1;
    u32::try_from(attempts).unwrap_or(u32::MAX)
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the SDK.
//!
//! Holds the polling defaults for every operation kind. Individual calls may
//! still pass their own [`crate::RetryPolicy`].

use std::time::Duration;

use crate::error::{Result, SdkError};

/// Configuration for [`crate::BaylineClient`].
#[derive(Debug, Clone)]
pub struct SdkConfig {
    /// Timeout for a single transport request.
    pub request_timeout: Duration,
    /// Delay between context clear status probes.
    pub context_clear_interval: Duration,
    /// Wall-clock budget for a context clear.
    pub context_clear_timeout: Duration,
    /// Delay between context sync status probes.
    pub context_sync_interval: Duration,
    /// Maximum context sync status probes.
    pub context_sync_max_attempts: u32,
    /// Delay between session state probes (pause/resume).
    pub session_state_interval: Duration,
    /// Wall-clock budget for a pause or resume.
    pub session_state_timeout: Duration,
    /// Delay between act/observe task result probes.
    pub browser_act_interval: Duration,
    /// Delay between extract task result probes.
    pub browser_extract_interval: Duration,
    /// Wall-clock budget for a browser task.
    pub browser_task_timeout: Duration,
    /// Upper bound for one debugging-session round trip during target resolution.
    pub target_resolve_timeout: Duration,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            context_clear_interval: Duration::from_millis(2_000),
            context_clear_timeout: Duration::from_secs(60),
            context_sync_interval: Duration::from_millis(1_500),
            context_sync_max_attempts: 150,
            session_state_interval: Duration::from_millis(2_000),
            session_state_timeout: Duration::from_secs(600),
            browser_act_interval: Duration::from_millis(5_000),
            browser_extract_interval: Duration::from_millis(8_000),
            browser_task_timeout: Duration::from_secs(300),
            target_resolve_timeout: Duration::from_secs(5),
        }
    }
}

fn env_millis(name: &str, default: Duration) -> Result<Duration> {
    match std::env::var(name) {
        Ok(value) => value
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| SdkError::Config(format!("invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

impl SdkConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration from environment variables.
    ///
    /// Environment variables (all optional, durations in milliseconds):
    /// - `BAYLINE_REQUEST_TIMEOUT_MS` (default: 30000)
    /// - `BAYLINE_CONTEXT_CLEAR_INTERVAL_MS` (default: 2000)
    /// - `BAYLINE_CONTEXT_CLEAR_TIMEOUT_MS` (default: 60000)
    /// - `BAYLINE_CONTEXT_SYNC_INTERVAL_MS` (default: 1500)
    /// - `BAYLINE_CONTEXT_SYNC_MAX_ATTEMPTS` (default: 150)
    /// - `BAYLINE_SESSION_POLL_INTERVAL_MS` (default: 2000)
    /// - `BAYLINE_SESSION_TIMEOUT_MS` (default: 600000)
    /// - `BAYLINE_BROWSER_ACT_INTERVAL_MS` (default: 5000)
    /// - `BAYLINE_BROWSER_EXTRACT_INTERVAL_MS` (default: 8000)
    /// - `BAYLINE_BROWSER_TASK_TIMEOUT_MS` (default: 300000)
    /// - `BAYLINE_TARGET_RESOLVE_TIMEOUT_MS` (default: 5000)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let context_sync_max_attempts = match std::env::var("BAYLINE_CONTEXT_SYNC_MAX_ATTEMPTS") {
            Ok(value) => value.parse::<u32>().map_err(|e| {
                SdkError::Config(format!("invalid BAYLINE_CONTEXT_SYNC_MAX_ATTEMPTS: {}", e))
            })?,
            Err(_) => defaults.context_sync_max_attempts,
        };
        if context_sync_max_attempts == 0 {
            return Err(SdkError::Config(
                "BAYLINE_CONTEXT_SYNC_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            request_timeout: env_millis("BAYLINE_REQUEST_TIMEOUT_MS", defaults.request_timeout)?,
            context_clear_interval: env_millis(
                "BAYLINE_CONTEXT_CLEAR_INTERVAL_MS",
                defaults.context_clear_interval,
            )?,
            context_clear_timeout: env_millis(
                "BAYLINE_CONTEXT_CLEAR_TIMEOUT_MS",
                defaults.context_clear_timeout,
            )?,
            context_sync_interval: env_millis(
                "BAYLINE_CONTEXT_SYNC_INTERVAL_MS",
                defaults.context_sync_interval,
            )?,
            context_sync_max_attempts,
            session_state_interval: env_millis(
                "BAYLINE_SESSION_POLL_INTERVAL_MS",
                defaults.session_state_interval,
            )?,
            session_state_timeout: env_millis(
                "BAYLINE_SESSION_TIMEOUT_MS",
                defaults.session_state_timeout,
            )?,
            browser_act_interval: env_millis(
                "BAYLINE_BROWSER_ACT_INTERVAL_MS",
                defaults.browser_act_interval,
            )?,
            browser_extract_interval: env_millis(
                "BAYLINE_BROWSER_EXTRACT_INTERVAL_MS",
                defaults.browser_extract_interval,
            )?,
            browser_task_timeout: env_millis(
                "BAYLINE_BROWSER_TASK_TIMEOUT_MS",
                defaults.browser_task_timeout,
            )?,
            target_resolve_timeout: env_millis(
                "BAYLINE_TARGET_RESOLVE_TIMEOUT_MS",
                defaults.target_resolve_timeout,
            )?,
        })
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the context clear polling interval and wall-clock budget.
    pub fn with_context_clear_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.context_clear_interval = interval;
        self.context_clear_timeout = timeout;
        self
    }

    /// Set the context sync polling interval and attempt budget.
    pub fn with_context_sync_polling(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.context_sync_interval = interval;
        self.context_sync_max_attempts = max_attempts.max(1);
        self
    }

    /// Set the pause/resume polling interval and wall-clock budget.
    pub fn with_session_state_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.session_state_interval = interval;
        self.session_state_timeout = timeout;
        self
    }

    /// Set the total timeout for browser tasks.
    pub fn with_browser_task_timeout(mut self, timeout: Duration) -> Self {
        self.browser_task_timeout = timeout;
        self
    }

    /// Set the act/observe and extract polling intervals.
    pub fn with_browser_intervals(mut self, act: Duration, extract: Duration) -> Self {
        self.browser_act_interval = act;
        self.browser_extract_interval = extract;
        self
    }

    /// Set the bound for a single target-resolution round trip.
    pub fn with_target_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.target_resolve_timeout = timeout;
        self
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration tests for bayline-sdk.
//!
//! Environment variables are process-wide, so every test that touches them
//! lives in a single test function.

use std::time::Duration;

use bayline_sdk::{OperationKind, RetryPolicy, SdkConfig, SdkError};

const VARS: &[&str] = &[
    "BAYLINE_REQUEST_TIMEOUT_MS",
    "BAYLINE_CONTEXT_CLEAR_INTERVAL_MS",
    "BAYLINE_CONTEXT_SYNC_MAX_ATTEMPTS",
    "BAYLINE_SESSION_TIMEOUT_MS",
    "BAYLINE_BROWSER_TASK_TIMEOUT_MS",
];

fn clear_env() {
    for var in VARS {
        // SAFETY: no other test in this binary reads or writes the environment.
        unsafe { std::env::remove_var(var) };
    }
}

#[test]
fn test_from_env() {
    clear_env();
    let config = SdkConfig::from_env().unwrap();
    assert_eq!(config.request_timeout, Duration::from_secs(30));
    assert_eq!(config.context_sync_max_attempts, 150);

    // SAFETY: see clear_env.
    unsafe {
        std::env::set_var("BAYLINE_REQUEST_TIMEOUT_MS", "1500");
        std::env::set_var("BAYLINE_CONTEXT_CLEAR_INTERVAL_MS", "250");
        std::env::set_var("BAYLINE_CONTEXT_SYNC_MAX_ATTEMPTS", "12");
        std::env::set_var("BAYLINE_SESSION_TIMEOUT_MS", "90000");
        std::env::set_var("BAYLINE_BROWSER_TASK_TIMEOUT_MS", "45000");
    }
    let config = SdkConfig::from_env().unwrap();
    assert_eq!(config.request_timeout, Duration::from_millis(1500));
    assert_eq!(config.context_clear_interval, Duration::from_millis(250));
    assert_eq!(config.context_sync_max_attempts, 12);
    assert_eq!(config.session_state_timeout, Duration::from_secs(90));
    assert_eq!(config.browser_task_timeout, Duration::from_secs(45));
    // Untouched values keep their defaults
    assert_eq!(config.context_clear_timeout, Duration::from_secs(60));

    // SAFETY: see clear_env.
    unsafe { std::env::set_var("BAYLINE_REQUEST_TIMEOUT_MS", "soon") };
    let err = SdkConfig::from_env().unwrap_err();
    assert!(matches!(err, SdkError::Config(_)));
    assert!(err.to_string().contains("BAYLINE_REQUEST_TIMEOUT_MS"));

    clear_env();
    // SAFETY: see clear_env.
    unsafe { std::env::set_var("BAYLINE_CONTEXT_SYNC_MAX_ATTEMPTS", "0") };
    assert!(matches!(SdkConfig::from_env(), Err(SdkError::Config(_))));

    clear_env();
}

#[test]
fn test_default_policies_per_kind() {
    let config = SdkConfig::default();

    let clear = RetryPolicy::for_kind(OperationKind::ContextClear, &config);
    assert_eq!(clear.interval(), Duration::from_secs(2));
    assert_eq!(clear.wall_clock_timeout(), Duration::from_secs(60));
    assert_eq!(clear.max_attempts(), 31);

    let sync = RetryPolicy::for_kind(OperationKind::ContextSync, &config);
    assert_eq!(sync.max_attempts(), 150);
    assert_eq!(sync.interval(), Duration::from_millis(1_500));

    let pause = RetryPolicy::for_kind(OperationKind::SessionPause, &config);
    let resume = RetryPolicy::for_kind(OperationKind::SessionResume, &config);
    assert_eq!(pause, resume);
    assert_eq!(pause.wall_clock_timeout(), Duration::from_secs(600));

    let act = RetryPolicy::for_kind(OperationKind::BrowserTask, &config);
    let extract = RetryPolicy::browser_extract(&config);
    assert_eq!(act.interval(), Duration::from_secs(5));
    assert_eq!(extract.interval(), Duration::from_secs(8));
    assert_eq!(act.wall_clock_timeout(), extract.wall_clock_timeout());
}

#[test]
fn test_policies_follow_config() {
    let config = SdkConfig::new()
        .with_session_state_polling(Duration::from_secs(1), Duration::from_secs(10))
        .with_browser_task_timeout(Duration::from_secs(60));

    let pause = RetryPolicy::for_kind(OperationKind::SessionPause, &config);
    assert_eq!(pause.interval(), Duration::from_secs(1));
    assert_eq!(pause.max_attempts(), 11);

    let act = RetryPolicy::for_kind(OperationKind::BrowserTask, &config);
    assert_eq!(act.wall_clock_timeout(), Duration::from_secs(60));
}

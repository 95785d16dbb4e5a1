// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bayline SDK
//!
//! Client SDK for a remote browser-session platform. Several platform
//! operations are asynchronous on the remote side: one request starts them and
//! the final outcome has to be polled for. This crate tracks those operations
//! to completion.
//!
//! # Architecture
//!
//! - [`completion`]: the generic polling engine. A [`StatusProbe`] fetches a
//!   status payload, an [`Interpreter`] decides whether it is terminal, a
//!   [`RetryPolicy`] bounds the loop and a [`CompletionTracker`] runs it either
//!   blocking or in the background with a callback.
//! - [`ContextService`]: context clear and sync.
//! - [`SessionService`]: session pause and resume.
//! - [`BrowserAgent`]: act/observe/extract tasks, navigation and screenshots,
//!   addressed to a page through a [`RemoteTargetResolver`].
//!
//! The wire protocol is behind the [`Transport`] trait; the SDK ships no
//! concrete transport.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bayline_sdk::{BaylineClient, SdkConfig, Transport};
//!
//! # async fn example(transport: Arc<dyn Transport>) -> bayline_sdk::Result<()> {
//! let client = BaylineClient::new(transport, SdkConfig::default());
//!
//! // Clear a context and wait until it is available again
//! let report = client.context().clear("ctx-1", None).await?;
//! println!("Cleared after {} probes", report.attempts);
//!
//! // Pause a session in the background
//! let ack = client
//!     .session()
//!     .pause_with_callback("sess-1", None, |report| {
//!         println!("Pause finished: {:?}", report.outcome);
//!     })
//!     .await;
//! ack.join().await;
//! # Ok(())
//! # }
//! ```

mod browser;
mod client;
pub mod completion;
mod config;
mod context;
mod error;
mod session;
mod target;
mod transport;

pub use browser::{
    ActOptions, BrowserAgent, ExtractOptions, ObserveOptions, ProgressCallback, Screenshot,
    ScreenshotOptions, TaskReport,
};
pub use client::BaylineClient;
pub use completion::{
    Acknowledgement, CompletionOutcome, CompletionPoller, CompletionResult, CompletionTracker,
    FailureReason, Interpreter, OperationHandle, OperationKind, PollReport, RetryPolicy,
    StatusProbe, StatusSnapshot, TaskStep,
};
pub use config::SdkConfig;
pub use context::{
    ContextInfoFilter, ContextService, ContextState, ContextStatusEntry, SyncMode, SyncRequest,
};
pub use error::{Result, SdkError};
pub use session::{SessionService, SessionState};
pub use target::{DebugSession, PageHandle, RemoteTargetResolver, TargetAddress};
pub use transport::{ApiRequest, ApiResponse, Transport};

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for bayline-sdk.

use thiserror::Error;

/// Result type using SdkError.
pub type Result<T> = std::result::Result<T, SdkError>;

/// Errors that can occur when using the SDK.
///
/// Expected polling failures (timeouts, remote-reported task failures) are not
/// errors: they come back as [`crate::CompletionOutcome::Failed`]. These variants
/// cover conditions where no outcome could be produced at all.
#[derive(Debug, Error)]
pub enum SdkError {
    /// Configuration error (missing or invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// The remote call could not be executed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote system answered and reported a failure.
    #[error("remote error [{code}]: {message}")]
    Remote { code: String, message: String },

    /// Wall-clock or attempt budget exhausted.
    #[error("operation timed out after {0}ms")]
    Timeout(u64),

    /// The request that starts a remote operation was rejected.
    #[error("submission rejected: {0}")]
    SubmissionRejected(String),

    /// A status payload could not be interpreted.
    #[error("interpreter error: {0}")]
    Interpreter(String),

    /// Browser target resolution failed.
    #[error("target resolution error: {0}")]
    TargetResolution(String),

    /// Invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Unexpected response from the remote system.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl SdkError {
    /// Whether the error came from the transport and may succeed on retry.
    pub fn is_transport(&self) -> bool {
        matches!(self, SdkError::Transport(_))
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::Serialization(err.to_string())
    }
}

impl From<base64::DecodeError> for SdkError {
    fn from(err: base64::DecodeError) -> Self {
        SdkError::Serialization(err.to_string())
    }
}

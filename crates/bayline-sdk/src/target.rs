// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Addressing pages inside a shared remote browser.
//!
//! One remote browser can hold several browsing contexts, each with several
//! pages. Browser automation calls carry a [`TargetAddress`] so the remote
//! engine acts on the page the caller holds. The address is computed from the
//! page's live DevTools target identity on every call and never cached, since
//! pages and contexts come and go between calls.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{Result, SdkError};

/// Page and browsing-context coordinate of an automation call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetAddress {
    /// DevTools target ID of the page; `None` means session-wide / default page.
    pub page_index: Option<String>,
    /// Zero-based position of the page's browsing context in its browser.
    pub context_index: u32,
}

impl TargetAddress {
    /// The session-wide default address.
    pub fn session_wide() -> Self {
        Self::default()
    }

    /// Add `page_id` / `context_id` to request parameters.
    ///
    /// `page_id` is only added when a page was resolved. Non-object params are
    /// left untouched.
    pub fn apply_to(&self, params: &mut serde_json::Value) {
        if let Some(map) = params.as_object_mut() {
            if let Some(page) = &self.page_index {
                map.insert("page_id".to_string(), json!(page));
            }
            map.insert("context_id".to_string(), json!(self.context_index));
        }
    }
}

/// Short-lived low-level DevTools protocol session against one page.
#[async_trait]
pub trait DebugSession: Send {
    /// Send a protocol command and return its result.
    async fn send(&mut self, method: &str, params: serde_json::Value)
    -> Result<serde_json::Value>;

    /// Close the session.
    async fn detach(self: Box<Self>) -> Result<()>;
}

/// Page object of a browser-automation binding.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Open a debugging session against this page.
    ///
    /// Returns `Ok(None)` when the binding cannot do this.
    async fn open_debug_session(&self) -> Result<Option<Box<dyn DebugSession>>> {
        Ok(None)
    }

    /// ID of the browsing context owning this page, if known.
    fn browser_context_id(&self) -> Option<String> {
        None
    }

    /// IDs of all browsing contexts open in the page's browser, in order.
    async fn browser_context_ids(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Resolves the [`TargetAddress`] for an automation call.
#[derive(Debug, Clone, Copy)]
pub struct RemoteTargetResolver {
    round_trip_timeout: Duration,
}

impl RemoteTargetResolver {
    /// Create a resolver; each round trip to the page is bounded by `round_trip_timeout`.
    pub fn new(round_trip_timeout: Duration) -> Self {
        Self { round_trip_timeout }
    }

    /// Resolve the address for `page`.
    ///
    /// Never fails: any problem is logged and the session-wide default returned.
    pub async fn resolve(&self, page: Option<&dyn PageHandle>) -> TargetAddress {
        let Some(page) = page else {
            return TargetAddress::session_wide();
        };

        let page_index = match self.query_target_id(page).await {
            Ok(target_id) => target_id,
            Err(e) => {
                warn!(error = %e, "Failed to resolve page target, using default address");
                return TargetAddress::session_wide();
            }
        };

        let context_index = match self.bounded(context_position(page)).await {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "Failed to enumerate browser contexts, using context 0");
                0
            }
        };

        debug!(page_index = %page_index, context_index, "Resolved target address");
        TargetAddress {
            page_index: Some(page_index),
            context_index,
        }
    }

    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.round_trip_timeout, fut)
            .await
            .map_err(|_| {
                SdkError::TargetResolution(format!(
                    "no answer within {}ms",
                    self.round_trip_timeout.as_millis()
                ))
            })?
    }

    async fn query_target_id(&self, page: &dyn PageHandle) -> Result<String> {
        let mut session = self.bounded(page.open_debug_session()).await?.ok_or_else(|| {
            SdkError::TargetResolution("page does not support debugging sessions".to_string())
        })?;

        // The session is detached even when the command fails or goes unanswered.
        let info = self
            .bounded(session.send("Target.getTargetInfo", json!({})))
            .await;
        if let Err(e) = self.bounded(session.detach()).await {
            debug!(error = %e, "Failed to detach debugging session");
        }

        info?
            .pointer("/targetInfo/targetId")
            .and_then(|v| v.as_str())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                SdkError::TargetResolution("target info carries no targetId".to_string())
            })
    }
}

impl Default for RemoteTargetResolver {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

async fn context_position(page: &dyn PageHandle) -> Result<u32> {
    let Some(own) = page.browser_context_id() else {
        return Ok(0);
    };
    let contexts = page.browser_context_ids().await?;
    if contexts.len() <= 1 {
        return Ok(0);
    }
    Ok(contexts
        .iter()
        .position(|id| *id == own)
        .and_then(|i| u32::try_from(i).ok())
        .unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_to_with_page() {
        let address = TargetAddress {
            page_index: Some("T1".to_string()),
            context_index: 2,
        };
        let mut params = json!({"action": "click"});
        address.apply_to(&mut params);
        assert_eq!(params["page_id"], "T1");
        assert_eq!(params["context_id"], 2);
    }

    #[test]
    fn test_apply_to_session_wide() {
        let mut params = json!({});
        TargetAddress::session_wide().apply_to(&mut params);
        assert!(params.get("page_id").is_none());
        assert_eq!(params["context_id"], 0);
    }

    #[tokio::test]
    async fn test_resolve_without_page() {
        let address = RemoteTargetResolver::default().resolve(None).await;
        assert_eq!(address, TargetAddress::session_wide());
    }
}

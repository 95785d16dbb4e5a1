// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! BaylineClient, the entry point of the SDK.

use std::sync::Arc;

use tracing::info;

use crate::browser::BrowserAgent;
use crate::config::SdkConfig;
use crate::context::ContextService;
use crate::error::Result;
use crate::session::SessionService;
use crate::transport::Transport;

/// Client for the remote browser-session platform.
///
/// The client owns the transport and configuration and hands out cheap service
/// objects that share them. It performs no I/O of its own.
#[derive(Clone)]
pub struct BaylineClient {
    transport: Arc<dyn Transport>,
    config: Arc<SdkConfig>,
}

impl BaylineClient {
    /// Create a client with the given transport and configuration.
    pub fn new(transport: Arc<dyn Transport>, config: SdkConfig) -> Self {
        info!(
            request_timeout_ms = config.request_timeout.as_millis() as u64,
            "Creating Bayline client"
        );
        Self {
            transport,
            config: Arc::new(config),
        }
    }

    /// Create a client configured from `BAYLINE_*` environment variables.
    pub fn from_env(transport: Arc<dyn Transport>) -> Result<Self> {
        Ok(Self::new(transport, SdkConfig::from_env()?))
    }

    /// Active configuration.
    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    /// Context clear and sync operations.
    pub fn context(&self) -> ContextService {
        ContextService::new(self.transport.clone(), self.config.clone())
    }

    /// Session pause and resume operations.
    pub fn session(&self) -> SessionService {
        SessionService::new(self.transport.clone(), self.config.clone())
    }

    /// Browser automation bound to one session.
    pub fn browser(&self, session_id: impl Into<String>) -> BrowserAgent {
        BrowserAgent::new(self.transport.clone(), self.config.clone(), session_id)
    }
}

impl std::fmt::Debug for BaylineClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaylineClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

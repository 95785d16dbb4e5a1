// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared test doubles: a scripted transport, scripted probes and fake pages.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bayline_sdk::{
    ApiRequest, ApiResponse, DebugSession, PageHandle, Result, SdkError, StatusProbe,
    StatusSnapshot, Transport,
};

/// Transport answering each action from a script.
///
/// Responses for an action are consumed in order; the last one repeats.
/// Unscripted actions fail with a transport error.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Result<ApiResponse>>>>,
    calls: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a successful response body for `action`.
    pub fn ok(&self, action: &str, data: serde_json::Value) -> &Self {
        self.push(action, Ok(ApiResponse::ok(data)))
    }

    /// Queue a remote refusal for `action`.
    pub fn refuse(&self, action: &str, code: &str, message: &str) -> &Self {
        self.push(action, Ok(ApiResponse::failed(code, message)))
    }

    /// Queue a transport failure for `action`.
    pub fn fail(&self, action: &str, message: &str) -> &Self {
        self.push(action, Err(SdkError::Transport(message.to_string())))
    }

    fn push(&self, action: &str, response: Result<ApiResponse>) -> &Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(action.to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// All requests received, in order.
    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Requests received for one action.
    pub fn calls_for(&self, action: &str) -> Vec<ApiRequest> {
        self.calls()
            .into_iter()
            .filter(|r| r.action == action)
            .collect()
    }
}

fn clone_response(response: &Result<ApiResponse>) -> Result<ApiResponse> {
    match response {
        Ok(r) => Ok(r.clone()),
        Err(e) => Err(SdkError::Transport(e.to_string())),
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn call(&self, request: ApiRequest) -> Result<ApiResponse> {
        let action = request.action.clone();
        self.calls.lock().unwrap().push(request);

        let mut scripts = self.scripts.lock().unwrap();
        let Some(queue) = scripts.get_mut(&action) else {
            return Err(SdkError::Transport(format!("no script for {}", action)));
        };
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            clone_response(queue.front().unwrap())
        }
    }
}

/// Probe returning a fixed sequence of snapshots; the last one repeats.
pub struct ScriptedProbe {
    snapshots: Mutex<VecDeque<Result<StatusSnapshot>>>,
    calls: AtomicU32,
}

impl ScriptedProbe {
    pub fn new(payloads: Vec<serde_json::Value>) -> Self {
        Self::with_results(payloads.into_iter().map(|p| Ok(StatusSnapshot::new(p))).collect())
    }

    pub fn with_results(results: Vec<Result<StatusSnapshot>>) -> Self {
        Self {
            snapshots: Mutex::new(results.into()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusProbe for ScriptedProbe {
    async fn probe(&self) -> Result<StatusSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut snapshots = self.snapshots.lock().unwrap();
        if snapshots.len() > 1 {
            return snapshots.pop_front().unwrap();
        }
        match snapshots.front().unwrap() {
            Ok(s) => Ok(s.clone()),
            Err(e) => Err(SdkError::Transport(e.to_string())),
        }
    }
}

/// Probe that never answers.
pub struct HangingProbe;

#[async_trait]
impl StatusProbe for HangingProbe {
    async fn probe(&self) -> Result<StatusSnapshot> {
        std::future::pending().await
    }
}

/// Status source that takes `delay` to answer with the same payload every time.
pub struct SlowStatusSource {
    delay: Duration,
    payload: serde_json::Value,
    calls: AtomicU32,
}

impl SlowStatusSource {
    pub fn new(delay: Duration, payload: serde_json::Value) -> Self {
        Self {
            delay,
            payload,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusProbe for SlowStatusSource {
    async fn probe(&self) -> Result<StatusSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(StatusSnapshot::new(self.payload.clone()))
    }
}

/// Status source that answers `pending_answers` times with a pending state, then panics.
pub struct PanickingStatusSource {
    pending_answers: u32,
    calls: AtomicU32,
}

impl PanickingStatusSource {
    pub fn after(pending_answers: u32) -> Self {
        Self {
            pending_answers,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl StatusProbe for PanickingStatusSource {
    async fn probe(&self) -> Result<StatusSnapshot> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.pending_answers {
            panic!("status decoder blew up");
        }
        Ok(StatusSnapshot::new(serde_json::json!({"state": "clearing"})))
    }
}

/// How a [`FakePage`] answers `Target.getTargetInfo`.
#[derive(Clone)]
pub enum TargetBehavior {
    /// Report this target ID.
    Answer(String),
    /// Fail the protocol command.
    Error,
    /// Never answer.
    Hang,
    /// Page cannot open debugging sessions.
    Unsupported,
}

/// Page double for target resolution.
pub struct FakePage {
    pub behavior: TargetBehavior,
    pub context_id: Option<String>,
    pub contexts: Vec<String>,
    pub detaches: Arc<AtomicU32>,
}

impl FakePage {
    pub fn new(behavior: TargetBehavior) -> Self {
        Self {
            behavior,
            context_id: None,
            contexts: Vec::new(),
            detaches: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn in_context(mut self, own: &str, all: &[&str]) -> Self {
        self.context_id = Some(own.to_string());
        self.contexts = all.iter().map(|c| c.to_string()).collect();
        self
    }
}

struct FakeSession {
    behavior: TargetBehavior,
    detaches: Arc<AtomicU32>,
}

#[async_trait]
impl DebugSession for FakeSession {
    async fn send(
        &mut self,
        method: &str,
        _params: serde_json::Value,
    ) -> Result<serde_json::Value> {
        assert_eq!(method, "Target.getTargetInfo");
        match &self.behavior {
            TargetBehavior::Answer(id) => Ok(serde_json::json!({
                "targetInfo": { "targetId": id, "type": "page" }
            })),
            TargetBehavior::Error => Err(SdkError::Transport("session closed".to_string())),
            TargetBehavior::Hang => std::future::pending().await,
            TargetBehavior::Unsupported => unreachable!(),
        }
    }

    async fn detach(self: Box<Self>) -> Result<()> {
        self.detaches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl PageHandle for FakePage {
    async fn open_debug_session(&self) -> Result<Option<Box<dyn DebugSession>>> {
        if matches!(self.behavior, TargetBehavior::Unsupported) {
            return Ok(None);
        }
        Ok(Some(Box::new(FakeSession {
            behavior: self.behavior.clone(),
            detaches: self.detaches.clone(),
        })))
    }

    fn browser_context_id(&self) -> Option<String> {
        self.context_id.clone()
    }

    async fn browser_context_ids(&self) -> Result<Vec<String>> {
        Ok(self.contexts.clone())
    }
}

// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock agent client for deterministic testing.
//!
//! `MockAgentClient` implements [`AgentClient`] with scripted replies and
//! records every call so tests can assert on attach/dispatch/detach order.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use switchboard_core::{AgentClient, SwitchboardError};

/// One scripted outcome of `dispatch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    Text(String),
    /// Fail with a retryable dispatch error carrying this message.
    Fail(String),
    /// Succeed with an empty string.
    Empty,
    /// Refuse the request with this status; never retryable.
    Reject(u16),
}

/// What `attach` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    Ok,
    AlreadyAttached,
    /// No resource handle is provisioned for the user.
    NotFound,
}

/// A recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentCall {
    Attach(i64),
    Dispatch { user_id: i64, text: String },
    Detach(i64),
}

/// A mock agent that pops scripted replies in order.
///
/// When the script is exhausted the fallback reply is used; it defaults to
/// `"mock response"`.
pub struct MockAgentClient {
    script: Arc<Mutex<VecDeque<MockReply>>>,
    fallback: MockReply,
    delay: Option<Duration>,
    attach: AttachOutcome,
    calls: Arc<Mutex<Vec<AgentCall>>>,
}

impl MockAgentClient {
    pub fn new() -> Self {
        Self {
            script: Arc::default(),
            fallback: MockReply::Text("mock response".to_string()),
            delay: None,
            attach: AttachOutcome::Ok,
            calls: Arc::default(),
        }
    }

    /// Pre-load scripted replies.
    pub fn with_replies(replies: Vec<MockReply>) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::from(replies))),
            ..Self::new()
        }
    }

    /// Every dispatch fails.
    pub fn failing() -> Self {
        Self::new().with_fallback(MockReply::Fail("agent unavailable".to_string()))
    }

    pub fn with_fallback(mut self, reply: MockReply) -> Self {
        self.fallback = reply;
        self
    }

    /// Sleep this long inside every dispatch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_attach(mut self, outcome: AttachOutcome) -> Self {
        self.attach = outcome;
        self
    }

    pub async fn push_reply(&self, reply: MockReply) {
        self.script.lock().await.push_back(reply);
    }

    pub async fn calls(&self) -> Vec<AgentCall> {
        self.calls.lock().await.clone()
    }

    pub async fn dispatch_count(&self) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| matches!(c, AgentCall::Dispatch { .. }))
            .count()
    }

    pub async fn detach_count(&self) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| matches!(c, AgentCall::Detach(_)))
            .count()
    }

    /// Highest number of attaches for `user_id` that were open at once,
    /// walking the call log in order.
    pub async fn peak_attachments(&self, user_id: i64) -> usize {
        let mut open = 0usize;
        let mut peak = 0usize;
        for call in self.calls.lock().await.iter() {
            match call {
                AgentCall::Attach(u) if *u == user_id => {
                    open += 1;
                    peak = peak.max(open);
                }
                AgentCall::Detach(u) if *u == user_id => open = open.saturating_sub(1),
                _ => {}
            }
        }
        peak
    }
}

impl Default for MockAgentClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentClient for MockAgentClient {
    async fn dispatch(&self, user_id: i64, formatted_text: &str) -> Result<String, SwitchboardError> {
        self.calls.lock().await.push(AgentCall::Dispatch {
            user_id,
            text: formatted_text.to_string(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match reply {
            MockReply::Text(text) => Ok(text),
            MockReply::Empty => Ok(String::new()),
            MockReply::Fail(message) => Err(SwitchboardError::dispatch(message)),
            MockReply::Reject(status) => Err(SwitchboardError::AgentRejected {
                status,
                message: "mock rejection".to_string(),
            }),
        }
    }

    async fn attach(&self, user_id: i64) -> Result<(), SwitchboardError> {
        self.calls.lock().await.push(AgentCall::Attach(user_id));
        match self.attach {
            AttachOutcome::Ok => Ok(()),
            AttachOutcome::AlreadyAttached => Err(SwitchboardError::AlreadyAttached { user_id }),
            AttachOutcome::NotFound => Err(SwitchboardError::not_found("resource handle", user_id)),
        }
    }

    async fn detach(&self, user_id: i64) -> Result<(), SwitchboardError> {
        self.calls.lock().await.push(AgentCall::Detach(user_id));
        Ok(())
    }
}

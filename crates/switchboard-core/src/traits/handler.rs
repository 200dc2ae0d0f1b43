// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Response handler trait and the delivery contract it must satisfy.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SwitchboardError;
use crate::types::PlatformProfileRef;

/// Parameter names of the delivery call, in order.
pub const DELIVERY_PARAMETERS: [&str; 3] = ["response_text", "profile", "message_id"];

/// Declared shape of a response handler.
///
/// The registry compares this against [`HandlerContract::delivery`] before a
/// plugin is registered, so a handler that was written against an older or
/// different call shape is rejected at startup rather than dropping responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerContract {
    pub asynchronous: bool,
    pub parameters: Vec<String>,
}

impl HandlerContract {
    /// The contract every response handler must declare.
    pub fn delivery() -> Self {
        Self {
            asynchronous: true,
            parameters: DELIVERY_PARAMETERS.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Describes how `self` differs from `expected`, or `None` if it matches.
    pub fn mismatch(&self, expected: &HandlerContract) -> Option<String> {
        if self.asynchronous != expected.asynchronous {
            return Some(if expected.asynchronous {
                "response handler must be asynchronous".to_string()
            } else {
                "response handler must be synchronous".to_string()
            });
        }
        if self.parameters.len() != expected.parameters.len() {
            return Some(format!(
                "response handler takes {} parameters, expected {} ({})",
                self.parameters.len(),
                expected.parameters.len(),
                expected.parameters.join(", ")
            ));
        }
        for (i, (got, want)) in self.parameters.iter().zip(&expected.parameters).enumerate() {
            if got != want {
                return Some(format!(
                    "response handler parameter {i} is `{got}`, expected `{want}`"
                ));
            }
        }
        None
    }
}

/// Delivers a processed response back to the originating platform.
#[async_trait]
pub trait ResponseHandler: Send + Sync {
    /// Declared call shape. Override only for handlers that wrap foreign callables.
    fn contract(&self) -> HandlerContract {
        HandlerContract::delivery()
    }

    /// Sends `response_text` to the user identified by `profile`.
    async fn deliver(
        &self,
        response_text: &str,
        profile: &PlatformProfileRef,
        message_id: i64,
    ) -> Result<(), SwitchboardError>;
}

type DeliverFuture = Pin<Box<dyn Future<Output = Result<(), SwitchboardError>> + Send>>;

/// A [`ResponseHandler`] built from an async closure.
pub struct FnHandler {
    f: Box<dyn Fn(String, PlatformProfileRef, i64) -> DeliverFuture + Send + Sync>,
}

/// Wraps an async closure taking `(response_text, profile, message_id)`.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler
where
    F: Fn(String, PlatformProfileRef, i64) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), SwitchboardError>> + Send + 'static,
{
    FnHandler {
        f: Box::new(move |text, profile, message_id| Box::pin(f(text, profile, message_id))),
    }
}

#[async_trait]
impl ResponseHandler for FnHandler {
    async fn deliver(
        &self,
        response_text: &str,
        profile: &PlatformProfileRef,
        message_id: i64,
    ) -> Result<(), SwitchboardError> {
        (self.f)(response_text.to_string(), profile.clone(), message_id).await
    }
}

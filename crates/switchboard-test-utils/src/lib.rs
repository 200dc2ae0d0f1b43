// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Switchboard integration tests.
//!
//! Provides mock collaborators and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockAgentClient`] - Mock agent with scripted replies and a call log
//! - [`MockPlatform`] - Mock platform plugin capturing delivered responses
//! - [`TestHarness`] - Temp database, stores, mocks, and a handler registry

pub mod harness;
pub mod mock_agent;
pub mod mock_platform;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_agent::{AgentCall, AttachOutcome, MockAgentClient, MockReply};
pub use mock_platform::{Delivery, MOCK_PLATFORM, MockPlatform, MockPlatformFactory};

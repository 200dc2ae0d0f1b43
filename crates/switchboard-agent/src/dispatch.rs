// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resource-scoped `live` dispatch to the downstream agent.
//!
//! A dispatch attaches the user's resource handle, calls the agent under a
//! deadline with retry and a shared circuit breaker, and then always detaches,
//! including when the force-cancel token fires mid-call.
//!
//! At most one dispatch per user holds the handle at a time. Units working on
//! different users run in parallel; a second unit for the same user waits
//! until the first has detached.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use switchboard_core::{AgentClient, SwitchboardError};
use switchboard_resilience::{CircuitBreaker, RetryConfig, exponential_backoff};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why a live dispatch produced no response.
#[derive(Debug)]
pub enum DispatchError {
    /// The force-cancel token fired. The item should be released, not failed.
    Cancelled,
    Failed(SwitchboardError),
}

type HandleLock = Arc<tokio::sync::Mutex<()>>;

pub struct LiveDispatcher {
    agent: Arc<dyn AgentClient>,
    breaker: CircuitBreaker,
    retry: RetryConfig,
    timeout: Duration,
    detach_timeout: Duration,
    /// One lock per user with a dispatch in flight or waiting.
    handles: Mutex<HashMap<i64, HandleLock>>,
}

impl LiveDispatcher {
    pub fn new(
        agent: Arc<dyn AgentClient>,
        breaker: CircuitBreaker,
        retry: RetryConfig,
        timeout: Duration,
        detach_timeout: Duration,
    ) -> Self {
        Self {
            agent,
            breaker,
            retry,
            timeout,
            detach_timeout,
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Attach, call, detach, holding the user's handle lock throughout.
    ///
    /// Force-cancel while waiting for the lock returns `Cancelled` without
    /// touching the agent.
    pub async fn dispatch(
        &self,
        user_id: i64,
        text: &str,
        force: &CancellationToken,
    ) -> Result<String, DispatchError> {
        let guard = tokio::select! {
            biased;
            _ = force.cancelled() => None,
            g = self.handle_lock(user_id).lock_owned() => Some(g),
        };
        let Some(guard) = guard else {
            self.forget_idle_handle(user_id);
            return Err(DispatchError::Cancelled);
        };

        let call = async {
            match self.agent.attach(user_id).await {
                Ok(()) => {}
                Err(SwitchboardError::AlreadyAttached { .. }) => {
                    debug!(user_id, "resource handle already attached");
                }
                Err(e) => return Err(e),
            }
            self.call_agent(user_id, text).await
        };

        let result = tokio::select! {
            biased;
            _ = force.cancelled() => None,
            r = call => Some(r),
        };

        self.detach(user_id).await;
        drop(guard);
        self.forget_idle_handle(user_id);

        match result {
            None => Err(DispatchError::Cancelled),
            Some(Ok(reply)) => Ok(reply),
            Some(Err(e)) => Err(DispatchError::Failed(e)),
        }
    }

    fn handle_lock(&self, user_id: i64) -> HandleLock {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.entry(user_id).or_default().clone()
    }

    /// Drops the user's lock once nobody holds or awaits it.
    fn forget_idle_handle(&self, user_id: i64) {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        if handles
            .get(&user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            handles.remove(&user_id);
        }
    }

    /// Runs the retry loop under one deadline covering every attempt and the
    /// backoff sleeps between them.
    async fn call_agent(&self, user_id: i64, text: &str) -> Result<String, SwitchboardError> {
        let agent = &self.agent;
        let limit = self.timeout;
        let deadline = Instant::now() + limit;
        let timed_out = || SwitchboardError::Timeout { duration: limit };

        let attempts = exponential_backoff(
            || async move {
                // An attempt still running at the deadline fails here, so the
                // breaker sees it before the outer deadline ends the loop.
                let reply = tokio::time::timeout_at(deadline, agent.dispatch(user_id, text))
                    .await
                    .map_err(|_| timed_out())??;
                if reply.trim().is_empty() {
                    return Err(SwitchboardError::dispatch("agent returned an empty response"));
                }
                Ok(reply)
            },
            &self.retry,
            SwitchboardError::is_retryable_dispatch,
            Some(&self.breaker),
        );

        tokio::time::timeout_at(deadline, attempts)
            .await
            .map_err(|_| timed_out())?
    }

    async fn detach(&self, user_id: i64) {
        match tokio::time::timeout(self.detach_timeout, self.agent.detach(user_id)).await {
            Ok(Ok(())) => debug!(user_id, "resource handle detached"),
            Ok(Err(e)) => warn!(user_id, error = %e, "detach failed"),
            Err(_) => warn!(user_id, timeout_ms = self.detach_timeout.as_millis() as u64, "detach timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_test_utils::{AgentCall, AttachOutcome, MockAgentClient, MockReply};

    fn dispatcher(agent: Arc<MockAgentClient>, timeout: Duration) -> LiveDispatcher {
        retrying_dispatcher(agent, timeout, 0)
    }

    fn retrying_dispatcher(
        agent: Arc<MockAgentClient>,
        timeout: Duration,
        max_retries: u32,
    ) -> LiveDispatcher {
        LiveDispatcher::new(
            agent,
            CircuitBreaker::new("agent", 3, Duration::from_secs(60)),
            RetryConfig {
                max_retries,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
                jitter: false,
            },
            timeout,
            Duration::from_secs(1),
        )
    }

    fn idle_handles(live: &LiveDispatcher) -> bool {
        live.handles.lock().unwrap().is_empty()
    }

    #[tokio::test]
    async fn attach_call_detach_in_order() {
        let agent = Arc::new(MockAgentClient::with_replies(vec![MockReply::Text("pong".into())]));
        let live = dispatcher(agent.clone(), Duration::from_secs(5));

        let reply = live.dispatch(9, "ping", &CancellationToken::new()).await.unwrap();
        assert_eq!(reply, "pong");
        assert_eq!(
            agent.calls().await,
            vec![
                AgentCall::Attach(9),
                AgentCall::Dispatch {
                    user_id: 9,
                    text: "ping".into()
                },
                AgentCall::Detach(9),
            ]
        );
    }

    #[tokio::test]
    async fn already_attached_is_swallowed() {
        let agent = Arc::new(MockAgentClient::new().with_attach(AttachOutcome::AlreadyAttached));
        let live = dispatcher(agent.clone(), Duration::from_secs(5));
        assert!(live.dispatch(1, "x", &CancellationToken::new()).await.is_ok());
    }

    #[tokio::test]
    async fn missing_handle_fails_without_calling_but_still_detaches() {
        let agent = Arc::new(MockAgentClient::new().with_attach(AttachOutcome::NotFound));
        let live = dispatcher(agent.clone(), Duration::from_secs(5));

        let err = live.dispatch(1, "x", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Failed(ref e) if e.is_not_found()));
        assert_eq!(agent.dispatch_count().await, 0);
        assert_eq!(agent.detach_count().await, 1);
    }

    #[tokio::test]
    async fn empty_reply_is_a_failure() {
        let agent = Arc::new(MockAgentClient::new().with_fallback(MockReply::Empty));
        let live = dispatcher(agent, Duration::from_secs(5));
        let err = live.dispatch(1, "x", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Failed(SwitchboardError::Dispatch { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_agent_times_out() {
        let agent = Arc::new(MockAgentClient::new().with_delay(Duration::from_secs(30)));
        let live = dispatcher(agent.clone(), Duration::from_secs(2));
        let err = live.dispatch(1, "x", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Failed(SwitchboardError::Timeout { .. })));
        assert_eq!(agent.detach_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn force_cancel_detaches() {
        let agent = Arc::new(MockAgentClient::new().with_delay(Duration::from_secs(30)));
        let live = dispatcher(agent.clone(), Duration::from_secs(60));
        let force = CancellationToken::new();

        let canceller = force.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let err = live.dispatch(1, "x", &force).await.unwrap_err();
        assert!(matches!(err, DispatchError::Cancelled));
        assert_eq!(agent.detach_count().await, 1);
    }

    #[tokio::test]
    async fn breaker_opens_after_repeated_failures() {
        let agent = Arc::new(MockAgentClient::failing());
        let live = dispatcher(agent.clone(), Duration::from_secs(5));
        let force = CancellationToken::new();

        for _ in 0..3 {
            live.dispatch(1, "x", &force).await.unwrap_err();
        }
        assert!(live.breaker().is_open());

        let err = live.dispatch(1, "x", &force).await.unwrap_err();
        assert!(matches!(err, DispatchError::Failed(SwitchboardError::CircuitOpen { .. })));
        assert_eq!(agent.dispatch_count().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn same_user_dispatches_never_overlap() {
        let agent = Arc::new(MockAgentClient::new().with_delay(Duration::from_millis(200)));
        let live = dispatcher(agent.clone(), Duration::from_secs(5));
        let force = CancellationToken::new();

        let (first, second) = tokio::join!(
            live.dispatch(5, "one", &force),
            live.dispatch(5, "two", &force)
        );
        assert!(first.is_ok());
        assert!(second.is_ok());

        assert_eq!(agent.peak_attachments(5).await, 1);
        assert_eq!(agent.detach_count().await, 2);
        assert!(idle_handles(&live));
    }

    #[tokio::test(start_paused = true)]
    async fn different_users_dispatch_in_parallel() {
        let agent = Arc::new(MockAgentClient::new().with_delay(Duration::from_secs(1)));
        let live = dispatcher(agent.clone(), Duration::from_secs(5));
        let force = CancellationToken::new();

        let start = Instant::now();
        let (a, b) = tokio::join!(live.dispatch(1, "a", &force), live.dispatch(2, "b", &force));
        assert!(a.is_ok() && b.is_ok());
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_while_waiting_for_handle_skips_the_agent() {
        let agent = Arc::new(MockAgentClient::new().with_delay(Duration::from_secs(30)));
        let live = dispatcher(agent.clone(), Duration::from_secs(60));
        let force = CancellationToken::new();

        let canceller = force.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let (first, second) = tokio::join!(
            live.dispatch(3, "held", &force),
            live.dispatch(3, "waiting", &force)
        );
        assert!(matches!(first, Err(DispatchError::Cancelled)));
        assert!(matches!(second, Err(DispatchError::Cancelled)));
        assert_eq!(
            agent.calls().await,
            vec![
                AgentCall::Attach(3),
                AgentCall::Dispatch {
                    user_id: 3,
                    text: "held".into()
                },
                AgentCall::Detach(3),
            ]
        );
        assert!(idle_handles(&live));
    }

    #[tokio::test]
    async fn rejected_call_is_attempted_once() {
        let agent = Arc::new(MockAgentClient::new().with_fallback(MockReply::Reject(401)));
        let live = retrying_dispatcher(agent.clone(), Duration::from_secs(5), 3);

        let err = live.dispatch(1, "x", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Failed(SwitchboardError::AgentRejected { status: 401, .. })
        ));
        assert_eq!(agent.dispatch_count().await, 1);
        assert_eq!(live.breaker().consecutive_failures(), 0);
        assert_eq!(agent.detach_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_bounds_the_whole_retry_loop() {
        let agent = Arc::new(MockAgentClient::failing().with_delay(Duration::from_secs(3)));
        let live = retrying_dispatcher(agent.clone(), Duration::from_secs(5), 5);

        let start = Instant::now();
        let err = live.dispatch(1, "x", &CancellationToken::new()).await.unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, DispatchError::Failed(SwitchboardError::Timeout { .. })));
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_secs(6));
        assert_eq!(agent.dispatch_count().await, 2);
        assert_eq!(agent.detach_count().await, 1);
    }
}

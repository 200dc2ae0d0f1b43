// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The queue processor: claims items and drives each one to a terminal state.
//!
//! One loop task claims items under a semaphore of `concurrency_limit`
//! permits and spawns a tracked unit of work per item. Waits in the loop race
//! the shutdown token; waits in a unit race the force token. Terminal writes
//! are never raced, so a unit that got as far as producing a response always
//! records it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use switchboard_config::SwitchboardConfig;
use switchboard_core::{
    AgentClient, ItemId, MessageStore, PluginEvent, ProcessingMode, QueueItem, QueueStatus,
    SwitchboardError,
};
use switchboard_plugin::HandlerRegistry;
use switchboard_resilience::{CircuitBreaker, RetryConfig, backoff_delay};
use switchboard_storage::{QueueStore, retry_config};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::dispatch::{DispatchError, LiveDispatcher};
use crate::format::{MessageContext, format_message};

/// Requeue budget for items whose message, user or profile is missing.
const MISSING_DEPENDENCY_ATTEMPTS: u32 = 2;

/// Lifecycle of a [`QueueProcessor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    NotStarted,
    Running,
    Stopping,
    /// Terminal. A stopped processor cannot be restarted.
    Stopped,
}

impl std::fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessorState::NotStarted => write!(f, "not_started"),
            ProcessorState::Running => write!(f, "running"),
            ProcessorState::Stopping => write!(f, "stopping"),
            ProcessorState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Tuning knobs for the processor.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Circuit breaker name, used in logs.
    pub agent_name: String,
    pub poll_interval: Duration,
    pub max_attempts: u32,
    pub concurrency_limit: usize,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub shutdown_grace: Duration,
    pub detach_grace: Duration,
    pub dispatch_timeout: Duration,
    /// In-call retry policy for `live` dispatch.
    pub dispatch_retry: RetryConfig,
    pub breaker_threshold: u32,
    pub breaker_timeout: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::from(&SwitchboardConfig::default())
    }
}

impl From<&SwitchboardConfig> for ProcessorConfig {
    fn from(config: &SwitchboardConfig) -> Self {
        Self {
            agent_name: config.agent.name.clone(),
            poll_interval: config.queue.poll_interval(),
            max_attempts: config.queue.max_attempts,
            concurrency_limit: config.queue.concurrency_limit,
            backoff_base: config.queue.backoff_base(),
            backoff_max: config.queue.backoff_max(),
            shutdown_grace: config.queue.shutdown_grace(),
            detach_grace: config.queue.detach_grace(),
            dispatch_timeout: config.agent.dispatch_timeout(),
            dispatch_retry: retry_config(&config.retry),
            breaker_threshold: config.circuit_breaker.failure_threshold,
            breaker_timeout: config.circuit_breaker.timeout(),
        }
    }
}

/// State shared by the loop and every unit of work.
struct Worker {
    queue: QueueStore,
    store: Arc<dyn MessageStore>,
    live: LiveDispatcher,
    registry: Option<Arc<HandlerRegistry>>,
    mode: ArcSwap<ProcessingMode>,
    config: ProcessorConfig,
    in_progress: Mutex<HashSet<ItemId>>,
    permits: Arc<Semaphore>,
}

/// Pull-based worker that moves queue items to a terminal state.
pub struct QueueProcessor {
    worker: Arc<Worker>,
    state: Mutex<ProcessorState>,
    shutdown: CancellationToken,
    force: CancellationToken,
    tracker: TaskTracker,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl QueueProcessor {
    pub fn new(
        queue: QueueStore,
        store: Arc<dyn MessageStore>,
        agent: Arc<dyn AgentClient>,
        mode: ProcessingMode,
        registry: Option<Arc<HandlerRegistry>>,
        config: ProcessorConfig,
    ) -> Self {
        let breaker = CircuitBreaker::new(
            config.agent_name.clone(),
            config.breaker_threshold,
            config.breaker_timeout,
        );
        let live = LiveDispatcher::new(
            agent,
            breaker,
            config.dispatch_retry.clone(),
            config.dispatch_timeout,
            config.detach_grace,
        );
        let permits = Arc::new(Semaphore::new(config.concurrency_limit.max(1)));

        Self {
            worker: Arc::new(Worker {
                queue,
                store,
                live,
                registry,
                mode: ArcSwap::from_pointee(mode),
                config,
                in_progress: Mutex::new(HashSet::new()),
                permits,
            }),
            state: Mutex::new(ProcessorState::NotStarted),
            shutdown: CancellationToken::new(),
            force: CancellationToken::new(),
            tracker: TaskTracker::new(),
            loop_handle: Mutex::new(None),
        }
    }

    /// Recover items orphaned by a previous run and start the claim loop.
    ///
    /// A no-op unless the processor has never been started.
    pub async fn start(&self) -> Result<(), SwitchboardError> {
        if self.state() != ProcessorState::NotStarted {
            debug!(state = %self.state(), "start ignored");
            return Ok(());
        }

        self.worker.queue.recover_stale_processing().await?;

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != ProcessorState::NotStarted {
            return Ok(());
        }
        *state = ProcessorState::Running;

        let handle = tokio::spawn(run_loop(
            self.worker.clone(),
            self.tracker.clone(),
            self.shutdown.clone(),
            self.force.clone(),
        ));
        *self.loop_handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        info!(
            mode = %self.mode(),
            concurrency = self.worker.config.concurrency_limit.max(1),
            max_attempts = self.worker.config.max_attempts,
            "queue processor started"
        );
        Ok(())
    }

    /// Stop claiming, drain in-flight items, and force-cancel the stragglers.
    ///
    /// A no-op unless the processor is running. On return no item claimed by
    /// this processor is left in `processing`, unless a cancelled unit failed
    /// to release within `detach_grace`.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != ProcessorState::Running {
                debug!(state = %*state, "stop ignored");
                return;
            }
            *state = ProcessorState::Stopping;
        }
        info!(in_flight = self.in_flight(), "stopping queue processor");

        self.shutdown.cancel();
        let handle = self
            .loop_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            error!(error = %e, "claim loop panicked");
        }

        self.tracker.close();
        let grace = self.worker.config.shutdown_grace;
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                in_flight = self.in_flight(),
                grace_ms = grace.as_millis() as u64,
                "grace period elapsed, force-cancelling in-flight items"
            );
            self.force.cancel();
            let detach_grace = self.worker.config.detach_grace;
            if tokio::time::timeout(detach_grace, self.tracker.wait()).await.is_err() {
                error!(
                    in_flight = self.in_flight(),
                    "cancelled items did not release in time, they will be recovered on next start"
                );
            }
        }

        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = ProcessorState::Stopped;
        info!("queue processor stopped");
    }

    /// Change the mode for items claimed from now on.
    pub fn set_mode(&self, mode: ProcessingMode) {
        let previous = self.worker.mode.swap(Arc::new(mode));
        if *previous != mode {
            info!(from = %previous, to = %mode, "processing mode changed");
        }
    }

    pub fn mode(&self) -> ProcessingMode {
        **self.worker.mode.load()
    }

    pub fn state(&self) -> ProcessorState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of claimed items not yet settled.
    pub fn in_flight(&self) -> usize {
        self.worker
            .in_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Circuit breaker guarding the agent.
    pub fn breaker(&self) -> &CircuitBreaker {
        self.worker.live.breaker()
    }
}

impl Drop for QueueProcessor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_loop(
    worker: Arc<Worker>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    force: CancellationToken,
) {
    loop {
        let permit = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            permit = worker.permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        match worker.queue.claim_next().await {
            Ok(Some(item)) => {
                let mode = **worker.mode.load();
                worker.track(item.id);
                let unit_worker = worker.clone();
                let unit_force = force.clone();
                let span = info_span!("item", item_id = item.id, user_id = item.user_id, mode = %mode);
                tracker.spawn(
                    async move {
                        let id = item.id;
                        unit_worker.process(item, mode, &unit_force).await;
                        unit_worker.untrack(id);
                        drop(permit);
                    }
                    .instrument(span),
                );
                continue;
            }
            Ok(None) => drop(permit),
            Err(e) => {
                drop(permit);
                warn!(error = %e, "claim failed");
            }
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(worker.config.poll_interval) => {}
        }
    }
    debug!("claim loop exited");
}

impl Worker {
    fn track(&self, id: ItemId) {
        self.in_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
    }

    fn untrack(&self, id: ItemId) {
        self.in_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    async fn process(&self, item: QueueItem, mode: ProcessingMode, force: &CancellationToken) {
        debug!(attempts = item.attempts, "processing item");

        let resolved = tokio::select! {
            biased;
            _ = force.cancelled() => return self.release(item.id).await,
            r = self.resolve(&item) => r,
        };
        let ctx = match resolved {
            Ok(ctx) => ctx,
            Err(e) if e.is_not_found() => return self.missing_dependency(&item, e).await,
            Err(e) => return self.failed(&item, e, force).await,
        };

        let formatted = format_message(&ctx);
        let response = match mode {
            ProcessingMode::Echo => Some(formatted),
            ProcessingMode::Listen => None,
            ProcessingMode::Live => match self.live.dispatch(item.user_id, &formatted, force).await {
                Ok(reply) => Some(reply),
                Err(DispatchError::Cancelled) => return self.release(item.id).await,
                Err(DispatchError::Failed(e)) => return self.failed(&item, e, force).await,
            },
        };

        let Some(response) = response else {
            if let Err(e) = self.queue.complete(item.id, QueueStatus::Completed).await {
                return self.failed(&item, e, force).await;
            }
            info!("item completed without response");
            self.emit_completed(&item, mode);
            return;
        };

        if let Err(e) = self.store.write_response(item.message_id, &response).await {
            return self.failed(&item, e, force).await;
        }
        // A stored response without a terminal status goes around again; the
        // retry overwrites the response.
        if let Err(e) = self.queue.complete(item.id, QueueStatus::Completed).await {
            return self.failed(&item, e, force).await;
        }
        info!(response_len = response.len(), "item completed");
        self.emit_completed(&item, mode);

        self.deliver(&item, &ctx, &response, force).await;
    }

    async fn resolve(&self, item: &QueueItem) -> Result<MessageContext, SwitchboardError> {
        let message = self
            .store
            .fetch_message_text(item.message_id)
            .await?
            .ok_or_else(|| SwitchboardError::not_found("message", item.message_id))?;
        let user = self
            .store
            .fetch_user_display_info(item.user_id)
            .await?
            .ok_or_else(|| SwitchboardError::not_found("user", item.user_id))?;
        let profile = self
            .store
            .fetch_platform_profile_ref(item.user_id)
            .await?
            .ok_or_else(|| SwitchboardError::not_found("platform profile", item.user_id))?;
        Ok(MessageContext {
            message,
            user,
            profile,
        })
    }

    async fn deliver(
        &self,
        item: &QueueItem,
        ctx: &MessageContext,
        response: &str,
        force: &CancellationToken,
    ) {
        let platform = ctx.profile.platform.as_str();
        let Some(handler) = self
            .registry
            .as_ref()
            .and_then(|r| r.get_platform_handler(platform))
        else {
            warn!(platform, "no response handler for platform, response stored but not delivered");
            self.emit_delivery_failed(item, platform, "no response handler");
            return;
        };

        let delivered = tokio::select! {
            biased;
            _ = force.cancelled() => {
                warn!(platform, "delivery abandoned by shutdown");
                return;
            }
            r = handler.deliver(response, &ctx.profile, item.message_id) => r,
        };
        match delivered {
            Ok(()) => debug!(platform, "response delivered"),
            Err(e) => {
                warn!(platform, error = %e, "delivery failed");
                self.emit_delivery_failed(item, platform, &e.to_string());
            }
        }
    }

    /// A missing record will not appear by retrying: requeue once, then fail.
    async fn missing_dependency(&self, item: &QueueItem, cause: SwitchboardError) {
        let budget = self.config.max_attempts.min(MISSING_DEPENDENCY_ATTEMPTS);
        warn!(error = %cause, "missing dependency");
        match self.queue.requeue_or_fail(item.id, budget).await {
            Ok(true) => info!("item requeued once after missing dependency"),
            Ok(false) => {
                warn!("item failed: dependency still missing");
                self.emit_failed(item, &cause);
            }
            Err(e) => error!(error = %e, "could not requeue item"),
        }
    }

    /// Back off, then requeue or fail against the full attempt budget.
    async fn failed(&self, item: &QueueItem, cause: SwitchboardError, force: &CancellationToken) {
        let delay = backoff_delay(
            self.config.backoff_base,
            self.config.backoff_max,
            item.attempts,
        );
        warn!(error = %cause, delay_ms = delay.as_millis() as u64, "processing failed");

        tokio::select! {
            biased;
            _ = force.cancelled() => return self.release(item.id).await,
            _ = tokio::time::sleep(delay) => {}
        }

        match self.queue.requeue_or_fail(item.id, self.config.max_attempts).await {
            Ok(true) => info!(attempts = item.attempts + 1, "item requeued"),
            Ok(false) => {
                warn!(attempts = item.attempts + 1, "item failed, attempts exhausted");
                self.emit_failed(item, &cause);
            }
            Err(e) => error!(error = %e, "could not requeue item"),
        }
    }

    async fn release(&self, id: ItemId) {
        match self.queue.release(id).await {
            Ok(true) => info!("item released back to pending"),
            Ok(false) => debug!("item was no longer processing"),
            Err(e) => error!(error = %e, "could not release item"),
        }
    }

    fn emit(&self, event: PluginEvent) {
        if let Some(registry) = &self.registry {
            registry.emit_event(&event);
        }
    }

    fn emit_completed(&self, item: &QueueItem, mode: ProcessingMode) {
        self.emit(PluginEvent::new(
            "item_completed",
            serde_json::json!({
                "item_id": item.id,
                "message_id": item.message_id,
                "user_id": item.user_id,
                "mode": mode.to_string(),
            }),
        ));
    }

    fn emit_failed(&self, item: &QueueItem, cause: &SwitchboardError) {
        self.emit(PluginEvent::new(
            "item_failed",
            serde_json::json!({
                "item_id": item.id,
                "message_id": item.message_id,
                "user_id": item.user_id,
                "error": cause.to_string(),
            }),
        ));
    }

    fn emit_delivery_failed(&self, item: &QueueItem, platform: &str, reason: &str) {
        self.emit(PluginEvent::new(
            "delivery_failed",
            serde_json::json!({
                "item_id": item.id,
                "message_id": item.message_id,
                "platform": platform,
                "error": reason,
            }),
        ));
    }
}

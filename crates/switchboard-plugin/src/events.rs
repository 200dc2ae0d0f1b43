// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Synchronous in-process event bus.
//!
//! Handlers run on the emitting thread, in registration order. A handler that
//! returns an error or panics is logged and skipped; the rest still run.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use switchboard_core::{PluginEvent, SwitchboardError};
use tracing::{error, warn};

/// Identifies one registration, for [`EventBus::unregister`].
pub type HandlerId = u64;

/// A synchronous event callback.
pub type EventHandler = Arc<dyn Fn(&PluginEvent) -> Result<(), SwitchboardError> + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<String, Vec<(HandlerId, EventHandler)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, event_type: &str, handler: EventHandler) -> HandlerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event_type.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Returns false if no such registration exists.
    pub fn unregister(&self, event_type: &str, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = handlers.get_mut(event_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|(hid, _)| *hid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(event_type);
        }
        removed
    }

    /// Deliver `event` to every handler of its type.
    ///
    /// Returns how many handlers completed without error or panic.
    pub fn emit(&self, event: &PluginEvent) -> usize {
        // Snapshot so handlers may (un)register without deadlocking.
        let handlers: Vec<(HandlerId, EventHandler)> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();

        let mut delivered = 0;
        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!(event_type = %event.event_type, handler_id = id, error = %e, "event handler failed");
                }
                Err(payload) => {
                    error!(
                        event_type = %event.event_type,
                        handler_id = id,
                        panic = %panic_message(&payload),
                        "event handler panicked"
                    );
                }
            }
        }
        delivered
    }

    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_type)
            .map_or(0, Vec::len)
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

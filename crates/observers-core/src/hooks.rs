//! Named-event hook dispatch.
//!
//! Handlers register against an event name with a priority; [`HookRegistry::emit`]
//! runs them lowest priority first (registration order breaks ties) and
//! collects every result that asks for more than `Continue`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Event emitted by the dispatch tool after every successful mutation.
/// Its data is the default `list` output.
pub const OBSERVATIONS_CHANGE: &str = "observations:change";

/// What a handler wants the host to do next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HookResult {
    Continue,
    Display { content: String },
}

#[async_trait]
pub trait HookHandler: Send + Sync {
    async fn handle(&self, event: &str, data: &serde_json::Value) -> HookResult;
}

struct Registration {
    name: String,
    priority: i32,
    handler: Arc<dyn HookHandler>,
}

/// Registry of handlers keyed by event name.
#[derive(Default)]
pub struct HookRegistry {
    handlers: HashMap<String, Vec<Registration>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event`. Lower `priority` runs earlier.
    pub fn register(
        &mut self,
        event: &str,
        name: &str,
        priority: i32,
        handler: Arc<dyn HookHandler>,
    ) {
        let handlers = self.handlers.entry(event.to_string()).or_default();
        handlers.push(Registration {
            name: name.to_string(),
            priority,
            handler,
        });
        // Stable: equal priorities keep registration order.
        handlers.sort_by_key(|r| r.priority);
        debug!(event = %event, hook = %name, priority, "hook registered");
    }

    /// Remove every registration called `name`. Returns how many were removed.
    pub fn unregister(&mut self, name: &str) -> usize {
        let mut removed = 0;
        for handlers in self.handlers.values_mut() {
            let before = handlers.len();
            handlers.retain(|r| r.name != name);
            removed += before - handlers.len();
        }
        removed
    }

    /// Handler names for `event`, in run order.
    pub fn handler_names(&self, event: &str) -> Vec<&str> {
        self.handlers
            .get(event)
            .map(|hs| hs.iter().map(|r| r.name.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.values().all(|hs| hs.is_empty())
    }

    /// Run every handler for `event` in order; return the non-`Continue` results.
    pub async fn emit(&self, event: &str, data: &serde_json::Value) -> Vec<HookResult> {
        let Some(handlers) = self.handlers.get(event) else {
            return Vec::new();
        };

        let mut results = Vec::new();
        for registration in handlers {
            let result = registration.handler.handle(event, data).await;
            debug!(event = %event, hook = %registration.name, ?result, "hook ran");
            if result != HookResult::Continue {
                results.push(result);
            }
        }
        results
    }
}

//! Agent registry
//!
//! One live handler per handler type. Created at startup and shared by the
//! orchestrator, the registry is a pure lookup table: registering a type
//! again replaces the previous handler, and unknown types look up as `None`.

use crate::agent::handler::Handler;
use crate::protocol::HandlerType;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Thread-safe map of handler type to live handler
#[derive(Clone, Default)]
pub struct AgentRegistry {
    handlers: Arc<RwLock<HashMap<HandlerType, Arc<dyn Handler>>>>,
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("types", &self.list_types())
            .finish()
    }
}

impl AgentRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<HandlerType, Arc<dyn Handler>>> {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<HandlerType, Arc<dyn Handler>>> {
        self.handlers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a handler under a type; the last registration wins
    pub fn register(&self, handler_type: HandlerType, handler: Arc<dyn Handler>) {
        let replaced = self.write().insert(handler_type, handler).is_some();

        if replaced {
            debug!(handler = %handler_type, "Replaced registered handler");
        } else {
            info!(handler = %handler_type, "Registered handler");
        }
    }

    /// Look up the handler for a type
    pub fn get(&self, handler_type: HandlerType) -> Option<Arc<dyn Handler>> {
        self.read().get(&handler_type).cloned()
    }

    pub fn contains(&self, handler_type: HandlerType) -> bool {
        self.read().contains_key(&handler_type)
    }

    /// All registered handler types
    pub fn list_types(&self) -> BTreeSet<HandlerType> {
        self.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

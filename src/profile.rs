//! Owner profile store boundary
//!
//! The orchestrator only reads a profile snapshot during owner
//! initialization. Persistence lives elsewhere; this module defines the
//! lookup seam and an in-memory implementation.

use crate::error::McpResult;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Read access to learner profiles
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Fetch the profile for an owner; `Ok(None)` when none exists
    async fn fetch_profile(&self, owner_id: &str) -> McpResult<Option<Value>>;
}

/// Profiles held in memory, keyed by owner id
#[derive(Debug, Default)]
pub struct InMemoryProfileRepository {
    profiles: RwLock<HashMap<String, Value>>,
}

impl InMemoryProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, owner_id: impl Into<String>, profile: Value) {
        self.profiles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(owner_id.into(), profile);
    }
}

#[async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    async fn fetch_profile(&self, owner_id: &str) -> McpResult<Option<Value>> {
        Ok(self
            .profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(owner_id)
            .cloned())
    }
}

// SPDX-License-Identifier: MIT

//! Distributed mutual-exclusion collaborator
//!
//! Non-blocking semantics: `acquire` returns a release closure when the lock
//! was taken and `None` on contention. The runner treats contention as a
//! benign "someone else owns this node" signal.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Closure releasing a held lock
pub type ReleaseFn = Box<dyn FnOnce() + Send>;

/// Lock contract: zero/low-wait acquire, `None` on contention
#[async_trait]
pub trait LockManager: Send + Sync {
    async fn acquire(&self, key: &str) -> Result<Option<ReleaseFn>>;
}

/// In-memory lock manager used by tests and the bundled binary
#[derive(Clone, Default)]
pub struct InMemoryLockManager {
    held: Arc<Mutex<HashSet<String>>>,
}

impl InMemoryLockManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockManager for InMemoryLockManager {
    async fn acquire(&self, key: &str) -> Result<Option<ReleaseFn>> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if !held.insert(key.to_string()) {
            return Ok(None);
        }

        let held_ref = Arc::clone(&self.held);
        let key = key.to_string();
        Ok(Some(Box::new(move || {
            let mut held = held_ref.lock().unwrap_or_else(|e| e.into_inner());
            held.remove(&key);
        })))
    }
}

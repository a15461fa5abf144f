//! In-process tracking cache.
//!
//! The stream connectors write the latest payload per tracking key; the HTTP front end
//! reads it. The cache is bounded: once full, the oldest key is evicted.

use super::ServiceContext;
use crate::error::ComponentError;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct Entries {
    values: HashMap<String, Value>,
    order: VecDeque<String>,
}

/// Bounded map from tracking key to its latest JSON payload. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TrackingCache {
    capacity: usize,
    entries: Arc<Mutex<Entries>>,
}

impl TrackingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Arc::new(Mutex::new(Entries::default())),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stores `value` under `key`, evicting the oldest key when the cache is full.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        if entries.values.insert(key.clone(), value).is_none() {
            entries.order.push_back(key);
        }
        while entries.values.len() > self.capacity {
            let Some(oldest) = entries.order.pop_front() else {
                break;
            };
            entries.values.remove(&oldest);
            debug!(key = %oldest, "Evicted tracking record");
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.values.clear();
        entries.order.clear();
    }
}

/// The cache component. Validates the shared cache and owns its lifetime.
#[derive(Debug, Default)]
pub struct CacheComponent;

impl CacheComponent {
    pub fn new() -> Self {
        Self
    }

    pub async fn start(&mut self, ctx: &ServiceContext) -> Result<(), ComponentError> {
        let capacity = ctx.cache.capacity();
        if capacity == 0 {
            return Err(ComponentError::InvalidConfig(
                "CACHE_CAPACITY must be greater than zero".to_string(),
            ));
        }
        info!(capacity, "Cache ready");
        Ok(())
    }

    pub async fn stop(&mut self, ctx: &ServiceContext) -> Result<(), ComponentError> {
        info!(entries = ctx.cache.len(), "Clearing cache");
        ctx.cache.clear();
        Ok(())
    }
}

//! Optional in-memory model caches.
//!
//! A cache avoids re-hydrating identical rows repeatedly within a session.
//! It is never a source of truth: eviction is always safe and a miss simply
//! triggers a fresh cursor hydration. Entries are keyed by primary key
//! value, with composite keys collapsed deterministically into one
//! [`CacheKey`].

use crate::error::{Error, Result};
use crate::value::Value;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Separator for composite key parts. Unlikely to occur in key data.
const COMPOSITE_SEPARATOR: char = '\u{1f}';

/// Key of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Int(i64),
    Text(String),
}

impl CacheKey {
    /// Convert a single primary key value into a cache key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheKey`] for NULL keys and for types that cannot
    /// key a map entry (REAL, BLOB).
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Integer(v) => Ok(CacheKey::Int(*v)),
            Value::Text(v) => Ok(CacheKey::Text(v.clone())),
            Value::Null => Err(Error::CacheKey("primary key is NULL".to_owned())),
            other => Err(Error::CacheKey(format!(
                "unsupported primary key type for caching: {other:?}"
            ))),
        }
    }

    /// Collapse a composite primary key into one deterministic cache key.
    ///
    /// Parts are joined in declared column order, so the same key values
    /// always produce the same cache key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheKey`] if called with fewer than two parts
    /// (a single key must use [`Self::from_value`]) or if any part is NULL
    /// or unsupported.
    pub fn composite(values: &[Value]) -> Result<Self> {
        if values.len() < 2 {
            return Err(Error::CacheKey(format!(
                "composite key requires at least 2 parts, got {}",
                values.len()
            )));
        }
        let mut key = String::new();
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                key.push(COMPOSITE_SEPARATOR);
            }
            match value {
                Value::Integer(v) => key.push_str(&v.to_string()),
                Value::Text(v) => key.push_str(v),
                Value::Null => {
                    return Err(Error::CacheKey(format!("composite key part {i} is NULL")))
                }
                other => {
                    return Err(Error::CacheKey(format!(
                        "unsupported composite key part {i}: {other:?}"
                    )))
                }
            }
        }
        Ok(CacheKey::Text(key))
    }
}

/// Key to model-instance cache for one table.
///
/// Implementations synchronize on the backing store: notification flushes
/// and dispatcher reads can interleave arbitrarily.
pub trait ModelCache<M>: Send + Sync {
    /// Look up a previously loaded model.
    fn get(&self, key: &CacheKey) -> Option<Arc<M>>;

    /// Store or replace the entry for `key`.
    fn add_model(&self, key: CacheKey, model: Arc<M>);

    /// Invalidate the entry for `key`, returning it if present.
    fn remove_model(&self, key: &CacheKey) -> Option<Arc<M>>;

    /// Drop every entry.
    fn clear(&self);

    /// Number of live entries.
    fn size(&self) -> usize;

    /// Change the capacity bound, evicting entries if the cache shrank.
    /// Unbounded caches ignore this.
    fn set_cache_size(&self, capacity: usize) {
        let _ = capacity;
    }
}

/// Unbounded map cache.
pub struct SimpleMapCache<M> {
    entries: Mutex<HashMap<CacheKey, Arc<M>>>,
}

impl<M> SimpleMapCache<M> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<M> Default for SimpleMapCache<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Send + Sync> ModelCache<M> for SimpleMapCache<M> {
    fn get(&self, key: &CacheKey) -> Option<Arc<M>> {
        self.entries.lock().get(key).cloned()
    }

    fn add_model(&self, key: CacheKey, model: Arc<M>) {
        self.entries.lock().insert(key, model);
    }

    fn remove_model(&self, key: &CacheKey) -> Option<Arc<M>> {
        self.entries.lock().remove(key)
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }

    fn size(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Bounded cache evicting the least recently used entry.
pub struct LruModelCache<M> {
    inner: Mutex<LruInner<M>>,
}

struct LruInner<M> {
    capacity: usize,
    entries: HashMap<CacheKey, Arc<M>>,
    /// Access order, least recently used at the front.
    order: VecDeque<CacheKey>,
}

impl<M> LruModelCache<M> {
    /// Create a cache holding at most `capacity` entries.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be non-zero");
        Self {
            inner: Mutex::new(LruInner {
                capacity,
                entries: HashMap::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
            }),
        }
    }

}

impl<M> LruInner<M> {
    fn touch(&mut self, key: &CacheKey) {
        if let Some(position) = self.order.iter().position(|k| k == key) {
            self.order.remove(position);
        }
        self.order.push_back(key.clone());
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest) = self.order.pop_front() {
            self.entries.remove(&oldest);
        }
    }
}

impl<M: Send + Sync> ModelCache<M> for LruModelCache<M> {
    fn get(&self, key: &CacheKey) -> Option<Arc<M>> {
        let mut inner = self.inner.lock();
        let model = inner.entries.get(key).cloned();
        if model.is_some() {
            inner.touch(key);
        }
        model
    }

    fn add_model(&self, key: CacheKey, model: Arc<M>) {
        let mut inner = self.inner.lock();
        inner.touch(&key);
        inner.entries.insert(key, model);
        while inner.entries.len() > inner.capacity {
            inner.evict_oldest();
        }
    }

    fn remove_model(&self, key: &CacheKey) -> Option<Arc<M>> {
        let mut inner = self.inner.lock();
        if let Some(position) = inner.order.iter().position(|k| k == key) {
            inner.order.remove(position);
        }
        inner.entries.remove(key)
    }

    fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    fn size(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Panics if `capacity` is zero, same as [`LruModelCache::with_capacity`].
    fn set_cache_size(&self, capacity: usize) {
        assert!(capacity > 0, "cache capacity must be non-zero");
        let mut inner = self.inner.lock();
        inner.capacity = capacity;
        while inner.entries.len() > inner.capacity {
            inner.evict_oldest();
        }
    }
}

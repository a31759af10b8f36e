//! A small bounded cache shared between concurrent readers.
//!
//! Entries are evicted in insertion order once the capacity is reached.
//! All operations take `&self`; the inner state is guarded by a mutex so
//! clears and reductions triggered from any thread are safe and idempotent.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;

#[derive(Debug)]
struct CacheInner<V> {
    map: HashMap<String, Arc<V>>,
    order: VecDeque<String>,
}

#[derive(Debug)]
pub struct BoundedCache<V> {
    inner: Mutex<CacheInner<V>>,
    capacity: usize,
}

impl<V> BoundedCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity,
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let inner = self.inner.lock().unwrap();
        inner.map.get(key).cloned()
    }

    pub fn insert(&self, key: String, value: Arc<V>) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.map.insert(key.clone(), value).is_none() {
            inner.order.push_back(key);
        }
        while inner.map.len() > self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.map.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.map.clear();
        inner.order.clear();
    }

    /// Drops the given share of entries, oldest first.
    pub fn reduce(&self, share: f64) {
        let share = share.clamp(0.0, 1.0);
        let mut inner = self.inner.lock().unwrap();
        let n_drop = ((inner.map.len() as f64) * share).floor() as usize;
        for _ in 0..n_drop {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.map.remove(&oldest);
                }
                None => break,
            }
        }
    }
}

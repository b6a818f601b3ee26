//! Reset-on-return object cache.
//!
//! Responses and sessions are written once per request/lifetime and then
//! reset rather than reallocated, to bound allocation churn under sustained
//! request rates. The pool is a cache, not a free-list with a capacity: an
//! instance lost to a dead worker simply shrinks the cache, and `acquire`
//! falls back to `Default` construction.

use std::sync::Mutex;

/// Types whose mutable state can be reset to documented defaults.
pub trait Recyclable {
    /// Reset every mutable field to its default. Called exactly once, on
    /// release, after all use of the instance has completed.
    fn recycle(&mut self);
}

/// Mutex-guarded free list of recycled instances.
pub struct Pool<T> {
    free: Mutex<Vec<T>>,
}

impl<T: Recyclable + Default> Pool<T> {
    pub fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
        }
    }

    /// A recycled instance if one is available, otherwise a fresh default.
    /// Either way every mutable field holds its documented default.
    pub fn acquire(&self) -> T {
        match self.free.lock() {
            Ok(mut free) => free.pop().unwrap_or_default(),
            Err(_) => T::default(),
        }
    }

    /// Reset and cache an instance. Must only be called once no other
    /// thread can still reach it.
    pub fn release(&self, mut item: T) {
        item.recycle();
        if let Ok(mut free) = self.free.lock() {
            free.push(item);
        }
    }

    /// Number of idle instances currently cached.
    pub fn idle(&self) -> usize {
        self.free.lock().map(|f| f.len()).unwrap_or(0)
    }
}

impl<T: Recyclable + Default> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

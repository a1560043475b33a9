//! Free-list pool for per-request entities.
//!
//! A [`Pool`] keeps released values on a free list so their heap buffers
//! (strings, maps, vectors) are reused by later requests. Values are handed
//! out wrapped in a [`Pooled`] guard:
//!
//! - [`Pool::acquire_with`] pops a value (or creates one), resets it, lets
//!   the caller fill it in, and wraps it in an `Arc`.
//! - [`Pooled::share`] hands out `Arc` clones for the request to read.
//! - Dropping the guard resets the value and puts it back, but only if no
//!   clone is still alive. A value that is still referenced elsewhere is
//!   dropped instead, so a live reference never observes another
//!   request's data.
//!
//! Release happens on every exit path, including unwinding, because it is
//! tied to the guard's `Drop`.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default upper bound on idle values kept per pool.
pub const DEFAULT_MAX_IDLE: usize = 1024;

/// A value that can be returned to its empty state.
pub trait Reset {
    /// Clears every field to its empty value.
    fn reset(&mut self);
}

impl<T: Reset> Reset for Mutex<T> {
    fn reset(&mut self) {
        self.get_mut().reset();
    }
}

struct PoolInner<T> {
    free: Mutex<Vec<T>>,
    max_idle: usize,
    reused: AtomicU64,
    discarded: AtomicU64,
}

/// A free-list of reusable values.
pub struct Pool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T: Reset + Default + Send + Sync + 'static> Pool<T> {
    /// Creates a pool keeping at most [`DEFAULT_MAX_IDLE`] idle values.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_idle(DEFAULT_MAX_IDLE)
    }

    /// Creates a pool keeping at most `max_idle` idle values.
    #[must_use]
    pub fn with_max_idle(max_idle: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::new()),
                max_idle,
                reused: AtomicU64::new(0),
                discarded: AtomicU64::new(0),
            }),
        }
    }

    /// Acquires an empty value.
    pub fn acquire(&self) -> Pooled<T> {
        self.acquire_with(|_| {})
    }

    /// Acquires a value, resets it, and initialises it with `init`.
    pub fn acquire_with(&self, init: impl FnOnce(&mut T)) -> Pooled<T> {
        let popped = self.inner.free.lock().pop();
        let mut value = match popped {
            Some(value) => {
                self.inner.reused.fetch_add(1, Ordering::Relaxed);
                value
            }
            None => T::default(),
        };
        value.reset();
        init(&mut value);
        Pooled {
            value: Some(Arc::new(value)),
            pool: Arc::clone(&self.inner),
        }
    }

    /// Number of values currently idle on the free list.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.inner.free.lock().len()
    }

    /// Number of acquisitions served from the free list.
    #[must_use]
    pub fn reused(&self) -> u64 {
        self.inner.reused.load(Ordering::Relaxed)
    }

    /// Number of releases dropped because the value was still shared.
    #[must_use]
    pub fn discarded(&self) -> u64 {
        self.inner.discarded.load(Ordering::Relaxed)
    }
}

impl<T: Reset + Default + Send + Sync + 'static> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("idle", &self.inner.free.lock().len())
            .field("max_idle", &self.inner.max_idle)
            .finish()
    }
}

/// Scoped ownership of a pooled value.
///
/// The value goes back to its pool when the guard is dropped.
pub struct Pooled<T: Reset> {
    value: Option<Arc<T>>,
    pool: Arc<PoolInner<T>>,
}

impl<T: Reset> Pooled<T> {
    /// Returns a shared handle to the value.
    #[must_use]
    pub fn share(&self) -> Arc<T> {
        match &self.value {
            Some(value) => Arc::clone(value),
            // `value` is only taken in `drop`.
            None => unreachable!("pooled value accessed after release"),
        }
    }
}

impl<T: Reset> std::ops::Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.value {
            Some(value) => value,
            None => unreachable!("pooled value accessed after release"),
        }
    }
}

impl<T: Reset> Drop for Pooled<T> {
    fn drop(&mut self) {
        let Some(value) = self.value.take() else {
            return;
        };
        match Arc::try_unwrap(value) {
            Ok(mut value) => {
                value.reset();
                let mut free = self.pool.free.lock();
                if free.len() < self.pool.max_idle {
                    free.push(value);
                }
            }
            Err(_still_shared) => {
                self.pool.discarded.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("pooled value still referenced at release, discarding");
            }
        }
    }
}

impl<T: Reset + fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&self.value).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Scratch {
        items: Vec<String>,
        label: String,
    }

    impl Reset for Scratch {
        fn reset(&mut self) {
            self.items.clear();
            self.label.clear();
        }
    }

    #[test]
    fn test_released_value_is_reused_empty() {
        let pool: Pool<Scratch> = Pool::new();
        {
            let guard = pool.acquire_with(|s| {
                s.items.push("a".into());
                s.label.push_str("first");
            });
            assert_eq!(guard.label, "first");
        }
        assert_eq!(pool.idle(), 1);

        let guard = pool.acquire();
        assert!(guard.items.is_empty());
        assert!(guard.label.is_empty());
        assert_eq!(pool.reused(), 1);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_shared_value_is_not_returned() {
        let pool: Pool<Scratch> = Pool::new();
        let guard = pool.acquire_with(|s| s.label.push_str("held"));
        let escaped = guard.share();
        drop(guard);

        assert_eq!(pool.idle(), 0);
        assert_eq!(pool.discarded(), 1);
        assert_eq!(escaped.label, "held");

        let next = pool.acquire();
        assert!(next.label.is_empty());
        assert_eq!(escaped.label, "held");
    }

    #[test]
    fn test_released_after_clones_dropped() {
        let pool: Pool<Scratch> = Pool::new();
        let guard = pool.acquire();
        let clone = guard.share();
        drop(clone);
        drop(guard);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_max_idle_bound() {
        let pool: Pool<Scratch> = Pool::with_max_idle(1);
        let a = pool.acquire();
        let b = pool.acquire();
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_released_on_unwind() {
        let pool: Pool<Scratch> = Pool::new();
        let cloned = pool.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = cloned.acquire_with(|s| s.label.push_str("doomed"));
            panic!("handler blew up");
        }));
        assert!(result.is_err());
        assert_eq!(pool.idle(), 1);
        assert!(pool.acquire().label.is_empty());
    }

    #[test]
    fn test_mutex_values_reset_through_lock() {
        let pool: Pool<Mutex<Scratch>> = Pool::new();
        {
            let guard = pool.acquire();
            guard.lock().items.push("x".into());
        }
        let guard = pool.acquire();
        assert!(guard.lock().items.is_empty());
    }
}

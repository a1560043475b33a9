//! Request-scoped value store.

use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Entries = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

/// Typed key/value bag living for one request.
///
/// Keys are types; at most one value per type. Clones share the same
/// entries, so a value inserted by the handler adapter is visible to the
/// audit flush callback holding the request's [`crate::RequestView`].
///
/// # Example
///
/// ```
/// use keel_core::RequestStore;
///
/// #[derive(Debug, PartialEq)]
/// struct TenantId(u32);
///
/// let store = RequestStore::new();
/// store.insert(TenantId(7));
/// assert_eq!(*store.get::<TenantId>().unwrap(), TenantId(7));
/// ```
#[derive(Clone, Default)]
pub struct RequestStore {
    entries: Arc<Mutex<Entries>>,
}

impl RequestStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`, replacing any previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&self, value: T) {
        self.insert_arc(Arc::new(value));
    }

    /// Stores an already shared value.
    pub fn insert_arc<T: Send + Sync + 'static>(&self, value: Arc<T>) {
        self.entries.lock().insert(TypeId::of::<T>(), value);
    }

    /// Returns the value of type `T`, if present.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let entry = self.entries.lock().get(&TypeId::of::<T>()).cloned()?;
        entry.downcast::<T>().ok()
    }

    /// Removes and returns the value of type `T`.
    pub fn remove<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let entry = self.entries.lock().remove(&TypeId::of::<T>())?;
        entry.downcast::<T>().ok()
    }

    /// Returns `true` if a value of type `T` is present.
    #[must_use]
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.entries.lock().contains_key(&TypeId::of::<T>())
    }

    /// Removes every value.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl fmt::Debug for RequestStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestStore")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_value_per_type() {
        let store = RequestStore::new();
        store.insert(1u32);
        store.insert(2u32);
        store.insert("label");
        assert_eq!(*store.get::<u32>().unwrap(), 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_clones_share_entries() {
        let store = RequestStore::new();
        let other = store.clone();
        other.insert(String::from("shared"));
        assert_eq!(store.get::<String>().unwrap().as_str(), "shared");
    }

    #[test]
    fn test_remove_and_clear() {
        let store = RequestStore::new();
        store.insert(5i64);
        assert!(store.contains::<i64>());
        assert_eq!(*store.remove::<i64>().unwrap(), 5);
        assert!(!store.contains::<i64>());
        store.insert(1u8);
        store.clear();
        assert!(store.is_empty());
    }
}

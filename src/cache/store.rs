//! In-memory key/value store shared by every query controller.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Entry = Arc<dyn Any + Send + Sync>;

/// Key-addressed store of last-known query values.
///
/// Values are stored type-erased so one store can hold every resource the
/// application knows about. The store has no eviction policy: the key space
/// is the fixed set of resources the application defines.
///
/// Construct one at start-up and hand it to each controller as an
/// `Arc<CacheStore>`.
#[derive(Default)]
pub struct CacheStore {
  entries: Mutex<HashMap<String, Entry>>,
}

impl CacheStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
    // A panic while holding the lock cannot leave the map half-written.
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Get a clone of the value stored under `key`.
  ///
  /// Returns `None` if the key is absent or holds a value of another type.
  pub fn get<T>(&self, key: &str) -> Option<T>
  where
    T: Clone + 'static,
  {
    let entry = self.lock().get(key).cloned()?;
    match entry.downcast_ref::<T>() {
      Some(value) => Some(value.clone()),
      None => {
        tracing::warn!(key, "cached value has an unexpected type, treating as a miss");
        None
      }
    }
  }

  /// Store `value` under `key`, replacing whatever was there.
  pub fn set<T>(&self, key: &str, value: T)
  where
    T: Send + Sync + 'static,
  {
    self.lock().insert(key.to_string(), Arc::new(value));
  }

  /// Remove the value stored under `key`. Removing a missing key is a no-op.
  pub fn delete(&self, key: &str) {
    self.lock().remove(key);
  }

  /// Store `value` under `key` only if `guard` returns true.
  ///
  /// The guard runs while the store is locked, so nothing can interleave
  /// between the check and the write. Returns whether the write happened.
  pub fn set_if<T, G>(&self, key: &str, value: T, guard: G) -> bool
  where
    T: Send + Sync + 'static,
    G: FnOnce() -> bool,
  {
    let mut entries = self.lock();
    if !guard() {
      return false;
    }
    entries.insert(key.to_string(), Arc::new(value));
    true
  }

  /// Remove `key` only if `guard` returns true, checked under the lock.
  ///
  /// Returns whether the guard passed, whether or not an entry existed.
  pub fn delete_if<G>(&self, key: &str, guard: G) -> bool
  where
    G: FnOnce() -> bool,
  {
    let mut entries = self.lock();
    if !guard() {
      return false;
    }
    entries.remove(key);
    true
  }

  /// Drop every entry. Used when the session ends.
  pub fn clear(&self) {
    self.lock().clear();
  }

  pub fn contains(&self, key: &str) -> bool {
    self.lock().contains_key(key)
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }

  /// Keys currently holding a value, sorted.
  pub fn keys(&self) -> Vec<String> {
    let mut keys: Vec<String> = self.lock().keys().cloned().collect();
    keys.sort();
    keys
  }
}

impl std::fmt::Debug for CacheStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CacheStore")
      .field("keys", &self.keys())
      .finish()
  }
}

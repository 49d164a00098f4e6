//! Async query controller with stale-while-revalidate caching.
//!
//! Inspired by TanStack Query, a [`QueryController`] binds one cache key to a
//! fetcher and mediates every read of that resource:
//!
//! - a cache hit is returned immediately while a fresh copy is fetched in
//!   the background,
//! - a cache miss waits for the fetcher and populates the cache,
//! - every call cancels whatever fetch the previous call started, so a slow
//!   response can never overwrite a newer one.
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(CacheStore::new());
//! let api = api_client.clone();
//! let links = QueryController::new(store.clone(), "links", move |signal| {
//!     let api = api.clone();
//!     async move { api.get_links(signal).await }
//! });
//!
//! // On navigation
//! match links.get_data().await {
//!     Ok(links) => render(links),
//!     Err(QueryError::Superseded) => {} // a newer navigation owns the screen
//!     Err(QueryError::Fetch(e)) => render_error(e),
//! }
//!
//! // After a mutation against the same resource
//! links.clear_cache();
//! ```

use futures::future::BoxFuture;
use serde::Deserialize;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::cancel::{CancelSignal, CancelToken};

/// How a fetch settled, as reported by the fetcher.
///
/// Cancellation is its own variant so it is never mistaken for a failure:
/// a cancelled fetch leaves the cache alone, a failed one evicts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError<E> {
  #[error("fetch was cancelled")]
  Cancelled,
  #[error("{0}")]
  Failed(E),
}

/// Error returned by [`QueryController::get_data`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError<E> {
  /// The fetcher failed while the cache was empty.
  #[error("{0}")]
  Fetch(E),
  /// A later call cancelled this call's fetch. Not a failure: the later
  /// call owns the result, so callers should simply drop this one.
  #[error("query was superseded by a newer request")]
  Superseded,
}

impl<E> QueryError<E> {
  pub fn is_superseded(&self) -> bool {
    matches!(self, QueryError::Superseded)
  }

  /// The fetch error, if this was a genuine failure.
  pub fn into_fetch_error(self) -> Option<E> {
    match self {
      QueryError::Fetch(e) => Some(e),
      QueryError::Superseded => None,
    }
  }
}

/// What happens when `get_data` finds a cached value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevalidateMode {
  /// Return the cached value and refresh it in the background
  #[default]
  Background,
  /// Return the cached value and never refresh it until it is cleared
  Never,
}

/// A lifecycle transition observed by a controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryEvent {
  pub key: String,
  pub kind: QueryEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryEventKind {
  /// A foreground fetch populated the cache
  Fetched,
  /// A foreground fetch failed; the cache stays empty
  FetchFailed(String),
  /// A background fetch replaced the cached value
  Revalidated,
  /// A background fetch failed and the cached value was dropped
  Evicted(String),
  /// A fetch settled after being superseded; its result was ignored
  Discarded,
  /// The entry was cleared by a call site
  Cleared,
}

/// A fetcher produces one future per call, observing the given signal.
type FetcherFn<T, E> =
  Box<dyn Fn(CancelSignal) -> BoxFuture<'static, Result<T, FetchError<E>>> + Send + Sync>;

const EVENT_CAPACITY: usize = 64;

struct Shared<T, E> {
  cache_key: String,
  store: Arc<CacheStore>,
  fetcher: FetcherFn<T, E>,
  /// Token of the most recent call; the only one allowed to touch the cache
  current: Mutex<CancelToken>,
  events: broadcast::Sender<QueryEvent>,
}

/// Owns the fetch lifecycle for one cache key.
///
/// Clones share the same token and fetcher, so every call site holding a
/// clone talks to the same controller.
pub struct QueryController<T, E> {
  shared: Arc<Shared<T, E>>,
  mode: RevalidateMode,
}

impl<T, E> QueryController<T, E>
where
  T: Clone + Send + Sync + 'static,
  E: fmt::Display + Send + 'static,
{
  /// Create a controller for `cache_key` backed by `fetcher`.
  ///
  /// The fetcher is called once per fetch with a signal that is cancelled
  /// when a newer call supersedes it. It should return
  /// `FetchError::Cancelled` when it stops because of that signal.
  pub fn new<F, Fut>(store: Arc<CacheStore>, cache_key: impl Into<String>, fetcher: F) -> Self
  where
    F: Fn(CancelSignal) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, FetchError<E>>> + Send + 'static,
  {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    Self {
      shared: Arc::new(Shared {
        cache_key: cache_key.into(),
        store,
        fetcher: Box::new(move |signal| -> BoxFuture<'static, Result<T, FetchError<E>>> {
          Box::pin(fetcher(signal))
        }),
        current: Mutex::new(CancelToken::new()),
        events,
      }),
      mode: RevalidateMode::default(),
    }
  }

  /// Set what happens on a cache hit.
  pub fn with_revalidate_mode(mut self, mode: RevalidateMode) -> Self {
    self.mode = mode;
    self
  }

  pub fn cache_key(&self) -> &str {
    &self.shared.cache_key
  }

  pub fn revalidate_mode(&self) -> RevalidateMode {
    self.mode
  }

  /// Subscribe to lifecycle events for this key.
  pub fn subscribe(&self) -> broadcast::Receiver<QueryEvent> {
    self.shared.events.subscribe()
  }

  /// Get the resource, from cache if possible.
  ///
  /// On a hit the cached value is returned without waiting on the network,
  /// and (in [`RevalidateMode::Background`]) a refresh is started whose
  /// outcome only affects the cache. On a miss the fetch is awaited.
  pub async fn get_data(&self) -> Result<T, QueryError<E>> {
    let signal = self.renew_token();
    let key = self.cache_key();

    if let Some(cached) = self.shared.store.get::<T>(key) {
      debug!(key, "cache hit");
      if self.mode == RevalidateMode::Background {
        self.spawn_revalidation(signal);
      }
      return Ok(cached);
    }

    debug!(key, "cache miss, fetching");
    let future = (self.shared.fetcher)(signal.clone());

    match settle(future, &signal).await {
      Ok(value) => {
        let applied = self
          .shared
          .store
          .set_if(key, value.clone(), || !signal.is_cancelled());
        if applied {
          self.emit(QueryEventKind::Fetched);
          Ok(value)
        } else {
          self.superseded()
        }
      }
      Err(FetchError::Failed(e)) if !signal.is_cancelled() => {
        debug!(key, error = %e, "fetch failed");
        self.emit(QueryEventKind::FetchFailed(e.to_string()));
        Err(QueryError::Fetch(e))
      }
      Err(_) => self.superseded(),
    }
  }

  /// Drop the cached value so the next `get_data` waits for a fresh fetch.
  ///
  /// Does not cancel a fetch that is already running.
  pub fn clear_cache(&self) {
    self.shared.store.delete(self.cache_key());
    debug!(key = self.cache_key(), "cache cleared");
    self.emit(QueryEventKind::Cleared);
  }

  /// Cancel the fetch started by the most recent call, leaving the cache as is.
  ///
  /// A foreground caller waiting on it gets [`QueryError::Superseded`]; a
  /// background refresh is discarded.
  pub fn cancel(&self) {
    self.renew_token();
    debug!(key = self.cache_key(), "in-flight fetch cancelled");
  }

  /// Cancel the previous call's token and install a fresh one.
  ///
  /// Both happen under one lock with no await in between, so there is no
  /// window in which the old token is still live next to the new one.
  fn renew_token(&self) -> CancelSignal {
    let mut current = self
      .shared
      .current
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    current.cancel();
    *current = CancelToken::new();
    current.signal()
  }

  fn spawn_revalidation(&self, signal: CancelSignal) {
    let future = (self.shared.fetcher)(signal.clone());
    let store = Arc::clone(&self.shared.store);
    let events = self.shared.events.clone();
    let key = self.shared.cache_key.clone();

    tokio::spawn(async move {
      let kind = match settle(future, &signal).await {
        Ok(value) => {
          if store.set_if(&key, value, || !signal.is_cancelled()) {
            debug!(key = %key, "cache revalidated");
            QueryEventKind::Revalidated
          } else {
            QueryEventKind::Discarded
          }
        }
        Err(FetchError::Failed(e)) => {
          if store.delete_if(&key, || !signal.is_cancelled()) {
            warn!(key = %key, error = %e, "background fetch failed, evicting cached value");
            QueryEventKind::Evicted(e.to_string())
          } else {
            QueryEventKind::Discarded
          }
        }
        Err(FetchError::Cancelled) => QueryEventKind::Discarded,
      };
      let _ = events.send(QueryEvent { key, kind });
    });
  }

  fn superseded(&self) -> Result<T, QueryError<E>> {
    debug!(key = self.cache_key(), "fetch superseded by a newer request");
    self.emit(QueryEventKind::Discarded);
    Err(QueryError::Superseded)
  }

  fn emit(&self, kind: QueryEventKind) {
    // Nobody listening is fine
    let _ = self.shared.events.send(QueryEvent {
      key: self.shared.cache_key.clone(),
      kind,
    });
  }
}

/// Drive a fetch to completion unless its signal fires first.
///
/// Dropping the future on cancellation stops fetchers that never look at the
/// signal themselves.
async fn settle<T, E>(
  future: BoxFuture<'static, Result<T, FetchError<E>>>,
  signal: &CancelSignal,
) -> Result<T, FetchError<E>> {
  tokio::select! {
    biased;
    _ = signal.cancelled() => Err(FetchError::Cancelled),
    result = future => result,
  }
}

impl<T, E> Clone for QueryController<T, E> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
      mode: self.mode,
    }
  }
}

impl<T, E> fmt::Debug for QueryController<T, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("QueryController")
      .field("cache_key", &self.shared.cache_key)
      .field("mode", &self.mode)
      .finish_non_exhaustive()
  }
}

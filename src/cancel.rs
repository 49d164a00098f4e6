//! Cooperative cancellation for in-flight fetches.
//!
//! A [`CancelToken`] is owned by whoever controls the fetch lifecycle; the
//! fetch itself only ever sees a [`CancelSignal`], which can be observed but
//! not triggered.

use tokio::sync::watch;

/// Owning side of a cancellation pair. Dropping the token cancels it.
#[derive(Debug)]
pub struct CancelToken {
  tx: watch::Sender<bool>,
}

impl CancelToken {
  pub fn new() -> Self {
    let (tx, _rx) = watch::channel(false);
    Self { tx }
  }

  /// Create a signal that observes this token.
  pub fn signal(&self) -> CancelSignal {
    CancelSignal {
      rx: self.tx.subscribe(),
    }
  }

  /// Cancel the token. Cancelling twice is a no-op.
  pub fn cancel(&self) {
    self.tx.send_replace(true);
  }

  pub fn is_cancelled(&self) -> bool {
    *self.tx.borrow()
  }
}

impl Default for CancelToken {
  fn default() -> Self {
    Self::new()
  }
}

impl Drop for CancelToken {
  fn drop(&mut self) {
    self.cancel();
  }
}

/// Read-only view of a [`CancelToken`], handed to fetchers.
#[derive(Debug, Clone)]
pub struct CancelSignal {
  rx: watch::Receiver<bool>,
}

impl CancelSignal {
  pub fn is_cancelled(&self) -> bool {
    *self.rx.borrow()
  }

  /// Resolve once the token is cancelled.
  ///
  /// Resolves immediately if it already is.
  pub async fn cancelled(&self) {
    let mut rx = self.rx.clone();
    // The token cancels itself before its sender goes away, so a closed
    // channel without a cancellation cannot happen; wait forever if it does.
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
      std::future::pending::<()>().await;
    }
  }
}

//! Cooperative cancellation for ingestion runs.
//!
//! The caller sets the token; the ingestor checks it between records. A
//! record whose merge has started always finishes, so the graph never holds
//! half of a record.

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

/// A cooperative cancellation token. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
  cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
  pub fn new() -> Self { Self::default() }

  pub fn is_cancelled(&self) -> bool { self.cancelled.load(Ordering::Relaxed) }

  /// Signal cancellation.
  pub fn cancel(&self) { self.cancelled.store(true, Ordering::Relaxed); }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn token_starts_uncancelled() {
    assert!(!CancellationToken::new().is_cancelled());
  }

  #[test]
  fn cloned_token_shares_state() {
    let token = CancellationToken::new();
    let clone = token.clone();
    token.cancel();
    assert!(clone.is_cancelled());
  }
}

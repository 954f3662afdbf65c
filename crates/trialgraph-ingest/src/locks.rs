//! Named async locks.
//!
//! Merges for one indication are serialized by an indication lock; different
//! indications run in parallel. Merges and corrections touching the same
//! company or asset are serialized by per-entity locks, always acquired in
//! sorted key order so two writers can never wait on each other.
//!
//! A lock name lives in the registry only while someone holds or awaits it.

use std::{collections::BTreeSet, sync::Arc};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use trialgraph_core::ids::{AssetId, CompanyId};

type Handle = Arc<Mutex<()>>;

/// Guards held for the duration of one write. Dropping them releases the
/// locks and forgets names nobody else is waiting on.
#[derive(Debug)]
pub struct LockGuards<'a> {
  map:  &'a DashMap<String, Handle>,
  held: Vec<(String, OwnedMutexGuard<()>)>,
}

impl Drop for LockGuards<'_> {
  fn drop(&mut self) {
    for (key, guard) in self.held.drain(..) {
      drop(guard);
      // Handles are only cloned under the entry lock, so a count of one
      // means the map holds the last reference.
      self.map.remove_if(&key, |_, handle| Arc::strong_count(handle) == 1);
    }
  }
}

#[derive(Debug, Default)]
pub struct LockRegistry {
  indications: DashMap<String, Handle>,
  entities:    DashMap<String, Handle>,
}

impl LockRegistry {
  pub fn new() -> Self { Self::default() }

  /// Wait for exclusive access to an indication.
  pub async fn lock_indication(&self, indication: &str) -> LockGuards<'_> {
    let guard = handle(&self.indications, indication).lock_owned().await;
    LockGuards { map: &self.indications, held: vec![(indication.to_owned(), guard)] }
  }

  /// Wait for exclusive access to every listed entity.
  pub async fn lock_entities(&self, keys: impl IntoIterator<Item = String>) -> LockGuards<'_> {
    let keys: BTreeSet<String> = keys.into_iter().collect();
    let mut guards = LockGuards { map: &self.entities, held: Vec::with_capacity(keys.len()) };
    for key in keys {
      let guard = handle(&self.entities, &key).lock_owned().await;
      guards.held.push((key, guard));
    }
    guards
  }

  /// Number of lock names currently held or awaited.
  pub fn len(&self) -> usize { self.indications.len() + self.entities.len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

fn handle(map: &DashMap<String, Handle>, key: &str) -> Handle {
  map.entry(key.to_owned()).or_default().clone()
}

pub fn company_lock(id: &CompanyId) -> String { format!("company:{id}") }

pub fn asset_lock(id: &AssetId) -> String { format!("asset:{id}") }

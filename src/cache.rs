// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Process-lifetime discovery cache (repository, branch and tag listings) with an injected clock
// role: cache/discovery
// inputs: Clock implementation; refresh interval; loader closures supplied by callers
// outputs: Snapshot reads; explicit invalidate / refresh_if_stale operations
// invariants:
// - Readers clone an Arc snapshot and never observe a half-populated map
// - Writers build a fresh map and swap it in whole; existing snapshots stay valid
// - Failed loads are never cached
// - No background refresh; callers (or an external scheduler) trigger refreshes
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};

pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

struct Slot<T> {
  value: Arc<T>,
  loaded_at: DateTime<Utc>,
}

impl<T> Clone for Slot<T> {
  fn clone(&self) -> Self {
    Self {
      value: Arc::clone(&self.value),
      loaded_at: self.loaded_at,
    }
  }
}

pub struct DiscoveryCache<T> {
  clock: Arc<dyn Clock>,
  refresh_after: Duration,
  snapshot: RwLock<Arc<HashMap<String, Slot<T>>>>,
  // Serializes writers so two concurrent refreshes cannot drop each other's keys.
  write_lock: Mutex<()>,
}

impl<T> DiscoveryCache<T> {
  pub fn new(clock: Arc<dyn Clock>, refresh_after: Duration) -> Self {
    Self {
      clock,
      refresh_after,
      snapshot: RwLock::new(Arc::new(HashMap::new())),
      write_lock: Mutex::new(()),
    }
  }

  fn current(&self) -> Arc<HashMap<String, Slot<T>>> {
    match self.snapshot.read() {
      Ok(guard) => Arc::clone(&guard),
      Err(poisoned) => Arc::clone(&poisoned.into_inner()),
    }
  }

  fn is_fresh(&self, slot: &Slot<T>) -> bool {
    self.clock.now() - slot.loaded_at < self.refresh_after
  }

  /// Fresh cached value for `key`, if any.
  pub fn get(&self, key: &str) -> Option<Arc<T>> {
    let snap = self.current();
    snap.get(key).filter(|slot| self.is_fresh(slot)).map(|slot| Arc::clone(&slot.value))
  }

  pub fn is_stale(&self, key: &str) -> bool {
    self.get(key).is_none()
  }

  /// Copy-on-write update: build the next map from the current snapshot, then swap it in.
  fn update<F>(&self, mutate: F)
  where
    F: FnOnce(&mut HashMap<String, Slot<T>>),
  {
    let _writer = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
    let mut next: HashMap<String, Slot<T>> = self.current().as_ref().clone();
    mutate(&mut next);

    let mut guard = match self.snapshot.write() {
      Ok(g) => g,
      Err(poisoned) => poisoned.into_inner(),
    };
    *guard = Arc::new(next);
  }

  pub fn insert(&self, key: &str, value: T) -> Arc<T> {
    let value = Arc::new(value);
    let slot = Slot {
      value: Arc::clone(&value),
      loaded_at: self.clock.now(),
    };
    self.update(|map| {
      map.insert(key.to_string(), slot);
    });
    value
  }

  /// Drop one key, or everything when `key` is `None`.
  pub fn invalidate(&self, key: Option<&str>) {
    self.update(|map| match key {
      Some(k) => {
        map.remove(k);
      }
      None => map.clear(),
    });
  }

  /// Return the cached value when fresh; otherwise run `load` and cache a success.
  pub fn get_or_refresh<E, F>(&self, key: &str, load: F) -> Result<Arc<T>, E>
  where
    F: FnOnce() -> Result<T, E>,
  {
    if let Some(hit) = self.get(key) {
      return Ok(hit);
    }
    let value = load()?;
    Ok(self.insert(key, value))
  }

  /// Reload `key` only if it is missing or older than the refresh interval.
  /// Returns whether a reload happened.
  pub fn refresh_if_stale<E, F>(&self, key: &str, load: F) -> Result<bool, E>
  where
    F: FnOnce() -> Result<T, E>,
  {
    if !self.is_stale(key) {
      return Ok(false);
    }
    let value = load()?;
    self.insert(key, value);
    Ok(true)
  }
}

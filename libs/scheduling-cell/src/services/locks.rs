// libs/scheduling-cell/src/services/locks.rs
use std::collections::{BTreeSet, HashMap};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

/// One exclusive lock per key (a calendar date, a treatment).
///
/// Holding a date's guard makes the holder the only writer for that date,
/// so occupancy read from storage stays valid until the write lands.
#[derive(Debug)]
pub struct LockRegistry<K> {
    locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

pub type DateLockRegistry = LockRegistry<NaiveDate>;
pub type TreatmentLockRegistry = LockRegistry<Uuid>;

/// Guards for a set of keys; released together on drop.
#[derive(Debug)]
pub struct KeyGuard<K> {
    keys: Vec<K>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

pub type DateGuard = KeyGuard<NaiveDate>;

impl<K: Ord> KeyGuard<K> {
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn covers(&self, key: &K) -> bool {
        self.keys.binary_search(key).is_ok()
    }
}

impl<K> Default for LockRegistry<K> {
    fn default() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl<K> LockRegistry<K>
where
    K: Ord + Hash + Copy + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire every key's lock in ascending order so concurrent callers
    /// with overlapping key sets cannot deadlock.
    pub async fn lock_all<I>(&self, keys: I) -> KeyGuard<K>
    where
        I: IntoIterator<Item = K>,
    {
        let ordered: Vec<K> = keys.into_iter().collect::<BTreeSet<_>>().into_iter().collect();

        let handles: Vec<Arc<Mutex<()>>> = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            ordered
                .iter()
                .map(|key| locks.entry(*key).or_default().clone())
                .collect()
        };

        let mut guards = Vec::with_capacity(handles.len());
        for handle in handles {
            guards.push(handle.lock_owned().await);
        }

        debug!("Acquired locks for {:?}", ordered);

        KeyGuard {
            keys: ordered,
            _guards: guards,
        }
    }

    pub async fn lock(&self, key: K) -> KeyGuard<K> {
        self.lock_all([key]).await
    }

    pub async fn tracked_keys(&self) -> usize {
        self.locks.lock().await.len()
    }
}

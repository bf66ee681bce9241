//! # Deployment Store
//!
//! The authoritative, in-process store. Every entity mutation goes through
//! [`Store::try_update`], a conditional write: the closure validates and
//! mutates a working copy under the write lock, and the copy replaces the
//! stored record only if the closure succeeds. Two racing transitions on the
//! same record therefore serialize, and the loser sees the winner's state.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use depot_state::Deployment;

/// Records that carry a compare-and-set version.
pub trait Versioned {
    fn version(&self) -> u64;
    fn bump_version(&mut self);
}

impl Versioned for Deployment {
    fn version(&self) -> u64 {
        self.version
    }

    fn bump_version(&mut self) {
        self.version += 1;
    }
}

/// Thread-safe, cloneable in-memory key-value store.
///
/// All operations are synchronous (the RwLock is `parking_lot`, not
/// `tokio::sync`) and the lock is never held across `.await` points.
/// `parking_lot::RwLock` is non-poisonable.
#[derive(Debug)]
pub struct Store<T: Clone + Send + Sync> {
    data: Arc<RwLock<HashMap<Uuid, T>>>,
}

impl<T: Clone + Send + Sync> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<T: Clone + Send + Sync> Store<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a record, returning the previous value if the key existed.
    pub fn insert(&self, id: Uuid, value: T) -> Option<T> {
        self.data.write().insert(id, value)
    }

    /// Retrieve a record by ID.
    pub fn get(&self, id: &Uuid) -> Option<T> {
        self.data.read().get(id).cloned()
    }

    /// List all records.
    pub fn list(&self) -> Vec<T> {
        self.data.read().values().cloned().collect()
    }

    /// Return the number of records.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Send + Sync + Versioned> Store<T> {
    /// Atomically read-validate-update a record.
    ///
    /// The closure receives a copy of the current record and may inspect it,
    /// validate preconditions, mutate it, and return `Ok(R)` or `Err(E)`. On
    /// `Ok` the copy's version is bumped and it replaces the stored record;
    /// on `Err` the stored record is untouched. The whole operation runs
    /// under one write lock.
    ///
    /// Returns `None` if the record doesn't exist, or `Some(result)` with the
    /// closure's result paired with the committed record.
    pub fn try_update<R, E>(
        &self,
        id: &Uuid,
        f: impl FnOnce(&mut T) -> Result<R, E>,
    ) -> Option<Result<(R, T), E>> {
        let mut guard = self.data.write();
        let entry = guard.get_mut(id)?;
        let mut working = entry.clone();
        Some(f(&mut working).map(|result| {
            working.bump_version();
            *entry = working.clone();
            (result, working)
        }))
    }
}

impl<T: Clone + Send + Sync> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Counter {
        value: i64,
        version: u64,
    }

    impl Versioned for Counter {
        fn version(&self) -> u64 {
            self.version
        }

        fn bump_version(&mut self) {
            self.version += 1;
        }
    }

    fn make_store() -> (Store<Counter>, Uuid) {
        let store = Store::new();
        let id = Uuid::new_v4();
        store.insert(id, Counter { value: 0, version: 0 });
        (store, id)
    }

    #[test]
    fn try_update_commits_on_success_and_bumps_version() {
        let (store, id) = make_store();
        let (_, committed) = store
            .try_update(&id, |c| {
                c.value += 5;
                Ok::<_, ()>(())
            })
            .unwrap()
            .unwrap();
        assert_eq!(committed.value, 5);
        assert_eq!(committed.version, 1);
        assert_eq!(store.get(&id), Some(committed));
    }

    #[test]
    fn try_update_discards_partial_changes_on_error() {
        let (store, id) = make_store();
        let result = store
            .try_update(&id, |c| {
                c.value = 99;
                Err::<(), _>("rejected")
            })
            .unwrap();
        assert_eq!(result.unwrap_err(), "rejected");
        assert_eq!(store.get(&id), Some(Counter { value: 0, version: 0 }));
    }

    #[test]
    fn try_update_missing_record_is_none() {
        let (store, _) = make_store();
        assert!(store
            .try_update(&Uuid::new_v4(), |_| Ok::<_, ()>(()))
            .is_none());
    }

    #[test]
    fn racing_conditional_updates_have_one_winner() {
        let (store, id) = make_store();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store
                        .try_update(&id, |c| {
                            if c.value != 0 {
                                return Err(());
                            }
                            c.value = 1;
                            Ok(())
                        })
                        .map(|r| r.is_ok())
                        .unwrap_or(false)
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(store.get(&id).unwrap().version, 1);
    }
}
